//! Shared foundation for the FlexRelay discovery relay: configuration,
//! error taxonomy, health reporting, and staleness detection.

pub mod config;
pub mod error;
pub mod health;
pub mod staleness;

pub use config::{AppConfig, ClientSection, ClientTransport, LoggingSection, ServerSection};
pub use error::{ConfigError, ProtocolError, RelayError, ResourceError, Result, TransportError};
pub use health::{CheckResult, CheckStatus, HealthProvider, NoChecks, Report, SweepTimer};
pub use staleness::{StalenessMonitor, Transition, DEFAULT_STALE_AFTER};
