//! TCP fan-out hub for relay clients.
//!
//! Remote relay clients connect here and receive every captured
//! announcement as a newline-terminated JSON frame. The consumer set is the
//! only state shared between the accept task and the publish path; it is
//! guarded by a `parking_lot` mutex that is never held across an await.

use flexrelay_core::error::{Result, TransportError};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Bound per-consumer write; a consumer that cannot drain one frame in this
/// window is treated as dead.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long one accept call blocks before re-checking the shutdown flag.
const ACCEPT_CYCLE: Duration = Duration::from_secs(1);

/// One connected relay client.
struct Consumer {
    id: u64,
    addr: SocketAddr,
    stream: tokio::sync::Mutex<TcpStream>,
    frames_sent: AtomicU64,
    connected_at: Instant,
}

impl Consumer {
    /// Cheap liveness probe between publishes. A consumer whose peer
    /// identity is gone has been torn down by the kernel.
    async fn is_alive(&self) -> bool {
        self.stream.lock().await.peer_addr().is_ok()
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubStats {
    pub accepted: u64,
    pub rejected: u64,
    pub active: usize,
    pub frames_published: u64,
}

/// Fan-out hub: accepts relay clients and pushes frames to all of them.
pub struct RelayHub {
    consumers: Mutex<Vec<Arc<Consumer>>>,
    max_clients: usize,
    shutdown: Arc<AtomicBool>,
    next_id: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    frames_published: AtomicU64,
}

impl RelayHub {
    pub fn new(max_clients: usize, shutdown: Arc<AtomicBool>) -> Arc<Self> {
        Arc::new(Self {
            consumers: Mutex::new(Vec::new()),
            max_clients,
            shutdown,
            next_id: AtomicU64::new(1),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
        })
    }

    /// Binds the stream listener and spawns the accept loop task.
    ///
    /// The task re-checks the shutdown flag at least once per accept cycle
    /// and exits on its own once the flag is set.
    pub async fn start(self: &Arc<Self>, address: &str) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| TransportError::bind_failed(address, e.to_string()))?;
        let local = listener.local_addr()?;
        info!(address = %local, max_clients = self.max_clients, "Stream listener started");

        let hub = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                if hub.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                match timeout(ACCEPT_CYCLE, listener.accept()).await {
                    Err(_) => continue,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Accept error");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    Ok(Ok((stream, addr))) => hub.admit(stream, addr),
                }
            }
            info!("Stream accept loop stopped");
        });

        Ok((local, task))
    }

    /// Registers a freshly accepted connection, or rejects it when the
    /// client limit is reached. Rejection closes the socket immediately; a
    /// waiting list would only hand out silent connections.
    fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        let mut consumers = self.consumers.lock();
        if consumers.len() >= self.max_clients {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                remote = %addr,
                active = consumers.len(),
                max = self.max_clients,
                "Client limit reached, rejecting"
            );
            drop(stream);
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        consumers.push(Arc::new(Consumer {
            id,
            addr,
            stream: tokio::sync::Mutex::new(stream),
            frames_sent: AtomicU64::new(0),
            connected_at: Instant::now(),
        }));
        self.accepted.fetch_add(1, Ordering::Relaxed);
        info!(remote = %addr, active = consumers.len(), "Relay client connected");
    }

    /// Sends one already-framed line to every consumer and returns how many
    /// received it.
    ///
    /// The consumer set is snapshotted under the lock and the lock released
    /// before any I/O, so a slow consumer never blocks admission. Consumers
    /// that fail or time out are removed after the pass. Zero deliveries is
    /// a normal outcome, not an error.
    pub async fn publish(&self, line: &[u8]) -> usize {
        let snapshot: Vec<Arc<Consumer>> = self.consumers.lock().clone();
        if snapshot.is_empty() {
            return 0;
        }

        let mut failed = Vec::new();
        let mut delivered = 0;
        for consumer in &snapshot {
            let mut stream = consumer.stream.lock().await;
            let send = async {
                stream.write_all(line).await?;
                stream.flush().await
            };
            match timeout(WRITE_TIMEOUT, send).await {
                Ok(Ok(())) => {
                    consumer.frames_sent.fetch_add(1, Ordering::Relaxed);
                    delivered += 1;
                }
                Ok(Err(e)) => {
                    debug!(remote = %consumer.addr, error = %e, "Consumer write failed");
                    failed.push(consumer.id);
                }
                Err(_) => {
                    debug!(remote = %consumer.addr, "Consumer write timed out");
                    failed.push(consumer.id);
                }
            }
        }

        if !failed.is_empty() {
            self.remove(&failed, "send failure");
        }
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        delivered
    }

    /// Drops consumers whose sockets the kernel already gave up on. Run
    /// periodically from the server loop's idle cycles.
    pub async fn prune_dead_consumers(&self) {
        let snapshot: Vec<Arc<Consumer>> = self.consumers.lock().clone();
        let mut dead = Vec::new();
        for consumer in &snapshot {
            if !consumer.is_alive().await {
                dead.push(consumer.id);
            }
        }
        if !dead.is_empty() {
            self.remove(&dead, "dead socket");
        }
    }

    fn remove(&self, ids: &[u64], reason: &str) {
        let mut consumers = self.consumers.lock();
        consumers.retain(|consumer| {
            if ids.contains(&consumer.id) {
                info!(
                    remote = %consumer.addr,
                    frames_sent = consumer.frames_sent.load(Ordering::Relaxed),
                    session_secs = consumer.connected_at.elapsed().as_secs(),
                    reason,
                    "Relay client disconnected"
                );
                false
            } else {
                true
            }
        });
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            active: self.consumer_count(),
            frames_published: self.frames_published.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn started_hub(max_clients: usize) -> (Arc<RelayHub>, SocketAddr, Arc<AtomicBool>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let hub = RelayHub::new(max_clients, Arc::clone(&shutdown));
        let (addr, _task) = hub.start("127.0.0.1:0").await.unwrap();
        (hub, addr, shutdown)
    }

    async fn connect_and_settle(hub: &RelayHub, addr: SocketAddr, expected: usize) -> TcpStream {
        let stream = TcpStream::connect(addr).await.unwrap();
        // Admission happens on the accept task; wait for it to land.
        for _ in 0..50 {
            if hub.consumer_count() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.consumer_count(), expected);
        stream
    }

    #[tokio::test]
    async fn publishes_to_every_consumer() {
        let (hub, addr, shutdown) = started_hub(4).await;
        let mut a = connect_and_settle(&hub, addr, 1).await;
        let mut b = connect_and_settle(&hub, addr, 2).await;

        let delivered = hub.publish(b"{\"seq\":1}\n").await;
        assert_eq!(delivered, 2);

        for stream in [&mut a, &mut b] {
            let mut buf = vec![0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"{\"seq\":1}\n");
        }
        shutdown.store(true, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn publish_with_no_consumers_is_zero() {
        let (hub, _addr, shutdown) = started_hub(4).await;
        assert_eq!(hub.publish(b"{}\n").await, 0);
        shutdown.store(true, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn dropped_consumer_is_removed_on_publish() {
        let (hub, addr, shutdown) = started_hub(4).await;
        let stream = connect_and_settle(&hub, addr, 1).await;
        let mut keeper = connect_and_settle(&hub, addr, 2).await;
        drop(stream);

        // The first publish may still land in the dead socket's buffers;
        // the follow-up write surfaces the reset.
        for _ in 0..10 {
            hub.publish(b"{\"seq\":2}\n").await;
            if hub.consumer_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hub.consumer_count(), 1);

        let mut buf = vec![0u8; 256];
        let n = keeper.read(&mut buf).await.unwrap();
        assert!(n > 0);
        shutdown.store(true, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn rejects_connections_over_the_limit() {
        let (hub, addr, shutdown) = started_hub(1).await;
        let _first = connect_and_settle(&hub, addr, 1).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        // The rejected socket is closed by the hub; read returns EOF.
        let mut buf = [0u8; 8];
        let mut eof = false;
        for _ in 0..50 {
            match timeout(Duration::from_millis(100), second.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    eof = true;
                    break;
                }
                Ok(Ok(_)) => panic!("rejected client should not receive data"),
                Ok(Err(_)) => {
                    eof = true;
                    break;
                }
                Err(_) => continue,
            }
        }
        assert!(eof);
        assert_eq!(hub.consumer_count(), 1);
        assert_eq!(hub.stats().rejected, 1);
        shutdown.store(true, Ordering::Relaxed);
    }
}
