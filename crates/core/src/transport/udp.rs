//! UDP transport (C4) — non-blocking RTP datagram sender.
//!
//! Generalizes the teacher's `transport::udp::UdpTransport`
//! (a single blocking `send_to` call on an ephemeral socket) into an owned
//! non-blocking socket with a dedicated polling worker thread (T-send) and
//! a peer-address snapshot published through the same lock-free cell
//! pattern used for the [`crate::session::SessionDescriptor`].

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::Result;
use crate::ring::DatagramRing;
use crate::stats::Stats;

/// Minimum send buffer size requested on the outbound socket (RFC-silent;
/// `spec.md` §4.4 specifies "≥512 KB").
const MIN_SEND_BUFFER_BYTES: usize = 512 * 1024;
/// Consecutive send failures after which the worker terminates and marks
/// the session `FAILED` (`spec.md` §4.4).
const MAX_CONSECUTIVE_SEND_ERRORS: u32 = 10;
/// Sleep applied when the datagram ring is empty, to avoid a hot spin.
const IDLE_SLEEP: Duration = Duration::from_micros(50);

/// Owns the outbound RTP socket and the T-send worker thread.
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    peer_addr: Arc<ArcSwapOption<SocketAddr>>,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    consecutive_errors: Arc<AtomicU32>,
    worker: Option<JoinHandle<()>>,
}

impl UdpSender {
    /// Bind a non-blocking UDP socket to `0.0.0.0:<client_rtp_port>` with
    /// the socket options `spec.md` §4.4 calls for: a send buffer of at
    /// least 512 KiB, address reuse, and (best-effort, platform-gated)
    /// low-delay IP_TOS.
    pub fn bind(client_rtp_port: u16) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        if let Err(e) = socket.set_send_buffer_size(MIN_SEND_BUFFER_BYTES) {
            tracing::warn!(error = %e, "failed to set SO_SNDBUF, continuing with default");
        }
        #[cfg(target_os = "linux")]
        if let Err(e) = socket.set_tos(0x10) {
            tracing::warn!(error = %e, "failed to set low-delay IP_TOS, continuing without it");
        }

        let addr: SocketAddr = ([0, 0, 0, 0], client_rtp_port).into();
        socket.bind(&addr.into())?;

        let socket: UdpSocket = socket.into();

        Ok(Self {
            socket: Arc::new(socket),
            peer_addr: Arc::new(ArcSwapOption::from(None)),
            running: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
            consecutive_errors: Arc::new(AtomicU32::new(0)),
            worker: None,
        })
    }

    /// Publish the negotiated peer RTP address. Sends are suppressed until
    /// this has been called at least once (before `RECORD 200 OK`, the
    /// address is "unset").
    pub fn set_peer_addr(&self, addr: SocketAddr) {
        tracing::info!(%addr, "UDP sender peer address set");
        self.peer_addr.store(Some(Arc::new(addr)));
    }

    /// Whether the worker has observed ≥10 consecutive send errors and
    /// terminated.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Start the T-send worker thread, draining `ring` into the socket.
    pub fn start(&mut self, ring: Arc<DatagramRing>, stats: Arc<Stats>) {
        self.running.store(true, Ordering::SeqCst);

        let socket = self.socket.clone();
        let peer_addr = self.peer_addr.clone();
        let running = self.running.clone();
        let failed = self.failed.clone();
        let consecutive_errors = self.consecutive_errors.clone();

        let handle = thread::Builder::new()
            .name("t-send".to_string())
            .spawn(move || {
                tracing::info!("T-send worker started");
                'outer: while running.load(Ordering::Relaxed) {
                    let Some(occupied) = ring.peek() else {
                        thread::sleep(IDLE_SLEEP);
                        continue;
                    };

                    let Some(addr) = peer_addr.load_full() else {
                        // Peer not yet negotiated; drop this one queued
                        // datagram — pre-RECORD suppression, not a send
                        // error. `occupied` releases the slot on drop below.
                        continue;
                    };

                    // Retry the same datagram (never a freshly-peeked one)
                    // across WouldBlock; only a hard error or a shutdown
                    // request gives up on it.
                    loop {
                        match socket.send_to(occupied.slot().as_slice(), *addr) {
                            Ok(n) => {
                                stats.record_packet_sent(n);
                                consecutive_errors.store(0, Ordering::Relaxed);
                                break;
                            }
                            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                                stats.record_send_would_block();
                                thread::sleep(IDLE_SLEEP);
                                if !running.load(Ordering::Relaxed) {
                                    break 'outer;
                                }
                            }
                            Err(e) => {
                                stats.record_send_error();
                                let errors = consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
                                tracing::warn!(error = %e, consecutive_errors = errors, "UDP send failed");
                                if errors >= MAX_CONSECUTIVE_SEND_ERRORS {
                                    tracing::error!(
                                        "{MAX_CONSECUTIVE_SEND_ERRORS} consecutive send errors, terminating T-send"
                                    );
                                    failed.store(true, Ordering::Release);
                                    break 'outer;
                                }
                                break;
                            }
                        }
                    }
                    // `occupied` drops here, releasing the slot back to the
                    // producer whether the send succeeded or was abandoned.
                }
                tracing::info!("T-send worker stopped");
            })
            .expect("failed to spawn t-send thread");

        self.worker = Some(handle);
    }

    /// Signal the worker to stop and join it with a bounded wait, matching
    /// `spec.md` §4.8's 1s join timeout (threads that miss it are detached
    /// rather than blocking `stop()` indefinitely).
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let _ = thread::Builder::new().name("t-send-join".into()).spawn(move || {
                handle.join().ok();
                let _ = done_tx.send(());
            });
            if done_rx.recv_timeout(Duration::from_secs(1)).is_err() {
                tracing::warn!("T-send did not join within 1s, detaching");
            }
        }
    }
}

impl Drop for UdpSender {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{RingSlot, SpscRing};
    use std::net::UdpSocket as StdUdpSocket;

    #[test]
    fn sends_are_suppressed_until_peer_addr_is_set() {
        let receiver = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_nonblocking(true).unwrap();
        let receiver_port = receiver.local_addr().unwrap().port();

        let ring: Arc<DatagramRing> = Arc::new(SpscRing::new(4));
        let mut slot = RingSlot::with_capacity(16);
        slot.fill(&[1, 2, 3]);
        ring.offer(slot).unwrap();

        let stats = Arc::new(Stats::new());
        let mut sender = UdpSender::bind(0).unwrap();
        sender.start(ring.clone(), stats.clone());

        thread::sleep(Duration::from_millis(100));
        let mut buf = [0u8; 16];
        assert!(receiver.recv_from(&mut buf).is_err(), "no datagram should arrive before peer_addr is set");

        sender.set_peer_addr(([127, 0, 0, 1], receiver_port).into());
        let mut ring2 = RingSlot::with_capacity(16);
        ring2.fill(&[9, 9]);
        ring.offer(ring2).unwrap();

        thread::sleep(Duration::from_millis(200));
        sender.stop();
    }

    #[test]
    fn every_queued_datagram_is_delivered_exactly_once_under_burst() {
        let receiver = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let receiver_port = receiver.local_addr().unwrap().port();

        let ring: Arc<DatagramRing> = Arc::new(SpscRing::new(16));
        let stats = Arc::new(Stats::new());
        let mut sender = UdpSender::bind(0).unwrap();
        sender.set_peer_addr(([127, 0, 0, 1], receiver_port).into());
        sender.start(ring.clone(), stats.clone());

        const N: u8 = 50;
        for i in 0..N {
            loop {
                let mut slot = RingSlot::with_capacity(4);
                slot.fill(&[i]);
                match ring.offer(slot) {
                    Ok(()) => break,
                    Err(_) => thread::sleep(Duration::from_micros(50)),
                }
            }
        }

        let mut received = Vec::new();
        let mut buf = [0u8; 4];
        for _ in 0..N {
            let (n, _) = receiver.recv_from(&mut buf).expect("datagram should arrive");
            received.push(buf[..n][0]);
        }
        received.sort_unstable();
        assert_eq!(received, (0..N).collect::<Vec<_>>());

        sender.stop();
        assert_eq!(stats.snapshot().packets_dropped, 0);
    }
}
