//! Supervisor (C8) — builds the pipeline, drives the publish handshake,
//! and owns every worker thread's lifetime.
//!
//! Mirrors the shape of the teacher's `Server`, which owns the accept loop
//! and the mount table: here there is exactly one mount (one H.265 track,
//! one peer), so `Supervisor` owns the RTSP client thread (T-rtsp) and the
//! UDP sender thread (T-send) directly instead of dispatching across a
//! table of sessions.

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::config::PublisherConfig;
use crate::encoder::{AccessUnit, EncoderSink};
use crate::error::{PublishError, Result};
use crate::frame_source::FrameSourceAdapter;
use crate::media::h265::H265Packetizer;
use crate::paramset::ParameterSets;
use crate::ring::{DatagramRing, RingSlot, SpscRing, TokenRing};
use crate::rtsp::client::RtspClient;
use crate::session::SessionDescriptor;
use crate::stats::{HealthStatus, Stats};
use crate::transport::UdpSender;

const RTSP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const PARAM_SET_POLL_INTERVAL: Duration = Duration::from_millis(20);
const RTP_PAYLOAD_TYPE: u8 = 96;

/// Wires together C1 (frame source), C3 (packetizer), C4 (UDP sender), and
/// C5 (RTSP client) into one running publish session.
///
/// `T-encode` is the caller's own thread: [`Supervisor::push`] (the
/// [`EncoderSink`] implementation) runs C1 and C3 synchronously on
/// whichever thread the encoder calls from, draining the token ring it
/// just fed so the ring never holds more than the one token produced by
/// the call in flight. `T-send` and `T-rtsp` are threads this struct
/// spawns itself.
pub struct Supervisor {
    config: PublisherConfig,
    stats: Arc<Stats>,
    param_sets: Arc<Mutex<ParameterSets>>,
    datagram_ring: Arc<DatagramRing>,
    frame_source: Arc<FrameSourceAdapter>,
    packetizer: Mutex<H265Packetizer>,
    udp_sender: Mutex<UdpSender>,
    rtsp_client: Mutex<Option<RtspClient>>,
    session: Arc<ArcSwapOption<SessionDescriptor>>,
    ready: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    rtsp_thread: Mutex<Option<JoinHandle<()>>>,
    ssrc: u32,
}

impl Supervisor {
    /// Build every component and bind the outbound UDP socket. Does not
    /// connect to the RTSP peer or start any worker thread yet — call
    /// [`Supervisor::start`] for that.
    pub fn new(config: PublisherConfig) -> Result<Arc<Self>> {
        let ssrc = config.ssrc.unwrap_or_else(|| rand::random::<u32>());
        let stats = Arc::new(Stats::new());
        let param_sets = Arc::new(Mutex::new(ParameterSets::default()));
        let ready = Arc::new(AtomicBool::new(false));

        let token_ring: Arc<TokenRing> = Arc::new(SpscRing::new(config.token_ring_capacity));
        let mtu = config.mtu;
        let datagram_ring: Arc<DatagramRing> = Arc::new(SpscRing::new_with(
            config.datagram_ring_capacity,
            move || RingSlot::with_capacity(mtu),
        ));

        let frame_source = Arc::new(FrameSourceAdapter::new(
            token_ring,
            config.mtu,
            ready.clone(),
            stats.clone(),
            param_sets.clone(),
        ));

        let packetizer = Mutex::new(H265Packetizer::new(RTP_PAYLOAD_TYPE, ssrc, config.mtu));
        let udp_sender = Mutex::new(UdpSender::bind(config.client_rtp_port)?);

        Ok(Arc::new(Self {
            config,
            stats,
            param_sets,
            datagram_ring,
            frame_source,
            packetizer,
            udp_sender,
            rtsp_client: Mutex::new(None),
            session: Arc::new(ArcSwapOption::from(None)),
            ready,
            running: Arc::new(AtomicBool::new(false)),
            rtsp_thread: Mutex::new(None),
            ssrc,
        }))
    }

    /// Start T-send immediately and spawn T-rtsp, which waits for
    /// parameter sets to become ready, then runs the ANNOUNCE/SETUP/RECORD
    /// handshake and flips the session to `READY`.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PublishError::AlreadyRunning);
        }

        self.udp_sender
            .lock()
            .start(self.datagram_ring.clone(), self.stats.clone());

        let this = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("t-rtsp".to_string())
            .spawn(move || this.run_rtsp())
            .expect("failed to spawn t-rtsp thread");
        *self.rtsp_thread.lock() = Some(handle);

        Ok(())
    }

    fn run_rtsp(self: Arc<Self>) {
        tracing::info!("T-rtsp worker started");
        while self.running.load(Ordering::Relaxed) && !self.param_sets.lock().is_ready() {
            thread::sleep(PARAM_SET_POLL_INTERVAL);
        }
        if !self.running.load(Ordering::Relaxed) {
            tracing::info!("T-rtsp stopped before parameter sets became ready");
            return;
        }

        let params = self.param_sets.lock().clone();
        let outcome = RtspClient::connect(&self.config)
            .and_then(|mut client| {
                let descriptor = client.publish(&self.config, &params, self.ssrc)?;
                Ok((client, descriptor))
            });

        match outcome {
            Ok((client, descriptor)) => {
                let peer_addr = (self.config.peer_host.as_str(), descriptor.peer_rtp_port)
                    .to_socket_addrs()
                    .ok()
                    .and_then(|mut addrs| addrs.next());

                match peer_addr {
                    Some(addr) => {
                        self.udp_sender.lock().set_peer_addr(addr);
                        self.session.store(Some(Arc::new(descriptor)));
                        *self.rtsp_client.lock() = Some(client);
                        self.ready.store(true, Ordering::Release);
                        tracing::info!("publish handshake complete, session READY");
                    }
                    None => {
                        tracing::error!("could not resolve peer RTP address after SETUP");
                        self.running.store(false, Ordering::SeqCst);
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "publish handshake failed");
                self.running.store(false, Ordering::SeqCst);
            }
        }
        tracing::info!("T-rtsp worker stopped");
    }

    /// Stop publishing: tear down the RTSP session (best-effort), stop
    /// T-send, and join T-rtsp with a bounded 1s wait, detaching it if it
    /// does not finish in time.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.ready.store(false, Ordering::Release);

        if let Some(mut client) = self.rtsp_client.lock().take() {
            client.teardown(&self.config);
        }

        if let Some(handle) = self.rtsp_thread.lock().take() {
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let _ = thread::Builder::new().name("t-rtsp-join".into()).spawn(move || {
                handle.join().ok();
                let _ = done_tx.send(());
            });
            if done_rx.recv_timeout(RTSP_JOIN_TIMEOUT).is_err() {
                tracing::warn!("T-rtsp did not join within 1s, detaching");
            }
        }

        self.udp_sender.lock().stop();
    }

    /// Whether the session has completed the publish handshake and is
    /// currently sending RTP.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// The negotiated session descriptor, once `READY`.
    pub fn session(&self) -> Option<SessionDescriptor> {
        self.session.load_full().map(|s| (*s).clone())
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    pub fn health(&self) -> HealthStatus {
        self.stats.snapshot()
    }
}

impl EncoderSink for Supervisor {
    /// C1 then C3, synchronously on the calling thread: route the access
    /// unit, drain the one token it produced (if any), packetize it, and
    /// offer every resulting datagram to T-send's ring.
    fn push(&self, au: AccessUnit<'_>) -> Result<()> {
        self.frame_source.on_access_unit(au);

        while let Some(token) = self.frame_source.token_ring().poll() {
            let mut packetizer = self.packetizer.lock();
            let mut datagrams = 0usize;
            self.frame_source.with_slot_bytes(&token, |bytes| {
                packetizer.packetize_au_into(bytes, token.pts_us, |packet| {
                    datagrams += 1;
                    match self.datagram_ring.claim() {
                        Some(mut claimed) => {
                            claimed.slot_mut().fill(packet);
                            claimed.commit();
                        }
                        None => {
                            self.stats.record_packet_dropped();
                            tracing::trace!("datagram dropped: UDP ring full");
                        }
                    }
                });
            });
            if datagrams > 1 {
                self.stats.record_fragmented_frame();
            }
        }
        Ok(())
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn codec_config_au() -> Vec<u8> {
        let mut data = vec![0, 0, 0, 1, 0x42, 0x01, 0xBB]; // SPS
        data.extend_from_slice(&[0, 0, 0, 1, 0x44, 0x01, 0xCC]); // PPS
        data
    }

    fn read_request(reader: &mut impl BufRead) -> String {
        let mut text = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            text.push_str(&line);
            if line == "\r\n" {
                break;
            }
        }
        text
    }

    #[test]
    fn becomes_ready_after_codec_config_and_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let rtsp_port = listener.local_addr().unwrap().port();

        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);

            read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").unwrap();
            read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n").unwrap();
            read_request(&mut reader);
            writer
                .write_all(
                    b"RTSP/1.0 200 OK\r\nCSeq: 3\r\n\
                      Session: cafef00d\r\n\
                      Transport: RTP/AVP/UDP;unicast;client_port=6000-6001;server_port=7000-7001\r\n\r\n",
                )
                .unwrap();
            read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n").unwrap();
        });

        let config = PublisherConfig {
            peer_host: "127.0.0.1".into(),
            peer_rtsp_port: rtsp_port,
            client_rtp_port: 0,
            rtsp_timeout_ms: 2000,
            ..Default::default()
        };

        let sup = Supervisor::new(config).unwrap();
        sup.start().unwrap();
        assert!(!sup.is_ready());

        sup.push(AccessUnit {
            data: &codec_config_au(),
            pts_us: 0,
            is_keyframe: false,
            is_codec_config: true,
        })
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !sup.is_ready() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(sup.is_ready());
        assert_eq!(sup.session().unwrap().session_id, "cafef00d");

        sup.stop();
    }

    #[test]
    fn pictures_before_ready_are_dropped_and_counted() {
        let config = PublisherConfig {
            peer_host: "127.0.0.1".into(),
            peer_rtsp_port: 0,
            client_rtp_port: 0,
            ..Default::default()
        };
        let sup = Supervisor::new(config).unwrap();
        sup.push(AccessUnit {
            data: &[0x28, 0x01, 0xAA],
            pts_us: 0,
            is_keyframe: true,
            is_codec_config: false,
        })
        .unwrap();
        assert_eq!(sup.health().frames_dropped, 1);
    }
}
