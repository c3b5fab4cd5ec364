//! RTSP client state machine (C5).
//!
//! Structurally the mirror of the teacher's `transport::tcp::Connection`
//! (owns a `BufReader<TcpStream>` + `TcpStream` writer pair, synchronous
//! line-based I/O) but drives the client-side publish sequence instead of
//! the teacher's server-side per-connection accept loop:
//!
//! ```text
//! DISCONNECTED -> CONNECTED -> OPTIONS_OK -> ANNOUNCED -> SETUP_OK
//!              -> RECORDING -> (TEARDOWN) -> CLOSED / FAILED
//! ```

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::config::PublisherConfig;
use crate::error::{PublishError, Result};
use crate::paramset::ParameterSets;
use crate::rtsp::request::RtspRequest;
use crate::rtsp::response::RtspResponse;
use crate::sdp;
use crate::session::SessionDescriptor;

/// Publish handshake state, in the order `spec.md` §4.5 requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
    OptionsOk,
    Announced,
    SetupOk,
    Recording,
    Closed,
    Failed,
}

/// A single TCP connection driving the RTSP publish handshake.
pub struct RtspClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    cseq: u32,
    session_id: Option<String>,
    state: ClientState,
}

impl RtspClient {
    /// Connect to the peer RTSP server, applying the configured per-request
    /// timeout to both reads and writes.
    pub fn connect(config: &PublisherConfig) -> Result<Self> {
        let addr = (config.peer_host.as_str(), config.peer_rtsp_port);
        let stream = TcpStream::connect(addr)?;
        let timeout = Duration::from_millis(config.rtsp_timeout_ms);
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let reader_stream = stream.try_clone()?;

        tracing::info!(host = %config.peer_host, port = config.peer_rtsp_port, "connected to RTSP peer");

        Ok(Self {
            reader: BufReader::new(reader_stream),
            writer: stream,
            cseq: 0,
            session_id: None,
            state: ClientState::Connected,
        })
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    fn next_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    /// Send one request and block for its response.
    fn send(&mut self, request: RtspRequest) -> Result<RtspResponse> {
        let wire = request.serialize();
        tracing::debug!(method = request.method(), "sending RTSP request");
        self.writer.write_all(wire.as_bytes())?;

        let mut head = String::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                return Err(PublishError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed while reading RTSP response",
                )));
            }
            head.push_str(&line);
            if line == "\r\n" || line == "\n" {
                break;
            }
        }

        let partial = RtspResponse::parse(&head, Vec::new())?;
        let content_length = partial.content_length()?.unwrap_or(0);
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            self.reader.read_exact(&mut body)?;
        }

        let response = RtspResponse::parse(&head, body)?;
        tracing::debug!(
            method = request.method(),
            status = response.status_code,
            "received RTSP response"
        );
        Ok(response)
    }

    fn require_success(&self, method: &'static str, response: &RtspResponse) -> Result<()> {
        if response.is_success() {
            Ok(())
        } else {
            Err(PublishError::RequestRejected {
                method,
                status: response.status_code,
                reason: response.status_text.clone(),
            })
        }
    }

    fn session_header(&self) -> Result<&str> {
        self.session_id
            .as_deref()
            .ok_or(PublishError::InvalidState("no session id yet"))
    }

    /// OPTIONS — liveness / method discovery. Must be the first request.
    pub fn options(&mut self, config: &PublisherConfig) -> Result<()> {
        if self.state != ClientState::Connected {
            return Err(PublishError::InvalidState("OPTIONS requires CONNECTED"));
        }
        let cseq = self.next_cseq();
        let req = RtspRequest::new("OPTIONS", config.rtsp_url()).add_header("CSeq", cseq.to_string());
        let resp = self.send(req);
        match resp {
            Ok(r) if r.is_success() => {
                self.state = ClientState::OptionsOk;
                Ok(())
            }
            Ok(r) => {
                self.state = ClientState::Failed;
                self.require_success("OPTIONS", &r)
            }
            Err(e) => {
                self.state = ClientState::Failed;
                Err(e)
            }
        }
    }

    /// ANNOUNCE — declare the publishing track via an SDP offer.
    pub fn announce(&mut self, config: &PublisherConfig, params: &ParameterSets) -> Result<()> {
        if self.state != ClientState::OptionsOk {
            return Err(PublishError::InvalidState("ANNOUNCE requires OPTIONS_OK"));
        }
        if !params.is_ready() {
            return Err(PublishError::ParameterSetsNotReady("SPS/PPS"));
        }

        let body = sdp::build_offer(
            &config.sdp_username,
            &config.sdp_session_name,
            &config.peer_host,
            config.client_rtp_port,
            params,
        );
        let cseq = self.next_cseq();
        let req = RtspRequest::new("ANNOUNCE", config.rtsp_url())
            .add_header("CSeq", cseq.to_string())
            .with_body(body);

        let resp = self.send(req)?;
        if !resp.is_success() {
            self.state = ClientState::Failed;
            return self.require_success("ANNOUNCE", &resp);
        }
        self.state = ClientState::Announced;
        Ok(())
    }

    /// SETUP — negotiate transport, returning the peer RTP port (falling
    /// back to `client_rtp_port` with a warning if the response omits
    /// `server_port`, per `spec.md` §4.5 scenario S4).
    pub fn setup(&mut self, config: &PublisherConfig) -> Result<u16> {
        if self.state != ClientState::Announced {
            return Err(PublishError::InvalidState("SETUP requires ANNOUNCED"));
        }

        let cseq = self.next_cseq();
        let transport = format!(
            "RTP/AVP/UDP;unicast;client_port={}-{};mode=record",
            config.client_rtp_port,
            config.client_rtp_port + 1
        );
        let uri = format!("{}/track0", config.rtsp_url());
        let req = RtspRequest::new("SETUP", uri)
            .add_header("CSeq", cseq.to_string())
            .add_header("Transport", transport);

        let resp = self.send(req)?;
        if !resp.is_success() {
            self.state = ClientState::Failed;
            return self.require_success("SETUP", &resp).map(|_| 0);
        }

        self.session_id = resp.session_id().map(str::to_string);
        if self.session_id.is_none() {
            self.state = ClientState::Failed;
            return Err(PublishError::InvalidState(
                "SETUP response missing Session header",
            ));
        }

        let server_rtp_port = resp.server_rtp_port().unwrap_or_else(|| {
            tracing::warn!(
                client_rtp_port = config.client_rtp_port,
                "SETUP response missing server_port, falling back to client_rtp_port"
            );
            config.client_rtp_port
        });

        self.state = ClientState::SetupOk;
        Ok(server_rtp_port)
    }

    /// RECORD — begin publishing.
    pub fn record(&mut self, config: &PublisherConfig) -> Result<()> {
        if self.state != ClientState::SetupOk {
            return Err(PublishError::InvalidState("RECORD requires SETUP_OK"));
        }
        let session = self.session_header()?.to_string();
        let cseq = self.next_cseq();
        let req = RtspRequest::new("RECORD", config.rtsp_url())
            .add_header("CSeq", cseq.to_string())
            .add_header("Session", session)
            .add_header("Range", "npt=0.000-");

        let resp = self.send(req)?;
        if !resp.is_success() {
            self.state = ClientState::Failed;
            return self.require_success("RECORD", &resp);
        }
        self.state = ClientState::Recording;
        tracing::info!("RTSP RECORD accepted, publishing");
        Ok(())
    }

    /// Run the full ANNOUNCE/SETUP/RECORD handshake (OPTIONS must already
    /// have been sent) and return the resulting session descriptor.
    pub fn publish(
        &mut self,
        config: &PublisherConfig,
        params: &ParameterSets,
        ssrc: u32,
    ) -> Result<SessionDescriptor> {
        self.options(config)?;
        self.announce(config, params)?;
        let peer_rtp_port = self.setup(config)?;
        self.record(config)?;

        Ok(SessionDescriptor {
            session_id: self.session_id.clone().unwrap_or_default(),
            peer_rtp_port,
            client_rtp_port: config.client_rtp_port,
            stream_path: config.stream_path.clone(),
            ssrc,
        })
    }

    /// TEARDOWN — best-effort; errors are logged and ignored (per
    /// `spec.md` §4.5's failure semantics for this one request).
    pub fn teardown(&mut self, config: &PublisherConfig) {
        if self.session_id.is_none() {
            return;
        }
        let cseq = self.next_cseq();
        let session = self.session_id.clone().unwrap_or_default();
        let req = RtspRequest::new("TEARDOWN", config.rtsp_url())
            .add_header("CSeq", cseq.to_string())
            .add_header("Session", session);

        match self.send(req) {
            Ok(resp) if resp.is_success() => {
                self.state = ClientState::Closed;
                tracing::info!("TEARDOWN acknowledged");
            }
            Ok(resp) => {
                tracing::warn!(status = resp.status_code, "TEARDOWN rejected, ignoring");
                self.state = ClientState::Closed;
            }
            Err(e) => {
                tracing::warn!(error = %e, "TEARDOWN failed, ignoring");
                self.state = ClientState::Closed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader as StdBufReader, Write as _};
    use std::net::TcpListener;
    use std::thread;

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

    fn spawn_mock_server<F>(handler: F) -> (TcpListener, u16)
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept_listener = listener.try_clone().unwrap();
        thread::spawn(move || {
            let (stream, _) = accept_listener.accept().unwrap();
            handler(stream);
        });
        (listener, port)
    }

    fn test_config(port: u16) -> PublisherConfig {
        PublisherConfig {
            peer_host: "127.0.0.1".into(),
            peer_rtsp_port: port,
            rtsp_timeout_ms: 2000,
            ..Default::default()
        }
    }

    fn ready_params() -> ParameterSets {
        ParameterSets {
            vps: vec![0x40, 0x01],
            sps: vec![0x42, 0x01],
            pps: vec![0x44, 0x01],
        }
    }

    #[test]
    fn s3_full_handshake_reaches_recording() {
        let (_listener, port) = spawn_mock_server(|stream| {
            let mut writer = stream.try_clone().unwrap();
            let mut reader = StdBufReader::new(stream);

            let _options = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").unwrap();

            let _announce = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n").unwrap();

            let _setup = read_request(&mut reader);
            writer
                .write_all(
                    b"RTSP/1.0 200 OK\r\nCSeq: 3\r\n\
                      Session: 1d4afe6f;timeout=60\r\n\
                      Transport: RTP/AVP/UDP;unicast;client_port=5004-5005;server_port=8000-8001\r\n\r\n",
                )
                .unwrap();

            let _record = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n").unwrap();
        });

        let config = test_config(port);
        let mut client = RtspClient::connect(&config).unwrap();
        let descriptor = client.publish(&config, &ready_params(), 0xAABBCCDD).unwrap();

        assert_eq!(client.state(), ClientState::Recording);
        assert_eq!(descriptor.session_id, "1d4afe6f");
        assert_eq!(descriptor.peer_rtp_port, 8000);
    }

    #[test]
    fn s4_setup_missing_server_port_falls_back_to_client_port() {
        let (_listener, port) = spawn_mock_server(|stream| {
            let mut writer = stream.try_clone().unwrap();
            let mut reader = StdBufReader::new(stream);

            let _options = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").unwrap();

            let _announce = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n").unwrap();

            let _setup = read_request(&mut reader);
            writer
                .write_all(
                    b"RTSP/1.0 200 OK\r\nCSeq: 3\r\n\
                      Session: abc123\r\n\
                      Transport: RTP/AVP/UDP;unicast;client_port=5004-5005\r\n\r\n",
                )
                .unwrap();

            let _record = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n").unwrap();
        });

        let config = test_config(port);
        let mut client = RtspClient::connect(&config).unwrap();
        let descriptor = client.publish(&config, &ready_params(), 0).unwrap();

        assert_eq!(descriptor.peer_rtp_port, config.client_rtp_port);
        assert_eq!(client.state(), ClientState::Recording);
    }

    #[test]
    fn non_200_on_announce_is_session_fatal() {
        let (_listener, port) = spawn_mock_server(|stream| {
            let mut writer = stream.try_clone().unwrap();
            let mut reader = StdBufReader::new(stream);

            let _options = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").unwrap();

            let _announce = read_request(&mut reader);
            writer
                .write_all(b"RTSP/1.0 454 Session Not Found\r\nCSeq: 2\r\n\r\n")
                .unwrap();
        });

        let config = test_config(port);
        let mut client = RtspClient::connect(&config).unwrap();
        let result = client.publish(&config, &ready_params(), 0);
        assert!(result.is_err());
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[test]
    fn record_before_setup_is_rejected() {
        let (_listener, port) = spawn_mock_server(|stream| {
            let mut writer = stream.try_clone().unwrap();
            let mut reader = StdBufReader::new(stream);
            let _options = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").unwrap();
        });

        let config = test_config(port);
        let mut client = RtspClient::connect(&config).unwrap();
        client.options(&config).unwrap();
        let err = client.record(&config).unwrap_err();
        assert!(matches!(err, PublishError::InvalidState(_)));
    }

    #[test]
    fn setup_before_announce_is_rejected() {
        let (_listener, port) = spawn_mock_server(|stream| {
            let mut writer = stream.try_clone().unwrap();
            let mut reader = StdBufReader::new(stream);
            let _options = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").unwrap();
        });

        let config = test_config(port);
        let mut client = RtspClient::connect(&config).unwrap();
        client.options(&config).unwrap();
        let err = client.setup(&config).unwrap_err();
        assert!(matches!(err, PublishError::InvalidState(_)));
        assert_eq!(client.state(), ClientState::OptionsOk);
    }

    #[test]
    fn record_and_teardown_always_carry_session_header() {
        let (_listener, port) = spawn_mock_server(|stream| {
            let mut writer = stream.try_clone().unwrap();
            let mut reader = StdBufReader::new(stream);

            let _options = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").unwrap();

            let _announce = read_request(&mut reader);
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n").unwrap();

            let _setup = read_request(&mut reader);
            writer
                .write_all(
                    b"RTSP/1.0 200 OK\r\nCSeq: 3\r\n\
                      Session: sess-42\r\n\
                      Transport: RTP/AVP/UDP;unicast;client_port=5004-5005;server_port=9000-9001\r\n\r\n",
                )
                .unwrap();

            let record = read_request(&mut reader);
            assert!(record.contains("Session: sess-42\r\n"), "RECORD missing Session header");
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 4\r\n\r\n").unwrap();

            let teardown = read_request(&mut reader);
            assert!(teardown.starts_with("TEARDOWN "));
            assert!(teardown.contains("Session: sess-42\r\n"), "TEARDOWN missing Session header");
            writer.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 5\r\n\r\n").unwrap();
        });

        let config = test_config(port);
        let mut client = RtspClient::connect(&config).unwrap();
        client.publish(&config, &ready_params(), 0xAABBCCDD).unwrap();
        client.teardown(&config);
        assert_eq!(client.state(), ClientState::Closed);
    }
}
