//! RTSP response parser (RFC 2326 §7).
//!
//! Structurally the mirror of the teacher's `protocol::request::RtspRequest::parse`
//! (status-line split, header map, case-insensitive `get_header`) — the
//! client is now the side consuming wire-format messages, plus
//! `Content-Length`-bounded body reads, which the teacher's request parser
//! explicitly left unimplemented (it never needed to read a request body).

use crate::error::{ParseErrorKind, PublishError, Result};

/// A parsed RTSP response.
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// \r\n
/// [body]
/// ```
#[derive(Debug)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspResponse {
    /// Parse the status line and headers from `head`, then read exactly
    /// `Content-Length` bytes of body (if present) from `body_reader`.
    pub fn parse(head: &str, body: Vec<u8>) -> Result<Self> {
        let mut lines = head.lines();

        let status_line = lines.next().ok_or(PublishError::Parse {
            kind: ParseErrorKind::EmptyResponse,
        })?;

        let parts: Vec<&str> = status_line.splitn(3, ' ').collect();
        if parts.len() < 3 {
            return Err(PublishError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            });
        }
        let status_code: u16 = parts[1].parse().map_err(|_| PublishError::Parse {
            kind: ParseErrorKind::InvalidStatusLine,
        })?;
        let status_text = parts[2].to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let colon_pos = line.find(':').ok_or(PublishError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        let body = if body.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&body).into_owned())
        };

        Ok(Self {
            status_code,
            status_text,
            headers,
            body,
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Content-Length`, if present and valid.
    pub fn content_length(&self) -> Result<Option<usize>> {
        match self.get_header("Content-Length") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| PublishError::Parse {
                    kind: ParseErrorKind::InvalidContentLength,
                }),
            None => Ok(None),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The session id from a `Session: <id>[;timeout=...]` header.
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    /// The peer RTP port from a SETUP response's `Transport` header
    /// (`...;server_port=<rtp>-<rtcp>...`).
    pub fn server_rtp_port(&self) -> Option<u16> {
        let transport = self.get_header("Transport")?;
        transport.split(';').find_map(|field| {
            let field = field.trim();
            let value = field.strip_prefix("server_port=")?;
            let port_str = value.split('-').next()?;
            port_str.parse::<u16>().ok()
        })
    }
}
