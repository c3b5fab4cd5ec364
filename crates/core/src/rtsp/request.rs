//! RTSP request builder (RFC 2326 §6).
//!
//! Structurally the mirror of the teacher's `protocol::response::RtspResponse`
//! builder (`add_header`/`with_body`/`serialize`) — the client is now the
//! side constructing wire-format messages, so the builder pattern moves
//! from responses to requests.

/// A builder for one RTSP request.
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
#[must_use]
pub struct RtspRequest {
    method: &'static str,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl RtspRequest {
    pub fn new(method: &'static str, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn add_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// `Content-Length` is appended automatically when a body is present
    /// (RFC 2326 §12.14), matching the teacher's response serializer.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);

        for (name, value) in &self.headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }

        if let Some(body) = &self.body {
            request.push_str("Content-Type: application/sdp\r\n");
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
            request.push_str("\r\n");
            request.push_str(body);
        } else {
            request.push_str("\r\n");
        }
        request
    }
}
