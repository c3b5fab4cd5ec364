//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Unlike the teacher's `protocol::sdp::generate_sdp`, which builds a
//! *playback* offer (`a=sendonly`) for a DESCRIBE response, this builds a
//! *publish* offer (`a=type:broadcast`) carried as the body of an
//! ANNOUNCE request — the SDP direction is inverted along with the RTSP
//! request direction, but the line-accumulation + `\r\n`-join construction
//! style is unchanged.
//!
//! ```text
//! v=0
//! o=- 0 0 IN IP4 127.0.0.1
//! s=<session name>
//! c=IN IP4 <peer host>
//! t=0 0
//! a=tool:<tool>
//! a=type:broadcast
//! a=control:*
//! m=video <client_rtp_port> RTP/AVP 96
//! a=rtpmap:96 H265/90000
//! a=fmtp:96 sprop-vps=...;sprop-sps=...;sprop-pps=...
//! a=control:track0
//! ```

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::paramset::ParameterSets;

const TOOL_NAME: &str = "rtsp-publish";
const PAYLOAD_TYPE: u8 = 96;
const CLOCK_RATE: u32 = 90_000;

/// Build a publish-direction SDP offer for one H.265 video track.
///
/// `sprop-vps` is omitted from the `fmtp` line when `params.vps` is empty.
pub fn build_offer(
    username: &str,
    session_name: &str,
    peer_host: &str,
    client_rtp_port: u16,
    params: &ParameterSets,
) -> String {
    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!("o={username} 0 0 IN IP4 127.0.0.1"));
    sdp.push(format!("s={session_name}"));
    sdp.push(format!("c=IN IP4 {peer_host}"));
    sdp.push("t=0 0".to_string());
    sdp.push(format!("a=tool:{TOOL_NAME}"));
    sdp.push("a=type:broadcast".to_string());
    sdp.push("a=control:*".to_string());
    sdp.push(format!(
        "m=video {client_rtp_port} RTP/AVP {PAYLOAD_TYPE}"
    ));
    sdp.push(format!("a=rtpmap:{PAYLOAD_TYPE} H265/{CLOCK_RATE}"));
    sdp.push(format!("a=fmtp:{PAYLOAD_TYPE} {}", fmtp_params(params)));
    sdp.push("a=control:track0".to_string());

    tracing::debug!("SDP offer: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

fn fmtp_params(params: &ParameterSets) -> String {
    let mut parts = Vec::with_capacity(3);
    if !params.vps.is_empty() {
        parts.push(format!("sprop-vps={}", BASE64_STANDARD.encode(&params.vps)));
    }
    parts.push(format!("sprop-sps={}", BASE64_STANDARD.encode(&params.sps)));
    parts.push(format!("sprop-pps={}", BASE64_STANDARD.encode(&params.pps)));
    parts.join(";")
}
