//! Command-line driver: reads an H.265 Annex-B elementary stream from a
//! file and publishes it over RTSP/RTP to a remote server.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;

use rtsp_publish::nal::{NAL_TYPE_PPS, NAL_TYPE_SPS, NAL_TYPE_VPS, nal_type, split_annex_b};
use rtsp_publish::{AccessUnit, EncoderSink, PublisherConfig, Supervisor};

/// Lowest IRAP (keyframe) NAL type, inclusive (H.265 Table 7-1).
const NAL_TYPE_IRAP_MIN: u8 = 16;
/// Highest IRAP (keyframe) NAL type, inclusive.
const NAL_TYPE_IRAP_MAX: u8 = 23;

#[derive(Parser)]
#[command(
    name = "rtsp-publish",
    about = "Publish an H.265 Annex-B elementary stream over RTSP/RTP"
)]
struct Args {
    /// Path to an H.265 Annex-B elementary stream (.265/.hevc).
    input: PathBuf,

    /// RTSP server hostname or IP to publish to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// RTSP server TCP port.
    #[arg(long, default_value_t = 8554)]
    port: u16,

    /// Stream path component of the RTSP URL.
    #[arg(long, default_value = "/android")]
    path: String,

    /// Local UDP port announced in SETUP as `client_port`.
    #[arg(long, default_value_t = 5004)]
    client_rtp_port: u16,

    /// Maximum RTP datagram size, header included.
    #[arg(long, default_value_t = 1400)]
    mtu: usize,

    /// Assumed frame rate of the input stream, for access-unit pacing.
    #[arg(long, default_value_t = 25.0)]
    fps: f64,

    /// Replay the input file repeatedly instead of stopping at EOF.
    #[arg(long = "loop")]
    repeat: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let data = match std::fs::read(&args.input) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.input.display());
            std::process::exit(1);
        }
    };

    let nals = split_annex_b(&data);
    if nals.is_empty() {
        eprintln!("no NAL units found in {} (expected Annex-B framing)", args.input.display());
        std::process::exit(1);
    }

    let split = nals.iter().position(|nal| {
        !matches!(nal_type(nal[0]), NAL_TYPE_VPS | NAL_TYPE_SPS | NAL_TYPE_PPS)
    }).unwrap_or(nals.len());
    let (param_nals, picture_nals) = nals.split_at(split);

    let config = PublisherConfig {
        peer_host: args.host,
        peer_rtsp_port: args.port,
        stream_path: args.path,
        client_rtp_port: args.client_rtp_port,
        mtu: args.mtu,
        ..Default::default()
    };

    let supervisor = match Supervisor::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to initialize publisher: {e}");
            std::process::exit(1);
        }
    };

    if !param_nals.is_empty() {
        let mut codec_config = Vec::new();
        for nal in param_nals {
            codec_config.extend_from_slice(&[0, 0, 0, 1]);
            codec_config.extend_from_slice(nal);
        }
        supervisor
            .push(AccessUnit {
                data: &codec_config,
                pts_us: 0,
                is_keyframe: false,
                is_codec_config: true,
            })
            .expect("pushing codec-config access unit never fails");
    } else {
        tracing::warn!("no VPS/SPS/PPS found before the first picture NAL unit");
    }

    if let Err(e) = supervisor.start() {
        eprintln!("failed to start publisher: {e}");
        std::process::exit(1);
    }

    let frame_interval = Duration::from_secs_f64(1.0 / args.fps);
    let mut pts_us: u64 = 0;

    tracing::info!("publisher started, awaiting RTSP handshake");

    loop {
        for nal in picture_nals {
            let is_keyframe = (NAL_TYPE_IRAP_MIN..=NAL_TYPE_IRAP_MAX).contains(&nal_type(nal[0]));
            supervisor
                .push(AccessUnit {
                    data: nal,
                    pts_us,
                    is_keyframe,
                    is_codec_config: false,
                })
                .expect("pushing a picture access unit never fails");
            pts_us += frame_interval.as_micros() as u64;
            thread::sleep(frame_interval);
        }
        if !args.repeat {
            break;
        }
    }

    let health = supervisor.health();
    tracing::info!(
        packets_sent = health.packets_sent,
        packets_dropped = health.packets_dropped,
        send_errors = health.send_errors,
        healthy = health.is_healthy(),
        "publishing finished"
    );

    supervisor.stop();
}
