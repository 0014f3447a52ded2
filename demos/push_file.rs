//! Push an elementary stream file pair to an HTTP-FLV ingest server
//!
//! Run with:
//! cargo run --example push_file -- <url> <video.h264> [audio.aac] [fps]
//!
//! e.g. against SRS:
//! cargo run --example push_file -- http://127.0.0.1:8936/live/livestream.flv in.h264 in.aac 25
//!
//! The video file must be an H.264 Annex-B byte stream; each slice ends an
//! access unit, parameter sets travel with the slice that follows them. The
//! optional audio file must be ADTS framed. Samples are paced in real time.

use std::path::PathBuf;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use httpflv_push::media::{AacFrameHeader, AdtsDemuxer, AnnexBDemuxer, NaluUnit};
use httpflv_push::{FlvPusher, PusherConfig, Track};

/// AAC frames carry 1024 samples each
const SAMPLES_PER_AAC_FRAME: u64 = 1024;

fn print_usage() {
    println!("Usage: push_file <url> <video.h264> [audio.aac] [fps]");
}

/// Group Annex-B units into access units, re-prefixed with start codes.
fn access_units(data: Bytes) -> Result<Vec<Bytes>, Box<dyn std::error::Error>> {
    let mut units = Vec::new();
    let mut current = BytesMut::new();

    for nalu in AnnexBDemuxer::new(data) {
        let nalu: NaluUnit = nalu?;
        current.put_slice(&[0x00, 0x00, 0x00, 0x01]);
        current.put_slice(&nalu.data);

        // slices (types 1..=5) close the access unit
        if (1..=5).contains(&nalu.nal_type) {
            units.push(current.split().freeze());
        }
    }
    Ok(units)
}

/// Split an ADTS stream into whole frames, headers included.
fn adts_frames(data: Bytes) -> Vec<(AacFrameHeader, Bytes)> {
    let mut frames = Vec::new();
    let mut offset = 0;
    for frame in AdtsDemuxer::new(data.clone()) {
        let len = frame.header.frame_length as usize;
        frames.push((frame.header, data.slice(offset..offset + len)));
        offset += len;
    }
    frames
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("httpflv_push=info".parse()?)
                .add_directive("push_file=info".parse()?),
        )
        .init();

    let url = args[1].clone();
    let video_path = PathBuf::from(&args[2]);
    let audio_path = args.get(3).map(PathBuf::from);
    let fps: u64 = args.get(4).map(|s| s.parse()).transpose()?.unwrap_or(25);

    let video = access_units(Bytes::from(tokio::fs::read(&video_path).await?))?;
    let audio: Vec<_> = match &audio_path {
        Some(path) => adts_frames(Bytes::from(tokio::fs::read(path).await?)),
        None => Vec::new(),
    };

    let mut config = PusherConfig::new(url);
    let first_audio: Option<AacFrameHeader> = audio.first().map(|(header, _)| *header);
    if let Some(header) = first_audio {
        let channels = if header.channel_configuration == 2 { 2 } else { 1 };
        config = config.with_audio(header.sound_rate().to_hz(), channels);
    }
    let sample_rate = config.audio_sample_rate as u64;

    let (mut pusher, mut events) = FlvPusher::new(config);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(?event, "push event");
        }
    });
    pusher.start()?;

    tracing::info!(
        video_samples = video.len(),
        audio_samples = audio.len(),
        fps,
        "pushing {}",
        video_path.display()
    );

    let frame_ms = 1000 / fps.max(1);
    let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
    let mut audio_iter = audio.into_iter().enumerate().peekable();

    for (i, access_unit) in video.into_iter().enumerate() {
        ticker.tick().await;
        let video_pts = i as u64 * frame_ms;

        while let Some((n, _)) = audio_iter.peek() {
            let audio_pts = *n as u64 * SAMPLES_PER_AAC_FRAME * 1000 / sample_rate;
            if audio_pts > video_pts {
                break;
            }
            // whole ADTS frames; the first one also announces the stream
            if let Some((_, (_, frame))) = audio_iter.next() {
                pusher.submit(Track::Audio, frame, audio_pts as u32);
            }
        }

        pusher.submit(Track::Video, access_unit, video_pts as u32);
    }

    if let Some(stats) = pusher.finish().await {
        println!(
            "sent {} tags ({} bytes), dropped {}, {} connects",
            stats.frames_sent, stats.bytes_sent, stats.dropped_frames, stats.connects
        );
    }
    Ok(())
}
