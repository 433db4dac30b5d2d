// Integration tests for the bundled capture sources
//
// WAV fixtures are generated into a temp dir with hound.

use anyhow::Result;
use chunk_relay::capture::{CaptureSource, SourceFactory, WavSourceFactory};
use chunk_relay::{CaptureMode, ChannelSource, WavFileSource};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Write a mono 16 kHz ramp and return its samples
fn write_ramp(path: &Path, samples: usize) -> Result<Vec<i16>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let ramp: Vec<i16> = (0..samples).map(|i| (i as i16).wrapping_mul(7)).collect();
    let mut writer = WavWriter::create(path, spec)?;
    for s in &ramp {
        writer.write_sample(*s)?;
    }
    writer.finalize()?;

    Ok(ramp)
}

fn fixture(dir: &TempDir, samples: usize) -> Result<(PathBuf, Vec<i16>)> {
    let path = dir.path().join("ramp.wav");
    let ramp = write_ramp(&path, samples)?;
    Ok((path, ramp))
}

#[tokio::test(start_paused = true)]
async fn test_wav_source_streams_pcm_in_slices() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // 100ms of audio
    let (path, ramp) = fixture(&temp_dir, 1600)?;

    let mut source = WavFileSource::new(&path, Duration::from_millis(10), false);
    assert!(!source.capabilities().has_video);

    let mut rx = source.start().await?;
    assert!(source.is_capturing());

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }

    // 10ms at 16 kHz mono 16-bit = 320 bytes
    assert_eq!(chunks.len(), 10);
    assert!(chunks.iter().all(|c| c.data.len() == 320));
    for pair in chunks.windows(2) {
        assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
    }

    let pcm: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
    let expected: Vec<u8> = ramp.iter().flat_map(|s| s.to_le_bytes()).collect();
    assert_eq!(pcm, expected);

    source.stop().await?;
    assert!(!source.is_capturing());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wav_source_stop_closes_stream() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (path, _) = fixture(&temp_dir, 1600)?;

    let mut source = WavFileSource::new(&path, Duration::from_millis(10), true);
    let mut rx = source.start().await?;

    assert!(rx.recv().await.is_some());
    source.stop().await?;

    // Whatever was in flight, then end of stream
    while rx.recv().await.is_some() {}
    assert!(!source.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_wav_source_missing_file() {
    let mut source = WavFileSource::new("/nonexistent/input.wav", Duration::from_millis(10), false);

    let err = source.start().await.unwrap_err();
    assert!(err.to_string().contains("Failed to open WAV file"));
}

#[test]
fn test_wav_factory_rejects_video() -> Result<()> {
    let factory = WavSourceFactory {
        path: PathBuf::from("input.wav"),
        buffer_duration: Duration::from_millis(100),
    };

    assert!(factory.create(CaptureMode::Screen).is_err());

    let source = factory.create(CaptureMode::Audio)?;
    assert_eq!(source.name(), "wav-file");

    Ok(())
}

#[tokio::test]
async fn test_channel_source_forwards_and_drops_while_paused() -> Result<()> {
    let (mut source, feed) = ChannelSource::new(CaptureMode::Screen);
    assert!(source.capabilities().has_video);
    assert_eq!(source.capabilities().mode(), CaptureMode::Screen);

    let mut rx = source.start().await?;
    assert!(source.is_capturing());

    feed.push(b"one".to_vec()).await?;
    assert_eq!(rx.recv().await.map(|c| c.data), Some(b"one".to_vec()));

    source.pause().await?;
    feed.push(b"dropped".to_vec()).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    source.resume().await?;
    feed.push(b"two".to_vec()).await?;

    assert_eq!(rx.recv().await.map(|c| c.data), Some(b"two".to_vec()));

    // Only one start per source
    assert!(source.start().await.is_err());

    source.stop().await?;
    assert!(rx.recv().await.is_none());
    assert!(!source.is_capturing());
    assert!(feed.push(b"late".to_vec()).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_dropping_feed_ends_channel_stream() -> Result<()> {
    let (mut source, feed) = ChannelSource::new(CaptureMode::Audio);
    let mut rx = source.start().await?;

    feed.push(vec![1, 2, 3]).await?;
    drop(feed);

    assert_eq!(rx.recv().await.map(|c| c.data), Some(vec![1, 2, 3]));
    assert!(rx.recv().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_channel_source_stop_flushes_pushed_data() -> Result<()> {
    let (mut source, feed) = ChannelSource::new(CaptureMode::Audio);
    let mut rx = source.start().await?;

    feed.push(b"first".to_vec()).await?;
    feed.push(b"second".to_vec()).await?;
    source.stop().await?;

    assert_eq!(rx.recv().await.map(|c| c.data), Some(b"first".to_vec()));
    assert_eq!(rx.recv().await.map(|c| c.data), Some(b"second".to_vec()));
    assert!(rx.recv().await.is_none());

    Ok(())
}
