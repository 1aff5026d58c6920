// Integration tests for WAV file loading and the rendered output timeline
//
// Fixtures are written with hound into a temporary directory.

use anyhow::Result;
use parkeasy::audio::{AudioFile, OutputDevice, PcmBuffer, WavRenderOutput};
use std::path::Path;

fn write_fixture(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("question.wav");
    write_fixture(&path, &vec![0i16; 48000], 48000, 2)?;

    let audio = AudioFile::open(&path)?;

    assert!((audio.duration_seconds - 0.5).abs() < 1e-9);
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 48000);
    assert!(audio.path.contains("question.wav"));

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_stereo_downmix_and_resample() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stereo.wav");
    // Left at +half scale, right silent
    let samples: Vec<i16> = (0..32000).map(|i| if i % 2 == 0 { 16384 } else { 0 }).collect();
    write_fixture(&path, &samples, 32000, 2)?;

    let audio = AudioFile::open(&path)?;
    let mono = audio.to_mono_f32();
    assert_eq!(mono.len(), 16000);
    assert!((mono[0] - 0.25).abs() < 1e-6);

    let resampled = audio.mono_at_rate(16000);
    assert_eq!(resampled.len(), 8000);
    assert!(resampled.iter().all(|&s| (s - 0.25).abs() < 1e-6));

    Ok(())
}

#[test]
fn test_rendered_timeline_written_as_wav() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("reply.wav");

    let mut output = WavRenderOutput::new(24000);
    let timeline = output.timeline();

    output.start(&PcmBuffer::mono(vec![0.5; 2400], 24000), 0.0)?;
    output.start(&PcmBuffer::mono(vec![0.5; 2400], 24000), 0.1)?;
    assert_eq!(timeline.segment_count(), 2);

    let written = timeline.write_wav(&path)?;
    assert_eq!(written, 4800);

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.sample_rate, 24000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 4800);
    assert_eq!(audio.samples[2400], 16384);

    Ok(())
}

#[test]
fn test_render_output_rejects_other_rates() {
    let mut output = WavRenderOutput::new(24000);
    let result = output.start(&PcmBuffer::mono(vec![0.0; 160], 16000), 0.0);
    assert!(result.is_err());
}
