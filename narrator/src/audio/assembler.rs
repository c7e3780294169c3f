//! Joins synthesized segments into one file.
//!
//! WAV is written in-process with `hound`; MP3 and M4B are transcoded from a
//! WAV intermediate with FFmpeg. Output always goes to a temporary file next
//! to the destination and is renamed into place only once complete.

use super::metadata::BookMetadata;
use crate::error::{ConvertError, Result};
use crate::job::OutputFormat;
use crate::synth::AudioSegment;
use std::borrow::Cow;
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    /// Silence between consecutive segments
    pub pause_ms: u32,
    /// Resample segments at other rates instead of failing
    pub resample: bool,
    pub format: OutputFormat,
    /// Tags and chapters for transcoded formats
    pub metadata: Option<BookMetadata>,
}

/// The written output file
#[derive(Debug, Clone)]
pub struct AssembledAudio {
    pub path: PathBuf,
    pub duration: Duration,
    pub sample_count: usize,
}

/// Concatenate `segments` in the given order and write them to `output`.
pub fn assemble(
    segments: &[AudioSegment],
    sample_rate: u32,
    output: &Path,
    options: &AssemblyOptions,
) -> Result<AssembledAudio> {
    if segments.is_empty() {
        return Err(ConvertError::InvalidConfig(
            "no audio segments to assemble".into(),
        ));
    }
    if sample_rate == 0 {
        return Err(ConvertError::InvalidConfig(
            "sample rate must be greater than 0".into(),
        ));
    }

    let conformed = segments
        .iter()
        .map(|segment| conform(segment, sample_rate, options.resample))
        .collect::<Result<Vec<_>>>()?;

    let pause = (sample_rate as u64 * options.pause_ms as u64 / 1000) as usize;
    let (samples, lengths) = concatenate(&conformed, pause);

    let parent = output_parent(output);
    if !parent.is_dir() {
        return Err(ConvertError::output_write(
            output,
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory {} does not exist", parent.display()),
            ),
        ));
    }

    let tmp = match options.format {
        OutputFormat::Wav => write_wav_temp(&samples, sample_rate, parent)
            .map_err(|e| ConvertError::output_write(output, e))?,
        format => transcode(&samples, sample_rate, &lengths, format, options, parent)
            .map_err(|e| ConvertError::output_write(output, e))?,
    };

    tmp.persist(output)
        .map_err(|e| ConvertError::output_write(output, e.error))?;

    let duration = samples_duration(samples.len(), sample_rate);
    log::info!(
        "Wrote {} ({} samples, {:.1}s of audio)",
        output.display(),
        samples.len(),
        duration.as_secs_f64()
    );

    Ok(AssembledAudio {
        path: output.to_path_buf(),
        duration,
        sample_count: samples.len(),
    })
}

/// Exact playback length of `len` samples
pub(crate) fn samples_duration(len: usize, sample_rate: u32) -> Duration {
    Duration::from_nanos(len as u64 * 1_000_000_000 / sample_rate.max(1) as u64)
}

fn output_parent(output: &Path) -> &Path {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Bring a segment to the target rate, or reject it
fn conform(segment: &AudioSegment, sample_rate: u32, resample: bool) -> Result<Cow<'_, [f32]>> {
    if segment.sample_rate == sample_rate {
        return Ok(Cow::Borrowed(segment.samples.as_slice()));
    }
    if !resample || segment.sample_rate == 0 {
        return Err(ConvertError::SampleRateMismatch {
            index: segment.index,
            expected: sample_rate,
            actual: segment.sample_rate,
        });
    }

    log::debug!(
        "Resampling chunk {} from {} Hz to {} Hz",
        segment.index,
        segment.sample_rate,
        sample_rate
    );
    Ok(Cow::Owned(resample_linear(
        &segment.samples,
        segment.sample_rate,
        sample_rate,
    )))
}

/// Linear-interpolation resampling of mono samples
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).round() as usize;
    let last = samples.len() - 1;

    (0..new_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let idx = (src_pos as usize).min(last);
            let frac = (src_pos - idx as f64) as f32;
            let s0 = samples[idx];
            let s1 = samples[(idx + 1).min(last)];
            s0 + (s1 - s0) * frac
        })
        .collect()
}

/// Join segments with `pause` samples of silence between them.
///
/// Also returns each segment's share of the timeline (pause included).
fn concatenate(segments: &[Cow<'_, [f32]>], pause: usize) -> (Vec<f32>, Vec<usize>) {
    let total: usize =
        segments.iter().map(|s| s.len()).sum::<usize>() + pause * segments.len().saturating_sub(1);
    let mut samples = Vec::with_capacity(total);
    let mut lengths = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        samples.extend_from_slice(segment);
        let mut len = segment.len();
        if i + 1 < segments.len() {
            samples.resize(samples.len() + pause, 0.0);
            len += pause;
        }
        lengths.push(len);
    }

    (samples, lengths)
}

fn temp_in(parent: &Path, suffix: &str) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(".narrate-")
        .suffix(suffix)
        .tempfile_in(parent)
}

fn write_wav_temp(samples: &[f32], sample_rate: u32, parent: &Path) -> io::Result<NamedTempFile> {
    let mut tmp = temp_in(parent, ".wav")?;
    write_wav(BufWriter::new(tmp.as_file_mut()), samples, sample_rate)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Write 16-bit mono PCM
fn write_wav<W: Write + Seek>(writer: W, samples: &[f32], sample_rate: u32) -> io::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = hound::WavWriter::new(writer, spec).map_err(hound_to_io)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        wav.write_sample(value).map_err(hound_to_io)?;
    }
    wav.finalize().map_err(hound_to_io)
}

fn hound_to_io(err: hound::Error) -> io::Error {
    match err {
        hound::Error::IoError(e) => e,
        other => io::Error::other(other.to_string()),
    }
}

fn ffmpeg_command() -> io::Result<Command> {
    let path = which::which("ffmpeg").map_err(|_| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "ffmpeg not found in PATH (needed for mp3/m4b output)",
        )
    })?;
    Ok(Command::new(path))
}

/// Encode through FFmpeg into a temp file beside the destination
fn transcode(
    samples: &[f32],
    sample_rate: u32,
    segment_lengths: &[usize],
    format: OutputFormat,
    options: &AssemblyOptions,
    parent: &Path,
) -> io::Result<NamedTempFile> {
    let mut cmd = ffmpeg_command()?;

    let work_dir = tempfile::Builder::new()
        .prefix(".narrate-work-")
        .tempdir_in(parent)?;
    let wav_path = work_dir.path().join("narration.wav");
    write_wav(
        BufWriter::new(std::fs::File::create(&wav_path)?),
        samples,
        sample_rate,
    )?;

    cmd.args(["-y", "-loglevel", "error", "-i"]).arg(&wav_path);

    if let Some(book) = &options.metadata {
        let chapters = if format == OutputFormat::M4b {
            book.chapter_spans(segment_lengths, sample_rate)
        } else {
            Vec::new()
        };
        let metadata_path = work_dir.path().join("metadata.txt");
        book.write_ffmetadata(&chapters, &metadata_path)?;
        cmd.arg("-i")
            .arg(&metadata_path)
            .args(["-map", "0:a", "-map_metadata", "1"]);
    }

    match format {
        OutputFormat::M4b => cmd.args(["-c:a", "aac", "-b:a", "128k", "-f", "mp4"]),
        _ => cmd.args(["-c:a", "libmp3lame", "-q:a", "4", "-f", "mp3"]),
    };

    let tmp = temp_in(parent, &format!(".{}", format.extension()))?;
    let output = cmd.arg(tmp.path()).output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!(
            "ffmpeg {} encoding failed: {}",
            format,
            stderr.trim()
        )));
    }

    Ok(tmp)
}
