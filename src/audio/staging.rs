//! Staging of uploaded audio for transcription.
//!
//! Uploads are written to a temporary file owned by a [`StagedAudio`] guard.
//! The file is removed when the guard is dropped, whether the request
//! succeeded or not. WAV uploads are rewritten as mono 16-bit PCM at the
//! original sample rate, which is what the transcription service expects;
//! compressed formats (webm, ogg, mp4, mp3) are passed through untouched.

use crate::error::{BotError, Result};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Container format of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Webm,
    Ogg,
    Mp4,
    Mp3,
}

impl AudioFormat {
    /// Detect the format from magic bytes, then from the file name.
    ///
    /// Browsers' `MediaRecorder` output (webm) is assumed when neither helps.
    pub fn detect(bytes: &[u8], file_name: Option<&str>) -> Self {
        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            return Self::Wav;
        }
        if bytes.starts_with(b"OggS") {
            return Self::Ogg;
        }
        if bytes.starts_with(&[0x1a, 0x45, 0xdf, 0xa3]) {
            return Self::Webm;
        }
        if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
            return Self::Mp4;
        }
        if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xff, 0xfb]) {
            return Self::Mp3;
        }

        let ext = file_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("wav") => Self::Wav,
            Some("ogg") | Some("oga") | Some("opus") => Self::Ogg,
            Some("mp4") | Some("m4a") => Self::Mp4,
            Some("mp3") => Self::Mp3,
            _ => Self::Webm,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Webm => "audio/webm",
            Self::Ogg => "audio/ogg",
            Self::Mp4 => "audio/mp4",
            Self::Mp3 => "audio/mpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Webm => "webm",
            Self::Ogg => "ogg",
            Self::Mp4 => "mp4",
            Self::Mp3 => "mp3",
        }
    }
}

/// Uploaded audio held in a temporary file for the lifetime of one request.
#[derive(Debug)]
pub struct StagedAudio {
    file: NamedTempFile,
    format: AudioFormat,
}

impl StagedAudio {
    /// Write `bytes` to a temporary file, normalising WAV to mono 16-bit PCM.
    ///
    /// Files go to `dir` when given, otherwise to the system temp directory.
    /// Blocking: call from `spawn_blocking` inside async handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be written or a WAV upload
    /// cannot be decoded.
    pub fn stage(bytes: &[u8], file_name: Option<&str>, dir: Option<&Path>) -> Result<Self> {
        let format = AudioFormat::detect(bytes, file_name);
        let mut raw = temp_file("festbot-upload-", format.extension(), dir)?;
        raw.write_all(bytes)?;
        raw.flush()?;

        let file = if format == AudioFormat::Wav {
            normalise_wav(raw.path(), dir)?
        } else {
            raw
        };

        debug!(
            "staged {} upload at {}",
            format.extension(),
            file.path().display()
        );
        Ok(Self { file, format })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// File name to present to the transcription service.
    pub fn file_name(&self) -> String {
        format!("audio.{}", self.format.extension())
    }

    /// Read the staged bytes back.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be read.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let handle = self.file.as_file_mut();
        handle.seek(SeekFrom::Start(0))?;
        let mut out = Vec::new();
        handle.read_to_end(&mut out)?;
        Ok(out)
    }
}

fn temp_file(prefix: &str, extension: &str, dir: Option<&Path>) -> Result<NamedTempFile> {
    let suffix = format!(".{extension}");
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(&suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    Ok(file)
}

/// Decode a WAV file and rewrite it as mono 16-bit PCM in a new temp file.
fn normalise_wav(path: &Path, dir: Option<&Path>) -> Result<NamedTempFile> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| BotError::Audio(format!("cannot decode WAV upload: {e}")))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(BotError::Audio("WAV upload has zero channels".to_owned()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map_err(|e| BotError::Audio(format!("WAV read error: {e}")))
                        .map(|v| v as f32 / max)
                })
                .collect::<Result<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| BotError::Audio(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?,
    };

    // Mix to mono.
    let ch = spec.channels as usize;
    let mono: Vec<f32> = if ch > 1 {
        samples
            .chunks(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    } else {
        samples
    };

    let out = temp_file("festbot-pcm-", "wav", dir)?;
    let out_spec = hound::WavSpec {
        channels: 1,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(out.path(), out_spec)
        .map_err(|e| BotError::Audio(format!("failed to create wav writer: {e}")))?;
    for s in mono {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer
            .write_sample(v)
            .map_err(|e| BotError::Audio(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| BotError::Audio(format!("failed to finalize wav: {e}")))?;
    Ok(out)
}
