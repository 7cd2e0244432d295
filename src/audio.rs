//! Audio container encoding.
//!
//! The orchestrator hands over finite f32 samples; this module writes the
//! requested container. WAV is always available; MP3, FLAC, and Opus/Ogg
//! are feature-gated on their codec crates. AAC has no encoder in this
//! stack — requests validate, encoding reports the gap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TtsError};

/// Requested container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Flac,
    Ogg,
    Opus,
    Aac,
}

impl AudioFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Opus => "audio/opus",
            AudioFormat::Aac => "audio/aac",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = TtsError;

    /// Accepts the OpenAI names plus the usual aliases; a leading
    /// `audio/` prefix or `.` is stripped.
    fn from_str(s: &str) -> Result<Self> {
        let mut normalized = s.trim().to_lowercase();
        if let Some(rest) = normalized.strip_prefix("audio/") {
            normalized = rest.to_string();
        }
        if let Some(rest) = normalized.strip_prefix('.') {
            normalized = rest.to_string();
        }
        match normalized.as_str() {
            "mp3" | "mpeg" => Ok(AudioFormat::Mp3),
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "flac" => Ok(AudioFormat::Flac),
            "ogg" => Ok(AudioFormat::Ogg),
            "opus" => Ok(AudioFormat::Opus),
            "aac" | "m4a" => Ok(AudioFormat::Aac),
            _ => Err(TtsError::validation(format!("unsupported audio format '{s}'"))),
        }
    }
}

/// Clamp f32 samples into 16-bit PCM.
fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Encode mono samples into the requested container.
pub fn encode(samples: &[f32], sample_rate: u32, format: AudioFormat) -> Result<Vec<u8>> {
    match format {
        AudioFormat::Wav => encode_wav(samples, sample_rate),
        AudioFormat::Mp3 => encode_mp3(samples, sample_rate),
        AudioFormat::Flac => encode_flac(samples, sample_rate),
        AudioFormat::Ogg | AudioFormat::Opus => encode_opus_ogg(samples, sample_rate),
        AudioFormat::Aac => Err(TtsError::Encoding(
            "aac has no encoder in this build; request mp3, wav, flac, ogg, or opus".into(),
        )),
    }
}

/// 16-bit PCM WAV. Chosen over float WAV for maximum decoder compatibility.
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| TtsError::Encoding(format!("wav writer: {e}")))?;
        for value in to_i16(samples) {
            writer.write_sample(value).map_err(|e| TtsError::Encoding(format!("wav write: {e}")))?;
        }
        writer.finalize().map_err(|e| TtsError::Encoding(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(feature = "mp3")]
fn encode_mp3(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, MonoPcm, Quality};

    let mut builder =
        Builder::new().ok_or_else(|| TtsError::Encoding("lame init failed".into()))?;
    builder
        .set_num_channels(1)
        .map_err(|e| TtsError::Encoding(format!("lame channels: {e}")))?;
    builder
        .set_sample_rate(sample_rate)
        .map_err(|e| TtsError::Encoding(format!("lame sample rate: {e}")))?;
    builder
        .set_brate(Bitrate::Kbps128)
        .map_err(|e| TtsError::Encoding(format!("lame bitrate: {e}")))?;
    builder
        .set_quality(Quality::Good)
        .map_err(|e| TtsError::Encoding(format!("lame quality: {e}")))?;
    let mut encoder =
        builder.build().map_err(|e| TtsError::Encoding(format!("lame build: {e}")))?;

    let pcm = to_i16(samples);
    let mut out = Vec::new();
    encoder
        .encode_to_vec(MonoPcm(&pcm), &mut out)
        .map_err(|e| TtsError::Encoding(format!("mp3 encode: {e}")))?;
    encoder
        .flush_to_vec::<FlushNoGap>(&mut out)
        .map_err(|e| TtsError::Encoding(format!("mp3 flush: {e}")))?;
    Ok(out)
}

#[cfg(not(feature = "mp3"))]
fn encode_mp3(_samples: &[f32], _sample_rate: u32) -> Result<Vec<u8>> {
    Err(TtsError::Encoding("mp3 support not compiled in (enable the `mp3` feature)".into()))
}

#[cfg(feature = "flac")]
fn encode_flac(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    use flacenc::bitsink::ByteSink;
    use flacenc::component::BitRepr;
    use flacenc::error::Verify;

    let pcm: Vec<i32> = to_i16(samples).into_iter().map(i32::from).collect();
    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|_| TtsError::Encoding("flac config rejected".into()))?;
    let source = flacenc::source::MemSource::from_samples(&pcm, 1, 16, sample_rate as usize);
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| TtsError::Encoding(format!("flac encode: {e:?}")))?;

    let mut sink = ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| TtsError::Encoding(format!("flac write: {e:?}")))?;
    Ok(sink.as_slice().to_vec())
}

#[cfg(not(feature = "flac"))]
fn encode_flac(_samples: &[f32], _sample_rate: u32) -> Result<Vec<u8>> {
    Err(TtsError::Encoding("flac support not compiled in (enable the `flac` feature)".into()))
}

#[cfg(feature = "opus")]
fn encode_opus_ogg(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    use audiopus::coder::Encoder;
    use audiopus::{Application, Channels, SampleRate};
    use ogg::writing::{PacketWriteEndInfo, PacketWriter};

    let opus_rate = match sample_rate {
        8_000 => SampleRate::Hz8000,
        12_000 => SampleRate::Hz12000,
        16_000 => SampleRate::Hz16000,
        24_000 => SampleRate::Hz24000,
        48_000 => SampleRate::Hz48000,
        other => {
            return Err(TtsError::Encoding(format!("opus cannot encode {other} Hz input")));
        }
    };

    let mut encoder = Encoder::new(opus_rate, Channels::Mono, Application::Audio)
        .map_err(|e| TtsError::Encoding(format!("opus encoder: {e}")))?;

    // 20 ms frames; granule positions count 48 kHz samples.
    let frame = (sample_rate / 50) as usize;
    let granule_per_frame = 960u64;

    let pcm = to_i16(samples);
    let mut sink = std::io::Cursor::new(Vec::new());
    let mut writer = PacketWriter::new(&mut sink);
    let serial = 0x7653_u32;

    writer
        .write_packet(opus_head(sample_rate), serial, PacketWriteEndInfo::EndPage, 0)
        .map_err(|e| TtsError::Encoding(format!("ogg head: {e}")))?;
    writer
        .write_packet(opus_tags(), serial, PacketWriteEndInfo::EndPage, 0)
        .map_err(|e| TtsError::Encoding(format!("ogg tags: {e}")))?;

    let mut granule = 0u64;
    let mut output = vec![0u8; 4096];
    let chunks: Vec<&[i16]> = pcm.chunks(frame).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        // Zero-pad the final short frame to a full 20 ms.
        let padded;
        let frame_pcm: &[i16] = if chunk.len() == frame {
            chunk
        } else {
            padded = {
                let mut p = chunk.to_vec();
                p.resize(frame, 0);
                p
            };
            &padded
        };

        let written = encoder
            .encode(frame_pcm, &mut output)
            .map_err(|e| TtsError::Encoding(format!("opus encode: {e}")))?;
        granule += granule_per_frame;

        let end = if i + 1 == chunks.len() {
            PacketWriteEndInfo::EndStream
        } else {
            PacketWriteEndInfo::NormalPacket
        };
        writer
            .write_packet(output[..written].to_vec(), serial, end, granule)
            .map_err(|e| TtsError::Encoding(format!("ogg packet: {e}")))?;
    }

    drop(writer);
    Ok(sink.into_inner())
}

#[cfg(feature = "opus")]
fn opus_head(sample_rate: u32) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(1); // channel count
    head.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&sample_rate.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes()); // output gain
    head.push(0); // channel mapping family
    head
}

#[cfg(feature = "opus")]
fn opus_tags() -> Vec<u8> {
    let vendor = env!("CARGO_PKG_NAME");
    let mut tags = Vec::new();
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor.as_bytes());
    tags.extend_from_slice(&0u32.to_le_bytes()); // no user comments
    tags
}

#[cfg(not(feature = "opus"))]
fn encode_opus_ogg(_samples: &[f32], _sample_rate: u32) -> Result<Vec<u8>> {
    Err(TtsError::Encoding("opus support not compiled in (enable the `opus` feature)".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05).sin() * 0.4).collect()
    }

    #[test]
    fn format_parsing() {
        assert_eq!("mp3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!("MPEG".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!("wave".parse::<AudioFormat>().unwrap(), AudioFormat::Wav);
        assert_eq!("audio/flac".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
        assert_eq!(".opus".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
        assert_eq!("m4a".parse::<AudioFormat>().unwrap(), AudioFormat::Aac);
        assert!("midi".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn wav_header_written() {
        let bytes = encode(&tone(2400), 24_000, AudioFormat::Wav).expect("wav");
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 16-bit mono payload follows the 44-byte header.
        assert_eq!(bytes.len(), 44 + 2400 * 2);
    }

    #[test]
    fn aac_reports_missing_encoder() {
        let err = encode(&tone(100), 24_000, AudioFormat::Aac).unwrap_err();
        assert_eq!(err.kind(), "encoding_error");
    }

    #[test]
    fn clamping_out_of_range_samples() {
        let bytes = encode(&[2.0, -2.0, 0.0], 24_000, AudioFormat::Wav).expect("wav");
        let data = &bytes[44..];
        let first = i16::from_le_bytes([data[0], data[1]]);
        let second = i16::from_le_bytes([data[2], data[3]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(second, -i16::MAX);
    }

    #[cfg(feature = "mp3")]
    #[test]
    fn mp3_produces_frames() {
        let bytes = encode(&tone(24_000), 24_000, AudioFormat::Mp3).expect("mp3");
        assert!(!bytes.is_empty());
    }

    #[cfg(feature = "flac")]
    #[test]
    fn flac_magic() {
        let bytes = encode(&tone(24_000), 24_000, AudioFormat::Flac).expect("flac");
        assert_eq!(&bytes[..4], b"fLaC");
    }

    #[cfg(feature = "opus")]
    #[test]
    fn ogg_magic() {
        let bytes = encode(&tone(24_000), 24_000, AudioFormat::Opus).expect("opus");
        assert_eq!(&bytes[..4], b"OggS");
    }
}
