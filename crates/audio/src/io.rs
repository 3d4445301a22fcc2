use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::AudioError;

/// Decoded PCM, interleaved by frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Samples of one channel, de-interleaved.
    pub fn channel(&self, index: usize) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        self.samples
            .iter()
            .skip(index)
            .step_by(channels)
            .copied()
            .collect()
    }
}

pub struct AudioDecoder;

impl AudioDecoder {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DecodedAudio, AudioError> {
        let path_ref = path.as_ref();
        let decode_err = |source| AudioError::Decode {
            path: path_ref.to_path_buf(),
            source,
        };
        let file = File::open(path_ref).map_err(|source| AudioError::Open {
            path: path_ref.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path_ref.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(decode_err)?;
        let mut format = probed.format;
        let track = format.default_track().ok_or_else(|| AudioError::NoTrack {
            path: path_ref.to_path_buf(),
        })?;
        let track_id = track.id;
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(decode_err)?;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);
        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphError::ResetRequired) => break,
                Err(err) => return Err(decode_err(err)),
            };
            if packet.track_id() != track_id {
                continue;
            }
            match decoder.decode(&packet) {
                Ok(buffer) => {
                    let spec = *buffer.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;
                    let mut out = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
                    out.copy_interleaved_ref(buffer);
                    samples.extend_from_slice(out.samples());
                }
                Err(SymphError::DecodeError(reason)) => {
                    // skip undecodable packet
                    debug!(path = %path_ref.display(), reason, "skipping packet");
                }
                Err(err) => return Err(decode_err(err)),
            }
        }

        Ok(DecodedAudio {
            sample_rate,
            channels,
            samples,
        })
    }
}

/// Writes interleaved samples as 32-bit float WAV, creating parent directories.
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<(), AudioError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| AudioError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let write_err = |source| AudioError::Write {
        path: path.to_path_buf(),
        source,
    };
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(write_err)?;
    for sample in samples {
        writer.write_sample(*sample).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)?;
    debug!(path = %path.display(), frames = samples.len() / channels.max(1) as usize, "wrote wav");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_reader_handles_missing_file() {
        let result = AudioDecoder::open("does-not-exist.wav");
        assert!(matches!(result, Err(AudioError::Open { .. })));
    }

    #[test]
    fn decodes_interleaved_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(i16::MAX / 2).unwrap();
            writer.write_sample(-(i16::MAX / 4)).unwrap();
        }
        writer.finalize().unwrap();

        let audio = AudioDecoder::open(&path).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.frames(), 100);
        let left = audio.channel(0);
        let right = audio.channel(1);
        assert!(left.iter().all(|s| (*s - 0.5).abs() < 1e-3));
        assert!(right.iter().all(|s| (*s + 0.25).abs() < 1e-3));
    }

    #[test]
    fn float_wav_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mono.wav");
        let samples: Vec<f32> = (0..64).map(|i| i as f32 / 128.0).collect();
        write_wav(&path, &samples, 44_100, 1).unwrap();

        let audio = AudioDecoder::open(&path).unwrap();
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.sample_rate, 44_100);
        assert_eq!(audio.samples.len(), 64);
        approx::assert_abs_diff_eq!(audio.samples[10], 10.0 / 128.0, epsilon = 1e-6);
    }
}
