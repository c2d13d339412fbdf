use cpal::traits::*;
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};
use hound::{SampleFormat as HoundSampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Samples used for the live level (~64ms at 16 kHz)
const LEVEL_WINDOW: usize = 1024;

/// Microphone capture for one utterance at a time, encoded to WAV on stop.
pub struct MicRecorder {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    samples: Arc<Mutex<Vec<f32>>>,
}

impl MicRecorder {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        log::info!("Audio host: {}", host.id().name());

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("No input device available".into()))?;
        log::info!("Using microphone: {}", device.name().unwrap_or_default());

        // Whisper is happiest with 16 kHz mono; otherwise take the device rate
        let mut config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(16_000),
            buffer_size: cpal::BufferSize::Default,
        };

        let supports_16k = device
            .supported_input_configs()
            .map(|mut it| {
                it.any(|c| {
                    c.channels() == 1
                        && c.min_sample_rate() <= SampleRate(16_000)
                        && c.max_sample_rate() >= SampleRate(16_000)
                })
            })
            .unwrap_or(false);

        if !supports_16k {
            let def_cfg = device
                .default_input_config()
                .map_err(|e| Error::Audio(e.to_string()))?;
            log::warn!(
                "16 kHz mono not supported - using {} Hz",
                def_cfg.sample_rate().0
            );
            config = def_cfg.into();
            config.channels = 1;
        }

        Ok(Self {
            device,
            config,
            stream: None,
            samples: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::Audio("Already recording".into()));
        }
        self.samples.lock().unwrap().clear();

        let sample_format = self
            .device
            .default_input_config()
            .map_err(|e| Error::Audio(e.to_string()))?
            .sample_format();

        let buf = self.samples.clone();
        let err_fn = |err| log::error!("Microphone stream error: {err}");

        let stream = match sample_format {
            SampleFormat::F32 => self.device.build_input_stream(
                &self.config,
                move |data: &[f32], _| buf.lock().unwrap().extend_from_slice(data),
                err_fn,
                None,
            ),
            SampleFormat::I16 => self.device.build_input_stream(
                &self.config,
                move |data: &[i16], _| {
                    buf.lock()
                        .unwrap()
                        .extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => self.device.build_input_stream(
                &self.config,
                move |data: &[u16], _| {
                    buf.lock()
                        .unwrap()
                        .extend(data.iter().map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0));
                },
                err_fn,
                None,
            ),
            other => return Err(Error::Audio(format!("Unsupported sample format {other:?}"))),
        }
        .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        log::debug!("Microphone open at {} Hz", self.sample_rate());
        Ok(())
    }

    /// Close the microphone and return the captured audio as WAV.
    pub fn stop(&mut self) -> Result<Vec<u8>> {
        if self.stream.take().is_none() {
            return Err(Error::Audio("Not recording".into()));
        }

        let samples = std::mem::take(&mut *self.samples.lock().unwrap());
        if samples.is_empty() {
            return Err(Error::Audio("No audio captured".into()));
        }
        encode_wav(&samples, self.sample_rate())
    }

    /// Close the microphone and throw the audio away.
    pub fn discard(&mut self) {
        if self.stream.take().is_some() {
            self.samples.lock().unwrap().clear();
        }
    }

    /// RMS of the most recent samples, 0.0 when idle.
    pub fn level(&self) -> f32 {
        if !self.is_recording() {
            return 0.0;
        }
        let samples = self.samples.lock().unwrap();
        let start = samples.len().saturating_sub(LEVEL_WINDOW);
        rms(&samples[start..])
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Encode mono float samples as 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: HoundSampleFormat::Int,
    };

    let mut wav_bytes = Vec::<u8>::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut wav_bytes), spec)
            .map_err(|e| Error::Audio(e.to_string()))?;
        for &s in samples {
            let s16 = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer
                .write_sample(s16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    log::debug!(
        "Encoded {:.1} KB WAV ({} samples @ {} Hz)",
        wav_bytes.len() as f32 / 1024.0,
        samples.len(),
        sample_rate
    );
    Ok(wav_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_encode_wav_header() {
        let wav = encode_wav(&[0.0, 0.25, -0.25, 1.5], 16_000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 4);
    }
}
