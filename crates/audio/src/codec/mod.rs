//! G.711-Codecs ueber der PCM-Engine
//!
//! Duenne Uebersetzer zwischen 16-bit-Linear-PCM (little-endian) und den
//! 8-bit-Strmen A-law bzw. u-law. Die Codec-Sicht umhuellt die PCM-Engine
//! und exponiert dieselbe Schnittstelle mit halber Sample-Groesse; die
//! Geraete-Ein-/Ausgabe wird durchgereicht.

pub mod alaw;
pub mod ulaw;

use std::sync::Arc;

use crate::error::AudioResult;
use crate::interface::{AudioInterface, Packetizer, SampleFormat};
use crate::pcm::{PcmAudio, SAMPLE_SIZE};

/// Sample-Groesse der 8-bit-Codecs in Bytes (ein Byte pro PCM-Sample)
pub const CODEC_SAMPLE_SIZE: usize = SAMPLE_SIZE / 2;

/// Codec-Sicht auf die PCM-Engine
pub struct CodecAudio {
    inner: Arc<PcmAudio>,
    format: SampleFormat,
}

impl CodecAudio {
    /// Erstellt eine Codec-Sicht im gegebenen Format (A-law oder u-law)
    pub fn new(inner: Arc<PcmAudio>, format: SampleFormat) -> Self {
        debug_assert!(matches!(format, SampleFormat::Alaw | SampleFormat::Ulaw));
        tracing::debug!(?format, "Codec-Audio-Sicht erstellt");
        Self { inner, format }
    }

    /// CODEC -> PCM: ein 16-bit-Sample pro Codec-Byte
    fn convert_to_pcm(&self, input: &[u8], output: &mut [u8]) {
        for (i, &byte) in input.iter().enumerate() {
            let sample = match self.format {
                SampleFormat::Alaw => alaw::alaw2linear(byte),
                SampleFormat::Ulaw => ulaw::ulaw2linear(byte),
                SampleFormat::Lin16 => unreachable!(),
            };
            output[i * 2..i * 2 + 2].copy_from_slice(&sample.to_le_bytes());
        }
    }

    /// PCM -> CODEC: ein Codec-Byte pro 16-bit-Sample
    fn convert_from_pcm(&self, input: &[u8], output: &mut [u8]) {
        for i in 0..input.len() / 2 {
            let sample = i16::from_le_bytes([input[i * 2], input[i * 2 + 1]]);
            output[i] = match self.format {
                SampleFormat::Alaw => alaw::linear2alaw(sample),
                SampleFormat::Ulaw => ulaw::linear2ulaw(sample as i32),
                SampleFormat::Lin16 => unreachable!(),
            };
        }
    }
}

impl AudioInterface for CodecAudio {
    fn sample_size(&self) -> usize {
        CODEC_SAMPLE_SIZE
    }

    fn sample_format(&self) -> SampleFormat {
        self.format
    }

    fn read_with_timestamp(&self, buf: &mut [u8]) -> AudioResult<i64> {
        let mut pcm = [0u8; SAMPLE_SIZE];
        let ts = self.inner.read_with_timestamp(&mut pcm)?;
        let n = buf.len().min(CODEC_SAMPLE_SIZE);
        self.convert_from_pcm(&pcm[..n * 2], &mut buf[..n]);
        Ok(ts)
    }

    fn write_buffered(&self, buf: &[u8], timestamp_ms: i64) -> AudioResult<()> {
        let mut pcm = [0u8; SAMPLE_SIZE];
        let n = buf.len().min(CODEC_SAMPLE_SIZE);
        self.convert_to_pcm(&buf[..n], &mut pcm[..n * 2]);
        self.inner.write_buffered(&pcm[..n * 2], timestamp_ms)
    }

    fn write_directly(&self, buf: &[u8]) {
        let mut pcm = vec![0u8; buf.len() * 2];
        self.convert_to_pcm(buf, &mut pcm);
        self.inner.write_directly(&pcm);
    }

    fn start_recording(&self) -> i64 {
        self.inner.start_recording()
    }

    fn stop_recording(&self) {
        self.inner.stop_recording()
    }

    fn start_play(&self) {
        self.inner.start_play()
    }

    fn stop_play(&self) {
        self.inner.stop_play()
    }

    fn start_ringing(&self) {
        self.inner.start_ringing()
    }

    fn stop_ringing(&self) {
        self.inner.stop_ringing()
    }

    fn set_packetizer(&self, packetizer: Option<Box<dyn Packetizer>>) {
        self.inner.set_packetizer(packetizer)
    }

    fn by_format(self: Arc<Self>, format: SampleFormat) -> Arc<dyn AudioInterface> {
        Arc::clone(&self.inner).by_format(format)
    }

    fn shutdown(&self) {
        self.inner.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_sample_groesse() {
        assert_eq!(CODEC_SAMPLE_SIZE, 160);
    }

    #[test]
    fn by_format_liefert_codec_sicht() {
        let engine = PcmAudio::with_devices(None, None);
        let alaw = Arc::clone(&engine).by_format(SampleFormat::Alaw);
        assert_eq!(alaw.sample_size(), 160);
        assert_eq!(alaw.sample_format(), SampleFormat::Alaw);

        let lin = Arc::clone(&engine).by_format(SampleFormat::Lin16);
        assert_eq!(lin.sample_size(), 320);
    }

    #[test]
    fn alaw_pcm_konvertierung_round_trip_toleranz() {
        let engine = PcmAudio::with_devices(None, None);
        let codec = CodecAudio::new(engine, SampleFormat::Alaw);

        // Ein bekanntes Sample durch beide Richtungen schicken: A-law ist
        // verlustbehaftet, aber der Fehler bleibt klein relativ zum Pegel
        let mut pcm = [0u8; 8];
        for (i, s) in [1000i16, -1000, 8000, -8000].iter().enumerate() {
            pcm[i * 2..i * 2 + 2].copy_from_slice(&s.to_le_bytes());
        }
        let mut codiert = [0u8; 4];
        codec.convert_from_pcm(&pcm, &mut codiert);
        let mut zurueck = [0u8; 8];
        codec.convert_to_pcm(&codiert, &mut zurueck);

        for i in 0..4 {
            let orig = i16::from_le_bytes([pcm[i * 2], pcm[i * 2 + 1]]) as i32;
            let dec = i16::from_le_bytes([zurueck[i * 2], zurueck[i * 2 + 1]]) as i32;
            assert!(
                (orig - dec).abs() < orig.abs() / 8 + 64,
                "Sample {i}: {orig} -> {dec}"
            );
        }
    }
}
