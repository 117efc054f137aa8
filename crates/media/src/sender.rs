//! Voice-Sender: paketiert den 50-Hz-Aufnahmestrom
//!
//! Wird pro etabliertem Anruf erstellt und in den Sende-Takt des
//! Audio-Subsystems eingehaengt. Der PDU-Zeitstempel ist nicht die
//! Geraeteuhr, sondern der monoton wachsende Soll-Zeitpunkt
//! (`next_due_ts`, +20 ms pro Frame).

use std::sync::Arc;

use fluesterfon_audio::{AudioInterface, Packetizer, SampleFormat, FRAME_INTERVAL_MS};
use fluesterfon_protocol::{Pdu, VoiceFormat};

use crate::call::CallContext;

/// Paketierer eines Anrufs
pub struct VoiceSender {
    audio: Arc<dyn AudioInterface>,
    call: Arc<CallContext>,
    format: VoiceFormat,
    buffer: Vec<u8>,
    next_due_ts: u64,
}

impl VoiceSender {
    /// Erstellt den Sender ueber Audio-Interface und Anruf
    pub fn new(audio: Arc<dyn AudioInterface>, call: Arc<CallContext>) -> Self {
        let format = match audio.sample_format() {
            SampleFormat::Lin16 => VoiceFormat::Lin16,
            SampleFormat::Alaw => VoiceFormat::Alaw,
            SampleFormat::Ulaw => VoiceFormat::Ulaw,
        };
        let buffer = vec![0u8; audio.sample_size()];
        let next_due_ts = call.timestamp_ms();

        Self {
            audio,
            call,
            format,
            buffer,
            next_due_ts,
        }
    }
}

impl Packetizer for VoiceSender {
    fn send(&mut self) -> std::io::Result<()> {
        // Geraete-Zeitstempel wird gelesen, aber nicht in den Header uebernommen
        self.audio
            .read_with_timestamp(&mut self.buffer)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        let pdu = Pdu::voice(
            self.call.source_call(),
            self.call.dest_call(),
            self.next_due_ts,
            self.call.next_out_seq(),
            self.call.current_in_seq(),
            self.format,
            self.buffer.clone(),
        );
        self.call.send_pdu(&pdu);

        self.next_due_ts += FRAME_INTERVAL_MS as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::StubAudio;

    #[test]
    fn zeitstempel_laeuft_in_20er_schritten() {
        let audio = StubAudio::neu();
        let call = CallContext::new(audio.clone());
        let mut sender = VoiceSender::new(audio, call);

        let start = sender.next_due_ts;
        sender.send().unwrap();
        sender.send().unwrap();
        sender.send().unwrap();
        assert_eq!(sender.next_due_ts, start + 60);
    }

    #[test]
    fn format_folgt_dem_audio_interface() {
        let audio = StubAudio::neu();
        let call = CallContext::new(audio.clone());
        let sender = VoiceSender::new(audio, call);
        assert_eq!(sender.format, VoiceFormat::Alaw);
        assert_eq!(sender.buffer.len(), 160);
    }
}
