//! Anruf-Kontext
//!
//! Verwaltet alles, was zu genau einem Anruf gehoert: Sequenzzaehler,
//! Zeitbasis, Etablierungszustand und die Anbindung ans Audio-Subsystem.
//!
//! Eine *empfangene* Nachricht traegt die Sichtweise des Absenders:
//! `source` ist dort die Gegenstelle und `dest` sind wir; in der Antwort
//! ist es umgekehrt. Beide Seiten fuehren deshalb dasselbe feste
//! Nummernpaar.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fluesterfon_audio::AudioInterface;
use fluesterfon_core::now_ms;
use fluesterfon_protocol::{Pdu, DEST_CALL_NUMBER, SOURCE_CALL_NUMBER};

use crate::peer::RemotePeer;
use crate::sender::VoiceSender;

/// Zustand und Zaehlwerk eines Anrufs
pub struct CallContext {
    source_call: AtomicU16,
    dest_call: AtomicU16,
    out_seq: AtomicU32,
    in_seq: AtomicU32,
    start_timestamp_ms: AtomicU64,
    established: AtomicBool,
    received_first_voice: AtomicBool,
    audio: Arc<dyn AudioInterface>,
    peer: RwLock<Weak<RemotePeer>>,
    self_ref: Mutex<Weak<CallContext>>,
}

impl CallContext {
    /// Erstellt einen Anruf ueber dem gegebenen Audio-Interface
    pub fn new(audio: Arc<dyn AudioInterface>) -> Arc<Self> {
        let call = Arc::new(Self {
            source_call: AtomicU16::new(1),
            dest_call: AtomicU16::new(0),
            out_seq: AtomicU32::new(0),
            in_seq: AtomicU32::new(0),
            start_timestamp_ms: AtomicU64::new(now_ms()),
            established: AtomicBool::new(false),
            received_first_voice: AtomicBool::new(false),
            audio,
            peer: RwLock::new(Weak::new()),
            self_ref: Mutex::new(Weak::new()),
        });
        *call.self_ref.lock() = Arc::downgrade(&call);
        call
    }

    /// Verknuepft Anruf und Peer und vergibt das feste Call-Nummern-Paar
    pub(crate) fn attach_peer(&self, peer: &Arc<RemotePeer>) {
        *self.peer.write() = Arc::downgrade(peer);
        self.source_call.store(SOURCE_CALL_NUMBER, Ordering::SeqCst);
        self.dest_call.store(DEST_CALL_NUMBER, Ordering::SeqCst);
        self.reset_clock();
    }

    /// Source Call Number (ohne Flag-Bit)
    pub fn source_call(&self) -> u16 {
        self.source_call.load(Ordering::SeqCst) & 0x7FFF
    }

    /// Destination Call Number (ohne Flag-Bit)
    pub fn dest_call(&self) -> u16 {
        self.dest_call.load(Ordering::SeqCst) & 0x7FFF
    }

    /// Naechste ausgehende Sequenznummer (Post-Inkrement mod 256)
    pub fn next_out_seq(&self) -> u8 {
        (self.out_seq.fetch_add(1, Ordering::SeqCst) & 0xFF) as u8
    }

    /// Aktuelle eingehende Sequenznummer
    pub fn current_in_seq(&self) -> u8 {
        (self.in_seq.load(Ordering::SeqCst) & 0xFF) as u8
    }

    /// Sequenzfilter: akzeptiert genau die erwartete ausgehende Nummer
    ///
    /// Stimmt `out_seq` des empfangenen Frames mit der Erwartung ueberein,
    /// rueckt die Erwartung vor und der Frame wird angenommen; sonst wird
    /// er verworfen (keine Umordnungs-Pufferung).
    pub fn accept_inbound(&self, out_seq: u8) -> bool {
        let expected = self.current_in_seq();
        if out_seq == expected {
            self.in_seq
                .store((expected as u32 + 1) % 256, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Millisekunden seit Anrufbeginn
    pub fn timestamp_ms(&self) -> u64 {
        now_ms().saturating_sub(self.start_timestamp_ms.load(Ordering::SeqCst))
    }

    /// Setzt die Zeitbasis auf jetzt
    pub fn reset_clock(&self) {
        self.start_timestamp_ms.store(now_ms(), Ordering::SeqCst);
    }

    /// Sample-Groesse des gebundenen Audio-Interfaces
    pub fn sample_size(&self) -> usize {
        self.audio.sample_size()
    }

    /// Gibt true zurueck wenn der Anruf etabliert ist
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    /// Gibt true zurueck wenn bereits Sprache empfangen wurde
    pub fn received_first_voice(&self) -> bool {
        self.received_first_voice.load(Ordering::SeqCst)
    }

    /// Markiert den Anruf als etabliert
    ///
    /// Beim Uebergang in den etablierten Zustand stoppt der Rueckruf-Ton
    /// und die Aufnahme beginnt (Voice-Sender wird in den Sende-Takt
    /// eingehaengt).
    pub fn set_established(&self, established: bool) {
        if established && !self.established.load(Ordering::SeqCst) {
            self.audio.stop_ringing();
            self.start_audio_recording();
        }
        self.established.store(established, Ordering::SeqCst);
    }

    fn start_audio_recording(&self) {
        let Some(me) = self.self_ref.lock().upgrade() else {
            return;
        };
        let sender = VoiceSender::new(Arc::clone(&self.audio), me);
        self.audio.set_packetizer(Some(Box::new(sender)));
        self.audio.start_recording();
    }

    /// Stoppt die Aufnahme
    pub fn stop_audio_recording(&self) {
        self.audio.stop_recording();
    }

    /// Sendet kodierte PDU-Bytes an den Peer
    pub fn send_pdu(&self, pdu: &Pdu) {
        if let Some(peer) = self.peer.read().upgrade() {
            peer.send(&pdu.encode());
        }
    }

    /// Behandelt ein frisch angekommenes, bereits dispatchtes PDU
    pub fn on_arrived(&self, pdu: Pdu) {
        if !pdu.is_voice() {
            tracing::warn!(pdu_typ = pdu.pdu_type, "Unbekannter PDU-Typ");
            return;
        }

        // Stream-Anfang: die Gegenstelle sendet ab ACCEPT, unser Medienpfad
        // entsteht erst beim Eintreffen der Nachricht. Der erste Frame setzt
        // deshalb die Erwartung auf den Absenderstand; danach gilt der
        // strikte Filter.
        if !self.received_first_voice.load(Ordering::SeqCst) {
            self.in_seq.store(pdu.out_seq as u32, Ordering::SeqCst);
        }

        if !self.accept_inbound(pdu.out_seq) {
            tracing::warn!(
                erhalten = pdu.out_seq,
                erwartet = self.current_in_seq(),
                "Voice-PDU ausserhalb der Reihenfolge verworfen"
            );
            return;
        }

        // Erster Sprach-Frame stoppt den lokalen Rueckruf-Ton
        if !self.received_first_voice.swap(true, Ordering::SeqCst) {
            self.audio.stop_ringing();
        }

        let sample_size = self.audio.sample_size();
        let mut sample = vec![0u8; sample_size];
        let n = sample_size.min(pdu.payload.len());
        sample[..n].copy_from_slice(&pdu.payload[..n]);

        if let Err(e) = self.audio.write_buffered(&sample, pdu.timestamp as i64) {
            tracing::warn!(fehler = %e, "Frame nicht in den De-Jitter-Ring schreibbar");
        }
    }

    /// Raeumt den Anruf ab und loest ihn vom Peer
    pub fn cleanup(&self) {
        self.audio.set_packetizer(None);
        self.audio.stop_play();
        self.audio.stop_recording();
        *self.peer.write() = Weak::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::StubAudio;
    use fluesterfon_protocol::VoiceFormat;

    fn call() -> (Arc<StubAudio>, Arc<CallContext>) {
        let audio = StubAudio::neu();
        let call = CallContext::new(audio.clone());
        (audio, call)
    }

    fn voice(out_seq: u8, ts: u64) -> Pdu {
        Pdu::voice(
            SOURCE_CALL_NUMBER,
            DEST_CALL_NUMBER,
            ts,
            out_seq,
            0,
            VoiceFormat::Alaw,
            vec![0x11; 160],
        )
    }

    #[test]
    fn ausgehende_sequenz_monoton_mod_256() {
        let (_audio, call) = call();
        for erwartet in 0..=255u8 {
            assert_eq!(call.next_out_seq(), erwartet);
        }
        // Wrap
        assert_eq!(call.next_out_seq(), 0);
        assert_eq!(call.next_out_seq(), 1);
    }

    #[test]
    fn eingangsfilter_akzeptiert_nur_erwartete() {
        let (_audio, call) = call();

        assert!(call.accept_inbound(0));
        assert_eq!(call.current_in_seq(), 1);

        // Duplikat und Spruenge werden abgelehnt, Erwartung bleibt
        assert!(!call.accept_inbound(0));
        assert!(!call.accept_inbound(5));
        assert_eq!(call.current_in_seq(), 1);

        assert!(call.accept_inbound(1));
        assert_eq!(call.current_in_seq(), 2);
    }

    #[test]
    fn eingangsfilter_wrap_mod_256() {
        let (_audio, call) = call();
        for seq in 0..=255u8 {
            assert!(call.accept_inbound(seq));
        }
        assert_eq!(call.current_in_seq(), 0);
        assert!(call.accept_inbound(0));
    }

    #[test]
    fn sequenzverletzung_schreibt_keinen_frame() {
        let (audio, call) = call();
        call.on_arrived(voice(0, 0));
        call.on_arrived(voice(2, 40)); // Frame 1 fehlt -> 2 verworfen
        call.on_arrived(voice(1, 20));

        // Nur Frames 0 und 1 wurden geschrieben
        assert_eq!(audio.gepufferte_frames(), 2);
    }

    #[test]
    fn erster_voice_frame_stoppt_rueckrufton() {
        let (audio, call) = call();
        audio.start_ringing();
        assert!(audio.klingelt());

        call.on_arrived(voice(0, 0));
        assert!(!audio.klingelt());
        assert!(call.received_first_voice());
    }

    #[test]
    fn etablierung_startet_aufnahme_und_stoppt_klingeln() {
        let (audio, call) = call();
        audio.start_ringing();

        call.set_established(true);
        assert!(call.is_established());
        assert!(!audio.klingelt());
        assert!(audio.nimmt_auf());
        assert!(audio.hat_packetizer());
    }

    #[test]
    fn cleanup_loest_alles() {
        let (audio, call) = call();
        call.set_established(true);
        call.cleanup();

        assert!(!audio.nimmt_auf());
        assert!(!audio.hat_packetizer());
    }

    #[test]
    fn zeitbasis_reset() {
        let (_audio, call) = call();
        std::thread::sleep(std::time::Duration::from_millis(15));
        assert!(call.timestamp_ms() >= 10);
        call.reset_clock();
        assert!(call.timestamp_ms() < 10);
    }
}
