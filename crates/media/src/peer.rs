//! Remote-Peer: Queue und Worker zwischen UDP-Kanal und Anruf
//!
//! Der Kanal legt empfangene PDU-Bytes nur in die Queue (letzter Schritt
//! auf dem Empfangs-Task); der Peer-Worker parst sie auf eigenem Task in
//! den Anruf. Dispatcht wird ausschliesslich bei gueltigem Call-Nummern-
//! Paar; alles andere wird mit Warnung verworfen.

use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use fluesterfon_core::{now_ms, UserId};
use fluesterfon_protocol::{Pdu, DEST_CALL_NUMBER, SOURCE_CALL_NUMBER};

use crate::call::CallContext;
use crate::channel::DatagramChannel;

/// Gegenstelle eines Anrufs (hoechstens ein Anruf pro Peer)
pub struct RemotePeer {
    user_id: UserId,
    addr: SocketAddr,
    channel: Weak<DatagramChannel>,
    call: RwLock<Option<Arc<CallContext>>>,
    queue_tx: mpsc::UnboundedSender<Vec<u8>>,
    last_receive_ms: AtomicU64,
    transmitting: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    self_ref: Mutex<Weak<RemotePeer>>,
}

impl RemotePeer {
    /// Erstellt den Peer, startet seinen Worker und haengt ihn an den Kanal
    pub fn new(channel: &Arc<DatagramChannel>, user_id: UserId, addr: SocketAddr) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let peer = Arc::new(Self {
            user_id,
            addr,
            channel: Arc::downgrade(channel),
            call: RwLock::new(None),
            queue_tx,
            last_receive_ms: AtomicU64::new(now_ms()),
            transmitting: AtomicBool::new(true),
            worker: Mutex::new(None),
            self_ref: Mutex::new(Weak::new()),
        });
        *peer.self_ref.lock() = Arc::downgrade(&peer);

        let worker_peer = Arc::clone(&peer);
        *peer.worker.lock() = Some(tokio::spawn(async move {
            worker_peer.worker_loop(queue_rx).await;
        }));

        channel.attach_peer(Arc::clone(&peer));
        peer
    }

    /// Benutzerkennung der Gegenstelle
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Zieladresse fuer ausgehende PDUs
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bindet den (einen) Anruf an den Peer und vergibt die Call-Nummern
    pub fn bind_call(&self, call: Arc<CallContext>) {
        if let Some(me) = self.self_ref.lock().upgrade() {
            call.attach_peer(&me);
        }
        *self.call.write() = Some(call);
    }

    /// Der gebundene Anruf, falls vorhanden
    pub fn call(&self) -> Option<Arc<CallContext>> {
        self.call.read().clone()
    }

    /// Reiht ein empfangenes PDU ein (letzter Schritt auf dem Empfangs-Task)
    pub fn enqueue(&self, data: Vec<u8>) {
        if !self.transmitting.load(Ordering::SeqCst) || data.is_empty() {
            return;
        }
        self.last_receive_ms.store(now_ms(), Ordering::SeqCst);
        let _ = self.queue_tx.send(data);
    }

    /// Millisekunden seit dem letzten empfangenen PDU
    pub fn idle_ms(&self) -> u64 {
        now_ms().saturating_sub(self.last_receive_ms.load(Ordering::SeqCst))
    }

    /// Sendet PDU-Bytes ueber den Kanal an die Gegenstelle
    pub fn send(&self, pdu: &[u8]) {
        if !self.transmitting.load(Ordering::SeqCst) {
            return;
        }
        if let Some(channel) = self.channel.upgrade() {
            channel.send(pdu, self.addr);
        }
    }

    /// Stoppt die Uebertragung und raeumt den Anruf ab
    pub fn cleanup(&self) {
        self.transmitting.store(false, Ordering::SeqCst);
        if let Some(call) = self.call.write().take() {
            call.cleanup();
        }
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Worker
    // -----------------------------------------------------------------------

    async fn worker_loop(self: Arc<Self>, mut queue_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        tracing::trace!(peer = %self.user_id, "Peer-Worker gestartet");

        while let Some(octets) = queue_rx.recv().await {
            if !self.transmitting.load(Ordering::SeqCst) {
                break;
            }
            self.parse_pdu(&octets);
        }

        tracing::trace!(peer = %self.user_id, "Peer-Worker beendet");
    }

    /// Parst PDU-Bytes und dispatcht sie in den Anruf
    fn parse_pdu(&self, octets: &[u8]) {
        let Some(call) = self.call.read().clone() else {
            return;
        };

        match Pdu::parse(octets) {
            Ok(pdu)
                if pdu.dest_call == DEST_CALL_NUMBER
                    && pdu.source_call == SOURCE_CALL_NUMBER =>
            {
                call.on_arrived(pdu);
            }
            Ok(pdu) => {
                tracing::warn!(
                    dest_call = pdu.dest_call,
                    source_call = pdu.source_call,
                    "PDU mit fremden Call-Nummern verworfen"
                );
            }
            Err(e) => {
                tracing::warn!(fehler = %e, "Defektes PDU verworfen");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::StubAudio;
    use fluesterfon_protocol::VoiceFormat;
    use std::time::Duration;

    fn voice_pdu(out_seq: u8, ts: u64) -> Vec<u8> {
        Pdu::voice(
            SOURCE_CALL_NUMBER,
            DEST_CALL_NUMBER,
            ts,
            out_seq,
            0,
            VoiceFormat::Alaw,
            vec![0xAB; 160],
        )
        .encode()
    }

    #[tokio::test]
    async fn pdu_dispatch_in_den_anruf() {
        let channel = DatagramChannel::bind(0).await.unwrap();
        let peer = RemotePeer::new(&channel, UserId::new("gegenstelle"), loopback(1));
        let audio = StubAudio::neu();
        let call = CallContext::new(audio.clone());
        peer.bind_call(Arc::clone(&call));

        peer.enqueue(voice_pdu(0, 0));
        peer.enqueue(voice_pdu(1, 20));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(audio.gepufferte_frames(), 2);
    }

    #[tokio::test]
    async fn fremde_call_nummern_verworfen() {
        let channel = DatagramChannel::bind(0).await.unwrap();
        let peer = RemotePeer::new(&channel, UserId::new("gegenstelle"), loopback(2));
        let audio = StubAudio::neu();
        let call = CallContext::new(audio.clone());
        peer.bind_call(Arc::clone(&call));

        let fremd = Pdu::voice(0x1111, 0x2222, 0, 0, 0, VoiceFormat::Alaw, vec![0; 160]);
        peer.enqueue(fremd.encode());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(audio.gepufferte_frames(), 0);
    }

    #[tokio::test]
    async fn enqueue_aktualisiert_lebenszeichen() {
        let channel = DatagramChannel::bind(0).await.unwrap();
        let peer = RemotePeer::new(&channel, UserId::new("gegenstelle"), loopback(3));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let vorher = peer.idle_ms();
        peer.enqueue(voice_pdu(0, 0));
        assert!(peer.idle_ms() <= vorher);
    }

    #[tokio::test]
    async fn cleanup_stoppt_uebertragung() {
        let channel = DatagramChannel::bind(0).await.unwrap();
        let peer = RemotePeer::new(&channel, UserId::new("gegenstelle"), loopback(4));
        let audio = StubAudio::neu();
        let call = CallContext::new(audio.clone());
        peer.bind_call(Arc::clone(&call));

        peer.cleanup();
        peer.enqueue(voice_pdu(0, 0));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(audio.gepufferte_frames(), 0);
        assert!(peer.call().is_none());
    }

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000 + port))
    }
}
