//! Datagramm-Kanal (UDP)
//!
//! Bindet den ersten freien Port in `[basis, basis+100)`, empfaengt
//! Datagramme in einer Async-Loop und reicht sie an den angehaengten Peer
//! weiter. Ist ein Sitzungs-Cipher installiert, wird pro Datagramm
//! entschluesselt (Praeambel 8); fehlgeschlagene Entschluesselungen werden
//! still verworfen – Angreifer und Streupakete sind nicht unterscheidbar.
//!
//! Der installierte Cipher ist read-mostly: geschrieben wird nur beim
//! Auf- und Abbau eines Anrufs auf der Signalisierungs-Reihenfolge.

use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use fluesterfon_crypto::{SymmetricCipher, PDU_PREAMBLE_LEN};

use crate::error::MediaError;
use crate::peer::RemotePeer;

/// Groesse des Empfangspuffers
const UDP_BUFFER_SIZE: usize = 4096;

/// Breite des Port-Suchbereichs
const PORT_SCAN_RANGE: u16 = 100;

/// UDP-Kanal eines Endpunkts (hoechstens ein aktiver Peer)
pub struct DatagramChannel {
    socket: Arc<UdpSocket>,
    local_port: u16,
    cipher: RwLock<Option<Arc<SymmetricCipher>>>,
    peer: RwLock<Option<Arc<RemotePeer>>>,
    running: AtomicBool,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    self_ref: Mutex<Weak<DatagramChannel>>,
}

impl DatagramChannel {
    /// Bindet den ersten freien Port ab `base_port`
    ///
    /// `base_port == 0` bindet einen vom System gewaehlten Port.
    pub async fn bind(base_port: u16) -> Result<Arc<Self>, MediaError> {
        let scan_end = if base_port == 0 {
            1
        } else {
            base_port.saturating_add(PORT_SCAN_RANGE)
        };

        let mut port = base_port;
        loop {
            match UdpSocket::bind(("0.0.0.0", port)).await {
                Ok(socket) => {
                    let local_port = socket.local_addr()?.port();
                    tracing::debug!(port = local_port, "UDP-Port gebunden");
                    let channel = Arc::new(Self {
                        socket: Arc::new(socket),
                        local_port,
                        cipher: RwLock::new(None),
                        peer: RwLock::new(None),
                        running: AtomicBool::new(true),
                        recv_task: Mutex::new(None),
                        self_ref: Mutex::new(Weak::new()),
                    });
                    *channel.self_ref.lock() = Arc::downgrade(&channel);
                    return Ok(channel);
                }
                Err(_) if port.checked_add(1).map_or(false, |p| p < scan_end) => {
                    port += 1; // belegt, weitersuchen
                }
                Err(_) => return Err(MediaError::KeinFreierPort(base_port)),
            }
        }
    }

    /// Startet die Empfangs-Loop
    pub fn start(&self) {
        let Some(channel) = self.self_ref.lock().upgrade() else {
            return;
        };
        let task = tokio::spawn(async move { channel.receive_loop().await });
        *self.recv_task.lock() = Some(task);
    }

    /// Lokaler UDP-Port
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Installiert (oder entfernt) den Sitzungs-Cipher
    pub fn install_cipher(&self, cipher: Option<Arc<SymmetricCipher>>) {
        if let Some(c) = &cipher {
            tracing::debug!(algorithmus = %c.algorithm_desc(), "PDU-Cipher installiert");
        }
        *self.cipher.write() = cipher;
    }

    /// Aktuell installierter Sitzungs-Cipher
    pub fn cipher(&self) -> Option<Arc<SymmetricCipher>> {
        self.cipher.read().clone()
    }

    /// Haengt den (einen) Peer an den Kanal
    pub fn attach_peer(&self, peer: Arc<RemotePeer>) {
        *self.peer.write() = Some(peer);
    }

    /// Gibt true zurueck wenn ein Peer angehaengt ist
    pub fn has_peer(&self) -> bool {
        self.peer.read().is_some()
    }

    /// Der angehaengte Peer, falls vorhanden
    pub fn peer(&self) -> Option<Arc<RemotePeer>> {
        self.peer.read().clone()
    }

    /// Gibt true zurueck wenn der Peer laenger als `max_idle_ms` still ist
    ///
    /// Ohne Peer: false (was nicht existiert, kann nicht tot sein).
    pub fn is_peer_dead(&self, max_idle_ms: u64) -> bool {
        match self.peer.read().as_ref() {
            Some(peer) => peer.idle_ms() > max_idle_ms,
            None => false,
        }
    }

    /// Loest Peer und Anruf vom Kanal und verwirft den Cipher
    pub fn remove_peer(&self) {
        *self.cipher.write() = None;
        if let Some(peer) = self.peer.write().take() {
            peer.cleanup();
        }
    }

    /// Verschluesselt (falls Cipher installiert) und sendet ein PDU
    pub fn send(&self, pdu: &[u8], target: SocketAddr) {
        let datagram = match self.cipher.read().as_ref() {
            Some(cipher) => cipher.encrypt(PDU_PREAMBLE_LEN, pdu),
            None => pdu.to_vec(),
        };

        match self.socket.try_send_to(&datagram, target) {
            Ok(_) => {
                tracing::trace!(bytes = datagram.len(), ziel = %target, "PDU gesendet");
            }
            Err(e) => {
                tracing::trace!(fehler = %e, ziel = %target, "PDU-Sendefehler");
            }
        }
    }

    /// Stoppt die Empfangs-Loop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Empfangspfad
    // -----------------------------------------------------------------------

    async fn receive_loop(self: Arc<Self>) {
        tracing::trace!(port = self.local_port, "UDP-Empfangs-Loop gestartet");
        let mut buf = [0u8; UDP_BUFFER_SIZE];

        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, from)) => self.handle_datagram(&buf[..len], from),
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        tracing::warn!(fehler = %e, "UDP-Empfangsfehler");
                        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    }
                }
            }
        }

        tracing::trace!("UDP-Empfangs-Loop beendet");
    }

    /// Entschluesselt (falls noetig) und reicht ans Peer-Queue weiter
    fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        let pdu = match self.cipher.read().as_ref() {
            Some(cipher) => match cipher.decrypt(PDU_PREAMBLE_LEN, data) {
                Some(plain) => plain,
                None => {
                    tracing::trace!(absender = %from, "Nicht entschluesselbares Datagramm verworfen");
                    return;
                }
            },
            None => data.to_vec(),
        };

        if let Some(peer) = self.peer.read().as_ref() {
            peer.enqueue(pdu);
        }
    }
}

impl Drop for DatagramChannel {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
    }
}
