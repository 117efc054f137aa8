//! Rendezvous-Client
//!
//! Haelt die TCP-Verbindung zum Relay: ein Schreib-Task (Zeilen-Queue)
//! und ein Lese-Task, der Server-Zeilen parst und als `SignalEvent`s an
//! den Session-Controller liefert. LIST-Anfragen beantwortet der Client
//! selbst mit `[$] ALIVE`, sofern kein Regex mitkommt oder der eigene
//! Name (case-insensitiv) darauf passt.
//!
//! Die Wiederverbindungs-Politik (2 s Abstand, 3 Versuche) liegt beim
//! Controller; der Client meldet nur `Disconnected`.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use fluesterfon_core::UserId;

use crate::control::{self, InboundEvent};
use crate::error::SignalError;

/// Ereignis vom Rendezvous-Kanal an den Controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    /// An uns gerichtete Steuernachricht
    Control(control::ControlMessage),
    /// Chat-Zeile fuer den Menschen
    Text { user_id: String, message: String },
    /// Ein Peer hat sich auf LIST gemeldet
    PeerAlive { user_id: String },
    /// Verbindung zum Relay verloren
    Disconnected,
}

/// Client-Verbindung zum Rendezvous-Relay
pub struct RendezvousClient {
    user_id: UserId,
    local_addr: String,
    server_id: String,
    writer_tx: mpsc::UnboundedSender<String>,
    alive: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RendezvousClient {
    /// Verbindet zum Relay und startet Lese- und Schreib-Task
    ///
    /// Liefert den Client und den Ereignis-Empfaenger des Controllers.
    pub async fn connect(
        host: &str,
        port: u16,
        user_id: UserId,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SignalEvent>), SignalError> {
        let server_id = format!("{host}:{port}");
        tracing::info!(server = %server_id, "Verbinde zum Rendezvous-Relay");

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| SignalError::Verbindung(format!("{server_id}: {e}")))?;
        let local_addr = stream.local_addr()?.ip().to_string();
        tracing::info!(server = %server_id, lokal = %local_addr, "Rendezvous-Kanal verbunden");

        let (read_half, write_half) = stream.into_split();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<SignalEvent>();

        let alive = Arc::new(AtomicBool::new(true));

        // Schreib-Task: Zeilen aus der Queue ans Relay
        let writer_alive = Arc::clone(&alive);
        let writer_task = tokio::spawn(async move {
            let mut writer = FramedWrite::new(write_half, LinesCodec::new());
            while let Some(line) = writer_rx.recv().await {
                if writer.send(line).await.is_err() {
                    writer_alive.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // Lese-Task: Zeilen parsen und Ereignisse liefern
        let reader_alive = Arc::clone(&alive);
        let reader_user = user_id.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = FramedRead::new(read_half, LinesCodec::new());
            loop {
                match reader.next().await {
                    Some(Ok(line)) => {
                        if let Some(event) =
                            handle_line(&line, &reader_user, &reader_writer_tx)
                        {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(fehler = %e, "Rendezvous-Verbindung verloren");
                        reader_alive.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(SignalEvent::Disconnected);
                        break;
                    }
                    None => {
                        tracing::warn!("Rendezvous-Verbindung geschlossen");
                        reader_alive.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(SignalEvent::Disconnected);
                        break;
                    }
                }
            }
        });

        let client = Arc::new(Self {
            user_id,
            local_addr,
            server_id,
            writer_tx,
            alive,
            tasks: Mutex::new(vec![writer_task, reader_task]),
        });

        Ok((client, event_rx))
    }

    /// Eigene Benutzerkennung
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Lokale IP-Adresse der Relay-Verbindung
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// `host:port` des Relays
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Gibt true zurueck solange die Verbindung steht
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Sendet eine INVITE-Nachricht
    pub fn send_invite(&self, remote_user: &str, udp_port: u16, key: Option<&str>) {
        let body = control::format_invite(remote_user, &self.local_addr, udp_port, key);
        self.send_with_sender(&body);
    }

    /// Sendet eine RING-Nachricht
    pub fn send_ring(&self, remote_user: &str, udp_port: u16, key: Option<&str>) {
        let body = control::format_ring(remote_user, &self.local_addr, udp_port, key);
        self.send_with_sender(&body);
    }

    /// Sendet eine ACCEPT-Nachricht
    pub fn send_accept(&self, remote_user: &str, udp_port: u16, key: Option<&str>) {
        let body = control::format_accept(remote_user, &self.local_addr, udp_port, key);
        self.send_with_sender(&body);
    }

    /// Sendet eine BYE-Nachricht
    pub fn send_bye(&self, remote_user: &str, local_addr: &str, udp_port: u16) {
        let body = control::format_bye(remote_user, local_addr, udp_port);
        self.send_with_sender(&body);
    }

    /// Sendet eine verschluesselte Sofortnachricht
    pub fn send_instant_message(&self, remote_user: &str, ciphertext: &str) {
        let body = control::format_imsg(remote_user, ciphertext);
        self.send_with_sender(&body);
    }

    /// Fragt die anwesenden Peers ab
    pub fn send_list(&self, regex: Option<&str>) {
        let body = control::format_list(regex);
        self.send_with_sender(&body);
    }

    /// Sendet eine unverschluesselte Chat-Zeile
    pub fn send_text(&self, message: &str) {
        self.send_with_sender(message);
    }

    /// Schliesst die Verbindung
    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn send_with_sender(&self, body: &str) {
        let line = format!("{} :: {}", self.user_id, body);
        let _ = self.writer_tx.send(line);
    }
}

impl Drop for RendezvousClient {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Verarbeitet eine Server-Zeile; beantwortet LIST direkt
fn handle_line(
    line: &str,
    user_id: &UserId,
    writer_tx: &mpsc::UnboundedSender<String>,
) -> Option<SignalEvent> {
    match control::parse_line(line, user_id.as_str())? {
        InboundEvent::Control(message) => Some(SignalEvent::Control(message)),
        InboundEvent::Text { user_id, message } => {
            Some(SignalEvent::Text { user_id, message })
        }
        InboundEvent::ListQuery { from, regex } => {
            tracing::debug!(von = %from, regex = ?regex, "LIST-Anfrage");
            if should_answer_list(user_id.as_str(), regex.as_deref()) {
                let line = format!("{} :: {}", user_id, control::format_alive());
                let _ = writer_tx.send(line);
            }
            None
        }
        InboundEvent::Alive { from } => Some(SignalEvent::PeerAlive { user_id: from }),
    }
}

/// ALIVE wird gesendet, wenn kein Regex vorliegt oder der eigene Name
/// (case-insensitiv) darauf passt; ungueltige Regexe bleiben stumm
fn should_answer_list(my_id: &str, pattern: Option<&str>) -> bool {
    if my_id.is_empty() {
        return false;
    }
    match pattern {
        None => true,
        Some(raw) => match regex::RegexBuilder::new(raw).case_insensitive(true).build() {
            Ok(re) => re.is_match(my_id),
            Err(_) => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn list_antwort_entscheidung() {
        assert!(should_answer_list("alice", None));
        assert!(should_answer_list("alice", Some("al.*")));
        assert!(should_answer_list("Alice", Some("ALICE")));
        // find()-Semantik: Teilstring-Treffer genuegt
        assert!(should_answer_list("alice", Some("lic")));
        assert!(!should_answer_list("alice", Some("^bob$")));
        assert!(!should_answer_list("alice", Some("([unvollstaendig")));
        assert!(!should_answer_list("", None));
    }

    #[tokio::test]
    async fn client_sendet_mit_absender_praefix() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            stream
        });

        let (client, _events) =
            RendezvousClient::connect("127.0.0.1", addr.port(), UserId::new("alice"))
                .await
                .unwrap();

        let stream = accept.await.unwrap();
        let mut lines = BufReader::new(stream).lines();

        client.send_list(None);
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "alice :: [$] LIST");

        client.send_invite("bob", 47000, None);
        let line = lines.next_line().await.unwrap().unwrap();
        assert!(line.starts_with("alice :: [$] INVITE bob "));
        assert!(line.ends_with(" 47000"));
    }

    #[tokio::test]
    async fn client_beantwortet_list_mit_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"bob :: [$] LIST\n").await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        let (_client, _events) =
            RendezvousClient::connect("127.0.0.1", addr.port(), UserId::new("alice"))
                .await
                .unwrap();

        let antwort = server.await.unwrap();
        assert_eq!(antwort, "alice :: [$] ALIVE");
    }

    #[tokio::test]
    async fn client_liefert_steuerereignisse() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"bob :: [$] INVITE alice 10.0.0.1 47000\nbob :: hallo\n")
                .await
                .unwrap();
            // Verbindung offen halten
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let (_client, mut events) =
            RendezvousClient::connect("127.0.0.1", addr.port(), UserId::new("alice"))
                .await
                .unwrap();

        match events.recv().await.unwrap() {
            SignalEvent::Control(m) => assert_eq!(m.peer_user_id, "bob"),
            other => panic!("{other:?}"),
        }
        match events.recv().await.unwrap() {
            SignalEvent::Text { user_id, message } => {
                assert_eq!(user_id, "bob");
                assert_eq!(message, "hallo");
            }
            other => panic!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn verbindungsverlust_meldet_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream); // Server trennt sofort
        });

        let (client, mut events) =
            RendezvousClient::connect("127.0.0.1", addr.port(), UserId::new("alice"))
                .await
                .unwrap();

        assert_eq!(events.recv().await.unwrap(), SignalEvent::Disconnected);
        assert!(!client.is_alive());
    }
}
