//! Session-Controller
//!
//! Eine serielle Ereignisschleife (`select!` ueber Kommandos,
//! Signal-Ereignisse und den 1-Hz-Takt) orchestriert den Anrufaufbau:
//!
//! - **INVITE**: besetzt -> BYE-Abweisung; sonst Einladung merken,
//!   klingeln, Vertrauen pruefen, auto-annehmen oder warten.
//! - **RING**: muss zur laufenden Einladung passen; Einladungs-Timeout
//!   stoppen, Rueckrufton starten, Vertrauen pruefen.
//! - **ACCEPT**: Sitzungsschluessel auspacken, Cipher installieren,
//!   Peer + Anruf bauen, etablieren, Lebenszeichen ueberwachen.
//! - **BYE**: Abweisung oder Abbau unterscheiden, alles zuruecksetzen.
//! - **IMSG**: mit dem Sitzungs-Cipher entschluesseln und anzeigen.
//!
//! Timer auf dem 1-Hz-Takt: Einladungs-Timeout 3 s, Peer-tot-Warnung bei
//! 2500 ms Stille (ohne Abbau), Wiederverbindung 2 s Abstand und maximal
//! 3 Versuche, danach Ruhezustand bis zum Eingriff des Benutzers.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use fluesterfon_audio::{AudioInterface, PcmAudio, SampleFormat};
use fluesterfon_core::{SecurityLevel, UserId};
use fluesterfon_crypto::{
    AuthorizedKeys, Identity, Keystore, PublicEncryptor, SymmetricCipher, WireObject,
};
use fluesterfon_media::{CallContext, DatagramChannel, RemotePeer};
use fluesterfon_signaling::{ControlMessage, ControlType, RendezvousClient, SignalEvent};

/// Einladungs-Timeout in Takt-Sekunden
const INVITE_TIMEOUT_S: i32 = 3;

/// Peer gilt als still nach dieser Leerlaufzeit
const PEER_DEAD_MS: u64 = 2500;

/// Wiederverbindungs-Abstand in Takt-Sekunden
const RECONNECT_DELAY_S: i32 = 2;

/// Maximale Wiederverbindungs-Versuche
const MAX_RECONNECT_RETRIES: u32 = 3;

/// Kommandos der einbettenden Oberflaeche an den Controller
#[derive(Debug, Clone)]
pub enum Command {
    /// Benutzer anrufen (mit oder ohne Verschluesselung)
    Dial { user: String, secure: bool },
    /// Eingehende Einladung annehmen
    Accept,
    /// Anruf beenden bzw. Einladung abweisen
    Hangup,
    /// Vertrauliche Nachricht an die Gegenstelle (faellt ohne Cipher auf
    /// den unverschluesselten Broadcast zurueck)
    SendMessage(String),
    /// Unverschluesselte Chat-Zeile an alle
    Broadcast(String),
    /// Anwesende Peers abfragen
    ListPeers(Option<String>),
    /// Autorisierte Schluessel neu laden
    ReloadAuthorizedKeys,
    /// Lokalen Sitzungsschluessel neu erzeugen
    NewSecret,
    /// Eigenen oeffentlichen Schluessel an die Gegenstelle schicken
    ShareMyKey,
    /// Controller beenden
    Quit,
}

/// Meldungen des Controllers an die einbettende Oberflaeche
#[derive(Debug, Clone)]
pub enum Notice {
    Info(String),
    Warn(String),
    Error(String),
    /// Sicherheitsstufe der aktuellen Verbindung
    Security(SecurityLevel),
    /// Statuszeile des Rendezvous-Kanals
    PbxStatus(String),
    /// Eingehende Textnachricht
    IncomingText {
        from: String,
        message: String,
        encrypted: bool,
    },
}

/// Von aussen verdrahtete Abhaengigkeiten des Controllers
pub struct SessionDeps {
    /// Rendezvous-Relay
    pub host: String,
    pub port: u16,
    /// Eigene Benutzerkennung
    pub user_id: UserId,
    /// Eingehende Einladungen automatisch annehmen
    pub auto_answer: bool,
    /// Identitaet (None: Krypto-Subsystem nicht einsatzbereit, nur
    /// unverschluesselter Betrieb)
    pub identity: Option<Arc<Identity>>,
    /// Vertrauensanker
    pub authorized: Arc<AuthorizedKeys>,
    /// Schluesselablage (fuer Reload-Pfade)
    pub keystore: Keystore,
    /// Audio-Engine
    pub audio: Arc<PcmAudio>,
    /// UDP-Kanal
    pub channel: Arc<DatagramChannel>,
}

/// Ausgang der Kommando-Behandlung
#[derive(PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// Aufwach-Grund der Ereignisschleife
enum Wake {
    Command(Option<Command>),
    Signal(Option<SignalEvent>),
    Tick,
}

/// Der Session-Controller (eine Instanz pro Endpunkt)
pub struct SessionController {
    deps: SessionDeps,
    notices: mpsc::UnboundedSender<Notice>,

    client: Option<Arc<RendezvousClient>>,
    events: Option<mpsc::UnboundedReceiver<SignalEvent>>,

    /// Lokaler Sitzungsschluessel (wird pro angenommenem Anruf erneuert)
    local_cipher: Option<Arc<SymmetricCipher>>,

    /// Zuletzt empfangene, noch unbeantwortete Einladung
    pending_invite: Option<ControlMessage>,
    /// Oeffentlicher Schluessel der Gegenstelle
    remote_public: Option<PublicEncryptor>,
    /// Benutzer, den wir gerade einladen
    current_invite: Option<String>,
    /// Einladungs-Timeout in Sekunden (-1: inaktiv)
    invite_timeout: i32,
    /// Lebenszeichen der Gegenstelle ueberwachen
    monitor_voice: bool,

    /// Wiederverbindungs-Timer (-1: inaktiv)
    reconnect_timeout: i32,
    reconnect_retries: u32,
}

impl SessionController {
    /// Erstellt den Controller; Meldungen laufen ueber den Notice-Kanal
    pub fn new(deps: SessionDeps) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let controller = Self {
            deps,
            notices,
            client: None,
            events: None,
            local_cipher: None,
            pending_invite: None,
            remote_public: None,
            current_invite: None,
            invite_timeout: -1,
            monitor_voice: false,
            reconnect_timeout: -1,
            reconnect_retries: 0,
        };
        (controller, notice_rx)
    }

    /// Die serielle Ereignisschleife; laeuft bis `Command::Quit`
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.connect_rendezvous().await;

        let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Der erste Tick feuert sofort
        tick.tick().await;

        loop {
            // Nur `self.events` wird im select ausgeliehen; die Behandlung
            // laeuft danach mit vollem Zugriff auf den Controller
            let wake = {
                let events = &mut self.events;
                tokio::select! {
                    cmd = commands.recv() => Wake::Command(cmd),
                    event = Self::next_event(events) => Wake::Signal(event),
                    _ = tick.tick() => Wake::Tick,
                }
            };

            match wake {
                Wake::Command(Some(cmd)) => {
                    if self.handle_command(cmd).await == Flow::Quit {
                        break;
                    }
                }
                Wake::Command(None) => break,
                Wake::Signal(Some(event)) => self.handle_signal(event).await,
                Wake::Signal(None) => {
                    // Sende-Seite weg: wie Verbindungsverlust behandeln
                    self.events = None;
                }
                Wake::Tick => self.timer_tick().await,
            }
        }

        self.shutdown();
    }

    async fn next_event(
        events: &mut Option<mpsc::UnboundedReceiver<SignalEvent>>,
    ) -> Option<SignalEvent> {
        match events {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    // -----------------------------------------------------------------------
    // Verbindung zum Relay
    // -----------------------------------------------------------------------

    async fn connect_rendezvous(&mut self) {
        let host = self.deps.host.clone();
        let port = self.deps.port;

        self.notify(Notice::PbxStatus(format!("Verbinde zu {host}:{port}...")));

        match RendezvousClient::connect(&host, port, self.deps.user_id.clone()).await {
            Ok((client, events)) => {
                self.notify(Notice::PbxStatus(format!("Verbunden mit {}", client.server_id())));
                self.info("Bereit zur Kommunikation");
                self.client = Some(client);
                self.events = Some(events);
                self.reconnect_timeout = -1;
            }
            Err(e) => {
                self.warn(format!("Verbindung fehlgeschlagen: {e}"));
                self.client = None;
                self.events = None;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Kommandos
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Dial { user, secure } => self.dial(&user, secure),
            Command::Accept => self.accept_incoming_call(true).await,
            Command::Hangup => self.hangup(),
            Command::SendMessage(text) => self.send_message(&text),
            Command::Broadcast(text) => {
                if let Some(client) = &self.client {
                    client.send_text(&text);
                }
            }
            Command::ListPeers(regex) => {
                if let Some(client) = &self.client {
                    self.info("Frage anwesende Benutzer ab...");
                    client.send_list(regex.as_deref());
                }
            }
            Command::ReloadAuthorizedKeys => self.reload_authorized_keys(),
            Command::NewSecret => self.new_secret(),
            Command::ShareMyKey => self.share_my_key(),
            Command::Quit => {
                self.hangup();
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn dial(&mut self, user: &str, secure: bool) {
        if self.deps.channel.has_peer() || self.current_invite.is_some() {
            self.error("Anruf aktiv. Erst auflegen!");
            return;
        }
        let Some(client) = self.client.clone() else {
            self.error("Nicht mit dem Relay verbunden");
            return;
        };
        if !client.is_alive() {
            self.error("Relay-Verbindung ist tot");
            return;
        }

        let art = if secure { "verschluesselten" } else { "unverschluesselten" };
        self.info(format!("Lade '{user}' zum {art} Anruf ein..."));

        self.current_invite = Some(user.to_string());
        self.invite_timeout = INVITE_TIMEOUT_S;

        let key = if secure {
            self.deps
                .identity
                .as_ref()
                .map(|id| id.signed_public_key_b64().to_string())
        } else {
            None
        };
        client.send_invite(user, self.deps.channel.local_port(), key.as_deref());
    }

    fn hangup(&mut self) {
        if let Some(client) = &self.client {
            if let Some(peer) = self.deps.channel.peer() {
                client.send_bye(
                    peer.user_id().as_str(),
                    client.local_addr(),
                    self.deps.channel.local_port(),
                );
            } else if let Some(invite) = &self.pending_invite {
                self.notify(Notice::Info(format!(
                    "Weise Einladung von {} ab",
                    invite.verbose_remote()
                )));
                client.send_bye(
                    &invite.peer_user_id,
                    client.local_addr(),
                    self.deps.channel.local_port(),
                );
            }
        }

        self.teardown_call();
    }

    fn send_message(&mut self, text: &str) {
        let Some(client) = self.client.clone() else {
            self.error("Nicht mit dem Relay verbunden");
            return;
        };

        match (self.deps.channel.cipher(), self.deps.channel.peer()) {
            (Some(cipher), Some(peer)) => {
                let ciphertext = cipher.encrypt_text(text);
                client.send_instant_message(peer.user_id().as_str(), &ciphertext);
            }
            _ => {
                // Ohne Sitzungs-Cipher bleibt nur der oeffentliche Broadcast
                client.send_text(text);
            }
        }
    }

    fn reload_authorized_keys(&mut self) {
        let path = self.deps.keystore.authorized_keys_path();
        match self.deps.authorized.reload_from(&path) {
            Ok(n) => self.info(format!("{n} autorisierte Schluessel geladen")),
            Err(e) => self.error(format!("Autorisierte Schluessel nicht ladbar: {e}")),
        }
    }

    fn new_secret(&mut self) {
        match SymmetricCipher::generate_default() {
            Ok(cipher) => {
                self.info(format!("Neuer Sitzungsschluessel: {}", cipher.algorithm_desc()));
                self.local_cipher = Some(Arc::new(cipher));
            }
            Err(e) => self.error(format!("Schluesselerzeugung fehlgeschlagen: {e}")),
        }
    }

    fn share_my_key(&mut self) {
        let Some(identity) = self.deps.identity.clone() else {
            self.error("Keine Identitaet verfuegbar");
            return;
        };
        match identity.named_public_key_line() {
            Ok(line) => self.send_message(&format!(
                "========= BEGIN PUBLIC KEY ========= {line} ========= END PUBLIC KEY ========="
            )),
            Err(e) => self.error(format!("Schluessel nicht exportierbar: {e}")),
        }
    }

    // -----------------------------------------------------------------------
    // Signal-Ereignisse
    // -----------------------------------------------------------------------

    async fn handle_signal(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::Control(message) => match message.typ {
                ControlType::Invite => self.on_invite(message).await,
                ControlType::Ring => self.on_ring(message),
                ControlType::Accept => self.on_accept(message).await,
                ControlType::Bye => self.on_bye(message),
                ControlType::InstantMessage => self.on_instant_message(message),
            },
            SignalEvent::Text { user_id, message } => {
                self.notify(Notice::IncomingText {
                    from: user_id,
                    message,
                    encrypted: false,
                });
            }
            SignalEvent::PeerAlive { user_id } => {
                self.info(format!("-- Benutzer '{user_id}' ist anwesend"));
            }
            SignalEvent::Disconnected => {
                tracing::debug!("Rendezvous-Kanal getrennt");
            }
        }
    }

    /// Eingehende Einladung: klingeln und annehmen lassen
    async fn on_invite(&mut self, m: ControlMessage) {
        if m.peer_port == 0 {
            return;
        }

        // Besetzt: neue Einladungen mit BYE abweisen
        if self.deps.channel.has_peer() {
            if let Some(client) = &self.client {
                client.send_bye(&m.peer_user_id, "0.0.0.0", 0);
            }
            return;
        }

        let verbose = m.verbose_remote();
        let art = if m.secret.is_some() {
            "VERSCHLUESSELTEN"
        } else {
            "UNVERSCHLUESSELTEN"
        };
        self.info(format!("Benutzer {verbose} laedt uns zum {art} Anruf ein..."));

        self.pending_invite = Some(m);
        self.deps.audio.start_ringing();

        if self.deps.auto_answer {
            self.info("Nehme Anruf automatisch an...");
            self.accept_incoming_call(true).await;
        } else {
            self.try_verify_inviting_call(false);
            self.info("Mit :accept annehmen!");

            // Alarmierung zuruecksignalisieren, mit eigenem Schluessel
            let invite = self.pending_invite.clone();
            if let (Some(client), Some(invite)) = (&self.client, invite) {
                let key = self
                    .deps
                    .identity
                    .as_ref()
                    .map(|id| id.signed_public_key_b64().to_string());
                client.send_ring(
                    &invite.peer_user_id,
                    self.deps.channel.local_port(),
                    key.as_deref(),
                );
            }
        }
    }

    /// Gegenstelle alarmiert: Rueckrufton starten, Vertrauen melden
    fn on_ring(&mut self, m: ControlMessage) {
        if m.peer_port == 0 {
            return;
        }
        if self.deps.channel.has_peer() {
            return;
        }
        // Nur die Antwort auf unsere laufende Einladung zaehlt
        let Some(invited) = &self.current_invite else {
            return;
        };
        if !invited.eq_ignore_ascii_case(&m.peer_user_id) {
            return;
        }

        let verbose = m.verbose_remote();
        self.remote_public = m
            .secret
            .as_deref()
            .and_then(|s| PublicEncryptor::from_base64(s, &self.deps.authorized).ok());

        self.info(format!("Benutzer {verbose} wird alarmiert..."));

        if let Some(public) = &self.remote_public {
            if let Some(name) = public.verificator_name() {
                let name = name.to_string();
                self.notify(Notice::Info(format!(
                    "Antwort von {verbose} authentifiziert mit Schluessel '{name}'"
                )));
            } else {
                self.notify(Notice::Error(format!(
                    "Antwort von {verbose} konnte nicht authentifiziert werden"
                )));
            }
        }

        // Nur das Einladungs-Timeout stoppen; die Einladung selbst bleibt,
        // damit das folgende ACCEPT erkannt wird
        self.invite_timeout = -1;
        self.deps.audio.start_ringing();
    }

    /// Einladung wurde angenommen: Medienpfad aufbauen
    async fn on_accept(&mut self, m: ControlMessage) {
        if m.peer_port == 0 {
            return;
        }
        if self.deps.channel.has_peer() {
            return;
        }

        self.invite_timeout = -1;
        self.current_invite = None;

        let verbose = m.verbose_remote();
        let Some(peer_addr) = resolve_peer_addr(&m.peer_addr, m.peer_port).await else {
            self.error(format!(
                "Unbekannter Host '{}'; Anruf wird abgebrochen",
                m.peer_addr
            ));
            self.pending_invite = None;
            return;
        };

        self.info(format!("Benutzer {verbose} hat unsere Einladung angenommen"));

        // Verschluesselten Sitzungsschluessel auspacken und installieren
        self.deps.channel.install_cipher(None);
        let mut cipher = None;

        if let (Some(secret), Some(identity)) = (&m.secret, &self.deps.identity) {
            match identity.unwrap_session_key(secret, &self.deps.authorized) {
                Ok(unwrapped) => cipher = Some(Arc::new(unwrapped)),
                Err(e) => self.error(format!("Sitzungsschluessel nicht auspackbar: {e}")),
            }
        }

        if let Some(cipher) = &cipher {
            self.deps.channel.install_cipher(Some(Arc::clone(cipher)));
        }

        self.establish_call(&m.peer_user_id, peer_addr);
        self.report_cipher_security(cipher.as_deref(), &verbose);
    }

    /// Gegenstelle legt auf (oder weist unsere Einladung ab)
    fn on_bye(&mut self, m: ControlMessage) {
        let verbose = m.verbose_remote();

        if !self.deps.channel.has_peer() && self.current_invite.is_some() {
            self.info(format!("Benutzer {verbose} hat unsere Einladung abgewiesen"));
        } else {
            self.info(format!("Benutzer {verbose} beendet den Anruf"));
        }

        self.teardown_call();
        self.info("***** Anruf beendet *****");
    }

    /// Verschluesselte Sofortnachricht
    fn on_instant_message(&mut self, m: ControlMessage) {
        let Some(cipher) = self.deps.channel.cipher() else {
            return;
        };
        let Some(ciphertext) = &m.secret else {
            return;
        };
        // Nicht entschluesselbare Nachrichten werden still verworfen
        if let Some(clear_text) = cipher.decrypt_text(ciphertext) {
            self.notify(Notice::IncomingText {
                from: m.peer_user_id,
                message: clear_text,
                encrypted: true,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Anrufaufbau und -abbau
    // -----------------------------------------------------------------------

    /// Verifiziert den oeffentlichen Schluessel der einladenden Seite
    fn try_verify_inviting_call(&mut self, silent: bool) -> Option<PublicEncryptor> {
        let invite = self.pending_invite.as_ref()?;
        if self.deps.channel.has_peer() {
            return None;
        }

        let verbose = invite.verbose_remote();
        let public = invite
            .secret
            .as_deref()
            .and_then(|s| PublicEncryptor::from_base64(s, &self.deps.authorized).ok());

        if silent {
            return public;
        }

        match &public {
            Some(p) => {
                if let Some(name) = p.verificator_name() {
                    let name = name.to_string();
                    self.notify(Notice::Security(SecurityLevel::Verified));
                    self.notify(Notice::Info(format!(
                        "Einladung von {verbose} authentifiziert mit Schluessel '{name}'"
                    )));
                } else {
                    self.notify(Notice::Security(SecurityLevel::Unverified));
                    self.notify(Notice::Error(format!(
                        "Einladung von {verbose} konnte nicht authentifiziert werden"
                    )));
                }
            }
            None => {
                self.notify(Notice::Security(SecurityLevel::Unsecured));
                self.error("Der Anruf wird ohne Verschluesselung laufen.");
            }
        }

        public
    }

    /// Nimmt die ausstehende Einladung an (manuell oder Auto-Answer)
    ///
    /// Erzeugt einen frischen Sitzungsschluessel, signiert ihn und
    /// verschluesselt ihn mit dem (verifizierten) Schluessel der
    /// einladenden Seite; dann ACCEPT senden und den Anruf etablieren.
    async fn accept_incoming_call(&mut self, secured_if_possible: bool) {
        let Some(invite) = self.pending_invite.clone() else {
            return; // keine Einladung zum Annehmen
        };
        if self.deps.channel.has_peer() {
            return;
        }

        let verbose = invite.verbose_remote();
        let Some(peer_addr) = resolve_peer_addr(&invite.peer_addr, invite.peer_port).await else {
            self.error(format!(
                "Unbekannter Host '{}'; Anruf wird abgebrochen",
                invite.peer_addr
            ));
            self.pending_invite = None;
            return;
        };

        self.deps.channel.install_cipher(None);
        let mut my_secret: Option<String> = None;

        if secured_if_possible {
            self.remote_public = self.try_verify_inviting_call(true);

            if let (Some(public), Some(identity)) =
                (&self.remote_public, self.deps.identity.clone())
            {
                match Self::wrap_fresh_secret(&mut self.local_cipher, &identity, public) {
                    Ok((wire, cipher)) => {
                        my_secret = Some(wire);
                        self.deps.channel.install_cipher(Some(cipher));
                    }
                    Err(e) => {
                        let meldung = format!("Sitzungsschluessel nicht verpackbar: {e}");
                        self.error(meldung);
                    }
                }
            }
        }

        if let Some(client) = &self.client {
            client.send_accept(
                &invite.peer_user_id,
                self.deps.channel.local_port(),
                my_secret.as_deref(),
            );
        }

        self.establish_call(&invite.peer_user_id, peer_addr);

        let installed = self.deps.channel.cipher();
        let verified = self
            .remote_public
            .as_ref()
            .map(|p| p.is_verified())
            .unwrap_or(false);
        match installed {
            Some(_) if verified => {
                self.notify(Notice::Security(SecurityLevel::Verified));
                self.info(format!("***** Verschluesselter Anruf mit {verbose} etabliert *****"));
            }
            Some(_) => {
                self.notify(Notice::Security(SecurityLevel::Unverified));
                self.info(format!("***** Verschluesselter Anruf mit {verbose} etabliert *****"));
            }
            None => {
                self.notify(Notice::Security(SecurityLevel::Unsecured));
                self.error(format!("***** Unverschluesselter Anruf mit {verbose} etabliert *****"));
            }
        }

        self.pending_invite = None;
    }

    /// Sitzungsschluessel fuer diesen Anruf, signiert und fuer die
    /// Gegenstelle verschluesselt
    ///
    /// Ein mit `:newsecret` vorab erzeugter Schluessel wird verbraucht;
    /// sonst entsteht pro angenommenem Anruf ein frischer.
    fn wrap_fresh_secret(
        local_cipher: &mut Option<Arc<SymmetricCipher>>,
        identity: &Identity,
        public: &PublicEncryptor,
    ) -> Result<(String, Arc<SymmetricCipher>), fluesterfon_crypto::CryptoError> {
        let cipher = match local_cipher.take() {
            Some(cipher) => cipher,
            None => Arc::new(SymmetricCipher::generate_default()?),
        };
        let envelope =
            identity.sign_object(&WireObject::SecretKey(cipher.secret_material().clone()))?;
        let wire = public.encrypt_and_serialize(&envelope)?;
        Ok((wire, cipher))
    }

    /// Baut Peer und Anruf und etabliert die Medienstrecke
    fn establish_call(&mut self, peer_user: &str, peer_addr: SocketAddr) {
        let peer = RemotePeer::new(&self.deps.channel, UserId::new(peer_user), peer_addr);
        let codec = Arc::clone(&self.deps.audio).by_format(SampleFormat::Alaw);
        let call = CallContext::new(codec);
        peer.bind_call(Arc::clone(&call));
        call.set_established(true);
        self.monitor_voice = true;
    }

    /// Meldet die Sicherheitsstufe des ausgepackten Sitzungsschluessels
    fn report_cipher_security(&mut self, cipher: Option<&SymmetricCipher>, verbose: &str) {
        match cipher {
            Some(c) => {
                if let Some(name) = c.verificator_name() {
                    let name = name.to_string();
                    self.notify(Notice::Security(SecurityLevel::Verified));
                    self.notify(Notice::Info(format!(
                        "Sitzungsschluessel von {verbose} authentifiziert mit Schluessel '{name}'"
                    )));
                } else {
                    self.notify(Notice::Security(SecurityLevel::Unverified));
                    self.notify(Notice::Error(format!(
                        "Sitzungsschluessel von {verbose} konnte nicht authentifiziert werden"
                    )));
                }
                self.info(format!("***** Verschluesselter Anruf mit {verbose} etabliert *****"));
            }
            None => {
                self.notify(Notice::Security(SecurityLevel::Unsecured));
                self.error(format!("***** Unverschluesselter Anruf mit {verbose} etabliert *****"));
            }
        }
    }

    /// Setzt den gesamten Anrufzustand zurueck
    fn teardown_call(&mut self) {
        self.deps.channel.remove_peer();
        self.deps.audio.stop_ringing();

        self.pending_invite = None;
        self.remote_public = None;
        self.current_invite = None;
        self.invite_timeout = -1;
        self.monitor_voice = false;

        self.notify(Notice::Security(SecurityLevel::Unsecured));
    }

    // -----------------------------------------------------------------------
    // 1-Hz-Takt
    // -----------------------------------------------------------------------

    async fn timer_tick(&mut self) {
        // Lebenszeichen der Gegenstelle
        if self.monitor_voice {
            if let Some(peer) = self.deps.channel.peer() {
                if self.deps.channel.is_peer_dead(PEER_DEAD_MS) {
                    self.monitor_voice = false;
                    let wer = peer.user_id().to_string();
                    self.warn(format!(
                        "Warnung: Keine Sprache von '{wer}'; Gegenstelle tot?"
                    ));
                }
            }
        }

        // Unbeantwortete Einladung
        if self.invite_timeout >= 0 {
            self.invite_timeout -= 1;
            if self.invite_timeout < 0 {
                let wen = self.current_invite.take().unwrap_or_default();
                self.error(format!("Benutzer '{wen}' scheint nicht verbunden zu sein."));
                self.info("Mit :list die anwesenden Benutzer abfragen...");
                self.invite_timeout = -1;
            }
        }

        // Relay-Verbindung ueberwachen
        if self.client.as_ref().map(|c| c.is_alive()).unwrap_or(false) {
            self.reconnect_timeout = -1;
            self.reconnect_retries = 0;
            return;
        }

        if self.reconnect_retries >= MAX_RECONNECT_RETRIES {
            if self.reconnect_retries == MAX_RECONNECT_RETRIES {
                self.reconnect_retries += 1;
                self.notify(Notice::PbxStatus("Tot".into()));
                self.error("Relay nicht erreichbar; Ruhezustand bis zum Neustart.");
            }
            return; // dormant
        }

        if self.reconnect_timeout < 0 {
            self.notify(Notice::PbxStatus("Getrennt".into()));
            self.info(format!("Wiederverbindung in {RECONNECT_DELAY_S} Sekunden..."));
            self.reconnect_timeout = RECONNECT_DELAY_S;
            return;
        }

        self.reconnect_timeout -= 1;
        if self.reconnect_timeout > 0 {
            return;
        }

        self.reconnect_retries += 1;
        self.info(format!(
            "Versuch #{} von {MAX_RECONNECT_RETRIES}:",
            self.reconnect_retries
        ));
        self.reconnect_timeout = -1;
        self.connect_rendezvous().await;
    }

    // -----------------------------------------------------------------------
    // Abschluss & Meldungen
    // -----------------------------------------------------------------------

    fn shutdown(&mut self) {
        self.teardown_call();
        if let Some(client) = self.client.take() {
            client.close();
        }
        self.deps.channel.stop();
        self.deps.audio.shutdown();
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn info(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("{text}");
        self.notify(Notice::Info(text));
    }

    fn warn(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!("{text}");
        self.notify(Notice::Warn(text));
    }

    fn error(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::error!("{text}");
        self.notify(Notice::Error(text));
    }
}

/// Loest Host und Port zur Socket-Adresse auf
async fn resolve_peer_addr(addr: &str, port: u16) -> Option<SocketAddr> {
    match tokio::net::lookup_host((addr, port)).await {
        Ok(mut candidates) => candidates.next(),
        Err(e) => {
            tracing::error!(host = addr, fehler = %e, "Hostaufloesung fehlgeschlagen");
            None
        }
    }
}
