//! Fluesterfon – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert Logging und Krypto-Subsystem,
//! verdrahtet Audio, UDP-Kanal und Session-Controller und treibt eine
//! schlanke Kommando-Shell auf stdin:
//!
//! ```text
//! :call <name>      unverschluesselt anrufen
//! :call+ <name>     verschluesselt anrufen
//! :accept           eingehende Einladung annehmen
//! :bye              auflegen / abweisen
//! :msg <text>       vertrauliche Nachricht an die Gegenstelle
//! :list [regex]     anwesende Benutzer abfragen
//! :reauth           autorisierte Schluessel neu laden
//! :newsecret        lokalen Sitzungsschluessel erneuern
//! :mykey            eigenen oeffentlichen Schluessel verschicken
//! :quit             beenden
//! ```
//!
//! Jede andere Eingabe geht als Chat-Zeile an alle.

mod config;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use fluesterfon_audio::{PcmAudio, SimulatedDevice, LLBS, SAMPLE_SIZE};
use fluesterfon_core::UserId;
use fluesterfon_crypto::{AuthorizedKeys, Identity, Keystore};
use fluesterfon_media::DatagramChannel;
use fluesterfon_session::{Command, Notice, SessionController, SessionDeps};

use config::EndpointConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad =
        std::env::var("FLUESTERFON_CONFIG").unwrap_or_else(|_| "fluesterfon.toml".into());
    let mut config = EndpointConfig::laden(&config_pfad)?;

    // Kommandozeile: [ <host> [ <port> ] ] ueberschreibt die Konfiguration
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(host) = args.first() {
        config.rendezvous.host = host.clone();
    }
    if let Some(port) = args.get(1) {
        match port.parse() {
            Ok(port) => config.rendezvous.port = port,
            Err(_) => tracing::warn!(
                standard = config.rendezvous.port,
                "Port nicht ganzzahlig, verwende Standard"
            ),
        }
    }

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        relay = %format!("{}:{}", config.rendezvous.host, config.rendezvous.port),
        "Fluesterfon startet"
    );

    // Schluesselablage und Identitaet (Erzeugung kann dauern -> Worker)
    let keystore = Keystore::open_default()?;
    let authorized = Arc::new(AuthorizedKeys::empty());
    if let Ok(path) = keystore.ensure_authorized_keys_file() {
        let _ = authorized.reload_from(&path);
    }

    let identity = {
        let keystore = keystore.clone();
        tokio::task::spawn_blocking(move || Identity::load_or_generate(&keystore)).await?
    };
    let identity = match identity {
        Ok(id) => {
            tracing::info!(schluessel = %id.comment(), "Identitaet einsatzbereit");
            Some(Arc::new(id))
        }
        Err(e) => {
            // Ohne Identitaet bleibt der unverschluesselte Betrieb moeglich
            tracing::error!(fehler = %e, "Krypto-Subsystem nicht einsatzbereit");
            None
        }
    };

    // Audio: simulierte PCM-Geraete (die Hardware-Anbindung ist ein
    // externer Mitspieler hinter dem PcmDevice-Trait)
    let input = Arc::new(SimulatedDevice::new(SAMPLE_SIZE, SAMPLE_SIZE * LLBS));
    let output = Arc::new(SimulatedDevice::new(SAMPLE_SIZE, SAMPLE_SIZE * LLBS));
    let audio = PcmAudio::with_devices(Some(input), Some(output));
    audio.start();

    // UDP-Kanal
    let channel = DatagramChannel::bind(config.udp.basis_port).await?;
    channel.start();
    tracing::info!(port = channel.local_port(), "Medientransport bereit");

    // Session-Controller
    let deps = SessionDeps {
        host: config.rendezvous.host.clone(),
        port: config.rendezvous.port,
        user_id: UserId::new(&config.benutzername()),
        auto_answer: config.benutzer.auto_answer,
        identity,
        authorized,
        keystore,
        audio,
        channel,
    };
    let (controller, notice_rx) = SessionController::new(deps);
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let notice_task = tokio::spawn(print_notices(notice_rx));
    let shell_task = tokio::spawn(command_shell(command_tx));

    controller.run(command_rx).await;

    shell_task.abort();
    notice_task.abort();
    tracing::info!("Fluesterfon beendet");
    Ok(())
}

/// Gibt Controller-Meldungen auf stdout aus
async fn print_notices(mut notices: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        match notice {
            Notice::Info(text) => println!("  {text}"),
            Notice::Warn(text) => println!("! {text}"),
            Notice::Error(text) => println!("!! {text}"),
            Notice::Security(level) => println!("[Sicherheit: {level}]"),
            Notice::PbxStatus(text) => println!("[Relay: {text}]"),
            Notice::IncomingText {
                from,
                message,
                encrypted,
            } => {
                let marker = if encrypted { " [verschluesselt]" } else { "" };
                println!("{from}{marker}: {message}");
            }
        }
    }
}

/// Liest stdin-Zeilen und uebersetzt sie in Controller-Kommandos
async fn command_shell(commands: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim().to_string()),
            None => (line.as_str(), String::new()),
        };

        let command = match cmd {
            ":call" | ":invite" => Some(Command::Dial {
                user: rest,
                secure: false,
            }),
            ":call+" | ":invite+" => Some(Command::Dial {
                user: rest,
                secure: true,
            }),
            ":accept" | ":answer" => Some(Command::Accept),
            ":bye" | ":hangup" => Some(Command::Hangup),
            ":msg" => Some(Command::SendMessage(rest)),
            ":list" => Some(Command::ListPeers(if rest.is_empty() {
                None
            } else {
                Some(rest)
            })),
            ":reauth" => Some(Command::ReloadAuthorizedKeys),
            ":newsecret" => Some(Command::NewSecret),
            ":mykey" => Some(Command::ShareMyKey),
            ":quit" | ":exit" => Some(Command::Quit),
            _ if cmd.starts_with(':') => {
                println!("!! Unbekanntes Kommando: {cmd}");
                None
            }
            // Alles andere ist eine Chat-Zeile an alle
            _ => Some(Command::Broadcast(line.clone())),
        };

        let Some(command) = command else {
            continue;
        };
        let quit = matches!(command, Command::Quit);
        if commands.send(command).is_err() || quit {
            break;
        }
    }
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
