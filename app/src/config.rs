//! Endpunkt-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Endpunkt ohne Konfigurationsdatei
//! lauffaehig ist. Die Kommandozeile (`<host> <port>`) ueberschreibt den
//! Rendezvous-Abschnitt.

use serde::{Deserialize, Serialize};

/// Vollstaendige Endpunkt-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Rendezvous-Relay
    pub rendezvous: RendezvousEinstellungen,
    /// UDP-Medientransport
    pub udp: UdpEinstellungen,
    /// Benutzer-Einstellungen
    pub benutzer: BenutzerEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Rendezvous-Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousEinstellungen {
    /// Hostname oder IP des Relays
    pub host: String,
    /// TCP-Port des Relays
    pub port: u16,
}

impl Default for RendezvousEinstellungen {
    fn default() -> Self {
        Self {
            host: "atlas.dsv.su.se".into(),
            port: 9494,
        }
    }
}

/// UDP-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpEinstellungen {
    /// Basis-Port; gebunden wird der erste freie in [basis, basis+100)
    pub basis_port: u16,
}

impl Default for UdpEinstellungen {
    fn default() -> Self {
        Self { basis_port: 47000 }
    }
}

/// Benutzer-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenutzerEinstellungen {
    /// Anzeigename auf dem Relay (leer: Login-Name des Systems)
    pub name: String,
    /// Eingehende Einladungen automatisch annehmen
    pub auto_answer: bool,
}

impl Default for BenutzerEinstellungen {
    fn default() -> Self {
        Self {
            name: String::new(),
            auto_answer: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl EndpointConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(pfad, "Keine Konfigurationsdatei, verwende Standardwerte");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Benutzername mit Fallback auf den System-Login
    pub fn benutzername(&self) -> String {
        if !self.benutzer.name.trim().is_empty() {
            return self.benutzer.name.clone();
        }
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "[Anonymous]".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = EndpointConfig::default();
        assert_eq!(cfg.rendezvous.port, 9494);
        assert_eq!(cfg.udp.basis_port, 47000);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.benutzer.auto_answer);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [rendezvous]
            host = "relay.example.org"

            [benutzer]
            name = "alice"
            auto_answer = true
        "#;
        let cfg: EndpointConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.rendezvous.host, "relay.example.org");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.rendezvous.port, 9494);
        assert_eq!(cfg.benutzername(), "alice");
        assert!(cfg.benutzer.auto_answer);
    }

    #[test]
    fn benutzername_fallback() {
        let cfg = EndpointConfig::default();
        // Irgendein nicht-leerer Name (System-Login oder Anonymous)
        assert!(!cfg.benutzername().is_empty());
    }
}
