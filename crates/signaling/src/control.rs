//! Grammatik der Rendezvous-Zeilen
//!
//! ```text
//! [ [ <userId> ] ":: " ] <text-oder-steuerung>
//! ```
//!
//! Standard-Absender ist `[Anonymous]`. Steuernachrichten beginnen mit
//! `[$]` und werden nie angezeigt:
//!
//! ```text
//! [$] INVITE <localName> <remoteAddr> <remoteUdpPort> [ <publicKey> ]
//! [$] RING   <localName> <remoteAddr> <remoteUdpPort> [ <publicKey> ]
//! [$] ACCEPT <localName> <remoteAddr> <remoteUdpPort> [ <secretKey> ]
//! [$] BYE    <localName> [ <remoteAddr> [ <remoteUdpPort> ] ]
//! [$] IMSG   <localName> <ciphertext>
//! [$] LIST   [ <usernameRegex> ]
//! [$] ALIVE
//! ```
//!
//! Routing: gerichtete Verben (alle ausser LIST/ALIVE) werden verworfen,
//! wenn der Zielname nicht der eigene ist oder der Absender wir selbst
//! sind (Echo-Unterdrueckung). Nicht-ganzzahlige Ports und falsche
//! Stelligkeit fuehren zum stillen Ignorieren der Zeile.

/// Absendername, wenn die Zeile keinen traegt
pub const ANONYMOUS: &str = "[Anonymous]";

/// Marker einer Steuernachricht
const CONTROL_TOKEN: &str = "[$]";

/// Gruss-Praefix des Relay-Dialekts
const GREETING_PREFIX: &str = "WWHHOO: ";

/// Typ einer Steuernachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    /// Anruf-Einladung
    Invite,
    /// Gegenstelle alarmiert den Benutzer
    Ring,
    /// Einladung angenommen
    Accept,
    /// Anruf beendet oder abgewiesen
    Bye,
    /// Verschluesselte Sofortnachricht
    InstantMessage,
}

impl ControlType {
    /// Verb auf dem Draht
    pub fn verb(self) -> &'static str {
        match self {
            Self::Invite => "INVITE",
            Self::Ring => "RING",
            Self::Accept => "ACCEPT",
            Self::Bye => "BYE",
            Self::InstantMessage => "IMSG",
        }
    }
}

/// Geparste Steuernachricht (an uns gerichtet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Nachrichtentyp
    pub typ: ControlType,
    /// Benutzerkennung der Gegenstelle (Absender)
    pub peer_user_id: String,
    /// Eigene Benutzerkennung (Ziel der Nachricht)
    pub local_user_id: String,
    /// IP-Adresse der Gegenstelle
    pub peer_addr: String,
    /// UDP-Port der Gegenstelle
    pub peer_port: u16,
    /// Base64-Schluessel bzw. -Ciphertext, falls vorhanden
    pub secret: Option<String>,
}

impl ControlMessage {
    /// Lesbare Beschreibung der Gegenstelle
    pub fn verbose_remote(&self) -> String {
        if self.peer_addr.is_empty() || self.peer_port == 0 {
            format!("'{}'", self.peer_user_id)
        } else {
            format!("'{}' @ {}:{}", self.peer_user_id, self.peer_addr, self.peer_port)
        }
    }
}

/// Ergebnis des Zeilen-Parsers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// An uns gerichtete Steuernachricht
    Control(ControlMessage),
    /// Chat-Zeile fuer den Menschen
    Text { user_id: String, message: String },
    /// LIST-Anfrage (wir antworten ggf. mit ALIVE)
    ListQuery { from: String, regex: Option<String> },
    /// ALIVE-Antwort eines Peers
    Alive { from: String },
}

/// Parst eine Server-Zeile im Kontext der eigenen Benutzerkennung
///
/// `None` bedeutet: Zeile wird still ignoriert (fremdes Ziel, eigenes
/// Echo, defekte Stelligkeit oder nicht-ganzzahliger Port).
pub fn parse_line(line: &str, local_user: &str) -> Option<InboundEvent> {
    let (user_id, body) = split_sender(line);

    let words: Vec<&str> = body.split_whitespace().collect();

    let is_control =
        user_id != ANONYMOUS && words.first().copied() == Some(CONTROL_TOKEN);
    if !is_control {
        return Some(InboundEvent::Text {
            user_id: user_id.to_string(),
            message: body.to_string(),
        });
    }

    parse_control(user_id, &words, local_user)
}

/// Trennt `[<user> :: ]<body>`; erkennt auch den Relay-Gruss
fn split_sender(line: &str) -> (&str, &str) {
    if let Some(rest) = line.strip_prefix(GREETING_PREFIX) {
        return ("WWHHOO", rest);
    }

    match line.split_once(":: ") {
        Some((user, body)) => {
            let user = user.trim();
            if user.is_empty() {
                (ANONYMOUS, body)
            } else {
                (user, body)
            }
        }
        None => (ANONYMOUS, line),
    }
}

fn parse_control(remote_user: &str, args: &[&str], local_user: &str) -> Option<InboundEvent> {
    let verb = args.get(1)?;

    let typ = if verb.eq_ignore_ascii_case("invite") {
        Some(ControlType::Invite)
    } else if verb.eq_ignore_ascii_case("ring") {
        Some(ControlType::Ring)
    } else if verb.eq_ignore_ascii_case("accept") {
        Some(ControlType::Accept)
    } else if verb.eq_ignore_ascii_case("bye") {
        Some(ControlType::Bye)
    } else if verb.eq_ignore_ascii_case("imsg") {
        Some(ControlType::InstantMessage)
    } else if verb.eq_ignore_ascii_case("list") {
        return Some(InboundEvent::ListQuery {
            from: remote_user.to_string(),
            regex: args.get(2).map(|s| s.to_string()),
        });
    } else if verb.eq_ignore_ascii_case("alive") {
        return Some(InboundEvent::Alive {
            from: remote_user.to_string(),
        });
    } else {
        None // unbekannte Verben ignorieren
    };
    let typ = typ?;

    // Gerichtete Verben: Echo-Unterdrueckung und Ziel-Pruefung
    let destination = *args.get(2)?;
    if remote_user.eq_ignore_ascii_case(destination) {
        return None;
    }
    if !destination.eq_ignore_ascii_case(local_user) {
        return None;
    }

    let message = match typ {
        ControlType::Invite | ControlType::Ring | ControlType::Accept => {
            if args.len() < 5 {
                return None;
            }
            let peer_port: u16 = args[4].parse().ok()?;
            ControlMessage {
                typ,
                peer_user_id: remote_user.to_string(),
                local_user_id: destination.to_string(),
                peer_addr: args[3].to_string(),
                peer_port,
                secret: args.get(5).map(|s| s.to_string()),
            }
        }
        ControlType::Bye => {
            let peer_addr = args.get(3).copied().unwrap_or("").to_string();
            let peer_port: u16 = match args.get(4) {
                Some(word) => word.parse().ok()?,
                None => 0,
            };
            ControlMessage {
                typ,
                peer_user_id: remote_user.to_string(),
                local_user_id: destination.to_string(),
                peer_addr,
                peer_port,
                secret: None,
            }
        }
        ControlType::InstantMessage => {
            let ciphertext = *args.get(3)?;
            ControlMessage {
                typ,
                peer_user_id: remote_user.to_string(),
                local_user_id: destination.to_string(),
                peer_addr: String::new(),
                peer_port: 0,
                secret: Some(ciphertext.to_string()),
            }
        }
    };

    Some(InboundEvent::Control(message))
}

// ---------------------------------------------------------------------------
// Emission (spiegelt das Parsen)
// ---------------------------------------------------------------------------

/// `[$] INVITE <remote> <addr> <port> [ <key> ]`
pub fn format_invite(remote_user: &str, local_addr: &str, udp_port: u16, key: Option<&str>) -> String {
    format_call_verb("INVITE", remote_user, local_addr, udp_port, key)
}

/// `[$] RING <remote> <addr> <port> [ <key> ]`
pub fn format_ring(remote_user: &str, local_addr: &str, udp_port: u16, key: Option<&str>) -> String {
    format_call_verb("RING", remote_user, local_addr, udp_port, key)
}

/// `[$] ACCEPT <remote> <addr> <port> [ <key> ]`
pub fn format_accept(remote_user: &str, local_addr: &str, udp_port: u16, key: Option<&str>) -> String {
    format_call_verb("ACCEPT", remote_user, local_addr, udp_port, key)
}

/// `[$] BYE <remote> <addr> <port>`
pub fn format_bye(remote_user: &str, local_addr: &str, udp_port: u16) -> String {
    format!("{CONTROL_TOKEN} BYE {remote_user} {local_addr} {udp_port}")
}

/// `[$] IMSG <remote> <ciphertext>`
pub fn format_imsg(remote_user: &str, ciphertext: &str) -> String {
    format!("{CONTROL_TOKEN} IMSG {remote_user} {ciphertext}")
}

/// `[$] LIST [ <regex> ]`
pub fn format_list(regex: Option<&str>) -> String {
    match regex {
        Some(r) => format!("{CONTROL_TOKEN} LIST {r}"),
        None => format!("{CONTROL_TOKEN} LIST"),
    }
}

/// `[$] ALIVE`
pub fn format_alive() -> String {
    format!("{CONTROL_TOKEN} ALIVE")
}

fn format_call_verb(
    verb: &str,
    remote_user: &str,
    local_addr: &str,
    udp_port: u16,
    key: Option<&str>,
) -> String {
    match key {
        Some(k) => format!("{CONTROL_TOKEN} {verb} {remote_user} {local_addr} {udp_port} {k}"),
        None => format!("{CONTROL_TOKEN} {verb} {remote_user} {local_addr} {udp_port}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "alice";

    fn parse(line: &str) -> Option<InboundEvent> {
        parse_line(line, ME)
    }

    #[test]
    fn chat_zeile_mit_absender() {
        let ev = parse("bob :: hallo zusammen").unwrap();
        assert_eq!(
            ev,
            InboundEvent::Text {
                user_id: "bob".into(),
                message: "hallo zusammen".into()
            }
        );
    }

    #[test]
    fn chat_zeile_ohne_absender_ist_anonym() {
        let ev = parse("nur text").unwrap();
        match ev {
            InboundEvent::Text { user_id, .. } => assert_eq!(user_id, ANONYMOUS),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn relay_gruss_wird_erkannt() {
        let ev = parse("WWHHOO: Willkommen!").unwrap();
        match ev {
            InboundEvent::Text { user_id, message } => {
                assert_eq!(user_id, "WWHHOO");
                assert_eq!(message, "Willkommen!");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn anonyme_steuernachricht_bleibt_text() {
        // Steuerung vom Anonymus wird nicht als Steuerung behandelt
        let ev = parse("[$] INVITE alice 10.0.0.1 47000").unwrap();
        assert!(matches!(ev, InboundEvent::Text { .. }));
    }

    #[test]
    fn invite_an_uns_geparst() {
        let ev = parse("bob :: [$] INVITE alice 10.0.0.1 47000 QUJD").unwrap();
        match ev {
            InboundEvent::Control(m) => {
                assert_eq!(m.typ, ControlType::Invite);
                assert_eq!(m.peer_user_id, "bob");
                assert_eq!(m.local_user_id, "alice");
                assert_eq!(m.peer_addr, "10.0.0.1");
                assert_eq!(m.peer_port, 47000);
                assert_eq!(m.secret.as_deref(), Some("QUJD"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn invite_ohne_schluessel() {
        let ev = parse("bob :: [$] INVITE alice 10.0.0.1 47000").unwrap();
        match ev {
            InboundEvent::Control(m) => assert!(m.secret.is_none()),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn fremdes_ziel_wird_verworfen() {
        assert!(parse("bob :: [$] INVITE carol 10.0.0.1 47000").is_none());
    }

    #[test]
    fn eigenes_echo_wird_verworfen() {
        // Absender == Ziel (Schleife) wird unterdrueckt
        assert!(parse("alice :: [$] INVITE alice 10.0.0.1 47000").is_none());
        // Unser eigener INVITE an bob kommt als Echo zurueck: Ziel != wir
        assert!(parse("alice :: [$] INVITE bob 10.0.0.1 47000").is_none());
    }

    #[test]
    fn ziel_vergleich_case_insensitiv() {
        let ev = parse("bob :: [$] RING ALICE 10.0.0.1 47000").unwrap();
        assert!(matches!(ev, InboundEvent::Control(_)));
    }

    #[test]
    fn nicht_ganzzahliger_port_ignoriert() {
        assert!(parse("bob :: [$] INVITE alice 10.0.0.1 port").is_none());
        assert!(parse("bob :: [$] BYE alice 10.0.0.1 kaputt").is_none());
    }

    #[test]
    fn falsche_stelligkeit_ignoriert() {
        assert!(parse("bob :: [$] INVITE alice").is_none());
        assert!(parse("bob :: [$] INVITE alice 10.0.0.1").is_none());
        assert!(parse("bob :: [$] IMSG alice").is_none());
    }

    #[test]
    fn bye_kurzform() {
        let ev = parse("bob :: [$] BYE alice").unwrap();
        match ev {
            InboundEvent::Control(m) => {
                assert_eq!(m.typ, ControlType::Bye);
                assert_eq!(m.peer_addr, "");
                assert_eq!(m.peer_port, 0);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn bye_langform() {
        let ev = parse("bob :: [$] BYE alice 10.0.0.2 47001").unwrap();
        match ev {
            InboundEvent::Control(m) => {
                assert_eq!(m.peer_addr, "10.0.0.2");
                assert_eq!(m.peer_port, 47001);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn imsg_geparst() {
        let ev = parse("bob :: [$] IMSG alice Q2lwaGVy").unwrap();
        match ev {
            InboundEvent::Control(m) => {
                assert_eq!(m.typ, ControlType::InstantMessage);
                assert_eq!(m.secret.as_deref(), Some("Q2lwaGVy"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn list_und_alive() {
        let ev = parse("bob :: [$] LIST al.*").unwrap();
        assert_eq!(
            ev,
            InboundEvent::ListQuery {
                from: "bob".into(),
                regex: Some("al.*".into())
            }
        );

        let ev = parse("bob :: [$] LIST").unwrap();
        assert!(matches!(ev, InboundEvent::ListQuery { regex: None, .. }));

        let ev = parse("bob :: [$] ALIVE").unwrap();
        assert_eq!(ev, InboundEvent::Alive { from: "bob".into() });
    }

    #[test]
    fn verben_case_insensitiv() {
        let ev = parse("bob :: [$] invite alice 10.0.0.1 47000").unwrap();
        assert!(matches!(ev, InboundEvent::Control(_)));
    }

    #[test]
    fn unbekanntes_verb_ignoriert() {
        assert!(parse("bob :: [$] TRANSFER alice 10.0.0.1 47000").is_none());
    }

    #[test]
    fn emission_spiegelt_parsen() {
        let line = format!("bob :: {}", format_invite("alice", "10.0.0.1", 47000, Some("S0VZ")));
        let ev = parse_line(&line, "alice").unwrap();
        match ev {
            InboundEvent::Control(m) => {
                assert_eq!(m.typ, ControlType::Invite);
                assert_eq!(m.secret.as_deref(), Some("S0VZ"));
            }
            other => panic!("{other:?}"),
        }

        let line = format!("bob :: {}", format_bye("alice", "10.0.0.1", 47000));
        assert!(matches!(
            parse_line(&line, "alice"),
            Some(InboundEvent::Control(ControlMessage {
                typ: ControlType::Bye,
                ..
            }))
        ));

        assert_eq!(format_list(None), "[$] LIST");
        assert_eq!(format_alive(), "[$] ALIVE");
        assert_eq!(format_imsg("bob", "QUJD"), "[$] IMSG bob QUJD");
    }
}
