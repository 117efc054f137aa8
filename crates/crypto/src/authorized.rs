//! Autorisierte oeffentliche Schluessel (Vertrauensanker)
//!
//! Zeilenbasierte Datei: jede nicht-leere Zeile, die nicht mit `#` beginnt,
//! traegt als erstes Wort einen Base64-kodierten `NamedPublicKey`, danach
//! Freitext-Kommentar. Defekte Zeilen werden geloggt und uebersprungen.
//!
//! Ein Reload ersetzt die Liste atomar (Arc-Tausch); waehrend einer
//! laufenden Verifikation bleibt die alte Liste unveraendert sichtbar.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha1::Sha1;

use crate::error::CryptoResult;
use crate::objects::{NamedPublicKey, SignedEnvelope, WireObject};

/// Prozessweite Liste autorisierter Schluessel
#[derive(Debug, Default)]
pub struct AuthorizedKeys {
    keys: RwLock<Arc<Vec<NamedPublicKey>>>,
}

impl AuthorizedKeys {
    /// Erstellt eine leere Liste
    pub fn empty() -> Self {
        Self::default()
    }

    /// Anzahl der geladenen Schluessel
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Gibt true zurueck wenn keine Schluessel geladen sind
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Laedt die Schluessel neu aus der Datei und ersetzt die Liste atomar
    ///
    /// Gibt die Anzahl der uebernommenen Schluessel zurueck.
    pub fn reload_from(&self, path: &Path) -> CryptoResult<usize> {
        let text = std::fs::read_to_string(path)?;
        let mut fresh: Vec<NamedPublicKey> = Vec::new();

        for line in text.lines() {
            let mut words = line.split_whitespace();
            let Some(first) = words.next() else {
                continue; // Leerzeile
            };
            if first.starts_with('#') {
                continue;
            }

            match WireObject::from_base64(first) {
                Ok(WireObject::PublicKey(key)) => {
                    tracing::debug!(kommentar = %key.comment, "Autorisierter Schluessel geladen");
                    fresh.push(key);
                }
                Ok(other) => {
                    tracing::warn!(
                        zeile = first,
                        "Eintrag ignoriert: unerwarteter Objekttyp {other:?}"
                    );
                }
                Err(e) => {
                    tracing::warn!(zeile = first, fehler = %e, "Eintrag nicht dekodierbar");
                }
            }
        }

        let count = fresh.len();
        if count > 0 {
            let namen: Vec<&str> = fresh.iter().map(|k| k.comment.as_str()).collect();
            tracing::info!(anzahl = count, schluessel = ?namen, "Autorisierte Schluessel geladen");
        }

        *self.keys.write() = Arc::new(fresh);
        Ok(count)
    }

    /// Verifiziert einen signierten Umschlag gegen die Liste
    ///
    /// Gibt den Kommentar des ersten Schluessels zurueck, der die Signatur
    /// validiert, sonst `None`. Einzelne Schluesselfehler werden ignoriert
    /// und die Suche fortgesetzt.
    pub fn verify(&self, envelope: &SignedEnvelope) -> Option<String> {
        let keys = self.keys.read().clone();

        let Ok(signature) = Signature::try_from(envelope.signature.as_slice()) else {
            return None;
        };

        for auth in keys.iter() {
            let Ok(public_key) = auth.public_key() else {
                continue;
            };
            let verifying = VerifyingKey::<Sha1>::new(public_key);
            if verifying.verify(&envelope.payload, &signature).is_ok() {
                return Some(auth.comment.clone());
            }
        }

        None
    }

    /// Fuegt einen Schluessel direkt hinzu (Tests, programmatische Pflege)
    pub fn insert(&self, key: NamedPublicKey) {
        let mut guard = self.keys.write();
        let mut fresh = guard.as_ref().clone();
        fresh.push(key);
        *guard = Arc::new(fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::keystore::Keystore;
    use crate::objects::SecretKeyMaterial;

    fn test_identity() -> (tempfile::TempDir, Identity) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Keystore::open_at(tmp.path().join("mykf")).unwrap();
        let id = Identity::load_or_generate(&store).unwrap();
        (tmp, id)
    }

    #[test]
    fn verify_findet_passenden_schluessel() {
        let (_tmp, id) = test_identity();
        let auth = AuthorizedKeys::empty();
        auth.insert(id.named_public_key());

        let inner = WireObject::SecretKey(SecretKeyMaterial {
            algorithm: "Blowfish".into(),
            key: vec![1, 2, 3, 4],
        });
        let env = id.sign_object(&inner).unwrap();

        let verifikator = auth.verify(&env);
        assert_eq!(verifikator.as_deref(), Some(id.comment()));
    }

    #[test]
    fn verify_ohne_passenden_schluessel_none() {
        let (_tmp1, signer) = test_identity();
        let (_tmp2, fremd) = test_identity();

        let auth = AuthorizedKeys::empty();
        auth.insert(fremd.named_public_key());

        let inner = WireObject::SecretKey(SecretKeyMaterial {
            algorithm: "Blowfish".into(),
            key: vec![9],
        });
        let env = signer.sign_object(&inner).unwrap();
        assert!(auth.verify(&env).is_none());
    }

    #[test]
    fn verify_reihenfolge_egal() {
        let (_tmp1, signer) = test_identity();
        let (_tmp2, fremd) = test_identity();

        let inner = WireObject::SecretKey(SecretKeyMaterial {
            algorithm: "Blowfish".into(),
            key: vec![7],
        });
        let env = signer.sign_object(&inner).unwrap();

        let vorn = AuthorizedKeys::empty();
        vorn.insert(signer.named_public_key());
        vorn.insert(fremd.named_public_key());

        let hinten = AuthorizedKeys::empty();
        hinten.insert(fremd.named_public_key());
        hinten.insert(signer.named_public_key());

        assert_eq!(vorn.verify(&env), hinten.verify(&env));
        assert!(vorn.verify(&env).is_some());
    }

    #[test]
    fn manipulierte_nutzdaten_abgelehnt() {
        let (_tmp, id) = test_identity();
        let auth = AuthorizedKeys::empty();
        auth.insert(id.named_public_key());

        let inner = WireObject::SecretKey(SecretKeyMaterial {
            algorithm: "Blowfish".into(),
            key: vec![1],
        });
        let mut env = id.sign_object(&inner).unwrap();
        env.payload[0] ^= 0xFF;
        assert!(auth.verify(&env).is_none());
    }

    #[test]
    fn reload_ueberspringt_defekte_zeilen() {
        let (_tmp, id) = test_identity();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("auth.txt");

        let key_obj = WireObject::PublicKey(id.named_public_key());
        let gueltig = key_obj.to_base64().unwrap();

        let inhalt = format!(
            "# Kommentarzeile\n\nkaputt-kein-base64 irgendwas\n{gueltig} {}\n",
            id.comment()
        );
        std::fs::write(&path, inhalt).unwrap();

        let auth = AuthorizedKeys::empty();
        let n = auth.reload_from(&path).unwrap();
        assert_eq!(n, 1);
        assert_eq!(auth.len(), 1);
    }

    #[test]
    fn reload_ersetzt_bestand() {
        let (_tmp, id) = test_identity();
        let auth = AuthorizedKeys::empty();
        auth.insert(id.named_public_key());
        assert_eq!(auth.len(), 1);

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("leer.txt");
        std::fs::write(&path, "").unwrap();

        auth.reload_from(&path).unwrap();
        assert!(auth.is_empty());
    }
}
