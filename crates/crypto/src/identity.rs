//! Langlebige asymmetrische Identitaet (RSA-1024)
//!
//! Laedt das persistierte Schluesselpaar oder erzeugt beim ersten Start ein
//! neues, signiert Objekte mit SHA1withRSA und entschluesselt den vom Peer
//! geschickten Sitzungsschluessel.
//!
//! Schluesseltransport schematisch:
//!
//! ```text
//! Senden:       SecretKey >> signieren >> serialisieren >> RSA-CBC >> Base64
//! Rekonstruktion: Base64 >> RSA-CBC dec >> deserialisieren >> verifizieren >> SecretKey
//! ```
//!
//! RSA kennt kein natives CBC; der CBC-Modus wird in Software ueber dem
//! PKCS#1-v1.5-ECB nachgebildet (`decrypt`, Gegenstueck in
//! `PublicEncryptor::encrypt`).

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::authorized::AuthorizedKeys;
use crate::error::{CryptoError, CryptoResult};
use crate::keystore::Keystore;
use crate::objects::{NamedKeyPair, NamedPublicKey, SecretKeyMaterial, SignedEnvelope, WireObject};
use crate::public_encryptor::PublicEncryptor;
use crate::symmetric::SymmetricCipher;

/// Schluessellaenge des Paars in Bits
const KEY_SIZE_BITS: usize = 1024;

/// Umfang der Zufallsdaten fuer die Plausibilitaetspruefung
const SANITY_CHECK_LEN: usize = 2048;

/// Langlebige Identitaet: Schluesselpaar plus signierter oeffentlicher Schluessel
pub struct Identity {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    comment: String,
    signed_public_b64: String,
}

impl Identity {
    /// Laedt das gespeicherte Paar oder erzeugt ein neues
    ///
    /// Ein geladenes Paar, das die Plausibilitaetspruefung nicht besteht,
    /// wird genau einmal durch ein frisch erzeugtes ersetzt. Scheitert auch
    /// das erzeugte Paar, ist das Krypto-Subsystem nicht einsatzbereit
    /// (die Signalisierung laeuft dann unverschluesselt weiter).
    pub fn load_or_generate(store: &Keystore) -> CryptoResult<Self> {
        let mut loaded = Self::load_saved(store);
        let mut was_loaded = loaded.is_some();

        loop {
            let (private_key, public_key, comment) = match loaded.take() {
                Some(pair) => pair,
                None => Self::generate()?,
            };

            let candidate = Self::assemble(private_key, public_key, comment)?;

            if candidate.sanity_check() {
                if !was_loaded {
                    candidate.persist(store)?;
                }
                return Ok(candidate);
            }

            if was_loaded {
                tracing::warn!("Plausibilitaetspruefung des geladenen Paars fehlgeschlagen, erzeuge neues");
                was_loaded = false;
                continue;
            }

            tracing::error!("Plausibilitaetspruefung des erzeugten Paars fehlgeschlagen");
            return Err(CryptoError::SanityCheck);
        }
    }

    fn assemble(
        private_key: RsaPrivateKey,
        public_key: RsaPublicKey,
        comment: String,
    ) -> CryptoResult<Self> {
        let mut identity = Self {
            private_key,
            public_key,
            comment,
            signed_public_b64: String::new(),
        };

        let named = identity.named_public_key();
        let envelope = identity.sign_object(&WireObject::PublicKey(named))?;
        identity.signed_public_b64 = WireObject::Signed(envelope).to_base64()?;

        Ok(identity)
    }

    fn load_saved(store: &Keystore) -> Option<(RsaPrivateKey, RsaPublicKey, String)> {
        let path = store.private_key_path();
        let object = match store.load_object(&path) {
            Ok(o) => o,
            Err(e) => {
                tracing::trace!(datei = %path.display(), fehler = %e, "Kein gespeichertes Schluesselpaar");
                return None;
            }
        };

        Self::pair_from_object(object)
    }

    fn pair_from_object(object: WireObject) -> Option<(RsaPrivateKey, RsaPublicKey, String)> {
        let WireObject::KeyPair(pair) = object else {
            tracing::warn!("Private Schluesseldatei enthaelt unerwarteten Objekttyp");
            return None;
        };

        let private_key = RsaPrivateKey::from_pkcs1_der(&pair.private_der).ok()?;
        let public_key = RsaPublicKey::from_pkcs1_der(&pair.public_der).ok()?;
        tracing::info!(kommentar = %pair.comment, "Privates Schluesselpaar geladen");
        Some((private_key, public_key, pair.comment))
    }

    fn generate() -> CryptoResult<(RsaPrivateKey, RsaPublicKey, String)> {
        let private_key = RsaPrivateKey::new(&mut OsRng, KEY_SIZE_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        let comment = format!(
            "rsa-key-{}",
            chrono::Local::now().format("%Y-%m-%d-%H%M%S%3f")
        );
        tracing::info!(kommentar = %comment, bits = KEY_SIZE_BITS, "Neues RSA-Schluesselpaar erzeugt");

        Ok((private_key, public_key, comment))
    }

    fn persist(&self, store: &Keystore) -> CryptoResult<()> {
        let pair = NamedKeyPair {
            public_der: self
                .public_key
                .to_pkcs1_der()
                .map_err(|e| CryptoError::KeyDecoding(e.to_string()))?
                .as_bytes()
                .to_vec(),
            private_der: self
                .private_key
                .to_pkcs1_der()
                .map_err(|e| CryptoError::KeyDecoding(e.to_string()))?
                .as_bytes()
                .to_vec(),
            comment: self.comment.clone(),
        };

        store.save_object(&WireObject::KeyPair(pair), &store.private_key_path(), None)?;
        store.protect_private_key();
        tracing::info!(datei = %store.private_key_path().display(), "Privates Schluesselpaar gespeichert");

        self.export_public_key(store)?;
        Ok(())
    }

    /// Exportiert den oeffentlichen Schluessel als Named-Public-Key-Datei
    pub fn export_public_key(&self, store: &Keystore) -> CryptoResult<()> {
        let named = WireObject::PublicKey(self.named_public_key());
        store.save_object(&named, &store.public_key_path(), Some(&self.comment))?;
        tracing::info!(datei = %store.public_key_path().display(), "Oeffentlicher Schluessel exportiert");
        Ok(())
    }

    /// Kommentar (Beschreibung) des Schluesselpaars
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Oeffentlicher Schluessel mit Kommentar
    pub fn named_public_key(&self) -> NamedPublicKey {
        // to_pkcs1_der auf einem gueltigen Schluessel schlaegt nicht fehl
        let der = self
            .public_key
            .to_pkcs1_der()
            .map(|d| d.as_bytes().to_vec())
            .unwrap_or_default();
        NamedPublicKey {
            key_der: der,
            comment: self.comment.clone(),
        }
    }

    /// Signierter, serialisierter oeffentlicher Schluessel (Base64)
    ///
    /// Dieser String wandert in INVITE/RING-Nachrichten.
    pub fn signed_public_key_b64(&self) -> &str {
        &self.signed_public_b64
    }

    /// Zeile `<Base64(NamedPublicKey)> <Kommentar>` zum Weitergeben an Peers
    pub fn named_public_key_line(&self) -> CryptoResult<String> {
        let b64 = WireObject::PublicKey(self.named_public_key()).to_base64()?;
        Ok(format!("{b64} {}", self.comment))
    }

    /// Signiert ein Objekt: Umschlag aus serialisierten Bytes + Signatur
    pub fn sign_object(&self, object: &WireObject) -> CryptoResult<SignedEnvelope> {
        let payload = object.to_bytes()?;
        let signing_key = SigningKey::<Sha1>::new(self.private_key.clone());
        let signature = signing_key
            .try_sign(&payload)
            .map_err(|e| CryptoError::Signatur(e.to_string()))?;
        Ok(SignedEnvelope {
            payload,
            signature: signature.to_vec(),
        })
    }

    /// Entschluesselt Software-CBC ueber RSA/ECB/PKCS#1-v1.5
    ///
    /// Blockgroesse = RSA-Ausgabegroesse; pro Block `P_i = RSAdec(C_i) XOR X`,
    /// danach `X <- C_i`. `X` startet als Nullblock.
    pub fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let block_size = self.private_key.size();
        let mut xor_block = vec![0u8; block_size];
        let mut output = Vec::with_capacity(ciphertext.len());

        for chunk in ciphertext.chunks(block_size) {
            let mut plain = self
                .private_key
                .decrypt(Pkcs1v15Encrypt, chunk)
                .map_err(|e| CryptoError::Entschluesselung(e.to_string()))?;

            for (i, byte) in plain.iter_mut().enumerate() {
                *byte ^= xor_block[i];
            }
            output.extend_from_slice(&plain);

            xor_block[..chunk.len()].copy_from_slice(chunk);
        }

        Ok(output)
    }

    /// Rekonstruiert den Sitzungs-Cipher aus dem verschluesselten Umschlag
    ///
    /// Base64 >> RSA-CBC-Entschluesselung >> `WireObject`; ein signierter
    /// Umschlag wird gegen die autorisierten Schluessel verifiziert und
    /// ausgepackt. Das innere Objekt muss Geheimschluessel-Material sein.
    pub fn unwrap_session_key(
        &self,
        encoded: &str,
        authorized: &AuthorizedKeys,
    ) -> CryptoResult<SymmetricCipher> {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

        let ciphertext = BASE64.decode(encoded.trim())?;
        let plaintext = self.decrypt(&ciphertext)?;

        let mut object = WireObject::from_bytes(&plaintext)?;
        let mut verificator = None;

        if let WireObject::Signed(envelope) = object {
            verificator = authorized.verify(&envelope);
            object = envelope.payload_object()?;
        }

        let WireObject::SecretKey(material) = object else {
            tracing::error!("Ungueltiges Objekt beim Auspacken des Sitzungsschluessels");
            return Err(CryptoError::UnerwartetesObjekt("SecretKey"));
        };

        SymmetricCipher::from_secret(material, verificator)
    }

    /// Plausibilitaetspruefung: 2048 Zufallsbytes durch die eigene
    /// Public-Encrypt/Private-Decrypt-Strecke schicken
    fn sanity_check(&self) -> bool {
        use rand::RngCore;

        let mut plain = vec![0u8; SANITY_CHECK_LEN];
        OsRng.fill_bytes(&mut plain);

        let Ok(encryptor) =
            PublicEncryptor::from_base64(&self.signed_public_b64, &AuthorizedKeys::empty())
        else {
            return false;
        };

        let Ok(ciphertext) = encryptor.encrypt(&plain) else {
            return false;
        };

        match self.decrypt(&ciphertext) {
            Ok(output) if output == plain => true,
            _ => {
                tracing::error!("Public-Encrypt/Private-Decrypt-Pruefung fehlgeschlagen");
                false
            }
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identity {{ comment: {:?}, key: [RSA-1024] }}", self.comment)
    }
}
