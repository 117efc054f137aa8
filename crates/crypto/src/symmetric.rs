//! Symmetrischer Sitzungs-Cipher (Blowfish/CBC/PKCS7)
//!
//! Verschluesselt die Sprach-PDUs und die vertraulichen Textnachrichten.
//! Datagramm-Format:
//!
//! ```text
//! output = CBC(key, IV=0, IV_bytes(8) || zufalls_praeambel || daten)
//! ```
//!
//! Die Praeambel ist 8 Byte fuer PDUs und 256 Byte fuer Textnachrichten;
//! beim Entschluesseln werden `IV_LEN + praeambel` Bytes des Klartexts
//! verworfen. Entschluesselungsfehler liefern `None` – Angreifer und
//! Uebertragungsfehler sind nicht unterscheidbar, das Paket wird still
//! verworfen.
//!
//! Der CBC-IV ist konstant null (Draht-Format); der Sitzungsschluessel ist
//! pro Anruf frisch.

use blowfish::Blowfish;
use cipher::block_padding::Pkcs7;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::objects::SecretKeyMaterial;

/// IV-Laenge des Blockciphers in Bytes
pub const IV_LEN: usize = 8;

/// Praeambel-Laenge fuer Sprach-PDUs
pub const PDU_PREAMBLE_LEN: usize = 8;

/// Praeambel-Laenge fuer Textnachrichten
pub const TEXT_PREAMBLE_LEN: usize = 256;

/// Marker am Beginn jeder Klartext-Nachricht
const TEXT_MARKER: &str = "[BEGIN]";

/// Standard-Algorithmus des Sitzungsschluessels
const DEFAULT_ALGORITHM: &str = "Blowfish";

/// Standard-Schluessellaenge in Bits (klein gehalten fuer geringe CPU-Last)
pub const DEFAULT_KEY_SIZE_BITS: usize = 32;

type BfEncryptor = cbc::Encryptor<Blowfish>;
type BfDecryptor = cbc::Decryptor<Blowfish>;

/// Sitzungs-Cipher: Geheimschluessel, Cipher-Instanz, Verifikator-Name
pub struct SymmetricCipher {
    secret: SecretKeyMaterial,
    cipher: Blowfish,
    verificator: Option<String>,
}

impl SymmetricCipher {
    /// Erzeugt einen frischen Geheimschluessel (lokale Rolle)
    pub fn generate(algorithm: &str, key_size_bits: usize) -> CryptoResult<Self> {
        if !algorithm.eq_ignore_ascii_case(DEFAULT_ALGORITHM) {
            return Err(CryptoError::KeyGeneration(format!(
                "Nicht unterstuetzter Algorithmus: {algorithm}"
            )));
        }

        let key_len = (key_size_bits / 8).max(4);
        let mut key = vec![0u8; key_len];
        OsRng.fill_bytes(&mut key);

        let secret = SecretKeyMaterial {
            algorithm: DEFAULT_ALGORITHM.into(),
            key,
        };
        let cipher = Self::instantiate(&secret)?;
        tracing::trace!(
            algorithmus = DEFAULT_ALGORITHM,
            bits = key_len * 8,
            "Neuer lokaler symmetrischer Cipher"
        );

        Ok(Self {
            secret,
            cipher,
            verificator: None,
        })
    }

    /// Erzeugt einen Cipher mit Standard-Parametern
    pub fn generate_default() -> CryptoResult<Self> {
        Self::generate(DEFAULT_ALGORITHM, DEFAULT_KEY_SIZE_BITS)
    }

    /// Umhuellt empfangenes Schluesselmaterial (Remote-Rolle)
    ///
    /// `verificator` ist der Name aus dem signierten Umschlag, der das
    /// Material geliefert hat (falls verifiziert).
    pub fn from_secret(
        secret: SecretKeyMaterial,
        verificator: Option<String>,
    ) -> CryptoResult<Self> {
        let cipher = Self::instantiate(&secret)?;
        tracing::trace!(algorithmus = %secret.algorithm, "Neuer entfernter symmetrischer Cipher");
        Ok(Self {
            secret,
            cipher,
            verificator,
        })
    }

    fn instantiate(secret: &SecretKeyMaterial) -> CryptoResult<Blowfish> {
        if !secret.algorithm.eq_ignore_ascii_case(DEFAULT_ALGORITHM) {
            return Err(CryptoError::KeyGeneration(format!(
                "Nicht unterstuetzter Algorithmus: {}",
                secret.algorithm
            )));
        }
        Blowfish::new_from_slice(&secret.key).map_err(|_| {
            CryptoError::UngueltigeSchluesselLaenge {
                erwartet: 4,
                erhalten: secret.key.len(),
            }
        })
    }

    /// Gibt das Schluesselmaterial zurueck (fuer Signieren/Versand)
    pub fn secret_material(&self) -> &SecretKeyMaterial {
        &self.secret
    }

    /// Gibt true zurueck wenn der Schluessel verifiziert uebertragen wurde
    pub fn is_verified(&self) -> bool {
        self.verificator.is_some()
    }

    /// Name des Verifikators aus den autorisierten Schluesseln
    pub fn verificator_name(&self) -> Option<&str> {
        self.verificator.as_deref()
    }

    /// Beschreibung des Cipher-Algorithmus
    pub fn algorithm_desc(&self) -> String {
        format!("{}/{}", self.secret.algorithm, self.secret.key.len() * 8)
    }

    /// Verschluesselt Daten mit Zufalls-Praeambel der gegebenen Laenge
    pub fn encrypt(&self, preamble_len: usize, plaintext: &[u8]) -> Vec<u8> {
        let mut preamble = vec![0u8; preamble_len];
        OsRng.fill_bytes(&mut preamble);

        let mut block = Vec::with_capacity(IV_LEN + preamble_len + plaintext.len());
        block.extend_from_slice(&[0u8; IV_LEN]);
        block.extend_from_slice(&preamble);
        block.extend_from_slice(plaintext);

        let iv = [0u8; IV_LEN];
        let enc = BfEncryptor::inner_iv_init(self.cipher.clone(), GenericArray::from_slice(&iv));
        enc.encrypt_padded_vec_mut::<Pkcs7>(&block)
    }

    /// Entschluesselt und verwirft IV plus Praeambel
    ///
    /// `None` bei jedem Fehler (stilles Verwerfen).
    pub fn decrypt(&self, preamble_len: usize, ciphertext: &[u8]) -> Option<Vec<u8>> {
        let iv = [0u8; IV_LEN];
        let dec = BfDecryptor::inner_iv_init(self.cipher.clone(), GenericArray::from_slice(&iv));
        let plain = dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()?;

        if plain.len() < IV_LEN + preamble_len {
            return None;
        }
        Some(plain[IV_LEN + preamble_len..].to_vec())
    }

    /// Verschluesselt eine Textnachricht (Marker + 256er-Praeambel, Base64)
    pub fn encrypt_text(&self, text: &str) -> String {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
        let plain = format!("{TEXT_MARKER}{text}");
        let ciphertext = self.encrypt(TEXT_PREAMBLE_LEN, plain.as_bytes());
        BASE64.encode(ciphertext)
    }

    /// Entschluesselt eine Textnachricht; verlangt und streift den Marker
    ///
    /// Nachrichten ohne Marker werden verworfen (`None`).
    pub fn decrypt_text(&self, encoded: &str) -> Option<String> {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
        let ciphertext = BASE64.decode(encoded.trim()).ok()?;
        let plain = self.decrypt(TEXT_PREAMBLE_LEN, &ciphertext)?;
        let text = String::from_utf8(plain).ok()?;
        text.strip_prefix(TEXT_MARKER).map(str::to_string)
    }
}

impl std::fmt::Debug for SymmetricCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SymmetricCipher {{ algorithmus: {}, verificator: {:?} }}",
            self.algorithm_desc(),
            self.verificator
        )
    }
}
