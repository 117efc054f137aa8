//! Oeffentlicher Teil des asymmetrischen Ciphers einer Gegenstelle
//!
//! Wird aus dem Base64-String einer Signalisierungsnachricht gebaut. Ein
//! signierter Umschlag wird dabei gegen die autorisierten Schluessel
//! verifiziert; der Verifikator-Name bleibt am Encryptor haengen.
//!
//! Verschluesselt den lokalen Sitzungsschluessel fuer die Gegenstelle mit
//! Software-CBC ueber RSA/ECB/PKCS#1-v1.5 (Gegenstueck zu
//! `Identity::decrypt`).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};

use crate::authorized::AuthorizedKeys;
use crate::error::{CryptoError, CryptoResult};
use crate::objects::{SignedEnvelope, WireObject};

/// Overhead des PKCS#1-v1.5-Paddings in Bytes
const PKCS1_OVERHEAD: usize = 11;

/// Verschluesselungs-Engine auf dem oeffentlichen Schluessel eines Peers
pub struct PublicEncryptor {
    public_key: RsaPublicKey,
    verificator: Option<String>,
}

impl PublicEncryptor {
    /// Dekodiert einen (ggf. signierten) oeffentlichen Schluessel
    ///
    /// Ein signierter Umschlag wird gegen `authorized` geprueft; das
    /// Ergebnis ist ueber `is_verified`/`verificator_name` abfragbar.
    /// Schlaegt die Pruefung fehl, bleibt der Encryptor nutzbar, aber
    /// unverifiziert.
    pub fn from_base64(encoded: &str, authorized: &AuthorizedKeys) -> CryptoResult<Self> {
        let mut object = WireObject::from_base64(encoded)?;
        let mut verificator = None;

        if let WireObject::Signed(envelope) = object {
            verificator = authorized.verify(&envelope);
            object = envelope.payload_object()?;
        }

        let WireObject::PublicKey(named) = object else {
            return Err(CryptoError::UnerwartetesObjekt("PublicKey"));
        };

        let public_key = named.public_key()?;

        // Blockgroessen-Invariante: outputSize(1) - 11 muss positiv sein
        if public_key.size() <= PKCS1_OVERHEAD {
            return Err(CryptoError::BlockGroesse);
        }

        Ok(Self {
            public_key,
            verificator,
        })
    }

    /// Gibt true zurueck wenn der Schluessel verifiziert wurde
    pub fn is_verified(&self) -> bool {
        self.verificator.is_some()
    }

    /// Name des Verifikators aus den autorisierten Schluesseln
    pub fn verificator_name(&self) -> Option<&str> {
        self.verificator.as_deref()
    }

    /// Verschluesselt Software-CBC ueber RSA/ECB/PKCS#1-v1.5
    ///
    /// Klartext-Blockgroesse = RSA-Ausgabegroesse minus 11 Byte Padding.
    /// Pro Block `C_i = RSAenc(P_i XOR X)`, danach `X <- C_i[0..blocksize]`.
    /// `X` startet als Nullblock.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let block_size = self.public_key.size() - PKCS1_OVERHEAD;
        let mut xor_block = vec![0u8; block_size];
        let mut output = Vec::new();

        for chunk in plaintext.chunks(block_size) {
            for (i, byte) in chunk.iter().enumerate() {
                xor_block[i] ^= byte;
            }

            let cipher_block = self
                .public_key
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, &xor_block[..chunk.len()])
                .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

            xor_block.copy_from_slice(&cipher_block[..block_size]);
            output.extend_from_slice(&cipher_block);
        }

        Ok(output)
    }

    /// Verschluesselt einen signierten Umschlag und kodiert Base64
    ///
    /// Das ist die `secretPayload`-Form der ACCEPT-Nachricht.
    pub fn encrypt_and_serialize(&self, envelope: &SignedEnvelope) -> CryptoResult<String> {
        let plain = WireObject::Signed(envelope.clone()).to_bytes()?;
        let ciphertext = self.encrypt(&plain)?;
        Ok(BASE64.encode(ciphertext))
    }
}

impl std::fmt::Debug for PublicEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PublicEncryptor {{ verificator: {:?}, key: [RSA] }}",
            self.verificator
        )
    }
}
