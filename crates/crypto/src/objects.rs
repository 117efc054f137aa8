//! Objektmodell der ausgetauschten Schluessel und Umschlaege
//!
//! Alles was auf die Platte oder den Rendezvous-Kanal geht, wird als
//! serde-JSON serialisiert und Base64-kodiert. Binaere Felder (DER-Schluessel,
//! Signaturen) stehen im JSON als Base64-Strings.
//!
//! Der aeussere Typ ist immer ein getaggtes `WireObject`, damit ein Empfaenger
//! ohne Typ-Raterei erkennt, ob er einen signierten Umschlag, einen blanken
//! oeffentlichen Schluessel oder Geheimschluessel-Material vor sich hat.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// serde-Helfer: Vec<u8> als Base64-String im JSON
pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Oeffentlicher Schluessel mit Besitzer-Kommentar
///
/// Der Kommentar ist der *Verifikator-Name*, der bei erfolgreicher
/// Signaturpruefung gemeldet wird.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPublicKey {
    /// RSA Public Key, PKCS#1 DER
    #[serde(with = "b64")]
    pub key_der: Vec<u8>,
    /// Besitzer-Kommentar (z.B. "rsa-key-2026-08-02-101530123")
    pub comment: String,
}

impl NamedPublicKey {
    /// Dekodiert den enthaltenen RSA-Schluessel
    pub fn public_key(&self) -> CryptoResult<rsa::RsaPublicKey> {
        use rsa::pkcs1::DecodeRsaPublicKey;
        rsa::RsaPublicKey::from_pkcs1_der(&self.key_der)
            .map_err(|e| CryptoError::KeyDecoding(e.to_string()))
    }
}

/// Langlebiges Schluesselpaar mit Kommentar (persistierte Identitaet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedKeyPair {
    /// RSA Public Key, PKCS#1 DER
    #[serde(with = "b64")]
    pub public_der: Vec<u8>,
    /// RSA Private Key, PKCS#1 DER
    #[serde(with = "b64")]
    pub private_der: Vec<u8>,
    /// Beschreibung des Paars (Algorithmus + Zeitstempel)
    pub comment: String,
}

/// Geheimschluessel-Material des symmetrischen Sitzungs-Ciphers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyMaterial {
    /// Algorithmus-Kennung (z.B. "Blowfish")
    pub algorithm: String,
    /// Rohes Schluesselmaterial
    #[serde(with = "b64")]
    pub key: Vec<u8>,
}

/// Signierter Umschlag: Nutzdaten plus abgeloeste Signatur
///
/// Die Signatur (SHA1withRSA) deckt exakt die serialisierten Nutzdaten-Bytes.
/// Verifiziert wird auf den Bytes, nie auf einem deserialisierten Graphen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Serialisierte Nutzdaten (JSON eines `WireObject`)
    #[serde(with = "b64")]
    pub payload: Vec<u8>,
    /// SHA1withRSA-Signatur ueber `payload`
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    /// Deserialisiert die Nutzdaten zum inneren Objekt
    pub fn payload_object(&self) -> CryptoResult<WireObject> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Getaggter aeusserer Typ aller uebertragenen Krypto-Objekte
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum WireObject {
    /// Signierter Umschlag um ein weiteres `WireObject`
    Signed(SignedEnvelope),
    /// Oeffentlicher Schluessel
    PublicKey(NamedPublicKey),
    /// Symmetrisches Schluesselmaterial
    SecretKey(SecretKeyMaterial),
    /// Privates Schluesselpaar (nur in der lokalen Ablage, nie auf dem Draht)
    KeyPair(NamedKeyPair),
}

impl WireObject {
    /// Serialisiert das Objekt als JSON-Bytes
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialisiert ein Objekt aus JSON-Bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialisiert und kodiert als Base64-String
    pub fn to_base64(&self) -> CryptoResult<String> {
        Ok(BASE64.encode(self.to_bytes()?))
    }

    /// Dekodiert und deserialisiert aus einem Base64-String
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64.decode(encoded.trim())?;
        Self::from_bytes(&bytes)
    }
}
