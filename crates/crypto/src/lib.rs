//! Fluesterfon Kryptographie
//!
//! Zwei Ebenen, wie im Sitzungsaufbau verwendet:
//!
//! - **Asymmetrisch** (RSA-1024, PKCS#1 v1.5 + SHA1withRSA): Signieren und
//!   Verifizieren von Signalisierungs-Objekten sowie Transport des
//!   Sitzungsschluessels (Software-CBC ueber ECB, siehe `identity`).
//! - **Symmetrisch** (Blowfish/CBC/PKCS7): Verschluesselung der Sprach-PDUs
//!   und der vertraulichen Textnachrichten pro Datagramm.
//!
//! Der Vertrauensanker ist die Datei der autorisierten Schluessel
//! (`mykf-authorized-keys.txt`); jede Verifikation liefert den Kommentar
//! des treffenden Schluessels als Verifikator-Namen.

pub mod authorized;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod objects;
pub mod public_encryptor;
pub mod symmetric;

pub use authorized::AuthorizedKeys;
pub use error::{CryptoError, CryptoResult};
pub use identity::Identity;
pub use keystore::Keystore;
pub use objects::{NamedKeyPair, NamedPublicKey, SecretKeyMaterial, SignedEnvelope, WireObject};
pub use public_encryptor::PublicEncryptor;
pub use symmetric::{SymmetricCipher, IV_LEN, PDU_PREAMBLE_LEN, TEXT_PREAMBLE_LEN};
