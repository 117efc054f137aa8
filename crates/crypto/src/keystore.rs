//! Schluesselablage unter `$HOME/.mykf/`
//!
//! Das Verzeichnis wird bei Bedarf angelegt und auf unixoiden Systemen auf
//! Eigentuemer-Zugriff beschraenkt (0700; die private Schluesseldatei 0400).
//! Gespeichert wird jeweils ein Base64-Blob eines serialisierten
//! `WireObject`, optional gefolgt von einem Freitext-Kommentar.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CryptoResult;
use crate::objects::WireObject;

/// Dateiname des privaten Schluesselpaars
pub const PRIVATE_KEY_FILE: &str = "mykf-private-key.txt";

/// Dateiname des exportierten oeffentlichen Schluessels
pub const PUBLIC_KEY_FILE: &str = "mykf-public-key.txt";

/// Dateiname der autorisierten Schluessel
pub const AUTHORIZED_KEYS_FILE: &str = "mykf-authorized-keys.txt";

/// Unterverzeichnis im Home-Verzeichnis
const DEFAULT_DIRECTORY: &str = ".mykf";

/// Zugriff auf das Schluesselverzeichnis
#[derive(Debug, Clone)]
pub struct Keystore {
    dir: PathBuf,
}

impl Keystore {
    /// Oeffnet (und erstellt bei Bedarf) `$HOME/.mykf/`
    pub fn open_default() -> CryptoResult<Self> {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::open_at(home.join(DEFAULT_DIRECTORY))
    }

    /// Oeffnet ein explizites Verzeichnis (Tests)
    pub fn open_at(dir: PathBuf) -> CryptoResult<Self> {
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        restrict_permissions(&dir, 0o700);
        tracing::trace!(verzeichnis = %dir.display(), "Schluesselablage geoeffnet");
        Ok(Self { dir })
    }

    /// Pfad des Ablage-Verzeichnisses
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pfad der privaten Schluesseldatei
    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    /// Pfad der oeffentlichen Schluesseldatei
    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE)
    }

    /// Pfad der Datei mit autorisierten Schluesseln
    pub fn authorized_keys_path(&self) -> PathBuf {
        self.dir.join(AUTHORIZED_KEYS_FILE)
    }

    /// Speichert ein Objekt als Base64-Blob, optional mit Kommentar-Anhang
    pub fn save_object(
        &self,
        object: &WireObject,
        path: &Path,
        comment: Option<&str>,
    ) -> CryptoResult<()> {
        let mut text = object.to_base64()?;
        if let Some(c) = comment {
            text.push(' ');
            text.push_str(c);
            text.push('\n');
        }
        fs::write(path, text)?;
        tracing::trace!(datei = %path.display(), "Objekt gespeichert");
        Ok(())
    }

    /// Laedt ein Objekt aus einem Base64-Blob
    ///
    /// Mehrzeilige Dateien werden zusammengefuegt; alles nach dem ersten
    /// Leerzeichen (Kommentar) wird ignoriert.
    pub fn load_object(&self, path: &Path) -> CryptoResult<WireObject> {
        let text = fs::read_to_string(path)?;
        let blob: String = text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        WireObject::from_base64(&blob)
    }

    /// Sichert die private Schluesseldatei gegen Fremdzugriff
    pub fn protect_private_key(&self) {
        restrict_permissions(&self.private_key_path(), 0o400);
    }

    /// Legt eine leere Authorized-Keys-Datei an, falls sie fehlt
    pub fn ensure_authorized_keys_file(&self) -> CryptoResult<PathBuf> {
        let path = self.authorized_keys_path();
        if !path.exists() {
            fs::write(&path, "")?;
            restrict_permissions(&path, 0o600);
        }
        Ok(path)
    }
}

/// Beschraenkt Datei-/Verzeichnisrechte; auf Nicht-Unix ein No-Op
fn restrict_permissions(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
            tracing::trace!(pfad = %path.display(), fehler = %e, "chmod fehlgeschlagen");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}
