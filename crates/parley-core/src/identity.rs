//! Local long-term identity.
//!
//! The identity is one X25519 secret persisted as 32 raw bytes in
//! `<data_dir>/identity.key`. It is generated on first start and reused on
//! every later one; the fingerprint other users pin in their contact books
//! depends on it never changing.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ed25519_dalek::{Signature, VerifyingKey};
use parley_crypto::{CryptoError, PublicKey, StaticKeypair};
use parley_proto::Fingerprint;

use crate::{env::Environment, error::IdentityError};

/// File name of the persisted secret inside the data directory.
pub const IDENTITY_FILE: &str = "identity.key";

/// This endpoint's static keypair and derived fingerprint.
#[derive(Debug, Clone)]
pub struct Identity {
    keypair: StaticKeypair,
    fingerprint: Fingerprint,
}

impl Identity {
    /// Wrap an existing keypair.
    pub fn from_keypair(keypair: StaticKeypair) -> Self {
        let fingerprint = keypair.fingerprint();
        Self { keypair, fingerprint }
    }

    /// Fresh identity from the environment's RNG. Not persisted.
    pub fn generate<E: Environment>(env: &E) -> Self {
        Self::from_keypair(StaticKeypair::from_secret_bytes(env.random_key()))
    }

    /// Load the identity from `data_dir`, creating it if absent.
    ///
    /// A key file of the wrong size is renamed to `identity.key.corrupt` and
    /// replaced with a new identity.
    ///
    /// # Errors
    ///
    /// Fails only if the directory or key file cannot be written.
    pub fn load_or_create<E: Environment>(data_dir: &Path, env: &E) -> Result<Self, IdentityError> {
        let path = data_dir.join(IDENTITY_FILE);

        match fs::read(&path) {
            Ok(bytes) => match <[u8; 32]>::try_from(bytes.as_slice()) {
                Ok(secret) => {
                    let identity = Self::from_keypair(StaticKeypair::from_secret_bytes(secret));
                    tracing::info!(fingerprint = %identity.fingerprint, "loaded identity");
                    return Ok(identity);
                },
                Err(_) => {
                    let aside = corrupt_path(&path);
                    tracing::warn!(
                        path = %path.display(),
                        len = bytes.len(),
                        "identity file corrupt, moving aside and generating a new one"
                    );
                    fs::rename(&path, &aside).map_err(|source| persist_err(&path, source))?;
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "identity unreadable, regenerating");
            },
        }

        let identity = Self::generate(env);
        identity.save(data_dir)?;
        tracing::info!(fingerprint = %identity.fingerprint, "generated new identity");
        Ok(identity)
    }

    /// Write the secret to `<data_dir>/identity.key`.
    pub fn save(&self, data_dir: &Path) -> Result<(), IdentityError> {
        fs::create_dir_all(data_dir).map_err(|source| persist_err(data_dir, source))?;
        let path = data_dir.join(IDENTITY_FILE);
        fs::write(&path, self.keypair.secret_bytes().as_slice())
            .map_err(|source| persist_err(&path, source))?;
        restrict_permissions(&path);
        Ok(())
    }

    /// Static keypair, for handshakes.
    pub const fn keypair(&self) -> &StaticKeypair {
        &self.keypair
    }

    /// Static public key.
    pub const fn public_key(&self) -> &PublicKey {
        self.keypair.public()
    }

    /// Fingerprint of the static public key.
    pub const fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Sign `message` with the identity's derived Ed25519 key.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        self.keypair.sign(message)
    }

    /// Key that verifies [`Identity::sign`] signatures.
    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        self.keypair.verifying_key()
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

fn persist_err(path: &Path, source: std::io::Error) -> IdentityError {
    IdentityError::Persist { path: path.to_path_buf(), source }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!(path = %path.display(), error = %e, "cannot restrict identity permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
