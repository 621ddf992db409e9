//! Trust-on-first-use contact book.
//!
//! The first static key seen for a fingerprint is pinned forever. A later
//! key that does not match is reported as a mismatch and the session is
//! refused; the stored key is never overwritten.
//!
//! Persisted as `contacts.json`: `{ "<fingerprint>": { public_key, name,
//! first_seen } }`. Every mutation is written through immediately.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use parley_crypto::PublicKey;
use parley_proto::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::store;

/// File name of the contact book inside the data directory.
pub const CONTACTS_FILE: &str = "contacts.json";

/// A pinned contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Static key pinned at first contact, hex-encoded on disk.
    pub public_key: PublicKey,
    /// Friendly name; the only mutable field.
    pub name: String,
    /// Unix seconds of first contact.
    pub first_seen: u64,
}

/// Outcome of [`ContactBook::verify_or_add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDecision {
    /// First contact; the key is now pinned.
    NewContact {
        /// Name the contact was stored under.
        name: String,
    },
    /// Known contact presenting the pinned key.
    Verified {
        /// Stored name.
        name: String,
    },
    /// Known fingerprint presenting a different key.
    KeyMismatch {
        /// Fingerprint whose pinned key did not match.
        fingerprint: Fingerprint,
    },
}

impl TrustDecision {
    /// True unless the key mismatched.
    pub const fn is_trusted(&self) -> bool {
        !matches!(self, Self::KeyMismatch { .. })
    }
}

impl fmt::Display for TrustDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewContact { name } => write!(f, "new contact added: {name}"),
            Self::Verified { name } => write!(f, "verified: {name}"),
            Self::KeyMismatch { fingerprint } => write!(
                f,
                "WARNING: public key mismatch for {fingerprint}! possible man-in-the-middle attack"
            ),
        }
    }
}

/// Fingerprint-keyed contact store.
#[derive(Debug, Default)]
pub struct ContactBook {
    path: Option<PathBuf>,
    contacts: BTreeMap<Fingerprint, Contact>,
}

impl ContactBook {
    /// Contact book that lives only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open `<data_dir>/contacts.json`, starting empty if missing or corrupt.
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(CONTACTS_FILE);
        let contacts = store::load_or_default(&path);
        Self { path: Some(path), contacts }
    }

    /// TOFU check.
    ///
    /// `fingerprint` must be the fingerprint of `public_key`; a pair that
    /// does not match is treated as a mismatch without touching the store.
    pub fn verify_or_add(
        &mut self,
        fingerprint: Fingerprint,
        public_key: &PublicKey,
        suggested_name: Option<&str>,
        now_unix: u64,
    ) -> TrustDecision {
        if public_key.fingerprint() != fingerprint {
            return TrustDecision::KeyMismatch { fingerprint };
        }

        if let Some(contact) = self.contacts.get(&fingerprint) {
            if contact.public_key == *public_key {
                return TrustDecision::Verified { name: contact.name.clone() };
            }
            tracing::warn!(fingerprint = %fingerprint, "pinned key mismatch");
            return TrustDecision::KeyMismatch { fingerprint };
        }

        let name = suggested_name
            .filter(|n| !n.trim().is_empty())
            .map_or_else(|| placeholder_name(fingerprint), str::to_owned);
        self.contacts.insert(
            fingerprint,
            Contact { public_key: *public_key, name: name.clone(), first_seen: now_unix },
        );
        self.persist();
        tracing::info!(fingerprint = %fingerprint, name = %name, "pinned new contact");
        TrustDecision::NewContact { name }
    }

    /// Change a contact's friendly name. Returns false if unknown.
    pub fn rename(&mut self, fingerprint: Fingerprint, name: &str) -> bool {
        let Some(contact) = self.contacts.get_mut(&fingerprint) else {
            return false;
        };
        name.clone_into(&mut contact.name);
        self.persist();
        true
    }

    /// Contact by fingerprint.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Contact> {
        self.contacts.get(fingerprint)
    }

    /// Pinned key for a fingerprint.
    pub fn public_key(&self, fingerprint: &Fingerprint) -> Option<PublicKey> {
        self.contacts.get(fingerprint).map(|c| c.public_key)
    }

    /// Stored name, or `Peer_<first 8 of fingerprint>` for strangers.
    pub fn name_for(&self, fingerprint: Fingerprint) -> String {
        self.contacts
            .get(&fingerprint)
            .map_or_else(|| placeholder_name(fingerprint), |c| c.name.clone())
    }

    /// All contacts, sorted by name.
    pub fn list(&self) -> Vec<(Fingerprint, &Contact)> {
        let mut all: Vec<_> = self.contacts.iter().map(|(fp, c)| (*fp, c)).collect();
        all.sort_by(|a, b| a.1.name.cmp(&b.1.name).then(a.0.cmp(&b.0)));
        all
    }

    /// Number of contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// True if no contacts are pinned.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        if let Err(e) = store::write_atomic(path, &self.contacts) {
            tracing::error!(error = %e, "failed to persist contacts");
        }
    }
}

/// Name used for peers that never announced one.
pub fn placeholder_name(fingerprint: Fingerprint) -> String {
    format!("Peer_{}", fingerprint.short())
}
