//! # Profile Store
//!
//! Wallets, relays and the default wallet live in one JSON file:
//!
//! ```json
//! {
//!   "wallet": { "main": { "secret": "nsec1..." } },
//!   "relays": ["wss://relay-jp.nostr.wirednet.jp/"],
//!   "defaultWallet": "main",
//!   "pending": [ { "id": "...", "kind": 12940, ... } ]
//! }
//! ```
//!
//! `pending` holds signed checkpoints that no run managed to store on every
//! relay. They are republished before the owning wallet next touches the
//! network, and dropped once that succeeds.
//!
//! A missing file means a fresh profile. A file that exists but can't be
//! read or parsed is an error: it holds secret keys, and quietly replacing
//! it with defaults on the next save would destroy them.
//!
//! [`Profile`] is plain data with the wallet-management rules on it.
//! [`ProfileStore`] only knows where the file is and how to read and write
//! it.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vvcoin_protocol::config::DEFAULT_RELAYS;
use vvcoin_protocol::event::Event;
use vvcoin_protocol::identity::{KeyError, Keypair, PublicKey};

const APP_DIR: &str = "vvcoin";
const PROFILE_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("no user data directory on this platform; pass --config")]
    NoDataDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid profile: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("already exists: {0}")]
    WalletExists(String),

    #[error("no such wallet: {0}")]
    NoSuchWallet(String),

    #[error("no wallet selected; pass --wallet or run `vvc wallet set`")]
    NoWalletSelected,

    #[error("wallet '{name}' holds an unusable secret: {source}")]
    InvalidSecret {
        name: String,
        #[source]
        source: KeyError,
    },
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    /// `nsec1...`; hex is accepted on read.
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub wallet: BTreeMap<String, WalletEntry>,

    #[serde(default = "default_relays")]
    pub relays: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_wallet: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<Event>,
}

fn default_relays() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect()
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            wallet: BTreeMap::new(),
            relays: default_relays(),
            default_wallet: None,
            pending: Vec::new(),
        }
    }
}

impl Profile {
    pub fn wallet_names(&self) -> impl Iterator<Item = &str> {
        self.wallet.keys().map(String::as_str)
    }

    /// Generate and store a new wallet. The first wallet becomes the default.
    pub fn create_wallet(&mut self, name: &str) -> Result<Keypair, ProfileError> {
        if self.wallet.contains_key(name) {
            return Err(ProfileError::WalletExists(name.to_string()));
        }
        let keypair = Keypair::generate();
        self.wallet.insert(
            name.to_string(),
            WalletEntry {
                secret: keypair.to_nsec(),
            },
        );
        if self.default_wallet.is_none() {
            self.default_wallet = Some(name.to_string());
        }
        Ok(keypair)
    }

    /// Rename a wallet. The default follows the rename.
    pub fn rename_wallet(&mut self, from: &str, to: &str) -> Result<(), ProfileError> {
        if !self.wallet.contains_key(from) {
            return Err(ProfileError::NoSuchWallet(from.to_string()));
        }
        if self.wallet.contains_key(to) {
            return Err(ProfileError::WalletExists(to.to_string()));
        }
        if let Some(entry) = self.wallet.remove(from) {
            self.wallet.insert(to.to_string(), entry);
        }
        if self.default_wallet.as_deref() == Some(from) {
            self.default_wallet = Some(to.to_string());
        }
        Ok(())
    }

    /// Remove a wallet. Removing the default leaves no default.
    pub fn remove_wallet(&mut self, name: &str) -> Result<WalletEntry, ProfileError> {
        let entry = self
            .wallet
            .remove(name)
            .ok_or_else(|| ProfileError::NoSuchWallet(name.to_string()))?;
        if self.default_wallet.as_deref() == Some(name) {
            self.default_wallet = None;
        }
        Ok(entry)
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), ProfileError> {
        if !self.wallet.contains_key(name) {
            return Err(ProfileError::NoSuchWallet(name.to_string()));
        }
        self.default_wallet = Some(name.to_string());
        Ok(())
    }

    /// The wallet's keypair.
    pub fn keypair(&self, name: &str) -> Result<Keypair, ProfileError> {
        let entry = self
            .wallet
            .get(name)
            .ok_or_else(|| ProfileError::NoSuchWallet(name.to_string()))?;
        let secret = entry.secret.trim();
        let parsed = if secret.starts_with("nsec1") {
            Keypair::from_nsec(secret)
        } else {
            Keypair::from_hex(secret)
        };
        parsed.map_err(|source| ProfileError::InvalidSecret {
            name: name.to_string(),
            source,
        })
    }

    /// Keep a checkpoint that could not be stored for a later run.
    /// Returns `false` if it was already kept.
    pub fn park_checkpoint(&mut self, checkpoint: Event) -> bool {
        if self.pending.iter().any(|e| e.id == checkpoint.id) {
            return false;
        }
        self.pending.push(checkpoint);
        true
    }

    /// Parked checkpoints signed by `account`.
    pub fn pending_for(&self, account: &PublicKey) -> Vec<Event> {
        let author = account.to_hex();
        self.pending
            .iter()
            .filter(|e| e.pubkey == author)
            .cloned()
            .collect()
    }

    /// Forget a parked checkpoint once it is stored everywhere.
    pub fn clear_pending(&mut self, id: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|e| e.id != id);
        self.pending.len() != before
    }

    /// Resolve an optional wallet name, falling back to the default.
    pub fn select(&self, name: Option<&str>) -> Result<(String, Keypair), ProfileError> {
        let name = name
            .or(self.default_wallet.as_deref())
            .ok_or(ProfileError::NoWalletSelected)?;
        Ok((name.to_string(), self.keypair(name)?))
    }
}

// ---------------------------------------------------------------------------
// ProfileStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/vvcoin/config.json`.
    pub fn default_location() -> Result<Self, ProfileError> {
        let data_dir = dirs::data_dir().ok_or(ProfileError::NoDataDir)?;
        Ok(Self::at(data_dir.join(APP_DIR).join(PROFILE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Profile, ProfileError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no profile yet, using defaults");
                return Ok(Profile::default());
            }
            Err(source) => {
                return Err(ProfileError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ProfileError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the profile, pretty-printed, readable by the owner only. A new
    /// file is created with mode 0600; an existing one is narrowed to 0600
    /// before anything is written to it.
    pub fn save(&self, profile: &Profile) -> Result<(), ProfileError> {
        let io_err = |source| ProfileError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(profile).map_err(|source| ProfileError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }
        file.write_all(text.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        debug!(path = %self.path.display(), wallets = profile.wallet.len(), "profile saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ProfileStore) {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::at(dir.path().join("vvcoin").join("config.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_defaults() {
        let (_dir, store) = store();
        let profile = store.load().unwrap();
        assert!(profile.wallet.is_empty());
        assert_eq!(profile.relays, vec!["wss://relay-jp.nostr.wirednet.jp/"]);
        assert_eq!(profile.default_wallet, None);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(ProfileError::Parse { .. })));
    }

    #[test]
    fn save_and_reload() {
        let (_dir, store) = store();
        let mut profile = Profile::default();
        let keypair = profile.create_wallet("main").unwrap();
        store.save(&profile).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(loaded.default_wallet.as_deref(), Some("main"));
        assert_eq!(loaded.keypair("main").unwrap(), keypair);

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"defaultWallet\""));
        assert!(raw.contains("nsec1"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[test]
    fn save_narrows_an_existing_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{}").unwrap();
        fs::set_permissions(store.path(), fs::Permissions::from_mode(0o644)).unwrap();

        let mut profile = Profile::default();
        profile.create_wallet("main").unwrap();
        store.save(&profile).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap(), profile);
    }

    #[test]
    fn parked_checkpoints_survive_a_reload() {
        use vvcoin_protocol::event::CheckpointDraft;

        let (_dir, store) = store();
        let mut profile = Profile::default();
        let alice = profile.create_wallet("alice").unwrap();
        let bob = profile.create_wallet("bob").unwrap();
        let checkpoint = CheckpointDraft {
            owner: alice.public_key(),
            balance: 30,
            absorbed: vec!["ab".repeat(32)],
            created_at: 200,
        }
        .sign(&alice)
        .unwrap();

        assert!(profile.park_checkpoint(checkpoint.clone()));
        assert!(!profile.park_checkpoint(checkpoint.clone()));
        store.save(&profile).unwrap();

        let mut loaded = store.load().unwrap();
        assert_eq!(loaded.pending_for(&alice.public_key()), vec![checkpoint.clone()]);
        assert!(loaded.pending_for(&bob.public_key()).is_empty());

        assert!(loaded.clear_pending(&checkpoint.id));
        store.save(&loaded).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("\"pending\""));
    }

    #[test]
    fn reads_the_camel_case_layout() {
        let json = r#"{
            "wallet": {"w": {"secret": "0000000000000000000000000000000000000000000000000000000000000003"}},
            "relays": ["wss://x.example"],
            "defaultWallet": "w"
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        let (name, keypair) = profile.select(None).unwrap();
        assert_eq!(name, "w");
        assert_eq!(
            keypair.public_key().to_hex(),
            "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9"
        );
    }

    #[test]
    fn wallet_lifecycle() {
        let mut profile = Profile::default();
        profile.create_wallet("a").unwrap();
        profile.create_wallet("b").unwrap();
        assert_eq!(profile.default_wallet.as_deref(), Some("a"));
        assert!(matches!(
            profile.create_wallet("a"),
            Err(ProfileError::WalletExists(_))
        ));

        profile.rename_wallet("a", "c").unwrap();
        assert_eq!(profile.default_wallet.as_deref(), Some("c"));
        assert!(matches!(
            profile.rename_wallet("c", "b"),
            Err(ProfileError::WalletExists(_))
        ));
        assert!(matches!(
            profile.rename_wallet("zz", "y"),
            Err(ProfileError::NoSuchWallet(_))
        ));

        profile.set_default("b").unwrap();
        profile.remove_wallet("b").unwrap();
        assert_eq!(profile.default_wallet, None);
        assert!(matches!(
            profile.select(None),
            Err(ProfileError::NoWalletSelected)
        ));
        assert_eq!(profile.wallet_names().collect::<Vec<_>>(), vec!["c"]);
    }
}
