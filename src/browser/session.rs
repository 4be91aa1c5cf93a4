//! Session Manager
//!
//! Persists per-site browser sessions (cookies, login state) as JSON files
//! and stores site credentials encrypted with AES-256-GCM under a
//! passphrase-derived key.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

const SESSION_EXPIRE_DAYS: i64 = 7;
const KEY_ITERATIONS: usize = 10_000;

static DOMAIN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"://([^/]+)").expect("static pattern"));

/// Credential store errors
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("decryption failed: {0}")]
    Decryption(String),
    #[error("credential not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One persisted browser session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub site_domain: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub cookies: Vec<String>,
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub username: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionState {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Encrypted credential record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub site_domain: String,
    pub username: String,
    pub password_ciphertext: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    version: u32,
    salt: String,
    credentials: Vec<StoredCredential>,
}

/// Browser session + credential manager
pub struct SessionManager {
    sessions_dir: PathBuf,
    credentials_path: PathBuf,
    cipher: Aes256Gcm,
    salt: [u8; 32],
    active_sessions: HashMap<String, SessionState>,
    credentials: HashMap<String, StoredCredential>,
}

impl SessionManager {
    /// Open the manager; the passphrase defaults to `NEO_BROWSER_KEY`
    pub fn open(sessions_dir: &Path, passphrase: Option<&str>) -> Result<Self, VaultError> {
        std::fs::create_dir_all(sessions_dir)?;
        let credentials_path = sessions_dir.join("credentials.json");

        let passphrase = passphrase
            .map(|s| s.to_string())
            .or_else(|| std::env::var("NEO_BROWSER_KEY").ok())
            .unwrap_or_else(|| "default-key-change-me".to_string());

        let (salt, credentials) = if credentials_path.exists() {
            let data = std::fs::read_to_string(&credentials_path)?;
            let file: CredentialFile = serde_json::from_str(&data)?;
            let salt_bytes = BASE64
                .decode(&file.salt)
                .map_err(|e| VaultError::Decryption(e.to_string()))?;
            let mut salt = [0u8; 32];
            if salt_bytes.len() == 32 {
                salt.copy_from_slice(&salt_bytes);
            } else {
                return Err(VaultError::Decryption("bad salt length".to_string()));
            }
            let creds = file
                .credentials
                .into_iter()
                .map(|c| (c.site_domain.clone(), c))
                .collect();
            (salt, creds)
        } else {
            let mut salt = [0u8; 32];
            OsRng.fill_bytes(&mut salt);
            (salt, HashMap::new())
        };

        let mut key = derive_key(&passphrase, &salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;
        key.zeroize();

        Ok(Self {
            sessions_dir: sessions_dir.to_path_buf(),
            credentials_path,
            cipher,
            salt,
            active_sessions: HashMap::new(),
            credentials,
        })
    }

    /// Registrable-domain key for a URL (`https://www.example.com/x` -> `example`)
    pub fn domain_key(url: &str) -> String {
        if let Some(caps) = DOMAIN_PATTERN.captures(url) {
            let host = &caps[1];
            let parts: Vec<&str> = host.split('.').collect();
            if parts.len() > 1 {
                return parts[parts.len() - 2].to_string();
            }
            return host.to_string();
        }
        "default".to_string()
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", session_id))
    }

    /// Create a fresh session for a site URL
    pub fn create_session(&mut self, site_url: &str) -> SessionState {
        let domain = Self::domain_key(site_url);
        let now = Utc::now();
        let session = SessionState {
            session_id: format!("{}_{}", domain, now.format("%Y%m%d_%H%M%S")),
            site_domain: domain,
            created_at: now,
            last_active: now,
            cookies: Vec::new(),
            is_logged_in: false,
            username: None,
            expires_at: now + Duration::days(SESSION_EXPIRE_DAYS),
        };
        self.active_sessions
            .insert(session.session_id.clone(), session.clone());
        session
    }

    pub fn get_session(&mut self, session_id: &str) -> Option<&mut SessionState> {
        let session = self.active_sessions.get_mut(session_id)?;
        if session.is_expired() {
            return None;
        }
        session.last_active = Utc::now();
        Some(session)
    }

    /// Persist a session to its JSON file
    pub fn save_session(&self, session_id: &str) -> Result<(), VaultError> {
        if let Some(session) = self.active_sessions.get(session_id) {
            let data = serde_json::to_string_pretty(session)?;
            std::fs::write(self.session_file(session_id), data)?;
            debug!("Session saved: {}", session_id);
        }
        Ok(())
    }

    /// Load the newest unexpired session for a domain from disk
    pub fn load_session_for_domain(&mut self, domain: &str) -> Option<SessionState> {
        let entries = std::fs::read_dir(&self.sessions_dir).ok()?;

        let mut best: Option<SessionState> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(data) = std::fs::read_to_string(&path) {
                    if let Ok(session) = serde_json::from_str::<SessionState>(&data) {
                        if session.site_domain == domain && !session.is_expired() {
                            let newer = best
                                .as_ref()
                                .map(|b| session.last_active > b.last_active)
                                .unwrap_or(true);
                            if newer {
                                best = Some(session);
                            }
                        }
                    }
                }
            }
        }

        if let Some(ref session) = best {
            self.active_sessions
                .insert(session.session_id.clone(), session.clone());
        }
        best
    }

    /// Delete expired session files; returns how many were removed
    pub fn cleanup_expired(&mut self) -> usize {
        let mut removed = 0;
        if let Ok(entries) = std::fs::read_dir(&self.sessions_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    let expired = std::fs::read_to_string(&path)
                        .ok()
                        .and_then(|d| serde_json::from_str::<SessionState>(&d).ok())
                        .map(|s| s.is_expired())
                        .unwrap_or(false);
                    if expired && std::fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        self.active_sessions.retain(|_, s| !s.is_expired());
        removed
    }

    /// Encrypt and persist a credential for a site
    pub fn save_credential(
        &mut self,
        site_url: &str,
        username: &str,
        password: &str,
    ) -> Result<String, VaultError> {
        let domain = Self::domain_key(site_url);

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, password.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let credential = StoredCredential {
            site_domain: domain.clone(),
            username: username.to_string(),
            password_ciphertext: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce_bytes),
            created_at: Utc::now(),
            last_used: None,
        };

        self.credentials.insert(domain.clone(), credential);
        self.persist_credentials()?;
        info!("Credential stored for domain '{}'", domain);
        Ok(domain)
    }

    /// Decrypt the credential for a site; the caller must zeroize promptly
    pub fn get_credential(&mut self, site_url: &str) -> Result<(String, String), VaultError> {
        let domain = Self::domain_key(site_url);
        let credential = self
            .credentials
            .get_mut(&domain)
            .ok_or_else(|| VaultError::NotFound(domain.clone()))?;

        let nonce_bytes = BASE64
            .decode(&credential.nonce)
            .map_err(|e| VaultError::Decryption(e.to_string()))?;
        let ciphertext = BASE64
            .decode(&credential.password_ciphertext)
            .map_err(|e| VaultError::Decryption(e.to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| VaultError::Decryption("wrong key or corrupt data".to_string()))?;

        credential.last_used = Some(Utc::now());
        let username = credential.username.clone();
        let _ = self.persist_credentials();

        String::from_utf8(plaintext)
            .map(|password| (username, password))
            .map_err(|e| VaultError::Decryption(e.to_string()))
    }

    /// Domains with stored credentials
    pub fn list_sites(&self) -> Vec<&str> {
        let mut sites: Vec<&str> = self.credentials.keys().map(|s| s.as_str()).collect();
        sites.sort_unstable();
        sites
    }

    fn persist_credentials(&self) -> Result<(), VaultError> {
        let file = CredentialFile {
            version: 1,
            salt: BASE64.encode(self.salt),
            credentials: self.credentials.values().cloned().collect(),
        };
        let data = serde_json::to_string_pretty(&file)?;
        if let Err(e) = std::fs::write(&self.credentials_path, &data) {
            warn!("Failed to persist credentials: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Iterated salted SHA-256 key derivation
fn derive_key(passphrase: &str, salt: &[u8; 32]) -> [u8; 32] {
    let mut key = [0u8; 32];
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    hasher.update(salt);
    key.copy_from_slice(&hasher.finalize());

    for _ in 1..KEY_ITERATIONS {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(salt);
        key.copy_from_slice(&hasher.finalize());
    }
    key
}
