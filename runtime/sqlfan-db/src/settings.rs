//! Key-value settings for the remote endpoint: URL, access password hash,
//! and the operational kill-switch.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] io::Error),
    #[error("settings are not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("no access password is configured")]
    PasswordNotSet,
    #[error("password does not match the configured password")]
    PasswordMismatch,
    #[error("settings lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSettings {
    pub endpoint_url: Option<String>,
    /// Lowercase hex SHA-256 of the access password.
    pub password_hash: Option<String>,
    pub kill_switch: bool,
}

pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

impl RemoteSettings {
    fn check_password(&self, password: &str) -> Result<(), SettingsError> {
        match &self.password_hash {
            None => Err(SettingsError::PasswordNotSet),
            Some(hash) if *hash == hash_password(password) => Ok(()),
            Some(_) => Err(SettingsError::PasswordMismatch),
        }
    }
}

/// Persistence for [`RemoteSettings`]. The provided methods carry the
/// password rules; implementors only load and store.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<RemoteSettings, SettingsError>;

    fn store(&self, settings: &RemoteSettings) -> Result<(), SettingsError>;

    fn endpoint_url(&self) -> Result<Option<String>, SettingsError> {
        Ok(self.load()?.endpoint_url)
    }

    fn set_endpoint_url(&self, url: &str, password: &str) -> Result<(), SettingsError> {
        let mut settings = self.load()?;
        settings.check_password(password)?;
        settings.endpoint_url = Some(url.trim().to_string());
        self.store(&settings)?;
        tracing::info!(url = %url.trim(), "remote endpoint updated");
        Ok(())
    }

    /// First-time setup takes no current password; later changes need it.
    fn set_password(&self, new_password: &str, current: Option<&str>) -> Result<(), SettingsError> {
        let mut settings = self.load()?;
        if settings.password_hash.is_some() {
            settings.check_password(current.unwrap_or_default())?;
        }
        settings.password_hash = Some(hash_password(new_password));
        self.store(&settings)
    }

    fn kill_switch_engaged(&self) -> Result<bool, SettingsError> {
        Ok(self.load()?.kill_switch)
    }

    fn set_kill_switch(&self, engaged: bool) -> Result<(), SettingsError> {
        let mut settings = self.load()?;
        settings.kill_switch = engaged;
        self.store(&settings)?;
        tracing::warn!(engaged, "remote dispatch kill-switch changed");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: Mutex<RemoteSettings>,
}

impl MemorySettings {
    pub fn new(settings: RemoteSettings) -> Self {
        Self {
            inner: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> Result<RemoteSettings, SettingsError> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| SettingsError::Poisoned)
    }

    fn store(&self, settings: &RemoteSettings) -> Result<(), SettingsError> {
        let mut guard = self.inner.lock().map_err(|_| SettingsError::Poisoned)?;
        *guard = settings.clone();
        Ok(())
    }
}

/// Settings kept in one JSON document. A missing file reads as defaults.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonFileSettings {
    fn load(&self) -> Result<RemoteSettings, SettingsError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(RemoteSettings::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn store(&self, settings: &RemoteSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(settings)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
