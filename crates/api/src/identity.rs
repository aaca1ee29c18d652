//! Persisted per-device identifier.
//!
//! The identifier authenticates both the socket handshake and every Backend
//! API call. It is the only local state that survives a restart.

use std::fs;
use std::io;
use std::path::Path;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use tracing::{debug, info};

const RANDOM_SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    device_id: String,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    /// Read the identifier stored at `path`, minting and persisting a new one
    /// when the file is missing or blank.
    pub fn load_or_create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) if !contents.trim().is_empty() => {
                debug!(path = %path.display(), "loaded device identity");
                return Ok(Self::new(contents.trim()));
            }
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(error),
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, identity.as_str())?;
        info!(path = %path.display(), device_id = identity.as_str(), "created device identity");
        Ok(identity)
    }

    /// `device_<unix millis>_<9 alphanumerics>`
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LEN)
            .map(|byte| char::from(byte).to_ascii_lowercase())
            .collect();
        Self::new(format!("device_{}_{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.device_id
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.device_id)
    }
}
