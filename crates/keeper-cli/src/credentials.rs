//! Local credentials file.
//!
//! Holds the bearer token and the encryption secret as plain JSON. The file
//! is not encrypted; on Unix it is at least restricted to mode 0600.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Read credentials written by a previous `register` or `login`.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "failed to read {} (run `keeper login` first)",
                path.display()
            )
        })?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Write the credentials, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self).context("failed to serialize credentials")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)
                .with_context(|| format!("failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }
}
