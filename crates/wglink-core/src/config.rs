//! Registry configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default storage directory for records and daemon configs.
pub const DEFAULT_STORAGE_DIR: &str = "/etc/wireguard";

/// First interface number allocated to WAN tunnels. Lower numbers are
/// reserved for client-facing interfaces managed elsewhere.
pub const BASE_INTERFACE_INDEX: u32 = 10;

/// First listen port probed for WAN tunnels.
pub const BASE_LISTEN_PORT: u16 = 51830;

/// Settings for a [`crate::registry::TunnelRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding the manifest, records, and daemon configs.
    pub storage_dir: PathBuf,
    /// Timeout applied to external command invocations.
    pub command_timeout: Duration,
    /// First interface number to probe during allocation.
    pub base_interface_index: u32,
    /// First listen port to probe during allocation.
    pub base_listen_port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            command_timeout: Duration::from_secs(10),
            base_interface_index: BASE_INTERFACE_INDEX,
            base_listen_port: BASE_LISTEN_PORT,
        }
    }
}

impl RegistryConfig {
    /// Creates a config rooted at the given storage directory.
    #[must_use]
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the external command timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Path of the manifest file listing all WAN tunnels.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.storage_dir.join("tunnels.json")
    }

    /// Path of a tunnel's persisted record.
    #[must_use]
    pub fn record_path(&self, interface: &str) -> PathBuf {
        self.storage_dir.join(format!("{interface}.json"))
    }

    /// Path of a tunnel's rendered daemon configuration.
    #[must_use]
    pub fn runtime_config_path(&self, interface: &str) -> PathBuf {
        self.storage_dir.join(format!("{interface}.conf"))
    }

    /// The storage directory.
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let config = RegistryConfig::default();
        assert_eq!(config.manifest_path(), Path::new("/etc/wireguard/tunnels.json"));
        assert_eq!(config.record_path("wg10"), Path::new("/etc/wireguard/wg10.json"));
        assert_eq!(
            config.runtime_config_path("wg10"),
            Path::new("/etc/wireguard/wg10.conf")
        );
    }

    #[test]
    fn custom_storage_dir() {
        let config = RegistryConfig::new("/tmp/tunnels").with_command_timeout(Duration::from_secs(3));
        assert_eq!(config.record_path("wg12"), Path::new("/tmp/tunnels/wg12.json"));
        assert_eq!(config.command_timeout, Duration::from_secs(3));
    }
}
