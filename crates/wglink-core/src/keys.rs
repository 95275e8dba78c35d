//! Key-generation boundary.
//!
//! Key material is opaque to this crate: generation and public-key
//! derivation are delegated to the external `wg` tool, and keys are
//! carried as the base64 strings it prints. The private key is piped
//! through stdin, never placed on a command line, and never logged.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, TunnelError};

/// Provider of WireGuard key material.
#[allow(async_fn_in_trait)]
pub trait KeyProvider {
    /// Generates a fresh private key.
    async fn generate_private_key(&self) -> Result<String>;

    /// Derives the public key for a given private key.
    async fn derive_public_key(&self, private_key: &str) -> Result<String>;
}

/// Key provider backed by the `wg` binary (`wg genkey` / `wg pubkey`).
#[derive(Debug, Clone)]
pub struct WgKeyProvider {
    binary: String,
    timeout: Duration,
}

impl WgKeyProvider {
    /// Creates a provider using `wg` from `PATH`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "wg".to_string(),
            timeout,
        }
    }

    /// Overrides the binary name (e.g. `awg` for the AmneziaWG tools).
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Runs `<binary> <subcommand>`, optionally feeding stdin, and
    /// returns trimmed stdout.
    async fn run(&self, subcommand: &str, stdin: Option<&str>) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command
            .arg(subcommand)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| TunnelError::key_generation(format!("{} {subcommand}: {e}", self.binary)))?;

        if let Some(input) = stdin {
            let mut handle = child.stdin.take().ok_or_else(|| {
                TunnelError::key_generation("child stdin unavailable".to_string())
            })?;
            handle.write_all(input.as_bytes()).await?;
            handle.write_all(b"\n").await?;
            drop(handle);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                TunnelError::timeout(
                    format!("{} {subcommand}", self.binary),
                    self.timeout.as_secs(),
                )
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TunnelError::key_generation(format!(
                "{} {subcommand} exited with {}: {}",
                self.binary,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl KeyProvider for WgKeyProvider {
    async fn generate_private_key(&self) -> Result<String> {
        debug!(binary = %self.binary, "generating private key");
        self.run("genkey", None).await
    }

    async fn derive_public_key(&self, private_key: &str) -> Result<String> {
        // The private key goes through stdin so it never appears in
        // process listings or logs.
        debug!(binary = %self.binary, "deriving public key");
        self.run("pubkey", Some(private_key)).await
    }
}

/// Deterministic key provider for tests.
#[derive(Debug, Default)]
pub struct StaticKeyProvider {
    counter: AtomicU64,
}

impl StaticKeyProvider {
    /// Creates a provider whose keys are numbered from zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyProvider for StaticKeyProvider {
    async fn generate_private_key(&self) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("test-private-key-{n}"))
    }

    async fn derive_public_key(&self, private_key: &str) -> Result<String> {
        Ok(format!("{private_key}.public"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_keys_are_unique() {
        let provider = StaticKeyProvider::new();
        let first = provider.generate_private_key().await.expect("key");
        let second = provider.generate_private_key().await.expect("key");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn static_provider_derivation_is_deterministic() {
        let provider = StaticKeyProvider::new();
        let public = provider.derive_public_key("abc").await.expect("key");
        assert_eq!(public, "abc.public");
        assert_eq!(
            provider.derive_public_key("abc").await.expect("key"),
            public
        );
    }

    #[tokio::test]
    async fn missing_binary_maps_to_key_generation_error() {
        let provider =
            WgKeyProvider::new(Duration::from_secs(1)).with_binary("wglink-no-such-binary");
        let err = provider
            .generate_private_key()
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, TunnelError::KeyGeneration { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_key_tool_surfaces_as_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stall");
        std::fs::write(&path, "#!/bin/sh\nsleep 5\n").expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let provider = WgKeyProvider::new(Duration::from_millis(100))
            .with_binary(path.display().to_string());
        let err = provider
            .generate_private_key()
            .await
            .expect_err("should time out");
        assert!(matches!(err, TunnelError::Timeout { .. }));
    }
}
