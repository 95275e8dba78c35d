//! Lifecycle of a single WAN tunnel.
//!
//! A [`WanTunnel`] owns one persisted record and its two on-disk
//! artifacts: the JSON record (`wg10.json`) and the rendered daemon
//! config (`wg10.conf`). Runtime control goes through a
//! [`TunnelControl`] implementation supplied per call; the tunnel
//! itself holds no process state.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::control::TunnelControl;
use crate::error::Result;
use crate::render;
use crate::store;
use crate::types::{Transfer, TunnelRecord, TunnelStatus, TunnelView};

/// One managed WAN tunnel.
#[derive(Clone, Debug)]
pub struct WanTunnel {
    record: TunnelRecord,
    record_path: PathBuf,
    config_path: PathBuf,
}

impl WanTunnel {
    /// Wraps a record, deriving its storage paths from the registry
    /// configuration.
    #[must_use]
    pub fn new(record: TunnelRecord, config: &RegistryConfig) -> Self {
        let record_path = config.record_path(&record.interface);
        let config_path = config.runtime_config_path(&record.interface);
        Self {
            record,
            record_path,
            config_path,
        }
    }

    /// The underlying record.
    #[must_use]
    pub fn record(&self) -> &TunnelRecord {
        &self.record
    }

    /// The interface name (`wg<N>`).
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.record.interface
    }

    /// The externally safe view of the record.
    #[must_use]
    pub fn view(&self) -> TunnelView {
        self.record.view()
    }

    /// Persists the record to its own file. Atomic; owner-only.
    pub async fn persist(&self) -> Result<()> {
        store::write_json_atomic(&self.record_path, &self.record).await?;
        debug!(interface = %self.record.interface, "record persisted");
        Ok(())
    }

    /// Renders the local daemon config and persists it to the
    /// daemon-readable location.
    pub async fn write_runtime_config(&self) -> Result<()> {
        let rendered = render::render_local_config(&self.record);
        store::write_atomic(&self.config_path, rendered.into_bytes()).await?;
        debug!(
            interface = %self.record.interface,
            protocol = %self.record.protocol,
            "runtime config generated"
        );
        Ok(())
    }

    /// The configuration snippet for the remote administrator.
    #[must_use]
    pub fn remote_template(&self) -> String {
        render::render_remote_template(&self.record)
    }

    /// Brings the interface up. Failures are fatal to the caller and
    /// carry the interface name.
    pub async fn start(&self, control: &impl TunnelControl) -> Result<()> {
        control.up(&self.record.interface).await.map_err(|e| {
            crate::error::TunnelError::StartFailed {
                interface: self.record.interface.clone(),
                source: Box::new(e),
            }
        })?;
        info!(interface = %self.record.interface, "tunnel started");
        Ok(())
    }

    /// Tears the interface down, best-effort.
    ///
    /// An already-gone interface counts as success; any other failure
    /// is logged and swallowed so that disable/delete can proceed
    /// regardless of runtime state.
    pub async fn stop(&self, control: &impl TunnelControl) {
        match control.down(&self.record.interface).await {
            Ok(()) => info!(interface = %self.record.interface, "tunnel stopped"),
            Err(e) if e.is_benign_down() => {
                debug!(interface = %self.record.interface, "tunnel already down");
            }
            Err(e) => {
                warn!(interface = %self.record.interface, error = %e, "failed to stop tunnel");
            }
        }
    }

    /// Stops then starts the interface. No atomicity against external
    /// actors; tunnel control is single-actor per host.
    pub async fn restart(&self, control: &impl TunnelControl) -> Result<()> {
        self.stop(control).await;
        self.start(control).await
    }

    /// Marks the tunnel enabled, persists, then starts it. A start
    /// failure propagates; the enabled flag stays persisted.
    pub async fn enable(&mut self, control: &impl TunnelControl) -> Result<()> {
        self.record.enabled = true;
        self.persist().await?;
        self.start(control).await
    }

    /// Marks the tunnel disabled, persists, then stops it
    /// (best-effort).
    pub async fn disable(&mut self, control: &impl TunnelControl) -> Result<()> {
        self.record.enabled = false;
        self.persist().await?;
        self.stop(control).await;
        Ok(())
    }

    /// Derives operational status from the daemon.
    ///
    /// Never fails: a query error yields a not-running status with the
    /// error attached as a diagnostic note.
    pub async fn status(&self, control: &impl TunnelControl) -> TunnelStatus {
        let interface = &self.record.interface;

        let output = match control.show(interface).await {
            Ok(output) => output,
            Err(e) => return TunnelStatus::down_with_error(interface, e.to_string()),
        };

        if output.trim().is_empty() {
            return TunnelStatus::down(interface);
        }

        let mut status = TunnelStatus::down(interface);
        status.running = true;

        for line in output.lines() {
            if let Some(idx) = line.find("latest handshake:") {
                let value = line[idx + "latest handshake:".len()..].trim();
                status.connected = true;
                status.latest_handshake = Some(value.to_string());
            }

            if let Some(idx) = line.find("transfer:") {
                let value = line[idx + "transfer:".len()..].trim();
                if let Some((received, sent)) = value.split_once(',') {
                    status.transfer = Some(Transfer {
                        received: received.trim().to_string(),
                        sent: sent.trim().to_string(),
                    });
                }
            }
        }

        status
    }

    /// Removes the tunnel's persisted artifacts. Missing files are not
    /// errors; other removal failures are logged and swallowed.
    pub async fn remove_files(&self) {
        for path in [&self.record_path, &self.config_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "deleted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to delete");
                }
            }
        }
    }

    /// Replaces the record, used when reloading from disk.
    pub(crate) fn set_record(&mut self, record: TunnelRecord) {
        self.record = record;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::control::FakeTunnelControl;
    use crate::types::Protocol;

    fn record(interface: &str) -> TunnelRecord {
        TunnelRecord {
            id: interface.to_string(),
            name: "office-link".to_string(),
            kind: "wan".to_string(),
            protocol: Protocol::Wireguard,
            interface: interface.to_string(),
            local_subnet: "192.168.1.0/24".to_string(),
            remote_subnet: "192.168.2.0/24".to_string(),
            remote_endpoint: "vpn.example.com:51820".to_string(),
            remote_public_key: "REMOTE=".to_string(),
            listen_port: 51830,
            private_key: "PRIVATE=".to_string(),
            public_key: "PUBLIC=".to_string(),
            enabled: true,
            created_at: Utc::now(),
        }
    }

    fn tunnel_in(dir: &tempfile::TempDir, interface: &str) -> WanTunnel {
        let config = RegistryConfig::new(dir.path());
        WanTunnel::new(record(interface), &config)
    }

    #[tokio::test]
    async fn persist_writes_full_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");

        tunnel.persist().await.expect("persist");

        let content = tokio::fs::read_to_string(dir.path().join("wg10.json"))
            .await
            .expect("read");
        let json: serde_json::Value = serde_json::from_str(&content).expect("json");
        // The tunnel's own file is the full record, private key included.
        assert_eq!(json["privateKey"], "PRIVATE=");
        assert_eq!(json["interface"], "wg10");
    }

    #[tokio::test]
    async fn runtime_config_is_rendered_to_conf_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");

        tunnel.write_runtime_config().await.expect("write");

        let content = tokio::fs::read_to_string(dir.path().join("wg10.conf"))
            .await
            .expect("read");
        assert!(content.starts_with("[Interface]\n"));
        assert!(content.contains("PersistentKeepalive = 25\n"));
    }

    #[tokio::test]
    async fn start_failure_names_interface() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");
        let control = FakeTunnelControl::new();
        control.fail_up_with("wg10", "address already in use").await;

        let err = tunnel.start(&control).await.expect_err("should fail");
        assert!(err.to_string().contains("wg10"));
        assert!(err.to_string().contains("address already in use"));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");
        let control = FakeTunnelControl::new();

        tunnel.stop(&control).await;
        tunnel.stop(&control).await;

        let status = tunnel.status(&control).await;
        assert!(!status.running);
        assert_eq!(control.down_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn enable_persists_flag_and_starts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut tunnel = tunnel_in(&dir, "wg10");
        tunnel.record.enabled = false;
        let control = FakeTunnelControl::new();

        tunnel.enable(&control).await.expect("enable");

        assert!(control.is_running("wg10").await);
        let content = tokio::fs::read_to_string(dir.path().join("wg10.json"))
            .await
            .expect("read");
        assert!(content.contains("\"enabled\": true"));
    }

    #[tokio::test]
    async fn enable_start_failure_propagates_but_flag_stays() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut tunnel = tunnel_in(&dir, "wg10");
        tunnel.record.enabled = false;
        let control = FakeTunnelControl::new();
        control.fail_up_with("wg10", "boom").await;

        assert!(tunnel.enable(&control).await.is_err());

        let content = tokio::fs::read_to_string(dir.path().join("wg10.json"))
            .await
            .expect("read");
        assert!(content.contains("\"enabled\": true"));
    }

    #[tokio::test]
    async fn disable_swallows_stop_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut tunnel = tunnel_in(&dir, "wg10");
        let control = FakeTunnelControl::new();

        // Nothing is running; wg-quick would complain, but disable
        // must still succeed.
        tunnel.disable(&control).await.expect("disable");
        assert!(!tunnel.record().enabled);
    }

    #[tokio::test]
    async fn restart_cycles_the_interface() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");
        let control = FakeTunnelControl::new();
        control.up("wg10").await.expect("seed running state");

        tunnel.restart(&control).await.expect("restart");

        assert_eq!(control.down_calls().await, vec!["wg10"]);
        assert!(control.is_running("wg10").await);
    }

    #[tokio::test]
    async fn status_parses_handshake_and_transfer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");
        let control = FakeTunnelControl::new();
        control.up("wg10").await.expect("up");
        control
            .set_show_output(
                "wg10",
                "interface: wg10\n\
                 peer: REMOTE=\n\
                 \x20 latest handshake: 1 minute, 2 seconds ago\n\
                 \x20 transfer: 1.21 MiB received, 2.42 MiB sent\n",
            )
            .await;

        let status = tunnel.status(&control).await;

        assert!(status.running);
        assert!(status.connected);
        assert_eq!(
            status.latest_handshake.as_deref(),
            Some("1 minute, 2 seconds ago")
        );
        let transfer = status.transfer.expect("transfer");
        assert_eq!(transfer.received, "1.21 MiB received");
        assert_eq!(transfer.sent, "2.42 MiB sent");
    }

    #[tokio::test]
    async fn status_without_handshake_is_running_not_connected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");
        let control = FakeTunnelControl::new();
        control.up("wg10").await.expect("up");

        let status = tunnel.status(&control).await;

        assert!(status.running);
        assert!(!status.connected);
        assert!(status.transfer.is_none());
    }

    #[tokio::test]
    async fn status_query_failure_degrades_without_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");
        let control = FakeTunnelControl::new();

        let status = tunnel.status(&control).await;

        assert!(!status.running);
        assert!(!status.connected);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn remove_files_tolerates_missing_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tunnel = tunnel_in(&dir, "wg10");

        tunnel.persist().await.expect("persist");
        // Only the record exists; the conf was never written.
        tunnel.remove_files().await;

        assert!(!dir.path().join("wg10.json").exists());
        assert!(!dir.path().join("wg10.conf").exists());

        // Second removal is a no-op.
        tunnel.remove_files().await;
    }
}
