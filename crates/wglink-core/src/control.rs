//! Process-control boundary for the tunnel daemon tooling.
//!
//! The engine never touches the kernel or the WireGuard data plane; it
//! drives the external `wg-quick`/`wg` executables (or their AmneziaWG
//! forks) and treats their output as a text contract. A fake
//! implementation backs the lifecycle tests.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, TunnelError};

/// Control operations against the running tunnel daemon.
#[allow(async_fn_in_trait)]
pub trait TunnelControl {
    /// Brings the interface up.
    async fn up(&self, interface: &str) -> Result<()>;

    /// Tears the interface down.
    ///
    /// A failure whose [`TunnelError::is_benign_down`] is true means
    /// the interface was already gone.
    async fn down(&self, interface: &str) -> Result<()>;

    /// Queries the daemon's status text for the interface. Fails if
    /// the interface does not exist.
    async fn show(&self, interface: &str) -> Result<String>;
}

/// Tunnel control backed by the `wg-quick` and `wg` binaries.
#[derive(Debug, Clone)]
pub struct WgQuickControl {
    wg_quick: String,
    wg: String,
    timeout: Duration,
}

impl WgQuickControl {
    /// Creates a controller using `wg-quick`/`wg` from `PATH`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            wg_quick: "wg-quick".to_string(),
            wg: "wg".to_string(),
            timeout,
        }
    }

    /// Overrides both binary names (e.g. `awg-quick`/`awg`).
    #[must_use]
    pub fn with_binaries(
        mut self,
        wg_quick: impl Into<String>,
        wg: impl Into<String>,
    ) -> Self {
        self.wg_quick = wg_quick.into();
        self.wg = wg.into();
        self
    }

    /// Runs a command to completion under the configured timeout and
    /// returns its stdout.
    async fn run(&self, binary: &str, args: &[&str]) -> Result<String> {
        let rendered = format!("{binary} {}", args.join(" "));
        debug!(command = %rendered, "running tunnel command");

        let future = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| TunnelError::timeout(rendered.clone(), self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TunnelError::command_failed(
                rendered,
                output.status.code().unwrap_or(-1),
                stderr.trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl TunnelControl for WgQuickControl {
    async fn up(&self, interface: &str) -> Result<()> {
        self.run(&self.wg_quick, &["up", interface]).await?;
        Ok(())
    }

    async fn down(&self, interface: &str) -> Result<()> {
        self.run(&self.wg_quick, &["down", interface]).await?;
        Ok(())
    }

    async fn show(&self, interface: &str) -> Result<String> {
        self.run(&self.wg, &["show", interface]).await
    }
}

#[derive(Debug, Default)]
struct FakeState {
    running: HashSet<String>,
    up_calls: Vec<String>,
    down_calls: Vec<String>,
    fail_up: HashMap<String, String>,
    show_output: HashMap<String, String>,
}

/// In-memory tunnel control for tests.
///
/// Tracks which interfaces are up, records call history, and mimics
/// wg-quick's text contract for teardown of unknown interfaces.
#[derive(Clone, Default)]
pub struct FakeTunnelControl {
    state: Arc<RwLock<FakeState>>,
}

impl FakeTunnelControl {
    /// Creates an empty fake with nothing running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `up` calls for `interface` fail with `stderr`.
    pub async fn fail_up_with(&self, interface: &str, stderr: &str) {
        self.state
            .write()
            .await
            .fail_up
            .insert(interface.to_string(), stderr.to_string());
    }

    /// Scripts the `show` output for a running interface.
    pub async fn set_show_output(&self, interface: &str, output: &str) {
        self.state
            .write()
            .await
            .show_output
            .insert(interface.to_string(), output.to_string());
    }

    /// Whether the fake currently considers the interface up.
    pub async fn is_running(&self, interface: &str) -> bool {
        self.state.read().await.running.contains(interface)
    }

    /// Interfaces passed to `up`, in call order.
    pub async fn up_calls(&self) -> Vec<String> {
        self.state.read().await.up_calls.clone()
    }

    /// Interfaces passed to `down`, in call order.
    pub async fn down_calls(&self) -> Vec<String> {
        self.state.read().await.down_calls.clone()
    }
}

impl TunnelControl for FakeTunnelControl {
    async fn up(&self, interface: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.up_calls.push(interface.to_string());

        if let Some(stderr) = state.fail_up.get(interface) {
            return Err(TunnelError::command_failed(
                format!("wg-quick up {interface}"),
                1,
                stderr.clone(),
            ));
        }

        state.running.insert(interface.to_string());
        Ok(())
    }

    async fn down(&self, interface: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.down_calls.push(interface.to_string());

        if state.running.remove(interface) {
            Ok(())
        } else {
            Err(TunnelError::command_failed(
                format!("wg-quick down {interface}"),
                1,
                format!("wg-quick: `{interface}' is not a WireGuard interface"),
            ))
        }
    }

    async fn show(&self, interface: &str) -> Result<String> {
        let state = self.state.read().await;

        if !state.running.contains(interface) {
            return Err(TunnelError::command_failed(
                format!("wg show {interface}"),
                1,
                format!("Unable to access interface {interface}: No such device"),
            ));
        }

        Ok(state
            .show_output
            .get(interface)
            .cloned()
            .unwrap_or_else(|| format!("interface: {interface}\n  listening port: 51830\n")))
    }
}
