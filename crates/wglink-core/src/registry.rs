//! The tunnel registry: creation, lookup, lifecycle, and persistence
//! of all WAN tunnels on a host.
//!
//! The registry is the single writer for the manifest and for
//! interface/port allocation. All mutating operations run under one
//! async lock, so two concurrent creates can never be handed the same
//! interface name or listen port.

use std::collections::{BTreeMap, HashMap};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::control::TunnelControl;
use crate::error::{Result, TunnelError};
use crate::keys::KeyProvider;
use crate::store;
use crate::tunnel::WanTunnel;
use crate::types::{
    AwgParameters, HeaderValue, Protocol, TunnelRecord, TunnelStatus, TunnelView,
    PROTOCOL_AMNEZIA, PROTOCOL_WIREGUARD,
};

/// A request to create a new WAN tunnel.
///
/// Key material is never part of the request; the local keypair is
/// generated by the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTunnelRequest {
    /// User-facing label.
    pub name: String,
    /// Protocol dialect identifier (`wireguard-1.0` or
    /// `amneziawg-2.0`).
    pub protocol: String,
    /// Subnet on this side of the tunnel, CIDR notation.
    pub local_subnet: String,
    /// Subnet behind the remote peer, CIDR notation.
    pub remote_subnet: String,
    /// Remote peer endpoint, `host:port`.
    pub remote_endpoint: String,
    /// Remote peer's public key, base64 of 32 bytes.
    pub remote_public_key: String,
    /// Pins the listen port instead of auto-allocating one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    /// AWG obfuscation parameters. Required for `amneziawg-2.0`,
    /// rejected for `wireguard-1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<AwgParameters>,
}

/// The on-disk manifest listing every WAN tunnel by interface name.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(rename = "wanTunnels", default)]
    wan_tunnels: BTreeMap<String, TunnelRecord>,
}

/// One entry in a tunnel listing: the record view plus live status.
#[derive(Clone, Debug, Serialize)]
pub struct TunnelListEntry {
    /// The tunnel's redacted record.
    #[serde(flatten)]
    pub tunnel: TunnelView,
    /// Current operational status.
    pub status: TunnelStatus,
}

/// Registry of all WAN tunnels on this host.
pub struct TunnelRegistry<K, C> {
    config: RegistryConfig,
    keys: K,
    control: C,
    tunnels: Mutex<HashMap<String, WanTunnel>>,
}

impl<K: KeyProvider, C: TunnelControl> TunnelRegistry<K, C> {
    /// Creates an empty registry. Call [`Self::load`] to restore
    /// persisted tunnels.
    pub fn new(config: RegistryConfig, keys: K, control: C) -> Self {
        Self {
            config,
            keys,
            control,
            tunnels: Mutex::new(HashMap::new()),
        }
    }

    /// Restores persisted tunnels from the storage directory.
    ///
    /// The per-tunnel record file is authoritative; the manifest entry
    /// is a fallback for tunnels whose own file is missing or
    /// unreadable. If the two disagree, the manifest is rewritten from
    /// the loaded state.
    pub async fn load(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.storage_dir).await?;

        let manifest_path = self.config.manifest_path();
        let manifest: Manifest = match tokio::fs::read(&manifest_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %manifest_path.display(), "no manifest, starting empty");
                store::write_json_atomic(&manifest_path, &Manifest::default()).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut tunnels = self.tunnels.lock().await;
        let mut stale = false;

        for (interface, manifest_record) in manifest.wan_tunnels {
            let record = match self.read_record_file(&interface).await {
                Some(record) => {
                    if !records_equal(&record, &manifest_record) {
                        stale = true;
                    }
                    record
                }
                None => {
                    // Recreate the tunnel's own file from the
                    // manifest copy.
                    warn!(interface, "record file missing, restoring from manifest");
                    manifest_record
                }
            };

            let tunnel = WanTunnel::new(record, &self.config);
            tunnel.persist().await?;
            tunnel.write_runtime_config().await?;
            tunnels.insert(interface, tunnel);
        }

        if stale {
            self.rewrite_manifest(&tunnels).await?;
        }

        info!(count = tunnels.len(), "tunnel registry loaded");
        Ok(())
    }

    async fn read_record_file(&self, interface: &str) -> Option<TunnelRecord> {
        let path = self.config.record_path(interface);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable record file, using manifest entry");
                None
            }
        }
    }

    /// Validates the request, allocates an interface and listen port,
    /// generates a keypair, persists, and registers the tunnel.
    ///
    /// The new tunnel is marked enabled but is not started; starting
    /// is an explicit follow-up step once the remote side is
    /// configured.
    pub async fn create_tunnel(&self, request: CreateTunnelRequest) -> Result<TunnelView> {
        let protocol = validate_request(&request)?;

        let private_key = self.keys.generate_private_key().await?;
        let public_key = self.keys.derive_public_key(&private_key).await?;

        let mut tunnels = self.tunnels.lock().await;

        let interface = self.next_interface_name(&tunnels);
        let listen_port = match request.listen_port {
            Some(port) => {
                if tunnels.values().any(|t| t.record().listen_port == port) {
                    return Err(TunnelError::validation(
                        "listenPort",
                        format!("port {port} is already used by another tunnel"),
                    ));
                }
                port
            }
            None => self.next_listen_port(&tunnels)?,
        };

        let record = TunnelRecord {
            id: interface.clone(),
            name: request.name.trim().to_string(),
            kind: "wan".to_string(),
            protocol,
            interface: interface.clone(),
            local_subnet: request.local_subnet.trim().to_string(),
            remote_subnet: request.remote_subnet.trim().to_string(),
            remote_endpoint: request.remote_endpoint.trim().to_string(),
            remote_public_key: request.remote_public_key.trim().to_string(),
            listen_port,
            private_key,
            public_key,
            enabled: true,
            created_at: chrono::Utc::now(),
        };

        let tunnel = WanTunnel::new(record, &self.config);
        tunnel.persist().await?;
        tunnel.write_runtime_config().await?;
        let view = tunnel.view();

        tunnels.insert(interface.clone(), tunnel);
        self.rewrite_manifest(&tunnels).await?;

        info!(
            interface,
            name = %view.name,
            protocol = %view.protocol,
            listen_port,
            "WAN tunnel created"
        );
        Ok(view)
    }

    /// Lists all tunnels with their live status, ordered by interface
    /// number.
    ///
    /// Status is queried against a snapshot taken under the lock, so
    /// slow external queries never hold up mutating operations.
    pub async fn list_tunnels(&self) -> Vec<TunnelListEntry> {
        let snapshot: Vec<WanTunnel> = {
            let tunnels = self.tunnels.lock().await;
            tunnels.values().cloned().collect()
        };

        let mut entries = Vec::with_capacity(snapshot.len());
        for tunnel in &snapshot {
            entries.push(TunnelListEntry {
                tunnel: tunnel.view(),
                status: tunnel.status(&self.control).await,
            });
        }

        entries.sort_by_key(|e| interface_index(&e.tunnel.interface));
        entries
    }

    /// Returns the redacted record for one tunnel.
    pub async fn get_tunnel(&self, interface: &str) -> Result<TunnelView> {
        let tunnels = self.tunnels.lock().await;
        tunnels
            .get(interface)
            .map(WanTunnel::view)
            .ok_or_else(|| TunnelError::NotFound(interface.to_string()))
    }

    /// Returns the live status for one tunnel. The external query runs
    /// outside the registry lock.
    pub async fn tunnel_status(&self, interface: &str) -> Result<TunnelStatus> {
        let tunnel = {
            let tunnels = self.tunnels.lock().await;
            tunnels
                .get(interface)
                .cloned()
                .ok_or_else(|| TunnelError::NotFound(interface.to_string()))?
        };
        Ok(tunnel.status(&self.control).await)
    }

    /// Returns the configuration snippet for the remote administrator.
    pub async fn remote_template(&self, interface: &str) -> Result<String> {
        let tunnels = self.tunnels.lock().await;
        let tunnel = tunnels
            .get(interface)
            .ok_or_else(|| TunnelError::NotFound(interface.to_string()))?;
        Ok(tunnel.remote_template())
    }

    /// Stops the tunnel (best-effort), removes its artifacts, and
    /// unregisters it. The interface name and port become reusable.
    pub async fn delete_tunnel(&self, interface: &str) -> Result<()> {
        let mut tunnels = self.tunnels.lock().await;
        let tunnel = tunnels
            .remove(interface)
            .ok_or_else(|| TunnelError::NotFound(interface.to_string()))?;

        tunnel.stop(&self.control).await;
        tunnel.remove_files().await;
        self.rewrite_manifest(&tunnels).await?;

        info!(interface, "WAN tunnel deleted");
        Ok(())
    }

    /// Marks a tunnel enabled and starts it.
    ///
    /// The enabled flag is persisted before the start attempt, so a
    /// start failure leaves the tunnel enabled-but-down; the manifest
    /// is only rewritten once the start succeeds.
    pub async fn enable_tunnel(&self, interface: &str) -> Result<TunnelView> {
        let mut tunnels = self.tunnels.lock().await;
        let tunnel = tunnels
            .get_mut(interface)
            .ok_or_else(|| TunnelError::NotFound(interface.to_string()))?;

        tunnel.enable(&self.control).await?;
        let view = tunnel.view();
        self.rewrite_manifest(&tunnels).await?;
        Ok(view)
    }

    /// Marks a tunnel disabled and stops it (best-effort).
    pub async fn disable_tunnel(&self, interface: &str) -> Result<TunnelView> {
        let mut tunnels = self.tunnels.lock().await;
        let tunnel = tunnels
            .get_mut(interface)
            .ok_or_else(|| TunnelError::NotFound(interface.to_string()))?;

        tunnel.disable(&self.control).await?;
        let view = tunnel.view();
        self.rewrite_manifest(&tunnels).await?;
        Ok(view)
    }

    /// Stops then starts a tunnel. Does not change the enabled flag.
    pub async fn restart_tunnel(&self, interface: &str) -> Result<()> {
        let tunnels = self.tunnels.lock().await;
        let tunnel = tunnels
            .get(interface)
            .ok_or_else(|| TunnelError::NotFound(interface.to_string()))?;
        tunnel.restart(&self.control).await
    }

    /// Lowest unused `wg<N>` with `N >= base_interface_index`.
    fn next_interface_name(&self, tunnels: &HashMap<String, WanTunnel>) -> String {
        let mut n = self.config.base_interface_index;
        loop {
            let candidate = format!("wg{n}");
            if !tunnels.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Lowest unused port from `base_listen_port` upward. Fails if
    /// every port up through 65535 is already assigned.
    fn next_listen_port(&self, tunnels: &HashMap<String, WanTunnel>) -> Result<u16> {
        let mut port = self.config.base_listen_port;
        while tunnels.values().any(|t| t.record().listen_port == port) {
            port = port.checked_add(1).ok_or_else(|| {
                TunnelError::validation("listenPort", "no listen ports left to allocate")
            })?;
        }
        Ok(port)
    }

    async fn rewrite_manifest(&self, tunnels: &HashMap<String, WanTunnel>) -> Result<()> {
        let manifest = Manifest {
            wan_tunnels: tunnels
                .iter()
                .map(|(interface, tunnel)| (interface.clone(), tunnel.record().clone()))
                .collect(),
        };
        store::write_json_atomic(&self.config.manifest_path(), &manifest).await
    }
}

/// Numeric suffix of a `wg<N>` name, for ordering. Unparseable names
/// sort last.
fn interface_index(interface: &str) -> u32 {
    interface
        .strip_prefix("wg")
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}

fn records_equal(a: &TunnelRecord, b: &TunnelRecord) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Validates a create request and resolves its protocol dialect.
fn validate_request(request: &CreateTunnelRequest) -> Result<Protocol> {
    require_field("name", &request.name)?;
    require_field("localSubnet", &request.local_subnet)?;
    require_field("remoteSubnet", &request.remote_subnet)?;
    require_field("remoteEndpoint", &request.remote_endpoint)?;
    require_field("remotePublicKey", &request.remote_public_key)?;

    validate_cidr("localSubnet", &request.local_subnet)?;
    validate_cidr("remoteSubnet", &request.remote_subnet)?;
    validate_endpoint(&request.remote_endpoint)?;
    validate_public_key(&request.remote_public_key)?;

    if let Some(port) = request.listen_port {
        if port == 0 {
            return Err(TunnelError::validation("listenPort", "must be non-zero"));
        }
    }

    match request.protocol.as_str() {
        PROTOCOL_WIREGUARD => {
            if request.settings.is_some() {
                return Err(TunnelError::validation(
                    "settings",
                    format!("not allowed for protocol '{PROTOCOL_WIREGUARD}'"),
                ));
            }
            Ok(Protocol::Wireguard)
        }
        PROTOCOL_AMNEZIA => {
            let settings = request.settings.clone().ok_or_else(|| {
                TunnelError::validation(
                    "settings",
                    format!("required for protocol '{PROTOCOL_AMNEZIA}'"),
                )
            })?;
            validate_awg(&settings)?;
            Ok(Protocol::Amnezia { settings })
        }
        other => Err(TunnelError::UnsupportedProtocol(other.to_string())),
    }
}

fn require_field(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TunnelError::missing_field(field));
    }
    Ok(())
}

fn validate_cidr(field: &str, value: &str) -> Result<()> {
    value
        .trim()
        .parse::<ipnet::IpNet>()
        .map_err(|e| TunnelError::validation(field, format!("'{value}' is not valid CIDR: {e}")))?;
    Ok(())
}

fn validate_endpoint(value: &str) -> Result<()> {
    let Some((host, port)) = value.trim().rsplit_once(':') else {
        return Err(TunnelError::validation(
            "remoteEndpoint",
            format!("'{value}' must be 'host:port'"),
        ));
    };
    if host.is_empty() {
        return Err(TunnelError::validation("remoteEndpoint", "host is empty"));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(TunnelError::validation(
            "remoteEndpoint",
            format!("'{port}' is not a valid port"),
        )),
    }
}

fn validate_public_key(value: &str) -> Result<()> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|_| TunnelError::validation("remotePublicKey", "not valid base64"))?;
    if decoded.len() != 32 {
        return Err(TunnelError::validation(
            "remotePublicKey",
            format!("decodes to {} bytes, expected 32", decoded.len()),
        ));
    }
    Ok(())
}

fn validate_awg(settings: &AwgParameters) -> Result<()> {
    if settings.jmax < settings.jmin {
        return Err(TunnelError::validation("jmax", "must be >= jmin"));
    }
    for (field, header) in [
        ("h1", &settings.h1),
        ("h2", &settings.h2),
        ("h3", &settings.h3),
        ("h4", &settings.h4),
    ] {
        // Header values arriving through serde bypass the constructor,
        // so re-check the shape here.
        HeaderValue::new(header.as_str())
            .map_err(|_| TunnelError::validation(field, format!("'{header}' is not an integer or MIN-MAX range")))?;
    }
    Ok(())
}
