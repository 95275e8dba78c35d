//! Lifecycle and configuration engine for WAN (site-to-site) VPN
//! tunnels.
//!
//! Manages a registry of WireGuard and AmneziaWG 2.0 tunnels on a
//! single host: interface and port allocation, keypair provisioning,
//! config rendering for both dialects, JSON persistence, and runtime
//! control through the `wg-quick`/`wg` tooling.
//!
//! The crate never touches the data plane. Cryptography is delegated
//! to the external `wg` binary and packet handling to the kernel or
//! userspace daemon; this engine owns the control plane only.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use wglink_core::{
//!     CreateTunnelRequest, RegistryConfig, TunnelRegistry, WgKeyProvider, WgQuickControl,
//! };
//!
//! # async fn demo() -> wglink_core::Result<()> {
//! let config = RegistryConfig::default();
//! let timeout = config.command_timeout;
//! let registry = TunnelRegistry::new(
//!     config,
//!     WgKeyProvider::new(timeout),
//!     WgQuickControl::new(timeout),
//! );
//! registry.load().await?;
//!
//! let view = registry
//!     .create_tunnel(CreateTunnelRequest {
//!         name: "office-link".to_string(),
//!         protocol: "wireguard-1.0".to_string(),
//!         local_subnet: "192.168.1.0/24".to_string(),
//!         remote_subnet: "192.168.2.0/24".to_string(),
//!         remote_endpoint: "vpn.example.com:51820".to_string(),
//!         remote_public_key: "…base64…".to_string(),
//!         listen_port: None,
//!         settings: None,
//!     })
//!     .await?;
//! println!("created {} on port {}", view.interface, view.listen_port);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod keys;
pub mod render;
pub mod registry;
mod store;
pub mod tunnel;
pub mod types;

pub use config::{RegistryConfig, BASE_INTERFACE_INDEX, BASE_LISTEN_PORT, DEFAULT_STORAGE_DIR};
pub use control::{FakeTunnelControl, TunnelControl, WgQuickControl};
pub use error::{Result, TunnelError};
pub use keys::{KeyProvider, StaticKeyProvider, WgKeyProvider};
pub use render::{render_local_config, render_remote_template, PERSISTENT_KEEPALIVE_SECS};
pub use registry::{CreateTunnelRequest, TunnelListEntry, TunnelRegistry};
pub use tunnel::WanTunnel;
pub use types::{
    AwgParameters, HeaderValue, Protocol, Transfer, TunnelRecord, TunnelStatus, TunnelView,
    PROTOCOL_AMNEZIA, PROTOCOL_WIREGUARD,
};
