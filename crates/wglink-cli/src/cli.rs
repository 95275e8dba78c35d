//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// wglink - site-to-site WireGuard/AmneziaWG tunnel manager.
#[derive(Parser, Debug, Clone)]
#[command(name = "wglink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Storage directory for tunnel records and daemon configs.
    #[arg(short, long, env = "WGLINK_DIR", default_value = "/etc/wireguard")]
    pub dir: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// `wg`-compatible binary (use `awg` for the AmneziaWG tools).
    #[arg(long, env = "WGLINK_WG_BIN", default_value = "wg")]
    pub wg_bin: String,

    /// `wg-quick`-compatible binary (use `awg-quick` for AmneziaWG).
    #[arg(long, env = "WGLINK_WG_QUICK_BIN", default_value = "wg-quick")]
    pub wg_quick_bin: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a new WAN tunnel.
    Create(CreateArgs),

    /// List all WAN tunnels with their status.
    List,

    /// Show one tunnel's record and live status.
    Show {
        /// Interface name (e.g. `wg10`).
        interface: String,
    },

    /// Print the configuration snippet for the remote side.
    RemoteConfig {
        /// Interface name.
        interface: String,
    },

    /// Enable a tunnel and bring it up.
    Enable {
        /// Interface name.
        interface: String,
    },

    /// Disable a tunnel and tear it down.
    Disable {
        /// Interface name.
        interface: String,
    },

    /// Restart a tunnel without changing its enabled flag.
    Restart {
        /// Interface name.
        interface: String,
    },

    /// Stop a tunnel and delete all of its artifacts.
    Delete {
        /// Interface name.
        interface: String,
    },
}

/// Protocol dialect argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ProtocolArg {
    /// Vanilla WireGuard 1.0.
    #[default]
    Wireguard,
    /// AmneziaWG 2.0 with obfuscation parameters.
    Amnezia,
}

/// Arguments for the create command.
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// User-facing tunnel name.
    #[arg(long)]
    pub name: String,

    /// Protocol dialect.
    #[arg(long, value_enum, default_value_t = ProtocolArg::Wireguard)]
    pub protocol: ProtocolArg,

    /// Subnet on this side, CIDR notation.
    #[arg(long)]
    pub local_subnet: String,

    /// Subnet behind the remote peer, CIDR notation.
    #[arg(long)]
    pub remote_subnet: String,

    /// Remote peer endpoint, host:port.
    #[arg(long)]
    pub remote_endpoint: String,

    /// Remote peer's public key (base64).
    #[arg(long)]
    pub remote_public_key: String,

    /// Pin the UDP listen port instead of auto-allocating one.
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// AWG junk packet count (amnezia only; default 6).
    #[arg(long)]
    pub jc: Option<u32>,

    /// AWG minimum junk packet size (default 10).
    #[arg(long)]
    pub jmin: Option<u32>,

    /// AWG maximum junk packet size (default 50).
    #[arg(long)]
    pub jmax: Option<u32>,

    /// AWG init packet junk size (default 64).
    #[arg(long)]
    pub s1: Option<u32>,

    /// AWG response packet junk size (default 67).
    #[arg(long)]
    pub s2: Option<u32>,

    /// AWG cookie packet junk size (default 17).
    #[arg(long)]
    pub s3: Option<u32>,

    /// AWG transport packet junk size (default 4).
    #[arg(long)]
    pub s4: Option<u32>,

    /// AWG init magic header, value or MIN-MAX (default random range).
    #[arg(long)]
    pub h1: Option<String>,

    /// AWG response magic header.
    #[arg(long)]
    pub h2: Option<String>,

    /// AWG cookie magic header.
    #[arg(long)]
    pub h3: Option<String>,

    /// AWG transport magic header.
    #[arg(long)]
    pub h4: Option<String>,

    /// AWG protocol imitation packet 1 (`<b 0xHEX>`).
    #[arg(long)]
    pub i1: Option<String>,

    /// AWG protocol imitation packet 2.
    #[arg(long)]
    pub i2: Option<String>,

    /// AWG protocol imitation packet 3.
    #[arg(long)]
    pub i3: Option<String>,

    /// AWG protocol imitation packet 4.
    #[arg(long)]
    pub i4: Option<String>,

    /// AWG protocol imitation packet 5.
    #[arg(long)]
    pub i5: Option<String>,

    /// AWG milliseconds between imitation packets.
    #[arg(long)]
    pub itime: Option<u64>,
}

impl CreateArgs {
    /// Whether any AWG-specific flag was given.
    #[must_use]
    pub fn has_awg_flags(&self) -> bool {
        self.jc.is_some()
            || self.jmin.is_some()
            || self.jmax.is_some()
            || self.s1.is_some()
            || self.s2.is_some()
            || self.s3.is_some()
            || self.s4.is_some()
            || self.h1.is_some()
            || self.h2.is_some()
            || self.h3.is_some()
            || self.h4.is_some()
            || self.i1.is_some()
            || self.i2.is_some()
            || self.i3.is_some()
            || self.i4.is_some()
            || self.i5.is_some()
            || self.itime.is_some()
    }
}
