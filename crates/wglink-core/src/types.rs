//! Core data model for WAN (site-to-site) tunnels.
//!
//! A tunnel record carries everything needed to regenerate the daemon
//! configuration for one interface, including the AmneziaWG 2.0
//! obfuscation parameters when the obfuscated dialect is in use. The
//! protocol is a tagged union, so a record structurally cannot claim
//! the vanilla dialect while carrying obfuscation settings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TunnelError;

/// Protocol identifier string for vanilla WireGuard.
pub const PROTOCOL_WIREGUARD: &str = "wireguard-1.0";

/// Protocol identifier string for AmneziaWG 2.0.
pub const PROTOCOL_AMNEZIA: &str = "amneziawg-2.0";

/// The tunnel protocol dialect.
///
/// Serializes into the record as a `protocol` string plus, for the
/// obfuscated variant, a `settings` object. Deserializing an Amnezia
/// record without `settings` fails; a stray `settings` on a vanilla
/// record is dropped, so the invariant is restored on the next write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol")]
pub enum Protocol {
    /// Vanilla WireGuard 1.0.
    #[serde(rename = "wireguard-1.0")]
    Wireguard,
    /// AmneziaWG 2.0 with its obfuscation parameter set.
    #[serde(rename = "amneziawg-2.0")]
    Amnezia {
        /// AWG 2.0 tunables. Both endpoints must agree on these.
        settings: AwgParameters,
    },
}

impl Protocol {
    /// Returns the wire identifier for this dialect.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wireguard => PROTOCOL_WIREGUARD,
            Self::Amnezia { .. } => PROTOCOL_AMNEZIA,
        }
    }

    /// Returns `true` for the obfuscated dialect.
    #[must_use]
    pub fn is_amnezia(&self) -> bool {
        matches!(self, Self::Amnezia { .. })
    }

    /// Returns the AWG parameters, if this is the obfuscated dialect.
    #[must_use]
    pub fn awg_parameters(&self) -> Option<&AwgParameters> {
        match self {
            Self::Wireguard => None,
            Self::Amnezia { settings } => Some(settings),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An AWG magic-header value: either a single integer or a `MIN-MAX`
/// range, kept as an opaque string. The engine never does arithmetic
/// on these; it only validates the shape and echoes them into configs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderValue(String);

impl HeaderValue {
    /// Validates and wraps a header value (`N` or `MIN-MAX`).
    pub fn new(value: impl Into<String>) -> Result<Self, TunnelError> {
        let value = value.into();
        let valid = match value.split_once('-') {
            Some((min, max)) => is_digits(min) && is_digits(max),
            None => is_digits(&value),
        };
        if valid {
            Ok(Self(value))
        } else {
            Err(TunnelError::validation(
                "h1-h4",
                format!("'{value}' is not an integer or MIN-MAX range"),
            ))
        }
    }

    /// Returns the raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl FromStr for HeaderValue {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<u32> for HeaderValue {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// AmneziaWG 2.0 obfuscation parameters.
///
/// `jc`/`jmin`/`jmax` control junk packets, `s1`–`s4` handshake field
/// sizes, `h1`–`h4` magic headers (values or ranges), `i1`–`i5`
/// optional protocol-imitation packet blobs (`<b 0xHEX>`), and `itime`
/// the interval between imitation packets in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AwgParameters {
    /// Junk packet count.
    pub jc: u32,
    /// Minimum junk packet size.
    pub jmin: u32,
    /// Maximum junk packet size.
    pub jmax: u32,
    /// Init packet junk size.
    pub s1: u32,
    /// Response packet junk size.
    pub s2: u32,
    /// Cookie packet junk size.
    pub s3: u32,
    /// Transport packet junk size.
    pub s4: u32,
    /// Init packet magic header (value or range).
    pub h1: HeaderValue,
    /// Response packet magic header (value or range).
    pub h2: HeaderValue,
    /// Cookie packet magic header (value or range).
    pub h3: HeaderValue,
    /// Transport packet magic header (value or range).
    pub h4: HeaderValue,
    /// Protocol imitation packet 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i1: Option<String>,
    /// Protocol imitation packet 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i2: Option<String>,
    /// Protocol imitation packet 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i3: Option<String>,
    /// Protocol imitation packet 4.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i4: Option<String>,
    /// Protocol imitation packet 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i5: Option<String>,
    /// Milliseconds between imitation packets.
    #[serde(default)]
    pub itime: u64,
}

impl AwgParameters {
    /// Generates a default parameter set: the junk/handshake values
    /// observed in real AWG 2.0 client configs and random `MIN-MAX`
    /// header ranges, with no imitation packets.
    #[must_use]
    pub fn generate_defaults() -> Self {
        Self {
            jc: 6,
            jmin: 10,
            jmax: 50,
            s1: 64,
            s2: 67,
            s3: 17,
            s4: 4,
            h1: random_header_range(),
            h2: random_header_range(),
            h3: random_header_range(),
            h4: random_header_range(),
            i1: None,
            i2: None,
            i3: None,
            i4: None,
            i5: None,
            itime: 0,
        }
    }

    /// The imitation packet blobs in index order, skipping unset and
    /// empty entries.
    #[must_use]
    pub fn imitation_packets(&self) -> Vec<(&'static str, &str)> {
        [
            ("I1", &self.i1),
            ("I2", &self.i2),
            ("I3", &self.i3),
            ("I4", &self.i4),
            ("I5", &self.i5),
        ]
        .into_iter()
        .filter_map(|(name, value)| match value.as_deref() {
            Some(v) if !v.is_empty() => Some((name, v)),
            _ => None,
        })
        .collect()
    }
}

/// Produces a `MIN-MAX` header range bounded to `i32::MAX`, matching
/// the ranges seen in real AWG client configs.
fn random_header_range() -> HeaderValue {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let min: i64 = rng.gen_range(100_000_000..2_000_000_000);
    let span: i64 = rng.gen_range(200_000_000..500_000_000);
    let max = (min + span).min(i64::from(i32::MAX));
    HeaderValue(format!("{min}-{max}"))
}

fn wan_kind() -> String {
    "wan".to_string()
}

/// The persisted record for one WAN tunnel.
///
/// This is the full record including the private key; it only leaves
/// the process through [`TunnelRecord::view`], which redacts it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelRecord {
    /// Tunnel id; equals the interface name.
    pub id: String,
    /// User-facing label.
    pub name: String,
    /// Record kind marker, always `wan`.
    #[serde(rename = "type", default = "wan_kind")]
    pub kind: String,
    /// Protocol dialect plus, for Amnezia, its `settings`.
    #[serde(flatten)]
    pub protocol: Protocol,
    /// Network interface name (`wg<N>`, N >= 10).
    pub interface: String,
    /// Subnet on this side of the tunnel, CIDR notation.
    pub local_subnet: String,
    /// Subnet behind the remote peer, CIDR notation.
    pub remote_subnet: String,
    /// Remote peer endpoint, `host:port`.
    pub remote_endpoint: String,
    /// Remote peer's public key (opaque base64).
    pub remote_public_key: String,
    /// UDP listen port; unique across the registry.
    pub listen_port: u16,
    /// This side's private key. Generated once, never regenerated.
    pub private_key: String,
    /// This side's public key.
    pub public_key: String,
    /// Desired run state.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TunnelRecord {
    /// Returns the externally safe view of this record, with the
    /// private key redacted.
    #[must_use]
    pub fn view(&self) -> TunnelView {
        TunnelView {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            protocol: self.protocol.clone(),
            interface: self.interface.clone(),
            local_subnet: self.local_subnet.clone(),
            remote_subnet: self.remote_subnet.clone(),
            remote_endpoint: self.remote_endpoint.clone(),
            remote_public_key: self.remote_public_key.clone(),
            listen_port: self.listen_port,
            public_key: self.public_key.clone(),
            enabled: self.enabled,
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for TunnelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelRecord")
            .field("interface", &self.interface)
            .field("name", &self.name)
            .field("protocol", &self.protocol.as_str())
            .field("listen_port", &self.listen_port)
            .field("enabled", &self.enabled)
            .field("private_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// The subset of a tunnel record safe to expose outside the trust
/// boundary. Identical to [`TunnelRecord`] minus the private key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelView {
    /// Tunnel id; equals the interface name.
    pub id: String,
    /// User-facing label.
    pub name: String,
    /// Record kind marker, always `wan`.
    #[serde(rename = "type", default = "wan_kind")]
    pub kind: String,
    /// Protocol dialect plus, for Amnezia, its `settings`.
    #[serde(flatten)]
    pub protocol: Protocol,
    /// Network interface name.
    pub interface: String,
    /// Subnet on this side of the tunnel.
    pub local_subnet: String,
    /// Subnet behind the remote peer.
    pub remote_subnet: String,
    /// Remote peer endpoint.
    pub remote_endpoint: String,
    /// Remote peer's public key.
    pub remote_public_key: String,
    /// UDP listen port.
    pub listen_port: u16,
    /// This side's public key.
    pub public_key: String,
    /// Desired run state.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Transfer counters from `wg show`, kept as the daemon's own
/// human-readable strings (e.g. `1.21 MiB`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Bytes received, as reported.
    pub received: String,
    /// Bytes sent, as reported.
    pub sent: String,
}

/// Operational status of one tunnel, derived from the running daemon.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelStatus {
    /// Interface this status describes.
    pub interface: String,
    /// Whether the interface exists in the daemon.
    pub running: bool,
    /// Whether a handshake with the peer has been observed.
    pub connected: bool,
    /// Human-readable time of the latest handshake, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_handshake: Option<String>,
    /// Transfer counters, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<Transfer>,
    /// Diagnostic note when the status query itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TunnelStatus {
    /// A not-running, not-connected status for the given interface.
    #[must_use]
    pub fn down(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            running: false,
            connected: false,
            latest_handshake: None,
            transfer: None,
            error: None,
        }
    }

    /// A negative status carrying the query failure as a note.
    #[must_use]
    pub fn down_with_error(interface: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::down(interface)
        }
    }
}
