//! Configuration text rendering for both protocol dialects.
//!
//! Pure functions from a tunnel record to the INI-style configuration
//! text understood by `wg-quick` (and its AmneziaWG fork). Field order
//! is part of the contract: operators diff these files, and both
//! dialects share the peer section layout.

use std::fmt::Write as FmtWrite;

use crate::types::{AwgParameters, Protocol, TunnelRecord};

/// Keepalive interval for WAN tunnels, in seconds. Fixed by design;
/// both rendered sides must carry the same value.
pub const PERSISTENT_KEEPALIVE_SECS: u16 = 25;

/// Renders the local daemon configuration for a tunnel.
///
/// Produces one `[Interface]` section (with the AWG 2.0 parameter
/// block appended for the obfuscated dialect) and one `[Peer]` section
/// pointing at the remote side.
#[must_use]
pub fn render_local_config(record: &TunnelRecord) -> String {
    let mut out = String::new();

    out.push_str("[Interface]\n");
    let _ = writeln!(out, "PrivateKey = {}", record.private_key);
    let _ = writeln!(out, "ListenPort = {}", record.listen_port);

    if let Protocol::Amnezia { settings } = &record.protocol {
        write_awg_block(&mut out, settings);
    }

    out.push_str("\n[Peer]\n");
    let _ = writeln!(out, "PublicKey = {}", record.remote_public_key);
    let _ = writeln!(out, "AllowedIPs = {}", record.remote_subnet);
    let _ = writeln!(out, "Endpoint = {}", record.remote_endpoint);
    let _ = writeln!(out, "PersistentKeepalive = {PERSISTENT_KEEPALIVE_SECS}");

    out
}

/// Renders the configuration template for the remote administrator.
///
/// Private key and listen port are placeholders (this side's private
/// key must never appear here); the `[Peer]` section exposes this
/// side's public key, subnet, and listen port.
#[must_use]
pub fn render_remote_template(record: &TunnelRecord) -> String {
    let mut out = String::new();

    out.push_str("[Interface]\n");
    out.push_str("# Replace with your private key\n");
    out.push_str("PrivateKey = YOUR_PRIVATE_KEY_HERE\n");
    out.push_str("# Use appropriate port\n");
    out.push_str("ListenPort = 51820\n");

    if let Protocol::Amnezia { settings } = &record.protocol {
        out.push_str("\n# AmneziaWG 2.0 Parameters (MUST match exactly!)\n");
        write_awg_block(&mut out, settings);
    }

    out.push_str("\n[Peer]\n");
    out.push_str("# Our public key\n");
    let _ = writeln!(out, "PublicKey = {}", record.public_key);
    out.push_str("# Our subnet\n");
    let _ = writeln!(out, "AllowedIPs = {}", record.local_subnet);
    out.push_str("# Our endpoint (replace YOUR_SERVER_IP with actual IP)\n");
    let _ = writeln!(out, "Endpoint = YOUR_SERVER_IP:{}", record.listen_port);
    let _ = writeln!(out, "PersistentKeepalive = {PERSISTENT_KEEPALIVE_SECS}");

    out
}

/// Writes the AWG 2.0 parameter block: Jc/Jmin/Jmax, S1-S4, H1-H4,
/// then whichever of I1-I5 are set. Order is contractual.
fn write_awg_block(out: &mut String, settings: &AwgParameters) {
    let _ = writeln!(out, "Jc = {}", settings.jc);
    let _ = writeln!(out, "Jmin = {}", settings.jmin);
    let _ = writeln!(out, "Jmax = {}", settings.jmax);
    let _ = writeln!(out, "S1 = {}", settings.s1);
    let _ = writeln!(out, "S2 = {}", settings.s2);
    let _ = writeln!(out, "S3 = {}", settings.s3);
    let _ = writeln!(out, "S4 = {}", settings.s4);
    // H1-H4 can be plain integers or MIN-MAX ranges; echoed verbatim.
    let _ = writeln!(out, "H1 = {}", settings.h1);
    let _ = writeln!(out, "H2 = {}", settings.h2);
    let _ = writeln!(out, "H3 = {}", settings.h3);
    let _ = writeln!(out, "H4 = {}", settings.h4);

    for (name, value) in settings.imitation_packets() {
        let _ = writeln!(out, "{name} = {value}");
    }
}
