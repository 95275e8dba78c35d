//! Command execution against a local tunnel registry.

use std::io::Write;

use anyhow::Context;

use wglink_core::{
    AwgParameters, CreateTunnelRequest, HeaderValue, KeyProvider, RegistryConfig, TunnelControl,
    TunnelRegistry, WgKeyProvider, WgQuickControl, PROTOCOL_AMNEZIA, PROTOCOL_WIREGUARD,
};

use crate::cli::{Cli, Commands, CreateArgs, Format, ProtocolArg};

/// Builds the registry from the parsed arguments and runs one command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = RegistryConfig::new(cli.dir.clone());
    let timeout = config.command_timeout;
    let registry = TunnelRegistry::new(
        config,
        WgKeyProvider::new(timeout).with_binary(cli.wg_bin.clone()),
        WgQuickControl::new(timeout).with_binaries(cli.wg_quick_bin.clone(), cli.wg_bin.clone()),
    );
    registry
        .load()
        .await
        .with_context(|| format!("failed to load tunnel registry from {}", cli.dir.display()))?;

    let mut stdout = std::io::stdout().lock();
    execute(&registry, cli.format, cli.command, &mut stdout).await
}

/// Runs one command against an already-loaded registry.
pub async fn execute<K, C, W>(
    registry: &TunnelRegistry<K, C>,
    format: Format,
    command: Commands,
    out: &mut W,
) -> anyhow::Result<()>
where
    K: KeyProvider,
    C: TunnelControl,
    W: Write,
{
    match command {
        Commands::Create(args) => {
            let request = build_request(&args)?;
            let view = registry.create_tunnel(request).await?;
            match format {
                Format::Json => write_json(out, &view)?,
                Format::Table => {
                    writeln!(out, "Created {} ({})", view.interface, view.name)?;
                    writeln!(out, "  protocol:    {}", view.protocol)?;
                    writeln!(out, "  listen port: {}", view.listen_port)?;
                    writeln!(out, "  public key:  {}", view.public_key)?;
                    writeln!(
                        out,
                        "Run `wglink remote-config {}` for the peer's configuration.",
                        view.interface
                    )?;
                }
            }
        }
        Commands::List => {
            let entries = registry.list_tunnels().await;
            match format {
                Format::Json => write_json(out, &entries)?,
                Format::Table => {
                    writeln!(
                        out,
                        "{:<10} {:<20} {:<15} {:>6} {:<8} {:<8} {:<9}",
                        "INTERFACE", "NAME", "PROTOCOL", "PORT", "ENABLED", "RUNNING", "CONNECTED"
                    )?;
                    for entry in entries {
                        writeln!(
                            out,
                            "{:<10} {:<20} {:<15} {:>6} {:<8} {:<8} {:<9}",
                            entry.tunnel.interface,
                            entry.tunnel.name,
                            entry.tunnel.protocol.as_str(),
                            entry.tunnel.listen_port,
                            entry.tunnel.enabled,
                            entry.status.running,
                            entry.status.connected,
                        )?;
                    }
                }
            }
        }
        Commands::Show { interface } => {
            let view = registry.get_tunnel(&interface).await?;
            let status = registry.tunnel_status(&interface).await?;
            match format {
                Format::Json => write_json(
                    out,
                    &serde_json::json!({ "tunnel": view, "status": status }),
                )?,
                Format::Table => {
                    writeln!(out, "{} ({})", view.interface, view.name)?;
                    writeln!(out, "  protocol:        {}", view.protocol)?;
                    writeln!(out, "  local subnet:    {}", view.local_subnet)?;
                    writeln!(out, "  remote subnet:   {}", view.remote_subnet)?;
                    writeln!(out, "  remote endpoint: {}", view.remote_endpoint)?;
                    writeln!(out, "  listen port:     {}", view.listen_port)?;
                    writeln!(out, "  public key:      {}", view.public_key)?;
                    writeln!(out, "  enabled:         {}", view.enabled)?;
                    writeln!(out, "  created:         {}", view.created_at)?;
                    writeln!(out, "  running:         {}", status.running)?;
                    writeln!(out, "  connected:       {}", status.connected)?;
                    if let Some(handshake) = &status.latest_handshake {
                        writeln!(out, "  last handshake:  {handshake}")?;
                    }
                    if let Some(transfer) = &status.transfer {
                        writeln!(out, "  received:        {}", transfer.received)?;
                        writeln!(out, "  sent:            {}", transfer.sent)?;
                    }
                    if let Some(error) = &status.error {
                        writeln!(out, "  note:            {error}")?;
                    }
                }
            }
        }
        Commands::RemoteConfig { interface } => {
            // Raw config text regardless of format; it is meant to be
            // pasted into the remote side's config file.
            let template = registry.remote_template(&interface).await?;
            write!(out, "{template}")?;
        }
        Commands::Enable { interface } => {
            let view = registry.enable_tunnel(&interface).await?;
            match format {
                Format::Json => write_json(out, &view)?,
                Format::Table => writeln!(out, "{} enabled and started", view.interface)?,
            }
        }
        Commands::Disable { interface } => {
            let view = registry.disable_tunnel(&interface).await?;
            match format {
                Format::Json => write_json(out, &view)?,
                Format::Table => writeln!(out, "{} disabled and stopped", view.interface)?,
            }
        }
        Commands::Restart { interface } => {
            registry.restart_tunnel(&interface).await?;
            match format {
                Format::Json => write_json(
                    out,
                    &serde_json::json!({ "interface": interface, "restarted": true }),
                )?,
                Format::Table => writeln!(out, "{interface} restarted")?,
            }
        }
        Commands::Delete { interface } => {
            registry.delete_tunnel(&interface).await?;
            match format {
                Format::Json => write_json(
                    out,
                    &serde_json::json!({ "interface": interface, "deleted": true }),
                )?,
                Format::Table => writeln!(out, "{interface} deleted")?,
            }
        }
    }

    Ok(())
}

fn write_json<W: Write, T: serde::Serialize>(out: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Translates create flags into a registry request.
fn build_request(args: &CreateArgs) -> anyhow::Result<CreateTunnelRequest> {
    let (protocol, settings) = match args.protocol {
        ProtocolArg::Wireguard => {
            anyhow::ensure!(
                !args.has_awg_flags(),
                "AWG parameters require --protocol amnezia"
            );
            (PROTOCOL_WIREGUARD, None)
        }
        ProtocolArg::Amnezia => (PROTOCOL_AMNEZIA, Some(build_settings(args)?)),
    };

    Ok(CreateTunnelRequest {
        name: args.name.clone(),
        protocol: protocol.to_string(),
        local_subnet: args.local_subnet.clone(),
        remote_subnet: args.remote_subnet.clone(),
        remote_endpoint: args.remote_endpoint.clone(),
        remote_public_key: args.remote_public_key.clone(),
        listen_port: args.listen_port,
        settings,
    })
}

/// AWG parameters start from generated defaults; flags override
/// individual fields.
fn build_settings(args: &CreateArgs) -> anyhow::Result<AwgParameters> {
    let mut settings = AwgParameters::generate_defaults();

    if let Some(jc) = args.jc {
        settings.jc = jc;
    }
    if let Some(jmin) = args.jmin {
        settings.jmin = jmin;
    }
    if let Some(jmax) = args.jmax {
        settings.jmax = jmax;
    }
    if let Some(s1) = args.s1 {
        settings.s1 = s1;
    }
    if let Some(s2) = args.s2 {
        settings.s2 = s2;
    }
    if let Some(s3) = args.s3 {
        settings.s3 = s3;
    }
    if let Some(s4) = args.s4 {
        settings.s4 = s4;
    }
    if let Some(h1) = &args.h1 {
        settings.h1 = HeaderValue::new(h1)?;
    }
    if let Some(h2) = &args.h2 {
        settings.h2 = HeaderValue::new(h2)?;
    }
    if let Some(h3) = &args.h3 {
        settings.h3 = HeaderValue::new(h3)?;
    }
    if let Some(h4) = &args.h4 {
        settings.h4 = HeaderValue::new(h4)?;
    }
    if args.i1.is_some() {
        settings.i1 = args.i1.clone();
    }
    if args.i2.is_some() {
        settings.i2 = args.i2.clone();
    }
    if args.i3.is_some() {
        settings.i3 = args.i3.clone();
    }
    if args.i4.is_some() {
        settings.i4 = args.i4.clone();
    }
    if args.i5.is_some() {
        settings.i5 = args.i5.clone();
    }
    if let Some(itime) = args.itime {
        settings.itime = itime;
    }

    Ok(settings)
}
