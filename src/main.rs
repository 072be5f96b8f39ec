use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use webssh_relay::cli::{Cli, Command};
use webssh_relay::config;
use webssh_relay::server::ShutdownOutcome;
use webssh_relay::ssh::keys;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::CheckConfig) => {
            let cfg = config::resolve_config(cli.config.as_deref())?;
            println!("Configuration is valid.");
            println!("  Listen: {}", cfg.server.listen);
            println!("  WebSocket path: {}", cfg.server.ws_path);
            println!("  SSH port: {}", cfg.relay.ssh_port);
            println!("  Default username: {}", cfg.relay.default_username);
            let key_path = &cfg.relay.private_key_path;
            let key_status = if !key_path.exists() {
                " (missing)".to_string()
            } else {
                match keys::load_private_key(key_path, cfg.relay.private_key_passphrase.as_deref())
                {
                    Ok(_) => String::new(),
                    Err(e) => format!(" (unreadable: {:#})", e),
                }
            };
            println!("  Private key: {}{}", key_path.display(), key_status);
            if cfg.relay.accept_any_host_key {
                println!("  Host key verification: DISABLED (development only)");
            }
            return Ok(());
        }
        Some(Command::ShowConfig { format }) => {
            let app_config = config::resolve_config(cli.config.as_deref())?;
            let redacted = config::redact::redact_config(&app_config);

            match format.as_str() {
                "json" => {
                    let json = serde_json::to_string_pretty(&redacted)?;
                    println!("{}", json);
                }
                "toml" => {
                    let toml_str = toml::to_string_pretty(&redacted)?;
                    println!("{}", toml_str);
                }
                _ => {
                    anyhow::bail!("unsupported format '{}' (available: toml, json)", format);
                }
            }
            return Ok(());
        }
        Some(Command::GenerateKey { output, force }) => {
            let path = match output {
                Some(p) => p.clone(),
                None => config::resolve_config(cli.config.as_deref())?
                    .relay
                    .private_key_path,
            };
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            let key = keys::generate_client_key()?;
            keys::save_private_key(&key, &path)?;
            eprintln!("Private key written to {}", path.display());
            eprintln!("Add this line to ~/.ssh/authorized_keys on target hosts:");
            println!("{}", keys::public_key_line(&key)?);
            return Ok(());
        }
        Some(Command::HealthCheck { addr, timeout }) => {
            use std::net::TcpStream;
            use std::time::Duration;

            let Ok(sock_addr) = addr.parse() else {
                eprintln!("Invalid address: {}", addr);
                std::process::exit(1);
            };
            match TcpStream::connect_timeout(&sock_addr, Duration::from_secs(*timeout)) {
                Ok(_) => {
                    println!("OK: {} is reachable", addr);
                    return Ok(());
                }
                Err(e) => {
                    eprintln!("FAIL: {} is not reachable: {}", addr, e);
                    std::process::exit(1);
                }
            }
        }
        Some(Command::Completions { shell }) => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "webssh-relay", &mut std::io::stdout());
            return Ok(());
        }
        None => {}
    }

    let app_config = config::resolve_config(cli.config.as_deref())?;

    // Setup logging (CLI override > config)
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| app_config.logging.level.to_string());
    webssh_relay::logging::setup_logging(&log_level, app_config.logging.format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %app_config.server.listen,
        "Starting WebSocket SSH relay"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match webssh_relay::server::run(app_config).await {
            Ok(ShutdownOutcome::Clean) => {}
            Ok(ShutdownOutcome::Forced) => std::process::exit(1),
            Err(e) => {
                error!(error = %e, "Server error");
                std::process::exit(1);
            }
        }
    });

    Ok(())
}
