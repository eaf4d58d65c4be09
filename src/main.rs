mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConfigFormat, LocationArgs};
use neoai_bridge::catalog::VersionCatalog;
use neoai_bridge::install::{install_latest, resolve_binary_path};
use neoai_bridge::{load_settings, server, Bridge, BridgeSettings, PlatformTriple};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let mut settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Version => {
            println!("neoai-bridge {}", cli::get_version());
        }

        Commands::Config { format } => {
            let rendered = match format {
                ConfigFormat::Json => serde_json::to_string_pretty(&settings)?,
                ConfigFormat::Yaml => serde_yaml::to_string(&settings)?,
            };
            println!("{}", rendered);
        }

        Commands::List { location } => {
            apply_location(&mut settings, &location);
            list_installed_versions(&settings)?;
        }

        Commands::Install { location } => {
            apply_location(&mut settings, &location);
            let path = resolve_binary_path(&settings, &PlatformTriple::current(), true)
                .await
                .context("Failed to install engine")?;
            println!("{}", path.display());
        }

        Commands::Update { location, force } => {
            apply_location(&mut settings, &location);
            let report = install_latest(&settings, &PlatformTriple::current(), force, true)
                .await
                .context("Failed to update engine")?;
            if report.downloaded {
                tracing::info!("Engine {} installed", report.version);
            } else {
                tracing::info!("Engine {} is already up to date", report.version);
            }
            println!("{}", report.binary_path.display());
        }

        Commands::Serve {
            location,
            port,
            request_timeout_ms,
            warm_up,
        } => {
            apply_location(&mut settings, &location);
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(ms) = request_timeout_ms {
                settings.request_timeout_ms = Some(ms).filter(|ms| *ms > 0);
            }
            settings.warm_up |= warm_up;
            serve(settings).await?;
        }
    }

    Ok(())
}

async fn serve(settings: BridgeSettings) -> Result<()> {
    let bridge = Bridge::install_and_start(&settings)
        .await
        .context("Failed to initialize NeoAi")?;
    let bridge = Arc::new(bridge);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let served = server::serve(Arc::clone(&bridge), addr, server::shutdown_signal()).await;

    bridge.close().await;
    served
}

fn apply_location(settings: &mut BridgeSettings, location: &LocationArgs) {
    if let Some(dir) = &location.lib_base_dir {
        settings.base_dir = dir.clone();
    }
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn list_installed_versions(settings: &BridgeSettings) -> Result<()> {
    let catalog = VersionCatalog::new(settings.binaries_dir());
    let platform = PlatformTriple::current();
    let executable = platform.executable_name(&settings.executable_name);
    let active = catalog.active_version();

    println!("--- Installed NeoAi Engines ({}) ---", platform);
    let versions = catalog.list_installed()?;
    if versions.is_empty() {
        println!("  No engine versions installed yet.");
        return Ok(());
    }

    for installed in versions.iter().rev() {
        let path = catalog.binary_path(&installed.dir_name, &platform, &executable);
        let status = if path.is_file() { "ready" } else { "no binary for this platform" };
        let pin = if active.as_deref() == Some(installed.dir_name.as_str()) {
            " [active]"
        } else {
            ""
        };
        println!("  - {}{} ({})", installed, pin, status);
    }
    Ok(())
}
