use crate::catalog::VersionCatalog;
use crate::config::BridgeSettings;
use crate::download::Installer;
use crate::error::{BridgeError, Result};
use crate::platform::{make_executable, PlatformTriple};
use std::fs;
use std::path::PathBuf;

/// Outcome of [`install_latest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub version: String,
    pub binary_path: PathBuf,
    /// False when the latest version was already installed and left alone.
    pub downloaded: bool,
}

/// Returns the engine binary to run, installing the latest release into the
/// install layout when nothing usable is present.
pub async fn resolve_binary_path(
    settings: &BridgeSettings,
    platform: &PlatformTriple,
    show_progress: bool,
) -> Result<PathBuf> {
    if let Some(custom) = &settings.custom_binary_path {
        tracing::info!("Using custom engine binary {}", custom.display());
        if let Err(e) = make_executable(custom) {
            tracing::warn!("Could not mark {} executable: {}", custom.display(), e);
        }
        return Ok(custom.clone());
    }

    let catalog = open_catalog(settings)?;
    let executable = platform.executable_name(&settings.executable_name);

    if let Some(path) = catalog.find_usable(platform, &executable)? {
        return Ok(path);
    }

    tracing::info!("Binary not found, starting download.");
    let report = install_latest(settings, platform, false, show_progress).await?;
    Ok(report.binary_path)
}

/// Installs the release the update server calls latest. Unless `force` is
/// set, an already-present binary for that version is kept.
pub async fn install_latest(
    settings: &BridgeSettings,
    platform: &PlatformTriple,
    force: bool,
    show_progress: bool,
) -> Result<InstallReport> {
    let catalog = open_catalog(settings)?;
    let installer = Installer::new(settings)?.with_progress(show_progress);
    let executable = platform.executable_name(&settings.executable_name);

    let version = installer.resolve_latest_version().await?;
    let binary_path = catalog.binary_path(&version, platform, &executable);

    if !force && binary_path.is_file() {
        tracing::info!("Engine {} is already installed.", version);
        if let Err(e) = make_executable(&binary_path) {
            tracing::warn!("Could not mark {} executable: {}", binary_path.display(), e);
        }
        return Ok(InstallReport {
            version,
            binary_path,
            downloaded: false,
        });
    }

    let url = installer.download_url(&version, platform, &executable);
    tracing::info!("Download url: {}, Binary path: {}", url, binary_path.display());
    installer.download_and_install(&url, &binary_path).await?;
    tracing::info!("Download finished.");

    Ok(InstallReport {
        version,
        binary_path,
        downloaded: true,
    })
}

fn open_catalog(settings: &BridgeSettings) -> Result<VersionCatalog> {
    let binaries_dir = settings.binaries_dir();
    fs::create_dir_all(&binaries_dir).map_err(|source| BridgeError::CreateDir {
        path: binaries_dir.clone(),
        source,
    })?;
    Ok(VersionCatalog::new(binaries_dir))
}
