//! Engine download and installation.
//!
//! An install never touches the destination until the downloaded bytes are
//! complete and verified: the body is streamed into a temp file next to the
//! destination while being hashed, then renamed over the destination.

use crate::config::BridgeSettings;
use crate::error::{BridgeError, Result};
use crate::platform::{make_executable, PlatformTriple};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;

pub struct Installer {
    client: Client,
    update_url: String,
    show_progress: bool,
}

impl Installer {
    pub fn new(settings: &BridgeSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.http_timeout())
            .user_agent(concat!("neoai-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BridgeError::HttpClient)?;

        Ok(Self {
            client,
            update_url: settings.update_url.trim_end_matches('/').to_string(),
            show_progress: false,
        })
    }

    /// Render a progress bar on stderr while downloading.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn version_url(&self) -> String {
        format!("{}/bundles/version", self.update_url)
    }

    pub fn download_url(&self, version: &str, triple: &PlatformTriple, executable: &str) -> String {
        format!("{}/bundles/{}/{}/{}", self.update_url, version, triple, executable)
    }

    /// Latest engine version advertised by the update server, verbatim apart
    /// from surrounding whitespace.
    pub async fn resolve_latest_version(&self) -> Result<String> {
        let url = self.version_url();
        tracing::debug!("Fetching latest version from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| BridgeError::VersionRequest {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::VersionStatus { url, status });
        }

        let body = response
            .text()
            .await
            .map_err(|source| BridgeError::VersionRequest {
                url: url.clone(),
                source,
            })?;

        let version = body.trim().to_string();
        validate_version(&version)?;
        tracing::info!("Latest version: {}", version);
        Ok(version)
    }

    /// Downloads `url` to `destination`, verifying it against `<url>.sha256`
    /// when the server provides one.
    pub async fn download_and_install(&self, url: &str, destination: &Path) -> Result<()> {
        // 1. Directory preparation
        let install_dir = destination
            .parent()
            .ok_or_else(|| BridgeError::Config(format!("no parent for {}", destination.display())))?;
        fs::create_dir_all(install_dir).map_err(|source| BridgeError::CreateDir {
            path: install_dir.to_path_buf(),
            source,
        })?;

        // 2. Checksum (best effort)
        let expected = self.fetch_checksum(url).await;

        // 3. Download into a temp file while hashing
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| BridgeError::Download {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::DownloadStatus {
                url: url.to_string(),
                status,
            });
        }

        let install_err = |source: std::io::Error| BridgeError::Install {
            path: destination.to_path_buf(),
            source,
        };

        // Same directory as the destination so the final rename stays on one
        // filesystem. Dropped (and deleted) on every early return below.
        let mut staged = tempfile::Builder::new()
            .prefix(".neoai-download-")
            .tempfile_in(install_dir)
            .map_err(install_err)?;

        let progress = self.progress_bar(response.content_length(), destination);
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| BridgeError::Download {
                url: url.to_string(),
                source,
            })?;
            staged.write_all(&chunk).map_err(install_err)?;
            hasher.update(&chunk);
            progress.inc(chunk.len() as u64);
        }
        staged.flush().map_err(install_err)?;
        progress.finish_and_clear();

        // Closes the file; the path is still removed on drop.
        let staged = staged.into_temp_path();

        // 4. Verify, then rename into place
        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = expected {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(BridgeError::ChecksumMismatch {
                    url: url.to_string(),
                    expected,
                    actual,
                });
            }
            tracing::info!("Checksum verified.");
        } else {
            tracing::warn!("Installing {} without checksum verification", url);
        }

        staged
            .persist(destination)
            .map_err(|e| install_err(e.error))?;
        make_executable(destination).map_err(install_err)?;

        tracing::info!("Installed engine at {}", destination.display());
        Ok(())
    }

    async fn fetch_checksum(&self, url: &str) -> Option<String> {
        let checksum_url = format!("{}.sha256", url);

        let response = match self.client.get(&checksum_url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "Could not download checksum from {}: {}. Proceeding without verification.",
                    checksum_url,
                    e
                );
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                "Checksum request {} returned {}. Proceeding without verification.",
                checksum_url,
                response.status()
            );
            return None;
        }

        match response.text().await {
            Ok(body) => parse_checksum(&body),
            Err(e) => {
                tracing::warn!("Could not read checksum body: {}. Proceeding without verification.", e);
                None
            }
        }
    }

    fn progress_bar(&self, total: Option<u64>, destination: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total.unwrap_or(0));
        let style = ProgressStyle::default_bar()
            .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        pb.set_message(format!("Downloading {}", name));
        pb
    }
}

/// First token of a checksum body, so both a bare digest and
/// `sha256sum` output (`<digest>  <file>`) are accepted.
fn parse_checksum(body: &str) -> Option<String> {
    body.split_whitespace().next().map(str::to_string)
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.contains(['/', '\\']) || version.contains("..") {
        return Err(BridgeError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_body_formats() {
        assert_eq!(parse_checksum("ABCDEF\n"), Some("ABCDEF".to_string()));
        assert_eq!(parse_checksum("abcdef  NeoAi\n"), Some("abcdef".to_string()));
        assert_eq!(parse_checksum("  \n"), None);
    }

    #[test]
    fn version_strings_cannot_escape_layout() {
        assert!(validate_version("4.4.223").is_ok());
        assert!(validate_version("4.4.223-beta").is_ok());
        assert!(validate_version("").is_err());
        assert!(validate_version("../../etc").is_err());
        assert!(validate_version("1.0/evil").is_err());
        assert!(validate_version("..").is_err());
    }

    #[test]
    fn urls_follow_bundle_layout() {
        let settings = BridgeSettings {
            update_url: "https://update.example/".to_string(),
            ..BridgeSettings::default()
        };
        let installer = Installer::new(&settings).unwrap();
        let triple = PlatformTriple::from_info(&crate::types::PlatformInfo {
            os: "linux".to_string(),
            arch: "amd64".to_string(),
        });
        assert_eq!(installer.version_url(), "https://update.example/bundles/version");
        assert_eq!(
            installer.download_url("1.2.3", &triple, "NeoAi"),
            "https://update.example/bundles/1.2.3/x86_64-unknown-linux-gnu/NeoAi"
        );
    }
}
