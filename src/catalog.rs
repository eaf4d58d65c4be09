//! Installed-version discovery.
//!
//! The install layout `<binaries>/<version>/<triple>/<executable>` is the only
//! record of what is installed. Every immediate subdirectory of the binaries
//! root is a candidate version.

use crate::config::ACTIVE_FILE_NAME;
use crate::error::{BridgeError, Result};
use crate::platform::{make_executable, PlatformTriple};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Version parsed from a directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryVersion {
    Known(semver::Version),
    /// The name is not a semantic version. Orders below every known version.
    Unknown,
}

impl BinaryVersion {
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim().trim_start_matches('v');
        match semver::Version::parse(trimmed) {
            Ok(version) => BinaryVersion::Known(version),
            Err(_) => BinaryVersion::Unknown,
        }
    }
}

impl Ord for BinaryVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BinaryVersion::Known(a), BinaryVersion::Known(b)) => a.cmp(b),
            (BinaryVersion::Known(_), BinaryVersion::Unknown) => Ordering::Greater,
            (BinaryVersion::Unknown, BinaryVersion::Known(_)) => Ordering::Less,
            (BinaryVersion::Unknown, BinaryVersion::Unknown) => Ordering::Equal,
        }
    }
}

impl PartialOrd for BinaryVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One version directory under the binaries root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    /// Directory name exactly as found on disk.
    pub dir_name: String,
    pub version: BinaryVersion,
}

impl InstalledVersion {
    pub fn new(dir_name: impl Into<String>) -> Self {
        let dir_name = dir_name.into();
        let version = BinaryVersion::parse(&dir_name);
        Self { dir_name, version }
    }
}

impl Ord for InstalledVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.dir_name.cmp(&other.dir_name))
    }
}

impl PartialOrd for InstalledVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for InstalledVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name)
    }
}

pub struct VersionCatalog {
    binaries_dir: PathBuf,
}

impl VersionCatalog {
    pub fn new(binaries_dir: impl Into<PathBuf>) -> Self {
        Self {
            binaries_dir: binaries_dir.into(),
        }
    }

    pub fn binaries_dir(&self) -> &Path {
        &self.binaries_dir
    }

    /// Expected path of the engine for `version_dir` on `triple`.
    pub fn binary_path(&self, version_dir: &str, triple: &PlatformTriple, executable: &str) -> PathBuf {
        self.binaries_dir
            .join(version_dir)
            .join(triple.to_string())
            .join(executable)
    }

    /// Installed versions in ascending precedence. A missing binaries root
    /// yields an empty list.
    pub fn list_installed(&self) -> Result<Vec<InstalledVersion>> {
        let entries = match fs::read_dir(&self.binaries_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(BridgeError::ReadDir {
                    path: self.binaries_dir.clone(),
                    source,
                })
            }
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| BridgeError::ReadDir {
                path: self.binaries_dir.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let installed = InstalledVersion::new(name);
            if installed.version == BinaryVersion::Unknown {
                tracing::debug!("Version directory '{}' is not semver, ranking it last", installed);
            }
            versions.push(installed);
        }

        versions.sort();
        Ok(versions)
    }

    pub fn newest(&self) -> Result<Option<InstalledVersion>> {
        Ok(self.list_installed()?.pop())
    }

    /// Version named by the `.active` pin file, if any.
    pub fn active_version(&self) -> Option<String> {
        fs::read_to_string(self.binaries_dir.join(ACTIVE_FILE_NAME))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Finds the engine to run: the pinned version if its binary exists,
    /// otherwise the newest version whose binary exists. Versions without a
    /// binary for this platform are skipped. The chosen binary is made
    /// executable before it is returned.
    pub fn find_usable(&self, triple: &PlatformTriple, executable: &str) -> Result<Option<PathBuf>> {
        if let Some(active) = self.active_version() {
            let path = self.binary_path(&active, triple, executable);
            if path.is_file() {
                tracing::info!("Using pinned engine version {}", active);
                return Ok(Some(prepare(path)));
            }
            tracing::warn!("Pinned version {} has no binary for {}, ignoring pin", active, triple);
        }

        for installed in self.list_installed()?.iter().rev() {
            let path = self.binary_path(&installed.dir_name, triple, executable);
            if path.is_file() {
                tracing::info!("Using installed engine version {}", installed);
                return Ok(Some(prepare(path)));
            }
            tracing::debug!("Skipping version {}: no binary at {}", installed, path.display());
        }

        Ok(None)
    }
}

fn prepare(path: PathBuf) -> PathBuf {
    if let Err(e) = make_executable(&path) {
        tracing::warn!("Could not mark {} executable: {}", path.display(), e);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlatformInfo;

    fn linux() -> PlatformTriple {
        PlatformTriple::from_info(&PlatformInfo {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        })
    }

    fn place_binary(catalog: &VersionCatalog, version: &str) -> PathBuf {
        let path = catalog.binary_path(version, &linux(), "NeoAi");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"engine").unwrap();
        path
    }

    #[test]
    fn unknown_versions_sort_oldest() {
        let mut versions = vec![
            InstalledVersion::new("nightly"),
            InstalledVersion::new("1.10.0"),
            InstalledVersion::new("1.2.0"),
            InstalledVersion::new("2.0.0-rc.1"),
        ];
        versions.sort();
        let names: Vec<_> = versions.iter().map(|v| v.dir_name.as_str()).collect();
        assert_eq!(names, vec!["nightly", "1.2.0", "1.10.0", "2.0.0-rc.1"]);
    }

    #[test]
    fn prerelease_ranks_below_release() {
        assert!(BinaryVersion::parse("2.0.0-broken") < BinaryVersion::parse("2.0.0"));
        assert!(BinaryVersion::parse("v1.0.0") == BinaryVersion::parse("1.0.0"));
    }

    #[test]
    fn newest_usable_skips_versions_without_binary() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = VersionCatalog::new(dir.path());
        for version in ["1.0.0", "2.0.0-broken"] {
            fs::create_dir_all(dir.path().join(version)).unwrap();
        }
        let expected = place_binary(&catalog, "1.2.0");

        assert_eq!(catalog.newest().unwrap().unwrap().dir_name, "2.0.0-broken");
        let found = catalog.find_usable(&linux(), "NeoAi").unwrap();
        assert_eq!(found, Some(expected));
    }

    #[test]
    fn active_pin_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = VersionCatalog::new(dir.path());
        let pinned = place_binary(&catalog, "1.0.0");
        place_binary(&catalog, "1.5.0");
        fs::write(dir.path().join(ACTIVE_FILE_NAME), "1.0.0\n").unwrap();

        assert_eq!(catalog.find_usable(&linux(), "NeoAi").unwrap(), Some(pinned));
    }

    #[test]
    fn dangling_pin_falls_back_to_scan() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = VersionCatalog::new(dir.path());
        let newest = place_binary(&catalog, "1.5.0");
        fs::write(dir.path().join(ACTIVE_FILE_NAME), "0.9.0").unwrap();

        assert_eq!(catalog.find_usable(&linux(), "NeoAi").unwrap(), Some(newest));
    }

    #[test]
    fn missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = VersionCatalog::new(dir.path().join("absent"));
        assert!(catalog.list_installed().unwrap().is_empty());
        assert_eq!(catalog.find_usable(&linux(), "NeoAi").unwrap(), None);
    }
}
