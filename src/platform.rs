use crate::types::PlatformInfo;
use std::fmt;
use std::io;
use std::path::Path;

pub fn get_system_info() -> PlatformInfo {
    PlatformInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    }
}

/// Architecture/OS pair naming the artifact directory on the update server,
/// e.g. `x86_64-unknown-linux-gnu`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformTriple {
    arch: String,
    system: String,
    windows: bool,
}

impl PlatformTriple {
    pub fn current() -> Self {
        Self::from_info(&get_system_info())
    }

    /// Maps an (os, arch) pair through the fixed table. Unrecognised values
    /// pass through unchanged; the resulting triple may have no artifact on
    /// the update server, which surfaces later as a download failure.
    pub fn from_info(info: &PlatformInfo) -> Self {
        let os = info.os.to_lowercase();
        let arch = match info.arch.to_lowercase().as_str() {
            "amd64" => "x86_64".to_string(),
            other => other.to_string(),
        };
        let system = match os.as_str() {
            "darwin" | "macos" => "apple-darwin".to_string(),
            "linux" => "unknown-linux-gnu".to_string(),
            "windows" => "pc-windows-gnu".to_string(),
            _ => os.clone(),
        };

        Self {
            arch,
            system,
            windows: os == "windows",
        }
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn is_windows(&self) -> bool {
        self.windows
    }

    /// File name of the engine for this platform (`.exe` on Windows).
    pub fn executable_name(&self, base_name: &str) -> String {
        if self.windows {
            format!("{}.exe", base_name)
        } else {
            base_name.to_string()
        }
    }
}

impl fmt::Display for PlatformTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.system)
    }
}

/// Grants execute permission. A no-op where permissions are not mode bits.
pub fn make_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(os: &str, arch: &str) -> PlatformTriple {
        PlatformTriple::from_info(&PlatformInfo {
            os: os.to_string(),
            arch: arch.to_string(),
        })
    }

    #[test]
    fn known_pairs_map_through_table() {
        assert_eq!(triple("linux", "amd64").to_string(), "x86_64-unknown-linux-gnu");
        assert_eq!(triple("darwin", "arm64").to_string(), "arm64-apple-darwin");
        assert_eq!(triple("macos", "aarch64").to_string(), "aarch64-apple-darwin");
        assert_eq!(triple("windows", "x86_64").to_string(), "x86_64-pc-windows-gnu");
    }

    #[test]
    fn unknown_values_pass_through() {
        let t = triple("freebsd", "riscv64");
        assert_eq!(t.to_string(), "riscv64-freebsd");
        assert!(!t.is_windows());
    }

    #[test]
    fn windows_executables_get_exe_suffix() {
        assert_eq!(triple("windows", "amd64").executable_name("NeoAi"), "NeoAi.exe");
        assert_eq!(triple("linux", "amd64").executable_name("NeoAi"), "NeoAi");
    }

    #[cfg(unix)]
    #[test]
    fn make_executable_sets_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        make_executable(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
