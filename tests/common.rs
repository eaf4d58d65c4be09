use neoai_bridge::catalog::VersionCatalog;
use neoai_bridge::{BridgeSettings, PlatformTriple};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Engine that answers every request with the same envelope, padded with
/// fields the envelope does not declare.
#[allow(dead_code)]
pub const FIXED_ENGINE: &str = r#"#!/bin/bash
while IFS= read -r line; do
  echo '{"old_prefix":"pri","results":[{"new_prefix":"print","old_suffix":"","new_suffix":"()","detail":"93%","origin":"VANILLA"}],"user_message":["hello"],"is_locked":false}'
done
"#;

/// Engine that echoes each request back as `old_prefix` after a short random
/// delay. A few request words change its behaviour:
/// `exit` quits, `garbage` answers with a non-JSON line, `hang` stops answering,
/// `slow` answers after half a second.
#[allow(dead_code)]
pub const ECHO_ENGINE: &str = r#"#!/bin/bash
while IFS= read -r line; do
  case "$line" in
    exit) exit 0 ;;
    garbage) echo 'not json at all'; continue ;;
    hang) while IFS= read -r _; do :; done; exit 0 ;;
    slow) sleep 0.5 ;;
  esac
  sleep "0.0$((RANDOM % 5))"
  echo "{\"old_prefix\":\"$line\",\"results\":[],\"user_message\":[],\"engine\":\"stub\"}"
done
"#;

#[allow(dead_code)]
pub const EMPTY_ENVELOPE: &str = r#"{"old_prefix":"","results":[],"user_message":[]}"#;

#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub settings: BridgeSettings,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut settings = BridgeSettings::with_base_dir(temp_dir.path().join("lib"));
        // Nothing listens here; tests that need the update server override it
        settings.update_url = "http://127.0.0.1:9".to_string();
        settings.http_timeout_secs = 10;

        Self { temp_dir, settings }
    }

    pub fn catalog(&self) -> VersionCatalog {
        VersionCatalog::new(self.settings.binaries_dir())
    }

    pub fn executable_name(&self) -> String {
        PlatformTriple::current().executable_name(&self.settings.executable_name)
    }

    /// Writes `script` as the engine binary of `version` for this platform.
    pub fn install_stub(&self, version: &str, script: &str) -> PathBuf {
        let path = self
            .catalog()
            .binary_path(version, &PlatformTriple::current(), &self.executable_name());
        write_script(&path, script);
        path
    }

    /// Writes `script` outside the install layout.
    pub fn loose_stub(&self, name: &str, script: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        write_script(&path, script);
        path
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_neoai-bridge"));
        cmd.env("NEOAI_BASE_DIR", &self.settings.base_dir);
        cmd.env("NEOAI_UPDATE_URL", &self.settings.update_url);
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("XDG_DATA_HOME", self.temp_dir.path().join("data"));
        cmd.env_remove("RUST_LOG");
        cmd
    }
}

#[allow(dead_code)]
fn write_script(path: &Path, script: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, script).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }
}

#[allow(dead_code)]
pub fn decode(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).expect("response was not JSON")
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(
            !self.status.success(),
            "Command unexpectedly succeeded\nstdout: {}",
            self.stdout
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }
}
