use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");
    static VERSION: OnceLock<String> = OnceLock::new();

    if let Some(tag) = option_env!("NEOAI_BRIDGE_GIT_TAG") {
        return tag;
    }

    VERSION.get_or_init(|| {
        let commit = option_env!("NEOAI_BRIDGE_GIT_COMMIT").unwrap_or("unknown");
        let branch = option_env!("NEOAI_BRIDGE_GIT_BRANCH").unwrap_or("unknown");
        format!("v{}-{} ({})", BASE_VERSION, commit, branch)
    })
}

#[derive(Parser)]
#[command(name = "neoai-bridge")]
#[command(about = "Runs the NeoAi completion engine behind a local HTTP endpoint")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Default)]
pub struct LocationArgs {
    /// Base directory of the engine binaries
    #[arg(long = "lib-base-dir", visible_alias = "libBaseDir")]
    pub lib_base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install the engine if needed and serve completions over HTTP
    Serve {
        #[command(flatten)]
        location: LocationArgs,
        /// Server port
        #[arg(long)]
        port: Option<u16>,
        /// Give up on an engine request after this many milliseconds
        #[arg(long)]
        request_timeout_ms: Option<u64>,
        /// Send a warm-up request once the engine is running
        #[arg(long)]
        warm_up: bool,
    },

    /// Install the engine if no usable version is present and print its path
    Install {
        #[command(flatten)]
        location: LocationArgs,
    },

    /// Install the latest engine release
    Update {
        #[command(flatten)]
        location: LocationArgs,
        /// Download even if the latest version is already installed
        #[arg(long)]
        force: bool,
    },

    /// List installed engine versions
    List {
        #[command(flatten)]
        location: LocationArgs,
    },

    /// Show the resolved settings
    Config {
        /// Output format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Show the current version
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_accepts_legacy_flag_spelling() {
        let cli = Cli::try_parse_from(["neoai-bridge", "serve", "--libBaseDir", "/opt/neoai", "--port", "8080"])
            .unwrap();
        match cli.command {
            Commands::Serve { location, port, .. } => {
                assert_eq!(location.lib_base_dir, Some(PathBuf::from("/opt/neoai")));
                assert_eq!(port, Some(8080));
            }
            _ => panic!("expected serve"),
        }
    }
}
