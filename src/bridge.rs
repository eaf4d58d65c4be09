use crate::config::BridgeSettings;
use crate::error::Result;
use crate::install::resolve_binary_path;
use crate::platform::PlatformTriple;
use crate::process::ProcessSupervisor;
use crate::types::AutocompleteResult;
use std::path::Path;

const WARM_UP_PROTOCOL_VERSION: &str = "1.0.7";

/// Provisioned engine plus the pipe channel to it.
///
/// [`request`](Bridge::request) never fails: any pipe or decode problem
/// yields the empty envelope instead.
pub struct Bridge {
    supervisor: ProcessSupervisor,
    empty_response: Vec<u8>,
}

impl Bridge {
    /// Finds or installs the engine for this platform and starts it.
    pub async fn install_and_start(settings: &BridgeSettings) -> Result<Self> {
        Self::install_and_start_with_progress(settings, false).await
    }

    pub async fn install_and_start_with_progress(
        settings: &BridgeSettings,
        show_progress: bool,
    ) -> Result<Self> {
        tracing::info!("Bridge initializing from {}", settings.base_dir.display());
        let platform = PlatformTriple::current();
        let binary_path = resolve_binary_path(settings, &platform, show_progress).await?;
        let bridge = Self::start(&binary_path, settings).await?;
        if settings.warm_up {
            bridge.warm_up().await;
        }
        tracing::info!("Bridge initialized");
        Ok(bridge)
    }

    /// Starts an engine that is already on disk.
    pub async fn start(binary_path: &Path, settings: &BridgeSettings) -> Result<Self> {
        let empty_response = serde_json::to_vec(&AutocompleteResult::default())?;
        let supervisor = ProcessSupervisor::start(
            binary_path,
            &settings.engine_args(),
            settings.request_timeout(),
        )
        .await?;

        Ok(Self {
            supervisor,
            empty_response,
        })
    }

    pub fn binary_path(&self) -> &Path {
        self.supervisor.executable()
    }

    /// OS pid of the engine, if it was still known at spawn time.
    pub fn engine_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    pub fn empty_response(&self) -> &[u8] {
        &self.empty_response
    }

    /// Sends one request to the engine and returns its envelope re-encoded,
    /// which drops any field the envelope does not declare.
    pub async fn request(&self, data: &[u8]) -> Vec<u8> {
        let line = match self.supervisor.send(data).await {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!("Engine request failed: {}", e);
                return self.empty_response.clone();
            }
        };

        let envelope: AutocompleteResult = match serde_json::from_slice(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!("Engine returned an undecodable line: {}", e);
                return self.empty_response.clone();
            }
        };

        serde_json::to_vec(&envelope).unwrap_or_else(|e| {
            tracing::warn!("Could not re-encode engine response: {}", e);
            self.empty_response.clone()
        })
    }

    /// Turns on semantic completion in the engine and logs its first
    /// suggestion. Failures only degrade to an empty answer.
    pub async fn warm_up(&self) {
        let request = serde_json::json!({
            "version": WARM_UP_PROTOCOL_VERSION,
            "request": {
                "Autocomplete": {
                    "filename": "test.py",
                    "before": "neoai::sem",
                    "after": "",
                    "region_includes_beginning": true,
                    "region_includes_end": true,
                    "max_num_results": 10,
                }
            }
        });

        let body = self.request(request.to_string().as_bytes()).await;
        match serde_json::from_slice::<AutocompleteResult>(&body) {
            Ok(envelope) => match envelope.results.first() {
                Some(first) => tracing::info!("Warm-up: {}{}", first.new_prefix, first.new_suffix),
                None => tracing::debug!("Warm-up returned no suggestions"),
            },
            Err(e) => tracing::debug!("Warm-up response unreadable: {}", e),
        }
    }

    pub async fn close(&self) {
        tracing::info!("Bridge closing, stopping engine");
        self.supervisor.terminate().await;
    }
}
