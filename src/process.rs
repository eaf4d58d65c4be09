//! Engine child process and its line protocol.
//!
//! ```text
//! ProcessSupervisor                    engine
//! ┌──────────────────┐                ┌──────────┐
//! │ PipeChannel      │──stdin: req\n─▶│          │
//! │                  │◀─stdout: res\n─│          │
//! └──────────────────┘                └──────────┘
//! ```
//!
//! One request line is answered by exactly one response line. There are no
//! correlation ids, so the channel lock is held from the write until the
//! matching read completes or fails.

use crate::error::{BridgeError, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, MutexGuard};

const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);
/// Bound on how long `terminate` waits for an in-flight exchange to let go of
/// the pipes after the child has been killed.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

struct PipeChannel {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl PipeChannel {
    async fn exchange(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.stdin.write_all(payload).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;

        let mut line = Vec::with_capacity(1024);
        let read = self.stdout.read_until(b'\n', &mut line).await?;
        // EOF, or EOF in the middle of a line
        if read == 0 || line.last() != Some(&b'\n') {
            return Err(BridgeError::StreamClosed);
        }

        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }
}

/// One request/response exchange holding the channel lock.
///
/// If the owning future is dropped before the response line has been read,
/// the stream is left out of step: the pipes are dropped and the engine is
/// killed so the next caller cannot read a stale line.
struct Exchange<'a> {
    channel: MutexGuard<'a, Option<PipeChannel>>,
    child: &'a Mutex<Option<Child>>,
    finished: bool,
}

impl Exchange<'_> {
    async fn run(&mut self, payload: &[u8], limit: Option<Duration>) -> Result<Vec<u8>> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(BridgeError::StreamClosed);
        };
        match limit {
            Some(limit) => tokio::time::timeout(limit, channel.exchange(payload))
                .await
                .unwrap_or_else(|_| Err(BridgeError::Timeout(limit))),
            None => channel.exchange(payload).await,
        }
    }
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("Engine request abandoned mid-exchange, closing pipes");
        self.channel.take();
        // A busy child lock means `terminate` is already killing the engine
        if let Ok(mut child) = self.child.try_lock() {
            if let Some(child) = child.as_mut() {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Engine already gone: {}", e);
                }
            }
        }
    }
}

/// Owns the engine process and both of its pipes.
///
/// Dropping the supervisor kills the engine if it is still running.
pub struct ProcessSupervisor {
    executable: PathBuf,
    pid: Option<u32>,
    child: Mutex<Option<Child>>,
    channel: Mutex<Option<PipeChannel>>,
    terminated: AtomicBool,
    request_timeout: Option<Duration>,
}

impl ProcessSupervisor {
    /// Spawns `executable` with `args`, wiring its stdin and stdout to pipes
    /// owned by the supervisor. Stderr is discarded.
    pub async fn start(
        executable: &Path,
        args: &[String],
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut child = spawn_with_retry(executable, args).await?;

        let missing = |what: &str| BridgeError::Spawn {
            path: executable.to_path_buf(),
            source: io::Error::other(format!("{} was not captured", what)),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let pid = child.id();

        tracing::info!("Started engine {} (pid {:?})", executable.display(), pid);

        Ok(Self {
            executable: executable.to_path_buf(),
            pid,
            child: Mutex::new(Some(child)),
            channel: Mutex::new(Some(PipeChannel {
                stdin,
                stdout: BufReader::new(stdout),
            })),
            terminated: AtomicBool::new(false),
            request_timeout,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Writes `payload` plus a newline and waits for one response line,
    /// returned without its terminator.
    ///
    /// Without a request timeout this waits for as long as the engine takes;
    /// a hung engine stalls every caller queued behind the lock. A failed or
    /// timed-out exchange leaves the stream out of step, so the pipes are
    /// dropped and the engine is killed. Later calls fail immediately. The
    /// same happens when the returned future is dropped mid-exchange.
    pub async fn send(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.contains(&b'\n') {
            return Err(BridgeError::PayloadLineBreak);
        }

        let channel = self.channel.lock().await;
        if channel.is_none() {
            return Err(if self.is_terminated() {
                BridgeError::Terminated
            } else {
                BridgeError::StreamClosed
            });
        }

        let mut exchange = Exchange {
            channel,
            child: &self.child,
            finished: false,
        };
        let result = exchange.run(payload, self.request_timeout).await;
        exchange.finished = true;

        if let Err(e) = &result {
            if e.breaks_channel() {
                tracing::warn!("Engine channel broken ({}), closing pipes", e);
                exchange.channel.take();
                drop(exchange);
                self.kill().await;
            }
        }

        result
    }

    /// Kills the engine and closes the pipes. Safe to call more than once
    /// and while a `send` is in flight; that caller sees an error.
    pub async fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        self.kill().await;

        match tokio::time::timeout(RELEASE_TIMEOUT, self.channel.lock()).await {
            Ok(mut channel) => {
                channel.take();
            }
            Err(_) => tracing::warn!(
                "Engine pipes still busy {:?} after kill; they close when the supervisor drops",
                RELEASE_TIMEOUT
            ),
        }
        tracing::debug!("Engine {} terminated", self.executable.display());
    }

    async fn kill(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        if let Err(e) = child.kill().await {
            tracing::debug!("Engine already gone: {}", e);
        }
    }
}

async fn spawn_with_retry(executable: &Path, args: &[String]) -> Result<Child> {
    let mut attempt = 1;
    loop {
        let spawned = Command::new(executable)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => return Ok(child),
            Err(e) if is_text_busy(&e) && attempt < SPAWN_ATTEMPTS => {
                tracing::debug!("{} is busy, retrying spawn", executable.display());
                tokio::time::sleep(SPAWN_RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(BridgeError::Spawn {
                    path: executable.to_path_buf(),
                    source,
                })
            }
        }
    }
}

/// ETXTBSY: the executable is still open for writing, typically a freshly
/// installed binary whose descriptor leaked into a concurrently forked child.
#[cfg(target_os = "linux")]
fn is_text_busy(e: &io::Error) -> bool {
    e.raw_os_error() == Some(26)
}

#[cfg(not(target_os = "linux"))]
fn is_text_busy(_e: &io::Error) -> bool {
    false
}
