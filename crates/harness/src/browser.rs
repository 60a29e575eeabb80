//! Browser process lifecycle: launch, endpoint discovery, teardown.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::cdp::{CdpClient, CdpEvent};
use crate::engine::Engine;
use crate::error::HarnessError;

/// How long an engine gets to print its DevTools endpoint after spawn.
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

static DEVTOOLS_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DevTools listening on (ws\S+)").unwrap());

/// One live browser process plus its DevTools connection.
///
/// The process is killed and its ephemeral profile removed on drop; a
/// browser never outlives the worker that owns it.
pub struct BrowserProcess {
    pub engine: Engine,
    pub client: CdpClient,
    pub version: String,
    child: Child,
    profile_dir: PathBuf,
}

impl BrowserProcess {
    /// Launch a headless browser and connect to its DevTools endpoint.
    pub async fn launch(
        engine: Engine,
    ) -> Result<(BrowserProcess, mpsc::UnboundedReceiver<CdpEvent>), HarnessError> {
        let binary = engine.locate().ok_or_else(|| {
            HarnessError::engine_unavailable(engine.as_str(), "no binary found on PATH")
        })?;

        let profile_dir = std::env::temp_dir().join(format!(
            "xssbench-{}-{}",
            engine.as_str(),
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&profile_dir)?;

        tracing::debug!(
            engine = engine.as_str(),
            binary = %binary.display(),
            "launching browser"
        );

        let mut child = Command::new(&binary)
            .args(engine.launch_args(&profile_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Launch {
                engine: engine.to_string(),
                source,
            })?;

        let ws_url = discover_endpoint(engine, &mut child).await?;
        tracing::debug!(engine = engine.as_str(), %ws_url, "DevTools endpoint up");

        let (client, events) = CdpClient::connect(&ws_url).await?;

        let version = client
            .call(None, "Browser.getVersion", json!({}))
            .await
            .ok()
            .and_then(|v| {
                v.get("product")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok((
            BrowserProcess {
                engine,
                client,
                version,
                child,
                profile_dir,
            },
            events,
        ))
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        if let Err(error) = std::fs::remove_dir_all(&self.profile_dir) {
            tracing::debug!(%error, "could not remove browser profile dir");
        }
    }
}

/// Scan the child's stdout and stderr for the DevTools endpoint banner.
/// Chromium prints it on stderr, Firefox on stdout; watch both.
async fn discover_endpoint(engine: Engine, child: &mut Child) -> Result<String, HarnessError> {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

    if let Some(stdout) = child.stdout.take() {
        let tx = line_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = line_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    drop(line_tx);

    let deadline = tokio::time::Instant::now() + ENDPOINT_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, line_rx.recv()).await {
            Ok(Some(line)) => {
                if let Some(captures) = DEVTOOLS_URL_RE.captures(&line) {
                    return Ok(captures[1].to_string());
                }
            }
            // Both output streams ended without a banner.
            Ok(None) => break,
            Err(_) => break,
        }
    }

    Err(HarnessError::NoDevtoolsEndpoint {
        engine: engine.to_string(),
        waited_ms: ENDPOINT_TIMEOUT.as_millis() as u64,
    })
}
