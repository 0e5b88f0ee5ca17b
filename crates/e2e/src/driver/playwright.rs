//! Playwright browser automation
//!
//! A generated Node script keeps one browser page open and serves
//! line-delimited JSON commands over stdin/stdout. Each field operation is one
//! round trip; replies are matched by request id so a reply that arrives after
//! its caller timed out is skipped instead of being mistaken for the next one.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{AutomationDriver, FieldHandle, Key};
use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub node_binary: PathBuf,
    /// Time allowed for the browser to launch
    #[serde(with = "crate::policy::millis")]
    pub launch_timeout: Duration,
    /// Per-operation timeout for clicks, fills and key presses
    #[serde(with = "crate::policy::millis")]
    pub action_timeout: Duration,
    #[serde(with = "crate::policy::millis")]
    pub navigation_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            launch_timeout: Duration::from_secs(60),
            action_timeout: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Navigate { url: &'a str, timeout_ms: u64 },
    WaitVisible { selector: &'a str, timeout_ms: u64 },
    Focus { selector: &'a str, timeout_ms: u64 },
    Clear { selector: &'a str, timeout_ms: u64 },
    SetValue { selector: &'a str, text: &'a str, timeout_ms: u64 },
    TypeChar { selector: &'a str, text: String, delay_ms: u64, timeout_ms: u64 },
    Press { selector: &'a str, key: &'static str, timeout_ms: u64 },
    Value { selector: &'a str },
    DispatchInput { selector: &'a str },
    Close,
}

impl BridgeCommand<'_> {
    fn name(&self) -> &'static str {
        match self {
            BridgeCommand::Navigate { .. } => "navigate",
            BridgeCommand::WaitVisible { .. } => "wait_visible",
            BridgeCommand::Focus { .. } => "focus",
            BridgeCommand::Clear { .. } => "clear",
            BridgeCommand::SetValue { .. } => "set_value",
            BridgeCommand::TypeChar { .. } => "type_char",
            BridgeCommand::Press { .. } => "press",
            BridgeCommand::Value { .. } => "value",
            BridgeCommand::DispatchInput { .. } => "dispatch_input",
            BridgeCommand::Close => "close",
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Running Node process hosting the browser page
struct Bridge {
    io: Mutex<BridgeIo>,
    child: Mutex<Child>,
    next_id: AtomicU64,
    // Keeps the generated script on disk for the lifetime of the process
    _script_dir: tempfile::TempDir,
}

impl Bridge {
    /// Send one command and wait at most `limit` for its reply
    async fn call(&self, command: BridgeCommand<'_>, limit: Duration) -> HarnessResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = command.name();
        let mut line = serde_json::to_string(&Envelope { id, command })?;
        line.push('\n');

        let mut io = self.io.lock().await;
        let exchange = async {
            io.stdin.write_all(line.as_bytes()).await?;
            io.stdin.flush().await?;
            read_reply(&mut io.stdout, id).await
        };

        match tokio::time::timeout(limit, exchange).await {
            Ok(Ok(reply)) if reply.ok => Ok(reply.value),
            Ok(Ok(reply)) => Err(HarnessError::Bridge(format!(
                "{} failed: {}",
                name,
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HarnessError::Timeout(format!(
                "bridge reply to {} after {} ms",
                name,
                limit.as_millis()
            ))),
        }
    }
}

/// Read lines until the reply for `id` arrives; other output is logged
async fn read_reply(stdout: &mut Lines<BufReader<ChildStdout>>, id: u64) -> HarnessResult<BridgeReply> {
    loop {
        let line = stdout
            .next_line()
            .await?
            .ok_or_else(|| HarnessError::Bridge("bridge process exited".to_string()))?;
        match serde_json::from_str::<BridgeReply>(&line) {
            Ok(reply) if reply.id == id => return Ok(reply),
            Ok(reply) => debug!("Discarding stale bridge reply #{}", reply.id),
            Err(_) => debug!("[bridge] {}", line),
        }
    }
}

/// Browser page driven through Playwright
pub struct PlaywrightDriver {
    bridge: Arc<Bridge>,
    config: PlaywrightConfig,
}

impl PlaywrightDriver {
    /// Launch the browser and wait for the bridge to report ready
    pub async fn launch(config: PlaywrightConfig) -> HarnessResult<Self> {
        Self::check_playwright_installed()?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, build_bridge_script(&config))?;

        info!(
            "Launching {} ({})",
            config.browser.as_str(),
            if config.headless { "headless" } else { "headed" }
        );

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::Bridge(format!(
                    "failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Bridge("bridge stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[bridge] {}", line);
                }
            });
        }

        let mut stdout = BufReader::new(stdout).lines();
        let ready = tokio::time::timeout(config.launch_timeout, read_reply(&mut stdout, 0))
            .await
            .map_err(|_| HarnessError::Timeout("browser launch".to_string()))??;
        if !ready.ok {
            return Err(HarnessError::Bridge(format!(
                "browser launch failed: {}",
                ready.error.unwrap_or_default()
            )));
        }

        Ok(Self {
            bridge: Arc::new(Bridge {
                io: Mutex::new(BridgeIo { stdin, stdout }),
                child: Mutex::new(child),
                next_id: AtomicU64::new(1),
                _script_dir: script_dir,
            }),
            config,
        })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> HarnessResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl AutomationDriver for PlaywrightDriver {
    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        let timeout_ms = self.config.navigation_timeout.as_millis() as u64;
        // goto plus the load-state fallbacks inside the bridge
        let limit = self.config.navigation_timeout + Duration::from_secs(30);
        self.bridge
            .call(BridgeCommand::Navigate { url, timeout_ms }, limit)
            .await
            .map(|_| ())
            .map_err(|e| HarnessError::Acquisition(format!("navigation to {} failed: {}", url, e)))
    }

    async fn locate(&self, selector: &str) -> HarnessResult<Box<dyn FieldHandle>> {
        Ok(Box::new(PlaywrightField {
            bridge: Arc::clone(&self.bridge),
            selector: selector.to_string(),
            action_timeout: self.config.action_timeout,
        }))
    }

    async fn shutdown(&self) -> HarnessResult<()> {
        if let Err(e) = self.bridge.call(BridgeCommand::Close, Duration::from_secs(5)).await {
            debug!("Bridge close: {}", e);
        }

        let mut child = self.bridge.child.lock().await;

        // Try graceful shutdown first
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                let _ = tokio::time::timeout(Duration::from_millis(500), child.wait()).await;
            }
        }

        // Force kill if still running
        if let Ok(None) = child.try_wait() {
            let _ = child.kill().await;
        }
        Ok(())
    }
}

struct PlaywrightField {
    bridge: Arc<Bridge>,
    selector: String,
    action_timeout: Duration,
}

impl PlaywrightField {
    fn timeout_ms(&self) -> u64 {
        self.action_timeout.as_millis() as u64
    }

    /// Reply budget: the in-page timeout plus transport slack
    fn limit(&self, op: Duration) -> Duration {
        op + Duration::from_secs(5)
    }

    async fn act(&self, command: BridgeCommand<'_>) -> HarnessResult<()> {
        let limit = self.limit(self.action_timeout);
        self.bridge
            .call(command, limit)
            .await
            .map(|_| ())
            .map_err(|e| HarnessError::Driver(e.to_string()))
    }
}

#[async_trait]
impl FieldHandle for PlaywrightField {
    async fn wait_visible(&self, timeout: Duration) -> HarnessResult<()> {
        let command = BridgeCommand::WaitVisible {
            selector: &self.selector,
            timeout_ms: timeout.as_millis() as u64,
        };
        self.bridge
            .call(command, self.limit(timeout))
            .await
            .map(|_| ())
            .map_err(|e| HarnessError::Acquisition(format!("{} not visible: {}", self.selector, e)))
    }

    async fn focus(&self) -> HarnessResult<()> {
        self.act(BridgeCommand::Focus {
            selector: &self.selector,
            timeout_ms: self.timeout_ms(),
        })
        .await
    }

    async fn clear(&self) -> HarnessResult<()> {
        self.act(BridgeCommand::Clear {
            selector: &self.selector,
            timeout_ms: self.timeout_ms(),
        })
        .await
    }

    async fn set_value(&self, text: &str) -> HarnessResult<()> {
        self.act(BridgeCommand::SetValue {
            selector: &self.selector,
            text,
            timeout_ms: self.timeout_ms(),
        })
        .await
    }

    async fn type_char(&self, c: char, delay: Duration) -> HarnessResult<()> {
        self.act(BridgeCommand::TypeChar {
            selector: &self.selector,
            text: c.to_string(),
            delay_ms: delay.as_millis() as u64,
            timeout_ms: self.timeout_ms(),
        })
        .await
    }

    async fn press_key(&self, key: Key) -> HarnessResult<()> {
        self.act(BridgeCommand::Press {
            selector: &self.selector,
            key: key.as_str(),
            timeout_ms: self.timeout_ms(),
        })
        .await
    }

    async fn current_value(&self) -> HarnessResult<String> {
        let value = self
            .bridge
            .call(BridgeCommand::Value { selector: &self.selector }, self.limit(self.action_timeout))
            .await
            .map_err(|e| HarnessError::Driver(e.to_string()))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn dispatch_input_event(&self) -> HarnessResult<()> {
        self.act(BridgeCommand::DispatchInput { selector: &self.selector }).await
    }
}

/// Build the Node bridge script for the configured browser
fn build_bridge_script(config: &PlaywrightConfig) -> String {
    format!(
        r#"
const pw = require(require.resolve('playwright', {{ paths: [process.cwd(), __dirname] }}));
const readline = require('readline');

const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

async function settle(page) {{
  try {{
    await page.waitForLoadState('networkidle', {{ timeout: 15000 }});
  }} catch (e) {{
    try {{
      await page.waitForLoadState('load', {{ timeout: 10000 }});
    }} catch (e2) {{
      await page.waitForTimeout(3000);
    }}
  }}
  await page.waitForTimeout(1000);
}}

async function handle(page, req) {{
  const field = req.selector ? page.locator(req.selector) : null;
  switch (req.cmd) {{
    case 'navigate':
      await page.goto(req.url, {{ waitUntil: 'domcontentloaded', timeout: req.timeout_ms }});
      await settle(page);
      return null;
    case 'wait_visible':
      await field.waitFor({{ state: 'visible', timeout: req.timeout_ms }});
      return null;
    case 'focus':
      await field.click({{ timeout: req.timeout_ms }});
      return null;
    case 'clear':
      await field.fill('', {{ timeout: req.timeout_ms }});
      return null;
    case 'set_value':
      await field.fill(req.text, {{ timeout: req.timeout_ms }});
      return null;
    case 'type_char':
      await field.pressSequentially(req.text, {{ delay: req.delay_ms, timeout: req.timeout_ms }});
      return null;
    case 'press':
      await field.press(req.key, {{ timeout: req.timeout_ms }});
      return null;
    case 'value':
      return await field.inputValue();
    case 'dispatch_input':
      await field.evaluate((el) => el.dispatchEvent(new Event('input', {{ bubbles: true }})));
      return null;
    case 'close':
      return null;
    default:
      throw new Error('unknown command ' + req.cmd);
  }}
}}

(async () => {{
  let browser;
  try {{
    browser = await pw.{browser}.launch({{ headless: {headless} }});
    const context = await browser.newContext({{
      viewport: {{ width: {width}, height: {height} }}
    }});
    const page = await context.newPage();
    reply({{ id: 0, ok: true, value: 'ready' }});

    const rl = readline.createInterface({{ input: process.stdin }});
    for await (const line of rl) {{
      let req;
      try {{
        req = JSON.parse(line);
      }} catch (e) {{
        continue;
      }}
      try {{
        const value = await handle(page, req);
        reply({{ id: req.id, ok: true, value }});
      }} catch (error) {{
        reply({{ id: req.id, ok: false, error: error.message }});
      }}
      if (req.cmd === 'close') break;
    }}
  }} catch (error) {{
    reply({{ id: 0, ok: false, error: error.message }});
  }} finally {{
    if (browser) await browser.close();
    process.exit(0);
  }}
}})();
"#,
        browser = config.browser.as_str(),
        headless = config.headless,
        width = config.viewport_width,
        height = config.viewport_height,
    )
}
