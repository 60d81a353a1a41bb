//! The owned browser session context.
//!
//! One `BrowserSession` is constructed at startup and shared with the tool
//! dispatcher. The underlying Chromium process is launched lazily on the
//! first primitive invocation, headful, against the display environment
//! recovered by [`crate::display`]. The session also owns the two
//! process-lifetime accumulators: the console-message buffer and the named
//! screenshot store.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::{ConsoleApiCalledType, EventConsoleApiCalled, RemoteObject};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::action::BrowserAction;
use crate::display;
use crate::errors::BrowserError;
use crate::logs::ConsoleBuffer;
use crate::screenshots::ScreenshotStore;

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// Uniform result of one executed action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// Human-readable summary of what happened.
    pub message: String,
    /// Base64-encoded PNG, present for screenshot actions.
    pub image_base64: Option<String>,
    /// JSON value of the completed expression, present for evaluate actions.
    pub value: Option<Value>,
}

impl ActionOutcome {
    fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            image_base64: None,
            value: None,
        }
    }
}

/// Live browser state, built on first use.
struct SessionState {
    page: Page,
    _browser: Browser,
    _handler_task: JoinHandle<()>,
    _console_task: JoinHandle<()>,
    _profile_dir: TempDir,
}

/// A single browser/page pair shared across all tool calls.
///
/// Primitives serialize on the internal state mutex, so overlapping calls
/// queue in arrival order. There is no explicit shutdown: the Chromium child
/// lives for the process lifetime and dies with it.
pub struct BrowserSession {
    state: Mutex<Option<SessionState>>,
    console: ConsoleBuffer,
    screenshots: ScreenshotStore,
}

impl Default for BrowserSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserSession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            console: ConsoleBuffer::new(),
            screenshots: ScreenshotStore::new(),
        }
    }

    pub fn console(&self) -> &ConsoleBuffer {
        &self.console
    }

    pub fn screenshots(&self) -> &ScreenshotStore {
        &self.screenshots
    }

    /// Execute one action against the shared page. Exactly one primitive
    /// invocation per action; faults are reported, never retried.
    pub async fn execute(&self, action: BrowserAction) -> Result<ActionOutcome, BrowserError> {
        debug!(action = action.name(), "executing browser action");
        match action {
            BrowserAction::Navigate { url } => self.navigate(&url).await,
            BrowserAction::Screenshot {
                name,
                selector,
                width,
                height,
            } => {
                self.screenshot(&name, selector.as_deref(), width, height)
                    .await
            }
            BrowserAction::Click { selector } => self.click(&selector).await,
            BrowserAction::Fill { selector, value } => self.fill(&selector, &value).await,
            BrowserAction::Select { selector, value } => self.select(&selector, &value).await,
            BrowserAction::Hover { selector } => self.hover(&selector).await,
            BrowserAction::Evaluate { script } => self.evaluate(&script).await,
        }
    }

    pub async fn navigate(&self, url: &str) -> Result<ActionOutcome, BrowserError> {
        let guard = self.ensure_launched().await?;
        let page = session_page(&guard)?;

        page.goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(format!("{url}: {e}")))?;
        // Best effort: some pages never fire a clean load event.
        let _ = page.wait_for_navigation().await;

        Ok(ActionOutcome::text(format!("Navigated to {url}")))
    }

    pub async fn click(&self, selector: &str) -> Result<ActionOutcome, BrowserError> {
        let guard = self.ensure_launched().await?;
        let page = session_page(&guard)?;

        let element = page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{selector}: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Cdp(format!("click on '{selector}' failed: {e}")))?;
        // Brief pause to let any triggered navigation or JS settle.
        tokio::time::sleep(Duration::from_millis(100)).await;

        Ok(ActionOutcome::text(format!("Clicked: {selector}")))
    }

    pub async fn fill(&self, selector: &str, value: &str) -> Result<ActionOutcome, BrowserError> {
        let guard = self.ensure_launched().await?;
        let page = session_page(&guard)?;

        let element = page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{selector}: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Cdp(format!("focusing '{selector}' failed: {e}")))?;
        element
            .type_str(value)
            .await
            .map_err(|e| BrowserError::Cdp(format!("typing into '{selector}' failed: {e}")))?;

        Ok(ActionOutcome::text(format!(
            "Filled {selector} with: {value}"
        )))
    }

    pub async fn select(&self, selector: &str, value: &str) -> Result<ActionOutcome, BrowserError> {
        let guard = self.ensure_launched().await?;
        let page = session_page(&guard)?;

        // Fail with a proper not-found error before touching the DOM.
        page.find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{selector}: {e}")))?;

        // CDP has no select primitive; set the value and fire the events a
        // real selection would.
        let script = build_select_script(selector, value);
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        let selected = result
            .value()
            .and_then(|v| v.get("found"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !selected {
            return Err(BrowserError::ElementNotFound(format!(
                "{selector}: no such select element in document"
            )));
        }

        Ok(ActionOutcome::text(format!(
            "Selected {selector} with: {value}"
        )))
    }

    pub async fn hover(&self, selector: &str) -> Result<ActionOutcome, BrowserError> {
        let guard = self.ensure_launched().await?;
        let page = session_page(&guard)?;

        let element = page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{selector}: {e}")))?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| BrowserError::Cdp(format!("scrolling '{selector}' into view failed: {e}")))?;
        let point = element
            .clickable_point()
            .await
            .map_err(|e| BrowserError::Cdp(format!("locating '{selector}' failed: {e}")))?;
        let move_params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(point.x)
            .y(point.y)
            .build()
            .map_err(BrowserError::InvalidArgument)?;
        page.execute(move_params)
            .await
            .map_err(|e| BrowserError::Cdp(format!("hover over '{selector}' failed: {e}")))?;

        Ok(ActionOutcome::text(format!("Hovered: {selector}")))
    }

    pub async fn evaluate(&self, script: &str) -> Result<ActionOutcome, BrowserError> {
        let guard = self.ensure_launched().await?;
        let page = session_page(&guard)?;

        let result = page
            .evaluate(script.to_string())
            .await
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        let value = result.value().cloned().unwrap_or(Value::Null);
        let rendered =
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());

        Ok(ActionOutcome {
            message: format!("Execution result:\n{rendered}"),
            image_base64: None,
            value: Some(value),
        })
    }

    pub async fn screenshot(
        &self,
        name: &str,
        selector: Option<&str>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<ActionOutcome, BrowserError> {
        let guard = self.ensure_launched().await?;
        let page = session_page(&guard)?;

        let width = width.unwrap_or(DEFAULT_VIEWPORT_WIDTH);
        let height = height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT);

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(width))
            .height(i64::from(height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(BrowserError::InvalidArgument)?;
        page.execute(metrics)
            .await
            .map_err(|e| BrowserError::ScreenshotFailed(format!("viewport override: {e}")))?;

        let png = match selector {
            Some(sel) => {
                let element = page
                    .find_element(sel)
                    .await
                    .map_err(|e| BrowserError::ElementNotFound(format!("{sel}: {e}")))?;
                element
                    .screenshot(CaptureScreenshotFormat::Png)
                    .await
                    .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))?
            }
            None => page
                .screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(false)
                        .build(),
                )
                .await
                .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))?,
        };

        let payload = general_purpose::STANDARD.encode(&png);
        self.screenshots.insert(name, payload.clone());
        info!(name, width, height, bytes = png.len(), "screenshot stored");

        Ok(ActionOutcome {
            message: format!("Screenshot '{name}' taken at {width}x{height}"),
            image_base64: Some(payload),
            value: None,
        })
    }

    /// Launch the browser if it is not running yet and return the state
    /// guard. Holding the guard serializes all page operations.
    async fn ensure_launched(
        &self,
    ) -> Result<MutexGuard<'_, Option<SessionState>>, BrowserError> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            return Ok(guard);
        }

        // Recover a display session before spawning the child; the launched
        // browser inherits whatever we apply here.
        let env = display::resolve_display_env();
        display::apply_to_session_env(&env);

        let profile_dir = TempDir::new()
            .map_err(|e| BrowserError::LaunchFailed(format!("profile dir: {e}")))?;

        let config = BrowserConfig::builder()
            .with_head()
            .no_sandbox()
            .window_size(DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT)
            .user_data_dir(profile_dir.path())
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        info!("launching headful browser");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // Drain CDP traffic for the life of the connection.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("browser handler loop ended");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("opening page: {e}")))?;

        let console_task = spawn_console_listener(&page, self.console.clone()).await?;

        info!("browser launched");
        *guard = Some(SessionState {
            page,
            _browser: browser,
            _handler_task: handler_task,
            _console_task: console_task,
            _profile_dir: profile_dir,
        });
        Ok(guard)
    }
}

fn session_page<'a>(
    guard: &'a MutexGuard<'_, Option<SessionState>>,
) -> Result<&'a Page, BrowserError> {
    guard
        .as_ref()
        .map(|state| &state.page)
        .ok_or_else(|| BrowserError::Internal("browser state missing after launch".to_string()))
}

/// Subscribe to the page's console API events and append every message to
/// the shared buffer for the life of the page.
async fn spawn_console_listener(
    page: &Page,
    console: ConsoleBuffer,
) -> Result<JoinHandle<()>, BrowserError> {
    let mut events = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(|e| BrowserError::LaunchFailed(format!("console listener: {e}")))?;

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let text = event
                .args
                .iter()
                .map(remote_object_text)
                .collect::<Vec<_>>()
                .join(" ");
            console.push(console_kind(&event.r#type), &text);
        }
        warn!("console event stream closed");
    }))
}

fn console_kind(kind: &ConsoleApiCalledType) -> &'static str {
    match kind {
        ConsoleApiCalledType::Log => "log",
        ConsoleApiCalledType::Debug => "debug",
        ConsoleApiCalledType::Info => "info",
        ConsoleApiCalledType::Error => "error",
        ConsoleApiCalledType::Warning => "warning",
        ConsoleApiCalledType::Trace => "trace",
        ConsoleApiCalledType::Assert => "assert",
        _ => "log",
    }
}

fn remote_object_text(obj: &RemoteObject) -> String {
    if let Some(value) = &obj.value {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    } else if let Some(description) = &obj.description {
        description.clone()
    } else {
        "undefined".to_string()
    }
}

/// Build the page script that performs a `<select>` value change with the
/// events a user-driven selection would fire. Selector and value are
/// JSON-quoted, so arbitrary strings are safe to embed.
fn build_select_script(selector: &str, value: &str) -> String {
    let selector = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    let value = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "(() => {{ \
            const el = document.querySelector({selector}); \
            if (!el) return {{ found: false }}; \
            el.value = {value}; \
            el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
            el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
            return {{ found: true, value: el.value }}; \
        }})()"
    )
}
