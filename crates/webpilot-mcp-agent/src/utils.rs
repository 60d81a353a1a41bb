use anyhow::Result;
use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use webpilot::BrowserSession;

#[derive(Clone)]
pub struct BrowserWrapper {
    pub session: Arc<BrowserSession>,
    pub tool_router: rmcp::handler::server::tool::ToolRouter<Self>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NavigateArgs {
    #[schemars(description = "The URL to navigate to")]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ScreenshotArgs {
    #[schemars(description = "Name to store the screenshot under")]
    pub name: String,
    #[schemars(
        description = "Optional CSS selector; captures only the first matching element instead of the full page"
    )]
    pub selector: Option<String>,
    #[schemars(description = "Viewport width in pixels (default: 1280)")]
    pub width: Option<u32>,
    #[schemars(description = "Viewport height in pixels (default: 720)")]
    pub height: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ClickArgs {
    #[schemars(description = "CSS selector of the element to click")]
    pub selector: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FillArgs {
    #[schemars(description = "CSS selector of the input element")]
    pub selector: String,
    #[schemars(description = "The value to fill in")]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SelectArgs {
    #[schemars(description = "CSS selector of the select element")]
    pub selector: String,
    #[schemars(description = "The option value to select")]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HoverArgs {
    #[schemars(description = "CSS selector of the element to hover over")]
    pub selector: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EvaluateArgs {
    #[schemars(description = "JavaScript code to execute in the page context")]
    pub script: String,
}

pub fn init_logging() -> Result<()> {
    use tracing_appender::rolling;

    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    // Determine log directory - check for override first
    let log_dir = if let Ok(custom_dir) = env::var("WEBPILOT_LOG_DIR") {
        std::path::PathBuf::from(custom_dir)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("webpilot")
            .join("logs")
    };

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        warn!("Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "webpilot-mcp-agent.log");

    // Stderr + daily rolling file. Stdout stays untouched: it belongs to the
    // stdio transport.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env().add_directive(log_level.into())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env().add_directive(log_level.into())),
        )
        .init();

    Ok(())
}
