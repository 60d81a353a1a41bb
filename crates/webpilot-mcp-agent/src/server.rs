pub use crate::utils::BrowserWrapper;
use crate::utils::{
    ClickArgs, EvaluateArgs, FillArgs, HoverArgs, NavigateArgs, ScreenshotArgs, SelectArgs,
};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    AnnotateAble, CallToolResult, Content, Implementation, ListResourcesResult,
    PaginatedRequestParam, ProtocolVersion, RawResource, ReadResourceRequestParam,
    ReadResourceResult, Resource, ResourceContents, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{tool, tool_handler, tool_router, Error as McpError, ServerHandler};
use serde_json::json;
use std::env;
use std::future::Future;
use std::sync::Arc;
use webpilot::{BrowserAction, BrowserSession};

/// URI of the console-log resource.
pub const CONSOLE_LOG_URI: &str = "console://logs";
/// URI prefix of stored screenshots; the remainder is the screenshot name.
pub const SCREENSHOT_URI_PREFIX: &str = "screenshot://";

#[tool_router]
impl BrowserWrapper {
    pub fn new() -> Self {
        Self {
            session: Arc::new(BrowserSession::new()),
            tool_router: Self::tool_router(),
        }
    }

    /// Run one action and shape the uniform success/failure result. Faults
    /// raised by the browser become failure-flagged results, never errors
    /// that would tear down the protocol connection.
    async fn run(&self, action: BrowserAction) -> Result<CallToolResult, McpError> {
        let name = action.name();
        match self.session.execute(action).await {
            Ok(outcome) => {
                let mut result_json = json!({
                    "action": name,
                    "status": "success",
                    "message": outcome.message,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                });
                if let Some(value) = outcome.value {
                    if let Some(obj) = result_json.as_object_mut() {
                        obj.insert("result".to_string(), value);
                    }
                }

                let mut contents = vec![Content::json(result_json)?];
                if let Some(image) = outcome.image_base64 {
                    contents.push(Content::image(image, "image/png".to_string()));
                }
                Ok(CallToolResult::success(contents))
            }
            Err(e) => {
                tracing::warn!(action = name, error = %e, "browser action failed");
                Ok(CallToolResult::error(vec![Content::json(json!({
                    "action": name,
                    "status": "error",
                    "message": e.to_string(),
                }))?]))
            }
        }
    }

    #[tool(description = "Navigate the browser to a URL and wait for the page to load.")]
    pub async fn navigate(
        &self,
        Parameters(args): Parameters<NavigateArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(BrowserAction::Navigate { url: args.url }).await
    }

    #[tool(
        description = "Take a PNG screenshot of the current page (or of a single element) and store it under a name. Stored screenshots are readable as screenshot://<name> resources."
    )]
    pub async fn screenshot(
        &self,
        Parameters(args): Parameters<ScreenshotArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(BrowserAction::Screenshot {
            name: args.name,
            selector: args.selector,
            width: args.width,
            height: args.height,
        })
        .await
    }

    #[tool(description = "Click the first element matching a CSS selector.")]
    pub async fn click(
        &self,
        Parameters(args): Parameters<ClickArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(BrowserAction::Click {
            selector: args.selector,
        })
        .await
    }

    #[tool(description = "Type a value into the input element matching a CSS selector.")]
    pub async fn fill(
        &self,
        Parameters(args): Parameters<FillArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(BrowserAction::Fill {
            selector: args.selector,
            value: args.value,
        })
        .await
    }

    #[tool(
        description = "Choose an option of the select element matching a CSS selector, by option value."
    )]
    pub async fn select(
        &self,
        Parameters(args): Parameters<SelectArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(BrowserAction::Select {
            selector: args.selector,
            value: args.value,
        })
        .await
    }

    #[tool(description = "Hover the mouse over the first element matching a CSS selector.")]
    pub async fn hover(
        &self,
        Parameters(args): Parameters<HoverArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(BrowserAction::Hover {
            selector: args.selector,
        })
        .await
    }

    #[tool(
        description = "Evaluate JavaScript in the page and return the JSON value of the completed expression. Console output is captured into the console://logs resource."
    )]
    pub async fn evaluate(
        &self,
        Parameters(args): Parameters<EvaluateArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(BrowserAction::Evaluate {
            script: args.script,
        })
        .await
    }
}

impl Default for BrowserWrapper {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for BrowserWrapper {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(get_server_instructions()),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let mut resources: Vec<Resource> = vec![{
            let mut raw = RawResource::new(CONSOLE_LOG_URI, "Browser console logs");
            raw.mime_type = Some("text/plain".to_string());
            raw.no_annotation()
        }];

        for name in self.session.screenshots().names() {
            let mut raw = RawResource::new(
                format!("{SCREENSHOT_URI_PREFIX}{name}"),
                format!("Screenshot: {name}"),
            );
            raw.mime_type = Some("image/png".to_string());
            resources.push(raw.no_annotation());
        }

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if uri == CONSOLE_LOG_URI {
            return Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(
                    self.session.console().render(),
                    uri,
                )],
            });
        }

        if let Some(name) = uri.strip_prefix(SCREENSHOT_URI_PREFIX) {
            if let Some(payload) = self.session.screenshots().get(name) {
                return Ok(ReadResourceResult {
                    contents: vec![ResourceContents::BlobResourceContents {
                        uri: uri.clone(),
                        mime_type: Some("image/png".to_string()),
                        blob: payload,
                        meta: None,
                    }],
                });
            }
        }

        Err(McpError::resource_not_found(
            "Resource not found",
            Some(json!({ "uri": uri })),
        ))
    }
}

fn get_server_instructions() -> String {
    let current_os = env::consts::OS;

    format!(
        "
You are driving a real, headful web browser. Each tool call acts on one shared page.

**Golden Rules**

1.  **NAVIGATE FIRST:** The page starts blank. Call `navigate` before any other action.
2.  **VERIFY AFTER ACTING:** After a `click`, `fill` or `select` that changes the page, take a `screenshot` or `evaluate` a check before assuming the action worked. Do not trust a 'success' status alone.
3.  **USE SPECIFIC SELECTORS:** Tools act on the *first* element matching the CSS selector. Prefer IDs and attribute selectors (`#login`, `input[name='email']`) over bare tag names.
4.  **CHECK THE CONSOLE:** Page errors surface in the `console://logs` resource. Read it when a page misbehaves.

**Tools**

*   `navigate` - load a URL.
*   `screenshot` - capture the page (or one element) as PNG; stored under a name and served as a `screenshot://<name>` resource.
*   `click` / `fill` / `select` / `hover` - interact with elements by CSS selector.
*   `evaluate` - run JavaScript in the page and get the resulting JSON value back.

Failures are reported as failure-flagged results carrying the underlying message; the browser keeps running and the next call may succeed.

Contextual information:
- Current operating system: {current_os}.
"
    )
}
