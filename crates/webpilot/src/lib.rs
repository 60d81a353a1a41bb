//! Browser automation over the Chrome DevTools Protocol
//!
//! This crate drives a single headful Chromium instance, inspired by
//! Puppeteer's page-automation model. It also knows how to recover a usable
//! graphical display environment when the invoking process has none (e.g.
//! when started from a background service manager on Linux).

pub mod action;
pub mod display;
pub mod errors;
pub mod logs;
pub mod screenshots;
pub mod session;

pub use action::BrowserAction;
pub use display::{resolve_display_env, DisplayEnv, ProcessEntry};
pub use errors::BrowserError;
pub use logs::ConsoleBuffer;
pub use screenshots::ScreenshotStore;
pub use session::{ActionOutcome, BrowserSession};
