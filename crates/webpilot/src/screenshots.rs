//! In-memory store of named screenshot payloads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Thread-safe mapping from a caller-chosen screenshot name to a
/// base64-encoded PNG payload. Writing twice under the same name keeps only
/// the most recent payload; nothing is ever evicted.
#[derive(Clone, Default)]
pub struct ScreenshotStore {
    shots: Arc<Mutex<HashMap<String, String>>>,
}

impl ScreenshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload under `name`, replacing any previous one.
    pub fn insert(&self, name: impl Into<String>, payload_base64: impl Into<String>) {
        let mut shots = self.shots.lock().unwrap();
        shots.insert(name.into(), payload_base64.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.shots.lock().unwrap().get(name).cloned()
    }

    /// The current key set, sorted for stable resource listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shots.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.shots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.lock().unwrap().is_empty()
    }
}
