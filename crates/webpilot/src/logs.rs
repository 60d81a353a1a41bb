//! In-memory console-message accumulator.

use std::sync::{Arc, Mutex};

/// Thread-safe, append-only buffer of browser console messages, in arrival
/// order. Entries are never removed for the life of the process.
#[derive(Clone, Default)]
pub struct ConsoleBuffer {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one console message, prefixed with its severity kind.
    pub fn push(&self, kind: &str, text: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.push(format!("{kind}: {text}"));
    }

    /// All entries joined by newlines, ready to serve as a text resource.
    pub fn render(&self) -> String {
        self.entries.lock().unwrap().join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_accumulate_in_order() {
        let buffer = ConsoleBuffer::new();
        buffer.push("log", "first");
        buffer.push("error", "second");
        buffer.push("log", "third");

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.render(), "log: first\nerror: second\nlog: third");
    }

    #[test]
    fn empty_buffer_renders_empty_string() {
        let buffer = ConsoleBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.render(), "");
    }

    #[test]
    fn clones_share_the_same_backing_list() {
        let buffer = ConsoleBuffer::new();
        let clone = buffer.clone();
        clone.push("warning", "shared");
        assert_eq!(buffer.len(), 1);
    }
}
