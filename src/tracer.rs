use anyhow::Context;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Append-only file tracer for adapter diagnostics and DAP traffic.
///
/// Tracing never goes to stdout: in stdio mode stdout carries the DAP
/// framing itself.
#[derive(Clone)]
pub struct FileTracer {
    file: Arc<Mutex<std::fs::File>>,
}

impl FileTracer {
    pub fn new(path: &std::path::Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open trace file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn line(&self, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{text}");
        }
    }

    /// Trace a message received from the client.
    pub fn inbound(&self, message: &str) {
        self.line(&format!("<- {message}"));
    }

    /// Trace a message sent to the client.
    pub fn outbound(&self, message: &str) {
        self.line(&format!("-> {message}"));
    }
}
