//! Breakpoint registration: verification and repositioning.

use std::collections::HashMap;

use crate::session::document::SourceDocument;

/// Breakpoint ids start here and are never reused within a session.
const BREAKPOINT_ID_SEED: i64 = 1000;

/// A registered breakpoint. `line` is the internal zero-based index and may
/// point outside the document after repositioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBreakpoint {
    pub id: i64,
    pub verified: bool,
    pub line: i64,
}

/// Per-path breakpoint sequences, in request order.
#[derive(Debug)]
pub struct BreakpointRegistry {
    table: HashMap<String, Vec<LineBreakpoint>>,
    next_id: i64,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        BreakpointRegistry {
            table: HashMap::new(),
            next_id: BREAKPOINT_ID_SEED,
        }
    }
}

impl BreakpointRegistry {
    /// Register breakpoints for a document, replacing any previous sequence
    /// stored for the same path. `requested` holds internal zero-based lines.
    pub fn replace(&mut self, document: &SourceDocument, requested: &[i64]) -> Vec<LineBreakpoint> {
        let placed: Vec<_> = requested
            .iter()
            .map(|&line| self.place(document, line))
            .collect();
        self.table
            .insert(document.path().to_string(), placed.clone());
        placed
    }

    fn place(&mut self, document: &SourceDocument, requested: i64) -> LineBreakpoint {
        let mut line = requested;
        let mut verified = false;

        if (0..document.line_count() as i64).contains(&line) {
            let text = document.line(line as usize).unwrap_or("").trim();
            // empty lines and `+` lines push the breakpoint down one line,
            // `-` lines pull it up one; both checks inspect the original text
            if text.is_empty() || text.starts_with('+') {
                line += 1;
            }
            if text.starts_with('-') {
                line -= 1;
            }
            // `lazy` lines verify only once actually hit during execution
            verified = !text.contains("lazy");
        }

        LineBreakpoint {
            id: self.alloc_id(),
            verified,
            line,
        }
    }

    /// First breakpoint registered for `path` at `line`, in request order.
    pub fn find(&mut self, path: &str, line: i64) -> Option<&mut LineBreakpoint> {
        self.table
            .get_mut(path)?
            .iter_mut()
            .find(|bp| bp.line == line)
    }

    fn alloc_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
