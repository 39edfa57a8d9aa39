//! The text document a session "executes", plus the line numbering
//! convention at the client boundary.

use std::fs;

use crate::error::Error;

/// Normalize a client path for use as a registry key.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Client/internal line numbering conversion.
///
/// Internal lines are always zero-based; the client convention comes from
/// the initialize request (one-based unless stated otherwise). Conversion is
/// applied exactly once at each boundary crossing.
#[derive(Debug, Clone, Copy)]
pub struct LineConvention {
    client_starts_at_one: bool,
}

impl Default for LineConvention {
    fn default() -> Self {
        LineConvention {
            client_starts_at_one: true,
        }
    }
}

impl LineConvention {
    pub fn new(client_starts_at_one: bool) -> LineConvention {
        LineConvention {
            client_starts_at_one,
        }
    }

    pub fn client_to_internal(&self, line: i64) -> i64 {
        if self.client_starts_at_one {
            line - 1
        } else {
            line
        }
    }

    pub fn internal_to_client(&self, line: i64) -> i64 {
        if self.client_starts_at_one {
            line + 1
        } else {
            line
        }
    }
}

/// An immutable line-addressed text source, loaded once per registration and
/// held in memory for the session lifetime.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    path: String,
    lines: Vec<String>,
}

impl SourceDocument {
    pub fn load(path: &str) -> Result<SourceDocument, Error> {
        let path = normalize_path(path);
        let text = fs::read_to_string(&path).map_err(|source| Error::SourceLoad {
            path: path.clone(),
            source,
        })?;
        Ok(SourceDocument {
            lines: text.split('\n').map(str::to_string).collect(),
            path,
        })
    }

    #[cfg(test)]
    pub fn from_lines(path: &str, lines: &[&str]) -> SourceDocument {
        SourceDocument {
            path: normalize_path(path),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name without directories, for client-facing source descriptors.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}
