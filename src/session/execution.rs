//! Execution control: the cursor state machine over the active document.

use crate::error::Error;
use crate::protocol::StoppedReason;
use crate::session::breakpoint::{BreakpointRegistry, LineBreakpoint};
use crate::session::document::{normalize_path, SourceDocument};

/// Observer for cursor mutations.
///
/// Moving the cursor is a first-class operation with a mandatory observer:
/// every write is reported here before any stop/terminate outcome is acted
/// upon.
pub trait ExecutionHook {
    fn on_cursor_move(&mut self, line: usize);
}

/// Session run status. `Running` only exists while a scan is in progress;
/// `Terminated` is absorbing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    #[default]
    Stopped,
    Running,
    Terminated,
}

/// Result of one execution transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Execution stopped at the new cursor; `verified_now` carries a
    /// breakpoint that this stop lazily verified.
    Stopped {
        reason: StoppedReason,
        verified_now: Option<LineBreakpoint>,
    },
    Terminated,
    /// No state change and nothing to report (stepping back past the start).
    Stay,
}

#[derive(Debug, Default)]
pub struct Execution {
    document: Option<SourceDocument>,
    cursor: usize,
    status: RunStatus,
}

impl Execution {
    pub fn document(&self) -> Option<&SourceDocument> {
        self.document.as_ref()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Install `document` if it is the first one seen or a refresh of the
    /// currently active path. Registrations for other paths keep their
    /// breakpoints but do not steal the active document.
    pub fn adopt_document(&mut self, document: SourceDocument) {
        let replaces_active = match &self.document {
            Some(active) => active.path() == document.path(),
            None => true,
        };
        if replaces_active {
            self.document = Some(document);
        }
    }

    /// Make `path` the active document, loading it on first use.
    pub fn activate(&mut self, path: &str) -> Result<(), Error> {
        let path = normalize_path(path);
        let already_active = self
            .document
            .as_ref()
            .is_some_and(|doc| doc.path() == path);
        if !already_active {
            self.document = Some(SourceDocument::load(&path)?);
        }
        Ok(())
    }

    fn set_cursor(&mut self, line: usize, hook: &mut dyn ExecutionHook) {
        self.cursor = line;
        hook.on_cursor_move(line);
    }

    /// Begin execution from the top of the active document.
    pub fn launch(
        &mut self,
        stop_on_entry: bool,
        breakpoints: &mut BreakpointRegistry,
        hook: &mut dyn ExecutionHook,
    ) -> RunOutcome {
        self.status = RunStatus::Stopped;
        self.set_cursor(0, hook);

        if stop_on_entry {
            RunOutcome::Stopped {
                reason: StoppedReason::Entry,
                verified_now: None,
            }
        } else {
            self.continue_run(breakpoints, hook)
        }
    }

    /// Scan forward to the next breakpoint or `exception` line; terminate
    /// when the document is exhausted.
    pub fn continue_run(
        &mut self,
        breakpoints: &mut BreakpointRegistry,
        hook: &mut dyn ExecutionHook,
    ) -> RunOutcome {
        if self.status == RunStatus::Terminated {
            return RunOutcome::Terminated;
        }
        self.status = RunStatus::Running;

        let Some(document) = &self.document else {
            self.status = RunStatus::Terminated;
            return RunOutcome::Terminated;
        };
        let path = document.path().to_string();

        let mut hit = None;
        for ln in self.cursor + 1..document.line_count() {
            // a registered breakpoint wins over an `exception` marker on the
            // same line
            if breakpoints.find(&path, ln as i64).is_some() {
                hit = Some((ln, StoppedReason::Breakpoint));
                break;
            }
            if document
                .line(ln)
                .is_some_and(|text| text.contains("exception"))
            {
                hit = Some((ln, StoppedReason::Exception));
                break;
            }
        }

        match hit {
            Some((ln, reason)) => {
                self.set_cursor(ln, hook);
                self.status = RunStatus::Stopped;

                let verified_now = if reason == StoppedReason::Breakpoint {
                    breakpoints.find(&path, ln as i64).and_then(|bp| {
                        if bp.verified {
                            None
                        } else {
                            bp.verified = true;
                            Some(bp.clone())
                        }
                    })
                } else {
                    None
                };

                RunOutcome::Stopped {
                    reason,
                    verified_now,
                }
            }
            None => {
                self.status = RunStatus::Terminated;
                RunOutcome::Terminated
            }
        }
    }

    /// Advance to the next non-empty line; terminate when none remains.
    pub fn step(&mut self, hook: &mut dyn ExecutionHook) -> RunOutcome {
        if self.status == RunStatus::Terminated {
            return RunOutcome::Terminated;
        }
        self.status = RunStatus::Running;

        let Some(document) = &self.document else {
            self.status = RunStatus::Terminated;
            return RunOutcome::Terminated;
        };

        let next = (self.cursor + 1..document.line_count())
            .find(|&ln| document.line(ln).is_some_and(|text| !text.trim().is_empty()));

        match next {
            Some(ln) => {
                self.set_cursor(ln, hook);
                self.status = RunStatus::Stopped;
                RunOutcome::Stopped {
                    reason: StoppedReason::Step,
                    verified_now: None,
                }
            }
            None => {
                self.status = RunStatus::Terminated;
                RunOutcome::Terminated
            }
        }
    }

    /// Move back to the previous non-empty line. Stepping back past the
    /// start is a silent no-op, not a terminal condition.
    pub fn step_back(&mut self, hook: &mut dyn ExecutionHook) -> RunOutcome {
        if self.status == RunStatus::Terminated {
            return RunOutcome::Terminated;
        }

        let Some(document) = &self.document else {
            return RunOutcome::Stay;
        };

        let prev = (0..self.cursor)
            .rev()
            .find(|&ln| document.line(ln).is_some_and(|text| !text.trim().is_empty()));

        match prev {
            Some(ln) => {
                self.set_cursor(ln, hook);
                self.status = RunStatus::Stopped;
                RunOutcome::Stopped {
                    reason: StoppedReason::Step,
                    verified_now: None,
                }
            }
            None => RunOutcome::Stay,
        }
    }
}
