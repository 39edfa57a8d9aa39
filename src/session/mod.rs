//! The debug session: one client conversation from initialize to disconnect.
//!
//! The controller is strictly synchronous and request-driven, each handler
//! runs to completion before the next request is dispatched. All mutable
//! session state lives in [`SessionState`] and is touched only by handlers.

pub mod breakpoint;
pub mod document;
pub mod execution;
pub mod frames;
pub mod handles;
pub mod heartbeat;

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use itertools::Itertools;

use crate::error::Error;
use crate::protocol::{
    Breakpoint, Capabilities, Command, ContinueResponseBody, EvaluateResponseBody, Event,
    OutputCategory, Request, Response, ResponseBody, ScopesResponseBody,
    SetBreakpointsResponseBody, StoppedReason, Thread, ThreadsResponseBody,
    VariablesResponseBody, WORKER_THREAD_ID,
};
use crate::server::{Server, ServerOutput};
use crate::tracer::FileTracer;

use breakpoint::{BreakpointRegistry, LineBreakpoint};
use document::{normalize_path, LineConvention, SourceDocument};
use execution::{Execution, ExecutionHook, RunOutcome};
use handles::Handles;
use heartbeat::Heartbeat;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

/// All mutable session state: the execution cursor, the breakpoint table and
/// the variable handle table, owned exclusively by the controller.
#[derive(Default)]
pub struct SessionState {
    pub execution: Execution,
    pub breakpoints: BreakpointRegistry,
    pub handles: Handles<String>,
    pub convention: LineConvention,
}

pub struct DebugSession<R: BufRead, W: Write + Send + 'static> {
    server: Server<R, W>,
    state: SessionState,
    is_config_done: bool,
    buffered_launch_request: Option<Request>,
    heartbeat: Option<Heartbeat>,
}

/// The mandatory cursor observer: every cursor write echoes the new line to
/// the client, before any stopped/terminated event for the transition.
struct EchoHook<'a, W: Write> {
    output: &'a Arc<Mutex<ServerOutput<W>>>,
}

impl<W: Write> ExecutionHook for EchoHook<'_, W> {
    fn on_cursor_move(&mut self, line: usize) {
        let mut output = self.output.lock().unwrap();
        let echo = Event::output(OutputCategory::Stdout, format!("line: {line}\n"));
        if let Err(e) = output.send_event(echo) {
            log::warn!(target: "dap", "line echo failed: {e}");
        }
    }
}

impl<R: BufRead, W: Write + Send + 'static> DebugSession<R, W> {
    pub fn new(input: R, output: W, tracer: Option<FileTracer>) -> DebugSession<R, W> {
        DebugSession {
            server: Server::new(input, output, tracer),
            state: SessionState::default(),
            is_config_done: false,
            buffered_launch_request: None,
            heartbeat: None,
        }
    }

    /// Shared write half, usable by background emitters.
    pub fn output(&self) -> Arc<Mutex<ServerOutput<W>>> {
        self.server.output.clone()
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        loop {
            let req = match self.server.poll_request() {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(Error::ConnectionClosed) => {
                    log::info!(target: "dap", "client disconnected");
                    break;
                }
                Err(e) => {
                    log::error!("{e}");
                    continue;
                }
            };

            // Clients send breakpoint configuration concurrently with the
            // launch request. To make sure breakpoints are installed *before*
            // execution starts, defer a launch that arrives early until the
            // client signals ConfigurationDone.
            if !self.is_config_done && req.command == "launch" {
                self.buffered_launch_request = Some(req);
                continue;
            }

            log::debug!("{}: {}", req.seq, req.command);

            match self.handle_request(req) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    log::error!("{e}")
                }
            }

            if self.is_config_done {
                if let Some(req) = self.buffered_launch_request.take() {
                    log::debug!("{}: {} (deferred)", req.seq, req.command);

                    match self.handle_request(req) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            log::error!("{e}")
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_request(&mut self, req: Request) -> anyhow::Result<bool> {
        let command = match req.command() {
            Ok(command) => command,
            Err(e) => {
                log::warn!("{e}");
                self.respond(req.error(e.to_string()))?;
                return Ok(true);
            }
        };

        match command {
            Command::Initialize(args) => {
                if let Some(client) = &args.client_id {
                    log::info!(target: "dap", "initialize from client `{client}`");
                }
                self.state.convention = LineConvention::new(args.lines_start_at1.unwrap_or(true));

                // Configuration requests may arrive before the initialize
                // acknowledgment, announce readiness first.
                self.send_event(Event::Initialized)?;

                self.respond(req.success(ResponseBody::Initialize(Capabilities {
                    supports_configuration_done_request: Some(true),
                    supports_evaluate_for_hovers: Some(true),
                    supports_step_back: Some(true),
                })))?;
            }
            Command::SetBreakpoints(args) => {
                let Some(path) = args.source.path.as_deref() else {
                    self.respond(req.error("source path required"))?;
                    return Ok(true);
                };
                let path = normalize_path(path);

                let document = match SourceDocument::load(&path) {
                    Ok(document) => document,
                    Err(e) => {
                        log::error!("{e}");
                        self.respond(req.error(e.to_string()))?;
                        return Ok(true);
                    }
                };

                let requested = args
                    .requested_lines()
                    .into_iter()
                    .map(|line| self.state.convention.client_to_internal(line))
                    .collect_vec();
                let placed = self.state.breakpoints.replace(&document, &requested);
                let breakpoints = placed
                    .iter()
                    .map(|bp| self.client_breakpoint(bp))
                    .collect_vec();

                // a re-registration for the active path refreshes its text
                self.state.execution.adopt_document(document);

                self.respond(req.success(ResponseBody::SetBreakpoints(
                    SetBreakpointsResponseBody { breakpoints },
                )))?;
            }
            Command::ConfigurationDone => {
                self.is_config_done = true;
                self.respond(req.ack())?;
            }
            Command::Launch(args) => {
                if let Err(e) = self.state.execution.activate(&args.program) {
                    log::error!("{e}");
                    self.respond(req.error(e.to_string()))?;
                    return Ok(true);
                }

                // housekeeping ticker lives until disconnect
                if self.heartbeat.is_none() {
                    self.heartbeat = Some(Heartbeat::start(
                        self.server.output.clone(),
                        HEARTBEAT_PERIOD,
                    ));
                }

                let stop_on_entry = args.stop_on_entry.unwrap_or(false);
                let outcome = {
                    let mut hook = EchoHook {
                        output: &self.server.output,
                    };
                    self.state.execution.launch(
                        stop_on_entry,
                        &mut self.state.breakpoints,
                        &mut hook,
                    )
                };

                self.respond(req.ack())?;
                self.dispatch_outcome(outcome)?;
            }
            Command::Threads => {
                self.respond(req.success(ResponseBody::Threads(ThreadsResponseBody {
                    threads: vec![Thread {
                        id: WORKER_THREAD_ID,
                        name: "thread 1".to_string(),
                    }],
                })))?;
            }
            Command::StackTrace(args) => {
                let body = frames::stack_trace(
                    &self.state.execution,
                    self.state.convention,
                    args.start_frame,
                    args.levels,
                );
                self.respond(req.success(ResponseBody::StackTrace(body)))?;
            }
            Command::Scopes(args) => {
                let scopes = frames::scopes(&mut self.state.handles, args.frame_id);
                self.respond(req.success(ResponseBody::Scopes(ScopesResponseBody { scopes })))?;
            }
            Command::Variables(args) => {
                let variables =
                    frames::variables(&mut self.state.handles, args.variables_reference);
                self.respond(req.success(ResponseBody::Variables(VariablesResponseBody {
                    variables,
                })))?;
            }
            Command::Continue(_args) => {
                let outcome = {
                    let mut hook = EchoHook {
                        output: &self.server.output,
                    };
                    self.state
                        .execution
                        .continue_run(&mut self.state.breakpoints, &mut hook)
                };

                self.respond(req.success(ResponseBody::Continue(ContinueResponseBody {
                    all_threads_continued: Some(true),
                })))?;
                self.dispatch_outcome(outcome)?;
            }
            Command::Next(_args) => {
                let outcome = {
                    let mut hook = EchoHook {
                        output: &self.server.output,
                    };
                    self.state.execution.step(&mut hook)
                };

                self.respond(req.ack())?;
                self.dispatch_outcome(outcome)?;
            }
            Command::StepBack(_args) => {
                let outcome = {
                    let mut hook = EchoHook {
                        output: &self.server.output,
                    };
                    self.state.execution.step_back(&mut hook)
                };

                self.respond(req.ack())?;
                self.dispatch_outcome(outcome)?;
            }
            Command::Evaluate(args) => {
                let context = args.context.as_deref().unwrap_or("repl");
                self.respond(req.success(ResponseBody::Evaluate(EvaluateResponseBody {
                    result: format!("evaluate(context: '{}', '{}')", context, args.expression),
                    variables_reference: 0,
                })))?;
            }
            Command::Disconnect => {
                // cancel housekeeping before acknowledging: nothing may be
                // emitted after session teardown
                self.heartbeat = None;
                self.respond(req.ack())?;
                return Ok(false);
            }
            Command::Unknown(command) => {
                log::warn!("unknown command: {command}");
                self.respond(req.cancellation())?;
            }
        }

        Ok(true)
    }

    /// Emit the events caused by an execution transition. The response for
    /// the triggering request must already be on the wire.
    fn dispatch_outcome(&mut self, outcome: RunOutcome) -> Result<(), Error> {
        match outcome {
            RunOutcome::Stopped {
                reason,
                verified_now,
            } => {
                log::debug!(target: "dap", "execution stopped: {reason}");
                self.send_event(Event::stopped(reason))?;

                if let Some(bp) = verified_now {
                    let breakpoint = self.client_breakpoint(&bp);
                    self.send_event(Event::breakpoint_update(breakpoint))?;
                }

                if reason == StoppedReason::Exception {
                    let line = self.state.execution.cursor();
                    self.send_event(Event::output(
                        OutputCategory::Stderr,
                        format!("exception in line: {line}\n"),
                    ))?;
                }
            }
            RunOutcome::Terminated => self.send_event(Event::Terminated)?,
            RunOutcome::Stay => {}
        }
        Ok(())
    }

    fn client_breakpoint(&self, bp: &LineBreakpoint) -> Breakpoint {
        Breakpoint {
            id: bp.id,
            verified: bp.verified,
            line: self.state.convention.internal_to_client(bp.line),
        }
    }

    fn respond(&mut self, response: Response) -> Result<(), Error> {
        self.server.output.lock().unwrap().respond(response)
    }

    fn send_event(&mut self, event: Event) -> Result<(), Error> {
        self.server.output.lock().unwrap().send_event(event)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::server::{frame, parse_frames};
    use serde_json::{json, Value};
    use std::io::Cursor;

    fn write_source(name: &str, content: &str) -> String {
        let path = std::env::temp_dir().join(format!("linedap-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn request(seq: i64, command: &str, arguments: Value) -> Value {
        json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        })
    }

    /// Feed framed requests through an in-memory session, collect everything
    /// it wrote back.
    fn run_session(requests: &[Value]) -> Vec<Value> {
        let mut inbound = vec![];
        for req in requests {
            inbound.extend(frame(req));
        }

        let session = DebugSession::new(Cursor::new(inbound), Vec::<u8>::new(), None);
        let output = session.output();
        session.run().unwrap();

        let bytes = output.lock().unwrap().get_ref().clone();
        parse_frames(&bytes)
    }

    #[test]
    fn test_initialized_event_precedes_initialize_response() {
        let messages = run_session(&[request(1, "initialize", json!({"clientID": "test"}))]);

        assert_eq!(messages[0]["type"], "event");
        assert_eq!(messages[0]["event"], "initialized");
        assert_eq!(messages[1]["type"], "response");
        assert_eq!(messages[1]["command"], "initialize");
        assert_eq!(messages[1]["success"], true);

        let caps = &messages[1]["body"];
        assert_eq!(caps["supportsConfigurationDoneRequest"], true);
        assert_eq!(caps["supportsEvaluateForHovers"], true);
        assert_eq!(caps["supportsStepBack"], true);
    }

    #[test]
    fn test_breakpoint_run_scenario() {
        let path = write_source("scenario.txt", "a b c\n\nexception here\n+skip\nd");

        let messages = run_session(&[
            request(1, "initialize", json!({})),
            // launch before configurationDone: must be deferred until after it
            request(2, "launch", json!({"program": path, "stopOnEntry": false})),
            request(
                3,
                "setBreakpoints",
                json!({"source": {"path": path}, "lines": [3]}),
            ),
            request(4, "configurationDone", json!({})),
            request(5, "stackTrace", json!({"threadId": 1})),
            request(6, "continue", json!({"threadId": 1})),
            request(7, "disconnect", json!({})),
        ]);

        // setBreakpoints answered before the deferred launch ran
        let set_bps = find_response(&messages, "setBreakpoints");
        let bp = &set_bps["body"]["breakpoints"][0];
        assert_eq!(bp["verified"], true);
        assert_eq!(bp["line"], 3);
        assert_eq!(bp["id"], 1000);

        // deferred launch: echo for the entry reset, echo for the stop, then
        // the response, then the stopped event (breakpoint wins over the
        // exception marker on the same line)
        let launch_at = position(&messages, |m| m["command"] == "launch");
        let echoes = outputs_before(&messages, launch_at);
        assert_eq!(echoes, vec!["line: 0\n", "line: 2\n"]);

        let stopped = &messages[launch_at + 1];
        assert_eq!(stopped["event"], "stopped");
        assert_eq!(stopped["body"]["reason"], "breakpoint");
        assert_eq!(stopped["body"]["threadId"], 1);

        // stack trace of "exception here", client line 3
        let stack = find_response(&messages, "stackTrace");
        assert_eq!(stack["body"]["totalFrames"], 2);
        assert_eq!(stack["body"]["stackFrames"][0]["name"], "exception(0)");
        assert_eq!(stack["body"]["stackFrames"][1]["name"], "here(1)");
        assert_eq!(stack["body"]["stackFrames"][0]["line"], 3);

        // continue past the breakpoint: nothing left, so the session
        // terminates right after the response
        let continue_at = position(&messages, |m| m["command"] == "continue");
        assert_eq!(messages[continue_at]["body"]["allThreadsContinued"], true);
        assert_eq!(messages[continue_at + 1]["event"], "terminated");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_shift_and_lazy_verification() {
        let path = write_source("lazy.txt", "alpha\n+skip\nd\nsome lazy line\nend");

        let messages = run_session(&[
            request(1, "initialize", json!({})),
            request(
                2,
                "setBreakpoints",
                json!({"source": {"path": path}, "breakpoints": [{"line": 2}, {"line": 4}]}),
            ),
            request(3, "configurationDone", json!({})),
            request(4, "launch", json!({"program": path, "stopOnEntry": true})),
            request(5, "continue", json!({"threadId": 1})),
            request(6, "continue", json!({"threadId": 1})),
            request(7, "disconnect", json!({})),
        ]);

        let set_bps = find_response(&messages, "setBreakpoints");
        let bps = set_bps["body"]["breakpoints"].as_array().unwrap();
        // "+skip" slides down to "d" (client line 3) and verifies
        assert_eq!(bps[0]["line"], 3);
        assert_eq!(bps[0]["verified"], true);
        // the lazy line stays put but is not verified yet
        assert_eq!(bps[1]["line"], 4);
        assert_eq!(bps[1]["verified"], false);

        // first continue stops on the slid breakpoint, no update event
        let first = position(&messages, |m| m["command"] == "continue");
        assert_eq!(messages[first + 1]["event"], "stopped");
        assert_eq!(messages[first + 1]["body"]["reason"], "breakpoint");

        // second continue hits the lazy breakpoint: stopped event first, then
        // the verification update
        let second = position_from(&messages, first + 1, |m| m["command"] == "continue");
        assert_eq!(messages[second + 1]["event"], "stopped");
        let update = &messages[second + 2];
        assert_eq!(update["event"], "breakpoint");
        assert_eq!(update["body"]["reason"], "update");
        assert_eq!(update["body"]["breakpoint"]["verified"], true);
        assert_eq!(update["body"]["breakpoint"]["line"], 4);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_exception_stop_emits_stderr_diagnostic() {
        let path = write_source("exc.txt", "start\nexception here\nend");

        let messages = run_session(&[
            request(1, "initialize", json!({})),
            request(2, "configurationDone", json!({})),
            request(3, "launch", json!({"program": path, "stopOnEntry": false})),
            request(4, "disconnect", json!({})),
        ]);

        let launch_at = position(&messages, |m| m["command"] == "launch");
        let stopped = &messages[launch_at + 1];
        assert_eq!(stopped["event"], "stopped");
        assert_eq!(stopped["body"]["reason"], "exception");

        let diag = &messages[launch_at + 2];
        assert_eq!(diag["event"], "output");
        assert_eq!(diag["body"]["category"], "stderr");
        assert_eq!(diag["body"]["output"], "exception in line: 1\n");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_step_back_at_entry_is_silent() {
        let path = write_source("stepback.txt", "one\ntwo");

        let messages = run_session(&[
            request(1, "initialize", json!({})),
            request(2, "configurationDone", json!({})),
            request(3, "launch", json!({"program": path, "stopOnEntry": true})),
            request(4, "stepBack", json!({"threadId": 1})),
            request(5, "next", json!({"threadId": 1})),
            request(6, "disconnect", json!({})),
        ]);

        let back_at = position(&messages, |m| m["command"] == "stepBack");
        assert_eq!(messages[back_at]["success"], true);
        // no echo, no stopped event between the stepBack response and the
        // next request's first message
        let next_echo = &messages[back_at + 1];
        assert_eq!(next_echo["event"], "output");
        assert_eq!(next_echo["body"]["output"], "line: 1\n");

        let next_at = position(&messages, |m| m["command"] == "next");
        assert_eq!(messages[next_at + 1]["event"], "stopped");
        assert_eq!(messages[next_at + 1]["body"]["reason"], "step");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_threads_scopes_variables_and_evaluate() {
        let messages = run_session(&[
            request(1, "initialize", json!({})),
            request(2, "threads", json!({})),
            request(3, "scopes", json!({"frameId": 0})),
            request(4, "variables", json!({"variablesReference": 1000})),
            request(5, "variables", json!({"variablesReference": 999})),
            request(
                6,
                "evaluate",
                json!({"expression": "x + 1", "context": "hover"}),
            ),
            request(7, "disconnect", json!({})),
        ]);

        let threads = find_response(&messages, "threads");
        assert_eq!(threads["body"]["threads"][0]["id"], 1);
        assert_eq!(threads["body"]["threads"][0]["name"], "thread 1");

        let scopes = find_response(&messages, "scopes");
        let scope_list = scopes["body"]["scopes"].as_array().unwrap();
        assert_eq!(scope_list.len(), 3);
        assert_eq!(scope_list[0]["name"], "Local");
        assert_eq!(scope_list[0]["variablesReference"], 1000);
        assert_eq!(scope_list[2]["name"], "Global");
        assert_eq!(scope_list[2]["expensive"], true);

        let variables = find_response(&messages, "variables");
        let vars = variables["body"]["variables"].as_array().unwrap();
        assert_eq!(vars.len(), 4);
        assert_eq!(vars[0]["name"], "local_0_i");
        assert_eq!(vars[3]["type"], "object");

        // unknown reference degrades to an empty list
        let unknown = response_at(&messages, "variables", 1);
        assert_eq!(unknown["body"]["variables"].as_array().unwrap().len(), 0);

        let evaluate = find_response(&messages, "evaluate");
        assert_eq!(
            evaluate["body"]["result"],
            "evaluate(context: 'hover', 'x + 1')"
        );
        assert_eq!(evaluate["body"]["variablesReference"], 0);
    }

    #[test]
    fn test_unknown_command_is_cancelled() {
        let messages = run_session(&[
            request(1, "initialize", json!({})),
            request(2, "restartFrame", json!({})),
            request(3, "disconnect", json!({})),
        ]);

        let cancelled = find_response(&messages, "restartFrame");
        assert_eq!(cancelled["success"], false);
        assert_eq!(cancelled["message"], "cancelled");
    }

    #[test]
    fn test_launch_of_missing_program_fails() {
        let messages = run_session(&[
            request(1, "initialize", json!({})),
            request(2, "configurationDone", json!({})),
            request(3, "launch", json!({"program": "/definitely/not/here.txt"})),
            request(4, "disconnect", json!({})),
        ]);

        let launch = find_response(&messages, "launch");
        assert_eq!(launch["success"], false);
        assert!(launch["message"]
            .as_str()
            .unwrap()
            .contains("cannot read source"));
    }

    fn position(messages: &[Value], pred: impl Fn(&Value) -> bool) -> usize {
        position_from(messages, 0, pred)
    }

    fn position_from(messages: &[Value], from: usize, pred: impl Fn(&Value) -> bool) -> usize {
        messages[from..]
            .iter()
            .position(|m| m["type"] == "response" && pred(m))
            .map(|idx| idx + from)
            .expect("response not found")
    }

    fn find_response<'a>(messages: &'a [Value], command: &str) -> &'a Value {
        response_at(messages, command, 0)
    }

    fn response_at<'a>(messages: &'a [Value], command: &str, nth: usize) -> &'a Value {
        messages
            .iter()
            .filter(|m| m["type"] == "response" && m["command"] == command)
            .nth(nth)
            .expect("response not found")
    }

    /// Output-event texts emitted between the previous response and
    /// `before` (exclusive).
    fn outputs_before(messages: &[Value], before: usize) -> Vec<String> {
        let prev_response = messages[..before]
            .iter()
            .rposition(|m| m["type"] == "response")
            .map(|idx| idx + 1)
            .unwrap_or(0);
        messages[prev_response..before]
            .iter()
            .filter(|m| m["event"] == "output")
            .map(|m| m["body"]["output"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}
