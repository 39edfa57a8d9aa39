//! DAP wire types: request/response/event envelopes and typed bodies.
//!
//! Only commands implemented by this adapter get typed arguments, any other
//! request is answered with a cancellation response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::Display;

use crate::error::Error;

/// The one and only thread simulated by the adapter.
pub const WORKER_THREAD_ID: i64 = 1;

/// DAP request envelope.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

impl Request {
    pub fn parse(message: Value) -> Result<Request, Error> {
        let req: Request = serde_json::from_value(message)?;
        if req.r#type != "request" {
            return Err(Error::UnsupportedMessage(req.r#type));
        }
        Ok(req)
    }

    /// Decode the typed command carried by this request.
    pub fn command(&self) -> Result<Command, Error> {
        let command = match self.command.as_str() {
            "initialize" => Command::Initialize(self.arguments()?),
            "launch" => Command::Launch(self.arguments()?),
            "setBreakpoints" => Command::SetBreakpoints(self.arguments()?),
            "configurationDone" => Command::ConfigurationDone,
            "threads" => Command::Threads,
            "stackTrace" => Command::StackTrace(self.arguments()?),
            "scopes" => Command::Scopes(self.arguments()?),
            "variables" => Command::Variables(self.arguments()?),
            "continue" => Command::Continue(self.arguments()?),
            "next" => Command::Next(self.arguments()?),
            "stepBack" => Command::StepBack(self.arguments()?),
            "evaluate" => Command::Evaluate(self.arguments()?),
            "disconnect" => Command::Disconnect,
            other => Command::Unknown(other.to_string()),
        };
        Ok(command)
    }

    fn arguments<T: DeserializeOwned>(&self) -> Result<T, Error> {
        // some clients omit `arguments` entirely
        let value = match &self.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|source| Error::Arguments {
            command: self.command.clone(),
            source,
        })
    }

    pub fn success(&self, body: ResponseBody) -> Response {
        Response {
            seq: 0,
            r#type: "response",
            request_seq: self.seq,
            success: true,
            command: self.command.clone(),
            message: None,
            body: Some(body),
        }
    }

    /// Success response with no body.
    pub fn ack(&self) -> Response {
        Response {
            seq: 0,
            r#type: "response",
            request_seq: self.seq,
            success: true,
            command: self.command.clone(),
            message: None,
            body: None,
        }
    }

    pub fn error(&self, message: impl Into<String>) -> Response {
        Response {
            seq: 0,
            r#type: "response",
            request_seq: self.seq,
            success: false,
            command: self.command.clone(),
            message: Some(message.into()),
            body: None,
        }
    }

    pub fn cancellation(&self) -> Response {
        self.error("cancelled")
    }
}

#[derive(Debug)]
pub enum Command {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    SetBreakpoints(SetBreakpointsArguments),
    ConfigurationDone,
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    Continue(ContinueArguments),
    Next(NextArguments),
    StepBack(StepBackArguments),
    Evaluate(EvaluateArguments),
    Disconnect,
    Unknown(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    #[serde(default, rename = "clientID")]
    pub client_id: Option<String>,
    /// Client line numbering convention, one-based unless stated otherwise.
    #[serde(default)]
    pub lines_start_at1: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    /// Path to the text file to "execute".
    pub program: String,
    #[serde(default)]
    pub stop_on_entry: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    #[serde(default)]
    pub lines: Option<Vec<i64>>,
}

impl SetBreakpointsArguments {
    /// Requested client lines; the modern `breakpoints` list wins over the
    /// legacy `lines` list when both are present.
    pub fn requested_lines(&self) -> Vec<i64> {
        match &self.breakpoints {
            Some(bps) => bps.iter().map(|bp| bp.line).collect(),
            None => self.lines.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: i64,
    #[serde(default)]
    pub start_frame: Option<i64>,
    #[serde(default)]
    pub levels: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueArguments {
    pub thread_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextArguments {
    pub thread_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepBackArguments {
    pub thread_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// DAP response envelope. `seq` is assigned by the output half on send.
#[derive(Debug, Serialize)]
pub struct Response {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Initialize(Capabilities),
    SetBreakpoints(SetBreakpointsResponseBody),
    Threads(ThreadsResponseBody),
    StackTrace(StackTraceResponseBody),
    Scopes(ScopesResponseBody),
    Variables(VariablesResponseBody),
    Continue(ContinueResponseBody),
    Evaluate(EvaluateResponseBody),
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_configuration_done_request: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_evaluate_for_hovers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_step_back: Option<bool>,
}

/// Client-visible breakpoint: the line is in the client convention.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub id: i64,
    pub verified: bool,
    pub line: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponseBody {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    pub source: Source,
    pub line: i64,
    pub column: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    pub stack_frames: Vec<StackFrame>,
    pub total_frames: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: &'static str,
    pub variables_reference: i64,
    pub expensive: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponseBody {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub value: String,
    pub variables_reference: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponseBody {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    pub result: String,
    pub variables_reference: i64,
}

/// Events produced by the session.
#[derive(Debug)]
pub enum Event {
    Initialized,
    Stopped(StoppedEventBody),
    Breakpoint(BreakpointEventBody),
    Output(OutputEventBody),
    Terminated,
    Heartbeat(HeartbeatEventBody),
}

impl Event {
    pub fn stopped(reason: StoppedReason) -> Event {
        Event::Stopped(StoppedEventBody {
            reason,
            thread_id: WORKER_THREAD_ID,
        })
    }

    pub fn output(category: OutputCategory, text: impl Into<String>) -> Event {
        Event::Output(OutputEventBody {
            category: Some(category),
            output: text.into(),
        })
    }

    pub fn breakpoint_update(breakpoint: Breakpoint) -> Event {
        Event::Breakpoint(BreakpointEventBody {
            reason: "update",
            breakpoint,
        })
    }

    pub fn into_message(self, seq: i64) -> EventMessage {
        let (event, body) = match self {
            Event::Initialized => ("initialized", None),
            Event::Stopped(body) => ("stopped", Some(EventBody::Stopped(body))),
            Event::Breakpoint(body) => ("breakpoint", Some(EventBody::Breakpoint(body))),
            Event::Output(body) => ("output", Some(EventBody::Output(body))),
            Event::Terminated => ("terminated", None),
            Event::Heartbeat(body) => ("heartbeat", Some(EventBody::Heartbeat(body))),
        };
        EventMessage {
            seq,
            r#type: "event",
            event,
            body,
        }
    }
}

/// DAP event envelope.
#[derive(Debug, Serialize)]
pub struct EventMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<EventBody>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EventBody {
    Stopped(StoppedEventBody),
    Breakpoint(BreakpointEventBody),
    Output(OutputEventBody),
    Heartbeat(HeartbeatEventBody),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoppedReason {
    Entry,
    Breakpoint,
    Exception,
    Step,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: StoppedReason,
    pub thread_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    pub reason: &'static str,
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<OutputCategory>,
    pub output: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEventBody {
    pub tick: u64,
}
