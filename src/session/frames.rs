//! Synthetic stack, scope and variable rendering.
//!
//! The mock runtime has no real call stack: every whitespace token of the
//! current line becomes one frame, scopes and variables have a fixed shape.

use itertools::Itertools;

use crate::protocol::{
    Scope, Source, StackFrame, StackTraceResponseBody, Variable,
};
use crate::session::document::LineConvention;
use crate::session::execution::Execution;
use crate::session::handles::Handles;

/// One frame per word of the current line, labeled `"<word>(<index>)"`.
/// `total_frames` always reports the full token count, whatever the
/// pagination window.
pub fn stack_trace(
    execution: &Execution,
    convention: LineConvention,
    start_frame: Option<i64>,
    levels: Option<i64>,
) -> StackTraceResponseBody {
    let Some(document) = execution.document() else {
        return StackTraceResponseBody {
            stack_frames: vec![],
            total_frames: 0,
        };
    };

    let current = document.line(execution.cursor()).unwrap_or("");
    let words = current.split_whitespace().collect_vec();

    let start = start_frame.unwrap_or(0).max(0) as usize;
    let levels = levels
        .map(|l| l.max(0) as usize)
        .unwrap_or_else(|| words.len().saturating_sub(start));
    let end = (start + levels).min(words.len());

    let client_line = convention.internal_to_client(execution.cursor() as i64);
    let stack_frames = words
        .iter()
        .enumerate()
        .take(end)
        .skip(start)
        .map(|(idx, word)| StackFrame {
            id: idx as i64,
            name: format!("{word}({idx})"),
            source: Source {
                name: Some(document.name().to_string()),
                path: Some(document.path().to_string()),
            },
            line: client_line,
            column: 0,
        })
        .collect_vec();

    StackTraceResponseBody {
        stack_frames,
        total_frames: words.len() as i64,
    }
}

/// Three fixed scopes per request; handles are freshly allocated every time,
/// never deduplicated by frame.
pub fn scopes(handles: &mut Handles<String>, frame_id: i64) -> Vec<Scope> {
    vec![
        Scope {
            name: "Local",
            variables_reference: handles.create(format!("local_{frame_id}")),
            expensive: false,
        },
        Scope {
            name: "Closure",
            variables_reference: handles.create(format!("closure_{frame_id}")),
            expensive: false,
        },
        Scope {
            name: "Global",
            variables_reference: handles.create(format!("global_{frame_id}")),
            expensive: true,
        },
    ]
}

/// Four synthetic variables per known reference; the object entry gets a
/// brand-new handle, so expanding it recurses into the same shape forever.
/// Unknown references degrade to an empty list.
pub fn variables(handles: &mut Handles<String>, reference: i64) -> Vec<Variable> {
    let Some(label) = handles.get(reference).cloned() else {
        return vec![];
    };

    vec![
        Variable {
            name: format!("{label}_i"),
            r#type: "integer",
            value: "123".to_string(),
            variables_reference: 0,
        },
        Variable {
            name: format!("{label}_f"),
            r#type: "float",
            value: "3.14".to_string(),
            variables_reference: 0,
        },
        Variable {
            name: format!("{label}_s"),
            r#type: "string",
            value: "hello world".to_string(),
            variables_reference: 0,
        },
        Variable {
            name: format!("{label}_o"),
            r#type: "object",
            value: "Object".to_string(),
            variables_reference: handles.create("object_".to_string()),
        },
    ]
}
