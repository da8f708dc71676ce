use crate::dap::diagnostics::HighlightEntry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The only thread a quantum program runs on.
pub const THREAD_ID: i64 = 1;

/// DAP request envelope.
#[derive(Debug, Deserialize)]
pub struct DapRequest {
    #[serde(default)]
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// DAP response envelope.
///
/// A response with `success == false` never carries a body, only a message.
#[derive(Debug, Serialize)]
pub struct DapResponse {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// DAP event envelope.
#[derive(Debug, Serialize)]
pub struct DapEvent {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// The currently loaded program file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint,
    Pause,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
}

/// Events the session emits, in the shape they take on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Initialized,
    Stopped {
        reason: StopReason,
        message: String,
    },
    Terminated,
    Exited {
        code: i32,
    },
    Capabilities {
        supports_step_back: bool,
    },
    Output {
        category: OutputCategory,
        output: String,
        line: usize,
        column: usize,
        source: SourceDescriptor,
    },
    GrayOut {
        ranges: Vec<(usize, usize)>,
        source: SourceDescriptor,
    },
    HighlightError {
        highlights: Vec<HighlightEntry>,
        source: SourceDescriptor,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Initialized => "initialized",
            Event::Stopped { .. } => "stopped",
            Event::Terminated => "terminated",
            Event::Exited { .. } => "exited",
            Event::Capabilities { .. } => "capabilities",
            Event::Output { .. } => "output",
            Event::GrayOut { .. } => "grayOut",
            Event::HighlightError { .. } => "highlightError",
        }
    }

    pub fn body(&self) -> Option<Value> {
        let body = match self {
            Event::Initialized | Event::Terminated => return None,
            Event::Stopped { reason, message } => json!({
                "reason": reason.as_ref(),
                "description": message,
                "text": message,
                "threadId": THREAD_ID,
                "allThreadsStopped": true,
            }),
            Event::Exited { code } => json!({ "exitCode": code }),
            Event::Capabilities { supports_step_back } => json!({
                "capabilities": { "supportsStepBack": supports_step_back },
            }),
            Event::Output {
                category,
                output,
                line,
                column,
                source,
            } => json!({
                "category": category.as_ref(),
                "output": output,
                "line": line,
                "column": column,
                "source": source,
            }),
            Event::GrayOut { ranges, source } => json!({
                "ranges": ranges,
                "source": source,
            }),
            Event::HighlightError { highlights, source } => json!({
                "highlights": highlights,
                "source": source,
            }),
        };
        Some(body)
    }
}

/// Fixed capability set announced in the `initialize` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_function_breakpoints: bool,
    pub supports_conditional_breakpoints: bool,
    pub supports_hit_conditional_breakpoints: bool,
    pub supports_evaluate_for_hovers: bool,
    pub supports_exception_info_request: bool,
    pub exception_breakpoint_filters: Vec<Value>,
    pub supports_step_back: bool,
    pub supports_set_variable: bool,
    pub supports_restart_frame: bool,
    pub supports_terminate_request: bool,
    pub supports_restart_request: bool,
    pub supports_variable_type: bool,
    pub supports_delayed_stack_trace_loading: bool,
    pub supports_variable_paging: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_configuration_done_request: true,
            supports_function_breakpoints: false,
            supports_conditional_breakpoints: false,
            supports_hit_conditional_breakpoints: false,
            supports_evaluate_for_hovers: false,
            supports_exception_info_request: true,
            exception_breakpoint_filters: vec![],
            supports_step_back: true,
            supports_set_variable: true,
            supports_restart_frame: true,
            supports_terminate_request: true,
            supports_restart_request: true,
            supports_variable_type: true,
            supports_delayed_stack_trace_loading: false,
            supports_variable_paging: true,
        }
    }
}
