use crate::dap::diagnostics;
use crate::dap::message::Command;
use crate::dap::protocol::{
    DapEvent, DapRequest, DapResponse, Event, OutputCategory, StopReason,
};
use crate::dap::state::{Phase, SessionState};
use crate::dap::transport::DapIo;
use crate::engine::SimulationState;
use anyhow::bail;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::BTreeSet;

/// Exit code reported when the client terminates the program.
const TERMINATED_EXIT_CODE: i32 = 143;

/// One client connection driving one simulation.
pub struct DebugSession {
    io: DapIo,
    seq: i64,
    state: SessionState,
}

impl DebugSession {
    pub fn new(io: DapIo, engine: Box<dyn SimulationState>) -> Self {
        Self {
            io,
            seq: 1,
            state: SessionState::new(engine),
        }
    }

    /// Serve requests until the client disconnects. Framing errors, malformed JSON
    /// and unsupported commands end the session with an error.
    pub fn run(mut self) -> anyhow::Result<()> {
        while let Some(message) = self.io.read_message()? {
            let req: DapRequest = serde_json::from_value(message)?;
            if req.r#type != "request" {
                debug!(target: "dap", "ignoring {} message", req.r#type);
                continue;
            }
            self.dispatch(&req)?;
        }
        info!(target: "dap", "client closed the connection");
        Ok(())
    }

    fn dispatch(&mut self, req: &DapRequest) -> anyhow::Result<()> {
        debug!(target: "dap", "request #{} {}", req.seq, req.command);
        let Some(parsed) = Command::parse(&req.command, &req.arguments) else {
            bail!("unsupported command: {}", req.command);
        };
        let command = match parsed {
            Ok(command) => command,
            Err(e) => {
                warn!(target: "dap", "{} rejected: {e}", req.command);
                return self.send_err(req, e.to_string());
            }
        };

        match command.handle(&mut self.state) {
            Ok(body) => self.send_success(req, body)?,
            Err(e) => {
                warn!(target: "dap", "{} failed: {e}", req.command);
                return self.send_err(req, e.to_string());
            }
        }

        self.follow_up(&command)
    }

    /// Events that describe the session after a successful request, in protocol order.
    fn follow_up(&mut self, command: &Command) -> anyhow::Result<()> {
        if command.clears_exit_suppression() {
            self.state.prevent_exit = false;
        }

        if matches!(command, Command::Launch(_)) {
            self.send_event(Event::Initialized)?;
        }

        match (command.launch_args(), command.execution()) {
            (Some(args), _) if args.stop_on_entry => self.send_event(Event::Stopped {
                reason: StopReason::Entry,
                message: "Stopped on entry".to_string(),
            })?,
            (Some(_), _) => self.report_stop()?,
            (None, Some(execution)) if execution.reports_stop() => self.report_stop()?,
            _ => {}
        }

        if matches!(command, Command::Terminate) {
            self.send_event(Event::Terminated)?;
            self.send_event(Event::Exited {
                code: TERMINATED_EXIT_CODE,
            })?;
        }

        if command.execution().is_some_and(|e| !e.reports_stop()) {
            self.send_event(Event::Stopped {
                reason: StopReason::Pause,
                message: "Stopped after pause".to_string(),
            })?;
        }

        self.flush_highlights()?;
        self.regular_checks()
    }

    /// `stopped` event for wherever execution ended, exception over breakpoint over step.
    fn report_stop(&mut self) -> anyhow::Result<()> {
        let engine = self.state.engine.as_ref();
        let (reason, message) = if engine.did_assertion_fail() {
            (StopReason::Exception, "An assertion failed")
        } else if engine.was_breakpoint_hit() {
            (StopReason::Breakpoint, "Stopped at breakpoint")
        } else {
            (StopReason::Step, "Stopped after step")
        };
        let assertion_failed = reason == StopReason::Exception;

        self.send_event(Event::Stopped {
            reason,
            message: message.to_string(),
        })?;
        if assertion_failed {
            self.report_assertion_failure()?;
        }
        Ok(())
    }

    fn report_assertion_failure(&mut self) -> anyhow::Result<()> {
        let state = &self.state;
        let engine = state.engine.as_ref();
        let current = engine.get_current_instruction();
        let source = state.source_descriptor();

        match engine.get_data_dependencies(current) {
            Ok(dependencies) => {
                let dependencies: BTreeSet<usize> = dependencies.into_iter().collect();
                let ranges = (0..engine.get_instruction_count())
                    .filter(|i| !dependencies.contains(i))
                    .filter_map(|i| engine.get_instruction_position(i).ok())
                    .collect();
                self.send_event(Event::GrayOut {
                    ranges,
                    source: source.clone(),
                })?;
            }
            Err(e) => warn!(target: "dap", "no data dependencies for instruction {current}: {e}"),
        }

        let state = &self.state;
        let engine = state.engine.as_ref();
        let causes = engine.potential_error_causes().unwrap_or_else(|e| {
            warn!(target: "dap", "no error causes: {e}");
            vec![]
        });
        let mapper = state.mapper();
        let messages: Vec<String> = causes
            .iter()
            .map(|cause| diagnostics::format_error_cause(cause, engine, &mapper))
            .filter(|msg| !msg.is_empty())
            .collect();

        let (line, column) = state.instruction_location(current).unwrap_or((0, 0));
        let code = state.instruction_code(current).unwrap_or_default();
        let line_number = state.instruction_line(current).unwrap_or(line);
        let report = diagnostics::assertion_report(line_number, &code, &messages);
        let highlights = diagnostics::assertion_highlights(
            engine,
            &state.source_code,
            state.convention,
            current,
            &causes,
        );

        if let Some(output) = report.render() {
            self.send_event(Event::Output {
                category: OutputCategory::Stderr,
                output,
                line,
                column,
                source,
            })?;
        }

        if !highlights.is_empty() {
            self.state.pending_highlights.extend(highlights);
            self.state.prevent_exit = true;
        }
        Ok(())
    }

    fn flush_highlights(&mut self) -> anyhow::Result<()> {
        if self.state.pending_highlights.is_empty() {
            return Ok(());
        }
        let highlights = std::mem::take(&mut self.state.pending_highlights);
        let source = self.state.source_descriptor();
        self.send_event(Event::HighlightError { highlights, source })?;
        self.state.prevent_exit = true;
        Ok(())
    }

    fn regular_checks(&mut self) -> anyhow::Result<()> {
        let engine = self.state.engine.as_ref();
        let finished = engine.is_finished() && engine.get_instruction_count() != 0;
        let can_step_back = engine.can_step_backward();

        if finished && !self.state.prevent_exit && self.state.phase != Phase::Terminated {
            self.send_event(Event::Exited { code: 0 })?;
        }
        if can_step_back != self.state.can_step_back {
            self.state.can_step_back = can_step_back;
            self.send_event(Event::Capabilities {
                supports_step_back: can_step_back,
            })?;
        }
        Ok(())
    }

    fn next_seq(&mut self) -> i64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn send_success(&mut self, req: &DapRequest, body: Option<Value>) -> anyhow::Result<()> {
        let resp = DapResponse {
            seq: self.next_seq(),
            r#type: "response",
            request_seq: req.seq,
            success: true,
            command: req.command.clone(),
            message: None,
            body,
        };
        self.io.write_message(&resp)
    }

    fn send_err(&mut self, req: &DapRequest, message: String) -> anyhow::Result<()> {
        let resp = DapResponse {
            seq: self.next_seq(),
            r#type: "response",
            request_seq: req.seq,
            success: false,
            command: req.command.clone(),
            message: Some(message),
            body: None,
        };
        self.io.write_message(&resp)
    }

    fn send_event(&mut self, event: Event) -> anyhow::Result<()> {
        debug!(target: "dap", "event {}", event.name());
        let ev = DapEvent {
            seq: self.next_seq(),
            r#type: "event",
            event: event.name(),
            body: event.body(),
        };
        self.io.write_message(&ev)
    }
}
