//! Translation of engine diagnostics into client-facing messages and highlights.

use crate::dap::position::{IndexConvention, PositionMapper};
use crate::engine::{ErrorCause, ErrorCauseType, ParsingError, SimulationState};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const ASSERTION_FAILED_MESSAGE: &str = "Assertion failed at this instruction.";
const PARSE_ERROR_FALLBACK: &str = "The program could not be parsed.";

static PARSE_ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<input>:(\d+):(\d+):\s*(.*)").expect("must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HighlightReason {
    MissingInteraction,
    ControlAlwaysZero,
    AssertionFailed,
    ParseError,
    Unknown,
}

impl From<ErrorCauseType> for HighlightReason {
    fn from(value: ErrorCauseType) -> Self {
        match value {
            ErrorCauseType::MissingInteraction => HighlightReason::MissingInteraction,
            ErrorCauseType::ControlAlwaysZero => HighlightReason::ControlAlwaysZero,
            ErrorCauseType::Unknown => HighlightReason::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// One source region the client should mark as erroneous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightEntry {
    /// Instruction index, `-1` for parse errors.
    pub instruction: i64,
    pub range: Range,
    pub reason: HighlightReason,
    pub code: String,
    pub message: String,
}

/// Sentence describing a potential error cause, empty for unknown causes.
pub fn format_error_cause(
    cause: &ErrorCause,
    engine: &dyn SimulationState,
    mapper: &PositionMapper,
) -> String {
    match cause.r#type {
        ErrorCauseType::MissingInteraction => {
            "The qubits never interact with each other. Are you missing a CX gate?".to_string()
        }
        ErrorCauseType::ControlAlwaysZero => {
            let line = engine
                .get_instruction_position(cause.instruction)
                .map(|(start, _)| mapper.line_number(start))
                .unwrap_or_default();
            format!("Control qubit is always zero in line {line}.")
        }
        ErrorCauseType::Unknown => String::new(),
    }
}

/// Highlight covering a single instruction. `None` if the engine does not know
/// the instruction or the message is blank.
pub fn instruction_highlight(
    engine: &dyn SimulationState,
    source: &str,
    convention: IndexConvention,
    instruction: usize,
    reason: HighlightReason,
    message: String,
) -> Option<HighlightEntry> {
    if message.trim().is_empty() {
        return None;
    }
    let (start, end) = engine.get_instruction_position(instruction).ok()?;
    let mapper = PositionMapper::new(source, convention);

    // keep the range on the statement's own line when the engine range ends with a newline
    let bytes = source.as_bytes();
    let mut last = end.min(source.len().saturating_sub(1)).max(start);
    while last > start && matches!(bytes.get(last), Some(b'\n' | b'\r')) {
        last -= 1;
    }
    let (start_line, start_column) = mapper.to_line_column(start);
    let (end_line, end_column) = mapper.to_line_column(last);

    Some(HighlightEntry {
        instruction: instruction as i64,
        range: Range {
            start: Position {
                line: start_line,
                column: start_column,
            },
            end: Position {
                line: end_line,
                column: end_column + 1,
            },
        },
        reason,
        code: snippet(source, start, end),
        message,
    })
}

/// Highlights for an assertion failure at `failing`: one per explainable cause, or
/// the failing instruction itself when there is none.
pub fn assertion_highlights(
    engine: &dyn SimulationState,
    source: &str,
    convention: IndexConvention,
    failing: usize,
    causes: &[ErrorCause],
) -> Vec<HighlightEntry> {
    let mapper = PositionMapper::new(source, convention);
    let mut highlights: Vec<HighlightEntry> = causes
        .iter()
        .filter_map(|cause| {
            let message = format_error_cause(cause, engine, &mapper);
            instruction_highlight(
                engine,
                source,
                convention,
                cause.instruction,
                cause.r#type.into(),
                message,
            )
        })
        .collect();

    if highlights.is_empty() {
        highlights.extend(instruction_highlight(
            engine,
            source,
            convention,
            failing,
            HighlightReason::AssertionFailed,
            ASSERTION_FAILED_MESSAGE.to_string(),
        ));
    }
    highlights
}

/// Source text of an end-inclusive byte range, whitespace and line breaks trimmed.
pub fn snippet(source: &str, start: usize, end: usize) -> String {
    let end = (end + 1).min(source.len());
    source
        .get(start.min(end)..end)
        .unwrap_or_default()
        .replace(['\r', '\n'], "")
        .trim()
        .to_string()
}

/// 1-based `(line, column, detail)` of a parse error.
pub fn parse_error_location(error: &ParsingError) -> (usize, usize, String) {
    if let Some(location) = error.location() {
        return (location.line, location.column, location.detail.trim().to_string());
    }
    let message = error.message().trim();
    match PARSE_ERROR_RE.captures(message) {
        Some(caps) => {
            let line = caps[1].parse().unwrap_or(1);
            let column = caps[2].parse().unwrap_or(1);
            (line, column, caps[3].trim().to_string())
        }
        None => (1, 1, message.to_string()),
    }
}

/// Highlight for a parse error. Errors reported at the start of a blank line are
/// moved back to the last non-blank line, which is where the statement is missing
/// something.
pub fn parse_error_highlight(
    error: &ParsingError,
    source: &str,
    convention: IndexConvention,
) -> Option<HighlightEntry> {
    if source.is_empty() {
        return None;
    }
    let (line, column, detail) = parse_error_location(error);
    let lines: Vec<&str> = source.split('\n').collect();
    let mut line_idx = line.clamp(1, lines.len()) - 1;
    let mut column = column.max(1);

    if column <= 1 && line_idx > 0 && lines[line_idx].trim().is_empty() {
        if let Some(prev) = (0..line_idx).rev().find(|i| !lines[*i].trim().is_empty()) {
            line_idx = prev;
            let text = lines[prev];
            column = text.len() - text.trim_start().len() + 1;
        }
    }

    let text = lines[line_idx].trim_end_matches('\r');
    let end_column = column.max(text.len() + 1);
    let code = match text.trim() {
        "" => text.to_string(),
        trimmed => trimmed.to_string(),
    };
    let message = if detail.is_empty() {
        PARSE_ERROR_FALLBACK.to_string()
    } else {
        detail
    };

    let (start_line, start_column) = convention.to_client(line_idx + 1, column);
    let (end_line, end_column) = convention.to_client(line_idx + 1, end_column);
    Some(HighlightEntry {
        instruction: -1,
        range: Range {
            start: Position {
                line: start_line,
                column: start_column,
            },
            end: Position {
                line: end_line,
                column: end_column,
            },
        },
        reason: HighlightReason::ParseError,
        code,
        message,
    })
}

/// Nested console message, flattened into one line per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Line(String),
    Section {
        title: String,
        body: Vec<MessagePart>,
        end: Option<String>,
    },
}

impl MessagePart {
    fn flatten_into(&self, out: &mut Vec<String>) {
        match self {
            MessagePart::Line(line) => {
                if !line.is_empty() {
                    out.push(line.clone());
                }
            }
            MessagePart::Section { title, body, end } => {
                if !title.is_empty() {
                    out.push(title.clone());
                }
                body.iter().for_each(|part| part.flatten_into(out));
                if let Some(end) = end.as_ref().filter(|e| !e.is_empty()) {
                    out.push(end.clone());
                }
            }
        }
    }

    /// Text of the whole hierarchy, `None` when nothing would be printed.
    pub fn render(&self) -> Option<String> {
        let mut lines = vec![];
        self.flatten_into(&mut lines);
        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

/// Console report for an assertion failure on `line`.
pub fn assertion_report(line: usize, code: &str, cause_messages: &[String]) -> MessagePart {
    let causes = if cause_messages.is_empty() {
        MessagePart::Line("○ No potential error causes found".to_string())
    } else {
        let plural = if cause_messages.len() > 1 { "s" } else { "" };
        MessagePart::Section {
            title: format!(
                "Found {} potential error cause{plural}:",
                cause_messages.len()
            ),
            body: cause_messages
                .iter()
                .enumerate()
                .map(|(i, msg)| MessagePart::Line(format!("({}) {msg}", i + 1)))
                .collect(),
            end: None,
        }
    };

    MessagePart::Section {
        title: format!("Assertion failed on line {line}"),
        body: vec![
            MessagePart::Line(format!("    {code}")),
            MessagePart::Line("○ Highlighting dependent predecessors".to_string()),
            causes,
        ],
        end: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::mock::MockState;

    #[test]
    fn test_parse_error_highlight() {
        struct TestCase {
            error: ParsingError,
            source: &'static str,
            expected_start: (usize, usize),
            expected_end: (usize, usize),
            code: &'static str,
            message: &'static str,
        }

        let cases = [
            TestCase {
                error: ParsingError::new("<input>:3:1: unexpected token"),
                source: "qreg q[1];\nh q[0];\nfoo bar;\nx q[0];\nz q[0];",
                expected_start: (3, 1),
                expected_end: (3, 9),
                code: "foo bar;",
                message: "unexpected token",
            },
            TestCase {
                error: ParsingError::at(3, 1, "expected ';'"),
                source: "qreg q[1];\n  h q[0]\n\n",
                expected_start: (2, 3),
                expected_end: (2, 9),
                code: "h q[0]",
                message: "expected ';'",
            },
            TestCase {
                error: ParsingError::new("something went wrong"),
                source: "qreg q[1];",
                expected_start: (1, 1),
                expected_end: (1, 11),
                code: "qreg q[1];",
                message: "something went wrong",
            },
            TestCase {
                error: ParsingError::new("<input>:42:7:"),
                source: "qreg q[1];\nh q[0];",
                expected_start: (2, 7),
                expected_end: (2, 8),
                code: "h q[0];",
                message: PARSE_ERROR_FALLBACK,
            },
        ];

        for tc in cases {
            let entry =
                parse_error_highlight(&tc.error, tc.source, IndexConvention::default()).unwrap();
            assert_eq!(entry.instruction, -1);
            assert_eq!(entry.reason, HighlightReason::ParseError);
            assert_eq!(
                (entry.range.start.line, entry.range.start.column),
                tc.expected_start,
                "{}",
                tc.error
            );
            assert_eq!(
                (entry.range.end.line, entry.range.end.column),
                tc.expected_end,
                "{}",
                tc.error
            );
            assert_eq!(entry.code, tc.code);
            assert_eq!(entry.message, tc.message);
        }
    }

    #[test]
    fn test_parse_error_highlight_zero_based() {
        let convention = IndexConvention {
            lines_start_at_one: false,
            columns_start_at_one: false,
        };
        let error = ParsingError::at(2, 3, "unknown gate 'foo'");
        let entry = parse_error_highlight(&error, "qreg q[1];\n  foo q[0];", convention).unwrap();
        assert_eq!(entry.range.start, Position { line: 1, column: 2 });
        assert_eq!(entry.range.end, Position { line: 1, column: 11 });
        assert!(parse_error_highlight(&error, "", convention).is_none());
    }

    #[test]
    fn test_instruction_highlight_stays_on_line() {
        let source = "measure q[0] -> c[0];\nh q[0];";
        let newline = source.find('\n').unwrap();
        let engine = MockState::with_instructions(vec![(0, newline), (newline + 1, source.len() - 1)]);

        let entry = instruction_highlight(
            &engine,
            source,
            IndexConvention::default(),
            0,
            HighlightReason::AssertionFailed,
            "failed".to_string(),
        )
        .unwrap();
        assert_eq!(entry.range.start, Position { line: 1, column: 1 });
        assert_eq!(entry.range.end, Position { line: 1, column: 22 });
        assert_eq!(entry.code, "measure q[0] -> c[0];");

        let blank = instruction_highlight(
            &engine,
            source,
            IndexConvention::default(),
            1,
            HighlightReason::Unknown,
            "  ".to_string(),
        );
        assert!(blank.is_none());
    }

    #[test]
    fn test_assertion_highlights() {
        let source = "qreg q[2];\nh q[0];\ncx q[0], q[1];\nassert-ent q[0], q[1];";
        let engine =
            MockState::with_instructions(vec![(0, 9), (11, 17), (19, 32), (34, source.len() - 1)]);

        let causes = vec![
            ErrorCause {
                instruction: 2,
                r#type: ErrorCauseType::ControlAlwaysZero,
            },
            ErrorCause {
                instruction: 1,
                r#type: ErrorCauseType::Unknown,
            },
        ];
        let highlights =
            assertion_highlights(&engine, source, IndexConvention::default(), 3, &causes);
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].reason, HighlightReason::ControlAlwaysZero);
        assert_eq!(highlights[0].message, "Control qubit is always zero in line 3.");
        assert_eq!(highlights[0].code, "cx q[0], q[1];");

        let zero_based = IndexConvention {
            lines_start_at_one: false,
            columns_start_at_one: false,
        };
        let highlights = assertion_highlights(&engine, source, zero_based, 3, &causes);
        assert_eq!(highlights[0].message, "Control qubit is always zero in line 3.");
        assert_eq!(highlights[0].range.start, Position { line: 2, column: 0 });

        let fallback = assertion_highlights(&engine, source, IndexConvention::default(), 3, &[]);
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].reason, HighlightReason::AssertionFailed);
        assert_eq!(fallback[0].instruction, 3);
        assert_eq!(fallback[0].message, ASSERTION_FAILED_MESSAGE);
    }

    #[test]
    fn test_assertion_report() {
        let report = assertion_report(4, "assert-ent q[0], q[1];", &[]);
        assert_eq!(
            report.render().unwrap(),
            "Assertion failed on line 4\n    assert-ent q[0], q[1];\n○ Highlighting dependent predecessors\n○ No potential error causes found"
        );

        let causes = vec![
            "The qubits never interact with each other. Are you missing a CX gate?".to_string(),
            "Control qubit is always zero in line 2.".to_string(),
        ];
        let rendered = assertion_report(4, "assert-ent q[0], q[1];", &causes)
            .render()
            .unwrap();
        assert!(rendered.ends_with(
            "Found 2 potential error causes:\n(1) The qubits never interact with each other. Are you missing a CX gate?\n(2) Control qubit is always zero in line 2."
        ));

        let empty = MessagePart::Section {
            title: String::new(),
            body: vec![MessagePart::Line(String::new())],
            end: None,
        };
        assert_eq!(empty.render(), None);
    }
}
