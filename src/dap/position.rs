//! Conversion between engine byte offsets and client line/column coordinates.
//!
//! Columns count bytes of the UTF-8 source, not characters or UTF-16 units. On
//! lines with non-ASCII text, positions after the first multi-byte character
//! are shifted right in clients that count UTF-16 units.

/// Client indexing convention negotiated by `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConvention {
    pub lines_start_at_one: bool,
    pub columns_start_at_one: bool,
}

impl Default for IndexConvention {
    fn default() -> Self {
        Self {
            lines_start_at_one: true,
            columns_start_at_one: true,
        }
    }
}

impl IndexConvention {
    /// Convert a 1-based line and column into the client convention.
    pub fn to_client(self, line: usize, column: usize) -> (usize, usize) {
        let line = if self.lines_start_at_one {
            line
        } else {
            line.saturating_sub(1)
        };
        let column = if self.columns_start_at_one {
            column
        } else {
            column.saturating_sub(1)
        };
        (line, column)
    }
}

pub struct PositionMapper<'a> {
    source: &'a str,
    convention: IndexConvention,
}

impl<'a> PositionMapper<'a> {
    pub fn new(source: &'a str, convention: IndexConvention) -> Self {
        Self { source, convention }
    }

    /// Map an offset to `(line, column)` in the client convention.
    ///
    /// An offset equal to a line's length addresses the position just past its last
    /// character. Offsets beyond the text clamp to the end of the last line.
    pub fn to_line_column(&self, offset: usize) -> (usize, usize) {
        let mut rest = offset;
        let mut line = 1;
        let mut column = 0;
        let mut found = false;
        for (idx, text) in self.source.split('\n').enumerate() {
            line = idx + 1;
            if rest <= text.len() {
                column = rest;
                found = true;
                break;
            }
            rest -= text.len() + 1;
            column = text.len();
        }
        if !found {
            log::debug!(target: "dap", "offset {offset} is past the end of the source");
        }

        let column = if self.convention.columns_start_at_one {
            column + 1
        } else {
            column
        };
        let line = if self.convention.lines_start_at_one {
            line
        } else {
            line - 1
        };
        (line, column)
    }

    /// 1-based line number of `offset` for messages shown to the user, independent
    /// of the client convention.
    pub fn line_number(&self, offset: usize) -> usize {
        let end = offset.min(self.source.len());
        self.source.as_bytes()[..end]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1
    }

    /// Map client `(line, column)` back to an offset. Coordinates outside the text
    /// saturate instead of failing.
    pub fn to_offset(&self, line: usize, column: usize) -> usize {
        let line_idx = if self.convention.lines_start_at_one {
            line.saturating_sub(1)
        } else {
            line
        };
        let column = if self.convention.columns_start_at_one {
            column.saturating_sub(1)
        } else {
            column
        };
        let preceding: usize = self
            .source
            .split('\n')
            .take(line_idx)
            .map(|text| text.len() + 1)
            .sum();
        preceding + column
    }
}
