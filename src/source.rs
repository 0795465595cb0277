//! Source position lookup.
//!
//! The parser hands the emitters raw byte positions; the debugger wants
//! lines and columns. A table of line-start offsets over the source text
//! answers both queries with a binary search.

/// Line/column lookup over one script's source text.
#[derive(Debug)]
pub struct SourceInfo {
    /// Byte offset of the first character of each line. Always starts
    /// with 0.
    line_starts: Vec<u32>,
}

impl SourceInfo {
    /// Builds the line table for `source`.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-based line number containing the byte position `pos`.
    pub fn line_at(&self, pos: u32) -> u32 {
        match self.line_starts.binary_search(&pos) {
            Ok(line) => line as u32 + 1,
            Err(line) => line as u32,
        }
    }

    /// 0-based column of the byte position `pos` within its line.
    pub fn column_at(&self, pos: u32) -> u32 {
        let line = self.line_at(pos) as usize - 1;
        pos - self.line_starts[line]
    }
}
