//! Keyword search strictly after or before a boundary line.
//!
//! Matching is a byte substring test, case-sensitive unless the engine is
//! built with ASCII case folding. The mapped file is scanned in line-aligned
//! chunks, so no more than one chunk is ever copied (and only when folding).

use std::borrow::Cow;

use memchr::memmem;

use crate::error::{LogWindowError, Result};
use crate::line_index::LineIndex;

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchEngine {
    case_sensitive: bool,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

impl SearchEngine {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    pub fn search(
        &self,
        index: &LineIndex,
        keyword: &str,
        from_line: u64,
        direction: Direction,
    ) -> Result<Option<u64>> {
        match direction {
            Direction::Forward => self.search_forward(index, keyword, from_line),
            Direction::Backward => self.search_prev(index, keyword, from_line),
        }
    }

    /// First line in `from_line + 1 ..= total` containing `keyword`.
    pub fn search_forward(
        &self,
        index: &LineIndex,
        keyword: &str,
        from_line: u64,
    ) -> Result<Option<u64>> {
        let Some(needle) = self.needle(keyword)? else {
            return Ok(None);
        };
        let first = from_line.saturating_add(1);
        let Some(mut cursor) = index.line_start(first) else {
            return Ok(None);
        };

        let bytes = index.bytes();
        let finder = memmem::Finder::new(&*needle);
        let end = bytes.len();
        let mut cursor_line = first;

        while cursor < end as u64 {
            let start = cursor as usize;
            let chunk_end = line_boundary_after((start + CHUNK_SIZE).min(end), bytes);
            let chunk = self.fold(&bytes[start..chunk_end]);

            if let Some(pos) = finder.find(&chunk) {
                let line = cursor_line + memchr::memchr_iter(b'\n', &chunk[..pos]).count() as u64;
                log::debug!("search forward {keyword:?} from {from_line}: line {line}");
                return Ok(Some(line));
            }
            cursor_line += memchr::memchr_iter(b'\n', &chunk).count() as u64;
            cursor = chunk_end as u64;
        }

        log::debug!("search forward {keyword:?} from {from_line}: no match");
        Ok(None)
    }

    /// Last line in `1 ..= min(from_line - 1, total)` containing `keyword`,
    /// i.e. the nearest match above `from_line`.
    pub fn search_prev(
        &self,
        index: &LineIndex,
        keyword: &str,
        from_line: u64,
    ) -> Result<Option<u64>> {
        let Some(needle) = self.needle(keyword)? else {
            return Ok(None);
        };
        let last = from_line.saturating_sub(1).min(index.total_lines());
        if last == 0 {
            return Ok(None);
        }
        let Some(span) = index.line_span(last, last) else {
            return Ok(None);
        };

        let bytes = index.bytes();
        let finder = memmem::FinderRev::new(&*needle);
        // The search window ends just before the last line's terminator.
        let mut end = trim_terminator(span.bytes.end as usize, bytes);
        let mut end_line = last;

        loop {
            let start = line_boundary_before(end.saturating_sub(CHUNK_SIZE), bytes);
            let chunk = self.fold(&bytes[start..end]);

            if let Some(pos) = finder.rfind(&chunk) {
                let line = end_line - memchr::memchr_iter(b'\n', &chunk[pos..]).count() as u64;
                log::debug!("search backward {keyword:?} from {from_line}: line {line}");
                return Ok(Some(line));
            }
            if start == 0 {
                break;
            }
            // `start` is a line start; step over the '\n' that precedes it.
            end_line -= memchr::memchr_iter(b'\n', &chunk).count() as u64 + 1;
            end = start - 1;
        }

        log::debug!("search backward {keyword:?} from {from_line}: no match");
        Ok(None)
    }

    fn needle<'k>(&self, keyword: &'k str) -> Result<Option<Cow<'k, [u8]>>> {
        if keyword.is_empty() {
            return Err(LogWindowError::InvalidRequest(
                "search keyword must not be empty".into(),
            ));
        }
        // Matches never span lines.
        if keyword.contains('\n') {
            return Ok(None);
        }
        Ok(Some(self.fold(keyword.as_bytes())))
    }

    fn fold<'b>(&self, bytes: &'b [u8]) -> Cow<'b, [u8]> {
        if self.case_sensitive {
            Cow::Borrowed(bytes)
        } else {
            Cow::Owned(bytes.to_ascii_lowercase())
        }
    }
}

/// Smallest offset `>= pos` that starts a line (or the end of `bytes`).
fn line_boundary_after(pos: usize, bytes: &[u8]) -> usize {
    if pos == 0 || pos >= bytes.len() || bytes[pos - 1] == b'\n' {
        return pos.min(bytes.len());
    }
    memchr::memchr(b'\n', &bytes[pos..]).map_or(bytes.len(), |nl| pos + nl + 1)
}

/// Largest offset `<= pos` that starts a line.
fn line_boundary_before(pos: usize, bytes: &[u8]) -> usize {
    if pos == 0 || bytes[pos - 1] == b'\n' {
        return pos;
    }
    memchr::memrchr(b'\n', &bytes[..pos]).map_or(0, |nl| nl + 1)
}

fn trim_terminator(end: usize, bytes: &[u8]) -> usize {
    if end > 0 && bytes[end - 1] == b'\n' {
        end - 1
    } else {
        end
    }
}
