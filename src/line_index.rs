//! Sparse line index over a memory-mapped, append-only file.
//!
//! Only every `sample_interval`-th line start is stored. Resolving an exact
//! line scans forward from the nearest sample, so a lookup touches at most
//! `sample_interval` lines no matter how large the file is.

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{LogWindowError, Result};

pub const DEFAULT_SAMPLE_INTERVAL: u64 = 1024;

const CHUNK_SIZE: usize = 1024 * 1024; // Process in 1MB chunks

/// Byte range covering lines `[start_line, end_line]`, terminators included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpan {
    pub start_line: u64,
    pub end_line: u64,
    pub bytes: Range<u64>,
}

/// Raw bytes of a contiguous run of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBlock {
    pub start_line: u64,
    pub end_line: u64,
    raw: Vec<u8>,
}

impl LineBlock {
    pub fn empty() -> Self {
        Self {
            start_line: 0,
            end_line: 0,
            raw: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_line == 0
    }

    pub fn line_count(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end_line - self.start_line + 1
        }
    }

    /// The lines as text with the final terminator dropped, so splitting on
    /// `'\n'` yields exactly `line_count()` pieces.
    pub fn into_content(self) -> String {
        let mut bytes = self.raw;
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }
}

#[derive(Debug)]
pub struct LineIndex {
    path: PathBuf,
    mmap: Option<Mmap>,
    sample_interval: u64,
    // samples[i] is the byte offset of line i * sample_interval + 1
    samples: Vec<u64>,
    terminators: u64,
    // Offset just past the last '\n' (start of the unterminated tail, if any)
    tail_start: u64,
    total_bytes: u64,
}

impl LineIndex {
    pub fn build(path: impl AsRef<Path>, sample_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut index = Self {
            path,
            mmap: None,
            sample_interval: sample_interval.max(1),
            samples: vec![0],
            terminators: 0,
            tail_start: 0,
            total_bytes: 0,
        };
        index.extend()?;
        log::debug!(
            "indexed {}: {} lines, {} bytes, {} samples",
            index.path.display(),
            index.total_lines(),
            index.total_bytes,
            index.samples.len()
        );
        Ok(index)
    }

    /// Index bytes appended since the last build/extend. Returns the number of
    /// lines gained.
    pub fn extend(&mut self) -> Result<u64> {
        let file = File::open(&self.path).map_err(|e| LogWindowError::io(&self.path, e))?;
        let current = file
            .metadata()
            .map_err(|e| LogWindowError::io(&self.path, e))?
            .len();

        if current < self.total_bytes {
            return Err(LogWindowError::FileShrank {
                path: self.path.clone(),
                indexed: self.total_bytes,
                current,
            });
        }
        if current == self.total_bytes {
            return Ok(0);
        }

        // SAFETY: the file is treated as append-only; truncating it while mapped
        // is outside the supported contract.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| LogWindowError::io(&self.path, e))?;
        let before = self.total_lines();
        let scan_from = self.total_bytes as usize;
        let scan_to = mmap.len();

        self.mmap = Some(mmap);
        self.scan(scan_from, scan_to);
        self.total_bytes = scan_to as u64;

        Ok(self.total_lines() - before)
    }

    fn scan(&mut self, from: usize, to: usize) {
        let Some(mmap) = self.mmap.as_ref() else {
            return;
        };

        let mut chunk_start = from;
        while chunk_start < to {
            let chunk_end = std::cmp::min(chunk_start + CHUNK_SIZE, to);
            let chunk = &mmap[chunk_start..chunk_end];

            for nl_pos in memchr::memchr_iter(b'\n', chunk) {
                let next_line_start = (chunk_start + nl_pos + 1) as u64;
                self.terminators += 1;
                if self.terminators % self.sample_interval == 0 {
                    self.samples.push(next_line_start);
                }
                self.tail_start = next_line_start;
            }

            chunk_start = chunk_end;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_lines(&self) -> u64 {
        if self.tail_start < self.total_bytes {
            self.terminators + 1
        } else {
            self.terminators
        }
    }

    pub fn sample_interval(&self) -> u64 {
        self.sample_interval
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => &mmap[..self.total_bytes as usize],
            None => &[],
        }
    }

    /// Byte offset of the first byte of `line` (1-based).
    pub fn line_start(&self, line: u64) -> Option<u64> {
        if line == 0 || line > self.total_lines() {
            return None;
        }
        let sample = (line - 1) / self.sample_interval;
        let skip = (line - 1) % self.sample_interval;
        let base = *self.samples.get(sample as usize)?;
        if skip == 0 {
            return Some(base);
        }
        let bytes = self.bytes();
        memchr::memchr_iter(b'\n', &bytes[base as usize..])
            .nth(skip as usize - 1)
            .map(|nl| base + nl as u64 + 1)
    }

    /// Clamps `[start, end]` to the indexed lines and resolves its byte range.
    /// `None` when the file is empty or `start` lies past the last line.
    pub fn line_span(&self, start: u64, end: u64) -> Option<LineSpan> {
        let total = self.total_lines();
        let start = start.max(1);
        if total == 0 || start > total {
            return None;
        }
        let end = end.max(start).min(total);

        let byte_start = self.line_start(start)?;
        let wanted = (end - start + 1) as usize;
        let byte_end = memchr::memchr_iter(b'\n', &self.bytes()[byte_start as usize..])
            .nth(wanted - 1)
            .map_or(self.total_bytes, |nl| byte_start + nl as u64 + 1);

        Some(LineSpan {
            start_line: start,
            end_line: end,
            bytes: byte_start..byte_end,
        })
    }

    pub fn read_lines(&self, start: u64, end: u64) -> LineBlock {
        match self.line_span(start, end) {
            Some(span) => LineBlock {
                start_line: span.start_line,
                end_line: span.end_line,
                raw: self.bytes()[span.bytes.start as usize..span.bytes.end as usize].to_vec(),
            },
            None => LineBlock::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn empty_file_has_no_lines() {
        let file = file_with("");
        let index = LineIndex::build(file.path(), 4).unwrap();
        assert_eq!(index.total_lines(), 0);
        assert_eq!(index.total_bytes(), 0);
        assert!(index.read_lines(1, 10).is_empty());
        assert_eq!(index.line_start(1), None);
    }

    #[test]
    fn unterminated_last_line_is_counted() {
        let file = file_with("alpha\nbeta\ngamma");
        let index = LineIndex::build(file.path(), 2).unwrap();
        assert_eq!(index.total_lines(), 3);
        assert_eq!(index.read_lines(3, 3).into_content(), "gamma");
        assert_eq!(index.read_lines(2, 3).into_content(), "beta\ngamma");
    }

    #[test]
    fn blank_lines_keep_their_place() {
        let file = file_with("a\n\n\nb\n");
        let index = LineIndex::build(file.path(), 1).unwrap();
        assert_eq!(index.total_lines(), 4);
        assert_eq!(index.read_lines(2, 2).into_content(), "");
        assert_eq!(index.read_lines(1, 4).into_content(), "a\n\n\nb");
        assert_eq!(index.read_lines(2, 3).into_content(), "\n");
    }

    #[test]
    fn read_lines_clamps_out_of_range_requests() {
        let file = file_with("1\n2\n3\n4\n5\n");
        let index = LineIndex::build(file.path(), 2).unwrap();

        let block = index.read_lines(0, 2);
        assert_eq!((block.start_line, block.end_line), (1, 2));

        let block = index.read_lines(4, 99);
        assert_eq!((block.start_line, block.end_line), (4, 5));
        assert_eq!(block.into_content(), "4\n5");

        let block = index.read_lines(3, 1);
        assert_eq!((block.start_line, block.end_line), (3, 3));

        assert!(index.read_lines(6, 8).is_empty());
    }

    #[test]
    fn crlf_terminator_is_trimmed_only_at_the_end() {
        let file = file_with("one\r\ntwo\r\n");
        let index = LineIndex::build(file.path(), 8).unwrap();
        assert_eq!(index.total_lines(), 2);
        assert_eq!(index.read_lines(1, 2).into_content(), "one\r\ntwo");
        assert_eq!(index.read_lines(1, 1).into_content(), "one");
    }

    #[test]
    fn extend_indexes_only_appended_bytes() {
        let mut file = file_with("a\nb\n");
        let mut index = LineIndex::build(file.path(), 2).unwrap();
        assert_eq!(index.total_lines(), 2);
        assert_eq!(index.extend().unwrap(), 0);

        file.write_all(b"c\nd\ne\n").unwrap();
        file.flush().unwrap();

        assert_eq!(index.extend().unwrap(), 3);
        assert_eq!(index.total_lines(), 5);
        assert_eq!(index.read_lines(1, 2).into_content(), "a\nb");
        assert_eq!(index.read_lines(5, 5).into_content(), "e");
        assert_eq!(index.extend().unwrap(), 0);
    }

    #[test]
    fn extend_completes_a_partial_tail() {
        let mut file = file_with("head\npart");
        let mut index = LineIndex::build(file.path(), 3).unwrap();
        assert_eq!(index.total_lines(), 2);

        file.write_all(b"ial\nnext\n").unwrap();
        file.flush().unwrap();

        assert_eq!(index.extend().unwrap(), 1);
        assert_eq!(index.read_lines(2, 2).into_content(), "partial");
        assert_eq!(index.read_lines(3, 3).into_content(), "next");
    }

    #[test]
    fn shrinking_file_is_reported_and_index_is_kept() {
        let file = file_with("a\nb\nc\n");
        let mut index = LineIndex::build(file.path(), 2).unwrap();
        file.as_file().set_len(2).unwrap();

        let err = index.extend().unwrap_err();
        assert!(matches!(err, LogWindowError::FileShrank { indexed: 6, current: 2, .. }));
        assert_eq!(index.total_lines(), 3);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LineIndex::build(dir.path().join("gone.log"), 4).unwrap_err();
        assert!(matches!(err, LogWindowError::Io { .. }));
    }

    #[test]
    fn zero_sample_interval_is_treated_as_one() {
        let file = file_with("x\ny\n");
        let index = LineIndex::build(file.path(), 0).unwrap();
        assert_eq!(index.sample_interval(), 1);
        assert_eq!(index.line_start(2), Some(2));
    }
}
