//! Turns a requested range or anchor into a clamped, bounded window.

use std::fs;
use std::sync::PoisonError;

use crate::error::{LogWindowError, Result};
use crate::line_index::LineBlock;
use crate::session::{LineRange, Session, SharedIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowQuery {
    Range { start: u64, end: u64 },
    Anchor { line: u64, before: u64, after: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub start_line: u64,
    pub end_line: u64,
    pub total_lines: u64,
    pub content: String,
    pub is_html: bool,
}

/// Content after the (external) highlighting step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content: String,
    pub is_html: bool,
}

/// Seam for the upstream highlighting pipeline.
pub trait Highlighter: Send + Sync {
    fn render(&self, text: String, keyword: Option<&str>) -> Rendered;
}

impl<H: Highlighter + ?Sized> Highlighter for Box<H> {
    fn render(&self, text: String, keyword: Option<&str>) -> Rendered {
        (**self).render(text, keyword)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Highlighter for Passthrough {
    fn render(&self, text: String, _keyword: Option<&str>) -> Rendered {
        Rendered {
            content: text,
            is_html: false,
        }
    }
}

/// Range centered on `anchor`. `total` is `None` while the line count is
/// still unknown.
pub fn anchor_range(anchor: u64, before: u64, after: u64, total: Option<u64>) -> LineRange {
    let anchor = anchor.max(1);
    let start = anchor.saturating_sub(before).max(1);
    let span = before.saturating_add(after);
    let cap = total.unwrap_or(start.saturating_add(span));
    let mut end = cap.min(anchor.saturating_add(after));
    if end < start {
        end = start.saturating_add(span);
    }
    LineRange { start, end }
}

/// Clamps an explicit range into `[1, total]`. A range starting past the end
/// slides back so it still ends on the last line. `None` for an empty file.
pub fn clamp_range(start: u64, end: u64, total: Option<u64>) -> Option<LineRange> {
    let start = start.max(1);
    let end = end.max(start);
    match total {
        Some(0) => None,
        Some(total) if start > total => Some(LineRange {
            start: total.saturating_sub(end - start).max(1),
            end: total,
        }),
        Some(total) => Some(LineRange {
            start,
            end: end.min(total),
        }),
        None => Some(LineRange { start, end }),
    }
}

pub struct WindowResolver<H = Passthrough> {
    max_window_lines: u64,
    highlighter: H,
}

impl WindowResolver<Passthrough> {
    pub fn new(max_window_lines: u64) -> Self {
        Self::with_highlighter(max_window_lines, Passthrough)
    }
}

impl<H: Highlighter> WindowResolver<H> {
    pub fn with_highlighter(max_window_lines: u64, highlighter: H) -> Self {
        Self {
            max_window_lines: max_window_lines.max(1),
            highlighter,
        }
    }

    /// Clamps to the file and caps the length. The cap trims both sides of
    /// `anchor` when the anchor lies inside the range, so it is always served.
    fn bound(&self, range: LineRange, total: u64, anchor: Option<u64>) -> Option<LineRange> {
        let range = clamp_range(range.start, range.end, Some(total))?;
        let max = self.max_window_lines;
        if range.end - range.start < max {
            return Some(range);
        }
        let start = match anchor.filter(|a| (range.start..=range.end).contains(a)) {
            Some(anchor) => {
                let start = anchor.saturating_sub((max - 1) / 2).max(range.start);
                let end = start.saturating_add(max - 1).min(range.end);
                end.saturating_sub(max - 1).max(range.start)
            }
            None => range.start,
        };
        Some(LineRange {
            start,
            end: start.saturating_add(max - 1).min(range.end),
        })
    }

    /// Serves one window for `session`. At most one call per session runs at a
    /// time; session state is only touched once the read succeeded.
    pub fn resolve(
        &self,
        session: &Session,
        query: WindowQuery,
        anchor: Option<u64>,
        highlight_keyword: Option<String>,
    ) -> Result<Window> {
        let _loading = session.begin_loading()?;

        let known_total = session.snapshot().total_lines;
        let total = refresh_index(session.index())?;
        if total != known_total {
            log::debug!(
                "session {}: file grew from {known_total} to {total} lines",
                session.id()
            );
        }

        let requested = match query {
            WindowQuery::Range { start, end } => LineRange { start, end },
            WindowQuery::Anchor {
                line,
                before,
                after,
            } => anchor_range(line, before, after, Some(total)),
        };
        let anchor = match query {
            WindowQuery::Anchor { line, .. } => Some(line),
            WindowQuery::Range { .. } => anchor,
        };

        let block = match self.bound(requested, total, anchor) {
            Some(range) => session
                .index()
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .read_lines(range.start, range.end),
            None => LineBlock::empty(),
        };
        let (start_line, end_line) = (block.start_line, block.end_line);

        let keyword = match highlight_keyword {
            Some(keyword) => (!keyword.is_empty()).then_some(keyword),
            None => session.snapshot().highlight_keyword,
        };
        let rendered = self
            .highlighter
            .render(block.into_content(), keyword.as_deref());

        let mut state = session.state();
        state.highlight_keyword = keyword;
        state.total_lines = total;
        state.current_window = (start_line > 0).then_some(LineRange {
            start: start_line,
            end: end_line,
        });
        if let Some(anchor) = anchor {
            state.last_anchor_line = Some(anchor.clamp(1, total.max(1)));
        }
        drop(state);

        log::debug!(
            "session {}: requested {}..={} served {start_line}..={end_line} of {total}",
            session.id(),
            requested.start,
            requested.end
        );

        Ok(Window {
            start_line,
            end_line,
            total_lines: total,
            content: rendered.content,
            is_html: rendered.is_html,
        })
    }
}

/// Extends the shared index if its file grew and returns the line count. The
/// write lock is only taken when there is something to index.
pub fn refresh_index(index: &SharedIndex) -> Result<u64> {
    let (path, indexed_bytes, total_lines) = {
        let index = index.read().unwrap_or_else(PoisonError::into_inner);
        (
            index.path().to_path_buf(),
            index.total_bytes(),
            index.total_lines(),
        )
    };
    let current = fs::metadata(&path)
        .map_err(|e| LogWindowError::io(&path, e))?
        .len();
    if current == indexed_bytes {
        return Ok(total_lines);
    }

    let mut index = index.write().unwrap_or_else(PoisonError::into_inner);
    index.extend()?;
    Ok(index.total_lines())
}
