//! Newline-delimited JSON messages exchanged between viewers and the server.
//!
//! Every request is one JSON object tagged by `op`; every reply carries a
//! `success` flag, and failures carry an `error` message instead of a payload.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::window::Window;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Request {
    OpenSession { session_id: String, path: PathBuf },
    CloseSession { session_id: String },
    GetLogWindow(WindowParams),
    SearchNext(SearchParams),
    SearchPrev(SearchParams),
    /// Fire-and-forget; the server never replies.
    ScrollDebug(ScrollDebug),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowParams {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_before: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub session_id: String,
    pub keyword: String,
    pub from_line: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollDebug {
    pub session_id: String,
    pub center_line: u64,
    pub window_start: u64,
    pub window_end: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_scroll_top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_top_in_doc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_px_in_pre: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_lines: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReply {
    pub success: bool,
    pub start_line: u64,
    pub end_line: u64,
    pub total_lines: u64,
    pub content: String,
    pub is_html: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl WindowReply {
    pub fn new(window: Window, request_id: Option<u64>) -> Self {
        Self {
            success: true,
            start_line: window.start_line,
            end_line: window.end_line,
            total_lines: window.total_lines,
            content: window.content,
            is_html: window.is_html,
            request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReply {
    pub success: bool,
    /// 0 when nothing matched.
    pub match_line: u64,
}

impl SearchReply {
    pub fn new(found: Option<u64>) -> Self {
        Self {
            success: true,
            match_line: found.unwrap_or(0),
        }
    }

    pub fn found(&self) -> Option<u64> {
        (self.match_line >= 1).then_some(self.match_line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReply {
    pub success: bool,
    pub session_id: String,
    pub total_lines: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub error: String,
}

impl Failure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Window(WindowReply),
    Search(SearchReply),
    Session(SessionReply),
    Ack(Ack),
    Failure(Failure),
}

impl Response {
    pub fn ack() -> Self {
        Self::Ack(Ack { success: true })
    }
}
