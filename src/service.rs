//! Request dispatch. Every failure becomes a `success:false` reply here; nothing
//! propagates past this boundary.

use std::sync::PoisonError;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::error::{LogWindowError, Result};
use crate::protocol::{
    Failure, Request, Response, ScrollDebug, SearchParams, SearchReply, SessionReply,
    WindowParams, WindowReply,
};
use crate::search::{Direction, SearchEngine};
use crate::session::SessionRegistry;
use crate::window::{Highlighter, Passthrough, WindowQuery, WindowResolver, refresh_index};

pub struct LogWindowService {
    config: ServerConfig,
    registry: SessionRegistry,
    resolver: WindowResolver<Box<dyn Highlighter>>,
    search: SearchEngine,
}

impl LogWindowService {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_highlighter(config, Box::new(Passthrough))
    }

    pub fn with_highlighter(config: ServerConfig, highlighter: Box<dyn Highlighter>) -> Self {
        Self {
            registry: SessionRegistry::new(config.sample_interval),
            resolver: WindowResolver::with_highlighter(config.max_window_lines, highlighter),
            search: SearchEngine::new(config.search_case_sensitive),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Parses and handles one request line. `None` for fire-and-forget ops.
    pub fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request)?,
            Err(err) => {
                log::warn!("rejecting malformed request: {err}");
                Response::Failure(Failure::new(
                    LogWindowError::InvalidRequest(err.to_string()).to_string(),
                ))
            }
        };
        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(err) => {
                log::error!("failed to encode response: {err}");
                Some(r#"{"success":false,"error":"failed to encode response"}"#.to_string())
            }
        }
    }

    pub fn handle(&self, request: Request) -> Option<Response> {
        let result = match request {
            Request::OpenSession { session_id, path } => self
                .registry
                .open(&session_id, &path)
                .map(|session| {
                    Response::Session(SessionReply {
                        success: true,
                        total_lines: session.snapshot().total_lines,
                        session_id,
                    })
                }),
            Request::CloseSession { session_id } => {
                self.registry.close(&session_id).map(|()| Response::ack())
            }
            Request::GetLogWindow(params) => self.get_window(params).map(Response::Window),
            Request::SearchNext(params) => self
                .search(params, Direction::Forward)
                .map(Response::Search),
            Request::SearchPrev(params) => self
                .search(params, Direction::Backward)
                .map(Response::Search),
            Request::ScrollDebug(debug) => {
                log_scroll_debug(&debug);
                return None;
            }
        };

        Some(result.unwrap_or_else(|err| {
            match &err {
                LogWindowError::Busy(_) | LogWindowError::SessionNotFound(_) => {
                    log::debug!("request refused: {err}")
                }
                _ => log::warn!("request failed: {err}"),
            }
            Response::Failure(Failure::new(err.to_string()))
        }))
    }

    fn get_window(&self, params: WindowParams) -> Result<WindowReply> {
        let session = self.registry.get(&params.session_id)?;
        let (default_before, default_after) = self.config.default_span();
        let span = default_before + default_after;

        let query = match (params.start_line, params.end_line, params.center_line) {
            (Some(start), Some(end), _) => WindowQuery::Range { start, end },
            (_, _, Some(line)) => WindowQuery::Anchor {
                line,
                before: params.lines_before.unwrap_or(default_before),
                after: params.lines_after.unwrap_or(default_after),
            },
            (Some(start), None, None) => WindowQuery::Range {
                start,
                end: start.saturating_add(span),
            },
            (None, Some(end), None) => WindowQuery::Range {
                start: end.saturating_sub(span),
                end,
            },
            (None, None, None) => {
                return Err(LogWindowError::InvalidRange(
                    "request needs start_line/end_line or center_line".into(),
                ));
            }
        };

        let window = self.resolver.resolve(
            &session,
            query,
            params.center_line,
            params.highlight_keyword,
        )?;
        Ok(WindowReply::new(window, params.request_id))
    }

    fn search(&self, params: SearchParams, direction: Direction) -> Result<SearchReply> {
        let session = self.registry.get(&params.session_id)?;
        refresh_index(session.index())?;
        let index = session
            .index()
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let found = self
            .search
            .search(&index, &params.keyword, params.from_line, direction)?;
        Ok(SearchReply::new(found))
    }

    /// Applies the configured idle policy; a no-op without a timeout.
    pub fn reap_idle(&self, now: Instant) -> usize {
        match self.config.session_idle_timeout() {
            Some(timeout) => self.registry.reap_idle(timeout, now),
            None => 0,
        }
    }
}

fn log_scroll_debug(debug: &ScrollDebug) {
    log::debug!(
        "scroll {}: center {} in {}..={} (scroll_top {:?}, top_px {:?}, visible {:?}, line_height {:?})",
        debug.session_id,
        debug.center_line,
        debug.window_start,
        debug.window_end,
        debug.doc_scroll_top,
        debug.top_px_in_pre,
        debug.visible_lines,
        debug.line_height
    );
}
