//! Client-side scroll synchronisation for one viewer.
//!
//! The coordinator never performs IO. The host feeds it scroll measurements
//! and window replies; it answers with the window to fetch next and the scroll
//! offset that keeps the anchor line where the user last saw it.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ViewerConfig;
use crate::debounce::Debouncer;
use crate::protocol::{ScrollDebug, WindowParams, WindowReply};
use crate::session::LineRange;
use crate::window::{anchor_range, clamp_range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorMode {
    /// Anchor line lands in the vertical middle of the viewport.
    Center,
    /// Anchor line lands on the first visible row.
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Non-blocking user notification channel (toasts, status bar, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, level: NotifyLevel);
}

/// Measurements of the scroll container, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f64,
    /// Offset of the first loaded line within the scroll container.
    pub content_top: f64,
    pub viewport_height: f64,
    pub content_height: f64,
    /// `None` when the host could not measure it.
    pub line_height: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jump {
    Line(u64),
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFetch {
    pub request_id: u64,
    pub range: LineRange,
    pub center_line: u64,
    /// Position of the anchor within the previous window, 0.0..=1.0.
    pub ratio: f64,
    pub mode: AnchorMode,
    pub placement_line: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTarget {
    pub scroll_top: f64,
    pub line: u64,
    pub mode: AnchorMode,
}

#[derive(Debug, Default, PartialEq)]
pub struct ResponseOutcome {
    pub scroll: Option<ScrollTarget>,
    /// A jump that was deferred while the answered request was in flight.
    pub next: Option<WindowFetch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorState {
    pub session_id: String,
    pub window: Option<LineRange>,
    pub total_lines: u64,
    pub anchor_line: Option<u64>,
    pub is_loading: bool,
    pub highlight_keyword: Option<String>,
}

pub struct ScrollSyncCoordinator {
    session_id: String,
    config: ViewerConfig,
    window: Option<LineRange>,
    total_lines: u64,
    anchor_line: Option<u64>,
    viewport: Option<Viewport>,
    debouncer: Debouncer,
    in_flight: Option<WindowFetch>,
    next_request_id: u64,
    pending_jump: Option<Jump>,
    highlight_keyword: Option<String>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ScrollSyncCoordinator {
    pub fn new(session_id: impl Into<String>, config: ViewerConfig) -> Self {
        Self {
            session_id: session_id.into(),
            debouncer: Debouncer::new(config.debounce()),
            config,
            window: None,
            total_lines: 0,
            anchor_line: None,
            viewport: None,
            in_flight: None,
            next_request_id: 0,
            pending_jump: None,
            highlight_keyword: None,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Seeds the anchor of a viewer that is being re-created.
    pub fn restore_anchor(&mut self, line: u64) {
        self.anchor_line = Some(line.max(1));
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn anchor_line(&self) -> Option<u64> {
        self.anchor_line
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn state(&self) -> CoordinatorState {
        CoordinatorState {
            session_id: self.session_id.clone(),
            window: self.window,
            total_lines: self.total_lines,
            anchor_line: self.anchor_line,
            is_loading: self.is_loading(),
            highlight_keyword: self.highlight_keyword.clone(),
        }
    }

    pub fn set_highlight_keyword(&mut self, keyword: Option<String>) {
        self.highlight_keyword = keyword.filter(|k| !k.is_empty());
    }

    fn known_total(&self) -> Option<u64> {
        (self.total_lines > 0).then_some(self.total_lines)
    }

    fn line_height(&self, viewport: &Viewport) -> f64 {
        viewport
            .line_height
            .filter(|h| h.is_finite() && *h > 0.0)
            .unwrap_or(self.config.fallback_line_height)
    }

    /// The first window for this viewer: the restored anchor centered if there
    /// is one, otherwise line 1 pinned to the top.
    pub fn initial_fetch(&mut self) -> Option<WindowFetch> {
        match self.anchor_line {
            Some(anchor) => self.jump(Jump::Line(anchor)),
            None => self.jump(Jump::Top),
        }
    }

    /// Explicit navigation. Always allowed, even when the whole file is
    /// loaded; deferred until the outstanding response lands if one is in
    /// flight.
    pub fn jump(&mut self, jump: Jump) -> Option<WindowFetch> {
        if self.in_flight.is_some() {
            log::debug!("{}: deferring {jump:?} until the pending window lands", self.session_id);
            self.pending_jump = Some(jump);
            return None;
        }

        let total = self.known_total();
        let size = self.config.window_size.max(1);
        let (range, line, mode) = match jump {
            Jump::Top => (
                LineRange {
                    start: 1,
                    end: size,
                },
                1,
                AnchorMode::Top,
            ),
            Jump::Bottom => {
                let Some(total) = total else {
                    log::debug!("{}: bottom unknown before the first window", self.session_id);
                    return None;
                };
                (
                    LineRange {
                        start: total.saturating_sub(size - 1).max(1),
                        end: total,
                    },
                    total,
                    AnchorMode::Center,
                )
            }
            Jump::Line(line) => {
                let line = match total {
                    Some(total) => line.clamp(1, total),
                    None => line.max(1),
                };
                let range = anchor_range(
                    line,
                    self.config.lines_before,
                    self.config.lines_after,
                    total,
                );
                (range, line, AnchorMode::Center)
            }
        };
        let range = clamp_range(range.start, range.end, total).unwrap_or(range);

        // The jump decides the next window; a pending scroll evaluation would
        // only measure the viewport it is about to replace.
        self.debouncer.cancel();
        Some(self.issue(range, line, span_ratio(line, range), mode, line))
    }

    pub fn jump_to_line(&mut self, line: u64) -> Option<WindowFetch> {
        self.jump(Jump::Line(line))
    }

    pub fn jump_to_top(&mut self) -> Option<WindowFetch> {
        self.jump(Jump::Top)
    }

    pub fn jump_to_bottom(&mut self) -> Option<WindowFetch> {
        self.jump(Jump::Bottom)
    }

    /// Re-requests the window around the anchor, picking up appended lines.
    pub fn refresh(&mut self) -> Option<WindowFetch> {
        self.jump(Jump::Line(self.anchor_line.unwrap_or(1)))
    }

    fn issue(
        &mut self,
        range: LineRange,
        center_line: u64,
        ratio: f64,
        mode: AnchorMode,
        placement_line: u64,
    ) -> WindowFetch {
        self.next_request_id += 1;
        let fetch = WindowFetch {
            request_id: self.next_request_id,
            range,
            center_line,
            ratio,
            mode,
            placement_line,
        };
        log::debug!(
            "{}: request #{} for {}..={} around {center_line} ({mode:?})",
            self.session_id,
            fetch.request_id,
            range.start,
            range.end
        );
        self.in_flight = Some(fetch.clone());
        fetch
    }

    /// Wire parameters for `fetch`.
    pub fn params(&self, fetch: &WindowFetch) -> WindowParams {
        WindowParams {
            session_id: self.session_id.clone(),
            start_line: Some(fetch.range.start),
            end_line: Some(fetch.range.end),
            center_line: Some(fetch.center_line),
            // An empty keyword clears the server-side highlight.
            highlight_keyword: Some(self.highlight_keyword.clone().unwrap_or_default()),
            request_id: Some(fetch.request_id),
            ..WindowParams::default()
        }
    }

    /// Records a raw scroll tick. The anchor is tracked immediately; the
    /// swap decision waits for the quiet period.
    pub fn on_scroll(&mut self, now: Instant, viewport: Viewport) {
        self.viewport = Some(viewport);
        if let Some(anchor) = self.compute_anchor(&viewport) {
            self.anchor_line = Some(anchor);
        }
        self.debouncer.schedule(now);
    }

    /// When the host should call [`poll`](Self::poll) next, if at all.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Runs the debounced evaluation if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<WindowFetch> {
        if !self.debouncer.fire(now) {
            return None;
        }
        self.evaluate()
    }

    fn compute_anchor(&self, viewport: &Viewport) -> Option<u64> {
        let window = self.window?;
        let lh = self.line_height(viewport);
        let top_px = (viewport.scroll_top - viewport.content_top).max(0.0);
        let visible = ((viewport.viewport_height / lh).floor() as u64).max(1);
        let top_line = (top_px / lh).floor() as u64 + 1;
        Some((window.start + top_line + visible / 2 - 1).min(window.end))
    }

    fn is_fully_loaded(&self) -> bool {
        match self.window {
            Some(window) => self.total_lines > 0 && window.end - window.start + 1 >= self.total_lines,
            None => false,
        }
    }

    fn evaluate(&mut self) -> Option<WindowFetch> {
        let window = self.window?;
        let viewport = self.viewport?;
        let anchor = self.compute_anchor(&viewport)?;
        self.anchor_line = Some(anchor);

        if viewport.content_height <= viewport.viewport_height || self.is_fully_loaded() {
            return None;
        }

        let loaded = window.end - window.start + 1;
        let margin = self.config.prefetch_threshold.min(loaded / 3);
        let near_bottom = anchor > window.end.saturating_sub(margin);
        let near_top = anchor < window.start + margin && window.start > 1;
        if !near_bottom && !near_top {
            return None;
        }
        if self.in_flight.is_some() {
            log::debug!("{}: window in flight, skipping swap at {anchor}", self.session_id);
            return None;
        }

        let lh = self.line_height(&viewport);
        let top_px = (viewport.scroll_top - viewport.content_top).max(0.0);
        let (mode, placement) = if top_px < lh {
            (AnchorMode::Top, window.start + (top_px / lh).floor() as u64)
        } else {
            (AnchorMode::Center, anchor)
        };
        // Left open at the end: the server clamps, and lines appended since
        // the last reply come back with it.
        let range = anchor_range(anchor, self.config.lines_before, self.config.lines_after, None);
        let ratio = span_ratio(anchor, window);
        Some(self.issue(range, anchor, ratio, mode, placement))
    }

    /// Applies the reply to request `request_id`. Replies to anything but the
    /// latest request are dropped.
    pub fn on_response<E: Display>(
        &mut self,
        request_id: u64,
        reply: Result<WindowReply, E>,
    ) -> ResponseOutcome {
        let Some(fetch) = self.in_flight.take_if(|f| f.request_id == request_id) else {
            log::debug!("{}: dropping stale reply #{request_id}", self.session_id);
            return ResponseOutcome::default();
        };

        let scroll = match reply {
            Ok(reply) => self.apply(&fetch, reply),
            Err(err) => {
                log::warn!("{}: window request failed: {err}", self.session_id);
                if let Some(notifier) = &self.notifier {
                    notifier.notify(&format!("Failed to load log lines: {err}"), NotifyLevel::Error);
                }
                None
            }
        };
        let next = self.pending_jump.take().and_then(|jump| self.jump(jump));
        ResponseOutcome { scroll, next }
    }

    fn apply(&mut self, fetch: &WindowFetch, reply: WindowReply) -> Option<ScrollTarget> {
        if !reply.success {
            log::warn!("{}: server refused window #{}", self.session_id, fetch.request_id);
            return None;
        }
        if reply.total_lines == 0 {
            self.window = None;
            self.total_lines = 0;
            return None;
        }
        if reply.start_line == 0
            || reply.end_line < reply.start_line
            || reply.end_line > reply.total_lines
        {
            log::warn!(
                "{}: ignoring malformed window {}..={} of {}",
                self.session_id,
                reply.start_line,
                reply.end_line,
                reply.total_lines
            );
            return None;
        }

        let (start, end) = (reply.start_line, reply.end_line);
        self.window = Some(LineRange { start, end });
        self.total_lines = reply.total_lines;

        let line = if (start..=end).contains(&fetch.placement_line) {
            fetch.placement_line
        } else {
            // Exact anchor is gone (file boundary moved); keep the relative spot.
            start + (fetch.ratio.clamp(0.0, 1.0) * (end - start) as f64).round() as u64
        };
        self.anchor_line = Some(line);

        let viewport = self.viewport.unwrap_or_default();
        let lh = self.line_height(&viewport);
        let mut offset = (line - start) as f64 * lh;
        if fetch.mode == AnchorMode::Center {
            offset -= viewport.viewport_height / 2.0 - lh / 2.0;
        }
        Some(ScrollTarget {
            scroll_top: (viewport.content_top + offset).max(0.0),
            line,
            mode: fetch.mode,
        })
    }

    /// Telemetry for the last evaluated position.
    pub fn scroll_debug(&self) -> Option<ScrollDebug> {
        let window = self.window?;
        let viewport = self.viewport?;
        let lh = self.line_height(&viewport);
        Some(ScrollDebug {
            session_id: self.session_id.clone(),
            center_line: self.anchor_line?,
            window_start: window.start,
            window_end: window.end,
            doc_scroll_top: Some(viewport.scroll_top),
            pre_top_in_doc: Some(viewport.content_top),
            top_px_in_pre: Some((viewport.scroll_top - viewport.content_top).max(0.0)),
            visible_lines: Some(((viewport.viewport_height / lh).floor() as u64).max(1)),
            line_height: Some(lh),
        })
    }
}

fn span_ratio(line: u64, range: LineRange) -> f64 {
    if range.end > range.start {
        line.saturating_sub(range.start) as f64 / (range.end - range.start) as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    const LH: f64 = 20.0;
    const VH: f64 = 400.0;

    fn reply(start: u64, end: u64, total: u64) -> Result<WindowReply, String> {
        Ok(WindowReply {
            success: true,
            start_line: start,
            end_line: end,
            total_lines: total,
            content: String::new(),
            is_html: false,
            request_id: None,
        })
    }

    /// Viewport whose centered line is `anchor` for a window starting at `start`.
    fn viewport_centered_on(anchor: u64, start: u64, loaded: u64) -> Viewport {
        let visible_half = (VH / LH) as u64 / 2;
        let top_line = anchor - start + 1 - visible_half;
        Viewport {
            scroll_top: (top_line - 1) as f64 * LH,
            content_top: 0.0,
            viewport_height: VH,
            content_height: loaded as f64 * LH,
            line_height: Some(LH),
        }
    }

    fn loaded(start: u64, end: u64, total: u64) -> ScrollSyncCoordinator {
        let mut coordinator = ScrollSyncCoordinator::new("s", ViewerConfig::default());
        let fetch = coordinator.initial_fetch().unwrap();
        coordinator.on_response(fetch.request_id, reply(start, end, total));
        coordinator
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, NotifyLevel)>>);

    impl Notifier for Recorder {
        fn notify(&self, message: &str, level: NotifyLevel) {
            self.0.lock().unwrap().push((message.to_string(), level));
        }
    }

    #[test]
    fn first_view_pins_line_one_to_the_top() {
        let mut coordinator = ScrollSyncCoordinator::new("fresh", ViewerConfig::default());
        let fetch = coordinator.initial_fetch().unwrap();
        assert_eq!(fetch.range, LineRange { start: 1, end: 500 });
        assert_eq!(fetch.mode, AnchorMode::Top);
        assert_eq!(fetch.placement_line, 1);

        coordinator.on_scroll(
            Instant::now(),
            Viewport {
                content_top: 40.0,
                viewport_height: VH,
                ..Viewport::default()
            },
        );
        let outcome = coordinator.on_response(fetch.request_id, reply(1, 500, 10_000));
        let target = outcome.scroll.unwrap();
        assert_eq!(target.mode, AnchorMode::Top);
        assert_eq!(target.line, 1);
        assert_eq!(target.scroll_top, 40.0);
        assert_eq!(
            coordinator.state().window,
            Some(LineRange { start: 1, end: 500 })
        );
    }

    #[test]
    fn crossing_the_bottom_margin_recenters_on_the_anchor() {
        let mut coordinator = loaded(1, 500, 10_000);
        let t0 = Instant::now();
        let viewport = viewport_centered_on(450, 1, 500);
        coordinator.on_scroll(t0, viewport);
        assert_eq!(coordinator.anchor_line(), Some(450));
        assert_eq!(coordinator.poll(t0), None);

        let fetch = coordinator.poll(t0 + Duration::from_millis(150)).unwrap();
        assert_eq!(fetch.range, LineRange { start: 200, end: 699 });
        assert_eq!(fetch.center_line, 450);
        assert_eq!(fetch.mode, AnchorMode::Center);
        assert!((fetch.ratio - 449.0 / 499.0).abs() < 1e-9);

        let target = coordinator
            .on_response(fetch.request_id, reply(200, 699, 10_000))
            .scroll
            .unwrap();
        let line_top_in_viewport = (450 - 200) as f64 * LH - target.scroll_top;
        let line_center = line_top_in_viewport + LH / 2.0;
        assert!((line_center - VH / 2.0).abs() <= LH);
        assert_eq!(target.scroll_top, 4810.0);
    }

    #[test]
    fn scroll_schedules_a_poll_and_a_jump_cancels_it() {
        let mut coordinator = loaded(1, 500, 10_000);
        let t0 = Instant::now();
        assert_eq!(coordinator.next_deadline(), None);

        coordinator.on_scroll(t0, viewport_centered_on(450, 1, 500));
        assert_eq!(coordinator.next_deadline(), Some(t0 + Duration::from_millis(120)));

        assert!(coordinator.jump_to_line(3000).is_some());
        assert_eq!(coordinator.next_deadline(), None);
        assert_eq!(coordinator.poll(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn only_one_window_request_is_outstanding() {
        let mut coordinator = loaded(1, 500, 10_000);
        let t0 = Instant::now();
        coordinator.on_scroll(t0, viewport_centered_on(450, 1, 500));
        let first = coordinator.poll(t0 + Duration::from_millis(150));
        assert!(first.is_some());

        let t1 = t0 + Duration::from_millis(200);
        coordinator.on_scroll(t1, viewport_centered_on(480, 1, 500));
        assert_eq!(coordinator.anchor_line(), Some(480));
        assert_eq!(coordinator.poll(t1 + Duration::from_millis(150)), None);
        assert!(coordinator.state().is_loading);
    }

    #[test]
    fn pinned_to_the_top_uses_top_mode() {
        let mut coordinator = loaded(501, 1000, 10_000);
        let t0 = Instant::now();
        coordinator.on_scroll(
            t0,
            Viewport {
                scroll_top: 0.0,
                content_top: 0.0,
                viewport_height: VH,
                content_height: 500.0 * LH,
                line_height: Some(LH),
            },
        );
        let fetch = coordinator.poll(t0 + Duration::from_millis(150)).unwrap();
        assert_eq!(fetch.range, LineRange { start: 261, end: 760 });
        assert_eq!(fetch.mode, AnchorMode::Top);
        assert_eq!(fetch.placement_line, 501);

        let target = coordinator
            .on_response(fetch.request_id, reply(261, 760, 10_000))
            .scroll
            .unwrap();
        assert_eq!(target.scroll_top, 240.0 * LH);
    }

    #[test]
    fn fully_loaded_or_unscrollable_content_never_swaps() {
        let mut coordinator = loaded(1, 100, 100);
        let t0 = Instant::now();
        coordinator.on_scroll(t0, viewport_centered_on(95, 1, 100));
        assert_eq!(coordinator.poll(t0 + Duration::from_secs(1)), None);

        let mut coordinator = loaded(1, 500, 10_000);
        let mut viewport = viewport_centered_on(450, 1, 500);
        viewport.content_height = VH;
        coordinator.on_scroll(t0, viewport);
        assert_eq!(coordinator.poll(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn last_window_keeps_asking_for_appended_lines() {
        let mut coordinator = loaded(9501, 10_000, 10_000);
        let t0 = Instant::now();
        coordinator.on_scroll(t0, viewport_centered_on(9990, 9501, 500));
        let fetch = coordinator.poll(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(fetch.range, LineRange { start: 9740, end: 10_239 });
        assert_eq!(fetch.center_line, 9990);

        let target = coordinator
            .on_response(fetch.request_id, reply(9740, 10_050, 10_050))
            .scroll
            .unwrap();
        assert_eq!(target.line, 9990);
        assert_eq!(coordinator.state().total_lines, 10_050);
        assert_eq!(
            coordinator.state().window,
            Some(LineRange { start: 9740, end: 10_050 })
        );
    }

    #[test]
    fn explicit_jumps_work_when_no_prefetch_is_needed() {
        let mut coordinator = loaded(1, 100, 100);
        let fetch = coordinator.jump_to_top().unwrap();
        assert_eq!(fetch.range, LineRange { start: 1, end: 100 });
        coordinator.on_response(fetch.request_id, reply(1, 100, 100));

        let fetch = coordinator.jump_to_bottom().unwrap();
        assert_eq!(fetch.range, LineRange { start: 1, end: 100 });
        assert_eq!(fetch.placement_line, 100);
    }

    #[test]
    fn jump_to_bottom_loads_the_tail() {
        let mut coordinator = loaded(1, 500, 10_000);
        let fetch = coordinator.jump_to_bottom().unwrap();
        assert_eq!(fetch.range, LineRange { start: 9501, end: 10_000 });
        assert_eq!(fetch.placement_line, 10_000);
    }

    #[test]
    fn stale_replies_are_ignored() {
        let mut coordinator = ScrollSyncCoordinator::new("s", ViewerConfig::default());
        let fetch = coordinator.initial_fetch().unwrap();
        let outcome = coordinator.on_response(fetch.request_id + 7, reply(1, 500, 900));
        assert_eq!(outcome, ResponseOutcome::default());
        assert!(coordinator.is_loading());
        assert_eq!(coordinator.state().window, None);
    }

    #[test]
    fn network_failure_notifies_and_returns_to_idle() {
        let recorder = Arc::new(Recorder::default());
        let mut coordinator = ScrollSyncCoordinator::new("s", ViewerConfig::default())
            .with_notifier(recorder.clone());
        let fetch = coordinator.initial_fetch().unwrap();

        let outcome =
            coordinator.on_response::<&str>(fetch.request_id, Err("connection refused"));
        assert_eq!(outcome.scroll, None);
        assert!(!coordinator.is_loading());

        let notes = recorder.0.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].1, NotifyLevel::Error);
        assert!(notes[0].0.contains("connection refused"));
    }

    #[test]
    fn jump_during_load_is_issued_after_the_reply() {
        let mut coordinator = ScrollSyncCoordinator::new("s", ViewerConfig::default());
        let fetch = coordinator.initial_fetch().unwrap();
        assert_eq!(coordinator.jump_to_line(6010), None);

        let outcome = coordinator.on_response(fetch.request_id, reply(1, 500, 10_000));
        let next = outcome.next.unwrap();
        assert_eq!(next.center_line, 6010);
        assert_eq!(next.range, LineRange { start: 5760, end: 6259 });
        assert!(coordinator.is_loading());
    }

    #[test]
    fn ratio_fallback_when_the_anchor_falls_outside_the_reply() {
        let mut coordinator = loaded(1, 500, 10_000);
        let t0 = Instant::now();
        coordinator.on_scroll(t0, viewport_centered_on(450, 1, 500));
        let fetch = coordinator.poll(t0 + Duration::from_millis(150)).unwrap();

        // The file was replaced by a shorter one in the meantime.
        let target = coordinator
            .on_response(fetch.request_id, reply(1, 300, 300))
            .scroll
            .unwrap();
        let expected = 1 + (fetch.ratio * 299.0).round() as u64;
        assert_eq!(target.line, expected);
    }

    #[test]
    fn malformed_reply_is_a_no_op() {
        let mut coordinator = loaded(1, 500, 10_000);
        let fetch = coordinator.jump_to_line(2000).unwrap();
        let outcome = coordinator.on_response(fetch.request_id, reply(0, 10, 10_000));
        assert_eq!(outcome.scroll, None);
        assert_eq!(
            coordinator.state().window,
            Some(LineRange { start: 1, end: 500 })
        );
        assert!(!coordinator.is_loading());
    }

    #[test]
    fn unmeasurable_line_height_falls_back() {
        let mut coordinator = loaded(1, 500, 10_000);
        coordinator.on_scroll(
            Instant::now(),
            Viewport {
                scroll_top: 160.0,
                content_top: 0.0,
                viewport_height: 320.0,
                content_height: 8000.0,
                line_height: Some(f64::NAN),
            },
        );
        // 16px fallback: top row 11 of the window, 20 rows visible.
        assert_eq!(coordinator.anchor_line(), Some(21));
        assert_eq!(coordinator.scroll_debug().unwrap().line_height, Some(16.0));
    }

    #[test]
    fn params_carry_anchor_and_keyword() {
        let mut coordinator = ScrollSyncCoordinator::new("abc", ViewerConfig::default());
        coordinator.set_highlight_keyword(Some("ERROR".into()));
        let fetch = coordinator.initial_fetch().unwrap();
        let params = coordinator.params(&fetch);
        assert_eq!(params.session_id, "abc");
        assert_eq!((params.start_line, params.end_line), (Some(1), Some(500)));
        assert_eq!(params.center_line, Some(1));
        assert_eq!(params.highlight_keyword.as_deref(), Some("ERROR"));
        assert_eq!(params.request_id, Some(fetch.request_id));

        coordinator.set_highlight_keyword(None);
        assert_eq!(coordinator.params(&fetch).highlight_keyword.as_deref(), Some(""));
    }
}
