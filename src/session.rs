//! Sessions and the registry that binds them to shared line indexes.
//!
//! One [`LineIndex`] exists per canonical file path and is shared by every
//! session opened on that file. Each index has its own `RwLock`, so extending
//! one file never blocks readers of another.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use crate::error::{LogWindowError, Result};
use crate::line_index::LineIndex;

pub type SharedIndex = Arc<RwLock<LineIndex>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Default, Clone)]
pub struct SessionState {
    pub highlight_keyword: Option<String>,
    pub last_anchor_line: Option<u64>,
    pub current_window: Option<LineRange>,
    pub total_lines: u64,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    index: SharedIndex,
    state: Mutex<SessionState>,
    loading: AtomicBool,
    last_used: Mutex<Instant>,
}

/// Held while a window computation runs; clears the loading flag on drop.
#[derive(Debug)]
pub struct LoadingGuard<'a> {
    session: &'a Session,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.session.loading.store(false, Ordering::Release);
    }
}

impl Session {
    fn new(id: String, index: SharedIndex, total_lines: u64) -> Self {
        Self {
            id,
            index,
            state: Mutex::new(SessionState {
                total_lines,
                ..SessionState::default()
            }),
            loading: AtomicBool::new(false),
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Claims the session for one window computation. A second claim while the
    /// first is outstanding is rejected rather than queued.
    pub fn begin_loading(&self) -> Result<LoadingGuard<'_>> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LogWindowError::Busy(self.id.clone()));
        }
        Ok(LoadingGuard { session: self })
    }

    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionState {
        self.state().clone()
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last = *self.last_used.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last)
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    sample_interval: u64,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    indexes: Mutex<HashMap<PathBuf, Weak<RwLock<LineIndex>>>>,
}

impl SessionRegistry {
    pub fn new(sample_interval: u64) -> Self {
        Self {
            sample_interval,
            sessions: RwLock::new(HashMap::new()),
            indexes: Mutex::new(HashMap::new()),
        }
    }

    /// Binds `session_id` to `path`, reusing the file's index when another
    /// session already has it open. Re-opening an existing id rebinds it.
    pub fn open(&self, session_id: &str, path: &Path) -> Result<Arc<Session>> {
        let canonical = path
            .canonicalize()
            .map_err(|e| LogWindowError::io(path, e))?;
        let index = self.index_for(&canonical)?;
        let total_lines = index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .total_lines();

        let session = Arc::new(Session::new(session_id.to_string(), index, total_lines));
        let previous = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), Arc::clone(&session));

        if previous.is_some() {
            log::info!("session {session_id} rebound to {}", canonical.display());
        } else {
            log::info!(
                "session {session_id} opened on {} ({total_lines} lines)",
                canonical.display()
            );
        }
        Ok(session)
    }

    /// The shared index for `canonical`. A live index is reused unless the
    /// file is now shorter than what it covers; then a fresh one replaces it
    /// for every session opened from here on. Building happens outside the
    /// registry lock so one large file never stalls opens of other files.
    fn index_for(&self, canonical: &Path) -> Result<SharedIndex> {
        let current_len = fs::metadata(canonical)
            .map_err(|e| LogWindowError::io(canonical, e))?
            .len();

        let stale = match self.live_index(canonical) {
            Some(existing) => {
                let indexed = existing
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .total_bytes();
                if current_len >= indexed {
                    return Ok(existing);
                }
                log::info!(
                    "{} shrank from {indexed} to {current_len} bytes, rebuilding its index",
                    canonical.display()
                );
                Some(existing)
            }
            None => None,
        };

        let built = Arc::new(RwLock::new(LineIndex::build(
            canonical,
            self.sample_interval,
        )?));

        let mut indexes = self.indexes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(raced) = indexes.get(canonical).and_then(Weak::upgrade) {
            let replaced = stale.as_ref().is_some_and(|old| Arc::ptr_eq(old, &raced));
            if !replaced {
                // Another open built it first; keep sharing that one.
                return Ok(raced);
            }
        }
        indexes.retain(|_, weak| weak.strong_count() > 0);
        indexes.insert(canonical.to_path_buf(), Arc::downgrade(&built));
        Ok(built)
    }

    fn live_index(&self, canonical: &Path) -> Option<SharedIndex> {
        self.indexes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(canonical)
            .and_then(Weak::upgrade)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| LogWindowError::SessionNotFound(session_id.to_string()))?;
        session.touch();
        Ok(session)
    }

    pub fn close(&self, session_id: &str) -> Result<()> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        match removed {
            Some(_) => {
                log::info!("session {session_id} closed");
                Ok(())
            }
            None => Err(LogWindowError::SessionNotFound(session_id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops sessions unused for longer than `max_idle`. Sessions with a window
    /// computation in flight are kept.
    pub fn reap_idle(&self, max_idle: Duration, now: Instant) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = session.is_loading() || session.idle_for(now) <= max_idle;
            if !keep {
                log::info!("session {id} expired after {:?} idle", session.idle_for(now));
            }
            keep
        });
        before - sessions.len()
    }
}
