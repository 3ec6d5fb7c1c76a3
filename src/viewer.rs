//! Explicit lifecycle for the coordinators of the open viewers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ViewerConfig;
use crate::coordinator::{Notifier, ScrollSyncCoordinator, WindowFetch};

/// Last anchor line per session, kept across viewer re-creation.
#[derive(Debug, Default, Clone)]
pub struct AnchorStore {
    anchors: HashMap<String, u64>,
}

impl AnchorStore {
    pub fn get(&self, session_id: &str) -> Option<u64> {
        self.anchors.get(session_id).copied()
    }

    pub fn set(&mut self, session_id: &str, line: u64) {
        self.anchors.insert(session_id.to_string(), line);
    }

    pub fn remove(&mut self, session_id: &str) -> Option<u64> {
        self.anchors.remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

pub struct ViewerRegistry {
    config: ViewerConfig,
    notifier: Option<Arc<dyn Notifier>>,
    viewers: HashMap<String, ScrollSyncCoordinator>,
    anchors: AnchorStore,
}

impl ViewerRegistry {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            notifier: None,
            viewers: HashMap::new(),
            anchors: AnchorStore::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Creates the viewer for `session_id`, replacing any existing one, and
    /// returns its first window request. A session seen before resumes at
    /// its stored anchor.
    pub fn create(&mut self, session_id: &str) -> Option<WindowFetch> {
        self.destroy(session_id);

        let mut coordinator = ScrollSyncCoordinator::new(session_id, self.config.clone());
        if let Some(notifier) = &self.notifier {
            coordinator = coordinator.with_notifier(Arc::clone(notifier));
        }
        if let Some(anchor) = self.anchors.get(session_id) {
            log::debug!("{session_id}: resuming at line {anchor}");
            coordinator.restore_anchor(anchor);
        }
        let fetch = coordinator.initial_fetch();
        self.viewers.insert(session_id.to_string(), coordinator);
        fetch
    }

    pub fn get(&self, session_id: &str) -> Option<&ScrollSyncCoordinator> {
        self.viewers.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut ScrollSyncCoordinator> {
        self.viewers.get_mut(session_id)
    }

    /// Tears the viewer down, remembering where it was.
    pub fn destroy(&mut self, session_id: &str) -> bool {
        let Some(coordinator) = self.viewers.remove(session_id) else {
            return false;
        };
        if let Some(anchor) = coordinator.anchor_line() {
            self.anchors.set(session_id, anchor);
        }
        true
    }

    /// Drops the viewer and its stored anchor, e.g. when the session closes.
    pub fn forget(&mut self, session_id: &str) {
        self.viewers.remove(session_id);
        self.anchors.remove(session_id);
    }

    pub fn anchors(&self) -> &AnchorStore {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}
