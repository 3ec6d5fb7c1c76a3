//! Windowed access to very large, append-only log files.
//!
//! The server side indexes a file sparsely and answers bounded line-window
//! and keyword-search requests. The client side ([`coordinator`]) decides
//! when a viewer needs a new window and how to keep the line under the
//! user's eye fixed across the swap.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod line_index;
pub mod protocol;
pub mod search;
pub mod server;
pub mod service;
pub mod session;
pub mod viewer;
pub mod window;

pub use error::{LogWindowError, Result};
