//! Priority-filtered logging with per-instance deduplication.
//!
//! A [`Logger`] is handed to each component that reports progress. Messages
//! are forwarded to the [`log`] facade; `once` remembers what it has already
//! said for the lifetime of that logger only.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

/// Logger with a priority threshold and its own "already said" cache.
///
/// Priority 0 is the most important. A message is emitted when its priority
/// is less than or equal to the logger's threshold.
#[derive(Debug, Default)]
pub struct Logger {
    priority: Cell<u8>,
    seen: RefCell<HashSet<String>>,
}

impl Logger {
    /// Creates a logger that emits messages up to `priority`.
    pub fn new(priority: u8) -> Self {
        Self {
            priority: Cell::new(priority),
            seen: RefCell::new(HashSet::new()),
        }
    }

    /// Returns the current priority threshold.
    pub fn priority(&self) -> u8 {
        self.priority.get()
    }

    /// Sets the priority threshold.
    pub fn set_priority(&self, priority: u8) {
        self.priority.set(priority);
    }

    /// Returns true if a message of this priority would be emitted.
    pub fn enabled(&self, priority: u8) -> bool {
        priority <= self.priority.get()
    }

    /// Emits a message if its priority passes the threshold.
    pub fn log(&self, priority: u8, message: &str) {
        if !self.enabled(priority) {
            return;
        }
        match priority {
            0 => log::warn!("{message}"),
            1 => log::info!("{message}"),
            2 => log::debug!("{message}"),
            _ => log::trace!("{message}"),
        }
    }

    /// Emits a message the first time it is seen by this logger.
    ///
    /// Returns true if the message had not been seen before.
    pub fn once(&self, priority: u8, message: &str) -> bool {
        let first = self.seen.borrow_mut().insert(message.to_string());
        if first {
            self.log(priority, message);
        }
        first
    }

    /// Forgets all messages recorded by [`Logger::once`].
    pub fn reset_once(&self) {
        self.seen.borrow_mut().clear();
    }
}
