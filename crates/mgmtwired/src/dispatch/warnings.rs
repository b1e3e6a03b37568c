//! Request-scoped warning capture.

use std::sync::{Mutex, PoisonError};

/// Collects warnings raised while one request executes.
///
/// A capture is opened per request and closed by value, so its warnings can
/// only ever reach that request's response.
#[derive(Debug, Default)]
pub struct WarningsCapture {
    entries: Mutex<Vec<String>>,
}

impl WarningsCapture {
    pub(crate) fn open() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn add(&self, warning: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning.into());
    }

    pub(crate) fn close(self) -> Vec<String> {
        self.entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_returns_warnings_in_order() {
        let capture = WarningsCapture::open();
        capture.add("first");
        capture.add(String::from("second"));
        assert_eq!(capture.close(), vec!["first", "second"]);
    }
}
