use std::sync::{Mutex, MutexGuard, PoisonError};

/// Routing collaborator: redirects by replacing the current history entry.
pub trait Navigator: Send + Sync {
    fn replace(&self, path: &str);
}

/// An in-memory history stack.
#[derive(Debug)]
pub struct HistoryNavigator {
    entries: Mutex<Vec<String>>,
}

impl HistoryNavigator {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(vec![initial.into()]),
        }
    }

    pub fn push(&self, path: &str) {
        self.lock().push(path.to_string());
    }

    /// The current location.
    pub fn location(&self) -> String {
        self.lock().last().cloned().unwrap_or_default()
    }

    /// Every entry still reachable with "back", oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for HistoryNavigator {
    fn replace(&self, path: &str) {
        let mut entries = self.lock();
        match entries.last_mut() {
            Some(current) => *current = path.to_string(),
            None => entries.push(path.to_string()),
        }
        tracing::debug!(to = path, "navigation replaced");
    }
}
