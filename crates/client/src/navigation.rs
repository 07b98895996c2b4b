use std::sync::{Mutex, PoisonError};

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";
pub const ADMIN_PATH: &str = "/admin";

/// Location of one browsing context.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    /// Client-side navigation; view state survives.
    fn push(&self, path: &str);
    /// Full reload onto `path`; every in-memory view state is dropped.
    fn reload(&self, path: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Push(String),
    Reload(String),
}

impl Navigation {
    pub fn path(&self) -> &str {
        match self {
            Self::Push(path) | Self::Reload(path) => path,
        }
    }
}

/// In-memory [`Navigator`] that keeps every navigation it performed.
#[derive(Debug)]
pub struct RecordingNavigator {
    state: Mutex<NavigatorState>,
}

#[derive(Debug)]
struct NavigatorState {
    path: String,
    history: Vec<Navigation>,
}

impl RecordingNavigator {
    pub fn new(initial_path: &str) -> Self {
        Self {
            state: Mutex::new(NavigatorState {
                path: initial_path.to_string(),
                history: Vec::new(),
            }),
        }
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    pub fn reloads(&self) -> usize {
        self.history()
            .iter()
            .filter(|nav| matches!(nav, Navigation::Reload(_)))
            .count()
    }

    fn record(&self, navigation: Navigation) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.path = navigation.path().to_string();
        state.history.push(navigation);
    }
}

impl Default for RecordingNavigator {
    fn default() -> Self {
        Self::new(HOME_PATH)
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .path
            .clone()
    }

    fn push(&self, path: &str) {
        self.record(Navigation::Push(path.to_string()));
    }

    fn reload(&self, path: &str) {
        self.record(Navigation::Reload(path.to_string()));
    }
}
