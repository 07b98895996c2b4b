//! A value that is edited locally and only becomes authoritative once the
//! server accepts it.

use std::future::Future;

use crate::error::Result;

/// Last server-confirmed value plus the operator's pending edit.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedValue<T> {
    committed: T,
    staged: T,
}

impl<T: Clone + PartialEq> StagedValue<T> {
    pub fn new(committed: T) -> Self {
        Self {
            staged: committed.clone(),
            committed,
        }
    }

    pub fn committed(&self) -> &T {
        &self.committed
    }

    pub fn staged(&self) -> &T {
        &self.staged
    }

    pub fn is_dirty(&self) -> bool {
        self.staged != self.committed
    }

    pub fn stage(&mut self, value: T) {
        self.staged = value;
    }

    pub fn revert(&mut self) {
        self.staged = self.committed.clone();
    }

    /// Promotes the staged value.
    pub fn commit(&mut self) {
        self.committed = self.staged.clone();
    }

    /// Both sides take the fresh server value.
    pub fn reconcile(&mut self, fresh: T) {
        self.staged = fresh.clone();
        self.committed = fresh;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Viewing,
    Editing,
    Saving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing was staged; no request was made.
    Unchanged,
    Saved,
}

/// Drives one [`StagedValue`] through view, edit and save.
#[derive(Debug, Clone)]
pub struct StagedValueEditor<T> {
    value: StagedValue<T>,
    state: EditorState,
    error: Option<String>,
}

impl<T: Clone + PartialEq> StagedValueEditor<T> {
    pub fn new(committed: T) -> Self {
        Self {
            value: StagedValue::new(committed),
            state: EditorState::Viewing,
            error: None,
        }
    }

    pub fn value(&self) -> &StagedValue<T> {
        &self.value
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// What a view should render: the edit while editing, the confirmed
    /// value otherwise.
    pub fn displayed(&self) -> &T {
        match self.state {
            EditorState::Viewing => self.value.committed(),
            EditorState::Editing | EditorState::Saving => self.value.staged(),
        }
    }

    pub fn input(&mut self, value: T) {
        self.value.stage(value);
        self.state = EditorState::Editing;
        self.error = None;
    }

    pub fn cancel(&mut self) {
        self.value.revert();
        self.state = EditorState::Viewing;
        self.error = None;
    }

    /// Takes a value fetched from the server. Any pending edit is dropped.
    pub fn reconcile(&mut self, fresh: T) {
        self.value.reconcile(fresh);
        self.state = EditorState::Viewing;
    }

    /// Sends the staged value through `persist`.
    ///
    /// Without a pending edit this is a no-op. On success the staged value
    /// becomes committed. On failure the staged value is reverted, the editor
    /// stays in `Editing` and the error text is kept for display.
    pub async fn save<F, Fut, R>(&mut self, persist: F) -> Result<SaveOutcome>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if !self.value.is_dirty() {
            self.state = EditorState::Viewing;
            return Ok(SaveOutcome::Unchanged);
        }

        self.state = EditorState::Saving;
        self.error = None;
        let guard = SavingGuard { state: &mut self.state };
        let outcome = persist(self.value.staged().clone()).await;
        drop(guard);

        match outcome {
            Ok(_) => {
                self.value.commit();
                self.state = EditorState::Viewing;
                Ok(SaveOutcome::Saved)
            }
            Err(err) => {
                tracing::warn!("save rejected, reverting edit: {err}");
                self.value.revert();
                self.state = EditorState::Editing;
                self.error = Some(err.user_message());
                Err(err)
            }
        }
    }
}

/// Puts an abandoned save back into `Editing` with the edit intact.
struct SavingGuard<'a> {
    state: &'a mut EditorState,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        if *self.state == EditorState::Saving {
            *self.state = EditorState::Editing;
        }
    }
}
