//! Reset with a one-shot undo window.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Undo controller state.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoState<S> {
    Active,
    /// A reset happened and can still be reverted.
    PendingUndo { snapshot: S },
}

impl<S> Default for UndoState<S> {
    fn default() -> Self {
        UndoState::Active
    }
}

struct Inner<S> {
    state: UndoState<S>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Holds at most one pre-reset snapshot until undo, dismiss or timeout.
pub struct ResetUndo<S> {
    inner: Arc<Mutex<Inner<S>>>,
    window: Duration,
}

impl<S> ResetUndo<S>
where
    S: Clone + Send + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: UndoState::Active,
                generation: 0,
                timer: None,
            })),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm the undo window with `snapshot`.
    ///
    /// An already pending snapshot is replaced and the timer restarts.
    /// Must be called within a Tokio runtime.
    pub fn arm(&self, snapshot: S) {
        let Some(mut inner) = lock(&self.inner) else {
            return;
        };
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        inner.state = UndoState::PendingUndo { snapshot };

        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let window = self.window;
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(mut inner) = lock(&shared) {
                if inner.generation == generation {
                    inner.state = UndoState::Active;
                    inner.timer = None;
                    info!("Undo window expired");
                }
            }
        }));
        debug!(window_ms = self.window.as_millis() as u64, "Undo armed");
    }

    /// Take the pending snapshot back, if the window is still open.
    pub fn undo(&self) -> Option<S> {
        let mut inner = lock(&self.inner)?;
        let snapshot = match std::mem::replace(&mut inner.state, UndoState::Active) {
            UndoState::PendingUndo { snapshot } => snapshot,
            UndoState::Active => return None,
        };
        disarm(&mut inner);
        info!("Reset undone");
        Some(snapshot)
    }

    /// Discard the pending snapshot. Returns whether one was pending.
    pub fn dismiss(&self) -> bool {
        let Some(mut inner) = lock(&self.inner) else {
            return false;
        };
        let was_pending = matches!(inner.state, UndoState::PendingUndo { .. });
        inner.state = UndoState::Active;
        disarm(&mut inner);
        if was_pending {
            debug!("Undo dismissed");
        }
        was_pending
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner).is_some_and(|inner| matches!(inner.state, UndoState::PendingUndo { .. }))
    }

    pub fn state(&self) -> UndoState<S> {
        lock(&self.inner)
            .map(|inner| inner.state.clone())
            .unwrap_or(UndoState::Active)
    }
}

impl<S> Drop for ResetUndo<S> {
    fn drop(&mut self) {
        if let Some(mut inner) = lock(&self.inner) {
            disarm(&mut inner);
        }
    }
}

fn lock<S>(inner: &Mutex<Inner<S>>) -> Option<MutexGuard<'_, Inner<S>>> {
    inner.lock().ok()
}

fn disarm<S>(inner: &mut Inner<S>) {
    inner.generation += 1;
    if let Some(timer) = inner.timer.take() {
        timer.abort();
    }
}
