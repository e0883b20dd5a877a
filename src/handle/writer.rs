use std::fmt;
use std::sync::Arc;

use crate::error::{RepoError, Result};
use crate::state::{State, StateKey};

/// The single capability to change a state's value.
///
/// At most one registered writer exists per state. Unregistering is
/// permanent: a `Writer` cannot register again, a new one has to be requested
/// from the registry. Dropping a registered writer unregisters it.
///
/// # Examples
///
/// ```
/// use staterepo::{RepoError, StateRepo};
///
/// let repo = StateRepo::new();
/// let writer = repo.writer("title", Some(String::from("draft"))).unwrap();
///
/// assert!(matches!(
///     repo.writer::<String>("title", None),
///     Err(RepoError::WriterConflict { .. })
/// ));
///
/// writer.set(|title| format!("{} v2", title.map(String::as_str).unwrap_or("")));
/// assert_eq!(writer.value().as_deref().map(String::as_str), Some("draft v2"));
///
/// assert!(writer.unregister());
/// assert!(repo.writer::<String>("title", None).is_ok());
/// ```
#[must_use = "dropping a Writer releases the writer slot"]
pub struct Writer<T, K = String> {
    token: u64,
    state: Arc<State<T, K>>,
}

impl<T, K> Writer<T, K> {
    /// Id of the written state.
    pub fn id(&self) -> &K {
        self.state.id()
    }

    /// Current value of the state, `None` until the first write.
    pub fn value(&self) -> Option<Arc<T>> {
        self.state.value()
    }

    /// Read the current value with a function.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        self.state.with(f)
    }

    /// Whether this writer still holds the state's writer slot.
    pub fn registered(&self) -> bool {
        self.state.is_writer(self.token)
    }
}

impl<T, K> Writer<T, K>
where
    T: Send + Sync + 'static,
    K: StateKey,
{
    /// Take the writer slot of `state`.
    pub(crate) fn claim(state: Arc<State<T, K>>) -> Result<Self> {
        let token = state.next_token();
        if !state.claim_writer(token) {
            tracing::warn!(state = ?state.id(), "Writer already registered");
            return Err(RepoError::writer_conflict(state.id()));
        }

        tracing::debug!(state = ?state.id(), writer = token, "Writer registered");

        Ok(Self { token, state })
    }

    /// Replace the value and notify every registered reader.
    ///
    /// Listeners run on the calling thread before this returns. Does nothing
    /// once the writer is unregistered.
    pub fn set_value(&self, value: T) {
        if !self.state.publish(self.token, value) {
            self.ignored_write();
        }
    }

    /// Compute the new value from the current one, then notify like
    /// [`set_value`](Writer::set_value).
    ///
    /// `f` receives `None` on the first write. It runs without any lock held,
    /// so it may read this or other states. If the writer loses its slot
    /// while `f` runs, the result is discarded.
    pub fn set<F>(&self, f: F)
    where
        F: FnOnce(Option<&T>) -> T,
    {
        if !self.registered() {
            self.ignored_write();
            return;
        }
        let next = self.state.with(f);
        if !self.state.publish(self.token, next) {
            self.ignored_write();
        }
    }

    /// Release the writer slot for good.
    ///
    /// Returns `false` if the writer was already unregistered. Afterwards the
    /// registry hands out a new writer for the same id.
    pub fn unregister(&self) -> bool {
        if !self.state.release_writer(self.token) {
            return false;
        }

        tracing::debug!(state = ?self.id(), writer = self.token, "Writer unregistered");
        true
    }

    fn ignored_write(&self) {
        tracing::warn!(
            state = ?self.id(),
            writer = self.token,
            "Ignoring write through unregistered writer"
        );
    }
}

impl<T, K> Drop for Writer<T, K> {
    fn drop(&mut self) {
        self.state.release_writer(self.token);
    }
}

impl<T, K: fmt::Debug> fmt::Debug for Writer<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("id", self.id())
            .field("token", &self.token)
            .field("registered", &self.registered())
            .finish()
    }
}
