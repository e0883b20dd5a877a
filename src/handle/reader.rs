use std::fmt;
use std::sync::Arc;

use crate::state::{State, StateKey};

pub(crate) type Listener<T, K> = Box<dyn Fn(&T, &Reader<T, K>) + Send + Sync>;

pub(crate) struct ReaderInner<T, K> {
    pub(crate) token: u64,
    pub(crate) state: Arc<State<T, K>>,
    pub(crate) listener: Listener<T, K>,
}

/// A registration that observes changes to one state.
///
/// The listener receives the new value and the reader itself, so it can
/// unregister from inside the callback. Clones share the same registration.
///
/// Dropping a `Reader` does not unregister it; the state keeps delivering to
/// the listener until [`unregister`](Reader::unregister) is called.
///
/// # Examples
///
/// ```
/// use staterepo::StateRepo;
/// use std::sync::{Arc, Mutex};
///
/// let repo = StateRepo::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let writer = repo.writer("count", Some(0)).unwrap();
/// let reader = repo
///     .reader("count", {
///         let seen = seen.clone();
///         move |value: &i32, _reader| seen.lock().unwrap().push(*value)
///     })
///     .unwrap();
///
/// writer.set(|n| n.copied().unwrap_or_default() + 1);
/// assert!(reader.unregister());
/// writer.set(|n| n.copied().unwrap_or_default() + 1);
///
/// assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
/// ```
pub struct Reader<T, K = String> {
    inner: Arc<ReaderInner<T, K>>,
}

impl<T, K> Reader<T, K> {
    pub(crate) fn from_inner(inner: Arc<ReaderInner<T, K>>) -> Self {
        Self { inner }
    }

    /// Id of the observed state.
    pub fn id(&self) -> &K {
        self.inner.state.id()
    }

    /// Current value of the state, `None` until the first write.
    pub fn value(&self) -> Option<Arc<T>> {
        self.inner.state.value()
    }

    /// Read the current value with a function.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        self.inner.state.with(f)
    }

    /// Whether the listener is currently in the state's reader set.
    pub fn registered(&self) -> bool {
        self.inner.state.is_attached(self.inner.token)
    }
}

impl<T, K> Reader<T, K>
where
    T: Send + Sync + 'static,
    K: StateKey,
{
    /// Create a reader and add it to `state`'s reader set.
    ///
    /// Returns the value current at registration time for the caller to
    /// replay.
    pub(crate) fn attach(
        state: Arc<State<T, K>>,
        listener: Listener<T, K>,
    ) -> (Self, Option<Arc<T>>) {
        let token = state.next_token();
        let inner = Arc::new(ReaderInner {
            token,
            state,
            listener,
        });
        let (_, current) = inner.state.attach(&inner);

        tracing::debug!(state = ?inner.state.id(), reader = token, "Reader registered");

        (Self { inner }, current)
    }

    /// Invoke this reader's listener with `value`.
    pub(crate) fn deliver(&self, value: &T) {
        self.inner.state.notify(&self.inner, value);
    }

    /// Add the reader back to the state's reader set.
    ///
    /// Returns `false` if it was already registered. The current value is
    /// not delivered unless the registry enables `replay_on_register`; the
    /// next write reaches the listener as usual.
    pub fn register(&self) -> bool {
        let (inserted, current) = self.inner.state.attach(&self.inner);
        if !inserted {
            return false;
        }

        tracing::debug!(
            state = ?self.id(),
            reader = self.inner.token,
            "Reader re-registered"
        );

        if self.inner.state.config().replay_on_register {
            if let Some(value) = current {
                self.deliver(&value);
            }
        }
        true
    }

    /// Remove the reader from the state's reader set.
    ///
    /// Returns `false` if it was not registered. Safe to call from inside the
    /// listener; the pass in progress is not affected.
    pub fn unregister(&self) -> bool {
        if !self.inner.state.detach(self.inner.token) {
            return false;
        }

        tracing::debug!(
            state = ?self.id(),
            reader = self.inner.token,
            "Reader unregistered"
        );
        true
    }
}

impl<T, K> Clone for Reader<T, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, K: fmt::Debug> fmt::Debug for Reader<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("id", self.id())
            .field("token", &self.inner.token)
            .field("registered", &self.registered())
            .finish()
    }
}
