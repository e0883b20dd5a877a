use std::any::type_name;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use indexmap::{Equivalent, IndexMap};
use parking_lot::RwLock;

use super::config::RepoConfig;
use crate::error::{RepoError, Result};
use crate::handle::{Reader, Writer};
use crate::state::{AnyState, State, StateKey};

/// Registry of named states.
///
/// States are created on first request and never removed. Each state has a
/// value type fixed by the first handle requested for its id, so one
/// registry can hold states of different types.
///
/// # Examples
///
/// Using a registry of your own:
///
/// ```
/// use staterepo::StateRepo;
/// use std::sync::{Arc, Mutex};
///
/// let repo = StateRepo::new();
/// let log = Arc::new(Mutex::new(Vec::new()));
///
/// let writer = repo.writer("count", Some(0)).unwrap();
/// let _reader = repo
///     .reader("count", {
///         let log = log.clone();
///         move |value: &i32, _reader| log.lock().unwrap().push(*value)
///     })
///     .unwrap();
///
/// writer.set(|n| n.copied().unwrap_or_default() + 1);
/// assert_eq!(*log.lock().unwrap(), vec![0, 1]);
/// ```
///
/// Using the process-wide default:
///
/// ```
/// use staterepo::StateRepo;
///
/// let repo = StateRepo::global();
/// let _reader = repo.reader("docs.theme", |_: &String, _| {}).unwrap();
/// assert!(repo.contains("docs.theme"));
/// ```
pub struct StateRepo<K = String> {
    states: RwLock<IndexMap<K, Arc<dyn AnyState>>>,
    config: RepoConfig,
}

impl StateRepo<String> {
    /// Create a registry keyed by `String` with default configuration.
    pub fn new() -> Self {
        Self::keyed(RepoConfig::default())
    }

    /// Create a registry keyed by `String` with custom configuration.
    pub fn with_config(config: RepoConfig) -> Self {
        Self::keyed(config)
    }

    /// The process-wide default registry.
    ///
    /// Created on first use with default configuration and never torn down.
    /// Tests should build their own registry instead.
    pub fn global() -> Arc<Self> {
        static REPO: OnceLock<Arc<StateRepo>> = OnceLock::new();
        Arc::clone(REPO.get_or_init(|| Arc::new(StateRepo::new())))
    }
}

impl<K: StateKey> StateRepo<K> {
    /// Create a registry keyed by a custom identifier type.
    ///
    /// ```
    /// use staterepo::{RepoConfig, StateRepo};
    ///
    /// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    /// enum Pane {
    ///     Sidebar,
    ///     Editor,
    /// }
    ///
    /// let repo = StateRepo::<Pane>::keyed(RepoConfig::default());
    /// let writer = repo.writer(Pane::Sidebar, Some(true)).unwrap();
    /// assert!(repo.contains(&Pane::Sidebar));
    /// assert!(!repo.contains(&Pane::Editor));
    /// # drop(writer);
    /// ```
    pub fn keyed(config: RepoConfig) -> Self {
        Self {
            states: RwLock::new(IndexMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Create a reader for `id`, creating the state if needed.
    ///
    /// If the state already has a value, `listener` is called with it before
    /// this returns (unless `replay_on_subscribe` is disabled). Fails only if
    /// `id` holds values of another type.
    ///
    /// The state keeps the listener alive until the reader unregisters or the
    /// registry is dropped. A listener that captures an `Arc` of this registry
    /// forms a cycle that is only broken by unregistering it.
    ///
    /// The replay runs after the state lock is released. A write from another
    /// thread in between can reach the listener before the replay does, so
    /// the replayed value may arrive after a newer one.
    pub fn reader<T, F>(&self, id: impl Into<K>, listener: F) -> Result<Reader<T, K>>
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &Reader<T, K>) + Send + Sync + 'static,
    {
        let state = self.state::<T>(id.into())?;
        let (reader, current) = Reader::attach(state, Box::new(listener));

        if self.config.replay_on_subscribe {
            if let Some(value) = current {
                reader.deliver(&value);
            }
        }

        Ok(reader)
    }

    /// Create the writer for `id`, creating the state if needed.
    ///
    /// Fails with [`RepoError::WriterConflict`] while another writer is
    /// registered for `id`; nothing is changed in that case. With `initial`
    /// set, the value is written and existing readers are notified before
    /// this returns.
    ///
    /// Dropping the returned writer releases the slot, so an unbound
    /// `repo.writer(id, init)?;` writes `init` and frees the state for the
    /// next writer right away.
    #[must_use = "dropping the Writer releases the writer slot"]
    pub fn writer<T>(&self, id: impl Into<K>, initial: Option<T>) -> Result<Writer<T, K>>
    where
        T: Send + Sync + 'static,
    {
        let state = self.state::<T>(id.into())?;
        let writer = Writer::claim(state)?;

        if let Some(value) = initial {
            writer.set_value(value);
        }

        Ok(writer)
    }

    /// Whether a state exists for `id`.
    pub fn contains<Q>(&self, id: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.states.read().contains_key(id)
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Ids of all states in creation order.
    pub fn ids(&self) -> Vec<K> {
        self.states.read().keys().cloned().collect()
    }

    /// Whether the state for `id` has a registered writer.
    pub fn has_writer<Q>(&self, id: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.states
            .read()
            .get(id)
            .is_some_and(|state| state.has_writer())
    }

    /// Number of registered readers of the state for `id`.
    pub fn reader_count<Q>(&self, id: &Q) -> usize
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.states
            .read()
            .get(id)
            .map_or(0, |state| state.reader_count())
    }

    /// Look up or create the state for `id` with value type `T`.
    fn state<T>(&self, id: K) -> Result<Arc<State<T, K>>>
    where
        T: Send + Sync + 'static,
    {
        let existing = self.states.read().get(&id).cloned();
        let erased = match existing {
            Some(state) => state,
            None => {
                let mut states = self.states.write();
                // Another thread may have created it between the two locks.
                Arc::clone(states.entry(id.clone()).or_insert_with(|| {
                    tracing::debug!(
                        state = ?id,
                        value_type = type_name::<T>(),
                        "State created"
                    );
                    State::<T, K>::new(id.clone(), self.config) as Arc<dyn AnyState>
                }))
            }
        };

        let found = erased.value_type();
        erased.into_any().downcast::<State<T, K>>().map_err(|_| {
            tracing::warn!(
                state = ?id,
                expected = type_name::<T>(),
                found,
                "State value type mismatch"
            );
            RepoError::TypeMismatch {
                id: format!("{id:?}"),
                expected: type_name::<T>(),
                found,
            }
        })
    }
}

impl<K: StateKey> Default for StateRepo<K> {
    fn default() -> Self {
        Self::keyed(RepoConfig::default())
    }
}

impl<K> Drop for StateRepo<K> {
    fn drop(&mut self) {
        // Readers hold their state; without this the cycle outlives the registry.
        for state in self.states.get_mut().values() {
            state.detach_all();
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for StateRepo<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states = self.states.read();
        f.debug_struct("StateRepo")
            .field("ids", &states.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FanoutPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn recorder<T: Clone + Send + 'static>() -> (
        Arc<Mutex<Vec<T>>>,
        impl Fn(&T, &Reader<T>) + Send + Sync + 'static,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, move |value: &T, _: &Reader<T>| {
            sink.lock().unwrap().push(value.clone())
        })
    }

    #[test]
    fn reader_on_fresh_id_is_unset() {
        let repo = StateRepo::new();
        let (log, listener) = recorder::<i32>();
        let reader = repo.reader("fresh", listener).unwrap();

        assert!(reader.value().is_none());
        assert!(log.lock().unwrap().is_empty());
        assert!(repo.contains("fresh"));
        assert_eq!(repo.reader_count("fresh"), 1);
    }

    #[test]
    fn second_writer_conflicts_until_first_unregisters() {
        let repo = StateRepo::new();
        let first = repo.writer::<i32>("w", None).unwrap();

        let err = repo.writer::<i32>("w", None).unwrap_err();
        assert_eq!(
            err,
            RepoError::WriterConflict {
                id: "\"w\"".to_string()
            }
        );

        assert!(first.unregister());
        assert!(repo.writer::<i32>("w", None).is_ok());
    }

    #[test]
    fn conflicting_writer_does_not_write_initial_value() {
        let repo = StateRepo::new();
        let (log, listener) = recorder::<i32>();
        let _reader = repo.reader("D", listener).unwrap();
        let _first = repo.writer("D", Some(1)).unwrap();

        assert!(repo.writer("D", Some(2)).is_err());
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(repo.reader_count("D"), 1);
    }

    #[test]
    fn writer_initial_value_notifies_earlier_readers() {
        let repo = StateRepo::new();
        let (log, listener) = recorder::<&'static str>();
        let _reader = repo.reader("greeting", listener).unwrap();

        let _writer = repo.writer("greeting", Some("hello")).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["hello"]);
    }

    #[test]
    fn writer_without_initial_value_does_not_notify() {
        let repo = StateRepo::new();
        let (log, listener) = recorder::<i32>();
        let reader = repo.reader("n", listener).unwrap();

        let _writer = repo.writer::<i32>("n", None).unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert!(reader.value().is_none());
    }

    #[test]
    fn late_reader_receives_last_value() {
        let repo = StateRepo::new();
        let writer = repo.writer::<i32>("late", None).unwrap();
        writer.set_value(4);
        writer.set_value(5);

        let (log, listener) = recorder::<i32>();
        let _reader = repo.reader("late", listener).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![5]);
    }

    #[test]
    fn replay_on_subscribe_can_be_disabled() {
        let repo = StateRepo::with_config(RepoConfig::default().replay_on_subscribe(false));
        let _writer = repo.writer("n", Some(1)).unwrap();

        let (log, listener) = recorder::<i32>();
        let reader = repo.reader("n", listener).unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(reader.value().as_deref(), Some(&1));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let repo = StateRepo::new();
        let _writer = repo.writer("n", Some(1u32)).unwrap();

        let err = repo.reader("n", |_: &String, _| {}).unwrap_err();
        assert!(matches!(
            err,
            RepoError::TypeMismatch { expected, found, .. }
                if expected == type_name::<String>() && found == "u32"
        ));
        assert!(repo.writer::<String>("n", None).is_err());
        assert_eq!(repo.reader_count("n"), 0);
    }

    #[test]
    fn ids_keep_creation_order() {
        let repo = StateRepo::new();
        let _b = repo.writer::<i32>("b", None).unwrap();
        let _a = repo.reader("a", |_: &i32, _| {}).unwrap();
        let _c = repo.writer::<i32>("c", None).unwrap();
        let _b2 = repo.reader("b", |_: &i32, _| {}).unwrap();

        assert_eq!(repo.ids(), vec!["b", "a", "c"]);
        assert_eq!(repo.len(), 3);
        assert!(!repo.is_empty());
    }

    #[test]
    fn states_are_never_removed() {
        let repo = StateRepo::new();
        let writer = repo.writer::<i32>("kept", None).unwrap();
        let reader = repo.reader("kept", |_: &i32, _| {}).unwrap();

        writer.unregister();
        reader.unregister();
        drop((writer, reader));

        assert!(repo.contains("kept"));
        assert!(!repo.has_writer("kept"));
        assert_eq!(repo.reader_count("kept"), 0);
    }

    #[test]
    fn custom_key_type() {
        let repo: StateRepo<u32> = StateRepo::default();
        let writer = repo.writer(7u32, Some('x')).unwrap();
        let (log, listener) = {
            let log = Arc::new(Mutex::new(Vec::new()));
            let sink = log.clone();
            (log, move |c: &char, _: &Reader<char, u32>| {
                sink.lock().unwrap().push(*c)
            })
        };
        let reader = repo.reader(7u32, listener).unwrap();

        writer.set_value('y');
        assert_eq!(*reader.id(), 7);
        assert_eq!(*log.lock().unwrap(), vec!['x', 'y']);
    }

    #[test]
    fn global_is_shared() {
        let a = StateRepo::global();
        let b = StateRepo::global();
        assert!(Arc::ptr_eq(&a, &b));

        let _writer = a.writer::<u8>("repo.tests.global_is_shared", None).unwrap();
        assert!(b.has_writer("repo.tests.global_is_shared"));
    }

    #[test]
    fn dropping_repo_detaches_readers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let repo = StateRepo::new();
        let writer = repo.writer::<i32>("n", None).unwrap();
        let reader = repo
            .reader("n", {
                let calls = calls.clone();
                move |_: &i32, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        drop(repo);
        assert!(!reader.registered());
        writer.set_value(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn config_is_exposed() {
        let repo = StateRepo::with_config(RepoConfig::default().fanout(FanoutPolicy::Propagate));
        assert_eq!(repo.config().fanout, FanoutPolicy::Propagate);

        let rendered = format!("{repo:?}");
        assert!(rendered.contains("Propagate"));
    }
}
