use std::any::{type_name, Any};
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::handle::{Reader, ReaderInner};
use crate::repo::{FanoutPolicy, RepoConfig};

/// Bounds required of a state identifier.
///
/// Implemented for every type that satisfies them, so `String`, `&'static str`,
/// integers and plain enums can all be used as keys.
pub trait StateKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<K> StateKey for K where K: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Type-erased view of a [`State`], as stored in the registry map.
pub(crate) trait AnyState: Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn value_type(&self) -> &'static str;

    fn has_writer(&self) -> bool;

    fn reader_count(&self) -> usize;

    /// Drop every reader registration, breaking the reader -> state cycles.
    fn detach_all(&self);
}

struct Slot<T, K> {
    value: Option<Arc<T>>,
    writer: Option<u64>,
    // Insertion order is notification order.
    readers: IndexMap<u64, Arc<ReaderInner<T, K>>>,
}

/// One named piece of application data.
///
/// Value, writer slot and reader set sit behind a single lock. The lock is
/// never held while user code runs, so listeners and update functions may
/// call back into the state.
pub(crate) struct State<T, K> {
    id: K,
    config: RepoConfig,
    next_token: AtomicU64,
    slot: Mutex<Slot<T, K>>,
}

impl<T, K> State<T, K> {
    pub(crate) fn new(id: K, config: RepoConfig) -> Arc<Self> {
        Arc::new(Self {
            id,
            config,
            next_token: AtomicU64::new(0),
            slot: Mutex::new(Slot {
                value: None,
                writer: None,
                readers: IndexMap::new(),
            }),
        })
    }

    pub(crate) fn id(&self) -> &K {
        &self.id
    }

    pub(crate) fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Allocate a handle token, unique within this state.
    pub(crate) fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn value(&self) -> Option<Arc<T>> {
        self.slot.lock().value.clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let value = self.value();
        f(value.as_deref())
    }

    /// Take the writer slot. Fails if another writer holds it.
    pub(crate) fn claim_writer(&self, token: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.writer.is_some() {
            return false;
        }
        slot.writer = Some(token);
        true
    }

    /// Clear the writer slot if `token` holds it.
    pub(crate) fn release_writer(&self, token: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.writer != Some(token) {
            return false;
        }
        slot.writer = None;
        true
    }

    pub(crate) fn is_writer(&self, token: u64) -> bool {
        self.slot.lock().writer == Some(token)
    }

    /// Add a reader to the set.
    ///
    /// Returns whether it was inserted, along with the value current at the
    /// moment of insertion.
    pub(crate) fn attach(&self, reader: &Arc<ReaderInner<T, K>>) -> (bool, Option<Arc<T>>) {
        let mut slot = self.slot.lock();
        let inserted = match slot.readers.entry(reader.token) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(Arc::clone(reader));
                true
            }
        };
        (inserted, slot.value.clone())
    }

    pub(crate) fn detach(&self, token: u64) -> bool {
        self.slot.lock().readers.shift_remove(&token).is_some()
    }

    pub(crate) fn is_attached(&self, token: u64) -> bool {
        self.slot.lock().readers.contains_key(&token)
    }
}

impl<T, K> State<T, K>
where
    T: Send + Sync + 'static,
    K: StateKey,
{
    /// Store `value` and notify every reader registered at this moment.
    ///
    /// The write is dropped, returning `false`, unless `writer` holds the
    /// writer slot at the moment the value is stored. Readers added while the
    /// pass runs are not part of it; readers removed while it runs still
    /// receive it.
    pub(crate) fn publish(&self, writer: u64, value: T) -> bool {
        let value = Arc::new(value);
        let readers: Vec<_> = {
            let mut slot = self.slot.lock();
            if slot.writer != Some(writer) {
                return false;
            }
            slot.value = Some(Arc::clone(&value));
            slot.readers.values().cloned().collect()
        };

        tracing::trace!(
            state = ?self.id,
            readers = readers.len(),
            "Notifying readers"
        );

        for reader in &readers {
            self.notify(reader, &value);
        }
        true
    }

    /// Invoke one reader's listener according to the fan-out policy.
    pub(crate) fn notify(&self, reader: &Arc<ReaderInner<T, K>>, value: &T) {
        let handle = Reader::from_inner(Arc::clone(reader));
        match self.config.fanout {
            FanoutPolicy::Propagate => (reader.listener)(value, &handle),
            FanoutPolicy::Isolate => {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| (reader.listener)(value, &handle)));
                if let Err(payload) = outcome {
                    tracing::error!(
                        state = ?self.id,
                        reader = reader.token,
                        panic = panic_message(&*payload),
                        "Reader listener panicked"
                    );
                }
            }
        }
    }
}

impl<T, K> AnyState for State<T, K>
where
    T: Send + Sync + 'static,
    K: StateKey,
{
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn value_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn has_writer(&self) -> bool {
        self.slot.lock().writer.is_some()
    }

    fn reader_count(&self) -> usize {
        self.slot.lock().readers.len()
    }

    fn detach_all(&self) {
        // Moved out so the readers drop after the lock is released.
        let readers = std::mem::take(&mut self.slot.lock().readers);
        drop(readers);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<State<i32, &'static str>> {
        State::new("counter", RepoConfig::default())
    }

    #[test]
    fn writer_slot_is_exclusive() {
        let state = state();
        let first = state.next_token();
        let second = state.next_token();
        assert_ne!(first, second);

        assert!(state.claim_writer(first));
        assert!(!state.claim_writer(second));
        assert!(state.is_writer(first));

        // Only the holder can release.
        assert!(!state.release_writer(second));
        assert!(state.release_writer(first));
        assert!(!state.release_writer(first));

        assert!(state.claim_writer(second));
        assert!(!state.is_writer(first));
    }

    #[test]
    fn publish_without_readers_stores_value() {
        let state = state();
        let writer = state.next_token();
        assert!(state.claim_writer(writer));
        assert!(state.value().is_none());

        assert!(state.publish(writer, 7));
        assert_eq!(state.value().as_deref(), Some(&7));
        assert_eq!(state.with(|v| v.copied()), Some(7));
    }

    #[test]
    fn publish_requires_the_writer_slot() {
        let state = state();
        let old = state.next_token();
        let new = state.next_token();

        assert!(!state.publish(old, 1));
        assert!(state.value().is_none());

        assert!(state.claim_writer(old));
        assert!(state.publish(old, 2));
        assert!(state.release_writer(old));
        assert!(state.claim_writer(new));

        assert!(!state.publish(old, 3));
        assert_eq!(state.value().as_deref(), Some(&2));
    }

    #[test]
    fn erased_state_downcasts_to_its_own_type() {
        let state: Arc<dyn AnyState> = state();
        assert_eq!(state.value_type(), "i32");
        assert!(!state.has_writer());
        assert_eq!(state.reader_count(), 0);

        let any = state.into_any();
        assert!(any.clone().downcast::<State<i32, &'static str>>().is_ok());
        assert!(any.downcast::<State<u8, &'static str>>().is_err());
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");

        let payload: Box<dyn Any + Send> = Box::new(3u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
