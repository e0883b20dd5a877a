//! # Staterepo
//!
//! A single-writer, multi-reader state registry for sharing mutable
//! application state between independent UI components.
//!
//! Every named state has at most one [`Writer`] and any number of
//! [`Reader`]s. A write synchronously calls every registered reader's
//! listener on the writing thread before returning; there is no reducer,
//! batching or diffing layer in between.
//!
//! ## Registry
//!
//! - [`StateRepo`] - Maps ids to states and creates handles on demand
//! - [`StateRepo::global`] - Process-wide default instance
//! - [`RepoConfig`] - Replay and listener panic policy
//!
//! ## Handles
//!
//! - [`Writer`] - The unique capability to change a state, permanently
//!   released by `unregister` or drop
//! - [`Reader`] - Listener registration that can be unregistered and
//!   registered again
//!
//! A reader created after a write receives the last value right away.
//!
//! ```
//! use staterepo::StateRepo;
//! use std::sync::{Arc, Mutex};
//!
//! let repo = StateRepo::new();
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! let writer = repo.writer("C", Some(0)).unwrap();
//! let reader = repo
//!     .reader("C", {
//!         let log = log.clone();
//!         move |v: &i32, _reader| log.lock().unwrap().push(*v)
//!     })
//!     .unwrap();
//! assert_eq!(*log.lock().unwrap(), vec![0]);
//!
//! writer.set(|n| n.copied().unwrap_or(0) + 1);
//! reader.unregister();
//! writer.set(|n| n.copied().unwrap_or(0) + 1);
//! reader.register();
//! writer.set(|n| n.copied().unwrap_or(0) + 1);
//!
//! assert_eq!(*log.lock().unwrap(), vec![0, 1, 3]);
//! ```

pub mod error;
pub mod handle;
pub mod repo;
mod state;

// Re-export main types for convenience
pub use error::{RepoError, Result};
pub use handle::{Reader, Writer};
pub use repo::{FanoutPolicy, RepoConfig, StateRepo};
pub use state::StateKey;
