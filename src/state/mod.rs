//! Backing records for named states.
//!
//! A state holds the current value, the writer slot and the reader set.
//! It is only reachable through the handles a [`StateRepo`](crate::StateRepo)
//! hands out.

mod state;

pub(crate) use state::{AnyState, State};
pub use state::StateKey;
