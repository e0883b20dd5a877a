//! The state registry.
//!
//! A [`StateRepo`] maps ids to states and hands out the reader and writer
//! handles that give access to them.

mod config;
mod repo;

pub use config::{FanoutPolicy, RepoConfig};
pub use repo::StateRepo;
