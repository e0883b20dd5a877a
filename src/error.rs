//! Error types for registry operations.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = RepoError> = std::result::Result<T, E>;

/// Error type for [`StateRepo`](crate::StateRepo) operations.
///
/// Ids are carried in their `Debug` rendering so the error does not depend
/// on the key type of the registry that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    /// The state already has a registered writer.
    #[error("state {id} already has a registered writer")]
    WriterConflict { id: String },

    /// The state was created with a different value type.
    #[error("state {id} holds values of type `{found}`, requested `{expected}`")]
    TypeMismatch {
        id: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl RepoError {
    pub(crate) fn writer_conflict(id: &impl std::fmt::Debug) -> Self {
        RepoError::WriterConflict {
            id: format!("{id:?}"),
        }
    }

    /// Id of the state the error refers to.
    pub fn id(&self) -> &str {
        match self {
            RepoError::WriterConflict { id } | RepoError::TypeMismatch { id, .. } => id,
        }
    }
}
