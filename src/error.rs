//! Error types for the auth profile subsystem.
//!
//! Every failure in this crate is classified into one of the variants below;
//! nothing is silently dropped. Per-profile resolution failures (`KeyNotFound`)
//! are swallowed at snapshot build time, leaving the profile without a runtime
//! key, while structural store failures propagate to the caller.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthProfileError>;

#[derive(Debug, Error)]
pub enum AuthProfileError {
    /// The resolver could not find the secret a key reference points at.
    #[error("no secret found for key reference `{0}`")]
    KeyNotFound(String),

    /// The on-disk store exists but does not parse against the schema.
    /// Fatal for that agent directory's store load.
    #[error("auth profile store at {} is corrupt: {reason}", path.display())]
    StoreCorrupt { path: PathBuf, reason: String },

    /// A write-path operation targeted a profile id that is not in the store.
    #[error("unknown auth profile `{0}`")]
    ProfileNotFound(String),

    /// Writing the store failed after one retry. In-memory state remains
    /// updated, so a later write can re-attempt persistence.
    #[error("failed to persist auth profile store at {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
