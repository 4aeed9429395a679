//! # auth-profiles
//!
//! Per-agent provider credential store with run-scoped secret resolution.
//!
//! Separates the durable *reference* to a secret (`keyRef`) from the resolved
//! secret *value* (`key`). Profiles persist to `<agentDir>/auth-profiles.json`
//! holding only references and usage metadata; the plaintext is resolved once
//! per run into an in-memory snapshot and merged into read views only.
//!
//! ```text
//!   KeyRef Resolver ──► SecretsRuntimeSnapshot (built once per run)
//!                              │ activate
//!                              ▼
//!   AuthProfileStore ──► read views with `key` overlaid (many reads)
//!         │
//!         ▼ mark_used / mark_good / mark_failed (many writes)
//!   auth-profiles.json  ◄── never contains `key`
//! ```
//!
//! The persisted document structurally cannot carry plaintext: `key` is
//! skipped during serialization and the durable document is never mutated to
//! hold it, so there is no write path on which a resolved secret could reach
//! disk.
//!
//! ## Usage
//!
//! ```ignore
//! use auth_profiles::{
//!     activate_secrets_runtime_snapshot, prepare_secrets_runtime_snapshot,
//!     AuthProfileStore, SecretsConfig, SnapshotParams,
//! };
//!
//! let env: std::collections::HashMap<String, String> = std::env::vars().collect();
//! let snapshot = prepare_secrets_runtime_snapshot(SnapshotParams {
//!     config: &SecretsConfig::default(),
//!     env: &env,
//!     agent_dirs: &[agent_dir.clone()],
//! })
//! .await?;
//! activate_secrets_runtime_snapshot(snapshot);
//!
//! let store = AuthProfileStore::ensure(&agent_dir).await?;
//! if let Some(profile) = store.profile("openai:default").await {
//!     // profile.key holds the resolved plaintext while the snapshot is active
//! }
//! store.mark_good("openai", "openai:default").await?;
//! ```

pub mod error;
pub mod keyref;
pub mod providers;
pub mod runtime;
pub mod store;

pub use error::{AuthProfileError, Result};
pub use keyref::{KeyRef, KeySource, SecretsConfig};
pub use providers::KnownProvider;
pub use runtime::{
    activate_secrets_runtime_snapshot, clear_secrets_runtime_snapshot,
    prepare_secrets_runtime_snapshot, SecretsRuntimeSnapshot, SnapshotParams,
};
pub use store::{
    AuthProfile, AuthProfileDoc, AuthProfileStore, ProfileType, SharedAuthProfileStore,
    STORE_FILE_NAME,
};
