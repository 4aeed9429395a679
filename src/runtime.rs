//! Run-scoped secrets runtime snapshot.
//!
//! At run start the host resolves every profile's key reference once and
//! builds a [`SecretsRuntimeSnapshot`], a table of profile id to plaintext
//! spanning all participating agent directories. Activating the snapshot
//! makes it the single process-wide overlay consulted by the store read path;
//! clearing it (or activating a replacement) removes the previous one.
//!
//! Snapshot building is best-effort: a profile whose reference does not
//! resolve is recorded as unresolved and simply exposes no runtime key, so
//! one misconfigured provider does not block the others. Store-level
//! failures (a corrupt document) do propagate.
//!
//! The active snapshot is a process-wide value. Activation is serialized at
//! run boundaries by the host; runs do not overlap.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::keyref::{self, SecretsConfig};
use crate::store::AuthProfileStore;

/// Inputs for snapshot preparation.
#[derive(Debug)]
pub struct SnapshotParams<'a> {
    pub config: &'a SecretsConfig,
    /// External secret source, e.g. the process environment.
    pub env: &'a HashMap<String, String>,
    /// Agent directories whose stores participate in this run.
    pub agent_dirs: &'a [PathBuf],
}

/// Resolved plaintext values for one run, keyed by profile id.
#[derive(Debug, Clone, Default)]
pub struct SecretsRuntimeSnapshot {
    resolved: HashMap<String, String>,
    unresolved: Vec<String>,
}

impl SecretsRuntimeSnapshot {
    /// The resolved plaintext for a profile, if its reference resolved.
    pub fn resolved_key(&self, profile_id: &str) -> Option<&str> {
        self.resolved.get(profile_id).map(String::as_str)
    }

    /// Profile ids whose key reference failed to resolve at build time.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

static ACTIVE_SNAPSHOT: RwLock<Option<Arc<SecretsRuntimeSnapshot>>> = RwLock::new(None);

/// Build a snapshot by resolving every profile across the given agent
/// directories. Resolution failures are per-profile and non-fatal; a corrupt
/// store fails the whole preparation.
pub async fn prepare_secrets_runtime_snapshot(
    params: SnapshotParams<'_>,
) -> Result<SecretsRuntimeSnapshot> {
    let mut snapshot = SecretsRuntimeSnapshot::default();

    for agent_dir in params.agent_dirs {
        let store = AuthProfileStore::ensure(agent_dir).await?;
        for (profile_id, key_ref) in store.key_refs().await {
            match keyref::resolve(&key_ref, params.env, params.config) {
                Ok(value) => {
                    // Profile ids repeat when multiple agent directories carry
                    // the same profile; the last directory wins.
                    snapshot.resolved.insert(profile_id, value);
                }
                Err(err) => {
                    tracing::debug!(
                        profile_id = %profile_id,
                        error = %err,
                        "Skipping auth profile with unresolvable key reference"
                    );
                    snapshot.unresolved.push(profile_id);
                }
            }
        }
    }

    tracing::info!(
        resolved = snapshot.resolved.len(),
        unresolved = snapshot.unresolved.len(),
        "Prepared secrets runtime snapshot"
    );
    Ok(snapshot)
}

/// Install a snapshot as the process-wide active overlay, replacing any
/// previously active one. Snapshots do not stack.
pub fn activate_secrets_runtime_snapshot(snapshot: SecretsRuntimeSnapshot) {
    let mut active = ACTIVE_SNAPSHOT.write().unwrap_or_else(|e| e.into_inner());
    *active = Some(Arc::new(snapshot));
}

/// Remove the active overlay. Subsequent store reads show no runtime keys.
pub fn clear_secrets_runtime_snapshot() {
    let mut active = ACTIVE_SNAPSHOT.write().unwrap_or_else(|e| e.into_inner());
    *active = None;
}

/// Resolved key for a profile from the active snapshot, if one is active.
pub(crate) fn active_resolved_key(profile_id: &str) -> Option<String> {
    let active = ACTIVE_SNAPSHOT.read().unwrap_or_else(|e| e.into_inner());
    active
        .as_ref()
        .and_then(|snapshot| snapshot.resolved_key(profile_id))
        .map(str::to_string)
}
