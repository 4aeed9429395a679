//! Durable auth profile store, one JSON document per agent directory.
//!
//! Persists to `<agentDir>/auth-profiles.json`. The document maps profile id
//! to `{type, provider, keyRef, usage metadata}` plus a `lastGood` map from
//! provider to the most recently confirmed-working profile id.
//!
//! Resolved plaintext never reaches this file: [`AuthProfile::key`] is
//! `#[serde(skip)]`, so serialization drops it unconditionally, and the
//! durable document behind the store handle is never mutated to hold it;
//! the runtime overlay is merged into cloned views on the read path only.
//!
//! Stores are cached process-wide by canonicalized agent-directory path, so
//! every caller for the same directory shares one handle and concurrent
//! writers serialize their read-modify-persist sequences on its write lock.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::sync::{Mutex, RwLock};

use crate::error::{AuthProfileError, Result};
use crate::keyref::KeyRef;
use crate::providers::KnownProvider;
use crate::runtime;

/// File name of the store document inside an agent directory.
pub const STORE_FILE_NAME: &str = "auth-profiles.json";

const STORE_VERSION: u32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Document Types
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of credential a profile holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    ApiKey,
    Oauth,
}

/// One credential entry for a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProfile {
    #[serde(rename = "type")]
    pub profile_type: ProfileType,
    /// Provider this profile authenticates against (e.g. "openai").
    pub provider: String,
    /// Durable pointer to where the secret lives. Never the secret itself.
    pub key_ref: KeyRef,
    /// Resolved plaintext, merged in by the runtime overlay on the read path.
    /// Skipped during (de)serialization, so the persisted document cannot
    /// carry it.
    #[serde(skip)]
    pub key: Option<String>,
    /// Wall-clock timestamp of the last authenticated call through this profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Consecutive failures since the last confirmed-good call.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failure_count: u32,
    /// Until when this profile should be skipped after repeated failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl AuthProfile {
    pub fn new(profile_type: ProfileType, provider: impl Into<String>, key_ref: KeyRef) -> Self {
        Self {
            profile_type,
            provider: provider.into(),
            key_ref,
            key: None,
            last_used_at: None,
            failure_count: 0,
            cooldown_until: None,
        }
    }

    /// Whether this profile is currently cooling down after failures.
    pub fn is_in_cooldown(&self) -> bool {
        self.cooldown_until
            .map(|until| Utc::now() < until)
            .unwrap_or(false)
    }
}

/// The on-disk document: one per agent directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProfileDoc {
    /// Schema version. Required on disk; missing or malformed documents are
    /// rejected as corrupt rather than silently reset.
    pub version: u32,
    #[serde(default)]
    pub profiles: HashMap<String, AuthProfile>,
    /// Per-provider pointer to the most recently confirmed-working profile id.
    #[serde(default)]
    pub last_good: HashMap<String, String>,
}

impl Default for AuthProfileDoc {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            profiles: HashMap::new(),
            last_good: HashMap::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

pub type SharedAuthProfileStore = Arc<AuthProfileStore>;

/// Handle to one agent directory's auth profile document.
#[derive(Debug)]
pub struct AuthProfileStore {
    doc: RwLock<AuthProfileDoc>,
    agent_dir: PathBuf,
    storage_path: PathBuf,
    /// Serializes read-modify-persist sequences so two concurrent usage
    /// writes cannot silently drop one another's update.
    write_lock: Mutex<()>,
}

fn store_cache() -> &'static StdMutex<HashMap<PathBuf, SharedAuthProfileStore>> {
    static CACHE: OnceLock<StdMutex<HashMap<PathBuf, SharedAuthProfileStore>>> = OnceLock::new();
    CACHE.get_or_init(|| StdMutex::new(HashMap::new()))
}

/// Canonicalize an agent directory path for cache keying. The directory may
/// not exist yet (fresh agent), in which case the absolute form is used.
fn canonical_dir(agent_dir: &Path) -> PathBuf {
    agent_dir.canonicalize().unwrap_or_else(|_| {
        if agent_dir.is_absolute() {
            agent_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(agent_dir))
                .unwrap_or_else(|_| agent_dir.to_path_buf())
        }
    })
}

impl AuthProfileStore {
    /// Get the shared store handle for an agent directory, loading the
    /// document from disk on first use.
    ///
    /// A missing file yields an empty `{version: 1}` document; no file is
    /// created until the first write. A present-but-invalid file fails with
    /// [`AuthProfileError::StoreCorrupt`] and is not cached, so a repaired
    /// file is picked up by the next call.
    pub async fn ensure(agent_dir: impl AsRef<Path>) -> Result<SharedAuthProfileStore> {
        let canonical = canonical_dir(agent_dir.as_ref());

        {
            let cache = store_cache().lock().unwrap_or_else(|e| e.into_inner());
            if let Some(store) = cache.get(&canonical) {
                return Ok(store.clone());
            }
        }

        let doc = Self::load_document(&canonical)?;
        tracing::debug!(
            agent_dir = %canonical.display(),
            profiles = doc.profiles.len(),
            "Loaded auth profile store"
        );

        let store = Arc::new(Self {
            doc: RwLock::new(doc),
            storage_path: canonical.join(STORE_FILE_NAME),
            agent_dir: canonical.clone(),
            write_lock: Mutex::new(()),
        });

        // A racing loader may have inserted first; keep whichever won so all
        // callers for this directory share one object.
        let mut cache = store_cache().lock().unwrap_or_else(|e| e.into_inner());
        Ok(cache.entry(canonical).or_insert(store).clone())
    }

    fn load_document(agent_dir: &Path) -> Result<AuthProfileDoc> {
        let path = agent_dir.join(STORE_FILE_NAME);
        if !path.exists() {
            return Ok(AuthProfileDoc::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| AuthProfileError::StoreCorrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| AuthProfileError::StoreCorrupt {
            path,
            reason: e.to_string(),
        })
    }

    pub fn agent_dir(&self) -> &Path {
        &self.agent_dir
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read Path (runtime overlay)
    // ─────────────────────────────────────────────────────────────────────

    /// Current document with the active snapshot's plaintext merged into each
    /// profile's `key`. The overlay exists only on this cloned view; the
    /// durable document underneath never holds plaintext.
    pub async fn document(&self) -> AuthProfileDoc {
        let mut doc = self.doc.read().await.clone();
        for (profile_id, profile) in doc.profiles.iter_mut() {
            profile.key = runtime::active_resolved_key(profile_id);
        }
        doc
    }

    /// One profile with the overlay applied, if present.
    pub async fn profile(&self, profile_id: &str) -> Option<AuthProfile> {
        let mut profile = self.doc.read().await.profiles.get(profile_id)?.clone();
        profile.key = runtime::active_resolved_key(profile_id);
        Some(profile)
    }

    /// The confirmed-working profile id for a provider, if any.
    pub async fn last_good(&self, provider: &str) -> Option<String> {
        self.doc.read().await.last_good.get(provider).cloned()
    }

    /// The confirmed-working profile for a provider, overlay applied.
    pub async fn last_good_profile(&self, provider: &str) -> Option<AuthProfile> {
        let profile_id = self.last_good(provider).await?;
        self.profile(&profile_id).await
    }

    /// Profile ids and key references for snapshot building (no overlay).
    pub(crate) async fn key_refs(&self) -> Vec<(String, KeyRef)> {
        self.doc
            .read()
            .await
            .profiles
            .iter()
            .map(|(id, profile)| (id.clone(), profile.key_ref.clone()))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Write Path (usage writer)
    // ─────────────────────────────────────────────────────────────────────

    /// Record that a profile was just used for an authenticated call.
    pub async fn mark_used(&self, profile_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let contents = {
            let mut doc = self.doc.write().await;
            let profile = doc
                .profiles
                .get_mut(profile_id)
                .ok_or_else(|| AuthProfileError::ProfileNotFound(profile_id.to_string()))?;
            profile.last_used_at = Some(Utc::now());
            self.serialize_document(&doc)?
        };
        self.write_contents(&contents).await
    }

    /// Record a confirmed-working call: updates `lastUsedAt`, points
    /// `lastGood[provider]` at this profile, and clears any failure state.
    pub async fn mark_good(&self, provider: &str, profile_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let contents = {
            let mut doc = self.doc.write().await;
            let profile = doc
                .profiles
                .get_mut(profile_id)
                .ok_or_else(|| AuthProfileError::ProfileNotFound(profile_id.to_string()))?;
            profile.last_used_at = Some(Utc::now());
            profile.failure_count = 0;
            profile.cooldown_until = None;
            doc.last_good
                .insert(provider.to_string(), profile_id.to_string());
            self.serialize_document(&doc)?
        };
        self.write_contents(&contents).await
    }

    /// Record a failed call: bumps the failure count and places the profile
    /// into an exponentially growing cooldown.
    pub async fn mark_failed(&self, profile_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let contents = {
            let mut doc = self.doc.write().await;
            let profile = doc
                .profiles
                .get_mut(profile_id)
                .ok_or_else(|| AuthProfileError::ProfileNotFound(profile_id.to_string()))?;
            profile.failure_count = profile.failure_count.saturating_add(1);
            let cooldown = cooldown_for(profile.failure_count);
            profile.cooldown_until = Some(Utc::now() + cooldown);
            tracing::info!(
                profile_id = %profile_id,
                failure_count = profile.failure_count,
                cooldown_secs = cooldown.num_seconds(),
                "Auth profile placed in cooldown"
            );
            self.serialize_document(&doc)?
        };
        self.write_contents(&contents).await
    }

    /// Insert a profile if no profile with that id exists yet.
    ///
    /// Returns `true` if the profile was inserted (and persisted), `false`
    /// if a profile with that id was already present.
    pub async fn ensure_profile(&self, profile_id: &str, profile: AuthProfile) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let contents = {
            let mut doc = self.doc.write().await;
            if doc.profiles.contains_key(profile_id) {
                return Ok(false);
            }
            doc.profiles.insert(profile_id.to_string(), profile);
            self.serialize_document(&doc)?
        };
        self.write_contents(&contents).await?;
        Ok(true)
    }

    /// Seed the `<provider>:default` API-key profile pointing at the
    /// provider's conventional environment variable. Idempotent.
    pub async fn ensure_default_profile(&self, provider: KnownProvider) -> Result<bool> {
        self.ensure_profile(
            &provider.default_profile_id(),
            AuthProfile::new(ProfileType::ApiKey, provider.id(), provider.default_key_ref()),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    fn serialize_document(&self, doc: &AuthProfileDoc) -> Result<String> {
        serde_json::to_string_pretty(doc).map_err(|e| AuthProfileError::Persist {
            path: self.storage_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }

    /// Write the serialized document to disk, retrying once on transient
    /// failure. A failed persist leaves in-memory state updated so the next
    /// write re-attempts with current data.
    async fn write_contents(&self, contents: &str) -> Result<()> {
        match self.try_write(contents) {
            Ok(()) => Ok(()),
            Err(first_err) => {
                tracing::warn!(
                    path = %self.storage_path.display(),
                    error = %first_err,
                    "Auth profile store write failed, retrying once"
                );
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                self.try_write(contents)
                    .map_err(|source| AuthProfileError::Persist {
                        path: self.storage_path.clone(),
                        source,
                    })
            }
        }
    }

    /// Atomic replacement: write a temp file in the same directory, then
    /// rename over the target. An advisory lock on a sibling lock file guards
    /// against writers in other processes.
    fn try_write(&self, contents: &str) -> std::io::Result<()> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_path = self.storage_path.with_extension("lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;
        let tmp_path = self.storage_path.with_extension("tmp");
        let result = std::fs::write(&tmp_path, contents)
            .and_then(|_| std::fs::rename(&tmp_path, &self.storage_path));
        let _ = lock_file.unlock();
        result
    }
}

/// Cooldown duration after `consecutive_failures` failures: 5s base doubling
/// per failure, capped at one hour.
fn cooldown_for(consecutive_failures: u32) -> chrono::Duration {
    const BASE_SECS: f64 = 5.0;
    const MAX_SECS: f64 = 3600.0;
    let secs = BASE_SECS * 2f64.powi(consecutive_failures.saturating_sub(1) as i32);
    chrono::Duration::seconds(secs.min(MAX_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyref::KeySource;

    fn write_store_file(dir: &Path, json: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(STORE_FILE_NAME), json).unwrap();
    }

    fn sample_profile(provider: &str, var: &str) -> AuthProfile {
        AuthProfile::new(ProfileType::ApiKey, provider, KeyRef::env("default", var))
    }

    #[tokio::test]
    async fn fresh_agent_dir_defaults_to_empty_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent_dir = temp.path().join("agents/main/agent");
        std::fs::create_dir_all(&agent_dir).unwrap();

        let store = AuthProfileStore::ensure(&agent_dir).await.unwrap();
        let doc = store.document().await;
        assert_eq!(doc.version, 1);
        assert!(doc.profiles.is_empty());
        assert!(doc.last_good.is_empty());
        // No file is created until the first write.
        assert!(!agent_dir.join(STORE_FILE_NAME).exists());
    }

    #[test]
    fn ensure_returns_one_shared_handle_per_directory() {
        tokio_test::block_on(async {
            let temp = tempfile::tempdir().expect("tempdir");
            let agent_dir = temp.path().join("agent");
            std::fs::create_dir_all(&agent_dir).unwrap();

            let a = AuthProfileStore::ensure(&agent_dir).await.unwrap();
            let b = AuthProfileStore::ensure(&agent_dir).await.unwrap();
            assert!(Arc::ptr_eq(&a, &b));
        });
    }

    #[tokio::test]
    async fn malformed_store_file_is_corrupt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent_dir = temp.path().join("agent");
        write_store_file(&agent_dir, "{ not json");

        let err = AuthProfileStore::ensure(&agent_dir).await.unwrap_err();
        assert!(matches!(err, AuthProfileError::StoreCorrupt { .. }));
    }

    #[tokio::test]
    async fn missing_version_field_is_corrupt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent_dir = temp.path().join("agent");
        write_store_file(&agent_dir, r#"{"profiles": {}, "lastGood": {}}"#);

        let err = AuthProfileStore::ensure(&agent_dir).await.unwrap_err();
        assert!(matches!(err, AuthProfileError::StoreCorrupt { .. }));
    }

    #[tokio::test]
    async fn mark_used_unknown_profile_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent_dir = temp.path().join("agent");
        std::fs::create_dir_all(&agent_dir).unwrap();

        let store = AuthProfileStore::ensure(&agent_dir).await.unwrap();
        let err = store.mark_used("nope:default").await.unwrap_err();
        assert!(matches!(err, AuthProfileError::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn mark_used_persists_timestamp_without_key_field() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent_dir = temp.path().join("agent");
        std::fs::create_dir_all(&agent_dir).unwrap();

        let store = AuthProfileStore::ensure(&agent_dir).await.unwrap();
        store
            .ensure_profile("mistral:default", sample_profile("mistral", "MISTRAL_API_KEY"))
            .await
            .unwrap();
        store.mark_used("mistral:default").await.unwrap();

        let raw = std::fs::read_to_string(agent_dir.join(STORE_FILE_NAME)).unwrap();
        let persisted: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let profile = &persisted["profiles"]["mistral:default"];
        assert!(profile.get("lastUsedAt").is_some());
        assert!(profile.get("key").is_none());
        assert_eq!(profile["keyRef"]["id"], "MISTRAL_API_KEY");
    }

    #[tokio::test]
    async fn mark_failed_sets_growing_cooldown_and_mark_good_clears_it() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent_dir = temp.path().join("agent");
        std::fs::create_dir_all(&agent_dir).unwrap();

        let store = AuthProfileStore::ensure(&agent_dir).await.unwrap();
        store
            .ensure_profile("groq:default", sample_profile("groq", "GROQ_API_KEY"))
            .await
            .unwrap();

        store.mark_failed("groq:default").await.unwrap();
        let after_one = store.profile("groq:default").await.unwrap();
        assert_eq!(after_one.failure_count, 1);
        assert!(after_one.is_in_cooldown());

        store.mark_failed("groq:default").await.unwrap();
        let after_two = store.profile("groq:default").await.unwrap();
        assert_eq!(after_two.failure_count, 2);
        assert!(after_two.cooldown_until.unwrap() > after_one.cooldown_until.unwrap());

        store.mark_good("groq", "groq:default").await.unwrap();
        let cleared = store.profile("groq:default").await.unwrap();
        assert_eq!(cleared.failure_count, 0);
        assert!(cleared.cooldown_until.is_none());
        assert_eq!(store.last_good("groq").await.as_deref(), Some("groq:default"));
    }

    #[tokio::test]
    async fn ensure_default_profile_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent_dir = temp.path().join("agent");
        std::fs::create_dir_all(&agent_dir).unwrap();

        let store = AuthProfileStore::ensure(&agent_dir).await.unwrap();
        assert!(store
            .ensure_default_profile(KnownProvider::Anthropic)
            .await
            .unwrap());
        assert!(!store
            .ensure_default_profile(KnownProvider::Anthropic)
            .await
            .unwrap());

        let profile = store.profile("anthropic:default").await.unwrap();
        assert_eq!(profile.key_ref.source, KeySource::Env);
        assert_eq!(profile.key_ref.id, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn round_trip_preserves_untouched_fields() {
        // Load then persist must be a no-op on all fields the writer does
        // not explicitly update.
        let json = serde_json::json!({
            "version": 1,
            "profiles": {
                "cohere:default": {
                    "type": "api_key",
                    "provider": "cohere",
                    "keyRef": {"source": "env", "provider": "default", "id": "COHERE_API_KEY"},
                    "lastUsedAt": "2026-01-05T12:00:00Z"
                }
            },
            "lastGood": {"cohere": "cohere:default"}
        });
        let doc: AuthProfileDoc = serde_json::from_value(json.clone()).unwrap();
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn cooldown_grows_and_caps() {
        assert_eq!(cooldown_for(1).num_seconds(), 5);
        assert_eq!(cooldown_for(2).num_seconds(), 10);
        assert!(cooldown_for(3) > cooldown_for(2));
        assert_eq!(cooldown_for(30).num_seconds(), 3600);
    }
}
