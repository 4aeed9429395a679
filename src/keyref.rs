//! Key references and their resolution.
//!
//! A [`KeyRef`] is a durable pointer to *where* a secret lives (an
//! environment variable, a file on disk, or a config-supplied literal),
//! never the secret itself. Resolution is a pure function of the reference
//! plus the supplied environment/config context; caching happens one layer up
//! in the runtime snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AuthProfileError, Result};

/// Where a referenced secret is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Process environment variable; `id` is the variable name.
    Env,
    /// File on the local filesystem; `id` is the path, contents are trimmed.
    File,
    /// Config-supplied literal; `id` indexes into [`SecretsConfig::secrets`].
    Literal,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "env"),
            Self::File => write!(f, "file"),
            Self::Literal => write!(f, "literal"),
        }
    }
}

/// Durable reference to a secret value.
///
/// Two key references are equal iff all fields match. `provider` names the
/// account slot within the provider (usually `"default"`), `id` identifies
/// the secret within its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    pub source: KeySource,
    pub provider: String,
    pub id: String,
}

impl KeyRef {
    /// Reference an environment variable.
    pub fn env(provider: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            source: KeySource::Env,
            provider: provider.into(),
            id: var.into(),
        }
    }
}

impl std::fmt::Display for KeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.source, self.provider, self.id)
    }
}

/// Configuration context handed to the resolver.
///
/// `secrets` carries config-supplied literal values keyed by the id a
/// `literal` key reference uses. Keeping literals here (rather than inside
/// the reference) means the persisted store never contains plaintext even
/// when a user configures keys inline.
#[derive(Debug, Clone, Default)]
pub struct SecretsConfig {
    pub secrets: HashMap<String, String>,
}

/// Resolve a key reference to its plaintext value.
///
/// Deterministic, side-effect free. Fails with
/// [`AuthProfileError::KeyNotFound`] when the referenced secret is absent or
/// empty.
pub fn resolve(
    key_ref: &KeyRef,
    env: &HashMap<String, String>,
    config: &SecretsConfig,
) -> Result<String> {
    let value = match key_ref.source {
        KeySource::Env => env.get(&key_ref.id).cloned(),
        KeySource::File => std::fs::read_to_string(&key_ref.id)
            .ok()
            .map(|contents| contents.trim().to_string()),
        KeySource::Literal => config.secrets.get(&key_ref.id).cloned(),
    };

    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthProfileError::KeyNotFound(key_ref.to_string())),
    }
}
