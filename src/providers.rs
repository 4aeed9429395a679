//! Known model provider registry.
//!
//! Maps canonical provider ids to display names and the conventional
//! environment variable carrying that provider's API key. Used to seed
//! `<provider>:default` profiles in fresh stores.

use crate::keyref::KeyRef;

/// Model providers this crate knows conventional credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownProvider {
    Anthropic,
    OpenAI,
    Google,
    OpenRouter,
    Mistral,
    Groq,
    Xai,
    DeepInfra,
    Cerebras,
    Cohere,
    TogetherAI,
    Perplexity,
}

impl KnownProvider {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Anthropic => "Anthropic",
            Self::OpenAI => "OpenAI",
            Self::Google => "Google AI",
            Self::OpenRouter => "OpenRouter",
            Self::Mistral => "Mistral AI",
            Self::Groq => "Groq",
            Self::Xai => "xAI",
            Self::DeepInfra => "DeepInfra",
            Self::Cerebras => "Cerebras",
            Self::Cohere => "Cohere",
            Self::TogetherAI => "Together AI",
            Self::Perplexity => "Perplexity",
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::Google => "google",
            Self::OpenRouter => "openrouter",
            Self::Mistral => "mistral",
            Self::Groq => "groq",
            Self::Xai => "xai",
            Self::DeepInfra => "deepinfra",
            Self::Cerebras => "cerebras",
            Self::Cohere => "cohere",
            Self::TogetherAI => "together-ai",
            Self::Perplexity => "perplexity",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAI),
            "google" => Some(Self::Google),
            "openrouter" => Some(Self::OpenRouter),
            "mistral" => Some(Self::Mistral),
            "groq" => Some(Self::Groq),
            "xai" => Some(Self::Xai),
            "deepinfra" => Some(Self::DeepInfra),
            "cerebras" => Some(Self::Cerebras),
            "cohere" => Some(Self::Cohere),
            "together-ai" => Some(Self::TogetherAI),
            "perplexity" => Some(Self::Perplexity),
            _ => None,
        }
    }

    /// Conventional environment variable carrying this provider's API key.
    pub fn env_var_name(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Xai => "XAI_API_KEY",
            Self::DeepInfra => "DEEPINFRA_API_KEY",
            Self::Cerebras => "CEREBRAS_API_KEY",
            Self::Cohere => "COHERE_API_KEY",
            Self::TogetherAI => "TOGETHER_API_KEY",
            Self::Perplexity => "PERPLEXITY_API_KEY",
        }
    }

    /// Profile id of the default profile for this provider (e.g. `openai:default`).
    pub fn default_profile_id(&self) -> String {
        format!("{}:default", self.id())
    }

    /// Key reference pointing at the provider's conventional env var.
    pub fn default_key_ref(&self) -> KeyRef {
        KeyRef::env("default", self.env_var_name())
    }
}

impl std::fmt::Display for KnownProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
