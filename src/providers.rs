//! Built-in provider presets for OpenAI-compatible backends.
//!
//! Each preset defines the base URL, the wire protocol the backend speaks,
//! and the default environment variable for its API key. Users specify a
//! provider name in their config and the preset fills in the details.

use serde::{Deserialize, Serialize};

/// Which `OpenAI` protocol the backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireApi {
    /// `POST {base}/chat/completions`
    Chat,
    /// `POST {base}/responses`
    Responses,
}

impl WireApi {
    pub fn path(self) -> &'static str {
        match self {
            WireApi::Chat => "chat/completions",
            WireApi::Responses => "responses",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "chat" | "chat_completions" => Some(WireApi::Chat),
            "responses" => Some(WireApi::Responses),
            _ => None,
        }
    }
}

impl std::fmt::Display for WireApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireApi::Chat => f.write_str("chat"),
            WireApi::Responses => f.write_str("responses"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub api: WireApi,
    pub default_api_key_env: &'static str,
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        api: WireApi::Responses,
        default_api_key_env: "OPENAI_API_KEY",
    },
    ProviderPreset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        api: WireApi::Chat,
        default_api_key_env: "OPENROUTER_API_KEY",
    },
    ProviderPreset {
        name: "fireworks",
        base_url: "https://api.fireworks.ai/inference/v1",
        api: WireApi::Chat,
        default_api_key_env: "FIREWORKS_API_KEY",
    },
    ProviderPreset {
        name: "grok",
        base_url: "https://api.x.ai/v1",
        api: WireApi::Chat,
        default_api_key_env: "XAI_API_KEY",
    },
    ProviderPreset {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        api: WireApi::Chat,
        default_api_key_env: "GROQ_API_KEY",
    },
    ProviderPreset {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        api: WireApi::Chat,
        default_api_key_env: "DEEPSEEK_API_KEY",
    },
    ProviderPreset {
        name: "ollama",
        base_url: "http://localhost:11434/v1",
        api: WireApi::Chat,
        default_api_key_env: "OLLAMA_API_KEY",
    },
];

impl ProviderPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static ProviderPreset> {
        let name = name.to_lowercase();
        PRESETS.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn all() -> &'static [ProviderPreset] {
        PRESETS
    }
}
