use serde::{Deserialize, Serialize};

const DEFAULT_SECRET_KEY: &str = "dev-secret-key-change-in-production";
const DEFAULT_AI_MODEL: &str = "qwen-plus";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoiceConfig {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapConfig {
    pub api_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudStoreConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub secret_key: String,
    pub ai: AiConfig,
    pub voice: VoiceConfig,
    pub map: MapConfig,
    pub cloud: CloudStoreConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).unwrap_or_default();
        Self {
            secret_key: lookup("SECRET_KEY").unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string()),
            ai: AiConfig {
                api_key: var("AI_API_KEY"),
                model: lookup("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
                base_url: lookup("AI_BASE_URL").filter(|value| !value.trim().is_empty()),
            },
            voice: VoiceConfig {
                app_id: var("VOICE_APP_ID"),
                api_key: var("VOICE_API_KEY"),
                api_secret: var("VOICE_API_SECRET"),
            },
            map: MapConfig {
                api_key: var("AMAP_API_KEY"),
                secret_key: var("AMAP_SECRET_KEY"),
            },
            cloud: CloudStoreConfig {
                url: var("SUPABASE_URL"),
                key: var("SUPABASE_KEY"),
            },
        }
    }

    /// Cloud storage is used only when both credentials are present.
    pub fn use_cloud_store(&self) -> bool {
        !self.cloud.url.trim().is_empty() && !self.cloud.key.trim().is_empty()
    }
}
