use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, Serialize)]
pub struct VoiceClientConfig {
    pub app_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceHandshake {
    pub ts: String,
    pub signa: String,
}

/// Signs the speech-service WebSocket handshake so the shared secret
/// never leaves the server.
#[derive(Clone)]
pub struct VoiceSigner {
    app_id: String,
    api_key: String,
    api_secret: String,
}

impl VoiceSigner {
    pub fn new(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn client_config(&self) -> VoiceClientConfig {
        VoiceClientConfig {
            app_id: self.app_id.clone(),
            api_key: self.api_key.clone(),
        }
    }

    pub fn handshake(&self) -> VoiceHandshake {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();
        self.handshake_at(&ts)
    }

    fn handshake_at(&self, ts: &str) -> VoiceHandshake {
        let mut mac = HmacSha1::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(self.app_id.as_bytes());
        mac.update(ts.as_bytes());
        VoiceHandshake {
            ts: ts.to_string(),
            signa: STANDARD.encode(mac.finalize().into_bytes()),
        }
    }
}
