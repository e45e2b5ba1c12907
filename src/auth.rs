use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

type HmacSha256 = Hmac<Sha256>;

/// Unsalted SHA-256, hex-encoded. Weak on purpose: the stored hashes must
/// stay interchangeable with the existing user table, so this scheme is
/// kept rather than upgraded.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Issues a stateless session token: `base64url(user_id:expiry:mac)`
/// where the MAC covers `user_id:expiry`.
pub fn issue_session(user_id: i64, secret: &str) -> String {
    let expires_at = now_ts() + SESSION_TTL_SECS;
    sign_session(user_id, expires_at, secret)
}

pub fn verify_session(token: &str, secret: &str) -> Option<i64> {
    let decoded = URL_SAFE_NO_PAD.decode(token.as_bytes()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let mut parts = decoded.splitn(3, ':');
    let user_id: i64 = parts.next()?.parse().ok()?;
    let expires_at: i64 = parts.next()?.parse().ok()?;
    let mac = parts.next()?;

    if mac != session_mac(user_id, expires_at, secret) {
        return None;
    }
    if expires_at <= now_ts() {
        return None;
    }
    Some(user_id)
}

fn sign_session(user_id: i64, expires_at: i64, secret: &str) -> String {
    let mac = session_mac(user_id, expires_at, secret);
    URL_SAFE_NO_PAD.encode(format!("{user_id}:{expires_at}:{mac}"))
}

fn session_mac(user_id: i64, expires_at: i64, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(format!("{user_id}:{expires_at}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
