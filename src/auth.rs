use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Payload claims read without verifying the signature.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub exp: Option<i64>,
}

/// The client holds no signing secret, so only the framing and payload are
/// checked here. Expiry is compared separately in [`is_expired`].
pub fn decode_claims(token: &str) -> anyhow::Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_claims(token).ok()?.exp?;
    DateTime::from_timestamp(exp, 0)
}

/// Undecodable tokens and tokens without `exp` count as expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(expiry) => expiry <= now,
        None => true,
    }
}

#[cfg(test)]
pub(crate) fn token_with_payload(payload: &str) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload)
    )
}
