use crate::config::{AppConfig, DeploymentMode, ProviderCredentials};
use crate::domain::event::Provider;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Sha256, Sha512};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// How a provider proves a webhook came from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Hex HMAC-SHA512 of the JSON body keyed by the shared secret.
    HmacSha512Body,
    /// Hex HMAC-SHA256 of the JSON body keyed by the shared secret.
    HmacSha256Body,
    /// Base64 HMAC-SHA256 of the provider's public client id keyed by the shared secret.
    HmacSha256ClientId,
    /// No published scheme; only the envelope shape is checked.
    Structural,
}

impl SignatureScheme {
    pub fn for_provider(provider: &Provider) -> Self {
        match provider {
            Provider::Paystack | Provider::Monnify => SignatureScheme::HmacSha512Body,
            Provider::Safehaven => SignatureScheme::HmacSha256ClientId,
            Provider::Bloc => SignatureScheme::Structural,
            Provider::Other(_) => SignatureScheme::HmacSha256Body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    pub reason: String,
    /// Accepted without a cryptographic check (development mode, no secret configured).
    pub warning: bool,
}

impl Verification {
    fn valid(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            reason: reason.into(),
            warning: false,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
            warning: false,
        }
    }

    fn accepted_with_warning(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            reason: reason.into(),
            warning: true,
        }
    }
}

pub struct SignatureVerifier {
    mode: DeploymentMode,
    credentials: BTreeMap<String, ProviderCredentials>,
}

impl SignatureVerifier {
    pub fn new(mode: DeploymentMode, credentials: BTreeMap<String, ProviderCredentials>) -> Self {
        Self { mode, credentials }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.mode, config.providers.clone())
    }

    /// Checks a delivery against its provider's scheme.
    ///
    /// `raw_body` is the exact request body; `payload` is its parsed form, re-serialised
    /// as canonical JSON when the raw bytes do not match.
    pub fn verify(
        &self,
        provider: &Provider,
        raw_body: &[u8],
        payload: &Value,
        signature: Option<&str>,
    ) -> Verification {
        let scheme = SignatureScheme::for_provider(provider);
        if scheme == SignatureScheme::Structural {
            return match structural_check(provider, payload) {
                Ok(()) => Verification::valid("structural validation only"),
                Err(reason) => Verification::invalid(reason),
            };
        }

        let credentials = self.credentials.get(provider.as_str());
        let secret = credentials
            .and_then(|c| c.secret.as_deref())
            .filter(|s| !s.is_empty());
        let Some(secret) = secret else {
            return self.missing_configuration(provider, "no webhook secret configured");
        };

        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            return Verification::invalid("signature header missing");
        };

        let matched = match scheme {
            SignatureScheme::HmacSha512Body => {
                body_candidates(raw_body, payload)
                    .iter()
                    .any(|body| verify_hex::<HmacSha512>(secret, body, signature))
            }
            SignatureScheme::HmacSha256Body => {
                body_candidates(raw_body, payload)
                    .iter()
                    .any(|body| verify_hex::<HmacSha256>(secret, body, signature))
            }
            SignatureScheme::HmacSha256ClientId => {
                let client_id = credentials
                    .and_then(|c| c.client_id.as_deref())
                    .filter(|s| !s.is_empty());
                let Some(client_id) = client_id else {
                    return self.missing_configuration(provider, "no client id configured");
                };
                verify_base64_client_id(secret, client_id, signature)
            }
            SignatureScheme::Structural => false,
        };

        if matched {
            Verification::valid("signature verified")
        } else {
            Verification::invalid("signature mismatch")
        }
    }

    fn missing_configuration(&self, provider: &Provider, detail: &str) -> Verification {
        match self.mode {
            DeploymentMode::Production => {
                Verification::invalid(format!("{} for {}", detail, provider))
            }
            DeploymentMode::Development => {
                tracing::warn!(
                    provider = %provider,
                    "{}; accepting unsigned webhook in development mode",
                    detail
                );
                Verification::accepted_with_warning(format!(
                    "{} for {} (development mode)",
                    detail, provider
                ))
            }
        }
    }
}

fn body_candidates(raw_body: &[u8], payload: &Value) -> Vec<Vec<u8>> {
    let mut candidates = vec![raw_body.to_vec()];
    if let Ok(canonical) = serde_json::to_vec(payload)
        && canonical != raw_body
    {
        candidates.push(canonical);
    }
    candidates
}

/// Constant-time comparison through `Mac::verify_slice`.
fn verify_hex<M: Mac + hmac::digest::KeyInit>(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = <M as Mac>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn verify_base64_client_id(secret: &str, client_id: &str, signature: &str) -> bool {
    let Ok(provided) = BASE64.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(client_id.as_bytes());
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

fn structural_check(provider: &Provider, payload: &Value) -> Result<(), String> {
    let object = payload
        .as_object()
        .ok_or_else(|| format!("{} payload is not a JSON object", provider))?;
    let has_text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    };
    if !has_text("event") {
        return Err(format!("{} payload has no event name", provider));
    }
    match object.get("data") {
        Some(Value::Object(data)) if data.contains_key("reference") => Ok(()),
        _ => Err(format!("{} payload has no data.reference", provider)),
    }
}
