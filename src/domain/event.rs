use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// An external payment provider that settles into wallets.
///
/// Unlisted providers arrive through the generic endpoint as `Other`, carrying the
/// lower-cased path segment they were posted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    Paystack,
    Monnify,
    Safehaven,
    Bloc,
    Other(String),
}

impl Provider {
    /// Named providers with a dedicated endpoint.
    pub const NAMED: [Provider; 4] = [
        Provider::Paystack,
        Provider::Monnify,
        Provider::Safehaven,
        Provider::Bloc,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Provider::Paystack => "paystack",
            Provider::Monnify => "monnify",
            Provider::Safehaven => "safehaven",
            Provider::Bloc => "bloc",
            Provider::Other(name) => name,
        }
    }

    /// Header carrying the provider's signature, if the provider signs at all.
    pub fn signature_header(&self) -> Option<&'static str> {
        match self {
            Provider::Paystack => Some("x-paystack-signature"),
            Provider::Monnify => Some("monnify-signature"),
            Provider::Safehaven => Some("x-safehaven-signature"),
            Provider::Bloc => None,
            Provider::Other(_) => Some("x-webhook-signature"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "paystack" => Ok(Provider::Paystack),
            "monnify" => Ok(Provider::Monnify),
            "safehaven" => Ok(Provider::Safehaven),
            "bloc" => Ok(Provider::Bloc),
            _ if !name.is_empty()
                && name.len() <= 64
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
            {
                Ok(Provider::Other(name))
            }
            _ => Err(format!("invalid provider name '{}'", s)),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.as_str().to_string()
    }
}

/// Canonical category of a provider notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    Credit,
    Debit,
    Failed,
    Pending,
    Reversal,
    /// A provider event name with no entry in that provider's lookup table.
    Other(String),
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Credit => f.write_str("CREDIT"),
            EventType::Debit => f.write_str("DEBIT"),
            EventType::Failed => f.write_str("FAILED"),
            EventType::Pending => f.write_str("PENDING"),
            EventType::Reversal => f.write_str("REVERSAL"),
            EventType::Other(name) => write!(f, "OTHER:{}", name),
        }
    }
}

/// Canonical settlement status reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Success,
    Failed,
    Pending,
    Reversed,
    Unknown,
}

/// A provider-independent settlement notification.
///
/// Lives only for the duration of one webhook request.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub provider: Provider,
    pub event_type: EventType,
    pub transaction_reference: String,
    /// Secondary identifier some providers send alongside the main reference.
    pub provider_reference: Option<String>,
    pub account_number: String,
    pub account_name: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: EventStatus,
    pub customer_email: Option<String>,
    pub customer_id: Option<String>,
    pub session_id: Option<String>,
    pub bank_name: Option<String>,
    pub bank_code: Option<String>,
    pub description: String,
    pub metadata: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub raw_payload: Value,
}

impl WebhookEvent {
    /// Only successful credit notifications move money into a wallet.
    pub fn is_credit(&self) -> bool {
        self.event_type == EventType::Credit && self.status == EventStatus::Success
    }
}

/// A raw provider payload tagged with the provider it came from.
#[derive(Debug, Clone)]
pub struct ProviderPayload {
    pub provider: Provider,
    pub payload: Value,
}
