//! Provider payload decoding.
//!
//! Every provider gets its own decoder with an explicit event-name table and a
//! documented amount convention. Unlisted providers fall through to a flat generic
//! shape. Decoding is pure: the only clock input is the `received_at` argument.

use crate::domain::event::{EventStatus, EventType, Provider, ProviderPayload, WebhookEvent};
use crate::error::{ReconError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// How a provider encodes monetary amounts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountConvention {
    /// Decimal in major units, as a JSON number or string (`"1000.50"`).
    MajorUnits,
    /// Integer count of minor units; `exponent` is the number of decimal places (2 for kobo).
    MinorUnits { exponent: u32 },
}

impl AmountConvention {
    pub fn to_major(self, raw: Decimal) -> Result<Decimal> {
        match self {
            AmountConvention::MajorUnits => Ok(raw),
            AmountConvention::MinorUnits { exponent } => {
                if !raw.fract().is_zero() {
                    return Err(ReconError::Transport(format!(
                        "expected an integer minor-unit amount, got {}",
                        raw
                    )));
                }
                raw.normalize()
                    .checked_mul(Decimal::new(1, exponent))
                    .ok_or_else(|| ReconError::Transport(format!("amount {} out of range", raw)))
            }
        }
    }
}

pub trait PayloadDecoder: Send + Sync {
    fn amount_convention(&self) -> AmountConvention;

    fn decode(
        &self,
        provider: &Provider,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookEvent>;
}

/// Resolves a provider to its decoder. Named providers must be registered; anything
/// else is decoded with the generic decoder.
pub struct DecoderRegistry {
    decoders: HashMap<Provider, Box<dyn PayloadDecoder>>,
    fallback: Box<dyn PayloadDecoder>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
            fallback: Box::new(GenericDecoder),
        };
        registry.register(Provider::Paystack, Box::new(PaystackDecoder));
        registry.register(Provider::Monnify, Box::new(MonnifyDecoder));
        registry.register(Provider::Safehaven, Box::new(SafehavenDecoder));
        registry.register(Provider::Bloc, Box::new(BlocDecoder));
        registry
    }
}

impl DecoderRegistry {
    pub fn register(&mut self, provider: Provider, decoder: Box<dyn PayloadDecoder>) {
        self.decoders.insert(provider, decoder);
    }

    pub fn decoder_for(&self, provider: &Provider) -> Result<&dyn PayloadDecoder> {
        match provider {
            Provider::Other(_) => Ok(self.fallback.as_ref()),
            named => self
                .decoders
                .get(named)
                .map(|d| d.as_ref())
                .ok_or_else(|| ReconError::UnsupportedProvider(named.to_string())),
        }
    }

    pub fn normalize(
        &self,
        input: &ProviderPayload,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookEvent> {
        if !input.payload.is_object() {
            return Err(ReconError::Transport(
                "payload must be a JSON object".to_string(),
            ));
        }
        let event = self
            .decoder_for(&input.provider)?
            .decode(&input.provider, &input.payload, received_at)?;
        validate_shape(&event)?;
        Ok(event)
    }
}

fn validate_shape(event: &WebhookEvent) -> Result<()> {
    if event.event_type == EventType::Credit {
        if event.transaction_reference.is_empty() {
            return Err(ReconError::Transport(
                "credit event without a transaction reference".to_string(),
            ));
        }
        if event.account_number.is_empty() {
            return Err(ReconError::Transport(
                "credit event without a destination account number".to_string(),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Field access helpers
// ---------------------------------------------------------------------------

fn value_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Non-empty text at `path`. Numeric identifiers are rendered as strings.
fn text_at(root: &Value, path: &[&str]) -> Option<String> {
    match value_at(root, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(root: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| text_at(root, path))
}

fn decimal_at(root: &Value, path: &[&str]) -> Result<Option<Decimal>> {
    let parsed = match value_at(root, path) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => parse_decimal(s.trim().replace(',', "").as_str()),
        Some(_) => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| ReconError::Transport(format!("unparseable amount at {}", path.join("."))))
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn required_object<'a>(root: &'a Value, key: &str) -> Result<&'a Map<String, Value>> {
    root.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| ReconError::Transport(format!("missing '{}' object", key)))
}

fn required_text(root: &Value, key: &str) -> Result<String> {
    text_at(root, &[key]).ok_or_else(|| ReconError::Transport(format!("missing '{}'", key)))
}

fn timestamp_at(root: &Value, paths: &[&[&str]], fallback: DateTime<Utc>) -> DateTime<Utc> {
    first_text(root, paths)
        .and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        })
        .unwrap_or(fallback)
}

fn amount_at(
    root: &Value,
    paths: &[&[&str]],
    convention: AmountConvention,
    event_type: &EventType,
) -> Result<Decimal> {
    for path in paths {
        if let Some(raw) = decimal_at(root, path)? {
            return convention.to_major(raw);
        }
    }
    if *event_type == EventType::Credit {
        Err(ReconError::Transport(
            "credit event without an amount".to_string(),
        ))
    } else {
        Ok(Decimal::ZERO)
    }
}

fn collect_metadata(root: &Value, fields: &[(&str, &[&str])]) -> BTreeMap<String, Value> {
    fields
        .iter()
        .filter_map(|(name, path)| {
            value_at(root, path)
                .filter(|v| !v.is_null())
                .map(|v| (name.to_string(), v.clone()))
        })
        .collect()
}

fn status_from_table(raw: Option<String>, table: &[(&str, EventStatus)]) -> EventStatus {
    raw.and_then(|s| {
        table
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&s))
            .map(|(_, status)| *status)
    })
    .unwrap_or(EventStatus::Unknown)
}

// ---------------------------------------------------------------------------
// Paystack: {"event": "...", "data": {...}}, amounts in kobo.
// ---------------------------------------------------------------------------

pub struct PaystackDecoder;

impl PaystackDecoder {
    fn event_type(name: &str) -> EventType {
        match name {
            "charge.success" => EventType::Credit,
            "transfer.success" => EventType::Debit,
            "transfer.failed" => EventType::Failed,
            "transfer.reversed" => EventType::Reversal,
            other => EventType::Other(other.to_string()),
        }
    }

    const STATUSES: &'static [(&'static str, EventStatus)] = &[
        ("success", EventStatus::Success),
        ("failed", EventStatus::Failed),
        ("abandoned", EventStatus::Failed),
        ("pending", EventStatus::Pending),
        ("ongoing", EventStatus::Pending),
        ("reversed", EventStatus::Reversed),
    ];
}

impl PayloadDecoder for PaystackDecoder {
    fn amount_convention(&self) -> AmountConvention {
        AmountConvention::MinorUnits { exponent: 2 }
    }

    fn decode(
        &self,
        provider: &Provider,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookEvent> {
        let name = required_text(payload, "event")?;
        required_object(payload, "data")?;
        let event_type = Self::event_type(&name);
        let data = &payload["data"];

        Ok(WebhookEvent {
            provider: provider.clone(),
            transaction_reference: text_at(data, &["reference"]).unwrap_or_default(),
            provider_reference: text_at(data, &["id"]),
            account_number: first_text(
                data,
                &[
                    &["authorization", "receiver_bank_account_number"],
                    &["metadata", "receiver_account_number"],
                ],
            )
            .unwrap_or_default(),
            account_name: text_at(data, &["authorization", "account_name"]),
            amount: amount_at(data, &[&["amount"]], self.amount_convention(), &event_type)?,
            currency: text_at(data, &["currency"]).unwrap_or_else(|| "NGN".to_string()),
            status: status_from_table(text_at(data, &["status"]), Self::STATUSES),
            customer_email: text_at(data, &["customer", "email"]),
            customer_id: text_at(data, &["customer", "customer_code"]),
            session_id: text_at(data, &["authorization", "session_id"]),
            bank_name: text_at(data, &["authorization", "sender_bank"]),
            bank_code: text_at(data, &["authorization", "sender_bank_code"]),
            description: first_text(data, &[&["authorization", "narration"], &["reason"]])
                .unwrap_or_else(|| "Paystack funding".to_string()),
            metadata: collect_metadata(
                data,
                &[
                    ("channel", &["channel"]),
                    ("provider_fees_minor", &["fees"]),
                    ("sender_name", &["authorization", "sender_name"]),
                ],
            ),
            timestamp: timestamp_at(data, &[&["paid_at"], &["created_at"]], received_at),
            raw_payload: payload.clone(),
            event_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Monnify: {"eventType": "...", "eventData": {...}}, decimal major-unit amounts.
// ---------------------------------------------------------------------------

pub struct MonnifyDecoder;

impl MonnifyDecoder {
    fn event_type(name: &str) -> EventType {
        match name {
            "SUCCESSFUL_TRANSACTION" => EventType::Credit,
            "SUCCESSFUL_DISBURSEMENT" => EventType::Debit,
            "FAILED_DISBURSEMENT" => EventType::Failed,
            "REVERSED_DISBURSEMENT" => EventType::Reversal,
            other => EventType::Other(other.to_string()),
        }
    }

    const STATUSES: &'static [(&'static str, EventStatus)] = &[
        ("PAID", EventStatus::Success),
        ("OVERPAID", EventStatus::Success),
        ("SUCCESS", EventStatus::Success),
        ("PARTIALLY_PAID", EventStatus::Pending),
        ("PENDING", EventStatus::Pending),
        ("FAILED", EventStatus::Failed),
        ("EXPIRED", EventStatus::Failed),
        ("REVERSED", EventStatus::Reversed),
    ];
}

impl PayloadDecoder for MonnifyDecoder {
    fn amount_convention(&self) -> AmountConvention {
        AmountConvention::MajorUnits
    }

    fn decode(
        &self,
        provider: &Provider,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookEvent> {
        let name = required_text(payload, "eventType")?;
        required_object(payload, "eventData")?;
        let event_type = Self::event_type(&name);
        let data = &payload["eventData"];

        Ok(WebhookEvent {
            provider: provider.clone(),
            transaction_reference: first_text(data, &[&["transactionReference"], &["reference"]])
                .unwrap_or_default(),
            provider_reference: text_at(data, &["paymentReference"]),
            account_number: first_text(
                data,
                &[
                    &["destinationAccountInformation", "accountNumber"],
                    &["destinationAccountNumber"],
                ],
            )
            .unwrap_or_default(),
            account_name: text_at(data, &["destinationAccountInformation", "accountName"]),
            amount: amount_at(
                data,
                &[&["amountPaid"], &["amount"]],
                self.amount_convention(),
                &event_type,
            )?,
            currency: text_at(data, &["currency"]).unwrap_or_else(|| "NGN".to_string()),
            status: status_from_table(
                first_text(data, &[&["paymentStatus"], &["status"]]),
                Self::STATUSES,
            ),
            customer_email: text_at(data, &["customer", "email"]),
            customer_id: text_at(data, &["product", "reference"]),
            session_id: text_at(data, &["paymentSourceInformation", "0", "sessionId"]),
            bank_name: text_at(data, &["destinationAccountInformation", "bankName"]),
            bank_code: text_at(data, &["destinationAccountInformation", "bankCode"]),
            description: text_at(data, &["paymentDescription"])
                .unwrap_or_else(|| "Monnify funding".to_string()),
            metadata: collect_metadata(
                data,
                &[
                    ("payment_method", &["paymentMethod"]),
                    ("settlement_amount", &["settlementAmount"]),
                    ("customer_name", &["customer", "name"]),
                ],
            ),
            timestamp: timestamp_at(data, &[&["paidOn"], &["completedOn"]], received_at),
            raw_payload: payload.clone(),
            event_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Safehaven: {"type": "...", "data": {...}}, decimal major-unit amounts.
// ---------------------------------------------------------------------------

pub struct SafehavenDecoder;

impl SafehavenDecoder {
    fn event_type(name: &str) -> EventType {
        match name {
            "virtualAccount.transfer" => EventType::Credit,
            "transfer.outwards" => EventType::Debit,
            "transfer.failed" => EventType::Failed,
            "transfer.reversed" => EventType::Reversal,
            other => EventType::Other(other.to_string()),
        }
    }

    const STATUSES: &'static [(&'static str, EventStatus)] = &[
        ("Completed", EventStatus::Success),
        ("Successful", EventStatus::Success),
        ("Created", EventStatus::Pending),
        ("Pending", EventStatus::Pending),
        ("Failed", EventStatus::Failed),
        ("Reversed", EventStatus::Reversed),
    ];
}

impl PayloadDecoder for SafehavenDecoder {
    fn amount_convention(&self) -> AmountConvention {
        AmountConvention::MajorUnits
    }

    fn decode(
        &self,
        provider: &Provider,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookEvent> {
        let name = required_text(payload, "type")?;
        required_object(payload, "data")?;
        let event_type = Self::event_type(&name);
        let data = &payload["data"];

        Ok(WebhookEvent {
            provider: provider.clone(),
            transaction_reference: text_at(data, &["paymentReference"]).unwrap_or_default(),
            provider_reference: text_at(data, &["_id"]),
            account_number: text_at(data, &["creditAccountNumber"]).unwrap_or_default(),
            account_name: text_at(data, &["creditAccountName"]),
            amount: amount_at(data, &[&["amount"]], self.amount_convention(), &event_type)?,
            currency: text_at(data, &["currency"]).unwrap_or_else(|| "NGN".to_string()),
            status: status_from_table(text_at(data, &["status"]), Self::STATUSES),
            customer_email: None,
            customer_id: text_at(data, &["client"]),
            session_id: text_at(data, &["sessionId"]),
            bank_name: text_at(data, &["debitBankName"]),
            bank_code: text_at(data, &["debitBankCode"]),
            description: text_at(data, &["narration"])
                .unwrap_or_else(|| "Safehaven funding".to_string()),
            metadata: collect_metadata(
                data,
                &[
                    ("provider_fees", &["fees"]),
                    ("debit_account_number", &["debitAccountNumber"]),
                    ("debit_account_name", &["debitAccountName"]),
                ],
            ),
            timestamp: timestamp_at(data, &[&["createdAt"]], received_at),
            raw_payload: payload.clone(),
            event_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Bloc: {"event": "...", "data": {...}}, amounts in kobo.
// ---------------------------------------------------------------------------

pub struct BlocDecoder;

impl BlocDecoder {
    fn event_type(name: &str) -> EventType {
        match name {
            "account.credit" => EventType::Credit,
            "account.debit" => EventType::Debit,
            "transfer.failed" => EventType::Failed,
            "transaction.reversed" => EventType::Reversal,
            "transaction.pending" => EventType::Pending,
            other => EventType::Other(other.to_string()),
        }
    }

    const STATUSES: &'static [(&'static str, EventStatus)] = &[
        ("successful", EventStatus::Success),
        ("success", EventStatus::Success),
        ("pending", EventStatus::Pending),
        ("failed", EventStatus::Failed),
        ("reversed", EventStatus::Reversed),
    ];
}

impl PayloadDecoder for BlocDecoder {
    fn amount_convention(&self) -> AmountConvention {
        AmountConvention::MinorUnits { exponent: 2 }
    }

    fn decode(
        &self,
        provider: &Provider,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookEvent> {
        let name = required_text(payload, "event")?;
        required_object(payload, "data")?;
        let event_type = Self::event_type(&name);
        let data = &payload["data"];

        Ok(WebhookEvent {
            provider: provider.clone(),
            transaction_reference: text_at(data, &["reference"]).unwrap_or_default(),
            provider_reference: text_at(data, &["id"]),
            account_number: first_text(
                data,
                &[&["meta_data", "account_number"], &["account_number"]],
            )
            .unwrap_or_default(),
            account_name: text_at(data, &["meta_data", "account_name"]),
            amount: amount_at(data, &[&["amount"]], self.amount_convention(), &event_type)?,
            currency: text_at(data, &["currency"]).unwrap_or_else(|| "NGN".to_string()),
            status: status_from_table(text_at(data, &["status"]), Self::STATUSES),
            customer_email: text_at(data, &["meta_data", "customer_email"]),
            customer_id: text_at(data, &["customer_id"]),
            session_id: text_at(data, &["meta_data", "session_id"]),
            bank_name: text_at(data, &["meta_data", "sender_bank_name"]),
            bank_code: text_at(data, &["meta_data", "sender_bank_code"]),
            description: text_at(data, &["narration"])
                .unwrap_or_else(|| "Bloc funding".to_string()),
            metadata: collect_metadata(
                data,
                &[
                    ("drcr", &["drcr"]),
                    ("account_id", &["account_id"]),
                    ("sender_account_name", &["meta_data", "sender_account_name"]),
                ],
            ),
            timestamp: timestamp_at(data, &[&["created_at"]], received_at),
            raw_payload: payload.clone(),
            event_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Generic: flat object, decimal major-unit amounts.
// ---------------------------------------------------------------------------

pub struct GenericDecoder;

impl GenericDecoder {
    fn event_type(name: &str) -> EventType {
        match name {
            "credit" | "payment.success" => EventType::Credit,
            "debit" => EventType::Debit,
            "failed" => EventType::Failed,
            "pending" => EventType::Pending,
            "reversal" => EventType::Reversal,
            other => EventType::Other(other.to_string()),
        }
    }

    const STATUSES: &'static [(&'static str, EventStatus)] = &[
        ("success", EventStatus::Success),
        ("successful", EventStatus::Success),
        ("completed", EventStatus::Success),
        ("pending", EventStatus::Pending),
        ("failed", EventStatus::Failed),
        ("reversed", EventStatus::Reversed),
    ];
}

impl PayloadDecoder for GenericDecoder {
    fn amount_convention(&self) -> AmountConvention {
        AmountConvention::MajorUnits
    }

    fn decode(
        &self,
        provider: &Provider,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookEvent> {
        let name = required_text(payload, "event")?;
        let event_type = Self::event_type(&name);

        Ok(WebhookEvent {
            provider: provider.clone(),
            transaction_reference: text_at(payload, &["reference"]).unwrap_or_default(),
            provider_reference: text_at(payload, &["providerReference"]),
            account_number: text_at(payload, &["accountNumber"]).unwrap_or_default(),
            account_name: text_at(payload, &["accountName"]),
            amount: amount_at(payload, &[&["amount"]], self.amount_convention(), &event_type)?,
            currency: text_at(payload, &["currency"]).unwrap_or_else(|| "NGN".to_string()),
            status: status_from_table(text_at(payload, &["status"]), Self::STATUSES),
            customer_email: text_at(payload, &["customerEmail"]),
            customer_id: text_at(payload, &["customerId"]),
            session_id: text_at(payload, &["sessionId"]),
            bank_name: text_at(payload, &["bankName"]),
            bank_code: text_at(payload, &["bankCode"]),
            description: text_at(payload, &["description"])
                .unwrap_or_else(|| format!("{} funding", provider)),
            metadata: payload
                .get("metadata")
                .and_then(Value::as_object)
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            timestamp: timestamp_at(payload, &[&["timestamp"]], received_at),
            raw_payload: payload.clone(),
            event_type,
        })
    }
}
