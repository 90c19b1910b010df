use crate::domain::event::Provider;
use crate::domain::fee::{FeeConfiguration, GENERIC_FUNDING, funding_fee_type};
use crate::domain::money::Amount;
use crate::domain::ports::FeeConfigStoreArc;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Where a fee came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeSource {
    ProviderRule,
    GenericRule,
    BuiltInDefault,
    Exempt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub fee: Decimal,
    pub source: FeeSource,
    pub fee_type: Option<String>,
}

/// One step of the fee lookup chain. Returning `None` passes to the next step.
#[async_trait]
pub trait FeeResolver: Send + Sync {
    fn source(&self) -> FeeSource;
    async fn resolve(&self, provider: &Provider) -> Result<Option<FeeConfiguration>>;
}

/// Active `FUNDING_<PROVIDER>` row.
pub struct ProviderFeeResolver {
    store: FeeConfigStoreArc,
}

impl ProviderFeeResolver {
    pub fn new(store: FeeConfigStoreArc) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FeeResolver for ProviderFeeResolver {
    fn source(&self) -> FeeSource {
        FeeSource::ProviderRule
    }

    async fn resolve(&self, provider: &Provider) -> Result<Option<FeeConfiguration>> {
        self.store.find_active(&funding_fee_type(provider)).await
    }
}

/// Active provider-agnostic `FUNDING` row.
pub struct GenericFeeResolver {
    store: FeeConfigStoreArc,
}

impl GenericFeeResolver {
    pub fn new(store: FeeConfigStoreArc) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FeeResolver for GenericFeeResolver {
    fn source(&self) -> FeeSource {
        FeeSource::GenericRule
    }

    async fn resolve(&self, _provider: &Provider) -> Result<Option<FeeConfiguration>> {
        self.store.find_active(GENERIC_FUNDING).await
    }
}

/// Built-in schedule used when no rule is configured. Always resolves.
pub struct DefaultFeeResolver;

impl DefaultFeeResolver {
    pub fn schedule(provider: &Provider) -> FeeConfiguration {
        let fee_type = funding_fee_type(provider);
        match provider {
            Provider::Paystack => FeeConfiguration::percentage(fee_type, dec!(1.5))
                .with_bounds(None, Some(dec!(2000))),
            Provider::Monnify => FeeConfiguration::percentage(fee_type, dec!(1.0))
                .with_bounds(None, Some(dec!(300))),
            Provider::Bloc => FeeConfiguration::percentage(fee_type, dec!(0.5))
                .with_bounds(None, Some(dec!(500))),
            Provider::Safehaven | Provider::Other(_) => {
                FeeConfiguration::fixed(fee_type, Decimal::ZERO)
            }
        }
    }
}

#[async_trait]
impl FeeResolver for DefaultFeeResolver {
    fn source(&self) -> FeeSource {
        FeeSource::BuiltInDefault
    }

    async fn resolve(&self, provider: &Provider) -> Result<Option<FeeConfiguration>> {
        Ok(Some(Self::schedule(provider)))
    }
}

/// Providers that never carry a fee, whatever the configured rules say.
pub fn is_fee_exempt(provider: &Provider) -> bool {
    matches!(provider, Provider::Safehaven)
}

/// Resolves and computes the fee on a credit.
///
/// Resolvers are tried in order and the first rule found is applied. The fee is
/// rounded to the amount's own scale (at least two places). It is not capped at the
/// gross amount here; the ledger updater rejects fees that would leave nothing to credit.
pub struct FeeCalculator {
    resolvers: Vec<Box<dyn FeeResolver>>,
}

impl FeeCalculator {
    /// Provider rule, then generic rule, then the built-in schedule.
    pub fn new(store: FeeConfigStoreArc) -> Self {
        Self::with_resolvers(vec![
            Box::new(ProviderFeeResolver::new(store.clone())),
            Box::new(GenericFeeResolver::new(store)),
            Box::new(DefaultFeeResolver),
        ])
    }

    pub fn with_resolvers(resolvers: Vec<Box<dyn FeeResolver>>) -> Self {
        Self { resolvers }
    }

    pub async fn calculate(&self, provider: &Provider, amount: Amount) -> Result<FeeQuote> {
        if is_fee_exempt(provider) {
            return Ok(FeeQuote {
                fee: Decimal::ZERO,
                source: FeeSource::Exempt,
                fee_type: None,
            });
        }

        for resolver in &self.resolvers {
            if let Some(rule) = resolver.resolve(provider).await? {
                let fee = rule.compute(amount.value(), amount.scale())?;
                tracing::debug!(
                    provider = %provider,
                    fee_type = %rule.fee_type,
                    %fee,
                    "fee resolved"
                );
                return Ok(FeeQuote {
                    fee,
                    source: resolver.source(),
                    fee_type: Some(rule.fee_type),
                });
            }
        }

        Ok(FeeQuote {
            fee: Decimal::ZERO,
            source: FeeSource::BuiltInDefault,
            fee_type: None,
        })
    }
}
