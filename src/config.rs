use crate::core::currency::CurrencyCode;
use crate::core::ids::InvoiceId;
use crate::core::pool::PoolTerms;
use crate::error::{FundingError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What happens to tranche-priority cash left after every investment has
/// reached its expected-return cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurplusPolicy {
    /// Refund the surplus to the exporter that owns the invoice.
    ReturnToExporter,
    /// Pay the surplus to Catalyst investors on top of their cap, pro-rata
    /// by principal.
    ProRataBonus,
    /// Keep the surplus as additional platform revenue.
    AccrueToPlatform,
}

impl fmt::Display for SurplusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SurplusPolicy::ReturnToExporter => "return_to_exporter",
            SurplusPolicy::ProRataBonus => "pro_rata_bonus",
            SurplusPolicy::AccrueToPlatform => "accrue_to_platform",
        };
        f.pad(s)
    }
}

impl FromStr for SurplusPolicy {
    type Err = FundingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "return_to_exporter" => Ok(SurplusPolicy::ReturnToExporter),
            "pro_rata_bonus" => Ok(SurplusPolicy::ProRataBonus),
            "accrue_to_platform" => Ok(SurplusPolicy::AccrueToPlatform),
            other => Err(FundingError::Config(format!(
                "unknown surplus policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Platform fee, in percent of the gross amount.
    pub platform_fee_percentage: Decimal,
    pub surplus_policy: SurplusPolicy,
    pub default_priority_ratio: Decimal,
    pub default_catalyst_ratio: Decimal,
    /// Default tranche rates, percent per annum.
    pub default_priority_rate: Decimal,
    pub default_catalyst_rate: Decimal,
    pub default_currency: CurrencyCode,
    /// Days a pool stays open for funding when no deadline is given.
    pub default_funding_days: u32,
    /// Tenor used when a pool carries no maturity date.
    pub default_tenor_days: u32,
    /// Allowed deviation of `priority_ratio + catalyst_ratio` from 1.
    pub ratio_tolerance: Decimal,
    /// Upper bound on optimistic commit attempts per request.
    pub max_commit_attempts: u32,
    pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform_fee_percentage: dec!(2),
            surplus_policy: SurplusPolicy::ReturnToExporter,
            default_priority_ratio: dec!(0.8),
            default_catalyst_ratio: dec!(0.2),
            default_priority_rate: dec!(10),
            default_catalyst_rate: dec!(15),
            default_currency: CurrencyCode::new("IDR"),
            default_funding_days: 14,
            default_tenor_days: 60,
            ratio_tolerance: dec!(0.001),
            max_commit_attempts: 64,
            request_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    /// Load overrides from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();
        if let Some(v) = env_parse("PLATFORM_FEE_PERCENTAGE")? {
            config.platform_fee_percentage = v;
        }
        if let Some(v) = env_parse("SURPLUS_POLICY")? {
            config.surplus_policy = v;
        }
        if let Some(v) = env_parse("DEFAULT_PRIORITY_RATIO")? {
            config.default_priority_ratio = v;
        }
        if let Some(v) = env_parse("DEFAULT_CATALYST_RATIO")? {
            config.default_catalyst_ratio = v;
        }
        if let Some(v) = env_parse("DEFAULT_PRIORITY_RATE")? {
            config.default_priority_rate = v;
        }
        if let Some(v) = env_parse("DEFAULT_CATALYST_RATE")? {
            config.default_catalyst_rate = v;
        }
        if let Ok(v) = std::env::var("DEFAULT_CURRENCY") {
            config.default_currency = CurrencyCode::new(v);
        }
        if let Some(v) = env_parse("DEFAULT_FUNDING_DAYS")? {
            config.default_funding_days = v;
        }
        if let Some(v) = env_parse("DEFAULT_TENOR_DAYS")? {
            config.default_tenor_days = v;
        }
        if let Some(v) = env_parse("MAX_COMMIT_ATTEMPTS")? {
            config.max_commit_attempts = v;
        }
        if let Some(v) = env_parse("REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| FundingError::Config(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let hundred = Decimal::from(100);
        if self.platform_fee_percentage < Decimal::ZERO || self.platform_fee_percentage >= hundred
        {
            return Err(FundingError::Config(format!(
                "platform fee must be in [0, 100), got {}",
                self.platform_fee_percentage
            )));
        }
        if self.ratio_tolerance < Decimal::ZERO {
            return Err(FundingError::Config("ratio tolerance must not be negative".into()));
        }
        let ratio_sum = self.default_priority_ratio + self.default_catalyst_ratio;
        if (ratio_sum - Decimal::ONE).abs() > self.ratio_tolerance {
            return Err(FundingError::Config(format!(
                "default tranche ratios sum to {ratio_sum}, expected 1"
            )));
        }
        if self.default_priority_rate < Decimal::ZERO || self.default_catalyst_rate < Decimal::ZERO
        {
            return Err(FundingError::Config("default rates must not be negative".into()));
        }
        if self.max_commit_attempts == 0 {
            return Err(FundingError::Config("max_commit_attempts must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(FundingError::Config("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Pool terms for an invoice using the configured tranche defaults.
    pub fn pool_terms(&self, invoice_id: InvoiceId, target_amount: Decimal) -> PoolTerms {
        PoolTerms::new(
            invoice_id,
            target_amount,
            self.default_priority_ratio,
            self.default_catalyst_ratio,
            self.default_priority_rate,
            self.default_catalyst_rate,
            self.default_currency.clone(),
        )
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| FundingError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.platform_fee_percentage, dec!(2));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_bad_fee() {
        let config = EngineConfig {
            platform_fee_percentage: dec!(100),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unbalanced_default_ratios() {
        let config = EngineConfig {
            default_catalyst_ratio: dec!(0.3),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FundingError::Config(_))));
    }

    #[test]
    fn test_from_json_keeps_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "platform_fee_percentage": "1.5", "surplus_policy": "pro_rata_bonus" }"#)
                .unwrap();
        assert_eq!(config.platform_fee_percentage, dec!(1.5));
        assert_eq!(config.surplus_policy, SurplusPolicy::ProRataBonus);
        assert_eq!(config.default_funding_days, 14);
    }

    #[test]
    fn test_surplus_policy_parse() {
        assert_eq!(
            "accrue-to-platform".parse::<SurplusPolicy>().unwrap(),
            SurplusPolicy::AccrueToPlatform
        );
        assert!("burn".parse::<SurplusPolicy>().is_err());
    }

    #[test]
    fn test_pool_terms_use_defaults() {
        let config = EngineConfig::default();
        let terms = config.pool_terms(InvoiceId::new(), dec!(1_000_000));
        assert_eq!(terms.priority_ratio, dec!(0.8));
        assert_eq!(terms.catalyst_rate, dec!(15));
        assert_eq!(terms.currency, CurrencyCode::new("IDR"));
    }
}
