use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub stripe_secret_key: String,
    pub notify_webhook_url: Option<String>,
    pub scheduler_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/pledgepool".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY")
                .unwrap_or_else(|_| "sk_test_placeholder".to_string()),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
            scheduler_enabled: std::env::var("SCHEDULER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }
}

/// Settlement pipeline configuration
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Smallest pledge a member may hold
    pub min_pledge: Decimal,
    /// Largest pledge a member may hold
    pub max_pledge: Decimal,
    /// Platform fee as a fraction of the collected amount
    pub platform_fee_pct: Decimal,
    /// Processor fee as a fraction of the collected amount
    pub processor_fee_pct: Decimal,
    /// Fixed processor fee charged per withdrawal
    pub processor_fee_fixed: Decimal,
    /// Consecutive failures before an account is suspended
    pub max_failed_payments: i32,
    /// How many days before the renewal date charges run
    pub charge_days_before: i64,
    /// Hour of day (UTC) the daily sweep fires
    pub execution_hour: u32,
    /// Per-charge timeout in seconds
    pub charge_timeout_secs: u64,
    /// Servers settled in parallel per cycle
    pub max_concurrent_servers: usize,
    /// Charges in flight per server
    pub max_concurrent_charges: usize,
    /// Outbound charge rate limit (requests per second)
    pub charges_per_second: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            min_pledge: dec!(2.00),
            max_pledge: dec!(30.00),
            platform_fee_pct: dec!(0.02),
            processor_fee_pct: dec!(0.029),
            processor_fee_fixed: dec!(0.30),
            max_failed_payments: 3,
            charge_days_before: 2,
            execution_hour: 6,
            charge_timeout_secs: 30,
            max_concurrent_servers: 4,
            max_concurrent_charges: 8,
            charges_per_second: 10,
        }
    }
}
