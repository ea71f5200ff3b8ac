//! Runtime configuration, overridable per-field from the environment.

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    /// Currency granted to a participant on join.
    pub initial_balance: f64,
    pub initial_reputation: i64,
    /// Token price a freshly created SPS starts at, and the base term of the
    /// pricing formula.
    pub base_token_price: f64,
    pub token_supply: u32,
    /// Period of the scheduler sweep.
    pub tick_ms: u64,
    /// Delay between a milestone submission and its auto-approval.
    pub validation_delay_ms: u64,
    /// Hard floor for any token price write.
    pub min_token_price: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9100".to_string(),
            initial_balance: 1000.0,
            initial_reputation: 10,
            base_token_price: 10.0,
            token_supply: 1000,
            tick_ms: 1000,
            validation_delay_ms: 5000,
            min_token_price: 0.1,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(d.listen_addr),
            initial_balance: env_parse("INITIAL_BALANCE", d.initial_balance),
            initial_reputation: env_parse("INITIAL_REPUTATION", d.initial_reputation),
            base_token_price: env_parse("BASE_TOKEN_PRICE", d.base_token_price),
            token_supply: env_parse("TOKEN_SUPPLY", d.token_supply),
            tick_ms: env_parse("TICK_MS", d.tick_ms),
            validation_delay_ms: env_parse("VALIDATION_DELAY_MS", d.validation_delay_ms),
            min_token_price: env_parse("MIN_TOKEN_PRICE", d.min_token_price),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
