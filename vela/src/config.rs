use crate::VelaError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use vela_execution::position::MarkPriceSource;
use vela_instrument::pair::TradingPair;
use vela_risk::config::RiskConfig;

/// Environment variable prefix: `VELA_<SECTION>_<FIELD>`.
pub const ENV_PREFIX: &str = "VELA_";

/// Full process configuration. Precedence is CLI over environment over file
/// over defaults; the CLI and file layers live in the external front end,
/// this module supplies the defaults, the environment overrides and the
/// fatal validation.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub exchanges: Vec<ExchangeConfig>,
    pub trading: TradingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Venue credentials, held as opaque strings and handed to the signer
/// collaborator; the core never interprets them.
#[derive(Debug, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TradingConfig {
    pub pairs: Vec<TradingPair>,
    pub initial_balance: Decimal,
    pub leverage: Decimal,
    pub risk: RiskConfig,
    pub mark_price_source: MarkPriceSource,
    pub kill_switch_reset_token: String,
    /// Directory for NDJSON artifacts; `None` disables persistence.
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            initial_balance: Decimal::from(100_000),
            leverage: Decimal::from(5),
            risk: RiskConfig::default(),
            mark_price_source: MarkPriceSource::default(),
            kill_switch_reset_token: "reset".to_string(),
            artifacts_dir: None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Apply `VELA_<SECTION>_<FIELD>` overrides from the provided
    /// environment. Array entries honour both the index form
    /// (`VELA_EXCHANGES_0_API_KEY`) and the name form
    /// (`VELA_EXCHANGES_HYPERLIQUID_API_KEY`).
    ///
    /// Unknown or unparseable variables are logged and skipped; they are
    /// caught by the front end's own validation if they matter.
    pub fn apply_env_overrides(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            let applied = if let Some(field) = rest.strip_prefix("SERVER_") {
                self.apply_server(field, &value)
            } else if let Some(field) = rest.strip_prefix("TRADING_") {
                self.apply_trading(field, &value)
            } else if let Some(field) = rest.strip_prefix("LOGGING_") {
                self.apply_logging(field, &value)
            } else if let Some(field) = rest.strip_prefix("EXCHANGES_") {
                self.apply_exchange(field, &value)
            } else {
                false
            };

            if !applied {
                debug!(key, "ignored unknown environment override");
            }
        }
    }

    /// Validate the assembled configuration; failures are fatal at startup.
    pub fn validate(&self) -> Result<(), VelaError> {
        if self.trading.initial_balance <= Decimal::ZERO {
            return Err(VelaError::ConfigInvalid(
                "trading.initial_balance must be positive".to_string(),
            ));
        }
        if self.trading.leverage <= Decimal::ZERO {
            return Err(VelaError::ConfigInvalid(
                "trading.leverage must be positive".to_string(),
            ));
        }
        if self.trading.risk.max_daily_loss_pct < Decimal::ZERO
            || self.trading.risk.max_daily_loss_pct > Decimal::ONE
        {
            return Err(VelaError::ConfigInvalid(
                "trading.risk.max_daily_loss_pct must be within [0, 1]".to_string(),
            ));
        }
        for (index, exchange) in self.exchanges.iter().enumerate() {
            if exchange.name.is_empty() {
                return Err(VelaError::ConfigInvalid(format!(
                    "exchanges[{index}].name must not be empty"
                )));
            }
        }
        Ok(())
    }

    fn apply_server(&mut self, field: &str, value: &str) -> bool {
        match field {
            "HOST" => {
                self.server.host = value.to_string();
                true
            }
            "PORT" => parse_into(value, &mut self.server.port),
            _ => false,
        }
    }

    fn apply_trading(&mut self, field: &str, value: &str) -> bool {
        match field {
            "INITIAL_BALANCE" => parse_into(value, &mut self.trading.initial_balance),
            "LEVERAGE" => parse_into(value, &mut self.trading.leverage),
            "KILL_SWITCH_RESET_TOKEN" => {
                self.trading.kill_switch_reset_token = value.to_string();
                true
            }
            "MAX_POSITION_SIZE" => parse_into(value, &mut self.trading.risk.max_position_size),
            "MAX_POSITION_PER_SYMBOL" => {
                parse_into(value, &mut self.trading.risk.max_position_per_symbol)
            }
            "MAX_LEVERAGE" => parse_into(value, &mut self.trading.risk.max_leverage),
            "MAX_DAILY_LOSS" => parse_into(value, &mut self.trading.risk.max_daily_loss),
            "MAX_DAILY_LOSS_PCT" => parse_into(value, &mut self.trading.risk.max_daily_loss_pct),
            "MAX_ORDERS_PER_MINUTE" => {
                parse_into(value, &mut self.trading.risk.max_orders_per_minute)
            }
            _ => false,
        }
    }

    fn apply_logging(&mut self, field: &str, value: &str) -> bool {
        match field {
            "LEVEL" => {
                self.logging.level = value.to_string();
                true
            }
            "JSON" => parse_into(value, &mut self.logging.json),
            _ => false,
        }
    }

    fn apply_exchange(&mut self, field: &str, value: &str) -> bool {
        // `<INDEX|NAME>_<FIELD>`
        let Some((selector, field)) = field.split_once('_') else {
            return false;
        };

        let index = match selector.parse::<usize>() {
            Ok(index) => Some(index),
            Err(_) => self
                .exchanges
                .iter()
                .position(|exchange| exchange.name.eq_ignore_ascii_case(selector)),
        };
        let Some(exchange) = index.and_then(|index| self.exchanges.get_mut(index)) else {
            return false;
        };

        match field {
            "NAME" => {
                exchange.name = value.to_string();
                true
            }
            "API_KEY" => {
                exchange.api_key = value.to_string();
                true
            }
            "API_SECRET" => {
                exchange.api_secret = value.to_string();
                true
            }
            "TESTNET" => parse_into(value, &mut exchange.testnet),
            _ => false,
        }
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) -> bool {
    match value.parse::<T>() {
        Ok(parsed) => {
            *target = parsed;
            true
        }
        Err(_) => false,
    }
}
