use std::io::Read;

use serde::{Deserialize, Serialize};
use tessera_primitives::{Coin, ExUnits, Language, NetworkId, RationalNumber};
use thiserror::Error;

use crate::SelectionAlgorithm;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("can't read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Cost model of a Plutus language, as the flat list of parameters the
/// ledger expects
pub type CostModel = Vec<i64>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModels {
    #[serde(rename = "PlutusV1", default, skip_serializing_if = "Option::is_none")]
    pub plutus_v1: Option<CostModel>,

    #[serde(rename = "PlutusV2", default, skip_serializing_if = "Option::is_none")]
    pub plutus_v2: Option<CostModel>,

    #[serde(rename = "PlutusV3", default, skip_serializing_if = "Option::is_none")]
    pub plutus_v3: Option<CostModel>,
}

impl CostModels {
    pub fn get(&self, language: Language) -> Option<&CostModel> {
        match language {
            Language::PlutusV1 => self.plutus_v1.as_ref(),
            Language::PlutusV2 => self.plutus_v2.as_ref(),
            Language::PlutusV3 => self.plutus_v3.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUnitPrices {
    pub price_memory: RationalNumber,
    pub price_steps: RationalNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUnitsLimit {
    pub memory: u64,
    pub steps: u64,
}

impl From<ExecutionUnitsLimit> for ExUnits {
    fn from(value: ExecutionUnitsLimit) -> Self {
        ExUnits::new(value.memory, value.steps)
    }
}

/// The subset of protocol parameters that shape a transaction
///
/// Deserializes from the camelCase json layout most chain indexers expose.
/// Prices are rationals, `{"numerator": 577, "denominator": 10000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolParameters {
    pub min_fee_coefficient: u64,
    pub min_fee_constant: u64,
    pub coins_per_utxo_byte: u64,
    pub max_tx_size: u64,
    pub max_value_size: u64,
    pub collateral_percentage: u64,
    pub max_collateral_inputs: u32,
    pub stake_key_deposit: Coin,
    pub execution_unit_prices: ExecutionUnitPrices,
    pub max_tx_execution_units: ExecutionUnitsLimit,
    #[serde(default)]
    pub cost_models: CostModels,
}

impl ProtocolParameters {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_reader(reader)?;
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prices = [
            self.execution_unit_prices.price_memory,
            self.execution_unit_prices.price_steps,
        ];

        if prices.iter().any(|p| p.denominator == 0) {
            return Err(ConfigError::Invalid(
                "execution unit prices must have a non-zero denominator".into(),
            ));
        }

        Ok(())
    }
}

/// Mainnet values as of the Conway era, without cost models
impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            min_fee_coefficient: 44,
            min_fee_constant: 155_381,
            coins_per_utxo_byte: 4_310,
            max_tx_size: 16_384,
            max_value_size: 5_000,
            collateral_percentage: 150,
            max_collateral_inputs: 3,
            stake_key_deposit: 2_000_000,
            execution_unit_prices: ExecutionUnitPrices {
                price_memory: RationalNumber {
                    numerator: 577,
                    denominator: 10_000,
                },
                price_steps: RationalNumber {
                    numerator: 721,
                    denominator: 10_000_000,
                },
            },
            max_tx_execution_units: ExecutionUnitsLimit {
                memory: 14_000_000,
                steps: 10_000_000_000,
            },
            cost_models: CostModels::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionConfig {
    #[serde(default)]
    pub algorithm: SelectionAlgorithm,

    /// Upper bound on the number of inputs a selection may add
    #[serde(default = "default_max_inputs")]
    pub max_inputs: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            algorithm: SelectionAlgorithm::default(),
            max_inputs: default_max_inputs(),
        }
    }
}

fn default_max_inputs() -> usize {
    64
}

fn default_max_fee_iterations() -> usize {
    16
}

/// Everything a [`Finalizer`](crate::Finalizer) needs besides intents and UTxOs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub protocol: ProtocolParameters,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default = "default_max_fee_iterations")]
    pub max_fee_iterations: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<NetworkId>,
}

impl Config {
    pub fn new(protocol: ProtocolParameters) -> Self {
        Self {
            protocol,
            selection: SelectionConfig::default(),
            max_fee_iterations: default_max_fee_iterations(),
            network_id: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.protocol.validate()?;

        if self.max_fee_iterations == 0 {
            return Err(ConfigError::Invalid(
                "maxFeeIterations must be at least 1".into(),
            ));
        }

        if self.selection.max_inputs == 0 {
            return Err(ConfigError::Invalid(
                "selection.maxInputs must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(ProtocolParameters::default())
    }
}
