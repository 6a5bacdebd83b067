use tessera_primitives::{Coin, EncodeError, ExUnits, RationalNumber, TransactionOutput};

use crate::ProtocolParameters;

/// Bytes the ledger adds to the serialized size of an output when pricing it
const OUTPUT_OVERHEAD: u64 = 160;

fn ceil_div(num: u128, den: u128) -> u128 {
    num.div_ceil(den)
}

fn to_coin(x: u128) -> Coin {
    Coin::try_from(x).unwrap_or(Coin::MAX)
}

impl ProtocolParameters {
    /// Size-dependent part of the fee
    pub fn linear_fee(&self, tx_size: u64) -> Coin {
        self.min_fee_constant
            .saturating_add(self.min_fee_coefficient.saturating_mul(tx_size))
    }

    /// Execution-dependent part of the fee, `ceil(priceMemory * mem + priceSteps * steps)`
    pub fn script_fee(&self, ex_units: &ExUnits) -> Coin {
        let RationalNumber {
            numerator: mn,
            denominator: md,
        } = self.execution_unit_prices.price_memory;

        let RationalNumber {
            numerator: sn,
            denominator: sd,
        } = self.execution_unit_prices.price_steps;

        let (mn, md, sn, sd) = (mn as u128, md.max(1) as u128, sn as u128, sd.max(1) as u128);

        let num = mn
            .saturating_mul(ex_units.mem as u128)
            .saturating_mul(sd)
            .saturating_add(sn.saturating_mul(ex_units.steps as u128).saturating_mul(md));

        to_coin(ceil_div(num, md.saturating_mul(sd)))
    }

    /// Minimum fee of a transaction of `tx_size` bytes running scripts for
    /// `ex_units` in total
    pub fn min_fee(&self, tx_size: u64, ex_units: &ExUnits) -> Coin {
        self.linear_fee(tx_size)
            .saturating_add(self.script_fee(ex_units))
    }

    /// Lovelace an output must carry given its current serialized size
    pub fn min_ada(&self, output: &TransactionOutput) -> Result<Coin, EncodeError> {
        let size = output.serialized_size()?;
        Ok(self
            .coins_per_utxo_byte
            .saturating_mul(OUTPUT_OVERHEAD.saturating_add(size)))
    }

    /// Collateral a script transaction paying `fee` must post
    pub fn required_collateral(&self, fee: Coin) -> Coin {
        to_coin(ceil_div(
            (fee as u128).saturating_mul(self.collateral_percentage as u128),
            100,
        ))
    }
}
