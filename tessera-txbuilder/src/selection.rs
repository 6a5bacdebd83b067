//! Greedy coin selection over multi-asset UTxOs
//!
//! A selection starts from the UTxOs that must be spent anyway, then adds
//! available UTxOs one at a time until the accumulated value covers the
//! target. Algorithms only differ in which UTxO they pick next.

use num_traits::Signed;
use serde::{Deserialize, Serialize};
use tessera_primitives::{AssetClass, TransactionInput, TransactionOutput, Value};
use thiserror::Error;
use tracing::{instrument, trace};

/// A UTxO as a pair of its reference and the output it points to
pub type UtxoEntry = (TransactionInput, TransactionOutput);

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum CoinSelectionError {
    #[error("utxo balance insufficient: missing {missing_value} after selecting {} utxos", .selected_utxos.len())]
    UTxOBalanceInsufficient {
        selected_utxos: Vec<UtxoEntry>,
        missing_value: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionContext {
    /// Candidates, in the order the caller wants them considered
    pub available_utxos: Vec<UtxoEntry>,

    /// UTxOs that are spent regardless of the selection
    pub already_selected_utxos: Vec<UtxoEntry>,

    pub target: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Newly picked UTxOs, most recent first, followed by the already
    /// selected ones in their given order
    pub selected_utxos: Vec<UtxoEntry>,

    /// What the selected UTxOs hold beyond the target, if anything
    pub change: Option<Value>,
}

impl Selection {
    pub fn total(&self) -> Value {
        self.selected_utxos.iter().map(|(_, o)| o.value.clone()).sum()
    }
}

pub trait CoinSelection {
    /// Picks UTxOs until the target is covered, adding at most
    /// `max_input_count - already_selected.len()` of them
    fn select(
        &self,
        max_input_count: usize,
        context: &SelectionContext,
    ) -> Result<Selection, CoinSelectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionAlgorithm {
    /// Always takes the candidate holding the most of the first asset the
    /// selection still lacks
    #[default]
    LargestFirst,

    /// Takes candidates in the order they were given
    InOrderedList,
}

impl SelectionAlgorithm {
    /// Position in `candidates` of the next UTxO to take, if any helps
    fn pick(&self, candidates: &[&UtxoEntry], missing: &Value) -> Option<usize> {
        match self {
            SelectionAlgorithm::InOrderedList => (!candidates.is_empty()).then_some(0),
            SelectionAlgorithm::LargestFirst => {
                let asset = missing
                    .assets()
                    .next()
                    .cloned()
                    .unwrap_or(AssetClass::Lovelace);

                candidates
                    .iter()
                    .enumerate()
                    .map(|(i, (input, output))| (i, input, output.value.quantity_of(&asset)))
                    .filter(|(_, _, q)| q.is_positive())
                    .max_by(|(_, ia, qa), (_, ib, qb)| qa.cmp(qb).then_with(|| ib.cmp(ia)))
                    .map(|(i, _, _)| i)
            }
        }
    }
}

impl CoinSelection for SelectionAlgorithm {
    #[instrument(skip_all, fields(algorithm = ?self, max_input_count, target = %context.target))]
    fn select(
        &self,
        max_input_count: usize,
        context: &SelectionContext,
    ) -> Result<Selection, CoinSelectionError> {
        let already = &context.already_selected_utxos;

        let mut accumulated: Value = already.iter().map(|(_, o)| o.value.clone()).sum();

        let mut candidates: Vec<&UtxoEntry> = context
            .available_utxos
            .iter()
            .filter(|(input, _)| !already.iter().any(|(x, _)| x == input))
            .collect();

        let budget = max_input_count.saturating_sub(already.len());
        let mut picked: Vec<UtxoEntry> = vec![];

        while !accumulated.at_least(&context.target) && picked.len() < budget {
            let missing = (&context.target - &accumulated).positive_part();

            let Some(position) = self.pick(&candidates, &missing) else {
                break;
            };

            let (input, output) = candidates.remove(position);
            trace!(%input, value = %output.value, "selected utxo");

            accumulated += &output.value;
            picked.push((input.clone(), output.clone()));
        }

        let selected_utxos: Vec<UtxoEntry> = picked
            .into_iter()
            .rev()
            .chain(already.iter().cloned())
            .collect();

        if !accumulated.at_least(&context.target) {
            return Err(CoinSelectionError::UTxOBalanceInsufficient {
                selected_utxos,
                missing_value: (&context.target - &accumulated).positive_part(),
            });
        }

        let change = &accumulated - &context.target;

        Ok(Selection {
            selected_utxos,
            change: (!change.is_zero()).then_some(change),
        })
    }
}
