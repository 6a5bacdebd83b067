use tessera_primitives::{TransactionId, TransactionInput, Tx, UtxoSet};
use tracing::trace;

use crate::UtxoEntry;

/// Result of applying a transaction to a local UTxO view
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub state: UtxoSet,

    /// UTxOs that were present and are now gone
    pub spent: Vec<UtxoEntry>,

    /// UTxOs added by the transaction
    pub created: Vec<UtxoEntry>,
}

/// Derives the UTxOs known after `tx` lands on chain
///
/// A valid transaction consumes its inputs and creates its outputs. A
/// transaction flagged as failing phase-2 validation consumes its collateral
/// instead, and only creates its collateral return, placed at the index
/// following the regular outputs. Inputs missing from `prior` are ignored.
///
/// For a transaction received as bytes, `tx_id` should come from
/// [`MintedTx::id`](tessera_primitives::MintedTx::id).
pub fn apply_transaction(tx_id: TransactionId, tx: &Tx, prior: &UtxoSet) -> StateUpdate {
    let body = &tx.transaction_body;
    let mut state = prior.clone();

    let (consumed, produced): (Vec<&TransactionInput>, Vec<_>) = if tx.success {
        (
            body.inputs.iter().collect(),
            body.outputs.iter().cloned().enumerate().collect(),
        )
    } else {
        (
            body.collateral.iter().flat_map(|x| x.iter()).collect(),
            body.collateral_return
                .iter()
                .cloned()
                .map(|x| (body.outputs.len(), x))
                .collect(),
        )
    };

    let spent: Vec<UtxoEntry> = consumed
        .into_iter()
        .filter_map(|input| state.remove(input).map(|output| (input.clone(), output)))
        .collect();

    let mut created = vec![];

    for (index, output) in produced {
        let input = TransactionInput::new(tx_id, index as u64);
        trace!(%input, "utxo created");
        state.insert(input.clone(), output.clone());
        created.push((input, output));
    }

    StateUpdate {
        state,
        spent,
        created,
    }
}
