use std::collections::BTreeSet;

use tessera_crypto::hash::Hasher;
use tessera_primitives::{AddrKeyhash, Tx, VKeyWitness};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SigningError {
    #[error("signer failed: {0}")]
    Signer(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("missing signatures from {} required signers", .0.len())]
    MissingSignatures(Vec<AddrKeyhash>),
}

/// An external wallet able to witness transactions
///
/// With `partial_sign` set, the signer only returns the witnesses it can
/// produce instead of failing when some required key is not its own.
pub trait Signer {
    type Error: std::error::Error + Send + Sync + 'static;

    fn sign(&self, tx: &Tx, partial_sign: bool) -> Result<Vec<VKeyWitness>, Self::Error>;
}

/// Key hash a verification key witness accounts for
pub fn witness_key_hash(witness: &VKeyWitness) -> AddrKeyhash {
    Hasher::<224>::hash(witness.vkey.as_slice())
}

/// Asks `signer` for witnesses and merges them into the transaction
///
/// Witnesses replace any previous witness of the same verification key.
pub fn sign_transaction<S: Signer>(
    signer: &S,
    mut tx: Tx,
    partial_sign: bool,
) -> Result<Tx, SigningError> {
    let witnesses = signer
        .sign(&tx, partial_sign)
        .map_err(|e| SigningError::Signer(Box::new(e)))?;

    debug!(count = witnesses.len(), "merging signer witnesses");

    tx.transaction_witness_set.merge_vkey_witnesses(witnesses);

    Ok(tx)
}

/// Required signers that no witness of `tx` accounts for yet
pub fn missing_signers<'a>(
    tx: &Tx,
    required: impl IntoIterator<Item = &'a AddrKeyhash>,
) -> Vec<AddrKeyhash> {
    let present: BTreeSet<AddrKeyhash> = tx
        .transaction_witness_set
        .vkeywitness
        .iter()
        .flat_map(|ws| ws.iter())
        .map(witness_key_hash)
        .collect();

    required
        .into_iter()
        .filter(|x| !present.contains(*x))
        .copied()
        .collect()
}
