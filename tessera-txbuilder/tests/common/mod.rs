#![allow(dead_code)]

use std::cell::RefCell;

use tessera_addresses::{
    Address, Network, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart,
};
use tessera_crypto::hash::Hasher;
use tessera_primitives::{
    AddrKeyhash, ExUnits, Hash, ScriptHash, Signature, TransactionInput, TransactionOutput, Tx,
    UtxoSet, VKey, VKeyWitness, Value,
};
use tessera_txbuilder::{
    EvaluationRequest, FinalizedTx, RedeemerEvaluation, ScriptContext, ScriptEvaluator, Signer,
};

/// A key whose hash is known, so that its witnesses count as signatures
pub struct Key(pub u8);

impl Key {
    pub fn vkey(&self) -> VKey {
        VKey::new(vec![self.0; 32])
    }

    pub fn hash(&self) -> AddrKeyhash {
        Hasher::<224>::hash(&[self.0; 32])
    }

    pub fn address(&self) -> Address {
        key_address(self.hash())
    }

    pub fn witness(&self) -> VKeyWitness {
        VKeyWitness {
            vkey: self.vkey(),
            signature: Signature::new(vec![self.0; 64]),
        }
    }
}

pub fn key_address(hash: AddrKeyhash) -> Address {
    Address::Shelley(ShelleyAddress::new(
        Network::Testnet,
        ShelleyPaymentPart::PaymentKey(hash),
        ShelleyDelegationPart::Null,
    ))
}

pub fn script_address(hash: ScriptHash) -> Address {
    Address::Shelley(ShelleyAddress::new(
        Network::Testnet,
        ShelleyPaymentPart::Script(hash),
        ShelleyDelegationPart::Null,
    ))
}

pub fn input(tx: u8, index: u64) -> TransactionInput {
    TransactionInput::new(Hash::new([tx; 32]), index)
}

pub fn ada(lovelace: u64) -> Value {
    Value::only_lovelace(lovelace)
}

pub fn utxo(tx: u8, index: u64, address: &Address, value: Value) -> (TransactionInput, TransactionOutput) {
    (input(tx, index), TransactionOutput::new(address.clone(), value))
}

pub fn utxo_set(entries: impl IntoIterator<Item = (TransactionInput, TransactionOutput)>) -> UtxoSet {
    entries.into_iter().collect()
}

/// What the transaction consumes against what it produces, given the
/// deposits it pays and the refunds and withdrawals it collects
pub fn balance(
    finalized: &FinalizedTx,
    utxos: &UtxoSet,
    deposits: u64,
    inflows: u64,
) -> (Value, Value) {
    let body = &finalized.tx.transaction_body;

    let spent: Value = body.inputs.iter().map(|i| utxos[i].value.clone()).sum();
    let minted = body.mint.as_ref().map(|m| m.to_value()).unwrap_or_default();
    let consumed = spent + minted + ada(inflows);

    let paid: Value = body.outputs.iter().map(|o| o.value.clone()).sum();
    let produced = paid + ada(body.fee) + ada(deposits);

    (consumed, produced)
}

/// Reports the same execution units for every redeemer and keeps the
/// requests it saw
pub struct FixedEvaluator {
    pub ex_units: ExUnits,
    pub requests: RefCell<Vec<Vec<ScriptContext>>>,
}

impl FixedEvaluator {
    pub fn new(mem: u64, steps: u64) -> Self {
        Self {
            ex_units: ExUnits::new(mem, steps),
            requests: RefCell::new(vec![]),
        }
    }
}

impl ScriptEvaluator for FixedEvaluator {
    type Error = std::io::Error;

    fn evaluate(
        &self,
        request: &EvaluationRequest<'_>,
    ) -> Result<Vec<RedeemerEvaluation>, Self::Error> {
        self.requests.borrow_mut().push(request.contexts.clone());

        Ok(request
            .contexts
            .iter()
            .map(|c| RedeemerEvaluation {
                tag: c.tag,
                index: c.index,
                ex_units: self.ex_units,
            })
            .collect())
    }
}

pub struct FailingEvaluator;

impl ScriptEvaluator for FailingEvaluator {
    type Error = std::io::Error;

    fn evaluate(
        &self,
        _request: &EvaluationRequest<'_>,
    ) -> Result<Vec<RedeemerEvaluation>, Self::Error> {
        Err(std::io::Error::other("script failed: validator returned false"))
    }
}

pub struct KeySigner(pub Vec<Key>);

impl Signer for KeySigner {
    type Error = std::io::Error;

    fn sign(&self, _tx: &Tx, _partial_sign: bool) -> Result<Vec<VKeyWitness>, Self::Error> {
        Ok(self.0.iter().map(Key::witness).collect())
    }
}
