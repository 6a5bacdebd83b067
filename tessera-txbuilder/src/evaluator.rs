use tessera_primitives::{
    Certificate, ExUnits, Language, PlutusData, PolicyId, RedeemerTag, StakeCredential,
    TransactionInput, TransactionOutput,
};
use thiserror::Error;

use crate::CostModels;

/// What a Plutus script is run for
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptPurpose {
    Minting(PolicyId),
    Spending(TransactionInput),
    Rewarding(StakeCredential),
    Certifying(u32, Certificate),
}

impl ScriptPurpose {
    pub fn tag(&self) -> RedeemerTag {
        match self {
            ScriptPurpose::Minting(_) => RedeemerTag::Mint,
            ScriptPurpose::Spending(_) => RedeemerTag::Spend,
            ScriptPurpose::Rewarding(_) => RedeemerTag::Reward,
            ScriptPurpose::Certifying(..) => RedeemerTag::Cert,
        }
    }
}

/// One script execution the draft transaction requires
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptContext {
    pub purpose: ScriptPurpose,

    /// Redeemer pointer, as found in the draft's witness set
    pub tag: RedeemerTag,
    pub index: u32,

    pub language: Language,
    pub redeemer: PlutusData,
}

/// Everything an evaluator needs to run the scripts of a draft
#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    /// The draft, cbor-encoded, with zeroed execution units on first use
    pub tx_cbor: Vec<u8>,

    /// Outputs behind every input and reference input of the draft
    pub resolved_inputs: Vec<(TransactionInput, TransactionOutput)>,

    pub cost_models: &'a CostModels,

    pub contexts: Vec<ScriptContext>,
}

/// Execution units measured for one redeemer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemerEvaluation {
    pub tag: RedeemerTag,
    pub index: u32,
    pub ex_units: ExUnits,
}

/// Runs Plutus scripts on behalf of the finalizer
///
/// Implementations usually wrap a Plutus virtual machine or a remote
/// evaluation endpoint. The finalizer calls `evaluate` once per fee
/// iteration, never concurrently and never retrying a failure.
pub trait ScriptEvaluator {
    type Error: std::error::Error + Send + Sync + 'static;

    fn evaluate(
        &self,
        request: &EvaluationRequest<'_>,
    ) -> Result<Vec<RedeemerEvaluation>, Self::Error>;
}

#[derive(Debug, Error)]
#[error("transaction requires script evaluation but none is available")]
pub struct NoEvaluatorError;

/// Evaluator for transactions that never run Plutus scripts
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScripts;

impl ScriptEvaluator for NoScripts {
    type Error = NoEvaluatorError;

    fn evaluate(
        &self,
        _request: &EvaluationRequest<'_>,
    ) -> Result<Vec<RedeemerEvaluation>, Self::Error> {
        Err(NoEvaluatorError)
    }
}
