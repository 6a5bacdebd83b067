//! From intents to a balanced transaction
//!
//! Finalization is a bounded fixpoint over the fee. Each iteration assumes a
//! fee, selects inputs for every account, pays change, evaluates scripts and
//! measures the resulting draft. The loop stops once the draft costs no more
//! than the fee it was built with and every change output holds its minimum
//! lovelace. The assumed fee only ever grows, so the loop either settles or
//! hits the configured iteration cap.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use num_bigint::BigInt;
use tessera_codec::{minicbor, utils::KeyValuePairs};
use tessera_primitives::{
    AddrKeyhash, Address, AuxiliaryData, Certificate, Coin, DatumHash, DatumOption, EncodeError,
    ExUnits, Language, Metadatum, MetadatumLabel, Mint, PlutusData, PolicyId, Redeemer,
    RedeemerTag, Redeemers, RewardAccount, Script, ScriptHash, Set, Signature, StakeCredential,
    TransactionBody, TransactionId, TransactionInput, TransactionOutput, Tx, UtxoSet, VKey,
    VKeyWitness, Value, ValueError, WitnessSet,
};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::{
    missing_signers, sign_transaction, CoinSelection, CoinSelectionError, Config, CostModels,
    EvaluationRequest, LanguageView, LanguageViews, PlutusSource, ScriptContext, ScriptData,
    ScriptEvaluator, ScriptPurpose, ScriptWitness, Selection, SelectionAlgorithm,
    SelectionContext, Signer, SigningError, SpendSource, TxIntent, UtxoEntry,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FinalizationError {
    #[error("utxo {0} is not in the provided utxo set")]
    UnresolvedInput(TransactionInput),

    #[error("transaction is unbalanced: consumes {consumed}, produces {produced}")]
    Unbalanced { consumed: Value, produced: Value },

    #[error("output {index} holds {actual} lovelace, below its minimum of {required}")]
    InsufficientMinAda {
        index: usize,
        required: Coin,
        actual: BigInt,
    },

    #[error("value of output {index} takes {size} bytes, above the maximum of {max}")]
    ValueTooLarge { index: usize, size: u64, max: u64 },

    #[error(transparent)]
    CoinSelection(#[from] CoinSelectionError),

    #[error("script evaluation failed: {0}")]
    ScriptEvaluation(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("fee did not settle after {iterations} iterations (last fee {fee})")]
    IterationCapExceeded { iterations: usize, fee: Coin },

    #[error("no wallet address or key-locked input can fund the transaction")]
    NoFundingSource,

    #[error("evaluator returned no execution units for {tag:?} redeemer {index}")]
    MissingEvaluation { tag: RedeemerTag, index: u32 },

    #[error("transaction needs {used:?}, above the limit of {limit:?}")]
    ExUnitsExceeded { used: ExUnits, limit: ExUnits },

    #[error("transaction takes {size} bytes, above the maximum of {max}")]
    TransactionTooLarge { size: u64, max: u64 },

    #[error("wallet can't post the {required} lovelace of collateral required")]
    InsufficientCollateral { required: Coin },

    #[error("no cost model for {0:?}")]
    MissingCostModel(Language),

    #[error("datum {0} of a script input was not provided")]
    MissingDatum(DatumHash),

    #[error("invalid mint: {0}")]
    InvalidMint(String),

    #[error("metadata label {0} is given more than once")]
    DuplicateMetadataLabel(MetadatumLabel),

    #[error("validity interval [{valid_from}, {valid_until}) contains no slot")]
    EmptyValidityInterval { valid_from: u64, valid_until: u64 },

    #[error("utxo {0} holds no reference script")]
    MissingReferenceScript(TransactionInput),

    #[error("witness script {found} doesn't match the expected {expected}")]
    ScriptMismatch {
        expected: ScriptHash,
        found: ScriptHash,
    },

    #[error("script {0} needs a script witness")]
    MissingScriptWitness(ScriptHash),

    #[error("utxo {0} is not locked by a script")]
    NotScriptLocked(TransactionInput),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("cbor encoding failed: {0}")]
    Encoding(String),
}

impl From<EncodeError> for FinalizationError {
    fn from(value: EncodeError) -> Self {
        FinalizationError::Encoding(value.to_string())
    }
}

/// A balanced transaction, ready to be signed
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedTx {
    pub tx: Tx,
    pub fee: Coin,

    /// Keys whose signatures the transaction needs, including those already
    /// provided
    pub required_signers: Vec<AddrKeyhash>,

    /// Fee iterations it took to settle
    pub iterations: usize,
}

impl FinalizedTx {
    pub fn id(&self) -> Result<TransactionId, EncodeError> {
        self.tx.id()
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, EncodeError> {
        minicbor::to_vec(&self.tx)
    }

    /// Collects signatures, failing unless every required signer signed or
    /// `partial_sign` is set
    pub fn sign<S: Signer>(self, signer: &S, partial_sign: bool) -> Result<Tx, SigningError> {
        let tx = sign_transaction(signer, self.tx, partial_sign)?;

        if !partial_sign {
            let missing = missing_signers(&tx, &self.required_signers);

            if !missing.is_empty() {
                return Err(SigningError::MissingSignatures(missing));
            }
        }

        Ok(tx)
    }
}

fn resolve<'a>(
    utxos: &'a UtxoSet,
    input: &TransactionInput,
) -> Result<&'a TransactionOutput, FinalizationError> {
    utxos
        .get(input)
        .ok_or_else(|| FinalizationError::UnresolvedInput(input.clone()))
}

/// A script witness with its script resolved
#[derive(Debug, Clone)]
struct Witness {
    hash: ScriptHash,
    script: Script,

    /// Whether the script goes in the witness set, as opposed to being read
    /// from a reference input
    inline: bool,

    /// Set for Plutus scripts only
    redeemer: Option<PlutusData>,
}

impl Witness {
    fn resolve(
        witness: &ScriptWitness,
        utxos: &UtxoSet,
        reference_inputs: &mut BTreeSet<TransactionInput>,
    ) -> Result<Self, FinalizationError> {
        let (script, inline, redeemer) = match witness {
            ScriptWitness::Native(x) => (Script::Native(x.clone()), true, None),
            ScriptWitness::Plutus {
                source: PlutusSource::Inline(script),
                redeemer,
            } => (script.clone(), true, Some(redeemer.clone())),
            ScriptWitness::Plutus {
                source: PlutusSource::Reference(input),
                redeemer,
            } => {
                let script = resolve(utxos, input)?
                    .script_ref
                    .clone()
                    .ok_or_else(|| FinalizationError::MissingReferenceScript(input.clone()))?;

                reference_inputs.insert(input.clone());

                (script, false, Some(redeemer.clone()))
            }
        };

        let redeemer = redeemer.filter(|_| script.language().is_some());

        Ok(Witness {
            hash: script.hash()?,
            script,
            inline,
            redeemer,
        })
    }

    fn expect_hash(self, expected: &ScriptHash) -> Result<Self, FinalizationError> {
        if self.hash != *expected {
            return Err(FinalizationError::ScriptMismatch {
                expected: *expected,
                found: self.hash,
            });
        }

        Ok(self)
    }

    fn plutus(&self) -> Option<(Language, &PlutusData)> {
        Some((self.script.language()?, self.redeemer.as_ref()?))
    }
}

/// Pointer-independent identity of a redeemer, stable across iterations
/// even when the position of its target moves
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RedeemerKey {
    Spend(TransactionInput),
    Mint(PolicyId),
    Cert(usize),
    Reward(RewardAccount),
}

/// Intents sorted by what they contribute to the transaction
#[derive(Debug, Default)]
struct Plan {
    wallets: Vec<Address>,
    forced: Vec<UtxoEntry>,
    script_inputs: Vec<(UtxoEntry, Witness)>,
    datums: Vec<PlutusData>,
    outputs: Vec<TransactionOutput>,
    mint: Mint,
    mint_witnesses: BTreeMap<PolicyId, Witness>,
    certificates: Vec<(Certificate, Option<Witness>)>,
    withdrawals: BTreeMap<RewardAccount, (Coin, Option<Witness>)>,
    metadata: BTreeMap<MetadatumLabel, Metadatum>,
    valid_from: Option<u64>,
    valid_until: Option<u64>,
    extra_signers: BTreeSet<AddrKeyhash>,
    reference_inputs: BTreeSet<TransactionInput>,
}

impl Plan {
    fn collect(intents: &[TxIntent], utxos: &UtxoSet) -> Result<Self, FinalizationError> {
        let mut plan = Plan::default();

        for intent in intents {
            for input in intent.references() {
                resolve(utxos, input)?;
            }

            match intent {
                TxIntent::Spend(SpendSource::FromAddress(address)) => {
                    if !plan.wallets.contains(address) {
                        plan.wallets.push(address.clone());
                    }
                }
                TxIntent::Spend(SpendSource::FromUtxo(input)) => {
                    let output = resolve(utxos, input)?;

                    if let Some(hash) = output.address.payment_script_hash() {
                        return Err(FinalizationError::MissingScriptWitness(*hash));
                    }

                    if !plan.spends(input) {
                        plan.forced.push((input.clone(), output.clone()));
                    }
                }
                TxIntent::Spend(SpendSource::FromScript {
                    input,
                    witness,
                    datum,
                }) => {
                    let output = resolve(utxos, input)?;

                    let expected = output
                        .address
                        .payment_script_hash()
                        .ok_or_else(|| FinalizationError::NotScriptLocked(input.clone()))?;

                    let witness = Witness::resolve(witness, utxos, &mut plan.reference_inputs)?
                        .expect_hash(expected)?;

                    if let Some(DatumOption::Hash(hash)) = &output.datum {
                        let datum = datum
                            .as_ref()
                            .ok_or(FinalizationError::MissingDatum(*hash))?;

                        if datum.hash()? != *hash {
                            return Err(FinalizationError::MissingDatum(*hash));
                        }

                        if !plan.datums.contains(datum) {
                            plan.datums.push(datum.clone());
                        }
                    }

                    if !plan.spends(input) {
                        plan.script_inputs
                            .push(((input.clone(), output.clone()), witness));
                    }
                }
                TxIntent::SendTo(address, value) => {
                    plan.outputs
                        .push(TransactionOutput::new(address.clone(), value.clone()));
                }
                TxIntent::SendToOutput(output) => plan.outputs.push(output.clone()),
                TxIntent::MintBurn {
                    policy,
                    assets,
                    witness,
                } => {
                    let witness = Witness::resolve(witness, utxos, &mut plan.reference_inputs)?
                        .expect_hash(policy)?;

                    if assets.is_empty() {
                        return Err(FinalizationError::InvalidMint(format!(
                            "no assets given for policy {policy}"
                        )));
                    }

                    for (name, delta) in assets {
                        if *delta == 0 {
                            return Err(FinalizationError::InvalidMint(format!(
                                "zero quantity of {policy}.{name}"
                            )));
                        }

                        plan.mint
                            .add(*policy, name.clone(), *delta)
                            .map_err(|e| FinalizationError::InvalidMint(e.to_string()))?;
                    }

                    plan.mint_witnesses.entry(*policy).or_insert(witness);
                }
                TxIntent::RegisterStake { credential } => {
                    plan.certificates
                        .push((Certificate::StakeRegistration(credential.clone()), None));
                }
                TxIntent::DeregisterStake {
                    credential,
                    witness,
                } => {
                    let witness = plan.stake_witness(credential, witness.as_ref(), utxos)?;
                    plan.certificates
                        .push((Certificate::StakeDeregistration(credential.clone()), witness));
                }
                TxIntent::DelegateStake {
                    credential,
                    pool,
                    witness,
                } => {
                    let witness = plan.stake_witness(credential, witness.as_ref(), utxos)?;
                    plan.certificates.push((
                        Certificate::StakeDelegation(credential.clone(), *pool),
                        witness,
                    ));
                }
                TxIntent::Withdraw {
                    reward_account,
                    amount,
                    witness,
                } => {
                    let credential = StakeCredential::from(reward_account);
                    let witness = plan.stake_witness(&credential, witness.as_ref(), utxos)?;

                    let entry = plan
                        .withdrawals
                        .entry(reward_account.clone())
                        .or_insert((0, witness));

                    entry.0 = entry.0.saturating_add(*amount);
                }
                TxIntent::Metadata { label, metadatum } => {
                    if plan.metadata.insert(*label, metadatum.clone()).is_some() {
                        return Err(FinalizationError::DuplicateMetadataLabel(*label));
                    }
                }
                TxIntent::ValidityInterval {
                    valid_from,
                    valid_until,
                } => {
                    plan.valid_from = plan.valid_from.max(*valid_from);
                    plan.valid_until = match (plan.valid_until, *valid_until) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                }
                TxIntent::RequireSigner(signer) => {
                    plan.extra_signers.insert(*signer);
                }
                TxIntent::ReferenceInput(input) => {
                    plan.reference_inputs.insert(input.clone());
                }
            }
        }

        if let (Some(valid_from), Some(valid_until)) = (plan.valid_from, plan.valid_until) {
            if valid_from >= valid_until {
                return Err(FinalizationError::EmptyValidityInterval {
                    valid_from,
                    valid_until,
                });
            }
        }

        // policies whose deltas cancel out don't run
        plan.mint_witnesses
            .retain(|policy, _| plan.mint.assets_of(policy).is_some());

        Ok(plan)
    }

    fn spends(&self, input: &TransactionInput) -> bool {
        self.forced.iter().any(|(x, _)| x == input)
            || self.script_inputs.iter().any(|((x, _), _)| x == input)
    }

    fn stake_witness(
        &mut self,
        credential: &StakeCredential,
        witness: Option<&ScriptWitness>,
        utxos: &UtxoSet,
    ) -> Result<Option<Witness>, FinalizationError> {
        match (credential, witness) {
            (StakeCredential::ScriptHash(hash), Some(witness)) => {
                let witness = Witness::resolve(witness, utxos, &mut self.reference_inputs)?;
                Ok(Some(witness.expect_hash(hash)?))
            }
            (StakeCredential::ScriptHash(hash), None) => {
                Err(FinalizationError::MissingScriptWitness(*hash))
            }
            (StakeCredential::AddrKeyhash(_), _) => Ok(None),
        }
    }

    fn witnesses(&self) -> impl Iterator<Item = &Witness> {
        self.script_inputs
            .iter()
            .map(|(_, w)| w)
            .chain(self.mint_witnesses.values())
            .chain(self.certificates.iter().filter_map(|(_, w)| w.as_ref()))
            .chain(self.withdrawals.values().filter_map(|(_, w)| w.as_ref()))
    }

    fn runs_plutus(&self) -> bool {
        self.witnesses().any(|w| w.plutus().is_some())
    }

    fn primary_address(&self) -> Option<&Address> {
        self.wallets.first().or_else(|| {
            self.forced
                .iter()
                .map(|(_, o)| &o.address)
                .find(|a| a.payment_key_hash().is_some())
        })
    }

    fn deposits(&self, key_deposit: Coin) -> BigInt {
        self.certificates
            .iter()
            .map(|(c, _)| BigInt::from(c.deposit(key_deposit)))
            .sum()
    }

    fn refunds(&self, key_deposit: Coin) -> BigInt {
        self.certificates
            .iter()
            .map(|(c, _)| BigInt::from(c.refund(key_deposit)))
            .sum()
    }

    fn withdrawn(&self) -> BigInt {
        self.withdrawals
            .values()
            .map(|(amount, _)| BigInt::from(*amount))
            .sum()
    }

    /// What the primary account must cover once inflows are netted out
    fn obligations(&self, fee: Coin, key_deposit: Coin) -> Value {
        let outputs: Value = self.outputs.iter().map(|o| o.value.clone()).sum();

        let lovelace = BigInt::from(fee) + self.deposits(key_deposit)
            - self.withdrawn()
            - self.refunds(key_deposit);

        outputs + Value::only_lovelace(lovelace) - self.mint.to_value()
    }

    fn wallet_utxos(&self, utxos: &UtxoSet, address: &Address) -> Vec<UtxoEntry> {
        utxos
            .iter()
            .filter(|(i, o)| {
                o.address == *address && !self.spends(i) && !self.reference_inputs.contains(i)
            })
            .map(|(i, o)| (i.clone(), o.clone()))
            .collect()
    }

    fn auxiliary_data(&self) -> Option<AuxiliaryData> {
        if self.metadata.is_empty() {
            return None;
        }

        let entries = self
            .metadata
            .iter()
            .map(|(label, value)| (*label, value.clone()))
            .collect();

        Some(AuxiliaryData::from_metadata(KeyValuePairs::Def(entries)))
    }

    fn language_views(&self, cost_models: &CostModels) -> Result<LanguageViews, FinalizationError> {
        let languages: BTreeSet<Language> = self
            .witnesses()
            .filter_map(|w| w.plutus().map(|(language, _)| language))
            .collect();

        let views = languages
            .into_iter()
            .map(|language| {
                cost_models
                    .get(language)
                    .map(|model| LanguageView(language, model.clone()))
                    .ok_or(FinalizationError::MissingCostModel(language))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LanguageViews::new(views))
    }

    /// One context per Plutus redeemer, pointing into the sorted `inputs`
    fn script_contexts(&self, inputs: &[TransactionInput]) -> Vec<(RedeemerKey, ScriptContext)> {
        let mut out = vec![];

        let mut push = |key: RedeemerKey, purpose: ScriptPurpose, index: usize, w: &Witness| {
            if let Some((language, redeemer)) = w.plutus() {
                out.push((
                    key,
                    ScriptContext {
                        tag: purpose.tag(),
                        purpose,
                        index: index as u32,
                        language,
                        redeemer: redeemer.clone(),
                    },
                ));
            }
        };

        for ((input, _), w) in self.script_inputs.iter() {
            if let Some(index) = inputs.iter().position(|x| x == input) {
                let purpose = ScriptPurpose::Spending(input.clone());
                push(RedeemerKey::Spend(input.clone()), purpose, index, w);
            }
        }

        for (index, policy) in self.mint.policies().enumerate() {
            if let Some(w) = self.mint_witnesses.get(policy) {
                push(RedeemerKey::Mint(*policy), ScriptPurpose::Minting(*policy), index, w);
            }
        }

        for (index, (certificate, w)) in self.certificates.iter().enumerate() {
            if let Some(w) = w {
                let purpose = ScriptPurpose::Certifying(index as u32, certificate.clone());
                push(RedeemerKey::Cert(index), purpose, index, w);
            }
        }

        for (index, (account, (_, w))) in self.withdrawals.iter().enumerate() {
            if let Some(w) = w {
                let purpose = ScriptPurpose::Rewarding(StakeCredential::from(account));
                push(RedeemerKey::Reward(account.clone()), purpose, index, w);
            }
        }

        out
    }

    fn witness_set(&self, redeemers: Vec<Redeemer>) -> WitnessSet {
        fn non_empty<T>(scripts: BTreeMap<ScriptHash, T>) -> Option<Set<T>> {
            (!scripts.is_empty()).then(|| Set::from(scripts.into_values().collect::<Vec<_>>()))
        }

        let mut native = BTreeMap::new();
        let mut v1 = BTreeMap::new();
        let mut v2 = BTreeMap::new();
        let mut v3 = BTreeMap::new();

        for w in self.witnesses().filter(|w| w.inline) {
            match &w.script {
                Script::Native(x) => {
                    native.insert(w.hash, x.clone());
                }
                Script::PlutusV1(x) => {
                    v1.insert(w.hash, x.clone());
                }
                Script::PlutusV2(x) => {
                    v2.insert(w.hash, x.clone());
                }
                Script::PlutusV3(x) => {
                    v3.insert(w.hash, x.clone());
                }
            }
        }

        WitnessSet {
            native_script: non_empty(native),
            plutus_v1_script: non_empty(v1),
            plutus_v2_script: non_empty(v2),
            plutus_v3_script: non_empty(v3),
            plutus_data: (!self.datums.is_empty()).then(|| Set::from(self.datums.clone())),
            redeemer: (!redeemers.is_empty()).then(|| Redeemers::from(redeemers)),
            ..Default::default()
        }
    }

    /// Keys that must sign for the transaction to be valid
    fn required_signers(
        &self,
        inputs: &[UtxoEntry],
        collateral: Option<&Collateral>,
    ) -> BTreeSet<AddrKeyhash> {
        let mut out = self.extra_signers.clone();

        let spent = inputs
            .iter()
            .chain(collateral.iter().flat_map(|c| c.inputs.iter()));

        out.extend(spent.filter_map(|(_, o)| o.address.payment_key_hash().copied()));

        for (certificate, _) in self.certificates.iter() {
            if let Some(StakeCredential::AddrKeyhash(hash)) = certificate.witness_credential() {
                out.insert(*hash);
            }
        }

        for account in self.withdrawals.keys() {
            if let StakeCredential::AddrKeyhash(hash) = StakeCredential::from(account) {
                out.insert(hash);
            }
        }

        out
    }

    /// Keys that may sign for native scripts, counted when sizing the fee
    fn native_script_keys(&self) -> BTreeSet<AddrKeyhash> {
        self.witnesses()
            .filter_map(|w| match &w.script {
                Script::Native(x) => Some(x.key_hashes()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// A funding source and the change address of its surplus
#[derive(Debug)]
struct Account {
    address: Address,
    forced: Vec<UtxoEntry>,

    /// Lovelace selected on top of the target so that change reaches min-ada
    extra: BigInt,
}

impl Account {
    fn new(address: Address) -> Self {
        Account {
            address,
            forced: vec![],
            extra: BigInt::default(),
        }
    }

    /// The primary account first, then one per other owner of forced inputs
    fn from_plan(plan: &Plan) -> Result<Vec<Account>, FinalizationError> {
        let primary = plan
            .primary_address()
            .ok_or(FinalizationError::NoFundingSource)?;

        let mut accounts = vec![Account::new(primary.clone())];

        for entry in plan.forced.iter() {
            match accounts.iter_mut().find(|a| a.address == entry.1.address) {
                Some(account) => account.forced.push(entry.clone()),
                None => {
                    let mut account = Account::new(entry.1.address.clone());
                    account.forced.push(entry.clone());
                    accounts.push(account);
                }
            }
        }

        Ok(accounts)
    }
}

#[derive(Debug)]
struct Collateral {
    inputs: Vec<UtxoEntry>,
    total: Coin,
    ret: Option<TransactionOutput>,
}

fn placeholder_witness(signer: &AddrKeyhash) -> VKeyWitness {
    let mut vkey = signer.as_ref().to_vec();
    vkey.resize(32, 0);

    VKeyWitness {
        vkey: VKey::new(vkey),
        signature: Signature::new(vec![0; 64]),
    }
}

pub struct Finalizer<'a, E> {
    config: &'a Config,
    evaluator: &'a E,
}

impl<'a, E: ScriptEvaluator> Finalizer<'a, E> {
    pub fn new(config: &'a Config, evaluator: &'a E) -> Self {
        Self { config, evaluator }
    }

    /// Builds a balanced transaction out of `intents`
    ///
    /// Every UTxO the intents mention must be in `utxos`, which also provides
    /// the funds of wallet addresses. `existing_signatures` are carried over
    /// to the witness set as-is.
    #[instrument(skip_all, fields(intents = intents.len(), utxos = utxos.len()))]
    pub fn finalize(
        &self,
        utxos: &UtxoSet,
        existing_signatures: &[VKeyWitness],
        intents: &[TxIntent],
    ) -> Result<FinalizedTx, FinalizationError> {
        let params = &self.config.protocol;

        let plan = Plan::collect(intents, utxos)?;
        let mut accounts = Account::from_plan(&plan)?;

        let wallet_utxos: Vec<Vec<UtxoEntry>> = plan
            .wallets
            .iter()
            .map(|address| plan.wallet_utxos(utxos, address))
            .collect();

        let collateral_candidates = self.collateral_candidates(&plan, &wallet_utxos);

        let auxiliary_data = plan.auxiliary_data();
        let auxiliary_data_hash = auxiliary_data
            .as_ref()
            .map(AuxiliaryData::hash)
            .transpose()?;

        let language_views = plan.language_views(&params.cost_models)?;
        let native_script_keys = plan.native_script_keys();

        let mut fee: Coin = 0;
        let mut ex_units: BTreeMap<RedeemerKey, ExUnits> = BTreeMap::new();

        for iteration in 1..=self.config.max_fee_iterations {
            let mut settled = true;

            let obligations = plan.obligations(fee, params.stake_key_deposit);
            let mut inputs: Vec<UtxoEntry> = vec![];
            let mut change_outputs = vec![];

            for (position, account) in accounts.iter_mut().enumerate() {
                let mut already = account.forced.clone();
                let extra = Value::only_lovelace(account.extra.clone());

                let selection = if position == 0 {
                    already.extend(plan.script_inputs.iter().map(|(entry, _)| entry.clone()));

                    let target = obligations.clone() + extra;
                    let mut selection = self.select_primary(&wallet_utxos, already, target.clone())?;

                    // inflows alone can cover the target, but a transaction
                    // must still spend at least one input
                    if selection.selected_utxos.is_empty() {
                        selection =
                            self.select_primary(&wallet_utxos, vec![], Value::only_lovelace(1))?;
                        selection.change = Some(selection.total() - target).filter(|x| !x.is_zero());
                    }

                    selection
                } else {
                    let context = SelectionContext {
                        available_utxos: vec![],
                        already_selected_utxos: already,
                        target: extra,
                    };

                    self.config
                        .selection
                        .algorithm
                        .select(self.config.selection.max_inputs, &context)?
                };

                let change = selection.change.unwrap_or_default()
                    + Value::only_lovelace(account.extra.clone());

                inputs.extend(selection.selected_utxos);

                if change.is_zero() {
                    continue;
                }

                let output = TransactionOutput::new(account.address.clone(), change);
                let min_ada = BigInt::from(params.min_ada(&output)?);
                let lovelace = output.value.lovelace();

                if lovelace < min_ada {
                    let shortfall = min_ada - lovelace;
                    warn!(account = position, %shortfall, "change below min-ada, raising target");
                    account.extra += shortfall;
                    settled = false;
                }

                change_outputs.push(output);
            }

            let inputs: Vec<UtxoEntry> = inputs
                .into_iter()
                .sorted_by(|a, b| a.0.cmp(&b.0))
                .dedup_by(|a, b| a.0 == b.0)
                .collect();

            let input_refs: Vec<TransactionInput> = inputs.iter().map(|(i, _)| i.clone()).collect();

            let collateral = if plan.runs_plutus() {
                let address = &accounts[0].address;
                Some(self.collateral(collateral_candidates.clone(), fee, address)?)
            } else {
                None
            };

            let contexts = plan.script_contexts(&input_refs);

            let mut redeemers: Vec<Redeemer> = contexts
                .iter()
                .map(|(key, context)| Redeemer {
                    tag: context.tag,
                    index: context.index,
                    data: context.redeemer.clone(),
                    ex_units: ex_units.get(key).copied().unwrap_or_default(),
                })
                .collect();

            redeemers.sort_by_key(|r| (r.tag, r.index));

            let mut outputs = plan.outputs.clone();
            outputs.extend(change_outputs);

            let mut body = TransactionBody {
                inputs: Set::from(input_refs),
                outputs,
                fee,
                ttl: plan.valid_until,
                certificates: (!plan.certificates.is_empty()).then(|| {
                    Set::from(
                        plan.certificates
                            .iter()
                            .map(|(c, _)| c.clone())
                            .collect::<Vec<_>>(),
                    )
                }),
                withdrawals: (!plan.withdrawals.is_empty()).then(|| {
                    plan.withdrawals
                        .iter()
                        .map(|(account, (amount, _))| (account.clone(), *amount))
                        .collect()
                }),
                auxiliary_data_hash,
                validity_interval_start: plan.valid_from,
                mint: (!plan.mint.is_empty()).then(|| plan.mint.clone()),
                script_data_hash: None,
                collateral: collateral
                    .as_ref()
                    .map(|c| Set::sorted(c.inputs.iter().map(|(i, _)| i.clone()))),
                required_signers: (!plan.extra_signers.is_empty())
                    .then(|| Set::sorted(plan.extra_signers.iter().copied())),
                network_id: self.config.network_id,
                collateral_return: collateral.as_ref().and_then(|c| c.ret.clone()),
                total_collateral: collateral.as_ref().map(|c| c.total),
                reference_inputs: (!plan.reference_inputs.is_empty())
                    .then(|| Set::sorted(plan.reference_inputs.iter().cloned())),
            };

            let mut witness_set = plan.witness_set(redeemers);
            witness_set.merge_vkey_witnesses(existing_signatures.iter().cloned());

            let script_data = ScriptData {
                redeemers: witness_set.redeemer.clone(),
                datums: witness_set.plutus_data.clone(),
                language_views: language_views.clone(),
            };

            if !script_data.is_empty() {
                body.script_data_hash = Some(script_data.hash()?);
            }

            let tx = Tx {
                transaction_body: body,
                transaction_witness_set: witness_set,
                success: true,
                auxiliary_data: auxiliary_data.clone(),
            };

            if !contexts.is_empty() {
                let resolved = self.resolved_inputs(utxos, &plan, &inputs, collateral.as_ref());

                for (key, units) in self.evaluate(&tx, &contexts, resolved)? {
                    let slot = ex_units.entry(key).or_default();
                    let merged = ExUnits::new(slot.mem.max(units.mem), slot.steps.max(units.steps));

                    if merged != *slot {
                        *slot = merged;
                        settled = false;
                    }
                }
            }

            let signers = plan.required_signers(&inputs, collateral.as_ref());

            let placeholders: Vec<_> = missing_signers(&tx, signers.union(&native_script_keys))
                .iter()
                .map(placeholder_witness)
                .collect();

            let mut sized = tx.clone();
            sized
                .transaction_witness_set
                .merge_vkey_witnesses(placeholders);

            let size = minicbor::to_vec(&sized)?.len() as u64;

            let total_units: ExUnits = contexts
                .iter()
                .map(|(key, _)| ex_units.get(key).copied().unwrap_or_default())
                .sum();

            let min_fee = params.min_fee(size, &total_units);

            debug!(iteration, fee, min_fee, size, settled, "fee iteration");

            if settled && min_fee <= fee {
                self.verify(&plan, &tx, &inputs, size)?;

                return Ok(FinalizedTx {
                    tx,
                    fee,
                    required_signers: signers.into_iter().collect(),
                    iterations: iteration,
                });
            }

            fee = fee.max(min_fee);
        }

        Err(FinalizationError::IterationCapExceeded {
            iterations: self.config.max_fee_iterations,
            fee,
        })
    }

    /// Funds the primary account, moving on to the next wallet address while
    /// the previous ones fall short
    fn select_primary(
        &self,
        wallet_utxos: &[Vec<UtxoEntry>],
        already: Vec<UtxoEntry>,
        target: Value,
    ) -> Result<Selection, FinalizationError> {
        let algorithm = self.config.selection.algorithm;
        let max_inputs = self.config.selection.max_inputs;

        let mut pools = wallet_utxos.iter();
        let mut available = pools.next().cloned().unwrap_or_default();
        let mut already = already;

        loop {
            let context = SelectionContext {
                available_utxos: available,
                already_selected_utxos: already,
                target: target.clone(),
            };

            match algorithm.select(max_inputs, &context) {
                Ok(selection) => return Ok(selection),
                Err(CoinSelectionError::UTxOBalanceInsufficient {
                    selected_utxos,
                    missing_value,
                }) => match pools.next() {
                    Some(next) => {
                        debug!(%missing_value, "wallet address short, trying the next one");
                        already = selected_utxos;
                        available = next.clone();
                    }
                    None => {
                        return Err(CoinSelectionError::UTxOBalanceInsufficient {
                            selected_utxos,
                            missing_value,
                        }
                        .into())
                    }
                },
            }
        }
    }

    /// Key-locked, ada-only UTxOs of the wallet, in reference order
    fn collateral_candidates(&self, plan: &Plan, wallet_utxos: &[Vec<UtxoEntry>]) -> Vec<UtxoEntry> {
        wallet_utxos
            .iter()
            .flatten()
            .chain(plan.forced.iter())
            .filter(|(_, o)| {
                o.address.payment_key_hash().is_some()
                    && o.value.is_lovelace_only()
                    && o.script_ref.is_none()
            })
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .dedup_by(|a, b| a.0 == b.0)
            .cloned()
            .collect()
    }

    fn collateral(
        &self,
        candidates: Vec<UtxoEntry>,
        fee: Coin,
        return_address: &Address,
    ) -> Result<Collateral, FinalizationError> {
        let params = &self.config.protocol;
        let required = params.required_collateral(fee);

        let context = SelectionContext {
            available_utxos: candidates,
            already_selected_utxos: vec![],
            target: Value::only_lovelace(required.max(1)),
        };

        let selection = SelectionAlgorithm::LargestFirst
            .select(params.max_collateral_inputs as usize, &context)
            .map_err(|_| FinalizationError::InsufficientCollateral { required })?;

        let posted = selection.total().coin()?;
        let surplus = posted.saturating_sub(required);

        for (input, _) in selection.selected_utxos.iter() {
            trace!(%input, "collateral input");
        }

        if surplus > 0 {
            let ret = TransactionOutput::new(return_address.clone(), Value::only_lovelace(surplus));

            if surplus >= params.min_ada(&ret)? {
                return Ok(Collateral {
                    inputs: selection.selected_utxos,
                    total: required,
                    ret: Some(ret),
                });
            }
        }

        // a surplus too small for its own output is posted as collateral
        Ok(Collateral {
            inputs: selection.selected_utxos,
            total: posted,
            ret: None,
        })
    }

    fn resolved_inputs(
        &self,
        utxos: &UtxoSet,
        plan: &Plan,
        inputs: &[UtxoEntry],
        collateral: Option<&Collateral>,
    ) -> Vec<UtxoEntry> {
        let mut resolved: BTreeMap<TransactionInput, TransactionOutput> =
            inputs.iter().cloned().collect();

        if let Some(collateral) = collateral {
            resolved.extend(collateral.inputs.iter().cloned());
        }

        for input in plan.reference_inputs.iter() {
            if let Some(output) = utxos.get(input) {
                resolved.insert(input.clone(), output.clone());
            }
        }

        resolved.into_iter().collect()
    }

    #[instrument(skip_all, fields(redeemers = contexts.len()))]
    fn evaluate(
        &self,
        tx: &Tx,
        contexts: &[(RedeemerKey, ScriptContext)],
        resolved_inputs: Vec<UtxoEntry>,
    ) -> Result<Vec<(RedeemerKey, ExUnits)>, FinalizationError> {
        let request = EvaluationRequest {
            tx_cbor: minicbor::to_vec(tx)?,
            resolved_inputs,
            cost_models: &self.config.protocol.cost_models,
            contexts: contexts.iter().map(|(_, c)| c.clone()).collect(),
        };

        let results = self
            .evaluator
            .evaluate(&request)
            .map_err(|e| FinalizationError::ScriptEvaluation(Box::new(e)))?;

        contexts
            .iter()
            .map(|(key, context)| {
                results
                    .iter()
                    .find(|r| r.tag == context.tag && r.index == context.index)
                    .map(|r| (key.clone(), r.ex_units))
                    .ok_or(FinalizationError::MissingEvaluation {
                        tag: context.tag,
                        index: context.index,
                    })
            })
            .collect()
    }

    /// Ledger rules a settled draft must satisfy before it is handed out
    fn verify(
        &self,
        plan: &Plan,
        tx: &Tx,
        inputs: &[UtxoEntry],
        size: u64,
    ) -> Result<(), FinalizationError> {
        let params = &self.config.protocol;
        let body = &tx.transaction_body;

        let outputs = body.outputs.iter().chain(body.collateral_return.iter());

        for (index, output) in outputs.enumerate() {
            let required = params.min_ada(output)?;
            let actual = output.value.lovelace();

            if actual < BigInt::from(required) {
                return Err(FinalizationError::InsufficientMinAda {
                    index,
                    required,
                    actual,
                });
            }

            let value_size = minicbor::to_vec(&output.value)?.len() as u64;

            if value_size > params.max_value_size {
                return Err(FinalizationError::ValueTooLarge {
                    index,
                    size: value_size,
                    max: params.max_value_size,
                });
            }
        }

        if size > params.max_tx_size {
            return Err(FinalizationError::TransactionTooLarge {
                size,
                max: params.max_tx_size,
            });
        }

        let used: ExUnits = tx
            .transaction_witness_set
            .redeemer
            .iter()
            .flat_map(|r| r.iter())
            .map(|r| r.ex_units)
            .sum();

        let limit = ExUnits::from(params.max_tx_execution_units);

        if !used.fits(&limit) {
            return Err(FinalizationError::ExUnitsExceeded { used, limit });
        }

        let key_deposit = params.stake_key_deposit;

        let consumed = inputs.iter().map(|(_, o)| o.value.clone()).sum::<Value>()
            + plan.mint.to_value()
            + Value::only_lovelace(plan.withdrawn() + plan.refunds(key_deposit));

        let produced = body.outputs.iter().map(|o| o.value.clone()).sum::<Value>()
            + Value::only_lovelace(BigInt::from(body.fee) + plan.deposits(key_deposit));

        if consumed != produced {
            return Err(FinalizationError::Unbalanced { consumed, produced });
        }

        Ok(())
    }
}
