use pretty_assertions::assert_eq;
use tessera_addresses::{Network, StakePayload};
use tessera_primitives::{
    DatumOption, ExUnits, Language, PlutusData, PlutusScript, RedeemerTag, Script, StakeAddress,
    TransactionOutput, UtxoSet,
};
use tessera_txbuilder::{
    Config, FinalizationError, Finalizer, LanguageView, LanguageViews, ScriptData, ScriptPurpose,
    ScriptWitness, TxIntent,
};

mod common;

use common::*;

fn always_succeeds() -> Script {
    Script::PlutusV2(PlutusScript::new(vec![0x49, 0x48, 0x01, 0x00, 0x00, 0x22, 0x22, 0x00, 0x11]))
}

fn plutus_config() -> Config {
    let mut config = Config::default();
    config.protocol.cost_models.plutus_v2 = Some(vec![100_788, 420, 1, 1, 1_000, 173_000]);
    config
}

/// A wallet with collateral and a script UTxO locking 10 ada with an inline datum
fn fixture(script: &Script) -> (Key, UtxoSet) {
    let wallet = Key(1);
    let locked_at = script_address(script.hash().unwrap());

    let utxos = utxo_set([
        utxo(1, 0, &wallet.address(), ada(20_000_000)),
        (
            input(5, 0),
            TransactionOutput::new(locked_at, ada(10_000_000))
                .with_datum(DatumOption::Data(PlutusData::integer(42))),
        ),
    ]);

    (wallet, utxos)
}

#[test]
fn script_spend_is_evaluated_and_collateralized() {
    let script = always_succeeds();
    let (wallet, utxos) = fixture(&script);
    let config = plutus_config();
    let evaluator = FixedEvaluator::new(500_000, 200_000_000);

    let finalized = Finalizer::new(&config, &evaluator)
        .finalize(
            &utxos,
            &[],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::spend_script(
                    input(5, 0),
                    ScriptWitness::plutus_inline(script.clone(), PlutusData::constr(0, vec![])),
                    None,
                ),
                TxIntent::send_lovelace(Key(2).address(), 5_000_000),
            ],
        )
        .unwrap();

    let tx = &finalized.tx;
    let body = &tx.transaction_body;

    // the script input alone covers the payment
    assert_eq!(body.inputs.to_vec(), vec![input(5, 0)]);

    let redeemers = tx.transaction_witness_set.redeemer.as_ref().unwrap();
    assert_eq!(redeemers.len(), 1);
    assert_eq!(redeemers[0].tag, RedeemerTag::Spend);
    assert_eq!(redeemers[0].index, 0);
    assert_eq!(redeemers[0].ex_units, ExUnits::new(500_000, 200_000_000));

    let scripts = tx.transaction_witness_set.plutus_v2_script.as_ref().unwrap();
    assert_eq!(scripts.len(), 1);

    let required = config.protocol.required_collateral(finalized.fee);
    assert_eq!(body.collateral.as_ref().unwrap().to_vec(), vec![input(1, 0)]);
    assert_eq!(body.total_collateral, Some(required));
    assert_eq!(
        body.collateral_return.as_ref().unwrap().value,
        ada(20_000_000 - required)
    );

    let script_data = ScriptData {
        redeemers: tx.transaction_witness_set.redeemer.clone(),
        datums: None,
        language_views: LanguageViews::new(vec![LanguageView(
            Language::PlutusV2,
            config.protocol.cost_models.plutus_v2.clone().unwrap(),
        )]),
    };
    assert_eq!(body.script_data_hash, Some(script_data.hash().unwrap()));

    // collateral needs a signature even though no wallet input is spent
    assert_eq!(finalized.required_signers, vec![wallet.hash()]);

    let requests = evaluator.requests.borrow();
    assert!(!requests.is_empty());
    assert_eq!(
        requests[0][0].purpose,
        ScriptPurpose::Spending(input(5, 0))
    );

    let (consumed, produced) = balance(&finalized, &utxos, 0, 0);
    assert_eq!(consumed, produced);
}

#[test]
fn fee_pays_for_execution() {
    let script = always_succeeds();
    let (wallet, utxos) = fixture(&script);
    let config = plutus_config();

    let intents = [
        TxIntent::spend_from_address(wallet.address()),
        TxIntent::spend_script(
            input(5, 0),
            ScriptWitness::plutus_inline(script, PlutusData::constr(0, vec![])),
            None,
        ),
    ];

    let cheap = FixedEvaluator::new(1_000, 1_000);
    let costly = FixedEvaluator::new(5_000_000, 2_000_000_000);

    let cheap = Finalizer::new(&config, &cheap)
        .finalize(&utxos, &[], &intents)
        .unwrap();

    let costly = Finalizer::new(&config, &costly)
        .finalize(&utxos, &[], &intents)
        .unwrap();

    let script_fee = config
        .protocol
        .script_fee(&ExUnits::new(5_000_000, 2_000_000_000));

    assert!(costly.fee > cheap.fee);
    assert!(costly.fee >= config.protocol.min_fee_constant + script_fee);
}

#[test]
fn reference_scripts_stay_out_of_the_witness_set() {
    let script = always_succeeds();
    let (wallet, mut utxos) = fixture(&script);

    utxos.insert(
        input(6, 0),
        TransactionOutput::new(Key(9).address(), ada(15_000_000)).with_script_ref(script.clone()),
    );

    let config = plutus_config();
    let evaluator = FixedEvaluator::new(500_000, 200_000_000);

    let finalized = Finalizer::new(&config, &evaluator)
        .finalize(
            &utxos,
            &[],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::spend_script(
                    input(5, 0),
                    ScriptWitness::plutus_reference(input(6, 0), PlutusData::constr(0, vec![])),
                    None,
                ),
            ],
        )
        .unwrap();

    let tx = &finalized.tx;

    assert_eq!(
        tx.transaction_body.reference_inputs.as_ref().unwrap().to_vec(),
        vec![input(6, 0)]
    );
    assert!(tx.transaction_witness_set.plutus_v2_script.is_none());
    assert!(tx.transaction_witness_set.redeemer.is_some());
}

#[test]
fn datum_hashes_need_the_datum() {
    let script = always_succeeds();
    let wallet = Key(1);
    let datum = PlutusData::integer(42);

    let utxos = utxo_set([
        utxo(1, 0, &wallet.address(), ada(20_000_000)),
        (
            input(5, 0),
            TransactionOutput::new(script_address(script.hash().unwrap()), ada(10_000_000))
                .with_datum(DatumOption::Hash(datum.hash().unwrap())),
        ),
    ]);

    let config = plutus_config();
    let evaluator = FixedEvaluator::new(500_000, 200_000_000);
    let finalizer = Finalizer::new(&config, &evaluator);

    let spend = |datum: Option<PlutusData>| {
        [
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::spend_script(
                input(5, 0),
                ScriptWitness::plutus_inline(script.clone(), PlutusData::constr(0, vec![])),
                datum,
            ),
        ]
    };

    let err = finalizer.finalize(&utxos, &[], &spend(None)).unwrap_err();
    assert!(matches!(err, FinalizationError::MissingDatum(_)));

    let err = finalizer
        .finalize(&utxos, &[], &spend(Some(PlutusData::integer(7))))
        .unwrap_err();
    assert!(matches!(err, FinalizationError::MissingDatum(_)));

    let finalized = finalizer
        .finalize(&utxos, &[], &spend(Some(datum.clone())))
        .unwrap();

    let datums = finalized.tx.transaction_witness_set.plutus_data.unwrap();
    assert_eq!(datums.to_vec(), vec![datum]);
}

#[test]
fn evaluator_errors_are_passed_through() {
    let script = always_succeeds();
    let (wallet, utxos) = fixture(&script);
    let config = plutus_config();

    let err = Finalizer::new(&config, &FailingEvaluator)
        .finalize(
            &utxos,
            &[],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::spend_script(
                    input(5, 0),
                    ScriptWitness::plutus_inline(script, PlutusData::constr(0, vec![])),
                    None,
                ),
            ],
        )
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "script evaluation failed: script failed: validator returned false"
    );
}

#[test]
fn scripts_need_a_cost_model() {
    let script = always_succeeds();
    let (wallet, utxos) = fixture(&script);
    let config = Config::default();
    let evaluator = FixedEvaluator::new(500_000, 200_000_000);

    let err = Finalizer::new(&config, &evaluator)
        .finalize(
            &utxos,
            &[],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::spend_script(
                    input(5, 0),
                    ScriptWitness::plutus_inline(script, PlutusData::constr(0, vec![])),
                    None,
                ),
            ],
        )
        .unwrap_err();

    assert!(matches!(
        err,
        FinalizationError::MissingCostModel(Language::PlutusV2)
    ));
}

#[test]
fn execution_limits_are_enforced() {
    let script = always_succeeds();
    let (wallet, utxos) = fixture(&script);
    let config = plutus_config();
    let evaluator = FixedEvaluator::new(20_000_000, 1_000);

    let err = Finalizer::new(&config, &evaluator)
        .finalize(
            &utxos,
            &[],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::spend_script(
                    input(5, 0),
                    ScriptWitness::plutus_inline(script, PlutusData::constr(0, vec![])),
                    None,
                ),
            ],
        )
        .unwrap_err();

    assert!(matches!(err, FinalizationError::ExUnitsExceeded { .. }));
}

#[test]
fn collateral_must_be_pure_ada() {
    let script = always_succeeds();
    let wallet = Key(1);

    let utxos = utxo_set([
        (
            input(1, 0),
            TransactionOutput::new(wallet.address(), ada(20_000_000))
                .with_script_ref(always_succeeds()),
        ),
        (
            input(5, 0),
            TransactionOutput::new(script_address(script.hash().unwrap()), ada(10_000_000))
                .with_datum(DatumOption::Data(PlutusData::integer(42))),
        ),
    ]);

    let config = plutus_config();
    let evaluator = FixedEvaluator::new(500_000, 200_000_000);

    let err = Finalizer::new(&config, &evaluator)
        .finalize(
            &utxos,
            &[],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::spend_script(
                    input(5, 0),
                    ScriptWitness::plutus_inline(script, PlutusData::constr(0, vec![])),
                    None,
                ),
            ],
        )
        .unwrap_err();

    assert!(matches!(
        err,
        FinalizationError::InsufficientCollateral { .. }
    ));
}

#[test]
fn key_locked_utxos_are_not_script_inputs() {
    let script = always_succeeds();
    let (wallet, utxos) = fixture(&script);
    let config = plutus_config();
    let evaluator = FixedEvaluator::new(500_000, 200_000_000);

    let err = Finalizer::new(&config, &evaluator)
        .finalize(
            &utxos,
            &[],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::spend_script(
                    input(1, 0),
                    ScriptWitness::plutus_inline(script, PlutusData::constr(0, vec![])),
                    None,
                ),
            ],
        )
        .unwrap_err();

    assert!(matches!(err, FinalizationError::NotScriptLocked(x) if x == input(1, 0)));
}

#[test]
fn reward_pointers_follow_ledger_account_order() {
    let script = always_succeeds();
    let wallet = Key(1);
    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(20_000_000))]);

    let key_account = StakeAddress::new(Network::Testnet, StakePayload::Stake(Key(7).hash()));
    let script_account =
        StakeAddress::new(Network::Testnet, StakePayload::Script(script.hash().unwrap()));

    let config = plutus_config();
    let evaluator = FixedEvaluator::new(500_000, 200_000_000);

    let finalized = Finalizer::new(&config, &evaluator)
        .finalize(
            &utxos,
            &[],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::Withdraw {
                    reward_account: key_account.clone(),
                    amount: 1_000_000,
                    witness: None,
                },
                TxIntent::Withdraw {
                    reward_account: script_account.clone(),
                    amount: 2_000_000,
                    witness: Some(ScriptWitness::plutus_inline(
                        script,
                        PlutusData::constr(0, vec![]),
                    )),
                },
            ],
        )
        .unwrap();

    let tx = &finalized.tx;

    let accounts: Vec<_> = tx
        .transaction_body
        .withdrawals
        .as_ref()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    assert_eq!(accounts, vec![script_account, key_account]);

    let redeemers = tx.transaction_witness_set.redeemer.as_ref().unwrap();
    assert_eq!(redeemers.len(), 1);
    assert_eq!(redeemers[0].tag, RedeemerTag::Reward);
    assert_eq!(redeemers[0].index, 0);

    let (consumed, produced) = balance(&finalized, &utxos, 0, 3_000_000);
    assert_eq!(consumed, produced);
}
