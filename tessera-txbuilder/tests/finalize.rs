use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use tessera_addresses::{Network, StakePayload};
use tessera_codec::minicbor;
use tessera_primitives::{
    AssetClass, AssetName, AuxiliaryData, Certificate, Hash, Metadatum, MintedTx, NativeScript,
    StakeAddress, StakeCredential, Tx, Value,
};
use tessera_txbuilder::{
    apply_transaction, CoinSelectionError, Config, FinalizationError, Finalizer, NoScripts,
    ScriptWitness, SigningError, TxIntent,
};

mod common;

use common::*;

fn finalize(
    config: &Config,
    utxos: &tessera_primitives::UtxoSet,
    intents: &[TxIntent],
) -> Result<tessera_txbuilder::FinalizedTx, FinalizationError> {
    Finalizer::new(config, &NoScripts).finalize(utxos, &[], intents)
}

#[test]
fn simple_send_pays_change_back() {
    let wallet = Key(1);
    let receiver = Key(2);

    let utxos = utxo_set([
        utxo(1, 0, &wallet.address(), ada(10_000_000)),
        utxo(1, 1, &wallet.address(), ada(3_000_000)),
    ]);

    let config = Config::default();

    let finalized = finalize(
        &config,
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::send_lovelace(receiver.address(), 2_000_000),
        ],
    )
    .unwrap();

    let body = &finalized.tx.transaction_body;

    assert_eq!(body.inputs.to_vec(), vec![input(1, 0)]);
    assert_eq!(body.outputs.len(), 2);
    assert_eq!(body.outputs[0].address, receiver.address());
    assert_eq!(body.outputs[0].value, ada(2_000_000));
    assert_eq!(body.outputs[1].address, wallet.address());
    assert_eq!(body.outputs[1].value, ada(8_000_000 - finalized.fee));

    assert_eq!(body.fee, finalized.fee);
    assert!(finalized.fee > config.protocol.min_fee_constant);
    assert!(finalized.iterations >= 2);
    assert!(finalized.iterations <= config.max_fee_iterations);

    assert_eq!(finalized.required_signers, vec![wallet.hash()]);
    assert!(finalized.tx.transaction_witness_set.vkeywitness.is_none());

    let (consumed, produced) = balance(&finalized, &utxos, 0, 0);
    assert_eq!(consumed, produced);
}

#[test]
fn fee_covers_the_signed_size() {
    let wallet = Key(1);

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);
    let config = Config::default();

    let finalized = finalize(
        &config,
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::send_lovelace(Key(2).address(), 2_000_000),
        ],
    )
    .unwrap();

    let fee = finalized.fee;
    let signed = finalized.sign(&KeySigner(vec![Key(1)]), false).unwrap();
    let size = minicbor::to_vec(&signed).unwrap().len() as u64;

    assert!(config.protocol.linear_fee(size) <= fee);
}

#[test]
fn encoded_transaction_decodes_to_itself() {
    let wallet = Key(1);

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::send_lovelace(Key(2).address(), 2_000_000),
        ],
    )
    .unwrap();

    let cbor = finalized.to_cbor().unwrap();
    let decoded: Tx = minicbor::decode(&cbor).unwrap();

    assert_eq!(decoded, finalized.tx);
    assert_eq!(decoded.id().unwrap(), finalized.id().unwrap());
}

#[test]
fn small_change_pulls_in_another_input() {
    let wallet = Key(1);

    let utxos = utxo_set([
        utxo(1, 0, &wallet.address(), ada(4_500_000)),
        utxo(1, 1, &wallet.address(), ada(3_000_000)),
    ]);

    let config = Config::default();

    let finalized = finalize(
        &config,
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::send_lovelace(Key(2).address(), 4_000_000),
        ],
    )
    .unwrap();

    let body = &finalized.tx.transaction_body;
    assert_eq!(body.inputs.to_vec(), vec![input(1, 0), input(1, 1)]);

    let change = &body.outputs[1];
    let min_ada = config.protocol.min_ada(change).unwrap();
    assert!(change.value.coin().unwrap() >= min_ada);

    let (consumed, produced) = balance(&finalized, &utxos, 0, 0);
    assert_eq!(consumed, produced);
}

#[test]
fn shortfall_spills_over_to_the_next_wallet() {
    let first = Key(1);
    let second = Key(3);

    let utxos = utxo_set([
        utxo(1, 0, &first.address(), ada(2_000_000)),
        utxo(2, 0, &second.address(), ada(9_000_000)),
    ]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(first.address()),
            TxIntent::spend_from_address(second.address()),
            TxIntent::send_lovelace(Key(2).address(), 5_000_000),
        ],
    )
    .unwrap();

    let body = &finalized.tx.transaction_body;
    assert_eq!(body.inputs.to_vec(), vec![input(1, 0), input(2, 0)]);

    // change goes to the first wallet address
    assert_eq!(body.outputs[1].address, first.address());

    let mut signers = vec![first.hash(), second.hash()];
    signers.sort();
    assert_eq!(finalized.required_signers, signers);
}

#[test]
fn forced_inputs_of_other_owners_get_their_own_change() {
    let wallet = Key(1);
    let other = Key(4);

    let utxos = utxo_set([
        utxo(1, 0, &wallet.address(), ada(10_000_000)),
        utxo(4, 0, &other.address(), ada(5_000_000)),
    ]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::spend_utxo(input(4, 0)),
            TxIntent::send_lovelace(Key(2).address(), 2_000_000),
        ],
    )
    .unwrap();

    let body = &finalized.tx.transaction_body;
    assert_eq!(body.inputs.to_vec(), vec![input(1, 0), input(4, 0)]);

    let back_to_other: Vec<_> = body
        .outputs
        .iter()
        .filter(|o| o.address == other.address())
        .collect();

    assert_eq!(back_to_other.len(), 1);
    assert_eq!(back_to_other[0].value, ada(5_000_000));

    let (consumed, produced) = balance(&finalized, &utxos, 0, 0);
    assert_eq!(consumed, produced);
}

#[test]
fn forced_input_alone_funds_the_transaction() {
    let owner = Key(4);

    let utxos = utxo_set([utxo(4, 0, &owner.address(), ada(5_000_000))]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_utxo(input(4, 0)),
            TxIntent::send_lovelace(Key(2).address(), 2_000_000),
        ],
    )
    .unwrap();

    let body = &finalized.tx.transaction_body;
    assert_eq!(body.outputs[1].address, owner.address());
    assert_eq!(body.outputs[1].value, ada(3_000_000 - finalized.fee));
}

#[test]
fn insufficient_funds_report_the_missing_value() {
    let wallet = Key(1);

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(1_000_000))]);

    let err = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::send_lovelace(Key(2).address(), 5_000_000),
        ],
    )
    .unwrap_err();

    match err {
        FinalizationError::CoinSelection(CoinSelectionError::UTxOBalanceInsufficient {
            selected_utxos,
            missing_value,
            ..
        }) => {
            assert_eq!(selected_utxos.len(), 1);
            assert!(missing_value.lovelace() >= BigInt::from(4_000_000));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_utxos_are_rejected() {
    let utxos = utxo_set([utxo(1, 0, &Key(1).address(), ada(10_000_000))]);

    let err = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(Key(1).address()),
            TxIntent::spend_utxo(input(9, 9)),
        ],
    )
    .unwrap_err();

    assert!(matches!(err, FinalizationError::UnresolvedInput(x) if x == input(9, 9)));
}

#[test]
fn nothing_to_fund_from() {
    let err = finalize(
        &Config::default(),
        &utxo_set([]),
        &[TxIntent::send_lovelace(Key(2).address(), 2_000_000)],
    )
    .unwrap_err();

    assert!(matches!(err, FinalizationError::NoFundingSource));
}

#[test]
fn fee_must_settle_within_the_iteration_cap() {
    let wallet = Key(1);
    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let config = Config {
        max_fee_iterations: 1,
        ..Config::default()
    };

    let err = finalize(
        &config,
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::send_lovelace(Key(2).address(), 2_000_000),
        ],
    )
    .unwrap_err();

    assert!(matches!(
        err,
        FinalizationError::IterationCapExceeded { iterations: 1, fee } if fee > 0
    ));
}

#[test]
fn outputs_below_min_ada_are_rejected() {
    let wallet = Key(1);
    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let err = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::send_lovelace(Key(2).address(), 1_000),
        ],
    )
    .unwrap_err();

    assert!(matches!(
        err,
        FinalizationError::InsufficientMinAda { index: 0, .. }
    ));
}

fn policy(key: &Key) -> (NativeScript, Hash<28>) {
    let script = NativeScript::ScriptPubkey(key.hash());
    let hash = script.hash().unwrap();
    (script, hash)
}

#[test]
fn mint_with_native_script() {
    let wallet = Key(1);
    let minter = Key(5);
    let (script, policy) = policy(&minter);
    let name = AssetName::from(b"TOKEN".to_vec());

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::MintBurn {
                policy,
                assets: vec![(name.clone(), 100)],
                witness: ScriptWitness::Native(script.clone()),
            },
            TxIntent::SendTo(
                Key(2).address(),
                ada(2_000_000) + Value::only_token(policy, name.clone(), 100),
            ),
        ],
    )
    .unwrap();

    let tx = &finalized.tx;
    let mint = tx.transaction_body.mint.as_ref().unwrap();
    assert_eq!(mint.iter().collect::<Vec<_>>(), vec![(&policy, &name, 100)]);

    let scripts = tx.transaction_witness_set.native_script.as_ref().unwrap();
    assert_eq!(scripts.to_vec(), vec![script]);

    assert!(tx.transaction_witness_set.redeemer.is_none());
    assert!(tx.transaction_body.script_data_hash.is_none());
    assert!(tx.transaction_body.collateral.is_none());

    // the change keeps none of the minted tokens
    assert!(tx.transaction_body.outputs[1].value.is_lovelace_only());

    let (consumed, produced) = balance(&finalized, &utxos, 0, 0);
    assert_eq!(consumed, produced);
}

#[test]
fn burn_keeps_the_rest_as_change() {
    let wallet = Key(1);
    let (script, policy) = policy(&Key(5));
    let name = AssetName::from(b"TOKEN".to_vec());
    let token = AssetClass::Token(policy, name.clone());

    let utxos = utxo_set([
        utxo(1, 0, &wallet.address(), ada(10_000_000)),
        utxo(
            1,
            1,
            &wallet.address(),
            ada(2_000_000) + Value::only_token(policy, name.clone(), 100),
        ),
    ]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::MintBurn {
                policy,
                assets: vec![(name.clone(), -40)],
                witness: ScriptWitness::Native(script),
            },
        ],
    )
    .unwrap();

    let body = &finalized.tx.transaction_body;
    assert!(body.inputs.contains(&input(1, 1)));

    let change = body.outputs.last().unwrap();
    assert_eq!(change.value.quantity_of(&token), BigInt::from(60));

    let (consumed, produced) = balance(&finalized, &utxos, 0, 0);
    assert_eq!(consumed, produced);
}

#[test]
fn mint_of_zero_is_rejected() {
    let wallet = Key(1);
    let (script, policy) = policy(&Key(5));

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let err = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::MintBurn {
                policy,
                assets: vec![(AssetName::from(b"TOKEN".to_vec()), 0)],
                witness: ScriptWitness::Native(script),
            },
        ],
    )
    .unwrap_err();

    assert!(matches!(err, FinalizationError::InvalidMint(_)));
}

#[test]
fn mint_totals_beyond_i64_are_rejected() {
    let wallet = Key(1);
    let (script, policy) = policy(&Key(5));
    let name = AssetName::from(b"TOKEN".to_vec());

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let mint = || TxIntent::MintBurn {
        policy,
        assets: vec![(name.clone(), i64::MAX)],
        witness: ScriptWitness::Native(script.clone()),
    };

    let err = finalize(
        &Config::default(),
        &utxos,
        &[TxIntent::spend_from_address(wallet.address()), mint(), mint()],
    )
    .unwrap_err();

    assert!(matches!(err, FinalizationError::InvalidMint(_)));
}

#[test]
fn mint_witness_must_match_the_policy() {
    let wallet = Key(1);
    let (_, policy) = policy(&Key(5));
    let other_script = NativeScript::ScriptPubkey(Key(6).hash());

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let err = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::MintBurn {
                policy,
                assets: vec![(AssetName::from(b"TOKEN".to_vec()), 1)],
                witness: ScriptWitness::Native(other_script),
            },
        ],
    )
    .unwrap_err();

    assert!(matches!(err, FinalizationError::ScriptMismatch { expected, .. } if expected == policy));
}

fn reward_account(key: &Key) -> StakeAddress {
    StakeAddress::new(Network::Testnet, StakePayload::Stake(key.hash()))
}

#[test]
fn stake_registration_pays_the_deposit() {
    let wallet = Key(1);
    let stake = Key(7);
    let pool = Hash::new([9; 28]);

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);
    let config = Config::default();

    let finalized = finalize(
        &config,
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::RegisterStake {
                credential: StakeCredential::AddrKeyhash(stake.hash()),
            },
            TxIntent::DelegateStake {
                credential: StakeCredential::AddrKeyhash(stake.hash()),
                pool,
                witness: None,
            },
        ],
    )
    .unwrap();

    let body = &finalized.tx.transaction_body;

    assert_eq!(
        body.certificates.as_ref().unwrap().to_vec(),
        vec![
            Certificate::StakeRegistration(StakeCredential::AddrKeyhash(stake.hash())),
            Certificate::StakeDelegation(StakeCredential::AddrKeyhash(stake.hash()), pool),
        ]
    );

    assert!(finalized.required_signers.contains(&stake.hash()));

    let deposit = config.protocol.stake_key_deposit;
    assert_eq!(body.outputs[0].value, ada(10_000_000 - deposit - finalized.fee));

    let (consumed, produced) = balance(&finalized, &utxos, deposit, 0);
    assert_eq!(consumed, produced);
}

#[test]
fn deregistration_and_withdrawal_flow_back_as_change() {
    let wallet = Key(1);
    let stake = Key(7);

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(3_000_000))]);
    let config = Config::default();
    let deposit = config.protocol.stake_key_deposit;

    let finalized = finalize(
        &config,
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::Withdraw {
                reward_account: reward_account(&stake),
                amount: 1_500_000,
                witness: None,
            },
            TxIntent::DeregisterStake {
                credential: StakeCredential::AddrKeyhash(stake.hash()),
                witness: None,
            },
        ],
    )
    .unwrap();

    let body = &finalized.tx.transaction_body;

    let withdrawals = body.withdrawals.as_ref().unwrap();
    assert_eq!(withdrawals.get(&reward_account(&stake)), Some(&1_500_000));

    assert_eq!(
        body.outputs[0].value,
        ada(3_000_000 + 1_500_000 + deposit - finalized.fee)
    );

    assert!(finalized.required_signers.contains(&stake.hash()));

    let (consumed, produced) = balance(&finalized, &utxos, 0, 1_500_000 + deposit);
    assert_eq!(consumed, produced);
}

#[test]
fn script_stake_credentials_need_a_witness() {
    let wallet = Key(1);
    let script_hash = Hash::new([8; 28]);

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(3_000_000))]);

    let err = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::DeregisterStake {
                credential: StakeCredential::ScriptHash(script_hash),
                witness: None,
            },
        ],
    )
    .unwrap_err();

    assert!(matches!(err, FinalizationError::MissingScriptWitness(x) if x == script_hash));
}

#[test]
fn metadata_and_validity_end_up_in_the_body() {
    let wallet = Key(1);
    let auditor = Key(8);

    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::Metadata {
                label: 674,
                metadatum: Metadatum::Text("invoice 42".into()),
            },
            TxIntent::ValidityInterval {
                valid_from: Some(100),
                valid_until: Some(5_000),
            },
            TxIntent::ValidityInterval {
                valid_from: None,
                valid_until: Some(2_000),
            },
            TxIntent::RequireSigner(auditor.hash()),
        ],
    )
    .unwrap();

    let tx = &finalized.tx;
    let body = &tx.transaction_body;

    let aux: &AuxiliaryData = tx.auxiliary_data.as_ref().unwrap();
    assert_eq!(body.auxiliary_data_hash, Some(aux.hash().unwrap()));

    assert_eq!(body.validity_interval_start, Some(100));
    assert_eq!(body.ttl, Some(2_000));

    assert_eq!(
        body.required_signers.as_ref().unwrap().to_vec(),
        vec![auditor.hash()]
    );
    assert!(finalized.required_signers.contains(&auditor.hash()));
    assert!(finalized.required_signers.contains(&wallet.hash()));
}

#[test]
fn repeated_metadata_labels_are_rejected() {
    let wallet = Key(1);
    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let note = |text: &str| TxIntent::Metadata {
        label: 674,
        metadatum: Metadatum::Text(text.into()),
    };

    let err = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            note("first"),
            note("second"),
        ],
    )
    .unwrap_err();

    assert!(matches!(err, FinalizationError::DuplicateMetadataLabel(674)));
}

#[test]
fn validity_interval_must_contain_a_slot() {
    let wallet = Key(1);
    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let err = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::ValidityInterval {
                valid_from: Some(3_000),
                valid_until: None,
            },
            TxIntent::ValidityInterval {
                valid_from: None,
                valid_until: Some(3_000),
            },
        ],
    )
    .unwrap_err();

    assert!(matches!(
        err,
        FinalizationError::EmptyValidityInterval {
            valid_from: 3_000,
            valid_until: 3_000
        }
    ));
}

#[test]
fn existing_signatures_are_kept() {
    let wallet = Key(1);
    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let finalized = Finalizer::new(&Config::default(), &NoScripts)
        .finalize(
            &utxos,
            &[wallet.witness()],
            &[
                TxIntent::spend_from_address(wallet.address()),
                TxIntent::send_lovelace(Key(2).address(), 2_000_000),
            ],
        )
        .unwrap();

    let witnesses = finalized
        .tx
        .transaction_witness_set
        .vkeywitness
        .as_ref()
        .unwrap()
        .to_vec();

    assert_eq!(witnesses, vec![wallet.witness()]);
}

#[test]
fn signing_requires_every_signer_unless_partial() {
    let wallet = Key(1);
    let utxos = utxo_set([utxo(1, 0, &wallet.address(), ada(10_000_000))]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::RequireSigner(Key(8).hash()),
        ],
    )
    .unwrap();

    let signer = KeySigner(vec![Key(1)]);

    let err = finalized.clone().sign(&signer, false).unwrap_err();
    assert!(matches!(err, SigningError::MissingSignatures(x) if x == vec![Key(8).hash()]));

    let partial = finalized.clone().sign(&signer, true).unwrap();
    assert_eq!(
        partial.transaction_witness_set.vkeywitness.unwrap().len(),
        1
    );

    let full = finalized
        .sign(&KeySigner(vec![Key(1), Key(8)]), false)
        .unwrap();
    assert_eq!(full.transaction_witness_set.vkeywitness.unwrap().len(), 2);
}

#[test]
fn finalized_transaction_updates_the_local_state() {
    let wallet = Key(1);

    let utxos = utxo_set([
        utxo(1, 0, &wallet.address(), ada(10_000_000)),
        utxo(1, 1, &wallet.address(), ada(3_000_000)),
    ]);

    let finalized = finalize(
        &Config::default(),
        &utxos,
        &[
            TxIntent::spend_from_address(wallet.address()),
            TxIntent::send_lovelace(Key(2).address(), 2_000_000),
        ],
    )
    .unwrap();

    let id = finalized.id().unwrap();

    let cbor = finalized.to_cbor().unwrap();
    let received: MintedTx = minicbor::decode(&cbor).unwrap();
    assert_eq!(received.id(), id);

    let update = apply_transaction(id, &finalized.tx, &utxos);

    assert_eq!(update.spent, vec![(input(1, 0), utxos[&input(1, 0)].clone())]);
    assert_eq!(update.created.len(), 2);
    assert_eq!(update.state.len(), 3);

    let (change_ref, change) = &update.created[1];
    assert_eq!(change.address, wallet.address());
    assert_eq!(&update.state[change_ref], change);
    assert_eq!(change, &finalized.tx.transaction_body.outputs[1]);
    assert!(update.state.contains_key(&input(1, 1)));
}

mod properties {
    use proptest::prelude::*;
    use tessera_primitives::TransactionOutput;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn finalized_transactions_balance(
            wallet_funds in prop::collection::vec(1_000_000u64..30_000_000, 1..6),
            held in 0u64..500,
            burn_pct in 0u64..=100,
            minted in 0i64..1_000,
            sends in prop::collection::vec((2u8..5, 1_000_000u64..15_000_000), 0..4),
            withdrawal in prop::option::of(1u64..5_000_000),
            register in any::<bool>(),
        ) {
            let wallet = Key(1);
            let stake = Key(7);
            let (script, policy) = policy(&Key(5));
            let config = Config::default();

            let mut utxos = utxo_set(
                wallet_funds
                    .iter()
                    .enumerate()
                    .map(|(i, lovelace)| utxo(1, i as u64, &wallet.address(), ada(*lovelace))),
            );

            if held > 0 {
                let tokens = Value::only_token(policy, AssetName::from(b"HELD".to_vec()), held);
                utxos.insert(
                    input(2, 0),
                    TransactionOutput::new(wallet.address(), ada(2_000_000) + tokens),
                );
            }

            let mut intents = vec![TxIntent::spend_from_address(wallet.address())];

            intents.extend(
                sends
                    .iter()
                    .map(|(key, lovelace)| TxIntent::send_lovelace(Key(*key).address(), *lovelace)),
            );

            let burned = (held * burn_pct / 100) as i64;
            let mut assets = vec![];

            if minted > 0 {
                assets.push((AssetName::from(b"MINT".to_vec()), minted));
            }

            if burned > 0 {
                assets.push((AssetName::from(b"HELD".to_vec()), -burned));
            }

            if !assets.is_empty() {
                intents.push(TxIntent::MintBurn {
                    policy,
                    assets,
                    witness: ScriptWitness::Native(script),
                });
            }

            let mut deposits = 0;
            let mut inflows = 0;

            if register {
                intents.push(TxIntent::RegisterStake {
                    credential: StakeCredential::AddrKeyhash(stake.hash()),
                });
                deposits = config.protocol.stake_key_deposit;
            }

            if let Some(amount) = withdrawal {
                intents.push(TxIntent::Withdraw {
                    reward_account: reward_account(&stake),
                    amount,
                    witness: None,
                });
                inflows = amount;
            }

            if let Ok(finalized) = finalize(&config, &utxos, &intents) {
                let (consumed, produced) = balance(&finalized, &utxos, deposits, inflows);
                prop_assert_eq!(consumed, produced);
                prop_assert!(!finalized.tx.transaction_body.inputs.is_empty());
                prop_assert!(finalized.fee >= config.protocol.min_fee_constant);
            }
        }
    }
}
