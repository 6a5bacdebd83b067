use proptest::{prelude::*, strategy::Just};
use tessera_addresses::{
    Network, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart, StakeAddress, StakePayload,
};

use crate::{
    Address, AssetClass, AssetName, BigInt, BoundedBytes, Constr, DatumOption, Hash,
    KeyValuePairs, MaybeIndefArray, NativeScript, PlutusData, PlutusScript, Script,
    TransactionOutput, Value,
};

pub(crate) fn any_hash28() -> impl Strategy<Value = Hash<28>> {
    any::<[u8; 28]>().prop_map(Hash::new)
}

pub(crate) fn any_hash32() -> impl Strategy<Value = Hash<32>> {
    any::<[u8; 32]>().prop_map(Hash::new)
}

prop_compose! {
    pub(crate) fn any_bounded_bytes()(
        bytes in any::<Vec<u8>>(),
    ) -> BoundedBytes {
        BoundedBytes::from(bytes)
    }
}

pub(crate) fn any_bigint() -> impl Strategy<Value = BigInt> {
    prop_oneof![
        any::<i64>().prop_map(|i| BigInt::Int(i.into())),
        any_bounded_bytes().prop_map(BigInt::BigUInt),
        any_bounded_bytes().prop_map(BigInt::BigNInt),
    ]
}

fn any_constr(depth: u8) -> impl Strategy<Value = Constr<PlutusData>> {
    let any_constr_tag = prop_oneof![
        (Just(102), any::<u64>().prop_map(Some)),
        (121_u64..=127, Just(None)),
        (1280_u64..=1400, Just(None))
    ];

    let any_fields = prop::collection::vec(any_plutus_data(depth - 1), 0..depth as usize);

    (any_constr_tag, any_fields, any::<bool>()).prop_map(
        |((tag, any_constructor), fields, is_def)| Constr {
            tag,
            any_constructor,
            fields: if is_def {
                MaybeIndefArray::Def(fields)
            } else {
                MaybeIndefArray::Indef(fields)
            },
        },
    )
}

pub(crate) fn any_plutus_data(depth: u8) -> BoxedStrategy<PlutusData> {
    let int = any_bigint().prop_map(PlutusData::BigInt);

    let bytes = any_bounded_bytes().prop_map(PlutusData::BoundedBytes);

    if depth > 0 {
        let constr = any_constr(depth).prop_map(PlutusData::Constr);

        let array = (
            any::<bool>(),
            prop::collection::vec(any_plutus_data(depth - 1), 0..depth as usize),
        )
            .prop_map(|(is_def, xs)| {
                PlutusData::Array(if is_def {
                    MaybeIndefArray::Def(xs)
                } else {
                    MaybeIndefArray::Indef(xs)
                })
            });

        let map = (
            any::<bool>(),
            prop::collection::vec(
                (any_plutus_data(depth - 1), any_plutus_data(depth - 1)),
                0..depth as usize,
            ),
        )
            .prop_map(|(is_def, kvs)| {
                PlutusData::Map(if is_def {
                    KeyValuePairs::Def(kvs)
                } else {
                    KeyValuePairs::Indef(kvs)
                })
            });

        prop_oneof![int, bytes, constr, array, map].boxed()
    } else {
        prop_oneof![int, bytes].boxed()
    }
}

pub(crate) fn any_asset_name() -> impl Strategy<Value = AssetName> {
    prop::collection::vec(any::<u8>(), 0..=32).prop_map(AssetName::new)
}

/// Non-negative values, as found in outputs
pub(crate) fn any_value() -> impl Strategy<Value = Value> {
    let token = (
        prop::sample::select(vec![[1u8; 28], [2; 28], [3; 28]]),
        any_asset_name(),
        1..=u64::from(u32::MAX),
    );

    (any::<u64>(), prop::collection::vec(token, 0..4)).prop_map(|(coin, tokens)| {
        Value::from_entries(
            std::iter::once((AssetClass::Lovelace, coin.into())).chain(
                tokens.into_iter().map(|(policy, name, quantity)| {
                    (
                        AssetClass::Token(Hash::new(policy), name),
                        quantity.into(),
                    )
                }),
            ),
        )
    })
}

pub(crate) fn any_native_script() -> impl Strategy<Value = NativeScript> {
    let leaf = prop_oneof![
        any_hash28().prop_map(NativeScript::ScriptPubkey),
        any::<u64>().prop_map(NativeScript::InvalidBefore),
        any::<u64>().prop_map(NativeScript::InvalidHereafter),
    ];

    leaf.prop_recursive(3, 12, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(NativeScript::ScriptAll),
            prop::collection::vec(inner.clone(), 0..4).prop_map(NativeScript::ScriptAny),
            (any::<u32>(), prop::collection::vec(inner, 0..4))
                .prop_map(|(n, xs)| NativeScript::ScriptNOfK(n, xs)),
        ]
    })
}

pub(crate) fn any_script() -> impl Strategy<Value = Script> {
    let program = || prop::collection::vec(any::<u8>(), 1..64);

    prop_oneof![
        any_native_script().prop_map(Script::Native),
        program().prop_map(|x| Script::PlutusV1(PlutusScript::new(x))),
        program().prop_map(|x| Script::PlutusV2(PlutusScript::new(x))),
        program().prop_map(|x| Script::PlutusV3(PlutusScript::new(x))),
    ]
}

pub(crate) fn any_address() -> impl Strategy<Value = Address> {
    let network = prop_oneof![Just(Network::Testnet), Just(Network::Mainnet)];

    let payment = prop_oneof![
        any_hash28().prop_map(ShelleyPaymentPart::PaymentKey),
        any_hash28().prop_map(ShelleyPaymentPart::Script),
    ];

    let delegation = prop_oneof![
        any_hash28().prop_map(ShelleyDelegationPart::StakeKey),
        any_hash28().prop_map(ShelleyDelegationPart::Script),
        Just(ShelleyDelegationPart::Null),
    ];

    let shelley = (network.clone(), payment, delegation)
        .prop_map(|(n, p, d)| Address::Shelley(ShelleyAddress::new(n, p, d)));

    let stake = (network, any_hash28())
        .prop_map(|(n, h)| Address::Stake(StakeAddress::new(n, StakePayload::Stake(h))));

    prop_oneof![4 => shelley, 1 => stake]
}

pub(crate) fn any_datum() -> impl Strategy<Value = DatumOption> {
    prop_oneof![
        any_hash32().prop_map(DatumOption::Hash),
        any_plutus_data(2).prop_map(DatumOption::Data),
    ]
}

pub(crate) fn any_output() -> impl Strategy<Value = TransactionOutput> {
    (
        any_address(),
        any_value(),
        prop::option::of(any_datum()),
        prop::option::of(any_script()),
    )
        .prop_map(|(address, value, datum, script_ref)| TransactionOutput {
            address,
            value,
            datum,
            script_ref,
        })
}
