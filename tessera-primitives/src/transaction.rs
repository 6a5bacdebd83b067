use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_codec::{
    minicbor::{self, data::Type, Decode, Encode},
    record::{present, write_field, MapRecord},
    record_fields,
    utils::{Bytes, KeepRaw, Set},
};
use tessera_crypto::hash::{Hash, Hasher};

use crate::{
    end_array, expect_len, AddrKeyhash, AuxiliaryData, Certificate, Coin, EncodeError, ExUnits,
    Mint, NativeScript, NetworkId, PlutusData, PlutusV1Script, PlutusV2Script,
    PlutusV3Script, RewardAccount, Signature, TransactionId, TransactionInput, TransactionOutput,
    VKey,
};

pub type Withdrawals = BTreeMap<RewardAccount, Coin>;

pub type RequiredSigners = Set<AddrKeyhash>;

record_fields! {
    /// Keys of the transaction body map
    pub enum BodyField in "transaction body" {
        Inputs = 0 => "inputs",
        Outputs = 1 => "outputs",
        Fee = 2 => "fee",
        Ttl = 3 => "ttl",
        Certificates = 4 => "certificates",
        Withdrawals = 5 => "withdrawals",
        AuxiliaryDataHash = 7 => "auxiliary_data_hash",
        ValidityIntervalStart = 8 => "validity_interval_start",
        Mint = 9 => "mint",
        ScriptDataHash = 11 => "script_data_hash",
        Collateral = 13 => "collateral",
        RequiredSigners = 14 => "required_signers",
        NetworkId = 15 => "network_id",
        CollateralReturn = 16 => "collateral_return",
        TotalCollateral = 17 => "total_collateral",
        ReferenceInputs = 18 => "reference_inputs",
    }
    unsupported {
        6 => "update",
        19 => "voting_procedures",
        20 => "proposal_procedures",
        21 => "current_treasury_value",
        22 => "donation",
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBody {
    pub inputs: Set<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub fee: Coin,
    pub ttl: Option<u64>,
    pub certificates: Option<Set<Certificate>>,
    pub withdrawals: Option<Withdrawals>,
    pub auxiliary_data_hash: Option<Hash<32>>,
    pub validity_interval_start: Option<u64>,
    pub mint: Option<Mint>,
    pub script_data_hash: Option<Hash<32>>,
    pub collateral: Option<Set<TransactionInput>>,
    pub required_signers: Option<RequiredSigners>,
    pub network_id: Option<NetworkId>,
    pub collateral_return: Option<TransactionOutput>,
    pub total_collateral: Option<Coin>,
    pub reference_inputs: Option<Set<TransactionInput>>,
}

impl Default for TransactionBody {
    fn default() -> Self {
        Self {
            inputs: Set::from(vec![]),
            outputs: vec![],
            fee: 0,
            ttl: None,
            certificates: None,
            withdrawals: None,
            auxiliary_data_hash: None,
            validity_interval_start: None,
            mint: None,
            script_data_hash: None,
            collateral: None,
            required_signers: None,
            network_id: None,
            collateral_return: None,
            total_collateral: None,
            reference_inputs: None,
        }
    }
}

impl<C> minicbor::Encode<C> for TransactionBody {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(present(&[
            true,
            true,
            true,
            self.ttl.is_some(),
            self.certificates.is_some(),
            self.withdrawals.is_some(),
            self.auxiliary_data_hash.is_some(),
            self.validity_interval_start.is_some(),
            self.mint.is_some(),
            self.script_data_hash.is_some(),
            self.collateral.is_some(),
            self.required_signers.is_some(),
            self.network_id.is_some(),
            self.collateral_return.is_some(),
            self.total_collateral.is_some(),
            self.reference_inputs.is_some(),
        ]))?;

        write_field(e, BodyField::Inputs, Some(&self.inputs), ctx)?;
        write_field(e, BodyField::Outputs, Some(&self.outputs), ctx)?;
        write_field(e, BodyField::Fee, Some(&self.fee), ctx)?;
        write_field(e, BodyField::Ttl, self.ttl.as_ref(), ctx)?;
        write_field(e, BodyField::Certificates, self.certificates.as_ref(), ctx)?;
        write_field(e, BodyField::Withdrawals, self.withdrawals.as_ref(), ctx)?;
        write_field(e, BodyField::AuxiliaryDataHash, self.auxiliary_data_hash.as_ref(), ctx)?;
        write_field(
            e,
            BodyField::ValidityIntervalStart,
            self.validity_interval_start.as_ref(),
            ctx,
        )?;
        write_field(e, BodyField::Mint, self.mint.as_ref(), ctx)?;
        write_field(e, BodyField::ScriptDataHash, self.script_data_hash.as_ref(), ctx)?;
        write_field(e, BodyField::Collateral, self.collateral.as_ref(), ctx)?;
        write_field(e, BodyField::RequiredSigners, self.required_signers.as_ref(), ctx)?;
        write_field(e, BodyField::NetworkId, self.network_id.as_ref(), ctx)?;
        write_field(e, BodyField::CollateralReturn, self.collateral_return.as_ref(), ctx)?;
        write_field(e, BodyField::TotalCollateral, self.total_collateral.as_ref(), ctx)?;
        write_field(e, BodyField::ReferenceInputs, self.reference_inputs.as_ref(), ctx)?;

        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TransactionBody {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let mut record = MapRecord::<BodyField>::begin(d)?;

        let mut inputs = None;
        let mut outputs = None;
        let mut fee = None;
        let mut body = TransactionBody::default();

        while let Some(field) = record.next_field(d)? {
            match field {
                BodyField::Inputs => inputs = Some(d.decode_with(ctx)?),
                BodyField::Outputs => outputs = Some(d.decode_with(ctx)?),
                BodyField::Fee => fee = Some(d.decode_with(ctx)?),
                BodyField::Ttl => body.ttl = Some(d.decode_with(ctx)?),
                BodyField::Certificates => body.certificates = Some(d.decode_with(ctx)?),
                BodyField::Withdrawals => {
                    let withdrawals: Withdrawals = d.decode_with(ctx)?;
                    if withdrawals.is_empty() {
                        return Err(minicbor::decode::Error::message(
                            "withdrawals must be non-empty if present",
                        ));
                    }
                    body.withdrawals = Some(withdrawals);
                }
                BodyField::AuxiliaryDataHash => {
                    body.auxiliary_data_hash = Some(d.decode_with(ctx)?)
                }
                BodyField::ValidityIntervalStart => {
                    body.validity_interval_start = Some(d.decode_with(ctx)?)
                }
                BodyField::Mint => {
                    let mint: Mint = d.decode_with(ctx)?;
                    if mint.is_empty() {
                        return Err(minicbor::decode::Error::message(
                            "mint must be non-empty if present",
                        ));
                    }
                    body.mint = Some(mint);
                }
                BodyField::ScriptDataHash => body.script_data_hash = Some(d.decode_with(ctx)?),
                BodyField::Collateral => body.collateral = Some(d.decode_with(ctx)?),
                BodyField::RequiredSigners => body.required_signers = Some(d.decode_with(ctx)?),
                BodyField::NetworkId => body.network_id = Some(d.decode_with(ctx)?),
                BodyField::CollateralReturn => {
                    body.collateral_return = Some(d.decode_with(ctx)?)
                }
                BodyField::TotalCollateral => body.total_collateral = Some(d.decode_with(ctx)?),
                BodyField::ReferenceInputs => body.reference_inputs = Some(d.decode_with(ctx)?),
            }
        }

        body.inputs = MapRecord::required(BodyField::Inputs, inputs)?;
        body.outputs = MapRecord::required(BodyField::Outputs, outputs)?;
        body.fee = MapRecord::required(BodyField::Fee, fee)?;

        Ok(body)
    }
}

impl TransactionBody {
    /// Identifier of the transaction carrying this body
    pub fn id(&self) -> Result<TransactionId, EncodeError> {
        Hasher::<256>::hash_cbor(self)
    }
}

#[derive(
    Serialize, Deserialize, Encode, Decode, Debug, PartialEq, Eq, PartialOrd, Ord, Clone,
)]
pub struct VKeyWitness {
    #[n(0)]
    pub vkey: VKey,

    #[n(1)]
    pub signature: Signature,
}

#[derive(
    Serialize, Deserialize, Encode, Decode, Debug, PartialEq, Eq, PartialOrd, Ord, Clone,
)]
pub struct BootstrapWitness {
    #[n(0)]
    pub public_key: Bytes,

    #[n(1)]
    pub signature: Bytes,

    #[n(2)]
    pub chain_code: Bytes,

    #[n(3)]
    pub attributes: Bytes,
}

/// Kind of action a redeemer unlocks
///
/// Conway adds voting (4) and proposing (5) purposes. Those aren't
/// supported and fail to decode.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub enum RedeemerTag {
    Spend,
    Mint,
    Cert,
    Reward,
}

impl RedeemerTag {
    pub fn index(self) -> u8 {
        match self {
            RedeemerTag::Spend => 0,
            RedeemerTag::Mint => 1,
            RedeemerTag::Cert => 2,
            RedeemerTag::Reward => 3,
        }
    }
}

impl<'b, C> minicbor::Decode<'b, C> for RedeemerTag {
    fn decode(d: &mut minicbor::Decoder<'b>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        match d.u8()? {
            0 => Ok(RedeemerTag::Spend),
            1 => Ok(RedeemerTag::Mint),
            2 => Ok(RedeemerTag::Cert),
            3 => Ok(RedeemerTag::Reward),
            4 => Err(minicbor::decode::Error::message(
                "redeemer tag 4 (vote) is not supported",
            )),
            5 => Err(minicbor::decode::Error::message(
                "redeemer tag 5 (propose) is not supported",
            )),
            x => Err(minicbor::decode::Error::message(format!(
                "unknown redeemer tag {x}"
            ))),
        }
    }
}

impl<C> minicbor::Encode<C> for RedeemerTag {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u8(self.index())?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Encode, Decode, Debug, PartialEq, Eq, Clone)]
pub struct Redeemer {
    #[n(0)]
    pub tag: RedeemerTag,

    #[n(1)]
    pub index: u32,

    #[n(2)]
    pub data: PlutusData,

    #[n(3)]
    pub ex_units: ExUnits,
}

/// Redeemers of a transaction
///
/// The ledger accepts either a list of redeemers or a map keyed by
/// `[tag, index]`; both decode into the same list, which is always encoded
/// back as a list.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct Redeemers(pub Vec<Redeemer>);

impl std::ops::Deref for Redeemers {
    type Target = Vec<Redeemer>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Redeemer>> for Redeemers {
    fn from(value: Vec<Redeemer>) -> Self {
        Redeemers(value)
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Redeemers {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        match d.datatype()? {
            Type::Array | Type::ArrayIndef => Ok(Redeemers(d.decode_with(ctx)?)),
            Type::Map | Type::MapIndef => {
                let mut out = vec![];

                for entry in d.map_iter_with::<C, RedeemersKey, RedeemersValue>(ctx)? {
                    let (key, value) = entry?;
                    out.push(Redeemer {
                        tag: key.tag,
                        index: key.index,
                        data: value.data,
                        ex_units: value.ex_units,
                    });
                }

                Ok(Redeemers(out))
            }
            other => Err(minicbor::decode::Error::message(format!(
                "unexpected cbor data type {other} for redeemers"
            ))),
        }
    }
}

impl<C> minicbor::Encode<C> for Redeemers {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.encode_with(&self.0, ctx)?;
        Ok(())
    }
}

#[derive(Encode, Decode)]
struct RedeemersKey {
    #[n(0)]
    tag: RedeemerTag,
    #[n(1)]
    index: u32,
}

#[derive(Encode, Decode)]
struct RedeemersValue {
    #[n(0)]
    data: PlutusData,
    #[n(1)]
    ex_units: ExUnits,
}

record_fields! {
    /// Keys of the witness set map
    pub enum WitnessField in "witness set" {
        VKeyWitness = 0 => "vkeywitness",
        NativeScript = 1 => "native_script",
        BootstrapWitness = 2 => "bootstrap_witness",
        PlutusV1Script = 3 => "plutus_v1_script",
        PlutusData = 4 => "plutus_data",
        Redeemer = 5 => "redeemer",
        PlutusV2Script = 6 => "plutus_v2_script",
        PlutusV3Script = 7 => "plutus_v3_script",
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct WitnessSet {
    pub vkeywitness: Option<Set<VKeyWitness>>,
    pub native_script: Option<Set<NativeScript>>,
    pub bootstrap_witness: Option<Set<BootstrapWitness>>,
    pub plutus_v1_script: Option<Set<PlutusV1Script>>,
    pub plutus_data: Option<Set<PlutusData>>,
    pub redeemer: Option<Redeemers>,
    pub plutus_v2_script: Option<Set<PlutusV2Script>>,
    pub plutus_v3_script: Option<Set<PlutusV3Script>>,
}

impl WitnessSet {
    /// Adds signatures, replacing any previous witness of the same key
    pub fn merge_vkey_witnesses(&mut self, witnesses: impl IntoIterator<Item = VKeyWitness>) {
        let mut by_key: BTreeMap<VKey, VKeyWitness> = self
            .vkeywitness
            .take()
            .map(|x| x.to_vec())
            .unwrap_or_default()
            .into_iter()
            .map(|w| (w.vkey.clone(), w))
            .collect();

        for witness in witnesses {
            by_key.insert(witness.vkey.clone(), witness);
        }

        if !by_key.is_empty() {
            self.vkeywitness = Some(Set::from(by_key.into_values().collect::<Vec<_>>()));
        }
    }
}

impl<C> minicbor::Encode<C> for WitnessSet {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(present(&[
            self.vkeywitness.is_some(),
            self.native_script.is_some(),
            self.bootstrap_witness.is_some(),
            self.plutus_v1_script.is_some(),
            self.plutus_data.is_some(),
            self.redeemer.is_some(),
            self.plutus_v2_script.is_some(),
            self.plutus_v3_script.is_some(),
        ]))?;

        write_field(e, WitnessField::VKeyWitness, self.vkeywitness.as_ref(), ctx)?;
        write_field(e, WitnessField::NativeScript, self.native_script.as_ref(), ctx)?;
        write_field(e, WitnessField::BootstrapWitness, self.bootstrap_witness.as_ref(), ctx)?;
        write_field(e, WitnessField::PlutusV1Script, self.plutus_v1_script.as_ref(), ctx)?;
        write_field(e, WitnessField::PlutusData, self.plutus_data.as_ref(), ctx)?;
        write_field(e, WitnessField::Redeemer, self.redeemer.as_ref(), ctx)?;
        write_field(e, WitnessField::PlutusV2Script, self.plutus_v2_script.as_ref(), ctx)?;
        write_field(e, WitnessField::PlutusV3Script, self.plutus_v3_script.as_ref(), ctx)?;

        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for WitnessSet {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let mut record = MapRecord::<WitnessField>::begin(d)?;
        let mut out = WitnessSet::default();

        while let Some(field) = record.next_field(d)? {
            match field {
                WitnessField::VKeyWitness => out.vkeywitness = Some(d.decode_with(ctx)?),
                WitnessField::NativeScript => out.native_script = Some(d.decode_with(ctx)?),
                WitnessField::BootstrapWitness => {
                    out.bootstrap_witness = Some(d.decode_with(ctx)?)
                }
                WitnessField::PlutusV1Script => out.plutus_v1_script = Some(d.decode_with(ctx)?),
                WitnessField::PlutusData => out.plutus_data = Some(d.decode_with(ctx)?),
                WitnessField::Redeemer => out.redeemer = Some(d.decode_with(ctx)?),
                WitnessField::PlutusV2Script => out.plutus_v2_script = Some(d.decode_with(ctx)?),
                WitnessField::PlutusV3Script => out.plutus_v3_script = Some(d.decode_with(ctx)?),
            }
        }

        Ok(out)
    }
}

/// A complete transaction: `[body, witness set, is valid, auxiliary data / null]`
#[derive(Debug, PartialEq, Clone)]
pub struct Tx {
    pub transaction_body: TransactionBody,
    pub transaction_witness_set: WitnessSet,
    pub success: bool,
    pub auxiliary_data: Option<AuxiliaryData>,
}

impl Tx {
    /// Id of the body as this crate encodes it, see [`MintedTx::id`] for
    /// transactions decoded from bytes
    pub fn id(&self) -> Result<TransactionId, EncodeError> {
        self.transaction_body.id()
    }
}

impl<C> minicbor::Encode<C> for Tx {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(4)?;
        e.encode_with(&self.transaction_body, ctx)?;
        e.encode_with(&self.transaction_witness_set, ctx)?;
        e.bool(self.success)?;

        match &self.auxiliary_data {
            Some(x) => e.encode_with(x, ctx)?,
            None => e.null()?,
        };

        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Tx {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        MintedTx::decode(d, ctx).map(Tx::from)
    }
}

/// A transaction decoded from bytes, keeping the original encoding of its
/// hashed parts
///
/// The id of a received transaction is the hash of its body bytes as sent,
/// which a re-encoded [`Tx`] may not reproduce.
#[derive(Debug, PartialEq, Clone)]
pub struct MintedTx<'b> {
    pub transaction_body: KeepRaw<'b, TransactionBody>,
    pub transaction_witness_set: WitnessSet,
    pub success: bool,
    pub auxiliary_data: Option<KeepRaw<'b, AuxiliaryData>>,
}

impl MintedTx<'_> {
    pub fn id(&self) -> TransactionId {
        Hasher::<256>::hash(self.transaction_body.raw_cbor())
    }

    pub fn auxiliary_data_hash(&self) -> Option<Hash<32>> {
        self.auxiliary_data
            .as_ref()
            .map(|x| Hasher::<256>::hash(x.raw_cbor()))
    }
}

impl From<MintedTx<'_>> for Tx {
    fn from(value: MintedTx<'_>) -> Self {
        Tx {
            transaction_body: value.transaction_body.unwrap(),
            transaction_witness_set: value.transaction_witness_set,
            success: value.success,
            auxiliary_data: value.auxiliary_data.map(KeepRaw::unwrap),
        }
    }
}

impl<C> minicbor::Encode<C> for MintedTx<'_> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(4)?;
        e.encode_with(&self.transaction_body, ctx)?;
        e.encode_with(&self.transaction_witness_set, ctx)?;
        e.bool(self.success)?;

        match &self.auxiliary_data {
            Some(x) => e.encode_with(x, ctx)?,
            None => e.null()?,
        };

        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for MintedTx<'b> {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;
        expect_len(len, 4, "transaction")?;

        let transaction_body = d.decode_with(ctx)?;
        let transaction_witness_set = d.decode_with(ctx)?;
        let success = d.bool()?;

        let auxiliary_data = if d.datatype()? == Type::Null {
            d.skip()?;
            None
        } else {
            Some(d.decode_with(ctx)?)
        };

        end_array(d, len)?;

        Ok(MintedTx {
            transaction_body,
            transaction_witness_set,
            success,
            auxiliary_data,
        })
    }
}
