use std::collections::BTreeMap;

use tessera_codec::{
    minicbor::{self, data::Type},
    record::{present, write_key, MapRecord},
    record_fields,
    utils::CborWrap,
};

use crate::{end_array, Address, DatumOption, EncodeError, Script, TransactionInput, Value};

record_fields! {
    /// Keys of the post-Alonzo output map
    pub enum OutputField in "transaction output" {
        Address = 0 => "address",
        Value = 1 => "value",
        Datum = 2 => "datum_option",
        ScriptRef = 3 => "script_ref",
    }
}

/// An output of a transaction, the value side of a UTxO
///
/// Encodes as the post-Alonzo map. The legacy array form
/// `[address, value, ?datum_hash]` is accepted when decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub address: Address,
    pub value: Value,
    pub datum: Option<DatumOption>,
    pub script_ref: Option<Script>,
}

impl TransactionOutput {
    pub fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum: None,
            script_ref: None,
        }
    }

    pub fn with_datum(self, datum: DatumOption) -> Self {
        Self {
            datum: Some(datum),
            ..self
        }
    }

    pub fn with_script_ref(self, script: Script) -> Self {
        Self {
            script_ref: Some(script),
            ..self
        }
    }

    /// Length of the cbor encoding, which drives the min-ada requirement
    pub fn serialized_size(&self) -> Result<u64, EncodeError> {
        Ok(minicbor::to_vec(self)?.len() as u64)
    }
}

impl<C> minicbor::Encode<C> for TransactionOutput {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(present(&[
            true,
            true,
            self.datum.is_some(),
            self.script_ref.is_some(),
        ]))?;

        write_key(e, OutputField::Address)?;
        e.encode_with(&self.address, ctx)?;

        write_key(e, OutputField::Value)?;
        e.encode_with(&self.value, ctx)?;

        if let Some(datum) = &self.datum {
            write_key(e, OutputField::Datum)?;
            e.encode_with(datum, ctx)?;
        }

        if let Some(script) = &self.script_ref {
            write_key(e, OutputField::ScriptRef)?;
            e.encode_with(CborWrap(script), ctx)?;
        }

        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TransactionOutput {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        match d.datatype()? {
            Type::Array | Type::ArrayIndef => decode_legacy(d, ctx),
            Type::Map | Type::MapIndef => decode_post_alonzo(d, ctx),
            other => Err(minicbor::decode::Error::message(format!(
                "unexpected cbor data type {other} for transaction output"
            ))),
        }
    }
}

fn decode_legacy<C>(
    d: &mut minicbor::Decoder<'_>,
    ctx: &mut C,
) -> Result<TransactionOutput, minicbor::decode::Error> {
    let len = d.array()?;

    let address = d.decode_with(ctx)?;
    let value = d.decode_with(ctx)?;

    let has_datum = match len {
        Some(3) => true,
        Some(2) => false,
        Some(n) => {
            return Err(minicbor::decode::Error::message(format!(
                "legacy transaction output must have 2 or 3 items, found {n}"
            )))
        }
        None => d.datatype()? != Type::Break,
    };

    let datum = if has_datum {
        Some(DatumOption::Hash(d.decode_with(ctx)?))
    } else {
        None
    };

    end_array(d, len)?;

    Ok(TransactionOutput {
        address,
        value,
        datum,
        script_ref: None,
    })
}

fn decode_post_alonzo<C>(
    d: &mut minicbor::Decoder<'_>,
    ctx: &mut C,
) -> Result<TransactionOutput, minicbor::decode::Error> {
    let mut record = MapRecord::<OutputField>::begin(d)?;

    let mut address = None;
    let mut value = None;
    let mut datum = None;
    let mut script_ref = None;

    while let Some(field) = record.next_field(d)? {
        match field {
            OutputField::Address => address = Some(d.decode_with(ctx)?),
            OutputField::Value => value = Some(d.decode_with(ctx)?),
            OutputField::Datum => datum = Some(d.decode_with(ctx)?),
            OutputField::ScriptRef => {
                let CborWrap(script): CborWrap<Script> = d.decode_with(ctx)?;
                script_ref = Some(script);
            }
        }
    }

    Ok(TransactionOutput {
        address: MapRecord::required(OutputField::Address, address)?,
        value: MapRecord::required(OutputField::Value, value)?,
        datum,
        script_ref,
    })
}

/// Snapshot of unspent outputs, keyed by their reference
pub type UtxoSet = BTreeMap<TransactionInput, TransactionOutput>;

/// Sum of the values held by a set of UTxOs
pub fn total_value<'a>(
    utxos: impl IntoIterator<Item = &'a (TransactionInput, TransactionOutput)>,
) -> Value {
    utxos.into_iter().map(|(_, output)| &output.value).sum()
}
