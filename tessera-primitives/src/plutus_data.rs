use std::{fmt, ops::Deref};

use num_bigint::{BigInt as Integer, Sign};
use num_traits::{Signed, ToPrimitive};
use serde::{Deserialize, Serialize};
use tessera_codec::{
    minicbor::{
        self,
        data::{IanaTag, Tag, Type},
        Encode,
    },
    utils::{Int, KeyValuePairs, MaybeIndefArray},
};
use tessera_crypto::hash::Hasher;

use crate::{DatumHash, EncodeError};

/// Arbitrary structured data passed to Plutus scripts as datums and redeemers
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum PlutusData {
    Constr(Constr<PlutusData>),
    Map(KeyValuePairs<PlutusData, PlutusData>),
    BigInt(BigInt),
    BoundedBytes(BoundedBytes),
    Array(MaybeIndefArray<PlutusData>),
}

impl PlutusData {
    /// Constructor application using the compact tags the ledger prefers
    pub fn constr(index: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr(Constr::new(index, fields))
    }

    pub fn integer(value: impl Into<Integer>) -> Self {
        PlutusData::BigInt(BigInt::from(value.into()))
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        PlutusData::BoundedBytes(BoundedBytes::from(bytes.into()))
    }

    pub fn list(items: Vec<PlutusData>) -> Self {
        PlutusData::Array(MaybeIndefArray::Def(items))
    }

    pub fn map(entries: Vec<(PlutusData, PlutusData)>) -> Self {
        PlutusData::Map(KeyValuePairs::Def(entries))
    }

    /// Hash used to reference this datum from an output
    pub fn hash(&self) -> Result<DatumHash, EncodeError> {
        Hasher::<256>::hash_cbor(self)
    }
}

impl<'b, C> minicbor::decode::Decode<'b, C> for PlutusData {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        match d.datatype()? {
            Type::Tag => {
                let mut probe = d.probe();
                let tag = probe.tag()?;

                if tag == IanaTag::PosBignum.tag() || tag == IanaTag::NegBignum.tag() {
                    Ok(Self::BigInt(d.decode_with(ctx)?))
                } else {
                    match tag.as_u64() {
                        (121..=127) | (1280..=1400) | 102 => Ok(Self::Constr(d.decode_with(ctx)?)),
                        other => Err(minicbor::decode::Error::message(format!(
                            "unknown tag {other} for plutus data"
                        ))),
                    }
                }
            }
            Type::U8
            | Type::U16
            | Type::U32
            | Type::U64
            | Type::I8
            | Type::I16
            | Type::I32
            | Type::I64
            | Type::Int => Ok(Self::BigInt(d.decode_with(ctx)?)),
            Type::Map | Type::MapIndef => Ok(Self::Map(d.decode_with(ctx)?)),
            Type::Bytes | Type::BytesIndef => Ok(Self::BoundedBytes(d.decode_with(ctx)?)),
            Type::Array | Type::ArrayIndef => Ok(Self::Array(d.decode_with(ctx)?)),
            any => Err(minicbor::decode::Error::message(format!(
                "bad cbor data type ({any:?}) for plutus data"
            ))),
        }
    }
}

impl<C> minicbor::encode::Encode<C> for PlutusData {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            Self::Constr(a) => {
                e.encode_with(a, ctx)?;
            }
            Self::Map(a) => {
                e.encode_with(a, ctx)?;
            }
            Self::BigInt(a) => {
                e.encode_with(a, ctx)?;
            }
            Self::BoundedBytes(a) => {
                e.encode_with(a, ctx)?;
            }
            Self::Array(a) => {
                e.encode_with(a, ctx)?;
            }
        };

        Ok(())
    }
}

/*
big_int = int / big_uint / big_nint
big_uint = #6.2(bounded_bytes)
big_nint = #6.3(bounded_bytes)
 */

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum BigInt {
    Int(Int),
    BigUInt(BoundedBytes),
    BigNInt(BoundedBytes),
}

impl From<Integer> for BigInt {
    /// Uses the plain cbor integer whenever it fits, the tagged bignum forms
    /// otherwise
    fn from(value: Integer) -> Self {
        if let Some(int) = value.to_i128().and_then(|x| Int::try_from(x).ok()) {
            return BigInt::Int(int);
        }

        if value.is_negative() {
            // big_nint carries -1 - n
            let magnitude: Integer = -value - 1;
            BigInt::BigNInt(BoundedBytes::from(magnitude.to_bytes_be().1))
        } else {
            BigInt::BigUInt(BoundedBytes::from(value.to_bytes_be().1))
        }
    }
}

impl From<&BigInt> for Integer {
    fn from(value: &BigInt) -> Self {
        match value {
            BigInt::Int(x) => Integer::from(i128::from(*x)),
            BigInt::BigUInt(bytes) => Integer::from_bytes_be(Sign::Plus, bytes),
            BigInt::BigNInt(bytes) => -Integer::from_bytes_be(Sign::Plus, bytes) - 1,
        }
    }
}

impl<'b, C> minicbor::decode::Decode<'b, C> for BigInt {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        match d.datatype()? {
            Type::U8
            | Type::U16
            | Type::U32
            | Type::U64
            | Type::I8
            | Type::I16
            | Type::I32
            | Type::I64
            | Type::Int => Ok(Self::Int(d.decode_with(ctx)?)),
            Type::Tag => {
                let tag = d.tag()?;
                if tag == IanaTag::PosBignum.tag() {
                    Ok(Self::BigUInt(d.decode_with(ctx)?))
                } else if tag == IanaTag::NegBignum.tag() {
                    Ok(Self::BigNInt(d.decode_with(ctx)?))
                } else {
                    Err(minicbor::decode::Error::message(format!(
                        "invalid cbor tag {} for big int",
                        tag.as_u64()
                    )))
                }
            }
            _ => Err(minicbor::decode::Error::message(
                "invalid cbor data type for big int",
            )),
        }
    }
}

impl<C> minicbor::encode::Encode<C> for BigInt {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            BigInt::Int(x) => {
                e.encode_with(x, ctx)?;
            }
            BigInt::BigUInt(x) => {
                e.tag(IanaTag::PosBignum)?;
                e.encode_with(x, ctx)?;
            }
            BigInt::BigNInt(x) => {
                e.tag(IanaTag::NegBignum)?;
                e.encode_with(x, ctx)?;
            }
        };

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct Constr<A> {
    pub tag: u64,
    pub any_constructor: Option<u64>,
    pub fields: MaybeIndefArray<A>,
}

impl<A> Constr<A> {
    /// Picks the tag for constructor `index`: 121..=127 for the first seven,
    /// 1280..=1400 for the next 121, the general form 102 beyond that
    pub fn new(index: u64, fields: Vec<A>) -> Self {
        let fields = MaybeIndefArray::Def(fields);

        match index {
            0..=6 => Constr {
                tag: 121 + index,
                any_constructor: None,
                fields,
            },
            7..=127 => Constr {
                tag: 1280 + index - 7,
                any_constructor: None,
                fields,
            },
            _ => Constr {
                tag: 102,
                any_constructor: Some(index),
                fields,
            },
        }
    }

    pub fn constructor_index(&self) -> Option<u64> {
        match self.tag {
            121..=127 => Some(self.tag - 121),
            1280..=1400 => Some(self.tag - 1280 + 7),
            102 => self.any_constructor,
            _ => None,
        }
    }
}

impl<'b, C, A> minicbor::decode::Decode<'b, C> for Constr<A>
where
    A: minicbor::decode::Decode<'b, C>,
{
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let tag = d.tag()?;
        let x = tag.as_u64();
        match x {
            121..=127 | 1280..=1400 => Ok(Constr {
                tag: x,
                fields: d.decode_with(ctx)?,
                any_constructor: None,
            }),
            102 => {
                d.array()?;

                Ok(Constr {
                    tag: x,
                    any_constructor: Some(d.decode_with(ctx)?),
                    fields: d.decode_with(ctx)?,
                })
            }
            _ => Err(minicbor::decode::Error::message(format!(
                "bad tag code {x} for plutus data constructor"
            ))),
        }
    }
}

impl<C, A> minicbor::encode::Encode<C> for Constr<A>
where
    A: minicbor::encode::Encode<C>,
{
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.tag(Tag::new(self.tag))?;

        match self.tag {
            102 => {
                let x = (self.any_constructor.unwrap_or_default(), &self.fields);
                e.encode_with(x, ctx)?;
                Ok(())
            }
            _ => {
                e.encode_with(&self.fields, ctx)?;
                Ok(())
            }
        }
    }
}

/// Defined to encode PlutusData bytestring as it is done in the canonical
/// plutus implementation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(into = "String")]
#[serde(try_from = "String")]
pub struct BoundedBytes(Vec<u8>);

impl From<Vec<u8>> for BoundedBytes {
    fn from(xs: Vec<u8>) -> Self {
        BoundedBytes(xs)
    }
}

impl From<BoundedBytes> for Vec<u8> {
    fn from(b: BoundedBytes) -> Self {
        b.0
    }
}

impl Deref for BoundedBytes {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for BoundedBytes {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let v = hex::decode(value)?;
        Ok(BoundedBytes(v))
    }
}

impl From<BoundedBytes> for String {
    fn from(b: BoundedBytes) -> Self {
        hex::encode(b.deref())
    }
}

impl fmt::Display for BoundedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl<C> Encode<C> for BoundedBytes {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        // bytestrings longer than 64 bytes go out as indefinite chunks of 64
        const CHUNK_SIZE: usize = 64;
        let bs: &Vec<u8> = self.deref();
        if bs.len() <= CHUNK_SIZE {
            e.bytes(bs)?;
        } else {
            e.begin_bytes()?;
            for b in bs.chunks(CHUNK_SIZE) {
                e.bytes(b)?;
            }
            e.end()?;
        }
        Ok(())
    }
}

impl<'b, C> minicbor::decode::Decode<'b, C> for BoundedBytes {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let mut res = Vec::new();
        for chunk in d.bytes_iter()? {
            let bs = chunk?;
            res.extend_from_slice(bs);
        }
        Ok(BoundedBytes::from(res))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::any_plutus_data;
    use proptest::prelude::*;
    use test_case::test_case;

    proptest! {
        #[test]
        fn cbor_roundtrip(original_data in any_plutus_data(3)) {
            let bytes = minicbor::to_vec(&original_data).unwrap();
            let data: PlutusData = minicbor::decode(&bytes).unwrap();
            prop_assert_eq!(data, original_data);
        }

        #[test]
        fn integer_conversion_roundtrip(digits in "-?[1-9][0-9]{0,60}") {
            let n: Integer = digits.parse().unwrap();
            prop_assert_eq!(Integer::from(&BigInt::from(n.clone())), n);
        }
    }

    #[test_case(0, 121 ; "first compact tag")]
    #[test_case(6, 127 ; "last compact tag")]
    #[test_case(7, 1280 ; "first extended tag")]
    #[test_case(127, 1400 ; "last extended tag")]
    #[test_case(128, 102 ; "general form")]
    fn constructor_tags(index: u64, tag: u64) {
        let constr = Constr::<PlutusData>::new(index, vec![]);
        assert_eq!(constr.tag, tag);
        assert_eq!(constr.constructor_index(), Some(index));
    }

    #[test]
    fn unit_datum_encoding() {
        let unit = PlutusData::constr(0, vec![]);
        assert_eq!(hex::encode(minicbor::to_vec(&unit).unwrap()), "d87980");
    }

    #[test]
    fn large_integers_use_bignum_tags() {
        let big: Integer = Integer::from(u64::MAX) * 4;
        let data = PlutusData::integer(big.clone());

        assert!(matches!(data, PlutusData::BigInt(BigInt::BigUInt(_))));

        let negative = PlutusData::integer(-big);
        let cbor = minicbor::to_vec(&negative).unwrap();
        assert_eq!(cbor[0], 0xc3);
    }

    #[test]
    fn small_integers_stay_plain() {
        let data = PlutusData::integer(-42);
        assert_eq!(hex::encode(minicbor::to_vec(&data).unwrap()), "3829");
    }

    #[test]
    fn long_bytes_are_chunked() {
        let data = PlutusData::bytes(vec![7u8; 65]);
        let cbor = minicbor::to_vec(&data).unwrap();

        assert_eq!(cbor[0], 0x5f);
        assert_eq!(minicbor::decode::<PlutusData>(&cbor).unwrap(), data);
    }
}
