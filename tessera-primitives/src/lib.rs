//! Ledger primitives and cbor codec for Conway-era transactions
//!
//! Handcrafted, idiomatic rust artifacts based on the Conway CDDL of the
//! Cardano ledger. Every type that is implemented here round-trips through
//! its cbor form; constructs this crate doesn't implement (protocol updates,
//! governance actions, some certificate kinds) are rejected when decoding
//! instead of being dropped.

mod auxiliary;
mod certificate;
mod output;
mod plutus_data;
mod script;
mod transaction;
mod value;

#[cfg(test)]
mod strategies;

pub use auxiliary::*;
pub use certificate::*;
pub use output::*;
pub use plutus_data::*;
pub use script::*;
pub use transaction::*;
pub use value::*;

pub use tessera_addresses::{Address, StakeAddress};
pub use tessera_codec::utils::{
    ByteKind, Bytes, CborWrap, Int, KeepRaw, KeyValuePairs, MaybeIndefArray, Nullable, Set,
    TypedBytes,
};
pub use tessera_codec::Fragment;
pub use tessera_crypto::hash::Hash;

use tessera_codec::minicbor::{
    self,
    data::{Tag, Type},
    Decode, Encode,
};
use serde::{Deserialize, Serialize};

/// Failure raised while serializing a value into a hasher or a buffer
pub type EncodeError = minicbor::encode::Error<std::convert::Infallible>;

/// Semantic kinds of the byte strings found in transactions
pub mod kind {
    use tessera_codec::utils::ByteKind;

    macro_rules! byte_kind {
        ($($name:ident),+) => {
            $(
                #[derive(Debug, Clone, Copy)]
                pub enum $name {}

                impl ByteKind for $name {
                    const NAME: &'static str = stringify!($name);
                }
            )+
        };
    }

    byte_kind!(AssetName, VKey, Signature, PlutusProgram);
}

/// Fails unless a fixed-shape array has the expected number of items
pub(crate) fn expect_len(
    len: Option<u64>,
    expected: u64,
    what: &str,
) -> Result<(), minicbor::decode::Error> {
    match len {
        Some(n) if n != expected => Err(minicbor::decode::Error::message(format!(
            "{what} must have {expected} items, found {n}"
        ))),
        _ => Ok(()),
    }
}

/// Consumes the break of an indefinite array once its items were read
pub(crate) fn end_array(
    d: &mut minicbor::Decoder<'_>,
    len: Option<u64>,
) -> Result<(), minicbor::decode::Error> {
    if len.is_none() {
        if d.datatype()? != Type::Break {
            return Err(minicbor::decode::Error::message(
                "unexpected trailing items in array",
            ));
        }
        d.skip()?;
    }

    Ok(())
}

// ----- Common type definitions

pub type AddrKeyhash = Hash<28>;

pub type AssetName = TypedBytes<kind::AssetName>;

pub type Coin = u64;

pub type DatumHash = Hash<32>;

pub type Epoch = u64;

pub type PolicyId = Hash<28>;

pub type PoolKeyhash = Hash<28>;

pub type ScriptHash = Hash<28>;

pub type TransactionId = Hash<32>;

pub type VKey = TypedBytes<kind::VKey>;

pub type Signature = TypedBytes<kind::Signature>;

/// Reward accounts are stake addresses in their raw byte form
pub type RewardAccount = StakeAddress;

#[derive(
    Serialize, Deserialize, Encode, Decode, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default,
)]
pub struct ExUnits {
    #[n(0)]
    pub mem: u64,
    #[n(1)]
    pub steps: u64,
}

impl ExUnits {
    pub fn new(mem: u64, steps: u64) -> Self {
        Self { mem, steps }
    }

    /// Whether both dimensions fit within `limit`
    pub fn fits(&self, limit: &ExUnits) -> bool {
        self.mem <= limit.mem && self.steps <= limit.steps
    }
}

impl std::ops::Add for ExUnits {
    type Output = ExUnits;

    fn add(self, rhs: Self) -> Self::Output {
        ExUnits {
            mem: self.mem.saturating_add(rhs.mem),
            steps: self.steps.saturating_add(rhs.steps),
        }
    }
}

impl std::iter::Sum for ExUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ExUnits::default(), |acc, x| acc + x)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct RationalNumber {
    pub numerator: u64,
    pub denominator: u64,
}

pub type UnitInterval = RationalNumber;

impl<'b, C> minicbor::decode::Decode<'b, C> for RationalNumber {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let tag = d.tag()?;

        if tag.as_u64() != 30 {
            return Err(minicbor::decode::Error::message(format!(
                "expected tag 30 for rational number, found {}",
                tag.as_u64()
            )));
        }

        if d.array()? != Some(2) {
            return Err(minicbor::decode::Error::message(
                "rational number must be an array of two elements",
            ));
        }

        Ok(RationalNumber {
            numerator: d.decode_with(ctx)?,
            denominator: d.decode_with(ctx)?,
        })
    }
}

impl<C> minicbor::encode::Encode<C> for RationalNumber {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.tag(Tag::new(30))?;
        e.array(2)?;
        e.encode_with(self.numerator, ctx)?;
        e.encode_with(self.denominator, ctx)?;
        Ok(())
    }
}

#[derive(
    Serialize, Deserialize, Encode, Decode, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy,
)]
#[cbor(index_only)]
pub enum NetworkId {
    #[n(0)]
    Testnet,
    #[n(1)]
    Mainnet,
}

impl From<NetworkId> for u8 {
    fn from(network_id: NetworkId) -> u8 {
        match network_id {
            NetworkId::Testnet => 0,
            NetworkId::Mainnet => 1,
        }
    }
}

/// Reference to an output of a previous transaction, the key of a UTxO
#[derive(
    Serialize,
    Deserialize,
    Encode,
    Decode,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    std::hash::Hash,
)]
pub struct TransactionInput {
    #[n(0)]
    pub transaction_id: TransactionId,

    #[n(1)]
    pub index: u64,
}

impl TransactionInput {
    pub fn new(transaction_id: TransactionId, index: u64) -> Self {
        Self {
            transaction_id,
            index,
        }
    }
}

impl std::fmt::Display for TransactionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.transaction_id, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_number_checks_its_tag() {
        let good = hex::decode("d81e820105").unwrap();
        let value: RationalNumber = minicbor::decode(&good).unwrap();
        assert_eq!(
            value,
            RationalNumber {
                numerator: 1,
                denominator: 5
            }
        );
        assert_eq!(minicbor::to_vec(value).unwrap(), good);

        let bad = hex::decode("d81f820105").unwrap();
        assert!(minicbor::decode::<RationalNumber>(&bad).is_err());
    }

    #[test]
    fn transaction_input_is_a_pair() {
        let input = TransactionInput::new(Hash::new([1; 32]), 3);
        let cbor = minicbor::to_vec(&input).unwrap();

        assert_eq!(cbor[0], 0x82);
        assert_eq!(*cbor.last().unwrap(), 0x03);
        assert_eq!(minicbor::decode::<TransactionInput>(&cbor).unwrap(), input);
        assert_eq!(input.to_string(), format!("{}#3", "01".repeat(32)));
    }

    #[test]
    fn ex_units_add_up_and_compare() {
        let total: ExUnits = [ExUnits::new(10, 100), ExUnits::new(5, 50)]
            .into_iter()
            .sum();

        assert_eq!(total, ExUnits::new(15, 150));
        assert!(total.fits(&ExUnits::new(15, 200)));
        assert!(!total.fits(&ExUnits::new(14, 200)));
    }
}
