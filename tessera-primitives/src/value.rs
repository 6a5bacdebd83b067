use std::{
    collections::BTreeMap,
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use tessera_codec::minicbor::{self, data::Type};
use thiserror::Error;

use crate::{AssetName, Coin, PolicyId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("negative quantity {quantity} of {asset}")]
    Negative { asset: AssetClass, quantity: BigInt },

    #[error("quantity {quantity} of {asset} does not fit the ledger's integer range")]
    Overflow { asset: AssetClass, quantity: BigInt },

    #[error("lovelace can't be minted or burned")]
    LovelaceInMint,
}

/// Identity of an asset that can be held in a [`Value`]
///
/// Lovelace sorts before every token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Lovelace,
    Token(PolicyId, AssetName),
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Lovelace => f.write_str("lovelace"),
            AssetClass::Token(policy, name) => write!(f, "{policy}.{name}"),
        }
    }
}

/// A bundle of asset quantities
///
/// Quantities are arbitrary-precision signed integers so that intermediate
/// results (differences, deficits) can be represented. The map never holds a
/// zero quantity: an absent asset means zero. Values placed in an output must
/// be non-negative and fit the ledger's unsigned range, which is checked when
/// encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Value(BTreeMap<AssetClass, BigInt>);

impl Value {
    pub fn zero() -> Self {
        Value(BTreeMap::new())
    }

    pub fn only_lovelace(quantity: impl Into<BigInt>) -> Self {
        Self::from_entries([(AssetClass::Lovelace, quantity.into())])
    }

    pub fn only_token(policy: PolicyId, name: AssetName, quantity: impl Into<BigInt>) -> Self {
        Self::from_entries([(AssetClass::Token(policy, name), quantity.into())])
    }

    /// Builds a normalized value, summing repeated assets
    pub fn from_entries(entries: impl IntoIterator<Item = (AssetClass, BigInt)>) -> Self {
        let mut value = Value::zero();

        for (asset, quantity) in entries {
            value.credit(asset, quantity);
        }

        value
    }

    fn credit(&mut self, asset: AssetClass, quantity: BigInt) {
        if quantity.is_zero() {
            return;
        }

        let slot = self.0.entry(asset).or_default();
        *slot += quantity;

        if slot.is_zero() {
            self.0.retain(|_, q| !q.is_zero());
        }
    }

    pub fn quantity_of(&self, asset: &AssetClass) -> BigInt {
        self.0.get(asset).cloned().unwrap_or_default()
    }

    pub fn lovelace(&self) -> BigInt {
        self.quantity_of(&AssetClass::Lovelace)
    }

    /// Lovelace as a ledger coin, failing if negative or out of range
    pub fn coin(&self) -> Result<Coin, ValueError> {
        to_ledger_quantity(&AssetClass::Lovelace, &self.lovelace())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_non_negative(&self) -> bool {
        self.0.values().all(|q| !q.is_negative())
    }

    /// Whether this value only holds lovelace
    pub fn is_lovelace_only(&self) -> bool {
        self.0.keys().all(|a| *a == AssetClass::Lovelace)
    }

    /// Every asset quantity here is greater or equal to the one in `other`,
    /// with missing assets counting as zero on both sides
    pub fn at_least(&self, other: &Value) -> bool {
        let zero = BigInt::zero();

        let covers_other = other
            .0
            .iter()
            .all(|(asset, q)| self.0.get(asset).unwrap_or(&zero) >= q);

        let no_extra_debt = self
            .0
            .iter()
            .filter(|(asset, _)| !other.0.contains_key(*asset))
            .all(|(_, q)| !q.is_negative());

        covers_other && no_extra_debt
    }

    /// Entries with a positive quantity
    pub fn positive_part(&self) -> Value {
        Value(
            self.0
                .iter()
                .filter(|(_, q)| q.is_positive())
                .map(|(a, q)| (a.clone(), q.clone()))
                .collect(),
        )
    }

    /// Magnitudes of the entries with a negative quantity
    pub fn negative_part(&self) -> Value {
        (-self).positive_part()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetClass, &BigInt)> {
        self.0.iter()
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetClass> {
        self.0.keys()
    }

    /// Token entries grouped by policy, as the ledger lays them out
    pub fn to_multiasset(&self) -> Result<Multiasset<u64>, ValueError> {
        let mut policies: BTreeMap<PolicyId, BTreeMap<AssetName, u64>> = BTreeMap::new();

        for (asset, quantity) in self.0.iter() {
            if let AssetClass::Token(policy, name) = asset {
                let quantity = to_ledger_quantity(asset, quantity)?;
                policies
                    .entry(*policy)
                    .or_default()
                    .insert(name.clone(), quantity);
            }
        }

        Ok(Multiasset(policies))
    }

    pub fn from_multiasset<A>(coin: Coin, assets: &Multiasset<A>) -> Self
    where
        A: Copy + Into<BigInt>,
    {
        let tokens = assets.iter().map(|(policy, name, q)| {
            (AssetClass::Token(*policy, name.clone()), q.into())
        });

        Value::from_entries(std::iter::once((AssetClass::Lovelace, BigInt::from(coin))).chain(tokens))
    }
}

fn to_ledger_quantity(asset: &AssetClass, quantity: &BigInt) -> Result<u64, ValueError> {
    if quantity.is_negative() {
        return Err(ValueError::Negative {
            asset: asset.clone(),
            quantity: quantity.clone(),
        });
    }

    quantity.to_u64().ok_or_else(|| ValueError::Overflow {
        asset: asset.clone(),
        quantity: quantity.clone(),
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0 lovelace");
        }

        let parts: Vec<_> = self.0.iter().map(|(a, q)| format!("{q} {a}")).collect();
        f.write_str(&parts.join(" + "))
    }
}

impl From<Coin> for Value {
    fn from(coin: Coin) -> Self {
        Value::only_lovelace(coin)
    }
}

impl Add<&Value> for &Value {
    type Output = Value;

    fn add(self, rhs: &Value) -> Value {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Add for Value {
    type Output = Value;

    fn add(mut self, rhs: Value) -> Value {
        self += &rhs;
        self
    }
}

impl AddAssign<&Value> for Value {
    fn add_assign(&mut self, rhs: &Value) {
        for (asset, quantity) in rhs.0.iter() {
            self.credit(asset.clone(), quantity.clone());
        }
    }
}

impl Neg for &Value {
    type Output = Value;

    fn neg(self) -> Value {
        Value(self.0.iter().map(|(a, q)| (a.clone(), -q)).collect())
    }
}

impl Neg for Value {
    type Output = Value;

    fn neg(self) -> Value {
        -&self
    }
}

impl Sub<&Value> for &Value {
    type Output = Value;

    fn sub(self, rhs: &Value) -> Value {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Sub for Value {
    type Output = Value;

    fn sub(mut self, rhs: Value) -> Value {
        self -= &rhs;
        self
    }
}

impl SubAssign<&Value> for Value {
    fn sub_assign(&mut self, rhs: &Value) {
        for (asset, quantity) in rhs.0.iter() {
            self.credit(asset.clone(), -quantity);
        }
    }
}

impl Sum for Value {
    fn sum<I: Iterator<Item = Value>>(iter: I) -> Self {
        iter.fold(Value::zero(), |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Value> for Value {
    fn sum<I: Iterator<Item = &'a Value>>(iter: I) -> Self {
        iter.fold(Value::zero(), |mut acc, x| {
            acc += x;
            acc
        })
    }
}

impl<C> minicbor::Encode<C> for Value {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        let coin = self
            .coin()
            .map_err(|err| minicbor::encode::Error::message(err.to_string()))?;

        let assets = self
            .to_multiasset()
            .map_err(|err| minicbor::encode::Error::message(err.to_string()))?;

        if assets.is_empty() {
            e.u64(coin)?;
        } else {
            e.array(2)?;
            e.u64(coin)?;
            e.encode_with(&assets, ctx)?;
        }

        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Value {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        match d.datatype()? {
            Type::U8 | Type::U16 | Type::U32 | Type::U64 => Ok(Value::from(d.u64()?)),
            Type::Array | Type::ArrayIndef => {
                let len = d.array()?;
                let coin = d.u64()?;
                let assets: Multiasset<u64> = d.decode_with(ctx)?;

                match len {
                    Some(2) => (),
                    None if d.datatype()? == Type::Break => d.skip()?,
                    _ => {
                        return Err(minicbor::decode::Error::message(
                            "multi-asset value must be a pair of coin and assets",
                        ))
                    }
                }

                Ok(Value::from_multiasset(coin, &assets))
            }
            t => Err(minicbor::decode::Error::message(format!(
                "unexpected datatype {t} for value"
            ))),
        }
    }
}

/// Token quantities grouped by policy, the ledger's `multiasset<A>`
///
/// Decoding rejects empty policies and zero quantities.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Multiasset<A>(BTreeMap<PolicyId, BTreeMap<AssetName, A>>);

/// Minted (positive) and burned (negative) quantities of a transaction
pub type Mint = Multiasset<i64>;

impl<A> Multiasset<A> {
    pub fn new() -> Self {
        Multiasset(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn policies(&self) -> impl Iterator<Item = &PolicyId> {
        self.0.keys()
    }

    pub fn assets_of(&self, policy: &PolicyId) -> Option<&BTreeMap<AssetName, A>> {
        self.0.get(policy)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PolicyId, &AssetName, A)> + '_
    where
        A: Copy,
    {
        self.0
            .iter()
            .flat_map(|(p, assets)| assets.iter().map(move |(n, q)| (p, n, *q)))
    }
}

impl Mint {
    /// Adds a mint (positive) or burn (negative) delta, dropping entries that
    /// cancel out
    ///
    /// A total outside the `i64` range fails and leaves the mint unchanged.
    pub fn add(
        &mut self,
        policy: PolicyId,
        name: AssetName,
        delta: i64,
    ) -> Result<(), ValueError> {
        let current = self
            .0
            .get(&policy)
            .and_then(|assets| assets.get(&name))
            .copied()
            .unwrap_or_default();

        let quantity = current
            .checked_add(delta)
            .ok_or_else(|| ValueError::Overflow {
                quantity: BigInt::from(current) + delta,
                asset: AssetClass::Token(policy, name.clone()),
            })?;

        let assets = self.0.entry(policy).or_default();

        if quantity == 0 {
            assets.remove(&name);
        } else {
            assets.insert(name, quantity);
        }

        if assets.is_empty() {
            self.0.remove(&policy);
        }

        Ok(())
    }

    /// The minted side of the mint field
    pub fn minted(&self) -> Value {
        Value::from_entries(
            self.iter()
                .filter(|(_, _, q)| *q > 0)
                .map(|(p, n, q)| (AssetClass::Token(*p, n.clone()), BigInt::from(q))),
        )
    }

    /// The burned side of the mint field, as positive quantities
    pub fn burned(&self) -> Value {
        Value::from_entries(
            self.iter()
                .filter(|(_, _, q)| *q < 0)
                .map(|(p, n, q)| (AssetClass::Token(*p, n.clone()), -BigInt::from(q))),
        )
    }

    /// Net effect of the mint field on the value of the transaction
    pub fn to_value(&self) -> Value {
        Value::from_multiasset(0, self)
    }

    pub fn from_value(value: &Value) -> Result<Self, ValueError> {
        let mut mint = Mint::new();

        for (asset, quantity) in value.iter() {
            match asset {
                AssetClass::Lovelace => return Err(ValueError::LovelaceInMint),
                AssetClass::Token(policy, name) => {
                    let delta = quantity.to_i64().ok_or_else(|| ValueError::Overflow {
                        asset: asset.clone(),
                        quantity: quantity.clone(),
                    })?;
                    mint.add(*policy, name.clone(), delta)?;
                }
            }
        }

        Ok(mint)
    }
}

impl<C, A> minicbor::Encode<C> for Multiasset<A>
where
    A: minicbor::Encode<C>,
{
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.encode_with(&self.0, ctx)?;
        Ok(())
    }
}

impl<'b, C, A> minicbor::Decode<'b, C> for Multiasset<A>
where
    A: minicbor::Decode<'b, C> + Default + PartialEq,
{
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let policies: BTreeMap<PolicyId, BTreeMap<AssetName, A>> = d.decode_with(ctx)?;

        for (policy, assets) in &policies {
            if assets.is_empty() {
                return Err(minicbor::decode::Error::message(format!(
                    "policy {policy} must not be empty"
                )));
            }

            if assets.values().any(|q| *q == A::default()) {
                return Err(minicbor::decode::Error::message(format!(
                    "policy {policy} has a zero quantity"
                )));
            }
        }

        Ok(Multiasset(policies))
    }
}
