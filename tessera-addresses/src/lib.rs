//! Interact with Cardano addresses of any type
//!
//! This module contains utilities to decode / encode Cardano addresses from /
//! to different formats. The entry point to most of the methods is the
//! [Address] enum, which holds the decoded values of either a Byron, Shelley or
//! Stake address.
//!
//! Besides addresses, credential hashes (key hashes, script hashes, pool ids)
//! have their own bech32 forms, see [encode_hash] and [decode_hash].
//!
//! For more information regarding Cardano addresses and their formats, please refer to [CIP-19](https://cips.cardano.org/cips/cip19/).

pub mod varuint;

use tessera_codec::minicbor;
use tessera_crypto::hash::Hash;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("error converting from/to bech32 {0}")]
    BadBech32(bech32::Error),

    #[error("error decoding hex address {0}")]
    BadHex(#[from] hex::FromHexError),

    #[error("address header not found")]
    MissingHeader,

    #[error("address header is invalid {0:08b}")]
    InvalidHeader(u8),

    #[error("invalid operation for Byron address")]
    InvalidForByron,

    #[error("unkown hrp for network {0:08b}")]
    UnknownNetworkHrp(u8),

    #[error("invalid hash size {0}")]
    InvalidHashSize(usize),

    #[error("unexpected trailing bytes after address payload")]
    TrailingBytes,

    #[error("expected hrp `{expected}` but found `{found}`")]
    UnexpectedHrp { expected: String, found: String },

    #[error("variable-length uint error: {0}")]
    VarUintError(#[from] varuint::Error),
}

/// Human-readable prefixes of the bech32 forms in use
pub mod hrp {
    pub const ADDR: &str = "addr";
    pub const ADDR_TEST: &str = "addr_test";
    pub const STAKE: &str = "stake";
    pub const STAKE_TEST: &str = "stake_test";
    pub const ADDR_VKH: &str = "addr_vkh";
    pub const STAKE_VKH: &str = "stake_vkh";
    pub const SCRIPT: &str = "script";
    pub const POOL: &str = "pool";
}

pub type PaymentKeyHash = Hash<28>;

pub type StakeKeyHash = Hash<28>;

pub type ScriptHash = Hash<28>;

pub type Slot = u64;
pub type TxIdx = u64;
pub type CertIdx = u64;

/// An on-chain pointer to a stake key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pointer(Slot, TxIdx, CertIdx);

fn split_hash(bytes: &[u8]) -> Result<(Hash<28>, &[u8]), Error> {
    if bytes.len() < 28 {
        return Err(Error::InvalidHashSize(bytes.len()));
    }

    let (hash, rest) = bytes.split_at(28);
    let hash = Hash::try_from(hash).map_err(|_| Error::InvalidHashSize(hash.len()))?;

    Ok((hash, rest))
}

fn exact_hash(bytes: &[u8]) -> Result<Hash<28>, Error> {
    match split_hash(bytes)? {
        (hash, []) => Ok(hash),
        _ => Err(Error::TrailingBytes),
    }
}

impl Pointer {
    pub fn new(slot: Slot, tx_idx: TxIdx, cert_idx: CertIdx) -> Self {
        Pointer(slot, tx_idx, cert_idx)
    }

    pub fn parse(mut bytes: &[u8]) -> Result<Self, Error> {
        let a = varuint::read(&mut bytes)?;
        let b = varuint::read(&mut bytes)?;
        let c = varuint::read(&mut bytes)?;

        if !bytes.is_empty() {
            return Err(Error::TrailingBytes);
        }

        Ok(Pointer(a, b, c))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![];
        varuint::write(&mut out, self.0);
        varuint::write(&mut out, self.1);
        varuint::write(&mut out, self.2);

        out
    }

    pub fn slot(&self) -> u64 {
        self.0
    }

    pub fn tx_idx(&self) -> u64 {
        self.1
    }

    pub fn cert_idx(&self) -> u64 {
        self.2
    }
}

/// The payment part of a Shelley address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShelleyPaymentPart {
    PaymentKey(PaymentKeyHash),
    Script(ScriptHash),
}

impl ShelleyPaymentPart {
    /// Get a reference to the inner hash of this address part
    pub fn as_hash(&self) -> &Hash<28> {
        match self {
            Self::PaymentKey(x) => x,
            Self::Script(x) => x,
        }
    }

    /// Encodes this address as a sequence of bytes
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_hash().to_vec()
    }

    /// Indicates if this is the hash of a script
    pub fn is_script(&self) -> bool {
        matches!(self, Self::Script(_))
    }
}

/// The delegation part of a Shelley address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShelleyDelegationPart {
    StakeKey(StakeKeyHash),
    Script(ScriptHash),
    Pointer(Pointer),
    Null,
}

impl ShelleyDelegationPart {
    /// Get a reference to the inner hash of this address part, if it has one
    pub fn as_hash(&self) -> Option<&Hash<28>> {
        match self {
            Self::StakeKey(x) => Some(x),
            Self::Script(x) => Some(x),
            Self::Pointer(_) | Self::Null => None,
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            Self::StakeKey(x) => x.to_vec(),
            Self::Script(x) => x.to_vec(),
            Self::Pointer(x) => x.to_vec(),
            Self::Null => vec![],
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, ShelleyDelegationPart::Script(_))
    }
}

/// The payload of a Stake address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
// Script must stay the first variant: the ledger sorts reward accounts with
// script credentials before key credentials.
pub enum StakePayload {
    Script(ScriptHash),
    Stake(StakeKeyHash),
}

impl StakePayload {
    pub fn as_hash(&self) -> &Hash<28> {
        match self {
            Self::Stake(x) => x,
            Self::Script(x) => x,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, StakePayload::Script(_))
    }
}

impl AsRef<[u8]> for StakePayload {
    fn as_ref(&self) -> &[u8] {
        self.as_hash().as_ref()
    }
}

/// The network tag of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Network {
    Testnet,
    Mainnet,
    Other(u8),
}

impl Network {
    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::Mainnet)
    }

    pub fn value(&self) -> u8 {
        match self {
            Network::Testnet => 0,
            Network::Mainnet => 1,
            Network::Other(x) => *x,
        }
    }
}

impl From<u8> for Network {
    fn from(value: u8) -> Self {
        match value {
            0 => Network::Testnet,
            1 => Network::Mainnet,
            x => Network::Other(x),
        }
    }
}

/// A decoded Shelley address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShelleyAddress(Network, ShelleyPaymentPart, ShelleyDelegationPart);

/// A decoded Stake address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StakeAddress(Network, StakePayload);

/// Newtype representing a Byron address
///
/// Byron addresses are kept as the opaque bytes found on chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByronAddress(Vec<u8>);

/// A decoded Cardano address of any type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    Byron(ByronAddress),
    Shelley(ShelleyAddress),
    Stake(StakeAddress),
}

/// Encodes raw bytes as bech32 under the given human-readable part
pub fn encode_bech32(bytes: &[u8], hrp: &str) -> Result<String, Error> {
    let base32 = bech32::ToBase32::to_base32(&bytes);
    bech32::encode(hrp, base32, bech32::Variant::Bech32).map_err(Error::BadBech32)
}

/// Decodes a bech32 string into its human-readable part and raw bytes
pub fn decode_bech32(bech32: &str) -> Result<(String, Vec<u8>), Error> {
    let (hrp, data, _) = bech32::decode(bech32).map_err(Error::BadBech32)?;
    let base10 = bech32::FromBase32::from_base32(&data).map_err(Error::BadBech32)?;
    Ok((hrp, base10))
}

/// Encodes a credential hash (key hash, script hash, pool id) as bech32
///
/// ```
/// use tessera_addresses::{encode_hash, hrp};
///
/// let pool = "abacadaba9f12a8b5382fc370e4e7e69421fb59831bb4ecca3a11d9b".parse().unwrap();
///
/// assert_eq!(
///     encode_hash(&pool, hrp::POOL).unwrap(),
///     "pool14wk2m2af7y4gk5uzlsmsunn7d9ppldvcxxa5an9r5ywek8330fg"
/// );
/// ```
pub fn encode_hash(hash: &Hash<28>, hrp: &str) -> Result<String, Error> {
    encode_bech32(hash.as_ref(), hrp)
}

/// Decodes a bech32 credential hash, returning its human-readable part
pub fn decode_hash(bech32: &str) -> Result<(String, Hash<28>), Error> {
    let (hrp, bytes) = decode_bech32(bech32)?;
    let hash = Hash::try_from(bytes.as_slice()).map_err(|_| Error::InvalidHashSize(bytes.len()))?;

    Ok((hrp, hash))
}

/// Decodes a bech32 credential hash that must carry a specific prefix
pub fn decode_hash_with_hrp(bech32: &str, expected: &str) -> Result<Hash<28>, Error> {
    let (found, hash) = decode_hash(bech32)?;

    if found != expected {
        return Err(Error::UnexpectedHrp {
            expected: expected.to_owned(),
            found,
        });
    }

    Ok(hash)
}

fn parse_network(header: u8) -> Network {
    Network::from(header & 0b0000_1111)
}

macro_rules! parse_shelley_fn {
    ($name:ident, $payment:ident, pointer) => {
        fn $name(header: u8, payload: &[u8]) -> Result<Address, Error> {
            let net = parse_network(header);
            let (p1, rest) = split_hash(payload)?;
            let p2 = ShelleyDelegationPart::Pointer(Pointer::parse(rest)?);
            let addr = ShelleyAddress(net, ShelleyPaymentPart::$payment(p1), p2);

            Ok(addr.into())
        }
    };
    ($name:ident, $payment:ident, $delegation:ident) => {
        fn $name(header: u8, payload: &[u8]) -> Result<Address, Error> {
            let net = parse_network(header);
            let (p1, rest) = split_hash(payload)?;
            let p2 = ShelleyDelegationPart::$delegation(exact_hash(rest)?);
            let addr = ShelleyAddress(net, ShelleyPaymentPart::$payment(p1), p2);

            Ok(addr.into())
        }
    };
    ($name:ident, $payment:ident) => {
        fn $name(header: u8, payload: &[u8]) -> Result<Address, Error> {
            let net = parse_network(header);
            let p1 = exact_hash(payload)?;
            let addr = ShelleyAddress(
                net,
                ShelleyPaymentPart::$payment(p1),
                ShelleyDelegationPart::Null,
            );

            Ok(addr.into())
        }
    };
}

macro_rules! parse_stake_fn {
    ($name:ident, $type:ident) => {
        fn $name(header: u8, payload: &[u8]) -> Result<Address, Error> {
            let net = parse_network(header);
            let p1 = StakePayload::$type(exact_hash(payload)?);
            let addr = StakeAddress(net, p1);

            Ok(addr.into())
        }
    };
}

// types 0-7 are Shelley addresses
parse_shelley_fn!(parse_type_0, PaymentKey, StakeKey);
parse_shelley_fn!(parse_type_1, Script, StakeKey);
parse_shelley_fn!(parse_type_2, PaymentKey, Script);
parse_shelley_fn!(parse_type_3, Script, Script);
parse_shelley_fn!(parse_type_4, PaymentKey, pointer);
parse_shelley_fn!(parse_type_5, Script, pointer);
parse_shelley_fn!(parse_type_6, PaymentKey);
parse_shelley_fn!(parse_type_7, Script);

// type 8 (1000) are Byron addresses
fn parse_type_8(header: u8, payload: &[u8]) -> Result<Address, Error> {
    let vec = [&[header], payload].concat();
    Ok(Address::Byron(ByronAddress(vec)))
}

// types 14-15 are Stake addresses
parse_stake_fn!(parse_type_14, Stake);
parse_stake_fn!(parse_type_15, Script);

fn bytes_to_address(bytes: &[u8]) -> Result<Address, Error> {
    let (&header, payload) = bytes.split_first().ok_or(Error::MissingHeader)?;

    match header & 0b1111_0000 {
        0b0000_0000 => parse_type_0(header, payload),
        0b0001_0000 => parse_type_1(header, payload),
        0b0010_0000 => parse_type_2(header, payload),
        0b0011_0000 => parse_type_3(header, payload),
        0b0100_0000 => parse_type_4(header, payload),
        0b0101_0000 => parse_type_5(header, payload),
        0b0110_0000 => parse_type_6(header, payload),
        0b0111_0000 => parse_type_7(header, payload),
        0b1000_0000 => parse_type_8(header, payload),
        0b1110_0000 => parse_type_14(header, payload),
        0b1111_0000 => parse_type_15(header, payload),
        _ => Err(Error::InvalidHeader(header)),
    }
}

impl ByronAddress {
    pub fn new(bytes: Vec<u8>) -> Self {
        ByronAddress(bytes)
    }

    /// Gets a numeric id describing the type of the address
    pub fn typeid(&self) -> u8 {
        0b1000
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.clone()
    }
}

impl ShelleyAddress {
    pub fn new(
        network: Network,
        payment: ShelleyPaymentPart,
        delegation: ShelleyDelegationPart,
    ) -> Self {
        ShelleyAddress(network, payment, delegation)
    }

    /// Gets the network assoaciated with this address
    pub fn network(&self) -> Network {
        self.0
    }

    /// Gets a numeric id describing the type of the address
    pub fn typeid(&self) -> u8 {
        match (&self.1, &self.2) {
            (ShelleyPaymentPart::PaymentKey(_), ShelleyDelegationPart::StakeKey(_)) => 0b0000,
            (ShelleyPaymentPart::Script(_), ShelleyDelegationPart::StakeKey(_)) => 0b0001,
            (ShelleyPaymentPart::PaymentKey(_), ShelleyDelegationPart::Script(_)) => 0b0010,
            (ShelleyPaymentPart::Script(_), ShelleyDelegationPart::Script(_)) => 0b0011,
            (ShelleyPaymentPart::PaymentKey(_), ShelleyDelegationPart::Pointer(_)) => 0b0100,
            (ShelleyPaymentPart::Script(_), ShelleyDelegationPart::Pointer(_)) => 0b0101,
            (ShelleyPaymentPart::PaymentKey(_), ShelleyDelegationPart::Null) => 0b0110,
            (ShelleyPaymentPart::Script(_), ShelleyDelegationPart::Null) => 0b0111,
        }
    }

    pub fn to_header(&self) -> u8 {
        (self.typeid() << 4) | self.0.value()
    }

    pub fn payment(&self) -> &ShelleyPaymentPart {
        &self.1
    }

    pub fn delegation(&self) -> &ShelleyDelegationPart {
        &self.2
    }

    /// Gets the bech32 human-readable-part for this address
    pub fn hrp(&self) -> Result<&'static str, Error> {
        match &self.0 {
            Network::Testnet => Ok(hrp::ADDR_TEST),
            Network::Mainnet => Ok(hrp::ADDR),
            Network::Other(x) => Err(Error::UnknownNetworkHrp(*x)),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let header = self.to_header();
        let payment = self.1.to_vec();
        let delegation = self.2.to_vec();

        [&[header], payment.as_slice(), delegation.as_slice()].concat()
    }

    /// Indicates if either the payment or delegation part is a script
    pub fn has_script(&self) -> bool {
        self.payment().is_script() || self.delegation().is_script()
    }
}

impl StakeAddress {
    pub fn new(network: Network, payload: StakePayload) -> Self {
        StakeAddress(network, payload)
    }

    /// Gets the network assoaciated with this address
    pub fn network(&self) -> Network {
        self.0
    }

    /// Gets a numeric id describing the type of the address
    pub fn typeid(&self) -> u8 {
        match &self.1 {
            StakePayload::Stake(_) => 0b1110,
            StakePayload::Script(_) => 0b1111,
        }
    }

    /// Builds the header for this address
    pub fn to_header(&self) -> u8 {
        (self.typeid() << 4) | self.0.value()
    }

    /// Gets the payload of this address
    pub fn payload(&self) -> &StakePayload {
        &self.1
    }

    /// Gets the bech32 human-readable-part for this address
    pub fn hrp(&self) -> Result<&'static str, Error> {
        match &self.0 {
            Network::Testnet => Ok(hrp::STAKE_TEST),
            Network::Mainnet => Ok(hrp::STAKE),
            Network::Other(x) => Err(Error::UnknownNetworkHrp(*x)),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        [&[self.to_header()], self.1.as_ref()].concat()
    }

    pub fn is_script(&self) -> bool {
        self.payload().is_script()
    }
}

impl Address {
    /// Parses the raw bytes of an address
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        bytes_to_address(bytes)
    }

    /// Tries to parse a bech32 address into an Address
    pub fn from_bech32(bech32: &str) -> Result<Self, Error> {
        let (_, bytes) = decode_bech32(bech32)?;
        bytes_to_address(&bytes)
    }

    /// Tries to encode an Address into a bech32 string
    pub fn to_bech32(&self) -> Result<String, Error> {
        encode_bech32(&self.to_vec(), self.hrp()?)
    }

    /// Tries to parse a hex-encoded address, the form Byron addresses lack
    /// a bech32 rendering for
    pub fn from_hex(value: &str) -> Result<Self, Error> {
        let bytes = hex::decode(value)?;
        bytes_to_address(&bytes)
    }

    /// Raw bytes of the address, as they appear inside transaction outputs
    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            Address::Byron(x) => x.to_vec(),
            Address::Shelley(x) => x.to_vec(),
            Address::Stake(x) => x.to_vec(),
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_vec())
    }

    /// Gets the network assoaciated with this address
    pub fn network(&self) -> Option<Network> {
        match self {
            Address::Byron(_) => None,
            Address::Shelley(x) => Some(x.network()),
            Address::Stake(x) => Some(x.network()),
        }
    }

    /// Gets a numeric id describing the type of the address
    pub fn typeid(&self) -> u8 {
        match self {
            Address::Byron(x) => x.typeid(),
            Address::Shelley(x) => x.typeid(),
            Address::Stake(x) => x.typeid(),
        }
    }

    /// Gets the bech32 human-readable-part for this address
    pub fn hrp(&self) -> Result<&'static str, Error> {
        match self {
            Address::Byron(_) => Err(Error::InvalidForByron),
            Address::Shelley(x) => x.hrp(),
            Address::Stake(x) => x.hrp(),
        }
    }

    /// Indicates if this is address includes a script hash
    pub fn has_script(&self) -> bool {
        match self {
            Address::Byron(_) => false,
            Address::Shelley(x) => x.has_script(),
            Address::Stake(x) => x.is_script(),
        }
    }

    /// Indicates if this is an enterpise address
    pub fn is_enterprise(&self) -> bool {
        match self {
            Address::Shelley(x) => matches!(x.delegation(), ShelleyDelegationPart::Null),
            _ => false,
        }
    }

    /// The key hash that must sign to spend from this address
    ///
    /// `None` for script-locked, Byron and stake addresses.
    pub fn payment_key_hash(&self) -> Option<&PaymentKeyHash> {
        match self {
            Address::Shelley(x) => match x.payment() {
                ShelleyPaymentPart::PaymentKey(hash) => Some(hash),
                ShelleyPaymentPart::Script(_) => None,
            },
            _ => None,
        }
    }

    /// The script hash locking outputs sent to this address
    pub fn payment_script_hash(&self) -> Option<&ScriptHash> {
        match self {
            Address::Shelley(x) => match x.payment() {
                ShelleyPaymentPart::Script(hash) => Some(hash),
                ShelleyPaymentPart::PaymentKey(_) => None,
            },
            _ => None,
        }
    }
}

impl From<ByronAddress> for Address {
    fn from(addr: ByronAddress) -> Self {
        Address::Byron(addr)
    }
}

impl From<ShelleyAddress> for Address {
    fn from(addr: ShelleyAddress) -> Self {
        Address::Shelley(addr)
    }
}

impl From<StakeAddress> for Address {
    fn from(addr: StakeAddress) -> Self {
        Address::Stake(addr)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_bech32(s)
    }
}

impl<C> minicbor::Encode<C> for Address {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.to_vec())?;
        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Address {
    fn decode(d: &mut minicbor::Decoder<'b>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let bytes = d.bytes()?;

        Address::from_bytes(bytes).map_err(|e| minicbor::decode::Error::message(e.to_string()))
    }
}

impl<C> minicbor::Encode<C> for StakeAddress {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.to_vec())?;
        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for StakeAddress {
    fn decode(d: &mut minicbor::Decoder<'b>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let bytes = d.bytes()?;

        match Address::from_bytes(bytes) {
            Ok(Address::Stake(x)) => Ok(x),
            Ok(_) => Err(minicbor::decode::Error::message(
                "expected a reward account address",
            )),
            Err(e) => Err(minicbor::decode::Error::message(e.to_string())),
        }
    }
}
