use serde::{Deserialize, Serialize};
use tessera_addresses::StakePayload;
use tessera_codec::{
    minicbor,
    utils::{Nullable, Set},
};
use tessera_crypto::hash::Hash;

use crate::{
    end_array, expect_len, AddrKeyhash, Coin, Epoch, PoolKeyhash, RewardAccount, ScriptHash,
    UnitInterval,
};

/// Credential controlling a stake right
///
/// Encodes as `[0, addr_keyhash] / [1, script_hash]`.
#[derive(Serialize, Deserialize, Debug, PartialEq, PartialOrd, Eq, Ord, Clone, Hash)]
// ScriptHash must stay the first variant: maps keyed by credentials order
// scripts before keys.
pub enum StakeCredential {
    ScriptHash(ScriptHash),
    AddrKeyhash(AddrKeyhash),
}

impl StakeCredential {
    pub fn as_hash(&self) -> &Hash<28> {
        match self {
            StakeCredential::ScriptHash(x) => x,
            StakeCredential::AddrKeyhash(x) => x,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, StakeCredential::ScriptHash(_))
    }
}

impl From<&StakePayload> for StakeCredential {
    fn from(value: &StakePayload) -> Self {
        match value {
            StakePayload::Stake(x) => StakeCredential::AddrKeyhash(*x),
            StakePayload::Script(x) => StakeCredential::ScriptHash(*x),
        }
    }
}

impl From<&RewardAccount> for StakeCredential {
    fn from(value: &RewardAccount) -> Self {
        StakeCredential::from(value.payload())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for StakeCredential {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;
        expect_len(len, 2, "stake credential")?;

        let credential = match d.u8()? {
            0 => StakeCredential::AddrKeyhash(d.decode_with(ctx)?),
            1 => StakeCredential::ScriptHash(d.decode_with(ctx)?),
            x => {
                return Err(minicbor::decode::Error::message(format!(
                    "invalid stake credential variant {x}"
                )))
            }
        };

        end_array(d, len)?;

        Ok(credential)
    }
}

impl<C> minicbor::Encode<C> for StakeCredential {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            StakeCredential::AddrKeyhash(x) => e.encode_with((0, x), ctx)?,
            StakeCredential::ScriptHash(x) => e.encode_with((1, x), ctx)?,
        };

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub enum DRep {
    Key(AddrKeyhash),
    Script(ScriptHash),
    Abstain,
    NoConfidence,
}

impl<'b, C> minicbor::Decode<'b, C> for DRep {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;

        let drep = match d.u8()? {
            0 => DRep::Key(d.decode_with(ctx)?),
            1 => DRep::Script(d.decode_with(ctx)?),
            2 => DRep::Abstain,
            3 => DRep::NoConfidence,
            x => {
                return Err(minicbor::decode::Error::message(format!(
                    "invalid drep variant {x}"
                )))
            }
        };

        end_array(d, len)?;

        Ok(drep)
    }
}

impl<C> minicbor::Encode<C> for DRep {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            DRep::Key(x) => e.encode_with((0, x), ctx)?,
            DRep::Script(x) => e.encode_with((1, x), ctx)?,
            DRep::Abstain => e.encode_with([2], ctx)?,
            DRep::NoConfidence => e.encode_with([3], ctx)?,
        };

        Ok(())
    }
}

pub type Port = u32;

pub type IPv4 = tessera_codec::utils::Bytes;

pub type IPv6 = tessera_codec::utils::Bytes;

pub type DnsName = String;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum Relay {
    SingleHostAddr(Nullable<Port>, Nullable<IPv4>, Nullable<IPv6>),
    SingleHostName(Nullable<Port>, DnsName),
    MultiHostName(DnsName),
}

impl<'b, C> minicbor::decode::Decode<'b, C> for Relay {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;

        let relay = match d.u16()? {
            0 => Relay::SingleHostAddr(
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
            ),
            1 => Relay::SingleHostName(d.decode_with(ctx)?, d.decode_with(ctx)?),
            2 => Relay::MultiHostName(d.decode_with(ctx)?),
            _ => {
                return Err(minicbor::decode::Error::message(
                    "invalid variant id for Relay",
                ))
            }
        };

        end_array(d, len)?;

        Ok(relay)
    }
}

impl<C> minicbor::encode::Encode<C> for Relay {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            Relay::SingleHostAddr(a, b, c) => {
                e.array(4)?;
                e.encode_with(0, ctx)?;
                e.encode_with(a, ctx)?;
                e.encode_with(b, ctx)?;
                e.encode_with(c, ctx)?;
            }
            Relay::SingleHostName(a, b) => {
                e.array(3)?;
                e.encode_with(1, ctx)?;
                e.encode_with(a, ctx)?;
                e.encode_with(b, ctx)?;
            }
            Relay::MultiHostName(a) => {
                e.array(2)?;
                e.encode_with(2, ctx)?;
                e.encode_with(a, ctx)?;
            }
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct PoolMetadata {
    pub url: String,
    pub hash: Hash<32>,
}

impl<'b, C> minicbor::Decode<'b, C> for PoolMetadata {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;
        expect_len(len, 2, "pool metadata")?;

        let metadata = PoolMetadata {
            url: d.decode_with(ctx)?,
            hash: d.decode_with(ctx)?,
        };

        end_array(d, len)?;

        Ok(metadata)
    }
}

impl<C> minicbor::Encode<C> for PoolMetadata {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.encode_with((&self.url, &self.hash), ctx)?;
        Ok(())
    }
}

/// Certificate kinds the ledger defines but this library rejects
const UNSUPPORTED_CERTIFICATES: &[(u64, &str)] = &[
    (5, "genesis key delegation"),
    (6, "move instantaneous rewards"),
    (14, "committee hot key authorization"),
    (15, "committee cold key resignation"),
    (16, "drep registration"),
    (17, "drep deregistration"),
    (18, "drep update"),
];

/// Stake and pool certificates
///
/// Stake, pool and vote delegation certificates are supported. Genesis
/// delegation, MIR and the committee and DRep certificates have no
/// representation here, so they fail to decode and can't be built.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Certificate {
    StakeRegistration(StakeCredential),
    StakeDeregistration(StakeCredential),
    StakeDelegation(StakeCredential, PoolKeyhash),
    PoolRegistration {
        operator: PoolKeyhash,
        vrf_keyhash: Hash<32>,
        pledge: Coin,
        cost: Coin,
        margin: UnitInterval,
        reward_account: RewardAccount,
        pool_owners: Set<AddrKeyhash>,
        relays: Vec<Relay>,
        pool_metadata: Nullable<PoolMetadata>,
    },
    PoolRetirement(PoolKeyhash, Epoch),
    Reg(StakeCredential, Coin),
    UnReg(StakeCredential, Coin),
    VoteDeleg(StakeCredential, DRep),
    StakeVoteDeleg(StakeCredential, PoolKeyhash, DRep),
    StakeRegDeleg(StakeCredential, PoolKeyhash, Coin),
    VoteRegDeleg(StakeCredential, DRep, Coin),
    StakeVoteRegDeleg(StakeCredential, PoolKeyhash, DRep, Coin),
}

impl Certificate {
    /// Wire tag of the certificate
    pub fn kind(&self) -> u64 {
        match self {
            Certificate::StakeRegistration(..) => 0,
            Certificate::StakeDeregistration(..) => 1,
            Certificate::StakeDelegation(..) => 2,
            Certificate::PoolRegistration { .. } => 3,
            Certificate::PoolRetirement(..) => 4,
            Certificate::Reg(..) => 7,
            Certificate::UnReg(..) => 8,
            Certificate::VoteDeleg(..) => 9,
            Certificate::StakeVoteDeleg(..) => 10,
            Certificate::StakeRegDeleg(..) => 11,
            Certificate::VoteRegDeleg(..) => 12,
            Certificate::StakeVoteRegDeleg(..) => 13,
        }
    }

    /// Stake credential whose witness the certificate requires, if any
    ///
    /// Plain registrations (kind 0) don't need a witness.
    pub fn witness_credential(&self) -> Option<&StakeCredential> {
        match self {
            Certificate::StakeRegistration(_)
            | Certificate::PoolRegistration { .. }
            | Certificate::PoolRetirement(..) => None,
            Certificate::StakeDeregistration(x)
            | Certificate::StakeDelegation(x, _)
            | Certificate::Reg(x, _)
            | Certificate::UnReg(x, _)
            | Certificate::VoteDeleg(x, _)
            | Certificate::StakeVoteDeleg(x, _, _)
            | Certificate::StakeRegDeleg(x, _, _)
            | Certificate::VoteRegDeleg(x, _, _)
            | Certificate::StakeVoteRegDeleg(x, _, _, _) => Some(x),
        }
    }

    /// Deposit locked by the certificate, given the stake key deposit
    pub fn deposit(&self, key_deposit: Coin) -> Coin {
        match self {
            Certificate::StakeRegistration(_) => key_deposit,
            Certificate::Reg(_, x)
            | Certificate::StakeRegDeleg(_, _, x)
            | Certificate::VoteRegDeleg(_, _, x)
            | Certificate::StakeVoteRegDeleg(_, _, _, x) => *x,
            _ => 0,
        }
    }

    /// Deposit released by the certificate, given the stake key deposit
    pub fn refund(&self, key_deposit: Coin) -> Coin {
        match self {
            Certificate::StakeDeregistration(_) => key_deposit,
            Certificate::UnReg(_, x) => *x,
            _ => 0,
        }
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Certificate {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;
        let kind = d.u64()?;

        let certificate = match kind {
            0 => Certificate::StakeRegistration(d.decode_with(ctx)?),
            1 => Certificate::StakeDeregistration(d.decode_with(ctx)?),
            2 => Certificate::StakeDelegation(d.decode_with(ctx)?, d.decode_with(ctx)?),
            3 => Certificate::PoolRegistration {
                operator: d.decode_with(ctx)?,
                vrf_keyhash: d.decode_with(ctx)?,
                pledge: d.decode_with(ctx)?,
                cost: d.decode_with(ctx)?,
                margin: d.decode_with(ctx)?,
                reward_account: d.decode_with(ctx)?,
                pool_owners: d.decode_with(ctx)?,
                relays: d.decode_with(ctx)?,
                pool_metadata: d.decode_with(ctx)?,
            },
            4 => Certificate::PoolRetirement(d.decode_with(ctx)?, d.decode_with(ctx)?),
            7 => Certificate::Reg(d.decode_with(ctx)?, d.decode_with(ctx)?),
            8 => Certificate::UnReg(d.decode_with(ctx)?, d.decode_with(ctx)?),
            9 => Certificate::VoteDeleg(d.decode_with(ctx)?, d.decode_with(ctx)?),
            10 => Certificate::StakeVoteDeleg(
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
            ),
            11 => Certificate::StakeRegDeleg(
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
            ),
            12 => Certificate::VoteRegDeleg(
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
            ),
            13 => Certificate::StakeVoteRegDeleg(
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
                d.decode_with(ctx)?,
            ),
            other => {
                return Err(
                    match UNSUPPORTED_CERTIFICATES.iter().find(|(k, _)| *k == other) {
                        Some((_, label)) => minicbor::decode::Error::message(format!(
                            "certificate kind {other} ({label}) is not supported"
                        )),
                        None => minicbor::decode::Error::message(format!(
                            "unknown certificate kind {other}"
                        )),
                    },
                )
            }
        };

        end_array(d, len)?;

        Ok(certificate)
    }
}

impl<C> minicbor::Encode<C> for Certificate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        let kind = self.kind();

        match self {
            Certificate::StakeRegistration(a)
            | Certificate::StakeDeregistration(a) => {
                e.encode_with((kind, a), ctx)?;
            }
            Certificate::StakeDelegation(a, b) => {
                e.encode_with((kind, a, b), ctx)?;
            }
            Certificate::PoolRegistration {
                operator,
                vrf_keyhash,
                pledge,
                cost,
                margin,
                reward_account,
                pool_owners,
                relays,
                pool_metadata,
            } => {
                e.array(10)?;
                e.encode_with(kind, ctx)?;
                e.encode_with(operator, ctx)?;
                e.encode_with(vrf_keyhash, ctx)?;
                e.encode_with(pledge, ctx)?;
                e.encode_with(cost, ctx)?;
                e.encode_with(margin, ctx)?;
                e.encode_with(reward_account, ctx)?;
                e.encode_with(pool_owners, ctx)?;
                e.encode_with(relays, ctx)?;
                e.encode_with(pool_metadata, ctx)?;
            }
            Certificate::PoolRetirement(a, b) => {
                e.encode_with((kind, a, b), ctx)?;
            }
            Certificate::Reg(a, b) | Certificate::UnReg(a, b) => {
                e.encode_with((kind, a, b), ctx)?;
            }
            Certificate::VoteDeleg(a, b) => {
                e.encode_with((kind, a, b), ctx)?;
            }
            Certificate::StakeVoteDeleg(a, b, c) => {
                e.encode_with((kind, a, b, c), ctx)?;
            }
            Certificate::StakeRegDeleg(a, b, c) => {
                e.encode_with((kind, a, b, c), ctx)?;
            }
            Certificate::VoteRegDeleg(a, b, c) => {
                e.encode_with((kind, a, b, c), ctx)?;
            }
            Certificate::StakeVoteRegDeleg(a, b, c, f) => {
                e.encode_with((kind, a, b, c, f), ctx)?;
            }
        }

        Ok(())
    }
}
