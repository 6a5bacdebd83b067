use serde::{Deserialize, Serialize};
use tessera_codec::{
    minicbor::{self, Decode, Encode},
    utils::{CborWrap, TypedBytes},
};
use tessera_crypto::hash::Hasher;

use crate::{end_array, kind, AddrKeyhash, DatumHash, EncodeError, PlutusData, ScriptHash};

/// Multi-signature and timelock scripts evaluated by the ledger itself
///
/// ```cddl
/// native_script =
///   [ script_pubkey // script_all // script_any // script_n_of_k
///   // invalid_before // invalid_hereafter ]
/// ```
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum NativeScript {
    ScriptPubkey(AddrKeyhash),
    ScriptAll(Vec<NativeScript>),
    ScriptAny(Vec<NativeScript>),
    ScriptNOfK(u32, Vec<NativeScript>),
    InvalidBefore(u64),
    InvalidHereafter(u64),
}

impl NativeScript {
    pub fn hash(&self) -> Result<ScriptHash, EncodeError> {
        Hasher::<224>::hash_tagged_cbor(self, 0)
    }

    /// Every key hash mentioned anywhere in the script
    pub fn key_hashes(&self) -> Vec<AddrKeyhash> {
        let mut out = vec![];
        self.collect_key_hashes(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_key_hashes(&self, out: &mut Vec<AddrKeyhash>) {
        match self {
            NativeScript::ScriptPubkey(x) => out.push(*x),
            NativeScript::ScriptAll(xs)
            | NativeScript::ScriptAny(xs)
            | NativeScript::ScriptNOfK(_, xs) => {
                xs.iter().for_each(|x| x.collect_key_hashes(out))
            }
            NativeScript::InvalidBefore(_) | NativeScript::InvalidHereafter(_) => (),
        }
    }
}

impl<'b, C> minicbor::Decode<'b, C> for NativeScript {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;

        let script = match d.u8()? {
            0 => NativeScript::ScriptPubkey(d.decode_with(ctx)?),
            1 => NativeScript::ScriptAll(d.decode_with(ctx)?),
            2 => NativeScript::ScriptAny(d.decode_with(ctx)?),
            3 => NativeScript::ScriptNOfK(d.decode_with(ctx)?, d.decode_with(ctx)?),
            4 => NativeScript::InvalidBefore(d.decode_with(ctx)?),
            5 => NativeScript::InvalidHereafter(d.decode_with(ctx)?),
            x => {
                return Err(minicbor::decode::Error::message(format!(
                    "unknown native script variant {x}"
                )))
            }
        };

        end_array(d, len)?;

        Ok(script)
    }
}

impl<C> minicbor::Encode<C> for NativeScript {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            NativeScript::ScriptPubkey(x) => e.encode_with((0, x), ctx)?,
            NativeScript::ScriptAll(x) => e.encode_with((1, x), ctx)?,
            NativeScript::ScriptAny(x) => e.encode_with((2, x), ctx)?,
            NativeScript::ScriptNOfK(n, x) => e.encode_with((3, n, x), ctx)?,
            NativeScript::InvalidBefore(x) => e.encode_with((4, x), ctx)?,
            NativeScript::InvalidHereafter(x) => e.encode_with((5, x), ctx)?,
        };

        Ok(())
    }
}

#[derive(
    Serialize, Deserialize, Encode, Decode, Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash,
)]
#[cbor(index_only)]
pub enum Language {
    #[n(0)]
    PlutusV1,

    #[n(1)]
    PlutusV2,

    #[n(2)]
    PlutusV3,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::PlutusV1, Language::PlutusV2, Language::PlutusV3];

    /// Prefix byte hashed in front of scripts of this language
    pub fn hash_tag(self) -> u8 {
        match self {
            Language::PlutusV1 => 1,
            Language::PlutusV2 => 2,
            Language::PlutusV3 => 3,
        }
    }
}

/// Serialized Plutus program of a given language version
#[derive(Serialize, Deserialize, Encode, Decode, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
#[cbor(transparent)]
#[serde(transparent)]
pub struct PlutusScript<const VERSION: u8>(#[n(0)] pub TypedBytes<kind::PlutusProgram>);

impl<const VERSION: u8> PlutusScript<VERSION> {
    pub fn new(program: impl Into<Vec<u8>>) -> Self {
        Self(TypedBytes::new(program))
    }

    pub fn hash(&self) -> ScriptHash {
        Hasher::<224>::hash_tagged(self.0.as_slice(), VERSION)
    }
}

impl<const VERSION: u8> AsRef<[u8]> for PlutusScript<VERSION> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

pub type PlutusV1Script = PlutusScript<1>;

pub type PlutusV2Script = PlutusScript<2>;

pub type PlutusV3Script = PlutusScript<3>;

/// Any script that can be attached to a transaction or referenced by an output
///
/// ```cddl
/// script = [ 0, native_script // 1, plutus_v1_script
///          // 2, plutus_v2_script // 3, plutus_v3_script ]
/// ```
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum Script {
    Native(NativeScript),
    PlutusV1(PlutusV1Script),
    PlutusV2(PlutusV2Script),
    PlutusV3(PlutusV3Script),
}

impl Script {
    pub fn hash(&self) -> Result<ScriptHash, EncodeError> {
        match self {
            Script::Native(x) => x.hash(),
            Script::PlutusV1(x) => Ok(x.hash()),
            Script::PlutusV2(x) => Ok(x.hash()),
            Script::PlutusV3(x) => Ok(x.hash()),
        }
    }

    /// Plutus language of the script, `None` for native scripts
    pub fn language(&self) -> Option<Language> {
        match self {
            Script::Native(_) => None,
            Script::PlutusV1(_) => Some(Language::PlutusV1),
            Script::PlutusV2(_) => Some(Language::PlutusV2),
            Script::PlutusV3(_) => Some(Language::PlutusV3),
        }
    }
}

impl From<NativeScript> for Script {
    fn from(value: NativeScript) -> Self {
        Script::Native(value)
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Script {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;

        let script = match d.u8()? {
            0 => Script::Native(d.decode_with(ctx)?),
            1 => Script::PlutusV1(d.decode_with(ctx)?),
            2 => Script::PlutusV2(d.decode_with(ctx)?),
            3 => Script::PlutusV3(d.decode_with(ctx)?),
            x => {
                return Err(minicbor::decode::Error::message(format!(
                    "unknown script kind {x}"
                )))
            }
        };

        end_array(d, len)?;

        Ok(script)
    }
}

impl<C> minicbor::Encode<C> for Script {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            Script::Native(x) => e.encode_with((0, x), ctx)?,
            Script::PlutusV1(x) => e.encode_with((1, x), ctx)?,
            Script::PlutusV2(x) => e.encode_with((2, x), ctx)?,
            Script::PlutusV3(x) => e.encode_with((3, x), ctx)?,
        };

        Ok(())
    }
}

/// Datum attached to an output, either by hash or inline
///
/// ```cddl
/// datum_option = [ 0, hash32 // 1, data ]
/// data = #6.24(bytes .cbor plutus_data)
/// ```
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum DatumOption {
    Hash(DatumHash),
    Data(PlutusData),
}

impl DatumOption {
    /// Hash of the datum, computing it for inline data
    pub fn hash(&self) -> Result<DatumHash, EncodeError> {
        match self {
            DatumOption::Hash(x) => Ok(*x),
            DatumOption::Data(x) => x.hash(),
        }
    }
}

impl<'b, C> minicbor::Decode<'b, C> for DatumOption {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let len = d.array()?;

        let datum = match d.u8()? {
            0 => DatumOption::Hash(d.decode_with(ctx)?),
            1 => {
                let CborWrap(data): CborWrap<PlutusData> = d.decode_with(ctx)?;
                DatumOption::Data(data)
            }
            _ => {
                return Err(minicbor::decode::Error::message(
                    "invalid variant for datum option enum",
                ))
            }
        };

        end_array(d, len)?;

        Ok(datum)
    }
}

impl<C> minicbor::Encode<C> for DatumOption {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self {
            Self::Hash(x) => e.encode_with((0, x), ctx)?,
            Self::Data(x) => e.encode_with((1, CborWrap(x)), ctx)?,
        };

        Ok(())
    }
}
