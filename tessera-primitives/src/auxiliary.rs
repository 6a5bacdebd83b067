use serde::{Deserialize, Serialize};
use tessera_codec::{
    codec_by_datatype,
    minicbor::{self, data::Tag, Decode, Encode},
    record::{present, write_key, MapRecord},
    record_fields,
    utils::{Bytes, Int, KeyValuePairs},
};
use tessera_crypto::hash::{Hash, Hasher};

use crate::{EncodeError, NativeScript, PlutusV1Script, PlutusV2Script, PlutusV3Script};

/// Transaction metadata value
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum Metadatum {
    Int(Int),
    Bytes(Bytes),
    Text(String),
    Array(Vec<Metadatum>),
    Map(KeyValuePairs<Metadatum, Metadatum>),
}

codec_by_datatype! {
    Metadatum,
    U8 | U16 | U32 | U64 | I8 | I16 | I32 | I64 | Int => Int,
    Bytes => Bytes,
    String => Text,
    Array | ArrayIndef => Array,
    Map | MapIndef => Map,
    ()
}

pub type MetadatumLabel = u64;

pub type Metadata = KeyValuePairs<MetadatumLabel, Metadatum>;

#[derive(Serialize, Deserialize, Encode, Decode, Debug, PartialEq, Clone)]
pub struct ShelleyMaAuxiliaryData {
    #[n(0)]
    pub transaction_metadata: Metadata,

    #[n(1)]
    pub auxiliary_scripts: Vec<NativeScript>,
}

/// Cbor tag of the post-Alonzo auxiliary data map
const POST_ALONZO_TAG: u64 = 259;

record_fields! {
    /// Keys of the post-Alonzo auxiliary data map
    pub enum AuxField in "auxiliary data" {
        Metadata = 0 => "metadata",
        NativeScripts = 1 => "native_scripts",
        PlutusV1Scripts = 2 => "plutus_v1_scripts",
        PlutusV2Scripts = 3 => "plutus_v2_scripts",
        PlutusV3Scripts = 4 => "plutus_v3_scripts",
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct PostAlonzoAuxiliaryData {
    pub metadata: Option<Metadata>,
    pub native_scripts: Option<Vec<NativeScript>>,
    pub plutus_v1_scripts: Option<Vec<PlutusV1Script>>,
    pub plutus_v2_scripts: Option<Vec<PlutusV2Script>>,
    pub plutus_v3_scripts: Option<Vec<PlutusV3Script>>,
}

impl<C> minicbor::Encode<C> for PostAlonzoAuxiliaryData {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.tag(Tag::new(POST_ALONZO_TAG))?;
        e.map(present(&[
            self.metadata.is_some(),
            self.native_scripts.is_some(),
            self.plutus_v1_scripts.is_some(),
            self.plutus_v2_scripts.is_some(),
            self.plutus_v3_scripts.is_some(),
        ]))?;

        if let Some(x) = &self.metadata {
            write_key(e, AuxField::Metadata)?;
            e.encode_with(x, ctx)?;
        }

        if let Some(x) = &self.native_scripts {
            write_key(e, AuxField::NativeScripts)?;
            e.encode_with(x, ctx)?;
        }

        if let Some(x) = &self.plutus_v1_scripts {
            write_key(e, AuxField::PlutusV1Scripts)?;
            e.encode_with(x, ctx)?;
        }

        if let Some(x) = &self.plutus_v2_scripts {
            write_key(e, AuxField::PlutusV2Scripts)?;
            e.encode_with(x, ctx)?;
        }

        if let Some(x) = &self.plutus_v3_scripts {
            write_key(e, AuxField::PlutusV3Scripts)?;
            e.encode_with(x, ctx)?;
        }

        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for PostAlonzoAuxiliaryData {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let tag = d.tag()?;

        if tag.as_u64() != POST_ALONZO_TAG {
            return Err(minicbor::decode::Error::message(format!(
                "expected tag {POST_ALONZO_TAG} for auxiliary data, found {}",
                tag.as_u64()
            )));
        }

        let mut record = MapRecord::<AuxField>::begin(d)?;
        let mut out = PostAlonzoAuxiliaryData::default();

        while let Some(field) = record.next_field(d)? {
            match field {
                AuxField::Metadata => out.metadata = Some(d.decode_with(ctx)?),
                AuxField::NativeScripts => out.native_scripts = Some(d.decode_with(ctx)?),
                AuxField::PlutusV1Scripts => out.plutus_v1_scripts = Some(d.decode_with(ctx)?),
                AuxField::PlutusV2Scripts => out.plutus_v2_scripts = Some(d.decode_with(ctx)?),
                AuxField::PlutusV3Scripts => out.plutus_v3_scripts = Some(d.decode_with(ctx)?),
            }
        }

        Ok(out)
    }
}

/// Data attached to a transaction outside of its body
///
/// Three historical layouts exist: a bare metadata map, the Allegra/Mary
/// `[metadata, scripts]` pair and the tagged post-Alonzo map. All three
/// decode; builders produce the post-Alonzo form.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum AuxiliaryData {
    Shelley(Metadata),
    ShelleyMa(ShelleyMaAuxiliaryData),
    PostAlonzo(PostAlonzoAuxiliaryData),
}

codec_by_datatype! {
    AuxiliaryData,
    Map | MapIndef => Shelley,
    Array | ArrayIndef => ShelleyMa,
    Tag => PostAlonzo,
    ()
}

impl AuxiliaryData {
    /// Post-Alonzo auxiliary data holding only metadata
    pub fn from_metadata(metadata: Metadata) -> Self {
        AuxiliaryData::PostAlonzo(PostAlonzoAuxiliaryData {
            metadata: Some(metadata),
            ..Default::default()
        })
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            AuxiliaryData::Shelley(x) => Some(x),
            AuxiliaryData::ShelleyMa(x) => Some(&x.transaction_metadata),
            AuxiliaryData::PostAlonzo(x) => x.metadata.as_ref(),
        }
    }

    /// Hash referenced by the `auxiliary_data_hash` field of the body
    pub fn hash(&self) -> Result<Hash<32>, EncodeError> {
        Hasher::<256>::hash_cbor(self)
    }
}
