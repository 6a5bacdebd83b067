use tessera_codec::minicbor::{self, Encode};
use tessera_crypto::hash::{Hash, Hasher};
use tessera_primitives::{EncodeError, Language, PlutusData, Redeemers, Set};

use crate::CostModel;

/// Cost model of one language, as hashed into the script data hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageView(pub Language, pub CostModel);

impl LanguageView {
    /// Position of the view inside the canonical language views map
    ///
    /// Keys are compared by their encoded form, shortest first: V2 (`01`),
    /// V3 (`02`) and then the byte-string key of V1 (`4100`).
    fn canonical_rank(&self) -> u8 {
        match self.0 {
            Language::PlutusV2 => 0,
            Language::PlutusV3 => 1,
            Language::PlutusV1 => 2,
        }
    }

    fn encode_entry<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        match self.0 {
            // V1 keeps a historical quirk: both the key and the (indefinite)
            // parameter list are wrapped in byte strings
            Language::PlutusV1 => {
                let mut inner = minicbor::Encoder::new(vec![]);
                inner.begin_array().map_err(into_write_error)?;
                for v in self.1.iter() {
                    inner.i64(*v).map_err(into_write_error)?;
                }
                inner.end().map_err(into_write_error)?;

                e.bytes(&[0x00])?;
                e.bytes(&inner.into_writer())?;
            }
            Language::PlutusV2 => {
                e.u8(1)?;
                e.encode(&self.1)?;
            }
            Language::PlutusV3 => {
                e.u8(2)?;
                e.encode(&self.1)?;
            }
        }

        Ok(())
    }
}

fn into_write_error<E>(
    err: minicbor::encode::Error<std::convert::Infallible>,
) -> minicbor::encode::Error<E> {
    minicbor::encode::Error::message(err.to_string())
}

/// The language views map, one entry per language used by the transaction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LanguageViews(Vec<LanguageView>);

impl LanguageViews {
    pub fn new(views: impl IntoIterator<Item = LanguageView>) -> Self {
        let mut views: Vec<_> = views.into_iter().collect();
        views.sort_by_key(LanguageView::canonical_rank);
        views.dedup_by_key(|v| v.0);
        LanguageViews(views)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<C> Encode<C> for LanguageViews {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(self.0.len() as u64)?;

        for view in self.0.iter() {
            view.encode_entry(e)?;
        }

        Ok(())
    }
}

/// Inputs of the `script_data_hash` body field
#[derive(Debug, Clone)]
pub struct ScriptData {
    pub redeemers: Option<Redeemers>,
    pub datums: Option<Set<PlutusData>>,
    pub language_views: LanguageViews,
}

impl ScriptData {
    /// Whether the transaction carries anything the hash commits to
    pub fn is_empty(&self) -> bool {
        self.redeemers.as_ref().map_or(true, |r| r.is_empty()) && self.datums.is_none()
    }

    /// Blake2b-256 of `redeemers ‖ datums ‖ language views`
    ///
    /// A transaction with datums but no redeemers hashes an empty map in
    /// place of both the redeemers and the language views.
    pub fn hash(&self) -> Result<Hash<32>, EncodeError> {
        let mut buf = vec![];

        match self.redeemers.as_ref().filter(|r| !r.is_empty()) {
            Some(redeemers) => {
                minicbor::encode(redeemers, &mut buf)?;

                if let Some(datums) = &self.datums {
                    minicbor::encode(datums, &mut buf)?;
                }

                minicbor::encode(&self.language_views, &mut buf)?;
            }
            None => {
                buf.push(0xa0);

                if let Some(datums) = &self.datums {
                    minicbor::encode(datums, &mut buf)?;
                }

                buf.push(0xa0);
            }
        }

        Ok(Hasher::<256>::hash(&buf))
    }
}
