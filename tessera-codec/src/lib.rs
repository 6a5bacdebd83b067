/// Shared re-export of minicbor lib across all Tessera
pub use minicbor;

/// Round-trip friendly common helper structs
pub mod utils;

/// Explicit key tables for ledger records encoded as integer-keyed maps
pub mod record;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cbor decoding failed: {0}")]
    Decode(#[from] minicbor::decode::Error),

    #[error("cbor encoding failed: {0}")]
    Encode(String),
}

/// A value that can be moved in and out of its standalone cbor form
pub trait Fragment: Sized {
    fn encode_fragment(&self) -> Result<Vec<u8>, Error>;
    fn decode_fragment(bytes: &[u8]) -> Result<Self, Error>;
}

impl<T> Fragment for T
where
    T: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()>,
{
    fn encode_fragment(&self) -> Result<Vec<u8>, Error> {
        minicbor::to_vec(self).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode_fragment(bytes: &[u8]) -> Result<Self, Error> {
        minicbor::decode(bytes).map_err(Error::from)
    }
}

#[macro_export]
macro_rules! codec_by_datatype {
    (
        $enum_name:ident $( < $lifetime:lifetime > )?,
        $( $( $cbortype:ident )|* => $one_f:ident ),*,
        ($( $( $vars:ident ),+ => $many_f:ident )?)
    ) => {
        impl<$( $lifetime, )? '__b $(:$lifetime)?,  C> minicbor::decode::Decode<'__b, C> for $enum_name $(<$lifetime>)? {
            fn decode(d: &mut minicbor::Decoder<'__b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
                match d.datatype()? {
                    $( minicbor::data::Type::Array => {
                        d.array()?;
                        // Using the identifiers trivially to ensure repetition.
                        Ok($enum_name::$many_f($({ let $vars = d.decode_with(ctx)?; $vars }, )+ ))
                    }, )?
                    $( $( minicbor::data::Type::$cbortype )|* => Ok($enum_name::$one_f(d.decode_with(ctx)?)), )*
                    other => Err(minicbor::decode::Error::message(format!(
                        "unexpected cbor data type {} for {}",
                        other,
                        stringify!($enum_name),
                    ))),
                }
            }
        }

        impl< $( $lifetime, )? C> minicbor::encode::Encode<C> for $enum_name $(<$lifetime>)?  {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                ctx: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                match self {
                    $( $enum_name::$many_f ($( $vars ),+) => {
                        e.array(2)?;
                        $( e.encode_with($vars, ctx)?; )+
                    }, )?
                    $( $enum_name::$one_f(__inner) => {
                        e.encode_with(__inner, ctx)?;
                    } )*
                };

                Ok(())
            }
        }
    }
}
