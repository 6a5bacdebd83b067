//! Ledger records are cbor maps keyed by small unsigned integers. Each record
//! declares its keys once, as a [`RecordField`] table built with
//! [`record_fields!`], and both its encoder and its decoder go through that
//! table. Keys that the ledger defines but this library refuses to handle are
//! listed in the same table as unsupported, so decoding them fails with an
//! error that names the field.

use std::{collections::BTreeSet, fmt::Debug};

use minicbor::{data::Type, decode::Error, Decoder};

/// Outcome of looking a wire key up in a record table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLookup<F> {
    Known(F),
    Unsupported(&'static str),
    Unknown,
}

/// Bidirectional key table of a map-encoded record
pub trait RecordField: Copy + Ord + Debug + 'static {
    /// Name of the record, used in error messages
    const RECORD: &'static str;

    /// Every field this library can encode and decode, in canonical order
    const FIELDS: &'static [Self];

    /// Keys the ledger defines that this library rejects
    const UNSUPPORTED: &'static [(u64, &'static str)];

    fn key(self) -> u64;

    fn label(self) -> &'static str;

    fn lookup(key: u64) -> FieldLookup<Self> {
        if let Some(field) = Self::FIELDS.iter().copied().find(|f| f.key() == key) {
            return FieldLookup::Known(field);
        }

        match Self::UNSUPPORTED.iter().find(|(k, _)| *k == key) {
            Some((_, label)) => FieldLookup::Unsupported(label),
            None => FieldLookup::Unknown,
        }
    }
}

/// Declares a [`RecordField`] table
///
/// ```
/// tessera_codec::record_fields! {
///     /// Keys of a toy record
///     pub enum ToyField in "toy" {
///         Name = 0 => "name",
///         Age = 1 => "age",
///     }
///     unsupported {
///         7 => "legacy",
///     }
/// }
///
/// use tessera_codec::record::{FieldLookup, RecordField};
///
/// assert_eq!(ToyField::Age.key(), 1);
/// assert_eq!(ToyField::lookup(0), FieldLookup::Known(ToyField::Name));
/// assert_eq!(ToyField::lookup(7), FieldLookup::Unsupported("legacy"));
/// ```
#[macro_export]
macro_rules! record_fields {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident in $record:literal {
            $( $variant:ident = $key:literal => $label:literal ),+ $(,)?
        }
        $( unsupported {
            $( $ukey:literal => $ulabel:literal ),* $(,)?
        } )?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis enum $name {
            $( $variant, )+
        }

        impl $crate::record::RecordField for $name {
            const RECORD: &'static str = $record;

            const FIELDS: &'static [Self] = &[ $( $name::$variant, )+ ];

            const UNSUPPORTED: &'static [(u64, &'static str)] = &[ $( $( ($ukey, $ulabel), )* )? ];

            fn key(self) -> u64 {
                match self {
                    $( $name::$variant => $key, )+
                }
            }

            fn label(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }
        }
    };
}

/// Counts the fields that will be written for a record
pub fn present(flags: &[bool]) -> u64 {
    flags.iter().filter(|x| **x).count() as u64
}

/// Writes the key of a field
pub fn write_key<F, W>(
    e: &mut minicbor::Encoder<W>,
    field: F,
) -> Result<(), minicbor::encode::Error<W::Error>>
where
    F: RecordField,
    W: minicbor::encode::Write,
{
    e.u64(field.key())?;
    Ok(())
}

/// Writes a field and its value, skipping absent optional fields
pub fn write_field<F, T, C, W>(
    e: &mut minicbor::Encoder<W>,
    field: F,
    value: Option<&T>,
    ctx: &mut C,
) -> Result<(), minicbor::encode::Error<W::Error>>
where
    F: RecordField,
    T: minicbor::Encode<C> + ?Sized,
    W: minicbor::encode::Write,
{
    if let Some(value) = value {
        write_key(e, field)?;
        e.encode_with(value, ctx)?;
    }

    Ok(())
}

/// Reads the keys of a map-encoded record, one field at a time
///
/// Works for both definite and indefinite maps. Each key is checked against
/// the record table: duplicates, unknown keys and unsupported keys are all
/// decoding errors.
pub struct MapRecord<F> {
    remaining: Option<u64>,
    seen: BTreeSet<F>,
}

impl<F: RecordField> MapRecord<F> {
    pub fn begin(d: &mut Decoder<'_>) -> Result<Self, Error> {
        let remaining = d.map()?;

        Ok(Self {
            remaining,
            seen: BTreeSet::new(),
        })
    }

    /// Returns the next field, leaving the decoder positioned on its value
    pub fn next_field(&mut self, d: &mut Decoder<'_>) -> Result<Option<F>, Error> {
        match self.remaining.as_mut() {
            Some(0) => return Ok(None),
            Some(n) => *n -= 1,
            None => {
                if d.datatype()? == Type::Break {
                    d.skip()?;
                    return Ok(None);
                }
            }
        }

        let key = d.u64()?;

        match F::lookup(key) {
            FieldLookup::Known(field) => {
                if !self.seen.insert(field) {
                    return Err(Error::message(format!(
                        "{} must not contain duplicate keys, found `{}` ({key}) twice",
                        F::RECORD,
                        field.label(),
                    )));
                }

                Ok(Some(field))
            }
            FieldLookup::Unsupported(label) => Err(Error::message(format!(
                "{} field `{label}` ({key}) is not supported",
                F::RECORD
            ))),
            FieldLookup::Unknown => Err(Error::message(format!(
                "unexpected key {key} in {}",
                F::RECORD
            ))),
        }
    }

    /// Unwraps a field the record can't do without
    pub fn required<T>(field: F, value: Option<T>) -> Result<T, Error> {
        value.ok_or_else(|| {
            Error::message(format!(
                "{} is missing required field `{}` ({})",
                F::RECORD,
                field.label(),
                field.key()
            ))
        })
    }
}
