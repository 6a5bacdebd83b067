use std::fmt;
use std::str::FromStr;

use serde::de::{Error, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::Hash;

impl<const BYTES: usize> Serialize for Hash<BYTES> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct HashVisitor<const BYTES: usize>;

impl<const BYTES: usize> Visitor<'_> for HashVisitor<BYTES> {
    type Value = Hash<BYTES>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a hex string representing {BYTES} bytes")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Hash::<BYTES>::from_str(s).map_err(|_| Error::invalid_value(Unexpected::Str(s), &self))
    }
}

impl<'de, const BYTES: usize> Deserialize<'de> for Hash<BYTES> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(HashVisitor::<BYTES>)
    }
}

#[cfg(test)]
mod tests {
    use serde_test::{assert_de_tokens_error, assert_tokens, Token};

    use super::*;

    #[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
    struct PolicyEntry {
        policy: Hash<28>,
        tx: Hash<32>,
    }

    fn entry() -> PolicyEntry {
        PolicyEntry {
            policy: "276fd18711931e2c0e21430192dbeac0e458093cd9d1fcd7210f64b3"
                .parse()
                .unwrap(),
            tx: "0d8d00cdd4657ac84d82f0a56067634a7adfdf43da41cb534bcaa45060973d21"
                .parse()
                .unwrap(),
        }
    }

    #[test]
    fn output_tokens() {
        assert_tokens(
            &entry(),
            &[
                Token::Struct {
                    name: "PolicyEntry",
                    len: 2,
                },
                Token::Str("policy"),
                Token::Str("276fd18711931e2c0e21430192dbeac0e458093cd9d1fcd7210f64b3"),
                Token::Str("tx"),
                Token::Str("0d8d00cdd4657ac84d82f0a56067634a7adfdf43da41cb534bcaa45060973d21"),
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn invalid_str() {
        assert_de_tokens_error::<PolicyEntry>(
            &[
                Token::Map { len: Some(2) },
                Token::Str("policy"),
                Token::Str("27"),
            ],
            "invalid value: string \"27\", expected a hex string representing 28 bytes",
        );
    }

    #[test]
    fn json_round_trip() {
        let json = serde_json::to_string(&entry()).unwrap();
        let back: PolicyEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry());
    }
}
