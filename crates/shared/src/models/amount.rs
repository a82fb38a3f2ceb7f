//! Monetary values travel as decimal strings so clients in any language can
//! read them without a big-integer JSON extension. Plain JSON numbers are
//! accepted on input for convenience.

use alloy::primitives::U256;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use std::str::FromStr;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Number(u64),
}

fn parse(raw: RawAmount) -> Result<U256, String> {
    match raw {
        RawAmount::Text(s) => U256::from_str(s.trim()).map_err(|e| format!("invalid amount {s}: {e}")),
        RawAmount::Number(n) => Ok(U256::from(n)),
    }
}

pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    parse(RawAmount::deserialize(deserializer)?).map_err(D::Error::custom)
}

pub mod option {
    use super::{parse, RawAmount};
    use alloy::primitives::U256;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawAmount>::deserialize(deserializer)? {
            Some(raw) => parse(raw).map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}
