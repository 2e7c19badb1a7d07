use std::fmt;

use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer,
};

/// Reads numbers written by the hex serializers: plain integers, or strings like `0x7b0`,
/// `0b101` and `42`.
pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        deserializer.deserialize_any(U32OrHexVisitor)
    } else {
        u32::deserialize(deserializer)
    }
}

/// [`deserialize`] for optional numbers.
pub(crate) fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Number(#[serde(deserialize_with = "deserialize")] u32);

    Ok(Option::<Number>::deserialize(deserializer)?.map(|Number(value)| value))
}

struct U32OrHexVisitor;

impl Visitor<'_> for U32OrHexVisitor {
    type Value = u32;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a 32 bit unsigned integer or a string like `0x1f`")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u32, E> {
        u32::try_from(value).map_err(|_| E::invalid_value(de::Unexpected::Unsigned(value), &self))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u32, E> {
        u32::try_from(value).map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u32, E> {
        parse_int::parse::<u32>(value)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}
