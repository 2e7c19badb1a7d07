mod hex_option;
mod hex_u_int;
mod serialize_u_int;
mod u32_or_hex;

pub(crate) use hex_option::serialize as hex_option;
pub(crate) use hex_u_int::serialize as hex_u_int;
pub(crate) use u32_or_hex::deserialize as u32_or_hex;
pub(crate) use u32_or_hex::deserialize_option as option_u32_or_hex;
