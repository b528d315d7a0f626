use std::fmt;

use serde::{Deserialize, Serialize};

/// Ledger round number.
pub type Round = u64;

/// Unique, monotonically assigned identifier of a randomness request.
pub type RequestId = u64;

/// Defines a fixed-size byte newtype that prints and serializes as hex.
macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> ::std::string::String {
                ::hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> ::std::result::Result<Self, ::hex::FromHexError> {
                let mut bytes = [0u8; $len];
                ::hex::decode_to_slice(s.trim(), &mut bytes)?;
                Ok(Self(bytes))
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::hex::FromHexError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> ::std::result::Result<Self, D::Error> {
                let s = <::std::string::String as ::serde::Deserialize>::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(<D::Error as ::serde::de::Error>::custom)
            }
        }
    };
}

pub(crate) use hex_bytes;

hex_bytes!(
    /// 32-byte account address.
    Address,
    32
);

hex_bytes!(
    /// Per-round pseudorandom block seed, used as the VRF message.
    Seed,
    32
);

impl Address {
    /// The all-zero address. Never a valid manager.
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Application (contract) identifier. Plain accounts have no application id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub u64);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
