//! Opaque 128-bit identifiers for kiosks, transactions, and dispense jobs.
//!
//! Ids are random 16-byte values generated through a [`Crng`], displayed and
//! serialized as lowercase hex in human-readable formats (e.g. JSON, URL path
//! segments, the `X-Kiosk-Id` header) and as raw bytes in binary codecs.

use std::{fmt, str::FromStr};

use hex::FromHex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::rng::Crng;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
        pub struct $name([u8; 16]);

        impl $name {
            pub const fn new(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            pub const fn to_bytes(self) -> [u8; 16] {
                self.0
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Generate a fresh random id.
            pub fn generate(rng: &mut (impl Crng + ?Sized)) -> Self {
                let mut bytes = [0u8; 16];
                rng.fill_bytes(&mut bytes);
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <[u8; 16]>::from_hex(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&hex::encode(self.0))
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_str(&s).map_err(de::Error::custom)
                } else {
                    <[u8; 16]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

define_id! {
    /// The stable identifier of a dispenser node, generated on the node's
    /// first boot and persisted to its one local file. Never regenerated.
    KioskId
}

define_id! {
    /// Identifies one payment-to-payout transaction.
    TransactionId
}

define_id! {
    /// Identifies one durable dispense job.
    JobId
}

/// The one-time anti-replay token produced by the identity-verification
/// system. Opaque to us: we forward it to the verifier and enforce uniqueness
/// across transactions, nothing more.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct NullifierHash(String);

impl NullifierHash {
    pub fn new(inner: String) -> Self {
        Self(inner)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NullifierHash {
    fn from(inner: String) -> Self {
        Self(inner)
    }
}
