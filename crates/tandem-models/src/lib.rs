pub mod gateway;
pub mod message;
pub mod pairing;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque numeric user identifier, issued by the auth subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Room identifier. Equal to the id of the ACCEPTED pairing that authorizes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

/// Snowflake message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

macro_rules! id_display {
    ($($t:ty),*) => {
        $(
            impl fmt::Display for $t {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }

            impl From<i64> for $t {
                fn from(raw: i64) -> Self {
                    Self(raw)
                }
            }
        )*
    };
}

id_display!(UserId, RoomId, MessageId);
