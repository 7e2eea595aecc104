use serde::{Deserialize, Serialize};

/// Lifecycle of a pairing request.
///
/// PENDING -> ACCEPTED | REJECTED; immutable once resolved. At most one
/// ACCEPTED pairing may exist per user, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PairingStatus {
    Pending,
    Accepted,
    Rejected,
}

impl PairingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "ACCEPTED" => Some(Self::Accepted),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}
