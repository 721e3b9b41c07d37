use thiserror::Error;

use crate::id::Partition;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("ordinal {ordinal} exceeds the 28-bit ordinal range")]
    OrdinalOutOfRange { ordinal: u32 },

    #[error("no ordinals left in the {0} partition")]
    OrdinalsExhausted(Partition),

    #[error("ordinals of the {0} partition are not minted by the project")]
    NotMintable(Partition),
}
