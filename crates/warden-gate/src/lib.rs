//! Gate boundary: structured control signals and the confirm-token
//! protocol behind the confirm gate.

pub mod signal;
pub mod token;

pub use signal::{GateKind, GateSignal};
pub use token::{
    validate_resubmission, ConfirmTokenIssuer, TokenError, DEFAULT_TOKEN_TTL_MS, MIN_REASON_LEN,
};
