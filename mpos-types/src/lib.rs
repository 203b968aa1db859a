//! Type definitions for mpos

pub mod authorisation;
pub mod card;
pub mod error;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use authorisation::{AuthorisationOutcome, AuthorisationRequest, GatewayResponse};
pub use card::{ApplicationType, CardData, CardType};
pub use error::{Error, Result};
