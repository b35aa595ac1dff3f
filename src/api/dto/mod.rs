//! Data Transfer Objects for REST request/response serialization.
//!
//! Amounts are integer yen. Identifiers are UUID strings; redemption
//! tokens are 64-character hex strings.

pub mod checkout_dto;
pub mod order_dto;
pub mod redemption_dto;

pub use checkout_dto::*;
pub use order_dto::*;
pub use redemption_dto::*;
