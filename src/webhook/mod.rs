//! Payment notification intake: signature verification and payload decoding.
//!
//! The HTTP handler verifies the signature over the raw body before any
//! JSON parsing, then hands the decoded notification to
//! [`crate::service::CommerceService::handle_payment_notification`].

pub mod notification;
pub mod signature;

pub use notification::{NotificationKind, PaymentNotification};
pub use signature::{SIGNATURE_HEADER, SignatureVerifier};
