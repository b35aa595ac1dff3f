//! Payment Intent Broker and the external processor seam.
//!
//! The broker opens one processor-side payment intent per online order,
//! using the server-computed order total and attaching correlation metadata
//! so the asynchronous payment notification can be matched back to the
//! order. Cash orders never reach this module.

pub mod broker;
pub mod metadata;
pub mod processor;

pub use broker::PaymentBroker;
pub use metadata::CorrelationMetadata;
pub use processor::{
    HttpPaymentProcessor, IntentRequest, PaymentIntent, PaymentProcessor, StubBehavior,
    StubPaymentProcessor,
};
