//! # commerce-fulfillment
//!
//! Commerce fulfillment engine for an artist marketplace: checkout with
//! race-free stock reservation, payment intents, signed payment webhooks,
//! ticket issuance with seat labels, one-time redemption scans, and a
//! best-effort real-time status mirror.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)      Payment processor
//!     │                               │ webhooks
//!     ├── REST Handlers (api/) ◄──────┘
//!     ├── WS status channel (ws/)
//!     │
//!     ├── CommerceService (service/)
//!     │     ├── PaymentBroker (payment/) ──► processor API
//!     │     └── StatusPublisher (sync/) ──► EventBus, HTTP mirror
//!     │
//!     └── CommerceStore (store/): PostgreSQL or in-process
//! ```
//!
//! The relational store is the only source of truth. Every stock,
//! payment, and redemption transition is a single transaction there;
//! the status mirror is written after commit and may lag or fail.

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod payment;
pub mod service;
pub mod store;
pub mod sync;
pub mod webhook;
pub mod ws;
