//! # review-engine
//!
//! Review lifecycle engine shared by several business verticals: rating
//! aggregation, moderation, helpfulness ranking, signed webhook delivery
//! and delayed review invitations.
//!
//! Five review families (commerce, agro, services, course, mentoring) store
//! the same concepts under different column names. The schema adapter in
//! [`domain::review_kind`] maps them onto one shape so every service works
//! on all of them.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── Aggregation / Moderation / Helpfulness (service/)
//!     ├── Webhook / Invitation services (service/)
//!     ├── EventBus ──► webhook forwarder (service/worker)
//!     │
//!     ├── Schema adapter, records, events (domain/)
//!     │
//!     └── Storage traits ──► in-memory | PostgreSQL (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
