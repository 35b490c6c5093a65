//! Data Transfer Objects for REST request/response serialization.

pub mod invitation_dto;
pub mod moderation_dto;
pub mod review_dto;
pub mod webhook_dto;

pub use invitation_dto::*;
pub use moderation_dto::*;
pub use review_dto::*;
pub use webhook_dto::*;
