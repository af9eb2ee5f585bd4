//! Request/response DTOs for the REST surface.

pub mod auth_dto;

pub use auth_dto::{RedeemRequest, RefreshRequest, RefreshResponse, SessionResponse};
