//! # Web API Request Handlers

pub mod health;
pub mod inbox;
pub mod messages;
