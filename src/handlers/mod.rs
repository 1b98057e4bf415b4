//! HTTP handlers

pub mod health;
pub mod metadata;
pub mod client;
pub mod predict;
pub mod population;
