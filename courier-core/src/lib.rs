//! Core types and utilities for courier
//!
//! This crate provides the configuration, error, logging, message bus,
//! and conversation-history building blocks used by the other courier
//! components.

pub mod bus;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;

pub use error::{Error, Result};
