//! Conductor Core — shared abstractions.
//!
//! This crate defines the commands, events, stores and error taxonomy that
//! the saga orchestration core and the command handler registry build on.
//! It contains no storage engine and no business rules.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod keyed_lock;
pub mod logger;
pub mod repository;
pub mod saga_store;
