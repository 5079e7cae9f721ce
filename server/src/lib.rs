//! Fintra realtime gateway library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod offline;
pub mod routes;
pub mod state;
pub mod ws;
