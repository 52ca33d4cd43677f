//! Real-time multi-room trivia coordinator: rooms joined via short code,
//! a one-second game clock driving each session through its phases, and
//! per-player answer collection and scoring.

pub mod config;
pub mod error;
pub mod questions;
pub mod registry;
pub mod roster;
pub mod server;
pub mod session;
pub mod types;
