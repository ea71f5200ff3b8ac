//! spsmarket: a real-time speculative problem-statement market server.
//!
//! Participants join over WebSocket, create problem statements (SPS) with
//! milestones, trade each SPS's token, and complete milestones for rewards.
//! One engine task owns all state; a periodic tick reprices open markets and
//! settles anything past its deadline.

pub mod config;
pub mod engine;
pub mod logging;
pub mod runtime;
pub mod server;
