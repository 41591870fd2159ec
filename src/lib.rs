//! Live monitor for a lighting effect server.
//!
//! Reads the server's command stream, keeps a model of every announced fixture
//! and its running effects, and renders that model through observers.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod fixture;
pub mod output;
pub mod parser;
pub mod ranges;
pub mod session;
pub mod transport;
