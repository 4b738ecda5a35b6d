//! Read-only log inspection tools served over JSON-RPC.
//!
//! The engine (`search`) answers six queries over a directory of plain-text
//! `.log` files; `mcp` and `http` are the transports.

pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod model;
pub mod query;
pub mod reader;
pub mod report;
pub mod scanner;
pub mod search;
pub mod supervisor;
