//! Berth recorder: arrivals and departures of boats at a port.
//!
//! An HTTP/JSON surface records arrival and departure events against a
//! SQLite store and exposes read views over the resulting movement ledger:
//! boats currently at berth, full history, search, aggregate statistics, a
//! filterable journal and a CSV export.

pub mod audit;
pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod ledger;
pub mod models;
pub mod ratelimit;
pub mod views;
