//! Track-counter service: a tiny HTTP front for a counter kept in Redis.
//!
//! `POST /track` bumps the counter by its `count` query parameter and appends
//! all of its query parameters to an audit file; `GET /count` reads the
//! counter back. Each module focuses on one responsibility:
//!
//! - [`store`] talks to the key-value store: reads, fire-and-forget
//!   increments, and a supervisor that keeps the connection alive.
//! - [`audit`] writes one JSON line per track request to an append-only file.
//! - [`track`] decides how much a track request adds to the counter.
//! - [`http`] wires the routes and maps store results to responses.
//! - [`listener`] runs the router on a socket, once.
//! - [`lifecycle`] orders startup and shutdown and enforces the shutdown deadline.
//! - [`cli`], [`config`], and [`signal`] cover the process edges.
//!
//! Integration tests drive the router and the coordinator against the
//! in-process [`store::MemoryStore`].

pub mod audit;
pub mod cli;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod listener;
pub mod signal;
pub mod store;
pub mod track;
