//! imint runtime library: warehouse access, caching fetcher, analyst
//! proxy, dashboard pages and the CLI/REST surfaces built on them.
//!
//! This library crate exposes the runtime modules for integration testing.

pub mod analysis;
pub mod analyst;
pub mod cli;
pub mod config;
pub mod conversations;
pub mod fetcher;
pub mod loitering;
pub mod pages;
pub mod presign;
pub mod proxy;
pub mod rest;
pub mod warehouse;
