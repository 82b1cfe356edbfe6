//! hubscout - news-site crawler and hub-discovery engine.
//!
//! Bounded, polite crawling of news domains: predict structural "hub"
//! pages (country, region, city, topic, place-topic), validate them
//! against a content model, and persist fetch history and derived hub
//! records to a local SQLite store. A service facade exposes named
//! operations and composable sequences over an axum HTTP/SSE API.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod fetch;
pub mod models;
pub mod repository;
pub mod server;
pub mod services;
pub mod utils;
