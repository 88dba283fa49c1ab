pub mod alert;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod handoff;
pub mod models;
pub mod observability;
pub mod realtime;
pub mod session;
pub mod state;
pub mod worker;
