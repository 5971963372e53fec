//! HTTP adapter serving one long-lived rate limiter.

mod server;
mod service;

pub use server::HttpServer;
pub use service::router;
