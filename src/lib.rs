pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod organizations;
pub mod permissions;
pub mod pipeline;
pub mod ratelimit;
