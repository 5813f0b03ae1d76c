pub mod config;
pub mod discord;
pub mod error;
pub mod feed;
pub mod relay;
pub mod sink;
pub mod twitter;
