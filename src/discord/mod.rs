pub mod rate_limit;
pub mod rest;
pub mod types;
