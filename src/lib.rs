pub mod config;
pub mod eta;
pub mod fetch;
pub mod geo;
pub mod infra;
pub mod matcher;
pub mod model;
pub mod output;
pub mod parser;
pub mod poller;
pub mod route;
pub mod services;
pub mod stats;
pub mod store;
pub mod tracker;
