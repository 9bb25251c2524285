mod client;

pub use client::HttpTelemetry;
