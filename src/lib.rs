pub mod app;
pub mod cmr;
pub mod config;
pub mod docker;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod http;
pub mod output;
pub mod server;
pub mod sidecar;
pub mod verify;
