use std::time::Duration;

use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

pub const USER_AGENT_VALUE: &str = concat!("dmrpp-smoke/", env!("CARGO_PKG_VERSION"));

/// Client builder carrying the crate user agent. `timeout` bounds whole requests;
/// `None` disables it.
pub fn client_builder(timeout: Option<Duration>) -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    Client::builder().default_headers(headers).timeout(timeout)
}
