use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;

use crate::error::SmokeError;
use crate::http;

/// Label and URL suffix of every endpoint checked per granule, in check order.
pub const ENDPOINTS: [(&str, &str); 4] = [
    ("DMR (XML)", ".dmr"),
    ("DMR (HTML)", ".dmr.html"),
    ("DMR++ (XML)", ".dmrpp"),
    ("DMR++ (HTML)", ".dmrpp.html"),
];

pub trait EndpointProbe: Send + Sync {
    /// GETs `url` and returns the status when it is a 2xx.
    fn probe(&self, url: &str) -> Result<u16, SmokeError>;
}

#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, SmokeError> {
        let client = http::client_builder(Some(timeout))
            .build()
            .map_err(|err| SmokeError::EndpointHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl EndpointProbe for HttpProbe {
    fn probe(&self, url: &str) -> Result<u16, SmokeError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SmokeError::EndpointHttp(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SmokeError::EndpointStatus(status.as_u16()));
        }
        Ok(status.as_u16())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointCheck {
    pub label: String,
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl EndpointCheck {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

pub fn endpoint_urls(host: &str, port: u16, filename: &str) -> Vec<(String, String)> {
    let base = format!("http://{host}:{port}/opendap/{filename}");
    ENDPOINTS
        .iter()
        .map(|(label, suffix)| (label.to_string(), format!("{base}{suffix}")))
        .collect()
}

/// Checks every endpoint of `filename`; a failing endpoint does not stop the others.
pub fn verify_endpoints<P: EndpointProbe + ?Sized>(
    probe: &P,
    host: &str,
    port: u16,
    filename: &str,
) -> Vec<EndpointCheck> {
    endpoint_urls(host, port, filename)
        .into_iter()
        .map(|(label, url)| match probe.probe(&url) {
            Ok(status) => EndpointCheck {
                label,
                url,
                status: Some(status),
                error: None,
            },
            Err(err) => EndpointCheck {
                label,
                url,
                status: match &err {
                    SmokeError::EndpointStatus(status) => Some(*status),
                    _ => None,
                },
                error: Some(err.to_string()),
            },
        })
        .collect()
}
