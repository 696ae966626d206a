use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::SmokeError;
use crate::http;

const CHUNK_SIZE: usize = 8192;

pub trait GranuleFetcher: Send + Sync {
    /// Streams `url` into `destination`, replacing any existing file. Returns bytes written.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, SmokeError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, SmokeError> {
        // granules can be large; only bound the connect phase
        let client = http::client_builder(None)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| SmokeError::DownloadHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl GranuleFetcher for HttpFetcher {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, SmokeError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SmokeError::DownloadHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(SmokeError::DownloadStatus {
                status,
                hint: auth_hint(status).map(str::to_string),
            });
        }
        let file =
            File::create(destination).map_err(|err| SmokeError::Filesystem(err.to_string()))?;
        copy_chunked(response, file)
    }
}

/// Earthdata hosts answer unauthenticated downloads through the login gateway with these statuses.
pub fn auth_hint(status: u16) -> Option<&'static str> {
    match status {
        401 | 403 | 502 => Some(
            "this usually means Earthdata Login authentication is required; \
             protected downloads are not supported",
        ),
        _ => None,
    }
}

/// Copies `reader` into `writer` in fixed-size chunks.
pub fn copy_chunked<R: Read, W: Write>(mut reader: R, mut writer: W) -> Result<u64, SmokeError> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(SmokeError::DownloadHttp(err.to_string())),
        };
        writer
            .write_all(&buffer[..read])
            .map_err(|err| SmokeError::Filesystem(err.to_string()))?;
        written += read as u64;
    }
    writer
        .flush()
        .map_err(|err| SmokeError::Filesystem(err.to_string()))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_across_chunk_boundaries() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 13];
        let mut out = Vec::new();
        let written = copy_chunked(data.as_slice(), &mut out).unwrap();
        assert_eq!(written, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn gateway_statuses_carry_hint() {
        assert!(auth_hint(502).is_some());
        assert!(auth_hint(401).is_some());
        assert!(auth_hint(404).is_none());
    }
}
