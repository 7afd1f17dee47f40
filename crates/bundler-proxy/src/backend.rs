//! The two bundler backends the proxy fronts.

use std::fmt;

use reqwest::Url;

/// Protocol version served by a bundler backend.
///
/// `V06` is the older entry point generation and `V07` the newer one; unless a
/// call says otherwise it goes to `V07`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendVersion {
    V06,
    V07,
}

impl BackendVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendVersion::V06 => "v0.6",
            BackendVersion::V07 => "v0.7",
        }
    }
}

impl fmt::Display for BackendVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bundler backend: its version, base URL and the HTTP client used to
/// reach it. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Backend {
    version: BackendVersion,
    url: Url,
    client: reqwest::Client,
}

impl Backend {
    pub fn new(version: BackendVersion, url: Url, client: reqwest::Client) -> Self {
        Self {
            version,
            url,
            client,
        }
    }

    pub fn version(&self) -> BackendVersion {
        self.version
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}
