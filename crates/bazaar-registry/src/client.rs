//! HTTP access to a remote registry.
//!
//! [`RegistryClient`] talks to one registry base URL. It is stateless apart from its HTTP
//! agent: every call is a single blocking request whose outcome is mapped onto
//! [`RegistryError`]. The endpoints are:
//!
//! - `GET {base}/v1/index.json`
//! - `GET {base}/v1/packages/{id}/{version}.tar.gz`
//! - `GET {base}/v1/packages/{id}/metadata.json`
//! - `GET {base}/v1/search?q=&type=&limit=&offset=`
//! - `GET {base}/v1/health`

use std::time::Duration;

use tracing::{debug, trace};
use ureq::Agent;
use url::Url;

use crate::{
    error::{RegistryError, Result},
    http_client::{apply_headers, ClientConfig},
    index::Index,
    package::{Package, PackageId, PackageType},
};

/// Options for server-side search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub package_type: Option<PackageType>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Clone, Debug)]
pub struct RegistryClient {
    base_url: Url,
    config: ClientConfig,
    agent: Agent,
}

impl RegistryClient {
    /// Creates a client for the registry at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidUrl`] if `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str, config: ClientConfig) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|err| RegistryError::InvalidUrl(format!("{base_url}: {err}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(base_url.to_string()));
        }

        let agent = config.build();
        Ok(Self {
            base_url,
            config,
            agent,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns a copy of this client whose requests are bounded by `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let config = ClientConfig {
            timeout: Some(timeout),
            ..self.config.clone()
        };
        let agent = config.build();
        Self {
            base_url: self.base_url.clone(),
            config,
            agent,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn index_url(&self) -> Result<Url> {
        self.endpoint(&["v1", "index.json"])
    }

    pub fn package_url(&self, id: &PackageId, version: &str) -> Result<Url> {
        let file_name = format!("{version}.tar.gz");
        self.endpoint(&["v1", "packages", id.as_str(), &file_name])
    }

    /// Performs a GET and returns the body of a 200 response.
    ///
    /// `id` names the package a 404 refers to.
    fn get(&self, url: &Url, id: Option<&str>) -> Result<Vec<u8>> {
        trace!(url = %url, "GET");
        let req = apply_headers(self.agent.get(url.as_str()), self.config.token.as_deref());
        let mut resp = req.call().map_err(|err| {
            RegistryError::Network {
                url: url.to_string(),
                source: Box::new(err),
            }
        })?;

        let status = resp.status().as_u16();
        if let Some(err) = RegistryError::from_status(status, url.as_str(), id) {
            debug!(url = %url, status, "registry request failed");
            return Err(err);
        }

        resp.body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(|err| {
                RegistryError::Network {
                    url: url.to_string(),
                    source: Box::new(err),
                }
            })
    }

    /// Fetches the full registry index.
    pub fn fetch_index(&self) -> Result<Index> {
        let url = self.index_url()?;
        debug!(url = %url, "fetching registry index");
        let bytes = self.get(&url, None)?;
        Index::parse(&bytes)
    }

    /// Downloads the archive for `id` at `version`. The bytes are not verified here.
    pub fn fetch_package(&self, id: &PackageId, version: &str) -> Result<Vec<u8>> {
        let url = self.package_url(id, version)?;
        debug!(id = %id, version, url = %url, "downloading package archive");
        self.get(&url, Some(id.as_str()))
    }

    /// Fetches the metadata document of a single package.
    ///
    /// The document has the shape of an index. A document without packages is reported as
    /// [`RegistryError::PackageNotFound`].
    pub fn fetch_package_metadata(&self, id: &PackageId) -> Result<Package> {
        let url = self.endpoint(&["v1", "packages", id.as_str(), "metadata.json"])?;
        debug!(id = %id, url = %url, "fetching package metadata");
        let bytes = self.get(&url, Some(id.as_str()))?;
        let index = Index::parse(&bytes)?;

        if let Some(pkg) = index.get(id.as_str()) {
            return Ok(pkg.clone());
        }
        index
            .into_packages()
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::PackageNotFound(id.to_string()))
    }

    /// Runs a search on the registry side.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<Package>> {
        let mut url = self.endpoint(&["v1", "search"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            if let Some(package_type) = opts.package_type {
                pairs.append_pair("type", package_type.as_str());
            }
            if let Some(limit) = opts.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if opts.offset > 0 {
                pairs.append_pair("offset", &opts.offset.to_string());
            }
        }

        debug!(query = query, url = %url, "searching registry");
        let bytes = self.get(&url, None)?;
        Ok(Index::parse(&bytes)?.into_packages())
    }

    /// Checks the registry health endpoint.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::Unhealthy`] for any non-200 answer
    /// * [`RegistryError::Network`] if the registry cannot be reached
    pub fn ping(&self) -> Result<()> {
        let url = self.endpoint(&["v1", "health"])?;
        let req = apply_headers(self.agent.get(url.as_str()), self.config.token.as_deref());
        let resp = req.call().map_err(|err| {
            RegistryError::Network {
                url: url.to_string(),
                source: Box::new(err),
            }
        })?;

        match resp.status().as_u16() {
            200 => Ok(()),
            status => Err(RegistryError::Unhealthy(status)),
        }
    }
}
