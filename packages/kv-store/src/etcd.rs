//! etcd v2 keys API adapter.
//!
//! Maps the two store operations onto `GET {endpoint}/v2/keys{key}`:
//! - `get(key)` returns the node's value; directory nodes have no value and
//!   come back as an empty (directory marker) entry
//! - `list(prefix)` returns the node's children; a leaf has none
//!
//! Endpoints are tried in order and the first one that answers wins. There
//! is no retry beyond that.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::{Error, KvPair, KvStore};

const KEYS_PATH: &str = "v2/keys";

/// Basic auth credentials for the etcd HTTP API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtcdAuth {
    pub user: String,
    pub password: String,
}

/// A store backed by an etcd cluster speaking the v2 keys API.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use confvol_store::{EtcdStore, KvStore};
///
/// let store = EtcdStore::new(&["10.0.0.1:2379".to_string()], Duration::from_secs(10))?;
/// let children = store.list("/app/")?;
/// ```
pub struct EtcdStore {
    client: Client,
    endpoints: Vec<Url>,
    auth: Option<EtcdAuth>,
}

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: EtcdNode,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
}

impl EtcdNode {
    fn into_pair(self) -> KvPair {
        KvPair::new(self.key, self.value.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct EtcdErrorBody {
    #[serde(rename = "errorCode")]
    error_code: u32,
    message: String,
}

impl EtcdStore {
    /// Create a store for the given endpoints.
    ///
    /// `connect_timeout` bounds connection setup only; requests on an
    /// established connection are not timed out.
    pub fn new(endpoints: &[String], connect_timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Self::with_client(client, endpoints)
    }

    /// Create a store with a custom reqwest client.
    pub fn with_client(client: Client, endpoints: &[String]) -> Result<Self, Error> {
        let endpoints = endpoints
            .iter()
            .map(|e| Self::parse_endpoint(e))
            .collect::<Result<Vec<_>, _>>()?;

        if endpoints.is_empty() {
            return Err(Error::Backend {
                message: "no etcd endpoints configured".to_string(),
            });
        }

        Ok(Self {
            client,
            endpoints,
            auth: None,
        })
    }

    /// Send basic auth credentials with every request.
    pub fn with_auth(mut self, auth: EtcdAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Bare `host:port` endpoints are treated as plain HTTP.
    fn parse_endpoint(endpoint: &str) -> Result<Url, Error> {
        let endpoint = endpoint.trim();
        let with_scheme = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };
        Ok(Url::parse(&with_scheme)?)
    }

    fn key_url(endpoint: &Url, key: &str) -> Result<Url, Error> {
        let base = endpoint.as_str().trim_end_matches('/');
        let key = key.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}/{}", base, KEYS_PATH, key))?)
    }

    fn fetch(&self, key: &str) -> Result<EtcdNode, Error> {
        let mut last_error = None;

        for endpoint in &self.endpoints {
            let url = Self::key_url(endpoint, key)?;
            let mut request = self.client.get(url);
            if let Some(auth) = &self.auth {
                request = request.basic_auth(&auth.user, Some(&auth.password));
            }

            match request.send() {
                Ok(response) => return Self::decode(key, response),
                Err(error) => {
                    log::debug!("etcd endpoint {} unreachable: {}", endpoint, error);
                    last_error = Some(Error::from(error));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Backend {
            message: "no etcd endpoints configured".to_string(),
        }))
    }

    fn decode(key: &str, response: Response) -> Result<EtcdNode, Error> {
        let status = response.status();
        let body = response.text()?;

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                key: key.to_string(),
            });
        }

        if !status.is_success() {
            let message = match serde_json::from_str::<EtcdErrorBody>(&body) {
                Ok(err) => format!("etcd error {}: {}", err.error_code, err.message),
                Err(_) => format!("HTTP {}: {}", status, body),
            };
            return Err(Error::Backend { message });
        }

        let parsed: EtcdResponse = serde_json::from_str(&body)?;
        Ok(parsed.node)
    }
}

impl KvStore for EtcdStore {
    fn get(&self, key: &str) -> Result<KvPair, Error> {
        let node = self.fetch(key)?;
        if node.dir {
            return Ok(KvPair::new(node.key, ""));
        }
        Ok(node.into_pair())
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, Error> {
        let node = self.fetch(prefix)?;
        Ok(node.nodes.into_iter().map(EtcdNode::into_pair).collect())
    }
}
