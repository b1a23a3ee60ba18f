//! HTTP downloads of chart archives and repository indexes

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RepoError, Result};
use crate::index::{IndexFetcher, RepositoryIndex};

/// Download `url` into memory
pub(crate) async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    tracing::debug!("GET {}", url);
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RepoError::HttpError {
            status: status.as_u16(),
            message: format!("GET {}", url),
        });
    }

    Ok(response.bytes().await?.to_vec())
}

/// Check downloaded `data` against a SHA-256 `expected` digest
///
/// Helm indexes publish bare hex digests; a `sha256:` prefix is accepted too.
pub(crate) fn verify_digest(url: &str, data: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(data));
    let expected = expected.trim().to_ascii_lowercase();
    let expected = expected.strip_prefix("sha256:").unwrap_or(&expected);

    if expected != actual {
        return Err(RepoError::IntegrityCheckFailed {
            name: url.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Fetches `index.yaml` from Helm repositories over HTTP
#[derive(Debug, Clone)]
pub struct HttpIndexFetcher {
    client: reqwest::Client,
}

impl HttpIndexFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IndexFetcher for HttpIndexFetcher {
    async fn fetch_index(&self, repo_url: &str) -> Result<RepositoryIndex> {
        let index_url = format!("{}/index.yaml", repo_url.trim_end_matches('/'));
        let data = download(&self.client, &index_url).await?;
        RepositoryIndex::from_bytes(&data)
    }
}
