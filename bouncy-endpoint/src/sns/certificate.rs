//! Signing certificate retrieval and caching.
//!
//! SNS rotates its signing certificates and does not promise one key for all
//! messages, so each `SigningCertURL` is fetched once and kept by URL. The
//! cache never checks the domain: URLs reach it only after the gate has
//! matched them against the certificate-domain pattern.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{error, info};
use x509_cert::der::Decode;
use x509_cert::Certificate;

use crate::config::CacheBackend;
use crate::error::CertificateError;
use crate::fetch::Fetcher;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Storage for raw PEM bytes keyed by certificate URL.
#[async_trait]
pub trait KeyCache: Send + Sync {
    async fn get(&self, url: &str) -> Option<Arc<[u8]>>;
    async fn put(&self, url: &str, pem: Arc<[u8]>);
}

/// Process-local cache. Entries live until the process exits.
#[derive(Default)]
pub struct MemoryKeyCache {
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop a single certificate, forcing the next lookup to refetch it.
    pub async fn invalidate(&self, url: &str) -> bool {
        self.entries.write().await.remove(url).is_some()
    }
}

#[async_trait]
impl KeyCache for MemoryKeyCache {
    async fn get(&self, url: &str) -> Option<Arc<[u8]>> {
        self.entries.read().await.get(url).cloned()
    }

    async fn put(&self, url: &str, pem: Arc<[u8]>) {
        self.entries.write().await.insert(url.to_string(), pem);
    }
}

/// Cache that never remembers anything.
pub struct NoKeyCache;

#[async_trait]
impl KeyCache for NoKeyCache {
    async fn get(&self, _url: &str) -> Option<Arc<[u8]>> {
        None
    }

    async fn put(&self, _url: &str, _pem: Arc<[u8]>) {}
}

/// Build the cache selected by configuration.
pub fn key_cache_for(backend: CacheBackend) -> Arc<dyn KeyCache> {
    match backend {
        CacheBackend::Memory => Arc::new(MemoryKeyCache::new()),
        CacheBackend::Disabled => Arc::new(NoKeyCache),
    }
}

/// Read-through certificate source: cache first, network on miss.
#[derive(Clone)]
pub struct CertificateStore {
    cache: Arc<dyn KeyCache>,
    fetcher: Arc<dyn Fetcher>,
}

impl CertificateStore {
    pub fn new(cache: Arc<dyn KeyCache>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { cache, fetcher }
    }

    /// Return the PEM bytes for `url`, fetching and validating on a miss.
    ///
    /// Concurrent misses for the same URL may each fetch; whichever stores
    /// last wins, and only validated single-certificate files are stored.
    pub async fn fetch(&self, url: &str) -> Result<Arc<[u8]>, CertificateError> {
        if let Some(pem) = self.cache.get(url).await {
            return Ok(pem);
        }

        info!(url = url, "certificate_cache_miss");

        let response = self.fetcher.get(url).await?;
        if !response.is_success() {
            error!(url = url, status_code = response.status, "certificate_fetch_failed");
            return Err(CertificateError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        validate_certificate_file(url, &response.body)?;

        let pem: Arc<[u8]> = Arc::from(response.body);
        self.cache.put(url, pem.clone()).await;

        info!(url = url, pem_length = pem.len(), "certificate_cached");

        Ok(pem)
    }
}

/// A proper SNS certificate file holds exactly one decodable certificate.
pub fn validate_certificate_file(url: &str, pem_bytes: &[u8]) -> Result<(), CertificateError> {
    let blocks = pem::parse_many(pem_bytes).map_err(|e| {
        error!(url = url, error = %e, "certificate_file_invalid_pem");
        CertificateError::InvalidPem {
            url: url.to_string(),
            message: e.to_string(),
        }
    })?;

    let certificates: Vec<_> = blocks
        .iter()
        .filter(|block| block.tag() == CERTIFICATE_TAG)
        .collect();

    if certificates.len() != 1 {
        error!(url = url, count = certificates.len(), "certificate_file_invalid");
        return Err(CertificateError::CertificateCount {
            url: url.to_string(),
            count: certificates.len(),
        });
    }

    Certificate::from_der(certificates[0].contents())
        .map_err(|e| CertificateError::Malformed(e.to_string()))?;

    Ok(())
}
