//! Manifests and the manifest GET/HEAD handler

use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{RegistryError, RegistryResult};
use crate::reference::{Digest, Reference};
use crate::store::Manifests;

/// Media type used when a chart source does not name one.
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

const DOCKER_CONTENT_DIGEST: header::HeaderName =
    header::HeaderName::from_static("docker-content-digest");

/// A cached manifest. The blob is never modified after insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    content_type: String,
    blob: Bytes,
    refs: Vec<String>,
    created_at: DateTime<Utc>,
}

impl Manifest {
    /// Create a manifest from its media type and raw bytes
    pub fn new(content_type: impl Into<String>, blob: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            blob: blob.into(),
            refs: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the digests of the blobs this manifest refers to
    pub fn with_refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refs = refs.into_iter().map(Into::into).collect();
        self
    }

    /// Media type of the manifest
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Raw manifest bytes
    pub fn blob(&self) -> &Bytes {
        &self.blob
    }

    /// Digests of referenced blobs, in manifest order
    pub fn refs(&self) -> &[String] {
        &self.refs
    }

    /// When the manifest entered the cache
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Digest of the blob, computed on every call.
    pub fn digest(&self) -> Digest {
        Digest::sha256(&self.blob)
    }

    pub(crate) fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub(crate) fn is_expired(&self, ttl: Option<TimeDelta>, now: DateTime<Utc>) -> bool {
        ttl.is_some_and(|ttl| now - self.created_at > ttl)
    }
}

/// A manifest ready to be written out. HEAD responses omit the body.
#[derive(Debug)]
pub struct ManifestResponse {
    digest: Digest,
    content_type: String,
    blob: Bytes,
    include_body: bool,
}

impl ManifestResponse {
    fn new(manifest: Manifest, include_body: bool) -> Self {
        Self {
            digest: manifest.digest(),
            content_type: manifest.content_type,
            blob: manifest.blob,
            include_body,
        }
    }

    /// Digest reported in the `Docker-Content-Digest` header
    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl IntoResponse for ManifestResponse {
    fn into_response(self) -> Response {
        let headers = [
            (header::CONTENT_TYPE, self.content_type),
            (DOCKER_CONTENT_DIGEST, self.digest.to_string()),
            (header::CONTENT_LENGTH, self.blob.len().to_string()),
        ];

        if self.include_body {
            (StatusCode::OK, headers, self.blob).into_response()
        } else {
            (StatusCode::OK, headers).into_response()
        }
    }
}

/// Get or check a manifest, populating the cache on a miss.
#[tracing::instrument(skip(manifests))]
pub(crate) async fn get_manifest(
    manifests: &Manifests,
    method: &Method,
    path: &str,
    repository: &str,
    reference: &str,
) -> RegistryResult<ManifestResponse> {
    let include_body = match *method {
        Method::GET => true,
        Method::HEAD => false,
        _ => return Err(RegistryError::method_unknown(method, path)),
    };

    let reference: Reference = reference.parse()?;
    let manifest = manifests.get(repository, &reference).await?;
    Ok(ManifestResponse::new(manifest, include_body))
}
