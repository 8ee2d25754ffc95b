//! Repository catalog
//!
//! The root catalog lists repositories held in the local cache. A catalog
//! under a parent repository lists that parent's federated index instead.

use axum::http::Method;
use serde::Serialize;

use crate::error::{RegistryError, RegistryResult};
use crate::store::Manifests;
use crate::tags::ListParams;

/// Default cap on catalog entries when `n` is not given
pub const DEFAULT_CATALOG_LIMIT: usize = 10_000;

/// Catalog response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    /// Repository names, sorted
    pub repositories: Vec<String>,
}

/// List repositories, federated under `parent` when present.
#[tracing::instrument(skip(manifests))]
pub(crate) async fn catalog(
    manifests: &Manifests,
    method: &Method,
    path: &str,
    parent: Option<&str>,
    query: Option<&str>,
) -> RegistryResult<Catalog> {
    if *method != Method::GET {
        return Err(RegistryError::method_unknown(method, path));
    }

    let n = ListParams::parse(query)?
        .limit()?
        .unwrap_or(DEFAULT_CATALOG_LIMIT);

    let repositories = match parent {
        Some(parent) => manifests.federated(parent, n).await?,
        None => manifests.repositories(n),
    };

    Ok(Catalog { repositories })
}
