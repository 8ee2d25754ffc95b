//! Tag listing
//!
//! See <https://github.com/opencontainers/distribution-spec/blob/main/spec.md#listing-tags>

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::store::Manifests;

/// Tag list response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagList {
    /// Repository name
    pub name: String,
    /// Tags, sorted
    pub tags: Vec<String>,
}

/// `n` and `last` query parameters shared by the listing endpoints
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    n: Option<String>,
    last: Option<String>,
}

impl ListParams {
    pub(crate) fn parse(query: Option<&str>) -> RegistryResult<Self> {
        serde_urlencoded::from_str(query.unwrap_or_default())
            .map_err(|error| RegistryError::BadRequest(format!("parsing query: {error}")))
    }

    /// The `n` limit. An empty value counts as absent.
    pub(crate) fn limit(&self) -> RegistryResult<Option<usize>> {
        match self.n.as_deref() {
            None | Some("") => Ok(None),
            Some(n) => n
                .parse()
                .map(Some)
                .map_err(|error| RegistryError::BadRequest(format!("parsing n: {error}"))),
        }
    }

    /// The `last` cursor. An empty value counts as absent.
    pub(crate) fn last(&self) -> Option<&str> {
        self.last.as_deref().filter(|last| !last.is_empty())
    }
}

/// Apply cursor pagination to sorted tags: keep tags strictly after `last`,
/// then at most `n` of them.
pub(crate) fn paginate(mut tags: Vec<String>, last: Option<&str>, n: Option<usize>) -> Vec<String> {
    if let Some(last) = last {
        let start = tags.partition_point(|tag| tag.as_str() <= last);
        tags.drain(..start);
    }

    if let Some(n) = n {
        tags.truncate(n);
    }
    tags
}

/// List the tags of a repository.
#[tracing::instrument(skip(manifests))]
pub(crate) async fn list_tags(
    manifests: &Manifests,
    method: &Method,
    path: &str,
    repository: &str,
    query: Option<&str>,
) -> RegistryResult<TagList> {
    if *method != Method::GET {
        return Err(RegistryError::method_unknown(method, path));
    }

    let params = ListParams::parse(query)?;
    let limit = params.limit()?;
    let tags = manifests.tags(repository).await?;

    Ok(TagList {
        name: repository.to_owned(),
        tags: paginate(tags, params.last(), limit),
    })
}
