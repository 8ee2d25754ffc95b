//! Request path classification
//!
//! Repository names contain slashes, so routes are recognised by looking at
//! the trailing segments of the path rather than by a fixed pattern.

use percent_encoding::percent_decode_str;

use crate::error::{RegistryError, RegistryResult};

const V2: &str = "v2";
const MANIFESTS: &str = "manifests";
const TAGS: &str = "tags";
const CATALOG: &str = "_catalog";

/// Path segments with the leading empty segment removed.
fn segments(path: &str) -> Vec<&str> {
    path.split('/').skip(1).collect()
}

/// True for the API version probe, `/v2/`.
pub fn is_v2(path: &str) -> bool {
    path.trim_matches('/').split('/').next_back() == Some(V2)
}

/// True for `/v2/{repository}/manifests/{reference}`.
pub fn is_manifest(path: &str) -> bool {
    let elems = segments(path);
    elems.len() >= 4 && elems[elems.len() - 2] == MANIFESTS
}

/// True for `/v2/{repository}/tags/list`.
pub fn is_tags(path: &str) -> bool {
    let elems = segments(path);
    elems.len() >= 4 && elems[elems.len() - 2] == TAGS
}

/// True for `/v2/_catalog` and `/v2/{parent}/_catalog`.
pub fn is_catalog(path: &str) -> bool {
    let elems = segments(path);
    elems.len() >= 2 && elems[elems.len() - 1] == CATALOG
}

/// A classified request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// API version probe
    Version,
    /// A manifest in a repository
    Manifest {
        /// Repository name
        repository: String,
        /// Tag or digest, percent-decoded but unparsed
        reference: String,
    },
    /// The tag list of a repository
    Tags {
        /// Repository name
        repository: String,
    },
    /// A catalog listing, federated under `parent` when present
    Catalog {
        /// Parent repository of a federated listing
        parent: Option<String>,
    },
}

impl Route {
    /// Classify `path`, resolving the repository and reference it names.
    ///
    /// Paths which match no route return `None`.
    pub fn classify(path: &str) -> RegistryResult<Option<Route>> {
        let elems = segments(path);
        if is_manifest(path) {
            let repository = resolve_repository(&elems)?;
            let reference = decode(elems[elems.len() - 1])?;
            return Ok(Some(Route::Manifest {
                repository,
                reference,
            }));
        }

        if is_tags(path) {
            let repository = resolve_repository(&elems)?;
            return Ok(Some(Route::Tags { repository }));
        }

        if is_catalog(path) {
            let parent = resolve_parent(&elems[..elems.len() - 1])?;
            return Ok(Some(Route::Catalog { parent }));
        }

        if is_v2(path) {
            return Ok(Some(Route::Version));
        }

        Ok(None)
    }
}

/// Segments following the last `v2` marker, or all of them when there is none.
fn after_marker<'a, 'p>(elems: &'a [&'p str]) -> &'a [&'p str] {
    match elems.iter().rposition(|elem| *elem == V2) {
        Some(marker) => &elems[marker + 1..],
        None => elems,
    }
}

fn decode(segment: &str) -> RegistryResult<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| RegistryError::InvalidParams(format!("invalid reference: {segment}")))
}

fn join(parts: &[&str]) -> RegistryResult<String> {
    if parts.iter().any(|part| part.is_empty()) {
        return Err(RegistryError::InvalidParams(format!(
            "invalid repository name: {}",
            parts.join("/")
        )));
    }
    Ok(parts.join("/"))
}

/// Resolve the repository of a manifest or tags path.
///
/// The repository is every segment between the last `v2` marker and the trailing
/// verb and reference, in order.
pub fn resolve_repository(elems: &[&str]) -> RegistryResult<String> {
    let Some(end) = elems.len().checked_sub(2) else {
        return Err(RegistryError::no_chart_name());
    };

    let parts = after_marker(&elems[..end]);
    if parts.is_empty() {
        return Err(RegistryError::no_chart_name());
    }
    join(parts)
}

/// Resolve the parent repository of a catalog path, given the segments
/// before `_catalog`. `None` is the root catalog.
fn resolve_parent(elems: &[&str]) -> RegistryResult<Option<String>> {
    let parts = after_marker(elems);
    if parts.is_empty() {
        return Ok(None);
    }
    join(parts).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        assert!(is_v2("/v2/"));
        assert!(is_v2("/v2"));
        assert!(!is_v2("/"));

        assert!(is_manifest("/v2/charts/app/manifests/1.0.0"));
        assert!(is_manifest("/v2/app/manifests/1.0.0"));
        assert!(!is_manifest("/v2/manifests/1.0.0"));

        assert!(is_tags("/v2/charts/app/tags/list"));
        assert!(!is_tags("/v2/tags/list"));

        assert!(is_catalog("/v2/_catalog"));
        assert!(is_catalog("/v2/charts.example.com/_catalog"));
        assert!(!is_catalog("/_catalog"));
    }

    #[test]
    fn repository_segments_keep_their_order() {
        let route = Route::classify("/v2/charts.example.com/stable/app/manifests/1.0.0").unwrap();
        assert_eq!(
            route,
            Some(Route::Manifest {
                repository: "charts.example.com/stable/app".into(),
                reference: "1.0.0".into(),
            })
        );

        let route = Route::classify("/v2/charts/app/tags/list").unwrap();
        assert_eq!(
            route,
            Some(Route::Tags {
                repository: "charts/app".into()
            })
        );
    }

    #[test]
    fn version_tag_is_a_manifest() {
        assert_eq!(
            Route::classify("/v2/charts/app/manifests/v2").unwrap(),
            Some(Route::Manifest {
                repository: "charts/app".into(),
                reference: "v2".into(),
            })
        );
        assert_eq!(Route::classify("/v2/").unwrap(), Some(Route::Version));
    }

    #[test]
    fn last_marker_starts_the_repository() {
        assert_eq!(
            Route::classify("/v2/org/v2/app/manifests/1.0.0").unwrap(),
            Some(Route::Manifest {
                repository: "app".into(),
                reference: "1.0.0".into(),
            })
        );
        assert_eq!(
            Route::classify("/v2/org/v2/charts/app/tags/list").unwrap(),
            Some(Route::Tags {
                repository: "charts/app".into()
            })
        );
        assert_eq!(
            Route::classify("/v2/org/v2/charts.example.com/_catalog").unwrap(),
            Some(Route::Catalog {
                parent: Some("charts.example.com".into())
            })
        );
    }

    #[test]
    fn reference_is_percent_decoded() {
        assert_eq!(
            Route::classify("/v2/charts/app/manifests/sha256%3Aabc").unwrap(),
            Some(Route::Manifest {
                repository: "charts/app".into(),
                reference: "sha256:abc".into(),
            })
        );

        let error = Route::classify("/v2/charts/app/manifests/%FF").unwrap_err();
        assert_eq!(error.error_code(), "INVALID PARAMS");
    }

    #[test]
    fn repository_without_marker() {
        let elems = ["charts", "app", "manifests", "1.0.0"];
        assert_eq!(resolve_repository(&elems).unwrap(), "charts/app");
    }

    #[test]
    fn missing_repository_is_invalid() {
        let error = resolve_repository(&["v2", "manifests", "1.0.0"]).unwrap_err();
        assert_eq!(error.error_code(), "INVALID PARAMS");

        let error = resolve_repository(&["1.0.0"]).unwrap_err();
        assert_eq!(error.error_code(), "INVALID PARAMS");

        let error = Route::classify("/v2//app/manifests/1.0.0").unwrap_err();
        assert_eq!(error.error_code(), "INVALID PARAMS");
    }

    #[test]
    fn catalog_parent() {
        assert_eq!(
            Route::classify("/v2/_catalog").unwrap(),
            Some(Route::Catalog { parent: None })
        );
        assert_eq!(
            Route::classify("/v2/charts.example.com/stable/_catalog").unwrap(),
            Some(Route::Catalog {
                parent: Some("charts.example.com/stable".into())
            })
        );
    }

    #[test]
    fn unknown_paths() {
        assert_eq!(Route::classify("/v2/charts/app/blobs").unwrap(), None);
        assert_eq!(Route::classify("/").unwrap(), None);
    }
}
