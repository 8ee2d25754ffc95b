//! API server builder and router

use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;

use crate::error::{RegistryError, RegistryResult};
use crate::route::Route;
use crate::source::ChartSource;
use crate::store::Manifests;
use crate::{catalog, manifest, tags};

/// Registry builder for configuring and creating the chart proxy service
#[derive(Debug)]
pub struct RegistryBuilder {
    manifests: Manifests,
}

impl RegistryBuilder {
    /// Create a new registry builder in front of `source`
    pub fn new<S: ChartSource + 'static>(source: S) -> Self {
        Self {
            manifests: Manifests::new(source),
        }
    }

    /// Expire cached manifests `ttl` after they were fetched
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.manifests = self.manifests.with_ttl(ttl);
        self
    }

    /// Build the manifest cache without wrapping it in a router
    pub fn build_store(self) -> Manifests {
        self.manifests
    }

    /// Build the registry service
    ///
    /// Returns a Router that can be served with any tower-compatible server
    pub fn build(self) -> Router {
        router(self.manifests)
    }
}

/// Serve the distribution API from `manifests`
///
/// Repository names contain slashes, so every request, the version probe
/// included, is dispatched by classifying the path.
pub fn router(manifests: Manifests) -> Router {
    Router::new().fallback(dispatch).with_state(manifests)
}

/// API version check endpoint
///
/// Returns 200 OK to indicate the registry is available
async fn api_version_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({})))
}

async fn dispatch(
    State(manifests): State<Manifests>,
    method: Method,
    uri: Uri,
) -> RegistryResult<Response> {
    let path = uri.path();
    let query = uri.query();

    let Some(route) = Route::classify(path)? else {
        return Err(RegistryError::method_unknown(&method, path));
    };

    match route {
        Route::Version => match method {
            Method::GET | Method::HEAD => Ok(api_version_check().await.into_response()),
            _ => Err(RegistryError::method_unknown(&method, path)),
        },
        Route::Manifest {
            repository,
            reference,
        } => Ok(
            manifest::get_manifest(&manifests, &method, path, &repository, &reference)
                .await?
                .into_response(),
        ),
        Route::Tags { repository } => {
            let list = tags::list_tags(&manifests, &method, path, &repository, query).await?;
            json_response(&list)
        }
        Route::Catalog { parent } => {
            let catalog =
                catalog::catalog(&manifests, &method, path, parent.as_deref(), query).await?;
            json_response(&catalog)
        }
    }
}

fn json_response<T: Serialize>(value: &T) -> RegistryResult<Response> {
    let body = serde_json::to_vec(value)?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_owned()),
            (header::CONTENT_LENGTH, body.len().to_string()),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::StaticSource;

    #[test]
    fn test_builder() {
        let _registry = RegistryBuilder::new(StaticSource::new())
            .cache_ttl(Duration::from_secs(60))
            .build();
    }

    #[test]
    fn builder_carries_ttl() {
        let manifests = RegistryBuilder::new(StaticSource::new())
            .cache_ttl(Duration::from_secs(60))
            .build_store();
        assert_eq!(manifests.ttl(), Some(Duration::from_secs(60)));
    }
}
