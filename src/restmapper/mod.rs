//! Endpoint Dispatcher (C5).
//!
//! Generalizes the original Python bridge's `werkzeug.routing.Map`/`Rule`
//! indirection: requests are matched against a flat list of declared
//! `Endpoint`s at request time rather than compiled into per-path axum
//! routes, since the endpoint table (and its schemas/adapter) is exactly the
//! runtime value the spec wants matched against, not a fixed route tree.

pub mod endpoints;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::schema::validate;

use super::adapters::Adapter;

/// Immutable endpoint declaration: `(path, method)` is the uniqueness key.
pub struct Endpoint {
    pub path: String,
    pub method: Method,
    pub adapter: Arc<dyn Adapter>,
    pub schema_req_data: Option<Value>,
    pub schema_req_args: Option<Value>,
}

impl Endpoint {
    /// `path + ":" + METHOD`, e.g. `/messages/:POST` — used as the broker
    /// exchange/queue name.
    pub fn endpoint_name(&self) -> String {
        format!("{}:{}", self.path, self.method.as_str())
    }
}

#[derive(Clone)]
pub struct DispatcherState {
    pub endpoints: Arc<Vec<Endpoint>>,
}

pub fn build_router(endpoints: Vec<Endpoint>) -> Router {
    let state = DispatcherState {
        endpoints: Arc::new(endpoints),
    };
    Router::new()
        .fallback(any(dispatch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(
    State(state): State<DispatcherState>,
    method: Method,
    uri: Uri,
    Query(args): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let endpoint = state
        .endpoints
        .iter()
        .find(|e| e.path == path && e.method == method);

    let endpoint = match endpoint {
        Some(endpoint) => endpoint,
        None => {
            return AppError::NotFound(format!("{path} ({method}) not found")).into_response()
        }
    };

    match handle(endpoint, body, args).await {
        Ok(value) => Json(value).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn handle(
    endpoint: &Endpoint,
    body: Bytes,
    args: BTreeMap<String, String>,
) -> AppResult<Value> {
    let data = match &endpoint.schema_req_data {
        Some(schema) => {
            let value: Value = serde_json::from_slice(&body).map_err(|error| {
                AppError::RequestInvalid(format!(
                    "Can not parse request body as JSON: {error}"
                ))
            })?;
            validate(&value, schema).map_err(|error| {
                AppError::RequestInvalid(format!(
                    "Can not validate request data json according to schema:\n{}",
                    error.0
                ))
            })?;
            Some(value)
        }
        None => {
            if !body.is_empty() {
                return Err(AppError::RequestInvalid("No request data allowed".into()));
            }
            None
        }
    };

    let request_args = match &endpoint.schema_req_args {
        Some(schema) => {
            let args_value =
                Value::Object(args.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect());
            validate(&args_value, schema).map_err(|error| {
                AppError::RequestInvalid(format!(
                    "Can not validate request arguments according to schema:\n{}",
                    error.0
                ))
            })?;
            Some(args)
        }
        None => {
            if !args.is_empty() {
                return Err(AppError::RequestInvalid(
                    "No request arguments allowed".into(),
                ));
            }
            None
        }
    };

    endpoint.adapter.adapt(data, request_args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_name_joins_path_and_method() {
        let endpoint = Endpoint {
            path: "/messages/".to_string(),
            method: Method::POST,
            adapter: Arc::new(NoopAdapter),
            schema_req_data: None,
            schema_req_args: None,
        };
        assert_eq!(endpoint.endpoint_name(), "/messages/:POST");
    }

    struct NoopAdapter;

    #[async_trait::async_trait]
    impl Adapter for NoopAdapter {
        async fn adapt(
            &self,
            _data: Option<Value>,
            _args: Option<BTreeMap<String, String>>,
        ) -> AppResult<Value> {
            Ok(Value::Object(Default::default()))
        }
    }

    #[tokio::test]
    async fn no_schema_and_empty_body_passes_through_none() {
        let endpoint = Endpoint {
            path: "/messages/".to_string(),
            method: Method::POST,
            adapter: Arc::new(NoopAdapter),
            schema_req_data: None,
            schema_req_args: None,
        };
        let result = handle(&endpoint, Bytes::new(), BTreeMap::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn no_schema_and_nonempty_body_is_rejected() {
        let endpoint = Endpoint {
            path: "/messages/".to_string(),
            method: Method::POST,
            adapter: Arc::new(NoopAdapter),
            schema_req_data: None,
            schema_req_args: None,
        };
        let result = handle(&endpoint, Bytes::from_static(b"{}"), BTreeMap::new()).await;
        assert!(matches!(result, Err(AppError::RequestInvalid(_))));
    }

    #[tokio::test]
    async fn schema_rejects_non_object_body() {
        let endpoint = Endpoint {
            path: "/messages/".to_string(),
            method: Method::POST,
            adapter: Arc::new(NoopAdapter),
            schema_req_data: Some(serde_json::json!({"type": "object"})),
            schema_req_args: None,
        };
        let result = handle(&endpoint, Bytes::from_static(b"\"string\""), BTreeMap::new()).await;
        let error = result.unwrap_err();
        assert!(error.to_string().contains("is not of type"), "{error}");
    }

    #[tokio::test]
    async fn query_schema_rejects_non_numeric_offset() {
        let endpoint = Endpoint {
            path: "/messages/".to_string(),
            method: Method::GET,
            adapter: Arc::new(NoopAdapter),
            schema_req_data: None,
            schema_req_args: Some(serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["offset", "limit"],
                "properties": {
                    "offset": {"type": "string", "pattern": "^[0-9]+$"},
                    "limit": {"type": "string", "pattern": "^[0-9]+$"},
                }
            })),
        };
        let mut args = BTreeMap::new();
        args.insert("offset".to_string(), "abc".to_string());
        args.insert("limit".to_string(), "10".to_string());
        let result = handle(&endpoint, Bytes::new(), args).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_endpoint_is_not_found() {
        let router = build_router(vec![]);
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
