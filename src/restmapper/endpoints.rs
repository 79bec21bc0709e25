//! Standard endpoint declarations from `spec.md §6`'s bridge configuration
//! table: `POST /messages/` (fire-and-forget) and `GET /messages/`
//! (request/response, paginated).

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use serde_json::json;

use crate::adapters::{FireAndForgetAdapter, RequestResponseAdapter};
use crate::broker::BrokerGateway;

use super::Endpoint;

pub const MESSAGES_POST_PATH: &str = "/messages/";
pub const MESSAGES_GET_PATH: &str = "/messages/";

pub async fn standard_endpoints(
    gateway: &BrokerGateway,
    rpc_timeout: Duration,
) -> Result<Vec<Endpoint>, lapin::Error> {
    let post_channel = gateway.channel().await?;
    let post_name = format!("{MESSAGES_POST_PATH}:{}", Method::POST.as_str());
    let post_adapter = FireAndForgetAdapter::init(post_channel, &post_name).await?;

    let get_name = format!("{MESSAGES_GET_PATH}:{}", Method::GET.as_str());
    let get_adapter = RequestResponseAdapter::init(gateway, &get_name, rpc_timeout).await?;

    Ok(vec![
        Endpoint {
            path: MESSAGES_POST_PATH.to_string(),
            method: Method::POST,
            adapter: Arc::new(post_adapter),
            schema_req_data: Some(json!({"type": "object"})),
            schema_req_args: None,
        },
        Endpoint {
            path: MESSAGES_GET_PATH.to_string(),
            method: Method::GET,
            adapter: Arc::new(get_adapter),
            schema_req_data: None,
            schema_req_args: Some(json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["offset", "limit"],
                "properties": {
                    "offset": {"type": "string", "pattern": "^[0-9]+$"},
                    "limit": {"type": "string", "pattern": "^[0-9]+$"},
                    "paginationId": {"type": "string", "pattern": "^[0-9]+$"},
                }
            })),
        },
    ])
}
