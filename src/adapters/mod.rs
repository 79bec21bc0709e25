//! The two adapter state machines (C3, C4) that turn a validated HTTP
//! request into broker traffic and a broker-shaped result back.

pub mod fire_and_forget;
pub mod request_response;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppResult;

pub use fire_and_forget::FireAndForgetAdapter;
pub use request_response::RequestResponseAdapter;

/// Common interface `spec.md §4` describes for both adapters: take parsed,
/// schema-validated request data/args, return JSON-encodable data.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn adapt(
        &self,
        data: Option<Value>,
        args: Option<BTreeMap<String, String>>,
    ) -> AppResult<Value>;
}
