//! Get Worker (C8).
//!
//! Answers paginated read requests published to `/messages/:GET`, replying
//! on the `RPC` exchange with `routing_key = reply_to` — the same
//! reply-routing convention the Request/Response Adapter (C4) expects on the
//! way out (`spec.md §9`'s reply-routing open question, resolved in
//! `adapters/request_response.rs`).
//!
//! Unlike the Post Worker, a single malformed or failing request must not
//! take the worker down: every delivery gets acked and, on failure, answered
//! with an `{"error": ...}` envelope instead of a value.

use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::broker::topology::{
    bind_queue, declare_direct_exchange, declare_durable_queue, RPC_EXCHANGE,
    MESSAGES_GET_EXCHANGE,
};
use crate::broker::BrokerGateway;
use crate::envelope::Envelope;
use crate::error::WorkerResult;
use crate::store;

/// When `debug` is false, a failure reply's description is always this
/// constant, never the underlying error text (`spec.md §4.8`).
const GENERIC_DESCRIPTION: &str = "Internal server error";

pub async fn run(gateway: &BrokerGateway, pool: &PgPool, debug: bool) -> WorkerResult<()> {
    let channel = gateway.channel().await?;
    declare_direct_exchange(&channel, MESSAGES_GET_EXCHANGE).await?;
    declare_durable_queue(&channel, MESSAGES_GET_EXCHANGE).await?;
    bind_queue(&channel, MESSAGES_GET_EXCHANGE, MESSAGES_GET_EXCHANGE, "").await?;
    declare_direct_exchange(&channel, RPC_EXCHANGE).await?;

    let mut consumer = channel
        .basic_consume(
            MESSAGES_GET_EXCHANGE,
            "messages-get-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tracing::info!("get worker waiting for requests...");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;

        let reply_to = delivery
            .properties
            .reply_to()
            .as_ref()
            .map(|s| s.as_str().to_string());
        let correlation_id = delivery.properties.correlation_id().clone();

        if let Some(reply_to) = reply_to {
            let reply_data = match handle_request(pool, &delivery.data).await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    tracing::warn!(%error, "get worker request failed");
                    let description = if debug {
                        error.to_string()
                    } else {
                        GENERIC_DESCRIPTION.to_string()
                    };
                    json!({"error": {"code": 500, "description": description}})
                }
            };

            let body = serde_json::to_vec(&Envelope::new(Some(reply_data), None))
                .expect("Envelope serialization is infallible");
            let properties = BasicProperties::default().with_correlation_id(
                correlation_id.unwrap_or_default(),
            );

            if let Err(error) = publish_reply(&channel, &reply_to, &body, properties).await {
                tracing::warn!(%error, "failed to publish get worker reply");
            }
        } else {
            tracing::warn!("get request delivery had no reply_to, dropping");
        }

        delivery.ack(BasicAckOptions::default()).await?;
    }

    Ok(())
}

async fn publish_reply(
    channel: &Channel,
    reply_to: &str,
    body: &[u8],
    properties: BasicProperties,
) -> Result<(), lapin::Error> {
    channel
        .basic_publish(
            RPC_EXCHANGE,
            reply_to,
            BasicPublishOptions::default(),
            body,
            properties,
        )
        .await?
        .await?;
    Ok(())
}

/// Parse the request envelope's `args`, run pagination, and return the
/// snapshot as a JSON value ready to become the reply's `data`.
async fn handle_request(pool: &PgPool, raw: &[u8]) -> WorkerResult<Value> {
    let envelope: Envelope = serde_json::from_slice(raw)?;
    let args = envelope.args.unwrap_or_default();

    let offset: i64 = parse_required(&args, "offset")?;
    let limit: i64 = parse_required(&args, "limit")?;
    let pagination_id: Option<i64> = match args.get("paginationId") {
        Some(value) if !value.is_empty() => Some(parse_i64(value, "paginationId")?),
        _ => None,
    };

    let snapshot = store::paginate(pool, offset, limit, pagination_id).await?;
    Ok(serde_json::to_value(snapshot)?)
}

fn parse_required(
    args: &std::collections::BTreeMap<String, String>,
    key: &str,
) -> WorkerResult<i64> {
    let raw = args
        .get(key)
        .ok_or_else(|| crate::error::WorkerError::Other(format!("missing argument: {key}")))?;
    parse_i64(raw, key)
}

fn parse_i64(raw: &str, key: &str) -> WorkerResult<i64> {
    raw.parse()
        .map_err(|_| crate::error::WorkerError::Other(format!("invalid integer for {key}: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_description_used_when_not_debug() {
        let description = if false {
            "boom".to_string()
        } else {
            GENERIC_DESCRIPTION.to_string()
        };
        assert_eq!(description, "Internal server error");
    }

    #[test]
    fn parse_i64_rejects_non_numeric() {
        assert!(parse_i64("abc", "offset").is_err());
    }

    #[test]
    fn parse_i64_accepts_numeric() {
        assert_eq!(parse_i64("42", "offset").unwrap(), 42);
    }

    #[test]
    fn missing_pagination_id_is_none() {
        let args: std::collections::BTreeMap<String, String> = std::collections::BTreeMap::new();
        let pagination_id = match args.get("paginationId") {
            Some(value) if !value.is_empty() => Some(parse_i64(value, "paginationId").unwrap()),
            _ => None,
        };
        assert_eq!(pagination_id, None);
    }
}
