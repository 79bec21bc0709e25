//! Idempotent exchange/queue declarations shared by every producer and
//! consumer so topology never drifts between them (`spec.md §4.1`: "same
//! name, type, durability").

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};

pub const RPC_EXCHANGE: &str = "RPC";
pub const LIVEUPDATE_QUEUE: &str = "liveupdate";

/// Wire-visible names from `spec.md §6`: `endpoint_name := path + ":" + METHOD`
/// for the two standard endpoints, fixed ahead of time since both the
/// restmapper and the two workers need to agree on them independently.
pub const MESSAGES_POST_EXCHANGE: &str = "/messages/:POST";
pub const MESSAGES_GET_EXCHANGE: &str = "/messages/:GET";

pub async fn declare_fanout_exchange(channel: &Channel, name: &str) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
}

pub async fn declare_direct_exchange(channel: &Channel, name: &str) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
}

pub async fn declare_durable_queue(channel: &Channel, name: &str) -> Result<(), lapin::Error> {
    channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map(|_| ())
}

/// Declare a broker-assigned, exclusive, non-durable reply queue and return
/// its name.
pub async fn declare_exclusive_queue(channel: &Channel) -> Result<String, lapin::Error> {
    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                exclusive: true,
                auto_delete: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(queue.name().as_str().to_string())
}

pub async fn bind_queue(
    channel: &Channel,
    queue: &str,
    exchange: &str,
    routing_key: &str,
) -> Result<(), lapin::Error> {
    channel
        .queue_bind(
            queue,
            exchange,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
}
