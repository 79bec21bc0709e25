//! Post Worker (C7).
//!
//! Drains the `/messages/:POST` fanout queue into the durable store. A
//! message that fails to insert is left un-acked and the process exits —
//! the durable queue keeps it, and a crash-loop is a more diagnostic failure
//! mode than a silently dropped message (`spec.md §4.7`).

use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use sqlx::PgPool;

use crate::broker::topology::{
    bind_queue, declare_durable_queue, declare_fanout_exchange, MESSAGES_POST_EXCHANGE,
};
use crate::broker::BrokerGateway;
use crate::envelope::Envelope;
use crate::error::WorkerResult;
use crate::store;

pub async fn run(gateway: &BrokerGateway, pool: &PgPool) -> WorkerResult<()> {
    store::ensure_schema(pool).await?;

    let channel = gateway.channel().await?;
    declare_fanout_exchange(&channel, MESSAGES_POST_EXCHANGE).await?;
    declare_durable_queue(&channel, MESSAGES_POST_EXCHANGE).await?;
    bind_queue(&channel, MESSAGES_POST_EXCHANGE, MESSAGES_POST_EXCHANGE, "").await?;

    let mut consumer = channel
        .basic_consume(
            MESSAGES_POST_EXCHANGE,
            "messages-post-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tracing::info!("post worker waiting for messages...");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        let envelope: Envelope = serde_json::from_slice(&delivery.data)?;
        let payload = envelope.data.unwrap_or(serde_json::Value::Null);

        // A poisoned message (bad payload, store unavailable) must not be
        // acked — propagate the error so the process exits and the
        // supervisor restarts it; the durable queue redelivers this message.
        store::insert_message(pool, &payload).await?;

        delivery.ack(BasicAckOptions::default()).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_no_data_defaults_to_null_payload() {
        let envelope = Envelope::new(None, None);
        let payload = envelope.data.unwrap_or(serde_json::Value::Null);
        assert_eq!(payload, serde_json::Value::Null);
    }
}
