//! Request/Response Adapter (C4) — the hardest component.
//!
//! Publishes a request carrying `correlation_id` + `reply_to`, then awaits
//! the matching reply on a private exclusive queue. Replies are matched by
//! `correlation_id`, not by arrival order, so many in-flight calls can share
//! one channel and one reply queue.
//!
//! Reply routing (resolves `spec.md §9`'s open question): the worker side
//! (C8) publishes replies to the `RPC` direct exchange with
//! `routing_key = reply_to` — the queue name carried on the request, which is
//! also the binding key this adapter used when declaring its exclusive
//! queue. `correlation_id` is never used as a routing key; it is carried
//! purely as an AMQP property for in-process disambiguation between
//! concurrently in-flight calls sharing that one queue.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::broker::topology::{
    bind_queue, declare_direct_exchange, declare_durable_queue, declare_exclusive_queue,
    RPC_EXCHANGE,
};
use crate::broker::BrokerGateway;
use crate::envelope::Envelope;
use crate::error::{AppError, AppResult};

use super::Adapter;

type PendingReplies = Arc<DashMap<String, oneshot::Sender<Vec<u8>>>>;

pub struct RequestResponseAdapter {
    request_channel: Channel,
    exchange_name: String,
    reply_to_queue: String,
    pending: PendingReplies,
    timeout: Duration,
}

impl RequestResponseAdapter {
    pub async fn init(
        gateway: &BrokerGateway,
        endpoint_name: &str,
        timeout: Duration,
    ) -> Result<Self, lapin::Error> {
        let request_channel = gateway.channel().await?;
        request_channel
            .basic_qos(1, BasicQosOptions::default())
            .await?;
        declare_direct_exchange(&request_channel, endpoint_name).await?;
        declare_durable_queue(&request_channel, endpoint_name).await?;
        bind_queue(&request_channel, endpoint_name, endpoint_name, "").await?;

        let reply_channel = gateway.channel().await?;
        reply_channel
            .basic_qos(1, BasicQosOptions::default())
            .await?;
        declare_direct_exchange(&reply_channel, RPC_EXCHANGE).await?;
        let reply_queue = declare_exclusive_queue(&reply_channel).await?;
        bind_queue(&reply_channel, &reply_queue, RPC_EXCHANGE, &reply_queue).await?;

        let pending: PendingReplies = Arc::new(DashMap::new());
        spawn_reply_consumer(reply_channel, reply_queue.clone(), pending.clone()).await?;

        Ok(Self {
            request_channel,
            exchange_name: endpoint_name.to_string(),
            reply_to_queue: reply_queue,
            pending,
            timeout,
        })
    }
}

/// Consume the private reply queue for the lifetime of the adapter, routing
/// each delivery to its waiter by `correlation_id`. A delivery whose
/// `correlation_id` has no (or no longer has a) waiter is acked and dropped
/// in place — this can only happen on broker misroute or a timed-out caller,
/// and it must never be handed to a later, unrelated caller.
async fn spawn_reply_consumer(
    channel: Channel,
    queue: String,
    pending: PendingReplies,
) -> Result<(), lapin::Error> {
    let mut consumer = channel
        .basic_consume(
            &queue,
            "rr-adapter-reply",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tokio::spawn(async move {
        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(error) => {
                    tracing::warn!(%error, "reply consumer stream error, stopping");
                    break;
                }
            };

            let correlation_id = delivery
                .properties
                .correlation_id()
                .as_ref()
                .map(|id| id.as_str().to_string());

            if let Some(correlation_id) = correlation_id {
                if let Some((_, waiter)) = pending.remove(&correlation_id) {
                    let _ = waiter.send(delivery.data.clone());
                }
            }

            if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
                tracing::warn!(%error, "failed to ack reply delivery");
            }
        }
    });

    Ok(())
}

#[async_trait]
impl Adapter for RequestResponseAdapter {
    async fn adapt(
        &self,
        data: Option<Value>,
        args: Option<BTreeMap<String, String>>,
    ) -> AppResult<Value> {
        let correlation_id = Uuid::new_v4().simple().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);

        let body = serde_json::to_vec(&Envelope::new(data, args))
            .expect("Envelope serialization is infallible");
        let properties = BasicProperties::default()
            .with_correlation_id(correlation_id.clone().into())
            .with_reply_to(self.reply_to_queue.clone().into());

        let publish_result = async {
            self.request_channel
                .basic_publish(
                    &self.exchange_name,
                    "",
                    BasicPublishOptions::default(),
                    &body,
                    properties,
                )
                .await?
                .await
        }
        .await;

        if let Err(error) = publish_result {
            self.pending.remove(&correlation_id);
            return Err(AppError::AdapterFailure(error.to_string()));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(body)) => serde_json::from_slice(&body)
                .map_err(|error| AppError::AdapterFailure(error.to_string())),
            Ok(Err(_)) => Err(AppError::AdapterFailure(
                "reply consumer task ended before a reply arrived".into(),
            )),
            Err(_) => {
                self.pending.remove(&correlation_id);
                Err(AppError::AdapterTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two concurrent waiters sharing one `pending` map must each receive
    /// only the reply addressed to their own correlation id, even if the
    /// replies are delivered out of order.
    #[tokio::test]
    async fn replies_route_by_correlation_id_regardless_of_order() {
        let pending: PendingReplies = Arc::new(DashMap::new());

        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        pending.insert("corr-a".to_string(), tx_a);
        pending.insert("corr-b".to_string(), tx_b);

        // Deliver b's reply first.
        let (_, waiter) = pending.remove("corr-b").unwrap();
        waiter.send(b"reply-b".to_vec()).unwrap();
        let (_, waiter) = pending.remove("corr-a").unwrap();
        waiter.send(b"reply-a".to_vec()).unwrap();

        assert_eq!(rx_a.await.unwrap(), b"reply-a");
        assert_eq!(rx_b.await.unwrap(), b"reply-b");
    }

    #[tokio::test]
    async fn reply_with_unknown_correlation_id_has_no_waiter_to_hit() {
        let pending: PendingReplies = Arc::new(DashMap::new());
        assert!(pending.remove("never-registered").is_none());
    }

    #[tokio::test]
    async fn timeout_removes_the_waiter_so_a_late_reply_is_dropped() {
        let pending: PendingReplies = Arc::new(DashMap::new());
        let (tx, rx) = oneshot::channel::<Vec<u8>>();
        pending.insert("corr-timeout".to_string(), tx);

        let result = tokio::time::timeout(Duration::from_millis(1), rx).await;
        assert!(result.is_err());

        pending.remove("corr-timeout");
        // A reply arriving after this point finds no waiter — simulating the
        // consumer task's miss path.
        assert!(pending.get("corr-timeout").is_none());
    }
}
