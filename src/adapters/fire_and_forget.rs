//! Fire-and-Forget Adapter (C3).

use std::collections::BTreeMap;

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};
use serde_json::Value;

use crate::broker::topology::{bind_queue, declare_durable_queue, declare_fanout_exchange};
use crate::envelope::Envelope;
use crate::error::{AppError, AppResult};

use super::Adapter;

/// Publishes `{data, args}` onto a fanout exchange named after the endpoint,
/// with a durable queue of the same name bound to it so messages published
/// before any consumer starts are retained.
pub struct FireAndForgetAdapter {
    channel: Channel,
    exchange_name: String,
}

impl FireAndForgetAdapter {
    pub async fn init(channel: Channel, endpoint_name: &str) -> Result<Self, lapin::Error> {
        declare_fanout_exchange(&channel, endpoint_name).await?;
        declare_durable_queue(&channel, endpoint_name).await?;
        bind_queue(&channel, endpoint_name, endpoint_name, "").await?;

        Ok(Self {
            channel,
            exchange_name: endpoint_name.to_string(),
        })
    }
}

#[async_trait]
impl Adapter for FireAndForgetAdapter {
    async fn adapt(
        &self,
        data: Option<Value>,
        args: Option<BTreeMap<String, String>>,
    ) -> AppResult<Value> {
        let body = serde_json::to_vec(&Envelope::new(data, args))
            .expect("Envelope serialization is infallible");

        self.channel
            .basic_publish(
                &self.exchange_name,
                "",
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| AppError::AdapterFailure(e.to_string()))?
            .await
            .map_err(|e| AppError::AdapterFailure(e.to_string()))?;

        Ok(Value::Object(Default::default()))
    }
}
