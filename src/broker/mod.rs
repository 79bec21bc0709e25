//! Broker Gateway (C1).
//!
//! Owns the long-lived AMQP connection and hands out channels. Connect is
//! retried with backoff — a bridge process starting before its broker is up
//! is a normal deployment race, not a fault worth crashing over.

pub mod topology;

use std::time::Duration;

use lapin::{Channel, Connection, ConnectionProperties};
use tracing::{info, warn};

use crate::config::RabbitmqConfig;

pub struct BrokerGateway {
    connection: Connection,
}

impl BrokerGateway {
    /// Connect to the broker, retrying with exponential backoff (capped at
    /// 10s between attempts) until `max_wait` elapses.
    pub async fn connect(config: &RabbitmqConfig, max_wait: Duration) -> Result<Self, lapin::Error> {
        let uri = config.amqp_uri();
        let deadline = tokio::time::Instant::now() + max_wait;
        let mut delay = Duration::from_secs(1);

        loop {
            match Connection::connect(&uri, ConnectionProperties::default()).await {
                Ok(connection) => {
                    info!("connected to broker");
                    return Ok(Self { connection });
                }
                Err(err) if tokio::time::Instant::now() < deadline => {
                    warn!(error = %err, "broker connect failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(10));
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn channel(&self) -> Result<Channel, lapin::Error> {
        self.connection.create_channel().await
    }

    pub async fn close(&self) -> Result<(), lapin::Error> {
        self.connection
            .close(0, "shutting down")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_fails_fast_when_max_wait_is_zero() {
        let config = RabbitmqConfig {
            host: "127.0.0.1".into(),
            virtual_host: "/".into(),
            user: "guest".into(),
            password: "guest".into(),
        };
        // No broker listening on the default port in the test sandbox: the
        // very first attempt should fail, and with max_wait=0 there must be
        // no retry delay before the error is returned.
        let result = BrokerGateway::connect(&config, Duration::from_secs(0)).await;
        assert!(result.is_err());
    }
}
