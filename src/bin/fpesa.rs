//! CLI entry point: four subcommands sharing the same broker-connect and
//! config-load plumbing, mirroring the original bridge's single `argparse`
//! entry point with `-v`/`-q` verbosity counters instead of four separate
//! binaries.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fpesa::broker::BrokerGateway;
use fpesa::config::Config;
use fpesa::liveupdate::ConnectionRegistry;
use fpesa::restmapper::endpoints::standard_endpoints;
use fpesa::restmapper::build_router;
use fpesa::workers;
use tracing_subscriber::EnvFilter;

/// Broker connect retry budget before a subcommand gives up and exits.
const BROKER_CONNECT_MAX_WAIT: Duration = Duration::from_secs(30);

/// RPC reply timeout used by the `GET /messages/` request/response adapter.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "fpesa", about = "REST/WebSocket to AMQP bridge")]
struct Cli {
    /// More verbose (repeatable, lowers the log level by 10 per occurrence).
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// More quiet (repeatable, raises the log level by 10 per occurrence).
    #[arg(short = 'q', action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the REST-to-AMQP endpoint dispatcher.
    Restmapper {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 8081)]
        port: u16,
    },
    /// Run the WebSocket live-update fanout server.
    Liveupdate {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 8082)]
        port: u16,
    },
    /// Run the Post Worker: persists `/messages/:POST` traffic to the store.
    MessagesPost,
    /// Run the Get Worker: answers `/messages/:GET` RPC reads.
    MessagesGet {
        /// Include the underlying error text in failure replies instead of
        /// a generic description.
        #[arg(long)]
        debug: bool,
    },
}

/// `level := clamp(30 - 10*verbose + 10*quiet, 10, 50)`, matching the
/// original's `max(10, min(50, sum(loglevel)))` with a `[30]` default.
fn log_level(verbose: u8, quiet: u8) -> &'static str {
    let level = 30 - 10 * i32::from(verbose) + 10 * i32::from(quiet);
    match level.clamp(10, 50) {
        10 => "debug",
        20 => "info",
        30 => "warn",
        40 => "error",
        _ => "error",
    }
}

fn init_tracing(verbose: u8, quiet: u8) {
    let level = log_level(verbose, quiet);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting fpesa");

    let config = Config::load().expect("failed to load configuration");

    match cli.command {
        Command::Restmapper { bind, port } => {
            let gateway = BrokerGateway::connect(&config.rabbitmq, BROKER_CONNECT_MAX_WAIT)
                .await
                .expect("failed to connect to broker");
            let endpoints = standard_endpoints(&gateway, RPC_TIMEOUT)
                .await
                .expect("failed to declare standard endpoints");
            let router = build_router(endpoints);

            let addr: SocketAddr = format!("{bind}:{port}").parse().expect("invalid bind address");
            tracing::info!(%addr, "restmapper listening");
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .expect("failed to bind to address");
            axum::serve(listener, router)
                .await
                .expect("restmapper server failed");
        }
        Command::Liveupdate { bind, port } => {
            let gateway = BrokerGateway::connect(&config.rabbitmq, BROKER_CONNECT_MAX_WAIT)
                .await
                .expect("failed to connect to broker");
            let registry = ConnectionRegistry::new();

            let consumer_registry = registry.clone();
            let consumer_task = tokio::spawn(async move {
                if let Err(error) =
                    fpesa::liveupdate::run_consumer(&gateway, consumer_registry).await
                {
                    tracing::error!(%error, "liveupdate consumer stopped");
                }
            });

            let router = fpesa::liveupdate::router(registry);
            let addr: SocketAddr = format!("{bind}:{port}").parse().expect("invalid bind address");
            tracing::info!(%addr, "liveupdate listening");
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .expect("failed to bind to address");

            tokio::select! {
                result = axum::serve(listener, router) => {
                    result.expect("liveupdate server failed");
                }
                _ = consumer_task => {}
            }
        }
        Command::MessagesPost => {
            let gateway = BrokerGateway::connect(&config.rabbitmq, BROKER_CONNECT_MAX_WAIT)
                .await
                .expect("failed to connect to broker");
            let pool = fpesa::store::create_pool(&config.postgres.connection_string())
                .await
                .expect("failed to connect to store");
            workers::post::run(&gateway, &pool)
                .await
                .expect("post worker stopped");
        }
        Command::MessagesGet { debug } => {
            let gateway = BrokerGateway::connect(&config.rabbitmq, BROKER_CONNECT_MAX_WAIT)
                .await
                .expect("failed to connect to broker");
            let pool = fpesa::store::create_pool(&config.postgres.connection_string())
                .await
                .expect("failed to connect to store");
            workers::get::run(&gateway, &pool, debug)
                .await
                .expect("get worker stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_verbosity_is_warn() {
        assert_eq!(log_level(0, 0), "warn");
    }

    #[test]
    fn verbose_lowers_level_towards_debug() {
        assert_eq!(log_level(2, 0), "debug");
    }

    #[test]
    fn quiet_raises_level_towards_error() {
        assert_eq!(log_level(0, 2), "error");
    }

    #[test]
    fn level_clamps_at_extremes() {
        assert_eq!(log_level(10, 0), "debug");
        assert_eq!(log_level(0, 10), "error");
    }
}
