//! # Piped Peers Example
//!
//! Two in-process peers connected back to back. The "server" answers a few
//! methods through a `MethodRouter`, while the "client" sends requests,
//! a batch-sized burst of concurrent calls, and a notification.
//!
//! Run with `RUST_LOG=debug cargo run --example piped_peers` to watch the
//! traffic.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use turul_json_rpc_peer::prelude::*;

#[derive(Debug, Error)]
enum GreeterError {
    #[error("name must not be empty")]
    EmptyName,
}

impl ToJsonRpcError for GreeterError {
    fn to_error_object(&self) -> JsonRpcErrorObject {
        JsonRpcErrorObject::invalid_params(&self.to_string())
    }
}

struct Greeter;

#[async_trait]
impl JsonRpcHandler for Greeter {
    type Error = GreeterError;

    async fn handle(
        &self,
        method: &str,
        params: Option<RequestParams>,
        _context: Option<Value>,
    ) -> Result<Value, Self::Error> {
        let name = params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if name.is_empty() {
            return Err(GreeterError::EmptyName);
        }

        match method {
            "greet" => Ok(json!(format!("Hello, {}!", name))),
            _ => Ok(json!(format!("Goodbye, {}.", name))),
        }
    }

    async fn handle_notification(
        &self,
        method: &str,
        params: Option<RequestParams>,
        _context: Option<Value>,
    ) -> Result<(), Self::Error> {
        info!(method = %method, params = ?params.map(|p| p.to_value()), "Server notified");
        Ok(())
    }

    fn supported_methods(&self) -> Vec<String> {
        vec!["greet".to_string(), "farewell".to_string(), "log".to_string()]
    }
}

fn named(name: &str) -> Option<RequestParams> {
    let mut params = serde_json::Map::new();
    params.insert("name".to_string(), json!(name));
    Some(params.into())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut router = MethodRouter::new();
    router.register(Greeter);

    let server = Peer::builder()
        .with_config(PeerConfig::default().with_message_logging(true, true))
        .with_handler(router)
        .build();
    let client = Peer::new();
    client.pipe(server.clone()).pipe(client.clone());

    let greeting = client.send("greet", named("Ferris")).await?;
    info!("greet -> {}", greeting);

    let (a, b) = tokio::join!(
        client.send("greet", named("Alice")),
        client.send("farewell", named("Bob")),
    );
    info!("concurrent -> {} / {}", a?, b?);

    match client.send("greet", named("")).await {
        Err(error) => info!("rejected as expected: {}", error),
        Ok(value) => info!("unexpected success: {}", value),
    }

    client.notify("log", Some(vec![json!("done")].into()))?;
    tokio::task::yield_now().await;

    client.end();
    info!(server_ended = server.is_ended(), "Client ended");
    Ok(())
}
