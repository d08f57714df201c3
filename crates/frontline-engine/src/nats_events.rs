//! NATS feed of live game events.
//!
//! Subscribes to `frontline.events.>` and hands every decoded
//! [`GameEvent`] to the [`IngestRouter`]. Payloads are JSON objects tagged
//! with `kind` (`control`, `login`, `logout`). Undecodable payloads are
//! logged and skipped.

use std::sync::Arc;

use frontline_core::{IngestRouter, ShutdownSignal};
use frontline_types::GameEvent;
use futures::StreamExt as _;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Subject pattern carrying live events.
pub const EVENT_SUBJECT: &str = "frontline.events.>";

/// Decode one event payload.
pub fn decode_event(payload: &[u8]) -> Result<GameEvent, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Connected event feed.
#[derive(Debug)]
pub struct NatsEventFeed {
    subscriber: async_nats::Subscriber,
}

impl NatsEventFeed {
    /// Connect to NATS and subscribe to [`EVENT_SUBJECT`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection or subscription fails.
    pub async fn connect(url: &str) -> Result<Self, EngineError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url).await.map_err(|e| EngineError::Nats {
            message: format!("failed to connect to {url}: {e}"),
        })?;
        let subscriber = client
            .subscribe(EVENT_SUBJECT.to_owned())
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to subscribe to {EVENT_SUBJECT}: {e}"),
            })?;
        info!(subject = EVENT_SUBJECT, "subscribed to live events");
        Ok(Self { subscriber })
    }

    /// Forward events to `router` until `shutdown` fires or the
    /// subscription ends.
    pub async fn run(mut self, router: Arc<IngestRouter>, shutdown: Arc<ShutdownSignal>) {
        let mut received: u64 = 0;
        loop {
            let message = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                message = self.subscriber.next() => message,
            };
            let Some(message) = message else {
                warn!("event subscription closed");
                break;
            };

            match decode_event(&message.payload) {
                Ok(event) => {
                    received = received.saturating_add(1);
                    router.route(event).await;
                }
                Err(e) => {
                    warn!(
                        anomaly = "malformed_event",
                        subject = %message.subject,
                        error = %e,
                        "dropping undecodable event"
                    );
                }
            }
        }
        if let Err(e) = self.subscriber.unsubscribe().await {
            debug!(error = %e, "unsubscribe failed");
        }
        info!(received, "event feed stopped");
    }
}
