//! The stream path: one producer task polling a broker consumer, one writer
//! task turning its events into SSE frames. The only synchronization
//! between them is the bounded event channel and the stop flag; no lock
//! spans an I/O call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::broker::{BrokerClient, StreamConsumer};
use crate::quota::{self, Direction, QuotaRequest};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const HEARTBEAT_HARD_CAP: Duration = Duration::from_secs(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Client,
    Quota,
    Broker,
    Internal,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Client => "client",
            EndReason::Quota => "quota",
            EndReason::Broker => "broker",
            EndReason::Internal => "internal",
        }
    }
}

enum StreamEvent {
    Message(Vec<u8>),
    Heartbeat,
    Error(String),
}

/// One SSE frame handed to the HTTP layer: either a data line or a raw
/// comment line (used for heartbeats and the initial `: connected`).
pub enum SseFrame {
    Data(String),
    Comment(String),
}

#[derive(Serialize)]
struct MessageEnvelope<'a> {
    value: &'a serde_json::Value,
    timestamp: i64,
}

/// Shared stop signal between the producer and writer tasks.
#[derive(Clone)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll the consumer until `stop` is set, enqueuing `(MESSAGE, record)` for
/// every non-null record and a heartbeat every `HEARTBEAT_INTERVAL`. Fatal
/// consumer errors enqueue `(ERROR, err)` and end the task.
pub async fn producer_task(
    mut consumer: Box<dyn StreamConsumer>,
    sender: mpsc::Sender<StreamEvent>,
    stop: StopFlag,
) {
    let mut last_heartbeat = Instant::now();
    loop {
        if stop.is_set() {
            return;
        }

        let poll_result = tokio::time::timeout(POLL_TIMEOUT, consumer.poll()).await;
        match poll_result {
            Ok(Ok(Some(payload))) => {
                // Backpressure: messages must never be dropped, so this
                // blocks rather than using try_send.
                if sender.send(StreamEvent::Message(payload)).await.is_err() {
                    return;
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                let _ = sender.send(StreamEvent::Error(e.to_string())).await;
                return;
            }
            Err(_timeout) => {}
        }

        if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
            // Heartbeats may be dropped under backpressure; only messages
            // and errors must always get through.
            let _ = sender.try_send(StreamEvent::Heartbeat);
            last_heartbeat = Instant::now();
        }
    }
}

pub struct WriterOutcome {
    pub reason: EndReason,
}

/// Read the event channel, emitting SSE frames onto `frame_tx`. Returns
/// once the stream ends, naming the reason. A send failure on `frame_tx`
/// means the HTTP layer has dropped the connection (client disconnect).
pub async fn writer_task(
    mut receiver: mpsc::Receiver<StreamEvent>,
    stop: StopFlag,
    pool: &PgPool,
    tenant_id: Uuid,
    project_id: Uuid,
    frame_tx: mpsc::Sender<SseFrame>,
) -> WriterOutcome {
    let emit = |frame: SseFrame| {
        let frame_tx = frame_tx.clone();
        async move { frame_tx.send(frame).await.map_err(|_| ()) }
    };
    let mut last_heartbeat_emitted = Instant::now();

    loop {
        let received = tokio::time::timeout(POLL_TIMEOUT, receiver.recv()).await;
        match received {
            Ok(Some(StreamEvent::Message(payload))) => {
                let value: serde_json::Value = match serde_json::from_slice(&payload) {
                    Ok(v) => v,
                    Err(_) => {
                        tracing::warn!("skipping malformed stream record, not valid json");
                        continue;
                    }
                };
                let envelope = MessageEnvelope { value: &value, timestamp: chrono::Utc::now().timestamp() };
                // Byte accounting is measured over serde_json's compact encoding
                // (no separators), not the original's `json.dumps` default
                // `", "`/`": "` separators, so counts diverge slightly near
                // quota boundaries.
                let encoded = serde_json::to_vec(&envelope).expect("envelope always serializes");

                let quota_result = quota::check_and_increment(
                    pool,
                    QuotaRequest {
                        tenant_id,
                        project_id,
                        direction: Direction::Out,
                        messages: 1,
                        bytes: encoded.len() as i64,
                    },
                )
                .await;

                if quota_result.is_err() {
                    stop.set();
                    let _ = emit(SseFrame::Data(r#"{"error":"Quota exceeded"}"#.to_string())).await;
                    return WriterOutcome { reason: EndReason::Quota };
                }

                let body = serde_json::to_string(&envelope).expect("envelope always serializes");
                if emit(SseFrame::Data(body)).await.is_err() {
                    stop.set();
                    return WriterOutcome { reason: EndReason::Client };
                }
            }
            Ok(Some(StreamEvent::Heartbeat)) => {
                let text = format!("heartbeat {}", chrono::Utc::now().timestamp());
                if emit(SseFrame::Comment(text)).await.is_err() {
                    stop.set();
                    return WriterOutcome { reason: EndReason::Client };
                }
                last_heartbeat_emitted = Instant::now();
            }
            Ok(Some(StreamEvent::Error(_err))) => {
                stop.set();
                let _ = emit(SseFrame::Data(r#"{"error":"Consumer error"}"#.to_string())).await;
                return WriterOutcome { reason: EndReason::Broker };
            }
            Ok(None) => {
                stop.set();
                return WriterOutcome { reason: EndReason::Internal };
            }
            Err(_timeout) => {
                if last_heartbeat_emitted.elapsed() >= HEARTBEAT_INTERVAL {
                    let text = format!("heartbeat {}", chrono::Utc::now().timestamp());
                    if emit(SseFrame::Comment(text)).await.is_err() {
                        stop.set();
                        return WriterOutcome { reason: EndReason::Client };
                    }
                    last_heartbeat_emitted = Instant::now();
                }
            }
        }

        debug_assert!(last_heartbeat_emitted.elapsed() < HEARTBEAT_HARD_CAP + Duration::from_secs(5));
    }
}

pub fn new_event_channel() -> (mpsc::Sender<StreamEvent>, mpsc::Receiver<StreamEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Spawn both tasks backed by `broker`, wiring the stop flag between them.
/// SSE frames are pushed onto `frame_tx` as they're produced; the caller
/// owns the other end and turns them into wire bytes. Returns the writer
/// outcome once the stream ends; the producer is detached and exits on its
/// own once it observes the stop flag.
pub async fn run_stream(
    broker: Arc<dyn BrokerClient>,
    topic: &str,
    group_id: &str,
    pool: PgPool,
    tenant_id: Uuid,
    project_id: Uuid,
    frame_tx: mpsc::Sender<SseFrame>,
) -> Result<WriterOutcome, crate::broker::BrokerError> {
    let consumer = broker.open_consumer(topic, group_id).await?;
    let (sender, receiver) = new_event_channel();
    let stop = StopFlag::new();

    tokio::spawn(producer_task(consumer, sender, stop.clone()));

    let outcome = writer_task(receiver, stop, &pool, tenant_id, project_id, frame_tx).await;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_reason_strings_match_the_documented_set() {
        assert_eq!(EndReason::Client.as_str(), "client");
        assert_eq!(EndReason::Quota.as_str(), "quota");
        assert_eq!(EndReason::Broker.as_str(), "broker");
        assert_eq!(EndReason::Internal.as_str(), "internal");
    }

    #[test]
    fn stop_flag_starts_clear_and_latches() {
        let flag = StopFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }

    #[tokio::test]
    async fn producer_forwards_messages_until_stopped() {
        struct OneShotConsumer {
            sent: bool,
        }
        #[async_trait::async_trait]
        impl StreamConsumer for OneShotConsumer {
            async fn poll(&mut self) -> Result<Option<Vec<u8>>, crate::broker::BrokerError> {
                if self.sent {
                    Ok(None)
                } else {
                    self.sent = true;
                    Ok(Some(br#"{"k":"v"}"#.to_vec()))
                }
            }
        }

        let (sender, mut receiver) = new_event_channel();
        let stop = StopFlag::new();
        let producer_stop = stop.clone();
        let handle = tokio::spawn(producer_task(Box::new(OneShotConsumer { sent: false }), sender, producer_stop));

        let first = receiver.recv().await;
        assert!(matches!(first, Some(StreamEvent::Message(_))));

        stop.set();
        handle.await.unwrap();
    }
}
