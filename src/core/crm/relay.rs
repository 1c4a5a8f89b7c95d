//! Ordered per-call relay worker.
//!
//! The call actor submits messages without waiting on the network. One worker
//! per call delivers them in submission order, so a slow retry delays later
//! messages rather than reordering them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::client::TranscriptSink;
use super::payload::CrmMessage;

/// Default queue depth per call.
pub const DEFAULT_RELAY_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct RelayStats {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time relay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayCounters {
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct TranscriptRelay {
    tx: Option<mpsc::Sender<CrmMessage>>,
    stats: Arc<RelayStats>,
    worker: Option<JoinHandle<()>>,
}

impl TranscriptRelay {
    pub fn spawn(sink: Arc<dyn TranscriptSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<CrmMessage>(capacity.max(1));
        let stats = Arc::new(RelayStats::default());
        let worker_stats = stats.clone();

        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match sink.deliver(&message).await {
                    Ok(()) => {
                        worker_stats.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            call_id = %message.id,
                            sender = %message.sender_kind(),
                            error = %e,
                            "Transcript not recorded in CRM"
                        );
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            stats,
            worker: Some(worker),
        }
    }

    /// Queue a message. Returns false if it was dropped.
    pub fn submit(&self, message: CrmMessage) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        match tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(call_id = %message.id, "CRM relay queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(call_id = %message.id, "CRM relay closed, dropping message");
                false
            }
        }
    }

    pub fn counters(&self) -> RelayCounters {
        RelayCounters {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting messages and wait for the queued ones to be delivered.
    pub async fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            warn!("CRM relay worker ended abnormally: {}", e);
        }
    }
}

impl Drop for TranscriptRelay {
    fn drop(&mut self) {
        // Dropping the sender lets the worker drain and exit on its own
        self.tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crm::client::CrmError;
    use crate::core::crm::payload::{CrmChannel, SenderKind, SenderProfile};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        texts: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl TranscriptSink for RecordingSink {
        async fn deliver(&self, message: &CrmMessage) -> Result<(), CrmError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_on == Some(message.text()) {
                return Err(CrmError::Rejected {
                    status: 400,
                    body: "bad".into(),
                });
            }
            self.texts.lock().push(message.text().to_string());
            Ok(())
        }
    }

    fn channel() -> CrmChannel {
        CrmChannel {
            service_identifier: "1".into(),
            channel_type_code: "CX_VOICE".into(),
            bot: SenderProfile::new("b", "Bot"),
            connector: SenderProfile::new("c", "Connector"),
            agent: SenderProfile::new("a", "Agent"),
        }
    }

    #[tokio::test]
    async fn test_relay_preserves_order_and_drains_on_close() {
        let sink = Arc::new(RecordingSink {
            delay: Duration::from_millis(5),
            ..Default::default()
        });
        let mut relay = TranscriptRelay::spawn(sink.clone(), 16);
        let channel = channel();

        for text in ["one", "two", "three"] {
            assert!(relay.submit(channel.message("call", "cust", SenderKind::Bot, text)));
        }
        relay.close().await;

        assert_eq!(*sink.texts.lock(), vec!["one", "two", "three"]);
        let counters = relay.counters();
        assert_eq!(counters.submitted, 3);
        assert_eq!(counters.delivered, 3);
        assert_eq!(counters.failed, 0);
    }

    #[tokio::test]
    async fn test_relay_counts_failures_and_continues() {
        let sink = Arc::new(RecordingSink {
            fail_on: Some("bad"),
            ..Default::default()
        });
        let mut relay = TranscriptRelay::spawn(sink.clone(), 16);
        let channel = channel();

        relay.submit(channel.message("call", "cust", SenderKind::Connector, "bad"));
        relay.submit(channel.message("call", "cust", SenderKind::Connector, "good"));
        relay.close().await;

        assert_eq!(*sink.texts.lock(), vec!["good"]);
        assert_eq!(relay.counters().failed, 1);
        assert_eq!(relay.counters().delivered, 1);
    }

    #[tokio::test]
    async fn test_submit_after_close_is_dropped() {
        let mut relay = TranscriptRelay::spawn(Arc::new(RecordingSink::default()), 4);
        relay.close().await;

        assert!(!relay.submit(channel().message("call", "cust", SenderKind::Bot, "late")));
        assert_eq!(relay.counters().dropped, 1);
    }
}
