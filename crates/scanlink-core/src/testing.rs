//! In-memory sinks for unit tests.

use crate::session::{Session, SessionId, SessionSink, SinkError};
use async_trait::async_trait;
use scanlink_protocol::BroadcastMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
pub(crate) enum SinkBehavior {
    Deliver,
    Fail,
    Stall,
}

#[derive(Debug, Default)]
pub(crate) struct SinkLog {
    attempts: AtomicUsize,
    closes: AtomicUsize,
    delivered: Mutex<Vec<BroadcastMessage>>,
}

impl SinkLog {
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn delivered_text(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m.as_text().map(str::to_string))
            .collect()
    }
}

pub(crate) struct TestSink {
    behavior: SinkBehavior,
    log: Arc<SinkLog>,
}

#[async_trait]
impl SessionSink for TestSink {
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SinkError> {
        self.log.attempts.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            SinkBehavior::Deliver => {
                self.log.delivered.lock().unwrap().push(message.clone());
                Ok(())
            }
            SinkBehavior::Fail => Err(SinkError::transport("broken pipe")),
            SinkBehavior::Stall => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn session(behavior: SinkBehavior) -> (Arc<Session>, Arc<SinkLog>) {
    let log = Arc::new(SinkLog::default());
    let sink = TestSink {
        behavior,
        log: Arc::clone(&log),
    };
    (Arc::new(Session::new(SessionId::next(), sink)), log)
}
