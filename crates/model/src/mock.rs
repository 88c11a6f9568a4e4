//! Scriptable model client for tests
//!
//! Streams come from real channels so tests can exercise the same suspension
//! points the production client has — including feeding fragments by hand to
//! interleave an eviction mid-stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{FragmentReceiver, ModelClient, ModelError, Turn};

type StreamItem = Result<String, ModelError>;

/// Test double for [`ModelClient`]. Each `open_stream` call consumes the next
/// queued stream; like the production client it records the user turn up
/// front and folds the accumulated assistant text into memory when the stream
/// ends without an error item.
pub struct MockModelClient {
    memory: Arc<Mutex<Vec<Turn>>>,
    streams: Mutex<VecDeque<mpsc::Receiver<StreamItem>>>,
    missing_credential: bool,
}

impl MockModelClient {
    /// One pre-scripted stream per inner vec, delivered in order.
    pub fn scripted(turns: Vec<Vec<StreamItem>>) -> Self {
        let mut streams = VecDeque::new();
        for items in turns {
            let (tx, rx) = mpsc::channel(items.len().max(1));
            for item in items {
                tx.try_send(item).expect("scripted channel sized to fit");
            }
            streams.push_back(rx);
        }
        Self {
            memory: Arc::new(Mutex::new(Vec::new())),
            streams: Mutex::new(streams),
            missing_credential: false,
        }
    }

    /// `count` manually-fed streams; the returned senders feed them. Dropping
    /// a sender ends its stream.
    pub fn manual(count: usize) -> (Self, Vec<mpsc::Sender<StreamItem>>) {
        let mut streams = VecDeque::new();
        let mut senders = Vec::new();
        for _ in 0..count {
            let (tx, rx) = mpsc::channel(64);
            streams.push_back(rx);
            senders.push(tx);
        }
        let client = Self {
            memory: Arc::new(Mutex::new(Vec::new())),
            streams: Mutex::new(streams),
            missing_credential: false,
        };
        (client, senders)
    }

    /// A client with no usable credential: every `open_stream` fails fast.
    pub fn without_credential() -> Self {
        Self {
            memory: Arc::new(Mutex::new(Vec::new())),
            streams: Mutex::new(VecDeque::new()),
            missing_credential: true,
        }
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn open_stream(&self, user_input: &str) -> Result<FragmentReceiver, ModelError> {
        if self.missing_credential {
            return Err(ModelError::MissingCredential);
        }

        self.memory
            .lock()
            .expect("memory lock poisoned")
            .push(Turn::user(user_input));

        let mut inner = self
            .streams
            .lock()
            .expect("streams lock poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                // No script left: a zero-length stream.
                let (_tx, rx) = mpsc::channel(1);
                rx
            });

        let (tx, rx) = mpsc::channel(64);
        let memory = self.memory.clone();
        tokio::spawn(async move {
            let mut assistant_text = String::new();
            while let Some(item) = inner.recv().await {
                let errored = item.is_err();
                if let Ok(fragment) = &item {
                    assistant_text.push_str(fragment);
                }
                if tx.send(item).await.is_err() || errored {
                    return;
                }
            }
            memory
                .lock()
                .expect("memory lock poisoned")
                .push(Turn::assistant(assistant_text));
        });

        Ok(rx)
    }

    fn memory(&self) -> Vec<Turn> {
        self.memory.lock().expect("memory lock poisoned").clone()
    }

    fn set_memory(&self, turns: Vec<Turn>) {
        *self.memory.lock().expect("memory lock poisoned") = turns;
    }
}
