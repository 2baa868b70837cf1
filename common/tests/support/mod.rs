// Recording fakes for the queue and object store seams
#![allow(dead_code)]

use async_trait::async_trait;
use common::errors::{QueueError, StorageError};
use common::queue::{EventConsumer, MessageQueue, QueueMessage};
use common::storage::ObjectStore;
use common::worker::Dependencies;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const BUCKET: &str = "bucket";
pub const PNG_HEADER: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR\x00\x00\x00\x01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(String),
    Remove(String),
}

/// Object store that serves in-memory objects and records every call
pub struct RecordingStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<(StoreCall, Instant)>>,
    fail_reads: bool,
    fail_removes: bool,
    panic_on_read: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_reads: false,
            fail_removes: false,
            panic_on_read: false,
        }
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::new()
        }
    }

    pub fn failing_removes() -> Self {
        Self {
            fail_removes: true,
            ..Self::new()
        }
    }

    pub fn panicking_reads() -> Self {
        Self {
            panic_on_read: true,
            ..Self::new()
        }
    }

    pub fn with_object(self, key: &str, data: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Remove(key) => Some(key),
                StoreCall::Get(_) => None,
            })
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn get_object(&self, key: &str, limit: usize) -> Result<Vec<u8>, StorageError> {
        self.record(StoreCall::Get(key.to_string()));
        if self.panic_on_read {
            panic!("storage client bug reading '{}'", key);
        }
        if self.fail_reads {
            return Err(StorageError::MinioError("connection reset".to_string()));
        }
        let objects = self.objects.lock().unwrap();
        let data = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(data[..data.len().min(limit)].to_vec())
    }

    async fn remove_object(&self, key: &str) -> Result<(), StorageError> {
        self.record(StoreCall::Remove(key.to_string()));
        if self.fail_removes {
            return Err(StorageError::UnexpectedStatus {
                path: key.to_string(),
                status: 500,
            });
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn bucket_name(&self) -> &str {
        BUCKET
    }
}

#[derive(Default)]
struct QueueState {
    backlog: VecDeque<Result<QueueMessage, String>>,
    fetches: Vec<Instant>,
    commits: Vec<(u64, Instant)>,
    next_offset: u64,
}

/// In-memory topic with one consumer group; records fetches and commits
#[derive(Clone, Default)]
pub struct ScriptedQueue {
    state: Arc<Mutex<QueueState>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    fail_open: bool,
}

impl ScriptedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Append a message and return its offset
    pub fn push(&self, value: impl Into<Vec<u8>>) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_offset += 1;
        let offset = state.next_offset;
        state.backlog.push_back(Ok(QueueMessage {
            key: b"minio.events".to_vec(),
            value: value.into(),
            offset,
        }));
        offset
    }

    /// Make the next fetch fail with a transport error
    pub fn push_fetch_error(&self, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .backlog
            .push_back(Err(reason.to_string()));
    }

    pub fn committed(&self) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .commits
            .iter()
            .map(|(offset, _)| *offset)
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetches.len()
    }

    /// Timestamps of every fetch and commit
    pub fn call_times(&self) -> Vec<Instant> {
        let state = self.state.lock().unwrap();
        state
            .fetches
            .iter()
            .copied()
            .chain(state.commits.iter().map(|(_, at)| *at))
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageQueue for ScriptedQueue {
    async fn open_consumer(
        &self,
        _topic: &str,
        _group_id: &str,
    ) -> Result<Box<dyn EventConsumer>, QueueError> {
        if self.fail_open {
            return Err(QueueError::ConsumerCreation("no brokers available".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConsumer {
            queue: self.clone(),
        }))
    }
}

struct ScriptedConsumer {
    queue: ScriptedQueue,
}

#[async_trait]
impl EventConsumer for ScriptedConsumer {
    async fn fetch_next(&mut self, cancel: &CancellationToken) -> Result<QueueMessage, QueueError> {
        self.queue.state.lock().unwrap().fetches.push(Instant::now());
        loop {
            let next = self.queue.state.lock().unwrap().backlog.pop_front();
            match next {
                Some(Ok(message)) => return Ok(message),
                Some(Err(reason)) => return Err(QueueError::ConsumeFailed(reason)),
                None => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }
    }

    async fn commit(&mut self, message: &QueueMessage) -> Result<(), QueueError> {
        self.queue
            .state
            .lock()
            .unwrap()
            .commits
            .push((message.offset, Instant::now()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        self.queue.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn deps(queue: &ScriptedQueue, store: Arc<RecordingStore>) -> Arc<Dependencies> {
    Arc::new(Dependencies::new(Arc::new(queue.clone()), store))
}

pub fn event(event_name: &str, key: &str) -> Vec<u8> {
    json!({
        "EventName": event_name,
        "Key": key,
        "Records": [{"eventVersion": "2.0", "eventSource": "minio:s3"}]
    })
    .to_string()
    .into_bytes()
}

/// Poll `condition` until it holds or the timeout elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
