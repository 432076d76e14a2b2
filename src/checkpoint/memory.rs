// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory checkpoint store.
//!
//! Default backend for tests and single-process runs. Keeps the raw record
//! log per thread; folding happens on read so behavior matches the SQLite
//! backend exactly.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CheckpointError;

use super::{
    derive_hydration_events, split_thread_key, CheckpointDelta, CheckpointRecord, CheckpointStore,
    HydrationEvent, ThreadState, ThreadSummary,
};

/// Checkpoint store backed by a process-local map.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    // Locked briefly per operation; never held across an await.
    threads: Mutex<HashMap<String, Vec<CheckpointRecord>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<CheckpointRecord>>>, CheckpointError> {
        self.threads
            .lock()
            .map_err(|_| CheckpointError::Corrupted("checkpoint map poisoned".to_string()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, thread_key: &str) -> Result<Option<ThreadState>, CheckpointError> {
        let threads = self.lock()?;
        Ok(threads
            .get(thread_key)
            .map(|records| ThreadState::from_records(records)))
    }

    async fn put(
        &self,
        thread_key: &str,
        delta: CheckpointDelta,
    ) -> Result<CheckpointRecord, CheckpointError> {
        let mut threads = self.lock()?;
        let records = threads.entry(thread_key.to_string()).or_default();
        let record = CheckpointRecord::new(records.len() as u64, delta);
        records.push(record.clone());
        Ok(record)
    }

    async fn delete_thread(&self, thread_key: &str) -> Result<bool, CheckpointError> {
        let mut threads = self.lock()?;
        Ok(threads.remove(thread_key).is_some())
    }

    async fn list(&self, session_id: Option<&str>) -> Result<Vec<ThreadSummary>, CheckpointError> {
        let threads = self.lock()?;
        let mut summaries: Vec<ThreadSummary> = threads
            .iter()
            .filter(|(key, _)| match session_id {
                Some(session) => split_thread_key(key).map(|(s, _)| s) == Some(session),
                None => true,
            })
            .filter_map(|(key, records)| {
                records.last().map(|last| ThreadSummary {
                    thread_key: key.clone(),
                    checkpoints: records.len() as u64,
                    last_write: last.created_at.clone(),
                })
            })
            .collect();
        summaries.sort_by(|a, b| a.thread_key.cmp(&b.thread_key));
        Ok(summaries)
    }

    async fn read_hydration_events(
        &self,
        thread_key: &str,
    ) -> Result<Vec<HydrationEvent>, CheckpointError> {
        let threads = self.lock()?;
        let agent = split_thread_key(thread_key)
            .map(|(_, agent)| agent)
            .unwrap_or(thread_key);
        Ok(threads
            .get(thread_key)
            .map(|records| derive_hydration_events(agent, records))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::thread_key;
    use crate::types::{Message, SuspensionPoint};

    #[tokio::test]
    async fn test_get_unknown_thread_is_none() {
        let store = MemoryCheckpointStore::new();
        assert!(store.get("missing#Agent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_assigns_ascending_sequences() {
        let store = MemoryCheckpointStore::new();
        let key = thread_key("s1", "A");

        let first = store
            .put(&key, CheckpointDelta::append(Message::user("one")))
            .await
            .unwrap();
        let second = store
            .put(&key, CheckpointDelta::append(Message::assistant("two")))
            .await
            .unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_ne!(first.id, second.id);

        let state = store.get(&key).await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_suspension_round_trip() {
        let store = MemoryCheckpointStore::new();
        let key = thread_key("s1", "A");

        store
            .put(
                &key,
                CheckpointDelta::suspend(SuspensionPoint::AwaitingDelegateReply {
                    delegate: "B".to_string(),
                    forwarded_text: "go".to_string(),
                }),
            )
            .await
            .unwrap();

        let state = store.get(&key).await.unwrap().unwrap();
        assert!(state.is_suspended());
        assert_eq!(state.suspension.expected_resume(), "delegateReply");
    }

    #[tokio::test]
    async fn test_delete_thread() {
        let store = MemoryCheckpointStore::new();
        let key = thread_key("s1", "A");
        store
            .put(&key, CheckpointDelta::append(Message::user("x")))
            .await
            .unwrap();

        assert!(store.delete_thread(&key).await.unwrap());
        assert!(!store.delete_thread(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_session() {
        let store = MemoryCheckpointStore::new();
        for key in ["s1#A", "s1#B", "s2#A"] {
            store
                .put(key, CheckpointDelta::append(Message::user("x")))
                .await
                .unwrap();
        }

        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let s1 = store.list(Some("s1")).await.unwrap();
        let keys: Vec<_> = s1.iter().map(|t| t.thread_key.as_str()).collect();
        assert_eq!(keys, vec!["s1#A", "s1#B"]);
    }

    #[tokio::test]
    async fn test_read_hydration_events_for_thread() {
        let store = MemoryCheckpointStore::new();
        let key = thread_key("s1", "Assistant");
        store
            .put(&key, CheckpointDelta::append(Message::user("hello")))
            .await
            .unwrap();

        let events = store.read_hydration_events(&key).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].agent, "Assistant");
    }
}
