//! Optional network mirror for the event recorder: pushes each event to a Redis list keyed
//! `<prefix>:run:<id>:events`, refreshing a 7-day (configurable) expiry on every push.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::{Error, Result};
use crate::events::RunEvent;

use super::{EventSink, MirrorReader};

pub struct RedisMirrorRecorder {
    client: redis::Client,
    key_prefix: String,
    ttl_seconds: u64,
}

impl RedisMirrorRecorder {
    pub fn new(redis_url: &str, key_prefix: impl Into<String>, ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Recorder(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            ttl_seconds,
        })
    }

    fn events_key(&self, run_id: &str) -> String {
        format!("{}:run:{}:events", self.key_prefix, run_id)
    }
}

#[async_trait]
impl EventSink for RedisMirrorRecorder {
    async fn append(&mut self, event: &RunEvent) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Recorder(e.to_string()))?;
        let key = self.events_key(&event.run_id);
        let payload = serde_json::to_string(event)?;

        let _: () = conn
            .rpush(&key, payload)
            .await
            .map_err(|e| Error::Recorder(e.to_string()))?;
        let _: () = conn
            .expire(&key, self.ttl_seconds as i64)
            .await
            .map_err(|e| Error::Recorder(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MirrorReader for RedisMirrorRecorder {
    async fn read_events(&self, run_id: &str) -> Result<Vec<RunEvent>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Recorder(e.to_string()))?;
        let key = self.events_key(run_id);
        let raw: Vec<String> = conn
            .lrange(&key, 0, -1)
            .await
            .map_err(|e| Error::Recorder(e.to_string()))?;

        let mut events = Vec::with_capacity(raw.len());
        for line in raw {
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}
