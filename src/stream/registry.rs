//! Process-wide stream registry.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{
    distributions::{Alphanumeric, DistString},
    rngs::OsRng,
};
use tracing::info;

use crate::common::{Error, Result, Shared, StreamId};
use crate::config::{Config, ToolsConfig};
use crate::stream::Stream;

const STREAM_ID_LEN: usize = 16;

fn new_stream_id() -> StreamId {
    // Ids must be unguessable, not merely unique.
    Alphanumeric.sample_string(&mut OsRng, STREAM_ID_LEN)
}

pub struct Registry {
    streams: DashMap<StreamId, Shared<Stream>>,
    bitrate: u32,
    tools: ToolsConfig,
}

impl Registry {
    pub fn new(config: &Config) -> Self {
        Self {
            streams: DashMap::new(),
            bitrate: config.stream.bitrate,
            tools: config.tools.clone(),
        }
    }

    /// Create a stream and return its fresh id.
    pub fn create(&self) -> Result<StreamId> {
        let id = new_stream_id();
        let stream = Stream::new(self.bitrate, self.tools.clone())?;
        self.streams.insert(id.clone(), Arc::new(Mutex::new(stream)));
        info!("created stream {}", id);
        Ok(id)
    }

    /// Clone the handle out of the map so long operations never hold a map
    /// shard; the per-stream mutex is what serializes them.
    pub fn checkout(&self, id: &str) -> Result<Shared<Stream>> {
        self.streams
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| not_found(id))
    }

    pub fn append(&self, id: &str, filename: &str) -> Result<()> {
        let stream = self.checkout(id)?;
        stream.lock().append(filename, 0.0);
        Ok(())
    }

    pub fn advance(&self, id: &str, seconds: f64, sink: &mut Vec<u8>) -> Result<()> {
        let stream = self.checkout(id)?;
        let mut stream = stream.lock();
        stream.advance(seconds, sink)
    }

    /// Remove the stream; dropping it tears down any live decoders.
    pub fn destroy(&self, id: &str) -> Result<()> {
        match self.streams.remove(id) {
            Some(_) => {
                info!("destroyed stream {}", id);
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.streams.len()
    }
}

fn not_found(id: &str) -> Error {
    Error::NotFound(format!("Stream id \"{}\" not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> Registry {
        Registry::new(&Config::default())
    }

    #[test]
    fn ids_are_sixteen_alphanumeric_chars() {
        for _ in 0..64 {
            let id = new_stream_id();
            assert_eq!(id.len(), STREAM_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn lifecycle_restores_cardinality() {
        let registry = test_registry();
        let before = registry.len();

        let id = registry.create().unwrap();
        registry.append(&id, "a.flac").unwrap();
        assert_eq!(registry.len(), before + 1);

        registry.destroy(&id).unwrap();
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = test_registry();
        let err = registry.append("deadbeef", "a.flac").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "Stream id \"deadbeef\" not found");

        assert!(matches!(
            registry.destroy("deadbeef"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            registry.advance("deadbeef", 5.0, &mut Vec::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn destroy_is_single_shot() {
        let registry = test_registry();
        let id = registry.create().unwrap();
        registry.destroy(&id).unwrap();
        assert!(matches!(registry.destroy(&id), Err(Error::NotFound(_))));
    }
}
