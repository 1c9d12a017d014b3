//! Per-connection `ObjectId` generation.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use bson::oid::ObjectId;
use rand::{rngs::OsRng, RngCore};

/// Generates `ObjectId`s with the canonical 12-byte layout: a 4-byte big-endian seconds
/// timestamp, 5 random bytes fixed for the lifetime of the generator, and a 3-byte
/// big-endian counter.
///
/// Each `Connection` owns one generator; the counter is monotonic within that connection
/// no matter how many tasks generate ids concurrently.
#[derive(Debug)]
pub(crate) struct ObjectIdGenerator {
    process_unique: [u8; 5],
    counter: AtomicU32,
}

impl ObjectIdGenerator {
    pub(crate) fn new() -> Self {
        let mut process_unique = [0u8; 5];
        OsRng.fill_bytes(&mut process_unique);

        Self {
            process_unique,
            counter: AtomicU32::new(OsRng.next_u32() & 0x00FF_FFFF),
        }
    }

    pub(crate) fn generate(&self) -> ObjectId {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(&self.process_unique);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);

        ObjectId::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ObjectIdGenerator;

    fn counter_of(id: &bson::oid::ObjectId) -> u32 {
        let bytes = id.bytes();
        u32::from_be_bytes([0, bytes[9], bytes[10], bytes[11]])
    }

    #[test]
    fn layout() {
        let generator = ObjectIdGenerator::new();
        let id = generator.generate();
        let bytes = id.bytes();

        let timestamp = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32;
        assert!(now - timestamp < 60);

        assert_eq!(&bytes[4..9], &generator.process_unique);
    }

    #[test]
    fn counter_increments_by_one() {
        let generator = ObjectIdGenerator::new();
        let first = counter_of(&generator.generate());
        for i in 1..100u32 {
            let next = counter_of(&generator.generate());
            assert_eq!(next, first.wrapping_add(i) & 0x00FF_FFFF);
        }
    }

    #[test]
    fn counter_is_monotonic_across_threads() {
        let generator = Arc::new(ObjectIdGenerator::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let generator = Arc::clone(&generator);
            handles.push(std::thread::spawn(move || {
                (0..250).map(|_| generator.generate()).collect::<Vec<_>>()
            }));
        }

        let mut counters: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|id| counter_of(&id))
            .collect();

        counters.sort_unstable();
        counters.dedup();
        assert_eq!(counters.len(), 1000);
    }
}
