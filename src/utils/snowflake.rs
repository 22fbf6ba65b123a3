use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

// 2023-01-01 00:00:00 UTC
const EPOCH_MS: u64 = 1_672_531_200_000;

const DATACENTER_BITS: u64 = 5;
const WORKER_BITS: u64 = 5;
const SEQUENCE_BITS: u64 = 12;

const MAX_DATACENTER_ID: u64 = (1 << DATACENTER_BITS) - 1;
const MAX_WORKER_ID: u64 = (1 << WORKER_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

const WORKER_SHIFT: u64 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u64 = SEQUENCE_BITS + WORKER_BITS;
const TIMESTAMP_SHIFT: u64 = SEQUENCE_BITS + WORKER_BITS + DATACENTER_BITS;

/// Snowflake-style 64-bit id generator.
///
/// Layout (MSB to LSB): 1 reserved zero bit, 41 bits of milliseconds since
/// `EPOCH_MS`, 5 bits datacenter id, 5 bits worker id, 12 bits sequence.
/// Ids from a single generator are strictly increasing, including across
/// parallel callers.
pub struct SnowflakeGenerator {
    datacenter_id: u64,
    worker_id: u64,
    state: Mutex<GeneratorState>,
}

struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

impl SnowflakeGenerator {
    pub fn new(datacenter_id: u64, worker_id: u64) -> Result<Self, String> {
        if datacenter_id > MAX_DATACENTER_ID {
            return Err(format!(
                "datacenter id must be in 0-{}, got {}",
                MAX_DATACENTER_ID, datacenter_id
            ));
        }
        if worker_id > MAX_WORKER_ID {
            return Err(format!(
                "worker id must be in 0-{}, got {}",
                MAX_WORKER_ID, worker_id
            ));
        }

        Ok(Self {
            datacenter_id,
            worker_id,
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        })
    }

    pub fn next_id(&self) -> i64 {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut timestamp = current_millis();

        // Clock went backwards: busy-wait until it catches up rather than
        // risk emitting a duplicate or out-of-order id.
        if timestamp < state.last_timestamp {
            timestamp = next_millis(state.last_timestamp);
        }

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond.
                timestamp = next_millis(state.last_timestamp);
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = timestamp;

        let id = ((timestamp - EPOCH_MS) << TIMESTAMP_SHIFT)
            | (self.datacenter_id << DATACENTER_SHIFT)
            | (self.worker_id << WORKER_SHIFT)
            | state.sequence;

        id as i64
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn next_millis(last: u64) -> u64 {
    let mut now = current_millis();
    while now <= last {
        std::hint::spin_loop();
        now = current_millis();
    }
    now
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn rejects_out_of_range_node_ids() {
        assert!(SnowflakeGenerator::new(32, 0).is_err());
        assert!(SnowflakeGenerator::new(0, 32).is_err());
        assert!(SnowflakeGenerator::new(31, 31).is_ok());
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let gen = SnowflakeGenerator::new(1, 1).unwrap();
        let mut last = gen.next_id();
        for _ in 0..10_000 {
            let id = gen.next_id();
            assert!(id > last, "{} should be greater than {}", id, last);
            last = id;
        }
    }

    #[test]
    fn ids_are_positive() {
        let gen = SnowflakeGenerator::new(31, 31).unwrap();
        for _ in 0..100 {
            assert!(gen.next_id() > 0);
        }
    }

    #[test]
    fn no_duplicates_across_parallel_callers() {
        let gen = Arc::new(SnowflakeGenerator::new(2, 3).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let gen = gen.clone();
            handles.push(std::thread::spawn(move || {
                (0..2_000).map(|_| gen.next_id()).collect::<Vec<i64>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 16_000);
    }

    #[test]
    fn node_bits_are_embedded() {
        let gen = SnowflakeGenerator::new(5, 9).unwrap();
        let id = gen.next_id() as u64;
        assert_eq!((id >> DATACENTER_SHIFT) & MAX_DATACENTER_ID, 5);
        assert_eq!((id >> WORKER_SHIFT) & MAX_WORKER_ID, 9);
    }
}
