// ABOUTME: Snowflake-style 64-bit id generator used for message ids and query ids
// ABOUTME: Packs a millisecond timestamp, datacenter, worker and per-millisecond counter

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// 2020-01-01T00:00:00+08:00 in Unix milliseconds
pub const EPOCH_MS: u64 = 1_577_808_000_000;

const WORKER_BITS: u32 = 7;
const DATACENTER_BITS: u32 = 3;
const SEQUENCE_BITS: u32 = 12;

const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u32 = SEQUENCE_BITS + WORKER_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_BITS + DATACENTER_BITS;

#[derive(Debug)]
struct State {
    last_ms: u64,
    sequence: u64,
}

/// `[41-bit ms since EPOCH_MS | 3-bit datacenter | 7-bit worker | 12-bit counter]`
///
/// Ids are strictly increasing per generator. When the counter for the
/// current millisecond is exhausted the caller spins until the clock ticks.
#[derive(Debug)]
pub struct Snowflake {
    datacenter: u64,
    worker: u64,
    state: Mutex<State>,
}

impl Snowflake {
    /// Out-of-range datacenter/worker ids are masked to their bit widths.
    pub fn new(datacenter: u8, worker: u8) -> Self {
        Self {
            datacenter: u64::from(datacenter) & ((1 << DATACENTER_BITS) - 1),
            worker: u64::from(worker) & ((1 << WORKER_BITS) - 1),
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn next_val(&self) -> u64 {
        let mut state = self.state.lock();
        // a clock that steps backwards keeps issuing from the last seen millisecond
        let mut now = current_millis().max(state.last_ms);

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                while now <= state.last_ms {
                    std::hint::spin_loop();
                    now = current_millis();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        (now.saturating_sub(EPOCH_MS) << TIMESTAMP_SHIFT)
            | (self.datacenter << DATACENTER_SHIFT)
            | (self.worker << WORKER_SHIFT)
            | state.sequence
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_are_strictly_increasing() {
        let generator = Snowflake::new(1, 2);
        let mut last = 0;
        for _ in 0..10_000 {
            let id = generator.next_val();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn embeds_datacenter_and_worker() {
        let id = Snowflake::new(5, 100).next_val();
        assert_eq!((id >> DATACENTER_SHIFT) & 0x7, 5);
        assert_eq!((id >> WORKER_SHIFT) & 0x7f, 100);
    }

    #[test]
    fn no_collisions_across_threads() {
        let generator = Arc::new(Snowflake::new(0, 0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || (0..5_000).map(|_| generator.next_val()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 20_000);
    }
}
