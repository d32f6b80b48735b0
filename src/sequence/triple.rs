// ABOUTME: SGIP three-word sequence numbers (node id, MMDDHHMMSS, counter)
// ABOUTME: Mutex-guarded so concurrent callers never share a counter value

use crate::datatypes::timestamp;
use chrono::Local;
use parking_lot::Mutex;
use std::fmt;

/// Sequence field of every SGIP header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceTriple {
    pub node_id: u32,
    pub timestamp: u32,
    pub counter: u32,
}

impl fmt::Display for SequenceTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}{:010}{:08x}", self.node_id, self.timestamp, self.counter)
    }
}

#[derive(Debug)]
pub struct TripleSequence {
    node_id: u32,
    counter: Mutex<u32>,
}

impl TripleSequence {
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            counter: Mutex::new(0),
        }
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn next_val(&self) -> SequenceTriple {
        let counter = {
            let mut counter = self.counter.lock();
            *counter = counter.wrapping_add(1);
            *counter
        };
        SequenceTriple {
            node_id: self.node_id,
            timestamp: timestamp::mmddhhmmss(&Local::now()),
            counter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_advances_per_call() {
        let generator = TripleSequence::new(3053112345);
        let a = generator.next_val();
        let b = generator.next_val();
        assert_eq!(a.node_id, 3053112345);
        assert_eq!(b.counter, a.counter + 1);
    }

    #[test]
    fn display_is_fixed_width() {
        let triple = SequenceTriple {
            node_id: 1,
            timestamp: 1021080510,
            counter: 255,
        };
        assert_eq!(triple.to_string(), "00000000011021080510000000ff");
    }
}
