// ABOUTME: Cyclic 32-bit sequence numbers for CMPP and SMGP headers
// ABOUTME: Lock-free counter tagged with datacenter and worker bits, wrapping silently

use std::sync::atomic::{AtomicU32, Ordering};

const COUNTER_MASK: u32 = (1 << 26) - 1;

/// `[1-bit datacenter | 3-bit worker | 28 bits whose low 26 hold a rolling counter]`
///
/// Only short-term uniqueness is promised; the counter wraps after 2^26 ids.
#[derive(Debug)]
pub struct Cycle32 {
    prefix: u32,
    counter: AtomicU32,
}

impl Cycle32 {
    pub fn new(datacenter: u8, worker: u8) -> Self {
        let prefix = (u32::from(datacenter) & 0x1) << 31 | (u32::from(worker) & 0x7) << 28;
        Self {
            prefix,
            counter: AtomicU32::new(0),
        }
    }

    pub fn next_val(&self) -> u32 {
        let n = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        self.prefix | (n & COUNTER_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_prefix_bits() {
        let generator = Cycle32::new(1, 5);
        let value = generator.next_val();
        assert_eq!(value >> 31, 1);
        assert_eq!((value >> 28) & 0x7, 5);
        assert_eq!(value & COUNTER_MASK, 1);
        assert_eq!(generator.next_val() & COUNTER_MASK, 2);
    }

    #[test]
    fn wraps_within_counter_bits() {
        let generator = Cycle32::new(0, 1);
        generator.counter.store(COUNTER_MASK, Ordering::Relaxed);
        let value = generator.next_val();
        assert_eq!(value & COUNTER_MASK, 0);
        assert_eq!(value >> 28, 1);
    }
}
