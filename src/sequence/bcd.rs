// ABOUTME: BCD message-id generator for SMGP (worker code, MMDDHHMM stamp, rolling counter)
// ABOUTME: Emits 10-byte ids whose counter resets every minute and wraps at a fixed maximum

use crate::datatypes::timestamp;
use chrono::Local;
use parking_lot::Mutex;

/// Counter ceiling (six decimal digits)
pub const COUNTER_MAX: u32 = 1_000_000;

#[derive(Debug)]
struct State {
    minute: u32,
    counter: u32,
}

/// 3 BCD bytes of worker code, 4 of `MMDDHHMM`, 3 of counter.
#[derive(Debug)]
pub struct BcdSequence {
    worker: u32,
    state: Mutex<State>,
}

impl BcdSequence {
    /// `worker` is reduced to its last six decimal digits.
    pub fn new(worker: u32) -> Self {
        Self {
            worker: worker % 1_000_000,
            state: Mutex::new(State {
                minute: 0,
                counter: 0,
            }),
        }
    }

    pub fn next_val(&self) -> [u8; 10] {
        self.next_at(timestamp::mmddhhmm(&Local::now()))
    }

    fn next_at(&self, minute: u32) -> [u8; 10] {
        let counter = {
            let mut state = self.state.lock();
            if state.minute != minute {
                state.minute = minute;
                state.counter = 0;
            }
            state.counter = (state.counter + 1) % COUNTER_MAX;
            state.counter
        };

        let mut id = [0u8; 10];
        pack_bcd(u64::from(self.worker), &mut id[0..3]);
        pack_bcd(u64::from(minute), &mut id[3..7]);
        pack_bcd(u64::from(counter), &mut id[7..10]);
        id
    }
}

/// Write `value` right-aligned into `out` as packed BCD (two digits per byte).
pub fn pack_bcd(mut value: u64, out: &mut [u8]) {
    for byte in out.iter_mut().rev() {
        let low = (value % 10) as u8;
        value /= 10;
        let high = (value % 10) as u8;
        value /= 10;
        *byte = (high << 4) | low;
    }
}

/// Render packed BCD back to its decimal digits.
pub fn bcd_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_digits() {
        let mut out = [0u8; 3];
        pack_bcd(123456, &mut out);
        assert_eq!(out, [0x12, 0x34, 0x56]);

        let mut out = [0u8; 3];
        pack_bcd(42, &mut out);
        assert_eq!(out, [0x00, 0x00, 0x42]);
    }

    #[test]
    fn id_layout() {
        let generator = BcdSequence::new(7001);
        let id = generator.next_at(10210805);
        assert_eq!(bcd_to_string(&id), "00700110210805000001");
        let id = generator.next_at(10210805);
        assert_eq!(bcd_to_string(&id[7..]), "000002");
    }

    #[test]
    fn counter_resets_when_minute_changes() {
        let generator = BcdSequence::new(1);
        generator.next_at(10210805);
        generator.next_at(10210805);
        let id = generator.next_at(10210806);
        assert_eq!(bcd_to_string(&id[7..]), "000001");
    }

    #[test]
    fn counter_wraps_at_max() {
        let generator = BcdSequence::new(1);
        generator.state.lock().minute = 10210805;
        generator.state.lock().counter = COUNTER_MAX - 1;
        let id = generator.next_at(10210805);
        assert_eq!(bcd_to_string(&id[7..]), "000000");
    }
}
