// ABOUTME: Identifier generators for sequence numbers and message ids
// ABOUTME: Bundles the snowflake, cyclic, BCD and SGIP generators behind one injectable handle

mod bcd;
mod cycle;
mod snowflake;
mod triple;

pub use bcd::{BcdSequence, bcd_to_string, pack_bcd};
pub use cycle::Cycle32;
pub use snowflake::{EPOCH_MS, Snowflake};
pub use triple::{SequenceTriple, TripleSequence};

/// Identity bits that keep generated ids unique across a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceConfig {
    pub datacenter: u8,
    pub worker: u8,
    /// Six-digit worker code written into BCD message ids
    pub bcd_worker: u32,
    /// SGIP node id
    pub node_id: u32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            datacenter: 0,
            worker: 1,
            bcd_worker: 1,
            node_id: 3_000_000_001,
        }
    }
}

/// All generators one gateway process needs.
///
/// Owned by the server or gateway that creates it and shared with its
/// sessions through an `Arc`.
#[derive(Debug)]
pub struct Sequences {
    pub seq32: Cycle32,
    pub seq64: Snowflake,
    pub bcd: BcdSequence,
    pub triple: TripleSequence,
}

impl Sequences {
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            seq32: Cycle32::new(config.datacenter, config.worker),
            seq64: Snowflake::new(config.datacenter, config.worker),
            bcd: BcdSequence::new(config.bcd_worker),
            triple: TripleSequence::new(config.node_id),
        }
    }
}

impl Default for Sequences {
    fn default() -> Self {
        Self::new(SequenceConfig::default())
    }
}
