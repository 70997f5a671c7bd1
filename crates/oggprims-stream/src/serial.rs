//! Serial number allocation for logical streams.
//!
//! Serial numbers only need to be unique within one physical file. Fresh
//! numbers are drawn at random from a 15-bit range and redrawn on collision,
//! so allocation is not collision-proof across independently written files.
//! A nearly full range falls back to a scan, so allocation always ends.

use std::collections::HashSet;

use tracing::debug;

/// Exclusive upper bound of randomly drawn serial numbers.
pub const SERIAL_RANGE: u32 = 1 << 15;

/// Random draws attempted before falling back to a linear scan.
pub const RANDOM_DRAWS: usize = 64;

/// Tracks the serial numbers issued in one file.
#[derive(Debug, Default, Clone)]
pub struct SerialAllocator {
    issued: HashSet<u32>,
}

impl SerialAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a serial number not yet issued, and record it.
    ///
    /// After [`RANDOM_DRAWS`] collisions the range is scanned from a random
    /// start instead. Returns `None` once every number in the range is
    /// issued.
    pub fn unused_serial_number(&mut self) -> Option<u32> {
        let candidate = (0..RANDOM_DRAWS)
            .map(|_| rand::random::<u32>() % SERIAL_RANGE)
            .find(|sid| !self.issued.contains(sid))
            .or_else(|| {
                let start = rand::random::<u32>() % SERIAL_RANGE;
                (0..SERIAL_RANGE)
                    .map(|step| (start + step) % SERIAL_RANGE)
                    .find(|sid| !self.issued.contains(sid))
            })?;
        self.issued.insert(candidate);
        debug!(sid = candidate, "allocated serial number");
        Some(candidate)
    }

    /// Record an externally chosen serial number.
    ///
    /// Returns `false` if it was already issued.
    pub fn register(&mut self, sid: u32) -> bool {
        self.issued.insert(sid)
    }

    pub fn is_issued(&self, sid: u32) -> bool {
        self.issued.contains(&sid)
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}
