/// The default target footprint of one I/O task's box, in bytes.
pub const DEFAULT_BLOCKSIZE: usize = 1024;

/// The default slack around the target footprint, in bytes.
pub const DEFAULT_TOLERANCE: usize = 256;

/// Tuning knobs for the box planner.
///
/// The planner tries to keep each I/O task's box within `blocksize ± tolerance` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxOptions {
    blocksize: usize,
    tolerance: usize,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self {
            blocksize: DEFAULT_BLOCKSIZE,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl BoxOptions {
    /// Set the target footprint in bytes. A zero blocksize is ignored.
    pub fn with_blocksize(mut self, blocksize: usize) -> Self {
        if blocksize > 0 {
            self.blocksize = blocksize;
        }
        self
    }

    /// Set the slack around the target footprint in bytes.
    pub fn with_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// The target footprint in bytes.
    pub fn blocksize(&self) -> usize {
        self.blocksize
    }

    /// The slack around the target footprint in bytes.
    pub fn tolerance(&self) -> usize {
        self.tolerance
    }

    /// Lower edge of the window, never below one element.
    pub fn min_bytes(&self, basesize: usize) -> usize {
        self.blocksize.saturating_sub(self.tolerance).max(basesize)
    }

    /// Upper edge of the window.
    pub fn max_bytes(&self) -> usize {
        self.blocksize.saturating_add(self.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window() {
        let options = BoxOptions::default();
        assert_eq!(options.min_bytes(8), 768);
        assert_eq!(options.max_bytes(), 1280);

        let small = options.with_blocksize(64);
        assert_eq!(small.min_bytes(4), 4);
        assert_eq!(small.max_bytes(), 320);
    }

    #[test]
    fn zero_blocksize_ignored() {
        assert_eq!(BoxOptions::default().with_blocksize(0).blocksize(), DEFAULT_BLOCKSIZE);
    }
}
