/// index/binning.rs
///
/// # Hierarchical Binning
///
/// Coordinate records are placed in *the smallest bin they fully fit into*, in the style of the
/// UCSC Genome Browser and tabix. Bin widths start at 128kb (2^17) at the finest level and grow
/// by a factor of 8 (2^3) per level. With six levels the coarsest bin spans 2^32 bases, so every
/// `u32` range has a home and placement never fails.
///
/// To find records overlapping a query range, every level's bins that the query touches are
/// visited; records in those bins are then tested for overlap directly.
///
/// ## The Offset Scheme
///
/// Each level's bin ids start after all bins of the coarser levels:
///
///  Level 0: 1 bin          -> starts at 0
///  Level 1: 8 bins         -> starts at 1
///  Level 2: 64 bins        -> starts at 9
///  Level 3: 512 bins       -> starts at 73
///  Level 4: 4096 bins      -> starts at 585
///  Level 5: 32768 bins     -> starts at 4681
///
/// `bin_offsets` is stored finest level first.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HierarchicalBins {
    pub base_shift: u32,
    pub level_shift: u32,
    pub num_levels: usize,
    pub levels: Vec<u32>,
    pub bin_offsets: Vec<u32>,
}

impl Default for HierarchicalBins {
    fn default() -> Self {
        Self::new(17, 3, 6)
    }
}

/// Calculate number of bins at each level.
pub fn calc_level_sizes(next_shift: u32, nlevels: usize) -> Vec<u32> {
    (0..nlevels)
        .map(|i| 1u32 << (next_shift * i as u32))
        .collect()
}

/// Calculate the bin offsets for these levels, finest level first.
pub fn calc_offsets_from_levels(levels: &[u32]) -> Vec<u32> {
    let mut offsets: Vec<u32> = levels
        .iter()
        .scan(0u32, |sum, &x| {
            let current = *sum;
            *sum += x;
            Some(current)
        })
        .collect();
    offsets.reverse();
    offsets
}

impl HierarchicalBins {
    pub fn new(base_shift: u32, level_shift: u32, num_levels: usize) -> Self {
        let levels = calc_level_sizes(level_shift, num_levels);
        let bin_offsets = calc_offsets_from_levels(&levels);
        Self {
            base_shift,
            level_shift,
            num_levels,
            levels,
            bin_offsets,
        }
    }

    /// Find the smallest bin that fully contains [start, end).
    ///
    /// Empty ranges are treated as covering the single base at `start`.
    pub fn region_to_bin(&self, start: u32, end: u32) -> u32 {
        let mut start_bin = start >> self.base_shift;
        let mut end_bin = last_base(start, end) >> self.base_shift;

        for &offset in &self.bin_offsets {
            if start_bin == end_bin {
                return offset + start_bin;
            }
            start_bin >>= self.level_shift;
            end_bin >>= self.level_shift;
        }

        // The coarsest level has a single bin.
        0
    }

    /// All bins, across all levels, that could hold records overlapping [start, end).
    pub fn region_to_bins(&self, start: u32, end: u32) -> Vec<u32> {
        let mut bins = Vec::new();
        let mut start_bin = start >> self.base_shift;
        let mut end_bin = last_base(start, end) >> self.base_shift;

        for &offset in &self.bin_offsets {
            bins.extend((start_bin..=end_bin).map(|bin| offset + bin));
            start_bin >>= self.level_shift;
            end_bin >>= self.level_shift;
        }

        bins
    }
}

/// Last base covered by [start, end), exclusive end.
fn last_base(start: u32, end: u32) -> u32 {
    end.saturating_sub(1).max(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_levels() {
        assert_eq!(calc_level_sizes(3, 5), vec![1, 8, 64, 512, 4096]);
    }

    #[test]
    fn test_extended_offsets() {
        // These values come from binOffsetsExtended in the UCSC code
        let offsets = calc_offsets_from_levels(&calc_level_sizes(3, 6));
        assert_eq!(offsets, vec![4681, 585, 73, 9, 1, 0]);
    }

    #[test]
    fn test_region_to_bin() {
        let bins = HierarchicalBins::default();

        // "100_000_000 >> 17" gives bin 762 at the finest level
        assert_eq!(bins.region_to_bin(100_000_000, 100_000_100), 4681 + 762);
        assert_eq!(bins.region_to_bin(0, 1000), 4681);

        #[allow(non_upper_case_globals)]
        const KiB: u32 = 1024;
        assert_eq!(bins.region_to_bin(0, 128 * KiB), 4681);
        assert_eq!(bins.region_to_bin(128 * KiB, 256 * KiB), 4682);

        // Spans two 128kb bins, lands one level up
        assert_eq!(bins.region_to_bin(100 * KiB, 200 * KiB), 585);

        // Whole u32 range only fits the top bin
        assert_eq!(bins.region_to_bin(0, u32::MAX), 0);

        // Empty ranges stay put
        assert_eq!(bins.region_to_bin(0, 0), 4681);
    }

    #[test]
    fn test_region_to_bins_contains_home_bin() {
        let bins = HierarchicalBins::default();
        for (start, end) in [(1000, 2000), (120_000, 140_000), (5_000_000, 9_000_000)] {
            let home = bins.region_to_bin(start, end);
            let visited = bins.region_to_bins(start, end);
            assert!(visited.contains(&home), "{}-{}", start, end);
            assert!(visited.contains(&0));
        }
    }
}
