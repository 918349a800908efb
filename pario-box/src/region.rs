use itertools::Itertools;
use log::trace;
use pario_error::{PioResult, pio_bail, pio_err};

use crate::plan::global_len;

/// Convert a 0-based row-major index into a coordinate of an array shaped `gdims`.
///
/// For example index 4 of a `[3, 2]` array is `[2, 0]`.
pub fn idx_to_dim_list(gdims: &[usize], index: usize) -> Vec<usize> {
    let mut coord = vec![0; gdims.len()];
    let mut idx = index;
    for (dim, &g) in gdims.iter().enumerate().rev() {
        coord[dim] = idx % g;
        idx /= g;
    }
    coord
}

/// Convert a coordinate relative to a box of extent `count` into a row-major index.
pub fn coord_to_lindex(lcoord: &[usize], count: &[usize]) -> usize {
    let mut lindex = 0;
    let mut stride = 1;
    for (&x, &c) in lcoord.iter().zip(count).rev() {
        lindex += x * stride;
        stride *= c;
    }
    lindex
}

/// A hyperslab of the global array that a contiguous stretch of a local map covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Offset of the first element of the region in the local map.
    pub loffset: usize,
    /// Per-dimension start of the hyperslab.
    pub start: Vec<usize>,
    /// Per-dimension count of the hyperslab.
    pub count: Vec<usize>,
}

impl Region {
    /// Number of elements in the region.
    pub fn len(&self) -> usize {
        self.count.iter().product()
    }

    /// Whether the region holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Find the largest hyperslab described by the head of a 1-based map.
///
/// The region starts at `map[0]` and is grown one dimension at a time from the fastest, as long
/// as the map keeps listing exactly the elements the grown hyperslab would hold, in order.
pub fn find_region(gdims: &[usize], map: &[usize]) -> PioResult<Region> {
    let Some(&head) = map.first() else {
        pio_bail!("cannot find a region in an empty map");
    };
    if head == 0 {
        pio_bail!("a region cannot start at a hole");
    }
    let total = global_len(gdims)?;
    if head > total {
        pio_bail!(OutOfBounds: head, 1, total + 1);
    }

    let start = idx_to_dim_list(gdims, head - 1);
    let mut count = vec![1; gdims.len()];
    let mut region_len = 1;
    let mut stride = 1;

    for dim in (0..gdims.len()).rev() {
        let max_len = gdims[dim] - start[dim];
        for i in 1..=max_len {
            count[dim] = i;
            let grows = (0..region_len).all(|j| {
                map.get(j + i * region_len)
                    .is_some_and(|&next| next == map[j] + i * stride)
            });
            if !grows {
                break;
            }
        }
        region_len *= count[dim];
        stride *= gdims[dim];
    }

    Ok(Region {
        loffset: 0,
        start,
        count,
    })
}

/// Cover a 1-based local map with regions, in map order.
///
/// Holes (zero entries) separate regions and are skipped.
pub fn get_regions(gdims: &[usize], map: &[usize]) -> PioResult<Vec<Region>> {
    let total = global_len(gdims)?;
    if let Some(&bad) = map.iter().find(|&&v| v > total) {
        pio_bail!(OutOfBounds: bad, 1, total + 1);
    }

    let mut regions = Vec::new();
    let mut offset = 0;
    while offset < map.len() {
        if map[offset] == 0 {
            offset += 1;
            continue;
        }
        let mut region = find_region(gdims, &map[offset..])?;
        region.loffset = offset;
        offset += region.len();
        regions.push(region);
    }

    trace!(
        "{} map entries form {} regions over [{}]",
        map.len(),
        regions.len(),
        gdims.iter().join(", ")
    );
    Ok(regions)
}

/// Build the 1-based map of a block-shaped local share, in row-major order.
pub fn compdof_from_block(
    gdims: &[usize],
    start: &[usize],
    count: &[usize],
) -> PioResult<Vec<usize>> {
    global_len(gdims)?;
    if start.len() != gdims.len() || count.len() != gdims.len() {
        pio_bail!(
            "block of rank {}/{} does not match array of rank {}",
            start.len(),
            count.len(),
            gdims.len()
        );
    }
    for ((&s, &c), &g) in start.iter().zip(count).zip(gdims) {
        if s.checked_add(c).is_none_or(|end| end > g) {
            pio_bail!("block {}+{} exceeds dimension of {}", s, c, g);
        }
    }

    let mut strides = vec![1usize; gdims.len()];
    for dim in (0..gdims.len().saturating_sub(1)).rev() {
        strides[dim] = strides[dim + 1] * gdims[dim + 1];
    }

    Ok(count
        .iter()
        .map(|&c| 0..c)
        .multi_cartesian_product()
        .map(|local| {
            local
                .iter()
                .zip(start)
                .zip(&strides)
                .map(|((&x, &s), &stride)| (x + s) * stride)
                .sum::<usize>()
                + 1
        })
        .collect())
}

/// Convert a 0-based map, where -1 marks a hole, into the 1-based form used everywhere else.
pub fn compdof_from_zero_based(map: &[i64]) -> PioResult<Vec<usize>> {
    map.iter()
        .map(|&v| {
            v.checked_add(1)
                .and_then(|one_based| usize::try_from(one_based).ok())
                .ok_or_else(|| pio_err!("invalid zero-based map entry {}", v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pario_error::ErrorKind;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[3, 2], 4, &[2, 0])]
    #[case(&[3, 2], 0, &[0, 0])]
    #[case(&[3, 2], 5, &[2, 1])]
    #[case(&[4, 5, 6], 37, &[1, 1, 1])]
    #[case(&[10], 7, &[7])]
    fn index_to_coordinate(#[case] gdims: &[usize], #[case] index: usize, #[case] coord: &[usize]) {
        assert_eq!(idx_to_dim_list(gdims, index), coord);
    }

    #[rstest]
    #[case(&[0, 0], &[2, 8], 0)]
    #[case(&[1, 3], &[2, 8], 11)]
    #[case(&[1, 1, 1], &[4, 5, 6], 37)]
    fn coordinate_to_index(
        #[case] lcoord: &[usize],
        #[case] count: &[usize],
        #[case] lindex: usize,
    ) {
        assert_eq!(coord_to_lindex(lcoord, count), lindex);
    }

    #[test]
    fn whole_rows_form_one_region() {
        // Rows 1 and 2 of a 4x4 array.
        let map = (5..=12).collect::<Vec<_>>();
        let region = find_region(&[4, 4], &map).unwrap();
        assert_eq!(region.start, vec![1, 0]);
        assert_eq!(region.count, vec![2, 4]);
        assert_eq!(region.len(), 8);
    }

    #[test]
    fn column_block_forms_one_region() {
        // Columns 1..3 of rows 0..2 in a 4x4 array.
        let region = find_region(&[4, 4], &[2, 3, 6, 7]).unwrap();
        assert_eq!(region.start, vec![0, 1]);
        assert_eq!(region.count, vec![2, 2]);
    }

    #[test]
    fn regions_split_at_breaks_and_holes() {
        let regions = get_regions(&[4, 4], &[0, 1, 2, 3, 0, 9, 10]).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].loffset, 1);
        assert_eq!(regions[0].count, vec![1, 3]);
        assert_eq!(regions[1].loffset, 5);
        assert_eq!(regions[1].start, vec![2, 0]);
        assert_eq!(regions[1].count, vec![1, 2]);
    }

    #[test]
    fn empty_map_has_no_regions() {
        assert!(get_regions(&[4, 4], &[]).unwrap().is_empty());
        assert!(get_regions(&[4, 4], &[0, 0]).unwrap().is_empty());
    }

    #[test]
    fn map_entry_outside_array() {
        let err = get_regions(&[2, 2], &[1, 5]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn block_map() {
        let map = compdof_from_block(&[4, 4], &[1, 2], &[2, 2]).unwrap();
        assert_eq!(map, vec![7, 8, 11, 12]);

        let regions = get_regions(&[4, 4], &map).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].start, vec![1, 2]);
        assert_eq!(regions[0].count, vec![2, 2]);
    }

    #[test]
    fn block_outside_array() {
        assert!(compdof_from_block(&[4, 4], &[3, 0], &[2, 4]).is_err());
        assert!(compdof_from_block(&[4, 4], &[0], &[2]).is_err());
    }

    #[test]
    fn zero_based_map() {
        assert_eq!(compdof_from_zero_based(&[0, -1, 5]).unwrap(), vec![1, 0, 6]);
        assert!(compdof_from_zero_based(&[-2]).is_err());
    }
}
