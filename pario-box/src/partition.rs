use pario_error::{PioResult, pio_bail};

/// Split one dimension of length `gdim` across `ioprocs` ranks and return `(start, count)` for
/// `rank`.
///
/// Every rank gets `gdim / ioprocs` elements and the remainder goes one each to the last ranks,
/// so counts are non-decreasing in rank order and the ranges tile `[0, gdim)`. Ranks past the
/// group wrap around.
pub fn compute_one_dim(gdim: usize, ioprocs: usize, rank: usize) -> PioResult<(usize, usize)> {
    if ioprocs == 0 {
        pio_bail!("cannot split a dimension of {} across zero ranks", gdim);
    }

    let irank = rank % ioprocs;
    let mut count = gdim / ioprocs;
    let mut start = count * irank;
    let remainder = gdim - count * ioprocs;

    if remainder >= ioprocs - irank {
        count += 1;
        start += irank + remainder - ioprocs;
    }

    Ok((start, count))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(4, 4, [(0, 1), (1, 1), (2, 1), (3, 1)])]
    #[case(400, 4, [(0, 100), (100, 100), (200, 100), (300, 100)])]
    #[case(5, 4, [(0, 1), (1, 1), (2, 1), (3, 2)])]
    #[case(2, 4, [(0, 0), (0, 0), (0, 1), (1, 1)])]
    #[case(10, 4, [(0, 2), (2, 2), (4, 3), (7, 3)])]
    fn per_rank(
        #[case] gdim: usize,
        #[case] ioprocs: usize,
        #[case] expected: [(usize, usize); 4],
    ) {
        for (rank, want) in expected.into_iter().enumerate() {
            assert_eq!(compute_one_dim(gdim, ioprocs, rank).unwrap(), want);
        }
    }

    #[test]
    fn ranks_wrap_around() {
        assert_eq!(
            compute_one_dim(5, 4, 7).unwrap(),
            compute_one_dim(5, 4, 3).unwrap()
        );
    }

    #[test]
    fn zero_ranks_is_invalid() {
        assert!(compute_one_dim(8, 0, 0).is_err());
    }

    #[test]
    fn partition_is_complete() {
        for gdim in 0..40 {
            for ioprocs in 1..12 {
                let mut next = 0;
                let mut prev_count = 0;
                for rank in 0..ioprocs {
                    let (start, count) = compute_one_dim(gdim, ioprocs, rank).unwrap();
                    assert_eq!(start, next, "gap or overlap at gdim={gdim} ioprocs={ioprocs}");
                    assert!(count >= prev_count);
                    next = start + count;
                    prev_count = count;
                }
                assert_eq!(next, gdim);
            }
        }
    }
}
