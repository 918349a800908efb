use itertools::Itertools;
use pario_error::{PioResult, pio_bail};

use crate::gcd::{euclid, lgcd_array};

/// The relationship between two consecutive indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The next index follows directly.
    Next,
    /// The next index skips this many elements.
    Skip(usize),
    /// The next index repeats or goes backwards.
    Irregular,
}

impl Step {
    fn between(a: usize, b: usize) -> Self {
        match b.checked_sub(a) {
            Some(1) => Self::Next,
            Some(delta) if delta > 1 => Self::Skip(delta - 1),
            _ => Self::Irregular,
        }
    }
}

/// Find the length of the largest regular block that divides an ordered list of indices.
///
/// The list is cut into maximal runs of consecutive indices. The block length is the GCD of the
/// run lengths, folded with the GCD of the gaps between runs and with the leading offset, since
/// all three bound how regular a hyperslab covering the list can be. A single run yields its own
/// length. Two adjacent breaks where the first one skips elements leave no usable structure and
/// the result is 1, as is any ambiguous case.
pub fn gcd_blocksize(indices: &[usize]) -> PioResult<usize> {
    let Some(&first) = indices.first() else {
        pio_bail!("cannot infer a block size from an empty index list");
    };

    let mut runs = Vec::new();
    let mut gaps = Vec::new();
    let mut run_len = 1;
    let mut prev: Option<Step> = None;

    for (&a, &b) in indices.iter().tuple_windows() {
        let step = Step::between(a, b);
        if step == Step::Next {
            run_len += 1;
        } else {
            if matches!(prev, Some(Step::Skip(_))) {
                return Ok(1);
            }
            runs.push(run_len);
            run_len = 1;
            if let Step::Skip(gap) = step {
                gaps.push(gap);
            }
        }
        prev = Some(step);
    }

    if runs.is_empty() {
        return Ok(indices.len());
    }
    runs.push(run_len);

    let mut bsize = euclid(lgcd_array(&runs), lgcd_array(&gaps));
    if first > 0 {
        bsize = euclid(bsize, first);
    }

    log::trace!(
        "gcd_blocksize: {} indices in {} runs, block length {}",
        indices.len(),
        runs.len(),
        bsize
    );
    Ok(bsize)
}
