use std::fmt::{Display, Formatter};

use itertools::Itertools;
use log::{debug, trace};
use pario_dtype::ElemType;
use pario_error::{PioResult, pio_bail, pio_err};

use crate::options::BoxOptions;
use crate::partition::compute_one_dim;
use crate::region::coord_to_lindex;

/// The hyperslab of the global array owned by one I/O task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IoBox {
    start: Vec<usize>,
    count: Vec<usize>,
}

impl IoBox {
    /// Create a box from per-dimension starts and counts.
    pub fn new(start: Vec<usize>, count: Vec<usize>) -> Self {
        debug_assert_eq!(start.len(), count.len());
        Self { start, count }
    }

    /// The all-zero box given to I/O tasks that take no part in a decomposition.
    pub fn empty(ndims: usize) -> Self {
        Self {
            start: vec![0; ndims],
            count: vec![0; ndims],
        }
    }

    /// Per-dimension offsets of the box corner.
    pub fn start(&self) -> &[usize] {
        &self.start
    }

    /// Per-dimension extents.
    pub fn count(&self) -> &[usize] {
        &self.count
    }

    /// Number of elements in the box.
    pub fn len(&self) -> usize {
        self.count.iter().product()
    }

    /// Whether the box holds no elements.
    pub fn is_empty(&self) -> bool {
        self.count.iter().any(|&c| c == 0)
    }

    /// Whether a global coordinate falls inside the box.
    pub fn contains(&self, coord: &[usize]) -> bool {
        coord.len() == self.start.len()
            && coord
                .iter()
                .zip(self.start.iter().zip(&self.count))
                .all(|(&x, (&s, &c))| x >= s && x < s + c)
    }

    /// Row-major index of a global coordinate inside the box, if the box contains it.
    pub fn local_index(&self, coord: &[usize]) -> Option<usize> {
        if !self.contains(coord) {
            return None;
        }
        let local = coord
            .iter()
            .zip(&self.start)
            .map(|(&x, &s)| x - s)
            .collect::<Vec<_>>();
        Some(coord_to_lindex(&local, &self.count))
    }

    /// Whether the box stays inside the global shape.
    pub fn fits_within(&self, gdims: &[usize]) -> bool {
        gdims.len() == self.start.len()
            && gdims
                .iter()
                .zip(self.start.iter().zip(&self.count))
                .all(|(&g, (&s, &c))| s.checked_add(c).is_some_and(|end| end <= g))
    }
}

impl Display for IoBox {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.start
                .iter()
                .zip(&self.count)
                .map(|(s, c)| format!("{s}..{}", s + c))
                .join(", ")
        )
    }
}

/// This task's share of a box plan, as returned by [`calc_start_count`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCount {
    /// Per-dimension start of this task's box, all zero when idle.
    pub start: Vec<usize>,
    /// Per-dimension count of this task's box, all zero when idle.
    pub count: Vec<usize>,
    /// Number of I/O tasks the plan actually uses.
    pub num_aiotasks: usize,
}

/// The full table of I/O boxes for one global shape.
///
/// Every task of a group computes the same plan from the same inputs, so the plan doubles as the
/// agreement between tasks on who owns which part of the array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxPlan {
    gdims: Vec<usize>,
    boxes: Vec<IoBox>,
    num_aiotasks: usize,
}

impl BoxPlan {
    /// The global shape this plan covers.
    pub fn gdims(&self) -> &[usize] {
        &self.gdims
    }

    /// The number of I/O tasks that were available.
    pub fn num_io_procs(&self) -> usize {
        self.boxes.len()
    }

    /// The number of I/O tasks that own a non-empty box.
    pub fn num_aiotasks(&self) -> usize {
        self.num_aiotasks
    }

    /// The box of one I/O task. Idle tasks get an all-zero box.
    pub fn io_box(&self, iorank: usize) -> Option<&IoBox> {
        self.boxes.get(iorank)
    }

    /// The boxes of the active I/O tasks, in I/O rank order.
    pub fn active_boxes(&self) -> &[IoBox] {
        &self.boxes[..self.num_aiotasks]
    }

    /// The active I/O task whose box holds a global coordinate.
    pub fn owner_of(&self, coord: &[usize]) -> Option<usize> {
        self.active_boxes().iter().position(|b| b.contains(coord))
    }

    /// The element count of the largest box.
    pub fn max_box_len(&self) -> usize {
        self.active_boxes().iter().map(IoBox::len).max().unwrap_or(0)
    }
}

/// Compute this I/O task's box of the global array.
///
/// Tasks whose rank is at or past the number of I/O tasks the plan uses get all-zero start and
/// count vectors.
pub fn calc_start_count(
    elem_type: ElemType,
    gdims: &[usize],
    num_io_procs: usize,
    my_iorank: usize,
    options: &BoxOptions,
) -> PioResult<StartCount> {
    let plan = plan_boxes(elem_type, gdims, num_io_procs, options)?;
    let io_box = plan
        .io_box(my_iorank)
        .cloned()
        .unwrap_or_else(|| IoBox::empty(gdims.len()));

    Ok(StartCount {
        start: io_box.start,
        count: io_box.count,
        num_aiotasks: plan.num_aiotasks,
    })
}

/// Compute the box of every I/O task for a global shape.
///
/// Starting from an estimate of how many tasks it takes to keep each box near the target
/// blocksize, the planner partitions the array slowest dimension first. A dimension shorter than
/// the current group of ranks splits the group into sub-groups, one per slab, so no rank is left
/// without data. When a candidate task count cannot tile the array exactly it is decremented;
/// a single task always succeeds.
pub fn plan_boxes(
    elem_type: ElemType,
    gdims: &[usize],
    num_io_procs: usize,
    options: &BoxOptions,
) -> PioResult<BoxPlan> {
    let total = global_len(gdims)?;
    if num_io_procs == 0 {
        pio_bail!("at least one io task is required");
    }

    let basesize = elem_type.byte_width();
    let minblocksize = options.min_bytes(basesize) / basesize;
    let estimate = total
        .saturating_mul(2)
        .saturating_add(minblocksize)
        / minblocksize.saturating_mul(2);
    let mut use_io_procs = estimate.clamp(1, num_io_procs);

    debug!(
        "planning [{}] of {}: {} elements, window {}..={} bytes, starting at {} of {} io tasks",
        gdims.iter().join(", "),
        elem_type,
        total,
        options.min_bytes(basesize),
        options.max_bytes(),
        use_io_procs,
        num_io_procs
    );

    loop {
        if let Some(mut boxes) = try_partition(gdims, use_io_procs, total)? {
            debug!(
                "converged on {} io tasks, split dimension {}",
                use_io_procs,
                split_dimension(gdims, basesize, use_io_procs, options.max_bytes())
            );
            boxes.resize(num_io_procs, IoBox::empty(gdims.len()));
            return Ok(BoxPlan {
                gdims: gdims.to_vec(),
                boxes,
                num_aiotasks: use_io_procs,
            });
        }

        if use_io_procs == 1 {
            pio_bail!(
                Internal: "a single io task does not cover [{}]",
                gdims.iter().join(", ")
            );
        }
        trace!(
            "{} io tasks do not tile [{}], retrying with {}",
            use_io_procs,
            gdims.iter().join(", "),
            use_io_procs - 1
        );
        use_io_procs -= 1;
    }
}

/// Validate a global shape and return its element count.
///
/// A shape needs at least one dimension, every length must be positive and the product must not
/// overflow.
pub fn global_len(gdims: &[usize]) -> PioResult<usize> {
    if gdims.is_empty() {
        pio_bail!("a decomposition needs at least one dimension");
    }
    gdims.iter().try_fold(1usize, |acc, &g| {
        if g == 0 {
            pio_bail!("dimension lengths must be positive, got [{}]", gdims.iter().join(", "));
        }
        acc.checked_mul(g)
            .ok_or_else(|| pio_err!("global size of [{}] overflows", gdims.iter().join(", ")))
    })
}

/// Walk from the fastest dimension back and return the first one at which a task's share of the
/// trailing block exceeds `max_bytes`. When the whole array fits, the slowest dimension is used.
fn split_dimension(gdims: &[usize], basesize: usize, nprocs: usize, max_bytes: usize) -> usize {
    let mut bytes = basesize;
    for (dim, &g) in gdims.iter().enumerate().rev() {
        bytes = bytes.saturating_mul(g);
        if bytes / nprocs > max_bytes {
            return dim;
        }
    }
    0
}

/// Assign a box to each of `nprocs` ranks, or `None` if they do not tile the array exactly.
fn try_partition(gdims: &[usize], nprocs: usize, total: usize) -> PioResult<Option<Vec<IoBox>>> {
    let mut boxes = Vec::with_capacity(nprocs);
    let mut assigned = 0usize;

    for rank in 0..nprocs {
        let Some(io_box) = nested_box(gdims, nprocs, rank)? else {
            trace!("io rank {} of {} has no slab to own", rank, nprocs);
            return Ok(None);
        };

        let fits = io_box.fits_within(gdims);
        debug_assert!(fits, "io rank {rank} box {io_box} exceeds the global shape");
        if !fits {
            pio_bail!(
                Internal: "io rank {} box {} exceeds [{}]",
                rank,
                io_box,
                gdims.iter().join(", ")
            );
        }

        assigned += io_box.len();
        if io_box.is_empty() || assigned > total {
            return Ok(None);
        }
        trace!("io rank {} owns {}", rank, io_box);
        boxes.push(io_box);
    }

    Ok((assigned == total).then_some(boxes))
}

/// The box of `rank` when `nprocs` ranks partition the array slowest dimension first.
fn nested_box(gdims: &[usize], nprocs: usize, rank: usize) -> PioResult<Option<IoBox>> {
    let mut start = vec![0; gdims.len()];
    let mut count = gdims.to_vec();
    let mut ioprocs = nprocs;
    let mut trank = rank;

    for (dim, &g) in gdims.iter().enumerate() {
        if ioprocs == 1 {
            break;
        }
        if g >= ioprocs {
            (start[dim], count[dim]) = compute_one_dim(g, ioprocs, trank)?;
            ioprocs = 1;
            trank = 0;
        } else {
            // Fewer slabs than ranks: each slab goes to a sub-group of ranks.
            let (slab, group_start, group_len) = rank_group(ioprocs, g, trank)?;
            start[dim] = slab;
            count[dim] = 1;
            ioprocs = group_len;
            trank -= group_start;
        }
    }

    Ok((ioprocs == 1).then(|| IoBox::new(start, count)))
}

/// Split `ioprocs` ranks into `groups` sub-groups and find the one holding `trank`.
fn rank_group(ioprocs: usize, groups: usize, trank: usize) -> PioResult<(usize, usize, usize)> {
    for slab in 0..groups {
        let (group_start, group_len) = compute_one_dim(ioprocs, groups, slab)?;
        if trank < group_start + group_len {
            return Ok((slab, group_start, group_len));
        }
    }
    Err(pio_err!(
        Internal: "rank {} is outside a group of {}",
        trank,
        ioprocs
    ))
}
