use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use pario_error::{PioResult, pio_bail, pio_err};

use crate::handle::IoSystemId;

/// How data is moved from compute tasks to I/O tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum Rearranger {
    /// Each I/O task owns one axis-aligned box of the global array.
    #[default]
    Box = 1,
    /// Each I/O task serves a fixed subset of compute tasks. Recorded but never planned.
    Subset = 2,
}

impl Rearranger {
    /// Resolve a rearranger code.
    pub fn try_from_code(code: i32) -> PioResult<Self> {
        Self::try_from(code).map_err(|_| pio_err!("unknown rearranger code {}", code))
    }
}

impl Display for Rearranger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Box => write!(f, "box"),
            Self::Subset => write!(f, "subset"),
        }
    }
}

/// This process's place in the group of processes sharing an I/O system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGroup {
    rank: usize,
    size: usize,
}

impl ProcessGroup {
    /// A group of `size` processes in which this process has rank `rank`.
    pub fn new(rank: usize, size: usize) -> PioResult<Self> {
        if rank >= size {
            pio_bail!("rank {} is outside a group of {}", rank, size);
        }
        Ok(Self { rank, size })
    }

    /// A group holding only this process.
    pub fn single() -> Self {
        Self { rank: 0, size: 1 }
    }

    /// This process's rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of processes in the group.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Which ranks of a process group act as I/O tasks.
///
/// I/O task `i` is rank `(base + i * stride) % size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoLayout {
    num_iotasks: usize,
    stride: usize,
    base: usize,
}

impl Default for IoLayout {
    fn default() -> Self {
        Self {
            num_iotasks: 1,
            stride: 1,
            base: 0,
        }
    }
}

impl IoLayout {
    /// `num_iotasks` consecutive I/O tasks starting at rank 0.
    pub fn new(num_iotasks: usize) -> Self {
        Self {
            num_iotasks,
            ..Default::default()
        }
    }

    /// Space I/O tasks `stride` ranks apart.
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Place the first I/O task at rank `base`.
    pub fn with_base(mut self, base: usize) -> Self {
        self.base = base;
        self
    }

    /// The number of I/O tasks.
    pub fn num_iotasks(&self) -> usize {
        self.num_iotasks
    }

    /// The distance in ranks between consecutive I/O tasks.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The rank of the first I/O task.
    pub fn base(&self) -> usize {
        self.base
    }
}

/// One parallel I/O context: a process group, the I/O tasks chosen from it and the default
/// rearranger for decompositions created against it.
#[derive(Debug, Clone)]
pub struct IoSystem {
    id: IoSystemId,
    rearranger: Rearranger,
    group: ProcessGroup,
    layout: IoLayout,
    io_ranks: Vec<usize>,
    io_rank: Option<usize>,
}

impl IoSystem {
    pub(crate) fn try_new(
        id: IoSystemId,
        group: ProcessGroup,
        layout: IoLayout,
        rearranger: Rearranger,
    ) -> PioResult<Self> {
        if layout.num_iotasks < 1 || layout.stride < 1 {
            pio_bail!(
                "io layout needs at least one task and a positive stride, \
                 got {} tasks with stride {}",
                layout.num_iotasks,
                layout.stride
            );
        }
        if layout.base >= group.size {
            pio_bail!(
                "io layout base {} is outside a group of {}",
                layout.base,
                group.size
            );
        }
        if layout
            .num_iotasks
            .checked_mul(layout.stride)
            .is_none_or(|span| span > group.size)
        {
            pio_bail!(
                "{} io tasks with stride {} do not fit in a group of {}",
                layout.num_iotasks,
                layout.stride,
                group.size
            );
        }

        let io_ranks = (0..layout.num_iotasks)
            .map(|i| wrap_rank(layout.base, i * layout.stride, group.size))
            .collect::<Vec<_>>();
        let io_rank = io_ranks.iter().position(|&r| r == group.rank);

        Ok(Self {
            id,
            rearranger,
            group,
            layout,
            io_ranks,
            io_rank,
        })
    }

    /// The handle this system is registered under.
    pub fn id(&self) -> IoSystemId {
        self.id
    }

    /// The default rearranger of decompositions created against this system.
    pub fn rearranger(&self) -> Rearranger {
        self.rearranger
    }

    /// The process group.
    pub fn group(&self) -> ProcessGroup {
        self.group
    }

    /// The I/O task layout.
    pub fn layout(&self) -> IoLayout {
        self.layout
    }

    /// The number of I/O tasks.
    pub fn num_iotasks(&self) -> usize {
        self.io_ranks.len()
    }

    /// The group rank of every I/O task, in I/O rank order.
    pub fn io_ranks(&self) -> &[usize] {
        &self.io_ranks
    }

    /// This process's I/O rank, if it is an I/O task.
    pub fn io_rank(&self) -> Option<usize> {
        self.io_rank
    }

    /// Whether this process is an I/O task.
    pub fn is_iotask(&self) -> bool {
        self.io_rank.is_some()
    }
}

/// `(base + offset) % size` for `base, offset < size`, without overflowing.
fn wrap_rank(base: usize, offset: usize, size: usize) -> usize {
    let room = size - offset;
    if base >= room { base - room } else { base + offset }
}

#[cfg(test)]
mod tests {
    use pario_error::ErrorKind;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 8, IoLayout::new(4), vec![0, 1, 2, 3], Some(0))]
    #[case(5, 8, IoLayout::new(4).with_stride(2), vec![0, 2, 4, 6], None)]
    #[case(6, 8, IoLayout::new(4).with_stride(2), vec![0, 2, 4, 6], Some(3))]
    #[case(1, 8, IoLayout::new(4).with_stride(2).with_base(3), vec![3, 5, 7, 1], Some(3))]
    fn io_task_placement(
        #[case] rank: usize,
        #[case] size: usize,
        #[case] layout: IoLayout,
        #[case] io_ranks: Vec<usize>,
        #[case] io_rank: Option<usize>,
    ) {
        let group = ProcessGroup::new(rank, size).unwrap();
        let ios =
            IoSystem::try_new(IoSystemId::from(1 << 16), group, layout, Rearranger::Box).unwrap();
        assert_eq!(ios.io_ranks(), io_ranks.as_slice());
        assert_eq!(ios.io_rank(), io_rank);
        assert_eq!(ios.is_iotask(), io_rank.is_some());
        assert_eq!(ios.num_iotasks(), 4);
    }

    #[rstest]
    #[case(IoLayout::new(0))]
    #[case(IoLayout::new(2).with_stride(0))]
    #[case(IoLayout::new(3).with_stride(2))]
    #[case(IoLayout::new(5))]
    #[case(IoLayout::new(2).with_base(4))]
    #[case(IoLayout::new(2).with_base(usize::MAX))]
    fn invalid_layouts(#[case] layout: IoLayout) {
        let group = ProcessGroup::new(0, 4).unwrap();
        let err = IoSystem::try_new(IoSystemId::from(1 << 16), group, layout, Rearranger::Box)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn placement_wraps_in_a_huge_group() {
        let group = ProcessGroup::new(0, usize::MAX).unwrap();
        let layout = IoLayout::new(2).with_stride(usize::MAX / 2).with_base(usize::MAX - 1);
        let ios =
            IoSystem::try_new(IoSystemId::from(1 << 16), group, layout, Rearranger::Box).unwrap();
        assert_eq!(ios.io_ranks(), &[usize::MAX - 1, usize::MAX / 2 - 1]);
    }

    #[test]
    fn rank_outside_group() {
        assert!(ProcessGroup::new(4, 4).is_err());
    }

    #[test]
    fn rearranger_codes() {
        assert_eq!(Rearranger::try_from_code(1).unwrap(), Rearranger::Box);
        assert_eq!(Rearranger::try_from_code(2).unwrap(), Rearranger::Subset);
        assert!(Rearranger::try_from_code(3).is_err());
    }
}
