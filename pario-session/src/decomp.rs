use itertools::Itertools;
use log::debug;
use pario_box::{
    BoxOptions, BoxPlan, IoBox, gcd_blocksize, get_regions, global_len, idx_to_dim_list,
    lgcd_array, plan_boxes,
};
use pario_dtype::ElemType;
use pario_error::{PioResult, pio_bail, pio_err};

use crate::handle::{DecompId, IoSystemId};
use crate::iosystem::{IoSystem, Rearranger};

/// Where one local element lands: an active I/O task and the element's offset inside its box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    /// I/O rank of the owning task.
    pub io_task: usize,
    /// Row-major offset inside that task's box.
    pub index: usize,
}

/// The start of one block of consecutive elements moved as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferBlock {
    /// Offset of the first element in the local array.
    pub local_offset: usize,
    /// Offset of the first element in the I/O task's box.
    pub box_offset: usize,
}

/// A mapping between this process's local array and the boxes of the I/O tasks.
#[derive(Debug, Clone)]
pub struct Decomposition {
    ioid: DecompId,
    iosys_id: IoSystemId,
    elem_type: ElemType,
    rearranger: Rearranger,
    dims: Vec<usize>,
    compdof: Vec<usize>,
    plan: BoxPlan,
    io_box: IoBox,
    destinations: Vec<Option<Destination>>,
    transfer_block_len: usize,
    transfers: Vec<Vec<TransferBlock>>,
    maxregions: usize,
    needsfill: bool,
    sole_writer: bool,
}

impl Decomposition {
    pub(crate) fn try_new(
        ioid: DecompId,
        ios: &IoSystem,
        elem_type: ElemType,
        dims: &[usize],
        compdof: Vec<usize>,
        rearranger: Rearranger,
        options: &BoxOptions,
    ) -> PioResult<Self> {
        let total = global_len(dims)?;
        if rearranger == Rearranger::Subset {
            pio_bail!("the {} rearranger is not supported", rearranger);
        }

        let plan = plan_boxes(elem_type, dims, ios.num_iotasks(), options)?;
        let destinations = compdof
            .iter()
            .map(|&offset| destination(&plan, total, offset))
            .collect::<PioResult<Vec<_>>>()?;

        let (transfer_block_len, transfers) = transfer_blocks(&destinations, plan.num_aiotasks())?;
        let maxregions = get_regions(dims, &compdof)?.len().max(1);
        let needsfill = compdof.iter().filter(|&&v| v > 0).unique().count() < total;
        let io_box = ios
            .io_rank()
            .and_then(|iorank| plan.io_box(iorank))
            .cloned()
            .unwrap_or_else(|| IoBox::empty(dims.len()));

        debug!(
            "{} over [{}]: {} local elements, {} of {} io tasks, block length {}, {} regions{}",
            ioid,
            dims.iter().join(", "),
            compdof.len(),
            plan.num_aiotasks(),
            ios.num_iotasks(),
            transfer_block_len,
            maxregions,
            if needsfill { ", needs fill" } else { "" }
        );

        Ok(Self {
            ioid,
            iosys_id: ios.id(),
            elem_type,
            rearranger,
            dims: dims.to_vec(),
            compdof,
            plan,
            io_box,
            destinations,
            transfer_block_len,
            transfers,
            maxregions,
            needsfill,
            sole_writer: ios.group().size() == 1,
        })
    }

    /// The handle this decomposition is registered under.
    pub fn ioid(&self) -> DecompId {
        self.ioid
    }

    /// The I/O system the decomposition belongs to.
    pub fn iosys_id(&self) -> IoSystemId {
        self.iosys_id
    }

    /// The element type of the distributed array.
    pub fn elem_type(&self) -> ElemType {
        self.elem_type
    }

    /// The rearranger used to move data.
    pub fn rearranger(&self) -> Rearranger {
        self.rearranger
    }

    /// The global shape, excluding any record dimension.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// The number of dimensions.
    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    /// The 1-based global offset of every local element, 0 for holes.
    pub fn compdof(&self) -> &[usize] {
        &self.compdof
    }

    /// The length of the local map.
    pub fn maplen(&self) -> usize {
        self.compdof.len()
    }

    /// The number of elements a write must supply.
    pub fn ndof(&self) -> usize {
        self.compdof.len()
    }

    /// The I/O boxes of every task.
    pub fn plan(&self) -> &BoxPlan {
        &self.plan
    }

    /// The number of I/O tasks that own data.
    pub fn num_aiotasks(&self) -> usize {
        self.plan.num_aiotasks()
    }

    /// This process's I/O box, all zero unless it is an active I/O task.
    pub fn io_box(&self) -> &IoBox {
        &self.io_box
    }

    /// Elements in this process's I/O box.
    pub fn llen(&self) -> usize {
        self.io_box.len()
    }

    /// Elements in the largest I/O box.
    pub fn maxiobuflen(&self) -> usize {
        self.plan.max_box_len()
    }

    /// Where each local element goes, `None` for holes.
    pub fn destinations(&self) -> &[Option<Destination>] {
        &self.destinations
    }

    /// Number of consecutive elements moved per block.
    pub fn transfer_block_len(&self) -> usize {
        self.transfer_block_len
    }

    /// The blocks sent to each active I/O task.
    pub fn transfers(&self) -> &[Vec<TransferBlock>] {
        &self.transfers
    }

    /// The number of contiguous hyperslab regions in the local map.
    pub fn maxregions(&self) -> usize {
        self.maxregions
    }

    /// Whether the local map leaves parts of the array unwritten, so buffers start from fill.
    pub fn needsfill(&self) -> bool {
        self.needsfill
    }

    /// Whether this process is alone in its group, so a flush owns every element of its boxes.
    pub fn sole_writer(&self) -> bool {
        self.sole_writer
    }
}

fn destination(plan: &BoxPlan, total: usize, offset: usize) -> PioResult<Option<Destination>> {
    if offset == 0 {
        return Ok(None);
    }
    if offset > total {
        pio_bail!(OutOfBounds: offset, 1, total + 1);
    }

    let coord = idx_to_dim_list(plan.gdims(), offset - 1);
    let io_task = plan
        .owner_of(&coord)
        .ok_or_else(|| pio_err!("element {} is not in any io box", offset))?;
    let index = plan
        .io_box(io_task)
        .and_then(|io_box| io_box.local_index(&coord))
        .ok_or_else(|| pio_err!(Internal: "io task {} lost element {}", io_task, offset))?;

    Ok(Some(Destination { io_task, index }))
}

/// Group local elements by I/O task and cut each group into blocks that are consecutive both in
/// the local array and in the task's box.
fn transfer_blocks(
    destinations: &[Option<Destination>],
    num_aiotasks: usize,
) -> PioResult<(usize, Vec<Vec<TransferBlock>>)> {
    let mut per_task = vec![Vec::new(); num_aiotasks];
    for (local_offset, dest) in destinations.iter().enumerate() {
        if let Some(dest) = dest {
            per_task[dest.io_task].push(TransferBlock {
                local_offset,
                box_offset: dest.index,
            });
        }
    }

    let mut lengths = Vec::with_capacity(num_aiotasks);
    for elements in per_task.iter().filter(|elements| !elements.is_empty()) {
        let box_offsets = elements.iter().map(|e| e.box_offset).collect::<Vec<_>>();
        let local_offsets = elements.iter().map(|e| e.local_offset).collect::<Vec<_>>();
        lengths.push(lgcd_array(&[
            gcd_blocksize(&box_offsets)?,
            gcd_blocksize(&local_offsets)?,
        ]));
    }
    let block_len = lgcd_array(&lengths);

    let transfers = per_task
        .into_iter()
        .map(|elements| elements.into_iter().step_by(block_len).collect())
        .collect();
    Ok((block_len, transfers))
}

#[cfg(test)]
mod tests {
    use pario_box::compdof_from_block;

    use super::*;
    use crate::iosystem::{IoLayout, ProcessGroup};

    fn iosystem(num_iotasks: usize) -> IoSystem {
        IoSystem::try_new(
            IoSystemId::from(1 << 16),
            ProcessGroup::new(0, num_iotasks).unwrap(),
            IoLayout::new(num_iotasks),
            Rearranger::Box,
        )
        .unwrap()
    }

    fn decompose(
        num_iotasks: usize,
        dims: &[usize],
        compdof: Vec<usize>,
        blocksize: usize,
    ) -> PioResult<Decomposition> {
        Decomposition::try_new(
            DecompId::from(1 << 16),
            &iosystem(num_iotasks),
            ElemType::Int,
            dims,
            compdof,
            Rearranger::Box,
            &BoxOptions::default().with_blocksize(blocksize),
        )
    }

    #[test]
    fn full_map_in_order() {
        let decomp = decompose(1, &[8, 8], (1..=64).collect(), 1024).unwrap();
        assert_eq!(decomp.num_aiotasks(), 1);
        assert_eq!(decomp.transfer_block_len(), 64);
        assert_eq!(
            decomp.transfers(),
            &[vec![TransferBlock {
                local_offset: 0,
                box_offset: 0
            }]]
        );
        assert_eq!(decomp.maxregions(), 1);
        assert!(!decomp.needsfill());
        assert_eq!(decomp.io_box().count(), &[8, 8]);
        assert_eq!(decomp.llen(), 64);
        assert!(decomp.sole_writer());
    }

    #[test]
    fn rows_spread_over_four_boxes() {
        let decomp = decompose(1, &[8, 8], (1..=64).collect(), 64).unwrap();
        assert_eq!(decomp.num_aiotasks(), 1);

        let decomp = decompose(4, &[8, 8], (1..=64).collect(), 64).unwrap();
        assert_eq!(decomp.num_aiotasks(), 4);
        assert!(!decomp.sole_writer());
        assert_eq!(decomp.transfer_block_len(), 16);
        for (task, blocks) in decomp.transfers().iter().enumerate() {
            assert_eq!(
                blocks,
                &vec![TransferBlock {
                    local_offset: 16 * task,
                    box_offset: 0
                }]
            );
        }
        assert_eq!(decomp.maxiobuflen(), 16);
    }

    #[test]
    fn partial_block_needs_fill() {
        let compdof = compdof_from_block(&[4, 4], &[1, 2], &[2, 2]).unwrap();
        let decomp = decompose(1, &[4, 4], compdof, 1024).unwrap();
        assert!(decomp.needsfill());
        assert_eq!(decomp.maxregions(), 1);
        assert_eq!(decomp.transfer_block_len(), 2);
        assert_eq!(
            decomp.destinations()[2],
            Some(Destination {
                io_task: 0,
                index: 10
            })
        );
    }

    #[test]
    fn holes_have_no_destination() {
        let decomp = decompose(1, &[4], vec![1, 0, 3, 4], 1024).unwrap();
        assert_eq!(decomp.destinations()[1], None);
        assert_eq!(decomp.ndof(), 4);
        assert!(decomp.needsfill());
        assert_eq!(decomp.maxregions(), 2);
    }

    #[test]
    fn offsets_past_the_array_are_rejected() {
        assert!(decompose(1, &[4], vec![1, 5], 1024).is_err());
    }

    #[test]
    fn subset_rearranger_is_rejected() {
        let result = Decomposition::try_new(
            DecompId::from(1 << 16),
            &iosystem(1),
            ElemType::Int,
            &[4],
            vec![1, 2, 3, 4],
            Rearranger::Subset,
            &BoxOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn reversed_map_moves_single_elements() {
        let decomp = decompose(1, &[4], vec![4, 3, 2, 1], 1024).unwrap();
        assert_eq!(decomp.transfer_block_len(), 1);
        assert_eq!(decomp.transfers()[0].len(), 4);
        assert_eq!(decomp.maxregions(), 4);
    }
}
