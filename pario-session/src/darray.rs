use pario_dtype::{ElemType, FillValue};
use pario_error::{PioResult, pio_bail, pio_err};

use crate::decomp::{Decomposition, TransferBlock};

/// A rectangular piece of one variable, as stored in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hyperslab<'a> {
    /// The variable the slab belongs to.
    pub varid: i32,
    /// The record frame, for variables with a record dimension.
    pub frame: Option<usize>,
    /// Per-dimension start.
    pub start: &'a [usize],
    /// Per-dimension count.
    pub count: &'a [usize],
    /// The element type of the slab's bytes.
    pub elem_type: ElemType,
}

impl Hyperslab<'_> {
    /// The number of elements in the slab.
    pub fn len(&self) -> usize {
        self.count.iter().product()
    }

    /// Whether the slab holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of bytes the slab occupies.
    pub fn nbytes(&self) -> usize {
        self.len() * self.elem_type.byte_width()
    }
}

/// Storage that accepts the boxes assembled on flush.
///
/// Data is row-major and little-endian, `slab.nbytes()` long.
pub trait HyperslabSink {
    /// Store one hyperslab.
    ///
    /// When `owned` is given it holds one flag per element of the slab, and only the flagged
    /// elements may be stored. The others belong to other processes of the group.
    fn put_hyperslab(
        &mut self,
        slab: &Hyperslab<'_>,
        data: &[u8],
        owned: Option<&[bool]>,
    ) -> PioResult<()>;
}

/// Storage that serves the boxes needed to read a distributed array.
pub trait HyperslabSource {
    /// Load one hyperslab, returning exactly `slab.nbytes()` bytes.
    fn get_hyperslab(&mut self, slab: &Hyperslab<'_>) -> PioResult<Vec<u8>>;
}

/// The bytes one I/O task writes for its box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AssembledBox {
    pub bytes: Vec<u8>,
    /// The elements this process supplies, unless it supplies the whole box.
    pub owned: Option<Vec<bool>>,
}

impl AssembledBox {
    /// Whether this process has nothing to write into the box.
    pub fn is_foreign(&self) -> bool {
        self.owned.as_ref().is_some_and(|owned| !owned.contains(&true))
    }
}

/// Lay out the bytes one I/O task writes for its box.
///
/// The buffer starts from `fill` when the decomposition leaves gaps, then every transfer block
/// of `local` is copied into place. A process that shares the array with others only owns the
/// elements its blocks cover; if it alone writes the array, it owns the whole box, gaps included.
pub(crate) fn assemble_box(
    decomp: &Decomposition,
    io_task: usize,
    local: &[u8],
    fill: &FillValue,
) -> PioResult<AssembledBox> {
    let size = decomp.elem_type().byte_width();
    let box_len = decomp
        .plan()
        .io_box(io_task)
        .map(|io_box| io_box.len())
        .ok_or_else(|| pio_err!(Internal: "io task {} has no box", io_task))?;

    let mut buffer = if decomp.needsfill() {
        fill.to_le_bytes().repeat(box_len)
    } else {
        vec![0; box_len * size]
    };

    let mut owned = (!decomp.sole_writer()).then(|| vec![false; box_len]);

    let block_len = decomp.transfer_block_len();
    let block_bytes = block_len * size;
    for block in transfers_of(decomp, io_task)? {
        let from = block.local_offset * size;
        let to = block.box_offset * size;
        let (Some(src), Some(dst)) = (
            local.get(from..from + block_bytes),
            buffer.get_mut(to..to + block_bytes),
        ) else {
            pio_bail!(
                Internal: "transfer block at {} overruns io task {}",
                block.local_offset,
                io_task
            );
        };
        dst.copy_from_slice(src);
        if let Some(flags) = owned
            .as_mut()
            .and_then(|owned| owned.get_mut(block.box_offset..block.box_offset + block_len))
        {
            flags.fill(true);
        }
    }

    if owned.as_ref().is_some_and(|owned| owned.iter().all(|&o| o)) {
        owned = None;
    }
    Ok(AssembledBox {
        bytes: buffer,
        owned,
    })
}

/// Copy the elements of one I/O task's box back into the local array.
pub(crate) fn scatter_box(
    decomp: &Decomposition,
    io_task: usize,
    box_data: &[u8],
    local: &mut [u8],
) -> PioResult<()> {
    let size = decomp.elem_type().byte_width();
    let block_bytes = decomp.transfer_block_len() * size;
    for block in transfers_of(decomp, io_task)? {
        let from = block.box_offset * size;
        let to = block.local_offset * size;
        let (Some(src), Some(dst)) = (
            box_data.get(from..from + block_bytes),
            local.get_mut(to..to + block_bytes),
        ) else {
            pio_bail!(
                Internal: "transfer block at {} overruns io task {}",
                block.box_offset,
                io_task
            );
        };
        dst.copy_from_slice(src);
    }
    Ok(())
}

fn transfers_of(decomp: &Decomposition, io_task: usize) -> PioResult<&[TransferBlock]> {
    decomp
        .transfers()
        .get(io_task)
        .map(Vec::as_slice)
        .ok_or_else(|| pio_err!(Internal: "io task {} is not active", io_task))
}
