use std::collections::HashMap;

use itertools::Itertools;
use log::trace;
use pario_box::{coord_to_lindex, global_len};
use pario_dtype::ElemType;
use pario_error::{PioResult, pio_bail, pio_err};

use crate::darray::{Hyperslab, HyperslabSink, HyperslabSource};

#[derive(Debug, Clone)]
struct StoredVar {
    dims: Vec<usize>,
    elem_type: ElemType,
}

/// A dataset held in memory, one full array per variable and frame.
///
/// Frames that were never written read back as the type's default fill value.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    vars: HashMap<i32, StoredVar>,
    arrays: HashMap<(i32, Option<usize>), Vec<u8>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the shape and type of a variable, excluding any record dimension.
    pub fn define_var(
        &mut self,
        varid: i32,
        dims: &[usize],
        elem_type: ElemType,
    ) -> PioResult<()> {
        global_len(dims)?;
        if self.vars.contains_key(&varid) {
            pio_bail!("variable {} is already defined", varid);
        }
        self.vars.insert(
            varid,
            StoredVar {
                dims: dims.to_vec(),
                elem_type,
            },
        );
        Ok(())
    }

    /// The stored bytes of one variable and frame, if anything was written to it.
    pub fn data(&self, varid: i32, frame: Option<usize>) -> Option<&[u8]> {
        self.arrays.get(&(varid, frame)).map(Vec::as_slice)
    }

    fn var(&self, slab: &Hyperslab<'_>) -> PioResult<&StoredVar> {
        let var = self
            .vars
            .get(&slab.varid)
            .ok_or_else(|| pio_err!(NotFound: "variable {} is not defined", slab.varid))?;
        if var.elem_type != slab.elem_type {
            pio_bail!(
                "variable {} holds {}, not {}",
                slab.varid,
                var.elem_type,
                slab.elem_type
            );
        }
        if slab.start.len() != var.dims.len() || slab.count.len() != var.dims.len() {
            pio_bail!(
                "slab of rank {} does not match variable {} of rank {}",
                slab.start.len(),
                slab.varid,
                var.dims.len()
            );
        }
        for ((&s, &c), &g) in slab.start.iter().zip(slab.count).zip(&var.dims) {
            if s.checked_add(c).is_none_or(|end| end > g) {
                pio_bail!("slab {}+{} exceeds dimension of {}", s, c, g);
            }
        }
        Ok(var)
    }
}

/// The global offset of every row of a slab, in row-major order.
fn row_offsets(dims: &[usize], start: &[usize], count: &[usize]) -> Vec<usize> {
    let last = dims.len() - 1;
    let origin = |row: &[usize]| {
        let coord = row
            .iter()
            .zip(start)
            .map(|(&r, &s)| r + s)
            .chain([start[last]])
            .collect::<Vec<_>>();
        coord_to_lindex(&coord, dims)
    };

    if last == 0 {
        return vec![origin(&[])];
    }
    count[..last]
        .iter()
        .map(|&c| 0..c)
        .multi_cartesian_product()
        .map(|row| origin(&row))
        .collect()
}

impl HyperslabSink for MemoryStore {
    fn put_hyperslab(
        &mut self,
        slab: &Hyperslab<'_>,
        data: &[u8],
        owned: Option<&[bool]>,
    ) -> PioResult<()> {
        let var = self.var(slab)?.clone();
        if data.len() != slab.nbytes() {
            pio_bail!(
                "slab of {} elements needs {} bytes, got {}",
                slab.len(),
                slab.nbytes(),
                data.len()
            );
        }
        if let Some(flags) = owned.filter(|flags| flags.len() != slab.len()) {
            pio_bail!(
                "slab of {} elements came with {} ownership flags",
                slab.len(),
                flags.len()
            );
        }
        if slab.is_empty() {
            return Ok(());
        }

        let size = var.elem_type.byte_width();
        let row_len = slab.count[var.dims.len() - 1];
        let row_bytes = row_len * size;
        let array = self.arrays.entry((slab.varid, slab.frame)).or_insert_with(|| {
            var.elem_type
                .default_fill()
                .to_le_bytes()
                .repeat(var.dims.iter().product())
        });

        let offsets = row_offsets(&var.dims, slab.start, slab.count);
        for (row, offset) in offsets.into_iter().enumerate() {
            let src = &data[row * row_bytes..(row + 1) * row_bytes];
            let dst = &mut array[offset * size..offset * size + row_bytes];
            match owned {
                None => dst.copy_from_slice(src),
                Some(owned) => {
                    let flags = &owned[row * row_len..(row + 1) * row_len];
                    for ((d, s), _) in dst
                        .chunks_exact_mut(size)
                        .zip(src.chunks_exact(size))
                        .zip(flags)
                        .filter(|(_, keep)| **keep)
                    {
                        d.copy_from_slice(s);
                    }
                }
            }
        }
        trace!(
            "stored {} elements of variable {} at [{}]",
            slab.len(),
            slab.varid,
            slab.start.iter().join(", ")
        );
        Ok(())
    }
}

impl HyperslabSource for MemoryStore {
    fn get_hyperslab(&mut self, slab: &Hyperslab<'_>) -> PioResult<Vec<u8>> {
        let var = self.var(slab)?;
        let size = var.elem_type.byte_width();
        let Some(array) = self.arrays.get(&(slab.varid, slab.frame)) else {
            return Ok(var.elem_type.default_fill().to_le_bytes().repeat(slab.len()));
        };
        if slab.is_empty() {
            return Ok(Vec::new());
        }

        let row_bytes = slab.count[var.dims.len() - 1] * size;
        let mut data = Vec::with_capacity(slab.nbytes());
        for offset in row_offsets(&var.dims, slab.start, slab.count) {
            data.extend_from_slice(&array[offset * size..offset * size + row_bytes]);
        }
        Ok(data)
    }
}
