use log::trace;
use pario_dtype::{ElemType, FillValue};
use pario_error::{PioResult, pio_bail, pio_err};

use crate::handle::{DecompId, FileId, IoSystemId};
use crate::var::VarDesc;

/// One distributed array waiting to be flushed.
#[derive(Debug, Clone)]
pub(crate) struct PendingArray {
    pub varid: i32,
    pub frame: Option<usize>,
    pub fill: FillValue,
    pub data: Vec<u8>,
}

/// Buffered writes that share a decomposition and record-ness.
#[derive(Debug, Clone)]
pub(crate) struct WriteBuffer {
    pub ioid: DecompId,
    pub rec_var: bool,
    pub arrays: Vec<PendingArray>,
}

/// One open dataset and the variables defined in it.
#[derive(Debug)]
pub struct File {
    id: FileId,
    iosys_id: IoSystemId,
    writable: bool,
    vars: Vec<VarDesc>,
    buffers: Vec<WriteBuffer>,
}

impl File {
    pub(crate) fn new(id: FileId, iosys_id: IoSystemId, writable: bool) -> Self {
        Self {
            id,
            iosys_id,
            writable,
            vars: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// The handle this file is registered under.
    pub fn id(&self) -> FileId {
        self.id
    }

    /// The I/O system the file was opened on.
    pub fn iosys_id(&self) -> IoSystemId {
        self.iosys_id
    }

    /// Whether distributed arrays may be written to the file.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// The variables of the file in definition order.
    pub fn vars(&self) -> &[VarDesc] {
        &self.vars
    }

    /// Look up a variable.
    pub fn var(&self, varid: i32) -> Option<&VarDesc> {
        self.vars.iter().find(|v| v.varid() == varid)
    }

    pub(crate) fn var_mut(&mut self, varid: i32) -> PioResult<&mut VarDesc> {
        let id = self.id;
        self.vars
            .iter_mut()
            .find(|v| v.varid() == varid)
            .ok_or_else(|| pio_err!(NotFound: "variable {} not found in {}", varid, id))
    }

    /// Whether any distributed array is waiting to be flushed.
    pub fn has_pending_writes(&self) -> bool {
        self.buffers.iter().any(|b| !b.arrays.is_empty())
    }

    /// Whether buffered writes go through the given decomposition.
    pub fn has_pending_writes_through(&self, ioid: DecompId) -> bool {
        self.buffers
            .iter()
            .any(|b| b.ioid == ioid && !b.arrays.is_empty())
    }

    /// The number of distributed arrays waiting to be flushed.
    pub fn num_pending_arrays(&self) -> usize {
        self.buffers.iter().map(|b| b.arrays.len()).sum()
    }

    pub(crate) fn add_var(
        &mut self,
        varid: i32,
        rec_var: bool,
        elem_type: ElemType,
    ) -> PioResult<()> {
        if self.var(varid).is_some() {
            pio_bail!("variable {} already defined in {}", varid, self.id);
        }
        self.vars.push(VarDesc::new(varid, rec_var, elem_type));
        Ok(())
    }

    pub(crate) fn remove_var(&mut self, varid: i32) -> PioResult<VarDesc> {
        let Some(position) = self.vars.iter().position(|v| v.varid() == varid) else {
            pio_bail!(NotFound: "variable {} not found in {}", varid, self.id);
        };
        if self
            .buffers
            .iter()
            .flat_map(|b| &b.arrays)
            .any(|a| a.varid == varid)
        {
            pio_bail!(InUse: "variable {} of {} has buffered writes", varid, self.id);
        }
        Ok(self.vars.remove(position))
    }

    pub(crate) fn push_write(&mut self, ioid: DecompId, rec_var: bool, array: PendingArray) {
        match self
            .buffers
            .iter_mut()
            .find(|b| b.ioid == ioid && b.rec_var == rec_var)
        {
            Some(buffer) => buffer.arrays.push(array),
            None => self.buffers.push(WriteBuffer {
                ioid,
                rec_var,
                arrays: vec![array],
            }),
        }
    }

    pub(crate) fn buffers(&self) -> &[WriteBuffer] {
        &self.buffers
    }

    pub(crate) fn clear_buffers(&mut self) {
        self.buffers.clear();
    }

    /// Free every variable, returning how many there were.
    pub(crate) fn close(mut self) -> usize {
        let count = self.vars.len();
        for var in self.vars.drain(..) {
            trace!("freeing variable {} of {}", var.varid(), self.id);
        }
        count
    }
}
