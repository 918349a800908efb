use itertools::Itertools;
use log::{debug, trace, warn};
use pario_box::{
    BoxOptions, StartCount, calc_start_count, compdof_from_block, compdof_from_zero_based,
};
use pario_dtype::{ElemType, FillValue};
use pario_error::{PioResult, pio_bail, pio_err};

use crate::darray::{Hyperslab, HyperslabSink, HyperslabSource, assemble_box, scatter_box};
use crate::decomp::Decomposition;
use crate::file::{File, PendingArray};
use crate::handle::{DecompId, FileId, IoSystemId, SlotTable};
use crate::iosystem::{IoLayout, IoSystem, ProcessGroup, Rearranger};
use crate::var::VarDesc;

/// Every live I/O system, file and decomposition of one process, plus the planner options.
///
/// Handles returned by a context are only meaningful to that context. Freed handles never
/// resolve again and report `NotFound`; values the context never issued report
/// `InvalidArgument`.
#[derive(Debug, Default)]
pub struct PioContext {
    box_options: BoxOptions,
    iosystems: SlotTable<IoSystem>,
    files: SlotTable<File>,
    decomps: SlotTable<Decomposition>,
}

impl PioContext {
    /// A context planning with the default block size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan future decompositions with the given options.
    pub fn with_box_options(mut self, options: BoxOptions) -> Self {
        self.box_options = options;
        self
    }

    /// The options future decompositions are planned with.
    pub fn box_options(&self) -> &BoxOptions {
        &self.box_options
    }

    /// Change the target bytes per I/O box. Non-positive sizes are ignored.
    pub fn set_blocksize(&mut self, blocksize: i64) {
        match usize::try_from(blocksize) {
            Ok(blocksize) if blocksize > 0 => {
                debug!("box blocksize set to {}", blocksize);
                self.box_options = self.box_options.with_blocksize(blocksize);
            }
            _ => trace!("ignoring blocksize {}", blocksize),
        }
    }

    /// Register an I/O system for a process group.
    pub fn add_iosystem(
        &mut self,
        group: ProcessGroup,
        layout: IoLayout,
        rearranger: Rearranger,
    ) -> PioResult<IoSystemId> {
        let id = self
            .iosystems
            .insert_with(|id| IoSystem::try_new(id, group, layout, rearranger))?;
        debug!(
            "{}: rank {} of {}, io ranks [{}], {} rearranger",
            id,
            group.rank(),
            group.size(),
            self.iosystem(id)?.io_ranks().iter().join(", "),
            rearranger
        );
        Ok(id)
    }

    /// Look up an I/O system.
    pub fn iosystem(&self, id: IoSystemId) -> PioResult<&IoSystem> {
        self.iosystems.get(id)
    }

    /// Free an I/O system that no file or decomposition references any longer.
    pub fn delete_iosystem(&mut self, id: IoSystemId) -> PioResult<()> {
        self.iosystem(id)?;
        let files = self.files.values().filter(|f| f.iosys_id() == id).count();
        let decomps = self.decomps.values().filter(|d| d.iosys_id() == id).count();
        if files + decomps > 0 {
            pio_bail!(
                InUse: "{} is referenced by {} files and {} decompositions",
                id,
                files,
                decomps
            );
        }
        self.iosystems.remove(id)?;
        trace!("freed {}", id);
        Ok(())
    }

    /// The number of I/O tasks of a system.
    pub fn num_iotasks(&self, id: IoSystemId) -> PioResult<usize> {
        Ok(self.iosystem(id)?.num_iotasks())
    }

    /// Whether this process is an I/O task of a system.
    pub fn is_iotask(&self, id: IoSystemId) -> PioResult<bool> {
        Ok(self.iosystem(id)?.is_iotask())
    }

    /// This process's I/O rank in a system, if it is an I/O task.
    pub fn iotask_rank(&self, id: IoSystemId) -> PioResult<Option<usize>> {
        Ok(self.iosystem(id)?.io_rank())
    }

    /// Open a writable file on an I/O system.
    pub fn add_file(&mut self, iosys_id: IoSystemId) -> PioResult<FileId> {
        self.open_file(iosys_id, true)
    }

    /// Open a file that distributed arrays can only be read from.
    pub fn add_readonly_file(&mut self, iosys_id: IoSystemId) -> PioResult<FileId> {
        self.open_file(iosys_id, false)
    }

    fn open_file(&mut self, iosys_id: IoSystemId, writable: bool) -> PioResult<FileId> {
        self.iosystem(iosys_id)?;
        let id = self
            .files
            .insert_with(|id| Ok(File::new(id, iosys_id, writable)))?;
        trace!(
            "opened {} on {}{}",
            id,
            iosys_id,
            if writable { "" } else { " read-only" }
        );
        Ok(id)
    }

    /// Look up an open file.
    pub fn file(&self, id: FileId) -> PioResult<&File> {
        self.files.get(id)
    }

    fn file_mut(&mut self, id: FileId) -> PioResult<&mut File> {
        self.files.get_mut(id)
    }

    /// Close a file and free its variables. Unflushed writes keep the file open.
    pub fn delete_file(&mut self, id: FileId) -> PioResult<()> {
        let pending = self.file(id)?.num_pending_arrays();
        if pending > 0 {
            pio_bail!(InUse: "{} has {} unflushed arrays", id, pending);
        }
        let freed = self.files.remove(id)?.close();
        trace!("closed {} and freed {} variables", id, freed);
        Ok(())
    }

    /// Define a variable in an open file.
    pub fn add_var(
        &mut self,
        file_id: FileId,
        varid: i32,
        rec_var: bool,
        elem_type: ElemType,
    ) -> PioResult<()> {
        self.file_mut(file_id)?.add_var(varid, rec_var, elem_type)?;
        trace!("defined variable {} of {} in {}", varid, elem_type, file_id);
        Ok(())
    }

    /// Look up a variable of an open file.
    pub fn var(&self, file_id: FileId, varid: i32) -> PioResult<&VarDesc> {
        self.file(file_id)?
            .var(varid)
            .ok_or_else(|| pio_err!(NotFound: "variable {} not found in {}", varid, file_id))
    }

    /// Remove a variable without buffered writes from an open file.
    pub fn delete_var(&mut self, file_id: FileId, varid: i32) -> PioResult<()> {
        self.file_mut(file_id)?.remove_var(varid)?;
        trace!("freed variable {} of {}", varid, file_id);
        Ok(())
    }

    /// Set the record frame the next writes of a variable go to.
    pub fn set_frame(&mut self, file_id: FileId, varid: i32, frame: usize) -> PioResult<()> {
        self.file_mut(file_id)?.var_mut(varid)?.set_frame(frame);
        Ok(())
    }

    /// Move a variable to its next record frame, or to frame 0 if none was set.
    pub fn advance_frame(&mut self, file_id: FileId, varid: i32) -> PioResult<()> {
        self.file_mut(file_id)?.var_mut(varid)?.advance_frame();
        Ok(())
    }

    /// Set the value written where a decomposition supplies no data.
    pub fn set_fill_value(
        &mut self,
        file_id: FileId,
        varid: i32,
        fill: FillValue,
    ) -> PioResult<()> {
        self.file_mut(file_id)?.var_mut(varid)?.set_fill_value(fill)
    }

    /// Register the decomposition of a distributed array.
    ///
    /// `compdof` holds the 1-based global offset of each of this process's `local_element_count`
    /// elements, with 0 marking a hole. Without an explicit rearranger the I/O system's default
    /// is used.
    pub fn init_decomp(
        &mut self,
        iosys_id: IoSystemId,
        elem_type: ElemType,
        dims: &[usize],
        local_element_count: usize,
        compdof: Vec<usize>,
        rearranger: Option<Rearranger>,
    ) -> PioResult<DecompId> {
        if compdof.len() != local_element_count {
            pio_bail!(
                "map of {} entries does not match {} local elements",
                compdof.len(),
                local_element_count
            );
        }
        let ios = self.iosystems.get(iosys_id)?;
        let rearranger = rearranger.unwrap_or(ios.rearranger());
        let options = self.box_options;

        self.decomps.insert_with(|ioid: DecompId| {
            Decomposition::try_new(ioid, ios, elem_type, dims, compdof, rearranger, &options)
        })
    }

    /// Register a decomposition whose local share is one block of the global array.
    pub fn init_decomp_from_block(
        &mut self,
        iosys_id: IoSystemId,
        elem_type: ElemType,
        dims: &[usize],
        start: &[usize],
        count: &[usize],
    ) -> PioResult<DecompId> {
        let compdof = compdof_from_block(dims, start, count)?;
        self.init_decomp(iosys_id, elem_type, dims, compdof.len(), compdof, None)
    }

    /// Register a decomposition from a 0-based map in which -1 marks a hole.
    pub fn init_decomp_zero_based(
        &mut self,
        iosys_id: IoSystemId,
        elem_type: ElemType,
        dims: &[usize],
        map: &[i64],
    ) -> PioResult<DecompId> {
        let compdof = compdof_from_zero_based(map)?;
        self.init_decomp(iosys_id, elem_type, dims, compdof.len(), compdof, None)
    }

    /// Look up a decomposition.
    pub fn decomp(&self, ioid: DecompId) -> PioResult<&Decomposition> {
        self.decomps.get(ioid)
    }

    /// Free a decomposition that no file has buffered writes through.
    pub fn delete_decomp(&mut self, ioid: DecompId) -> PioResult<()> {
        self.decomp(ioid)?;
        if let Some(file) = self
            .files
            .values()
            .find(|f| f.has_pending_writes_through(ioid))
        {
            pio_bail!(InUse: "{} has unflushed writes through {}", file.id(), ioid);
        }
        self.decomps.remove(ioid)?;
        trace!("freed {}", ioid);
        Ok(())
    }

    /// The number of elements a write through a decomposition must supply.
    pub fn local_array_size(&self, ioid: DecompId) -> PioResult<usize> {
        Ok(self.decomp(ioid)?.ndof())
    }

    /// Compute one I/O task's box with the context's planner options.
    pub fn calc_start_count(
        &self,
        elem_type: ElemType,
        gdims: &[usize],
        num_io_procs: usize,
        my_iorank: usize,
    ) -> PioResult<StartCount> {
        calc_start_count(elem_type, gdims, num_io_procs, my_iorank, &self.box_options)
    }

    /// The number of live I/O systems.
    pub fn num_iosystems(&self) -> usize {
        self.iosystems.len()
    }

    /// The number of open files.
    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    /// The number of live decompositions.
    pub fn num_decomps(&self) -> usize {
        self.decomps.len()
    }

    /// Buffer one distributed array for a later [`sync_file`](Self::sync_file).
    ///
    /// `data` holds this process's elements, little-endian, in map order.
    pub fn write_darray(
        &mut self,
        file_id: FileId,
        varid: i32,
        ioid: DecompId,
        data: &[u8],
    ) -> PioResult<()> {
        let decomp = self.decomps.get(ioid)?;
        let file = self.files.get_mut(file_id)?;
        if !file.is_writable() {
            pio_bail!("{} is read-only", file_id);
        }
        if file.iosys_id() != decomp.iosys_id() {
            pio_bail!(
                "{} belongs to {}, not {}",
                ioid,
                decomp.iosys_id(),
                file.iosys_id()
            );
        }

        let var = file
            .var(varid)
            .ok_or_else(|| pio_err!(NotFound: "variable {} not found in {}", varid, file_id))?;
        let frame = frame_of(var)?;
        let rec_var = var.is_record_var();
        check_type(var, decomp)?;

        let needed = decomp.ndof() * var.elem_size();
        if data.len() < needed || data.len() % var.elem_size() != 0 {
            pio_bail!(
                "{} needs {} bytes of {} for variable {}, got {}",
                ioid,
                needed,
                var.elem_type(),
                varid,
                data.len()
            );
        }
        if data.len() > needed {
            warn!(
                "{} bytes given for variable {} of {}, only the first {} are used",
                data.len(),
                varid,
                file_id,
                needed
            );
        }

        let pending = PendingArray {
            varid,
            frame,
            fill: var.fill_value(),
            data: data[..needed].to_vec(),
        };
        file.push_write(ioid, rec_var, pending);
        trace!(
            "buffered variable {} frame {} of {} through {}",
            varid,
            frame.map_or_else(|| "-".to_string(), |f| f.to_string()),
            file_id,
            ioid
        );
        Ok(())
    }

    /// Flush every buffered write of a file into `sink`, one hyperslab per active I/O box.
    ///
    /// When the I/O system's group has other processes, only the elements this process supplies
    /// are handed to the sink, and boxes it supplies nothing to are skipped. On error the buffers
    /// are kept, so the flush can be retried.
    pub fn sync_file(&mut self, file_id: FileId, sink: &mut dyn HyperslabSink) -> PioResult<()> {
        let file = self.file(file_id)?;
        let mut flushed = 0;
        for buffer in file.buffers() {
            let decomp = self.decomp(buffer.ioid)?;
            for array in &buffer.arrays {
                for (io_task, io_box) in decomp.plan().active_boxes().iter().enumerate() {
                    let assembled = assemble_box(decomp, io_task, &array.data, &array.fill)?;
                    if assembled.is_foreign() {
                        continue;
                    }
                    let slab = Hyperslab {
                        varid: array.varid,
                        frame: array.frame,
                        start: io_box.start(),
                        count: io_box.count(),
                        elem_type: decomp.elem_type(),
                    };
                    sink.put_hyperslab(&slab, &assembled.bytes, assembled.owned.as_deref())
                        .map_err(|e| {
                            e.with_context(format!(
                                "flushing variable {} of {}",
                                array.varid, file_id
                            ))
                        })?;
                }
                flushed += 1;
            }
        }

        self.file_mut(file_id)?.clear_buffers();
        debug!("flushed {} arrays of {}", flushed, file_id);
        Ok(())
    }

    /// Read this process's elements of a distributed array from `source`.
    ///
    /// Holes in the decomposition's map come back as the variable's fill value.
    pub fn read_darray(
        &self,
        file_id: FileId,
        varid: i32,
        ioid: DecompId,
        source: &mut dyn HyperslabSource,
    ) -> PioResult<Vec<u8>> {
        let decomp = self.decomp(ioid)?;
        let var = self.var(file_id, varid)?;
        let frame = frame_of(var)?;
        check_type(var, decomp)?;

        let mut local = var.fill_value().to_le_bytes().repeat(decomp.ndof());
        for (io_task, io_box) in decomp.plan().active_boxes().iter().enumerate() {
            let slab = Hyperslab {
                varid,
                frame,
                start: io_box.start(),
                count: io_box.count(),
                elem_type: decomp.elem_type(),
            };
            let box_data = source.get_hyperslab(&slab)?;
            if box_data.len() != slab.nbytes() {
                pio_bail!(
                    "io box {} of variable {} came back with {} bytes, expected {}",
                    io_box,
                    varid,
                    box_data.len(),
                    slab.nbytes()
                );
            }
            scatter_box(decomp, io_task, &box_data, &mut local)?;
        }
        Ok(local)
    }
}

/// Record variables need a frame before they can be written or read.
fn frame_of(var: &VarDesc) -> PioResult<Option<usize>> {
    if !var.is_record_var() {
        return Ok(None);
    }
    match var.record() {
        Some(frame) => Ok(Some(frame)),
        None => pio_bail!("record variable {} has no frame set", var.varid()),
    }
}

fn check_type(var: &VarDesc, decomp: &Decomposition) -> PioResult<()> {
    if var.elem_type() != decomp.elem_type() {
        pio_bail!(
            "variable {} holds {} but {} moves {}",
            var.varid(),
            var.elem_type(),
            decomp.ioid(),
            decomp.elem_type()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pario_error::ErrorKind;

    use super::*;

    fn context_with_system(num_iotasks: usize) -> (PioContext, IoSystemId) {
        let mut ctx = PioContext::new();
        let ios = ctx
            .add_iosystem(
                ProcessGroup::new(0, num_iotasks).unwrap(),
                IoLayout::new(num_iotasks),
                Rearranger::Box,
            )
            .unwrap();
        (ctx, ios)
    }

    #[test]
    fn blocksize_ignores_non_positive() {
        let mut ctx = PioContext::new();
        ctx.set_blocksize(0);
        ctx.set_blocksize(-5);
        assert_eq!(ctx.box_options().blocksize(), 1024);
        ctx.set_blocksize(64);
        assert_eq!(ctx.box_options().blocksize(), 64);
    }

    #[test]
    fn start_count_uses_context_options() {
        let mut ctx = PioContext::new();
        ctx.set_blocksize(64);
        let sc = ctx.calc_start_count(ElemType::Int, &[8, 8], 4, 1).unwrap();
        assert_eq!(sc.num_aiotasks, 4);
        assert_eq!(sc.start, vec![2, 0]);
        assert_eq!(sc.count, vec![2, 8]);
    }

    #[test]
    fn map_length_must_match() {
        let (mut ctx, ios) = context_with_system(1);
        let err = ctx
            .init_decomp(ios, ElemType::Int, &[4], 3, vec![1, 2, 3, 4], None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(ctx.num_decomps(), 0);
    }

    #[test]
    fn failed_decomposition_leaves_no_entry() {
        let (mut ctx, ios) = context_with_system(1);
        assert!(ctx.init_decomp(ios, ElemType::Int, &[4, 0], 0, vec![], None).is_err());
        assert!(
            ctx.init_decomp(ios, ElemType::Int, &[4], 2, vec![1, 2], Some(Rearranger::Subset))
                .is_err()
        );
        assert_eq!(ctx.num_decomps(), 0);

        let ioid = ctx.init_decomp(ios, ElemType::Int, &[4], 2, vec![1, 2], None).unwrap();
        assert_eq!(ctx.decomp(ioid).unwrap().rearranger(), Rearranger::Box);
        assert_eq!(ctx.local_array_size(ioid).unwrap(), 2);
    }

    #[test]
    fn read_only_files_reject_writes() {
        let (mut ctx, ios) = context_with_system(1);
        let file = ctx.add_readonly_file(ios).unwrap();
        ctx.add_var(file, 0, false, ElemType::Int).unwrap();
        let ioid = ctx.init_decomp_zero_based(ios, ElemType::Int, &[2], &[0, 1]).unwrap();
        let err = ctx.write_darray(file, 0, ioid, &[0; 8]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!ctx.file(file).unwrap().is_writable());
    }

    #[test]
    fn write_checks_type_and_length() {
        let (mut ctx, ios) = context_with_system(1);
        let file = ctx.add_file(ios).unwrap();
        ctx.add_var(file, 0, false, ElemType::Double).unwrap();
        ctx.add_var(file, 1, false, ElemType::Int).unwrap();
        let ioid = ctx.init_decomp_zero_based(ios, ElemType::Int, &[2], &[0, 1]).unwrap();

        assert!(ctx.write_darray(file, 0, ioid, &[0; 8]).is_err());
        assert!(ctx.write_darray(file, 1, ioid, &[0; 4]).is_err());
        assert!(ctx.write_darray(file, 1, ioid, &[0; 9]).is_err());
        ctx.write_darray(file, 1, ioid, &[0; 12]).unwrap();
        assert_eq!(ctx.file(file).unwrap().num_pending_arrays(), 1);
    }

    #[test]
    fn record_vars_need_a_frame() {
        let (mut ctx, ios) = context_with_system(1);
        let file = ctx.add_file(ios).unwrap();
        ctx.add_var(file, 3, true, ElemType::Int).unwrap();
        let ioid = ctx.init_decomp_zero_based(ios, ElemType::Int, &[1], &[0]).unwrap();

        assert!(ctx.write_darray(file, 3, ioid, &[0; 4]).is_err());
        ctx.advance_frame(file, 3).unwrap();
        ctx.write_darray(file, 3, ioid, &[0; 4]).unwrap();
        assert_eq!(ctx.var(file, 3).unwrap().record(), Some(0));
    }

    #[test]
    fn iosystem_handles_are_never_reissued() {
        let mut ctx = PioContext::new();
        let add = |ctx: &mut PioContext| {
            ctx.add_iosystem(ProcessGroup::single(), IoLayout::default(), Rearranger::Box)
                .unwrap()
        };

        let first = add(&mut ctx);
        let mut seen = HashSet::from([first]);
        ctx.delete_iosystem(first).unwrap();
        for _ in 1..u16::MAX {
            let id = add(&mut ctx);
            assert!(seen.insert(id));
            ctx.delete_iosystem(id).unwrap();
        }

        let next = add(&mut ctx);
        assert!(seen.insert(next));
        assert_eq!(ctx.iosystem(first).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(ctx.num_iosystems(), 1);
    }

    #[test]
    fn io_task_queries() {
        let mut ctx = PioContext::new();
        let ios = ctx
            .add_iosystem(
                ProcessGroup::new(3, 4).unwrap(),
                IoLayout::new(2).with_stride(2),
                Rearranger::Box,
            )
            .unwrap();
        assert_eq!(ctx.num_iotasks(ios).unwrap(), 2);
        assert!(!ctx.is_iotask(ios).unwrap());
        assert_eq!(ctx.iotask_rank(ios).unwrap(), None);
    }
}
