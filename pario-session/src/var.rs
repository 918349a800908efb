use pario_dtype::{ElemType, FillValue, WireType};
use pario_error::{PioResult, pio_bail};

/// Per-variable bookkeeping inside one open file.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDesc {
    varid: i32,
    rec_var: bool,
    elem_type: ElemType,
    record: Option<usize>,
    fill: FillValue,
}

impl VarDesc {
    pub(crate) fn new(varid: i32, rec_var: bool, elem_type: ElemType) -> Self {
        Self {
            varid,
            rec_var,
            elem_type,
            record: None,
            fill: elem_type.default_fill(),
        }
    }

    /// The variable id within its file.
    pub fn varid(&self) -> i32 {
        self.varid
    }

    /// Whether the variable has an unlimited record dimension.
    pub fn is_record_var(&self) -> bool {
        self.rec_var
    }

    /// The logical element type.
    pub fn elem_type(&self) -> ElemType {
        self.elem_type
    }

    /// The representation used while moving elements.
    pub fn wire_type(&self) -> WireType {
        self.elem_type.wire_type()
    }

    /// Bytes per element.
    pub fn elem_size(&self) -> usize {
        self.elem_type.byte_width()
    }

    /// The current record frame, if one has been set.
    pub fn record(&self) -> Option<usize> {
        self.record
    }

    /// The value written where no task supplies data.
    pub fn fill_value(&self) -> FillValue {
        self.fill
    }

    pub(crate) fn set_frame(&mut self, frame: usize) {
        self.record = Some(frame);
    }

    /// An unset frame advances to frame 0.
    pub(crate) fn advance_frame(&mut self) {
        self.record = Some(self.record.map_or(0, |r| r + 1));
    }

    pub(crate) fn set_fill_value(&mut self, fill: FillValue) -> PioResult<()> {
        if fill.elem_type() != self.elem_type {
            pio_bail!(
                "fill value of type {} does not match variable {} of type {}",
                fill.elem_type(),
                self.varid,
                self.elem_type
            );
        }
        self.fill = fill;
        Ok(())
    }
}
