use crate::ElemType;

/// A typed fill value, written to every element of an I/O buffer that no task supplies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    /// Signed 8-bit integer
    Byte(i8),
    /// 8-bit character
    Char(u8),
    /// Signed 16-bit integer
    Short(i16),
    /// Signed 32-bit integer
    Int(i32),
    /// IEEE 32-bit float
    Float(f32),
    /// IEEE 64-bit float
    Double(f64),
    /// Unsigned 8-bit integer
    UByte(u8),
    /// Unsigned 16-bit integer
    UShort(u16),
    /// Unsigned 32-bit integer
    UInt(u32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// A string character
    String(u8),
}

impl FillValue {
    /// The element type this fill value belongs to.
    pub fn elem_type(&self) -> ElemType {
        match self {
            Self::Byte(_) => ElemType::Byte,
            Self::Char(_) => ElemType::Char,
            Self::Short(_) => ElemType::Short,
            Self::Int(_) => ElemType::Int,
            Self::Float(_) => ElemType::Float,
            Self::Double(_) => ElemType::Double,
            Self::UByte(_) => ElemType::UByte,
            Self::UShort(_) => ElemType::UShort,
            Self::UInt(_) => ElemType::UInt,
            Self::Int64(_) => ElemType::Int64,
            Self::UInt64(_) => ElemType::UInt64,
            Self::String(_) => ElemType::String,
        }
    }

    /// The little-endian encoding of one element.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Byte(v) => v.to_le_bytes().to_vec(),
            Self::Char(v) | Self::UByte(v) | Self::String(v) => vec![*v],
            Self::Short(v) => v.to_le_bytes().to_vec(),
            Self::Int(v) => v.to_le_bytes().to_vec(),
            Self::Float(v) => v.to_le_bytes().to_vec(),
            Self::Double(v) => v.to_le_bytes().to_vec(),
            Self::UShort(v) => v.to_le_bytes().to_vec(),
            Self::UInt(v) => v.to_le_bytes().to_vec(),
            Self::Int64(v) => v.to_le_bytes().to_vec(),
            Self::UInt64(v) => v.to_le_bytes().to_vec(),
        }
    }
}

impl ElemType {
    /// The conventional fill value of this type in array files.
    pub fn default_fill(&self) -> FillValue {
        match self {
            Self::Byte => FillValue::Byte(-127),
            Self::Char => FillValue::Char(0),
            Self::Short => FillValue::Short(-32767),
            Self::Int => FillValue::Int(-2147483647),
            Self::Float => FillValue::Float(9.96921e36),
            Self::Double => FillValue::Double(9.969209968386869e36),
            Self::UByte => FillValue::UByte(255),
            Self::UShort => FillValue::UShort(65535),
            Self::UInt => FillValue::UInt(4294967295),
            Self::Int64 => FillValue::Int64(-9223372036854775806),
            Self::UInt64 => FillValue::UInt64(18446744073709551614),
            Self::String => FillValue::String(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fill_matches_type() {
        for elem_type in ElemType::ALL {
            let fill = elem_type.default_fill();
            assert_eq!(fill.elem_type(), elem_type);
            assert_eq!(fill.to_le_bytes().len(), elem_type.byte_width());
        }
    }
}
