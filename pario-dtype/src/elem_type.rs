use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use pario_error::{PioResult, pio_err};
use static_assertions::const_assert_eq;

/// The element type of a variable or decomposition, keyed by its array-file type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum ElemType {
    /// Signed 8-bit integer
    Byte = 1,
    /// 8-bit character
    Char = 2,
    /// Signed 16-bit integer
    Short = 3,
    /// Signed 32-bit integer
    Int = 4,
    /// IEEE 32-bit float
    Float = 5,
    /// IEEE 64-bit float
    Double = 6,
    /// Unsigned 8-bit integer
    UByte = 7,
    /// Unsigned 16-bit integer
    UShort = 8,
    /// Unsigned 32-bit integer
    UInt = 9,
    /// Signed 64-bit integer
    Int64 = 10,
    /// Unsigned 64-bit integer
    UInt64 = 11,
    /// Character string, moved one character at a time
    String = 12,
}

/// The representation an element takes while it is being moved between tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Signed 8-bit integer
    I8,
    /// 8-bit character
    Char,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// IEEE 32-bit float
    F32,
    /// IEEE 64-bit float
    F64,
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 64-bit integer
    U64,
}

impl WireType {
    /// The number of bytes one element occupies on the wire.
    pub const fn byte_width(&self) -> usize {
        match self {
            Self::I8 | Self::Char | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::F32 | Self::U32 => 4,
            Self::F64 | Self::I64 | Self::U64 => 8,
        }
    }
}

impl ElemType {
    /// Resolve an array-file type code.
    pub fn try_from_code(code: i32) -> PioResult<Self> {
        Self::try_from(code).map_err(|_| pio_err!("unsupported element type code {}", code))
    }

    /// The array-file type code of this element type.
    pub fn code(&self) -> i32 {
        (*self).into()
    }

    /// The wire representation used when moving elements of this type.
    pub const fn wire_type(&self) -> WireType {
        match self {
            Self::Byte => WireType::I8,
            Self::Char | Self::String => WireType::Char,
            Self::Short => WireType::I16,
            Self::Int => WireType::I32,
            Self::Float => WireType::F32,
            Self::Double => WireType::F64,
            Self::UByte => WireType::U8,
            Self::UShort => WireType::U16,
            Self::UInt => WireType::U32,
            Self::Int64 => WireType::I64,
            Self::UInt64 => WireType::U64,
        }
    }

    /// The size in bytes of one element.
    pub const fn byte_width(&self) -> usize {
        self.wire_type().byte_width()
    }

    /// Every supported element type, in type-code order.
    pub const ALL: [ElemType; 12] = [
        Self::Byte,
        Self::Char,
        Self::Short,
        Self::Int,
        Self::Float,
        Self::Double,
        Self::UByte,
        Self::UShort,
        Self::UInt,
        Self::Int64,
        Self::UInt64,
        Self::String,
    ];
}

const_assert_eq!(ElemType::Short.byte_width(), size_of::<i16>());
const_assert_eq!(ElemType::Float.byte_width(), size_of::<f32>());
const_assert_eq!(ElemType::Double.byte_width(), size_of::<f64>());
const_assert_eq!(ElemType::UInt64.byte_width(), size_of::<u64>());

impl Display for ElemType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Byte => write!(f, "byte"),
            Self::Char => write!(f, "char"),
            Self::Short => write!(f, "short"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::UByte => write!(f, "ubyte"),
            Self::UShort => write!(f, "ushort"),
            Self::UInt => write!(f, "uint"),
            Self::Int64 => write!(f, "int64"),
            Self::UInt64 => write!(f, "uint64"),
            Self::String => write!(f, "string"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pario_error::ErrorKind;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, ElemType::Byte, 1)]
    #[case(2, ElemType::Char, 1)]
    #[case(3, ElemType::Short, 2)]
    #[case(4, ElemType::Int, 4)]
    #[case(5, ElemType::Float, 4)]
    #[case(6, ElemType::Double, 8)]
    #[case(7, ElemType::UByte, 1)]
    #[case(8, ElemType::UShort, 2)]
    #[case(9, ElemType::UInt, 4)]
    #[case(10, ElemType::Int64, 8)]
    #[case(11, ElemType::UInt64, 8)]
    #[case(12, ElemType::String, 1)]
    fn code_and_width(#[case] code: i32, #[case] elem_type: ElemType, #[case] width: usize) {
        let resolved = ElemType::try_from_code(code).unwrap();
        assert_eq!(resolved, elem_type);
        assert_eq!(resolved.code(), code);
        assert_eq!(resolved.byte_width(), width);
    }

    #[rstest]
    #[case(0)]
    #[case(13)]
    #[case(-1)]
    fn unknown_code(#[case] code: i32) {
        assert_eq!(
            ElemType::try_from_code(code).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn strings_travel_as_chars() {
        assert_eq!(ElemType::String.wire_type(), WireType::Char);
        assert_eq!(ElemType::Char.wire_type(), WireType::Char);
    }

    #[test]
    fn all_is_in_code_order() {
        for (i, elem_type) in ElemType::ALL.iter().enumerate() {
            assert_eq!(elem_type.code(), i32::try_from(i).unwrap() + 1);
        }
    }
}
