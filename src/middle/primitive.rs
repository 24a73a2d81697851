use strum::{EnumIter, EnumString};

use crate::middle::lir::Literal;

/// The built-in value types. Everything else (classes, interfaces, arrays) is
/// a reference type managed by reference counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    Bool,
    Code,
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
}

impl core::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveKind::Bool => write!(f, "boolean"),
            PrimitiveKind::Code => write!(f, "code"),
            PrimitiveKind::Byte => write!(f, "byte"),
            PrimitiveKind::UByte => write!(f, "ubyte"),
            PrimitiveKind::Short => write!(f, "short"),
            PrimitiveKind::UShort => write!(f, "ushort"),
            PrimitiveKind::Int => write!(f, "int"),
            PrimitiveKind::UInt => write!(f, "uint"),
            PrimitiveKind::Long => write!(f, "long"),
            PrimitiveKind::ULong => write!(f, "ulong"),
            PrimitiveKind::Float => write!(f, "float"),
            PrimitiveKind::Double => write!(f, "double"),
        }
    }
}

impl PrimitiveKind {
    pub fn is_integral(&self) -> bool {
        match self {
            PrimitiveKind::Byte
            | PrimitiveKind::UByte
            | PrimitiveKind::Short
            | PrimitiveKind::UShort
            | PrimitiveKind::Int
            | PrimitiveKind::UInt
            | PrimitiveKind::Long
            | PrimitiveKind::ULong => true,
            PrimitiveKind::Bool
            | PrimitiveKind::Code
            | PrimitiveKind::Float
            | PrimitiveKind::Double => false,
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    /// Width in bits, used to decide whether a numeric conversion widens
    pub fn width(&self) -> u32 {
        match self {
            PrimitiveKind::Bool => 1,
            PrimitiveKind::Byte | PrimitiveKind::UByte => 8,
            PrimitiveKind::Short | PrimitiveKind::UShort => 16,
            PrimitiveKind::Code
            | PrimitiveKind::Int
            | PrimitiveKind::UInt
            | PrimitiveKind::Float => 32,
            PrimitiveKind::Long | PrimitiveKind::ULong | PrimitiveKind::Double => 64,
        }
    }

    /// Whether a value of this kind converts to `target` without loss. These
    /// are the implicit conversions the type checker accepts for arguments,
    /// returns and assignments.
    pub fn widens_to(&self, target: Self) -> bool {
        if *self == target {
            return true;
        }

        match (self.is_integral(), target.is_integral()) {
            (true, true) => {
                let signed = |kind: &PrimitiveKind| {
                    matches!(
                        kind,
                        PrimitiveKind::Byte
                            | PrimitiveKind::Short
                            | PrimitiveKind::Int
                            | PrimitiveKind::Long
                    )
                };

                // an unsigned value fits in any strictly wider signed type, but
                // a signed one never fits in an unsigned type
                !(signed(self) && !signed(&target)) && self.width() < target.width()
            }
            (true, false) => target.is_floating(),
            (false, _) => *self == PrimitiveKind::Float && target == PrimitiveKind::Double,
        }
    }

    /// The value a variable of this kind holds before anything is stored
    pub fn default_literal(&self) -> Literal {
        match self {
            PrimitiveKind::Bool => Literal::Bool(false),
            PrimitiveKind::Code => Literal::Code('\0'),
            PrimitiveKind::Float | PrimitiveKind::Double => Literal::Float(0.0),
            PrimitiveKind::Byte
            | PrimitiveKind::Short
            | PrimitiveKind::Int
            | PrimitiveKind::Long => Literal::Int(0),
            PrimitiveKind::UByte
            | PrimitiveKind::UShort
            | PrimitiveKind::UInt
            | PrimitiveKind::ULong => Literal::UInt(0),
        }
    }
}
