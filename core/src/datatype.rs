//! The small set of data types shared between the AST and the VM. This is
//! the "5%" of the system (per spec) that both pipelines depend on.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A scalar or aggregate data type. Matches the VM's `DataType` enumeration
/// (`BOOL`, `BYTE`, ... `MATRIX_SBYTE`) one-to-one, plus `VOID` for
/// subroutines/statements that produce no value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Byte,
    SByte,
    Word,
    SWord,
    Float,
    ArrayByte,
    ArraySByte,
    ArrayWord,
    ArraySWord,
    MatrixByte,
    MatrixSByte,
}

impl DataType {
    /// Is this a numeric scalar (i.e. valid inside a `[...]` dereference or
    /// as an arithmetic operand)?
    pub fn is_numeric_scalar(self) -> bool {
        matches!(
            self,
            DataType::Byte
                | DataType::SByte
                | DataType::Word
                | DataType::SWord
                | DataType::Float
        )
    }

    /// Is this an array type (one dimension)?
    pub fn is_array(self) -> bool {
        matches!(
            self,
            DataType::ArrayByte
                | DataType::ArraySByte
                | DataType::ArrayWord
                | DataType::ArraySWord
        )
    }

    /// Is this a matrix type (two dimensions, optional interleave)?
    pub fn is_matrix(self) -> bool {
        matches!(self, DataType::MatrixByte | DataType::MatrixSByte)
    }

    /// The size, in bytes, of one element of this type. Resolves the open
    /// question in spec.md about `Dereference.size`: this is always a
    /// scalar element size, never a dimensions list.
    pub fn element_size_bytes(self) -> usize {
        match self {
            DataType::Bool | DataType::Byte | DataType::SByte => 1,
            DataType::Word | DataType::SWord => 2,
            DataType::Float => 5, // 5-byte MFLPT
            DataType::ArrayByte | DataType::ArraySByte => 1,
            DataType::ArrayWord | DataType::ArraySWord => 2,
            DataType::MatrixByte | DataType::MatrixSByte => 1,
        }
    }

    /// Is this a signed integer type?
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::SByte
                | DataType::SWord
                | DataType::ArraySByte
                | DataType::ArraySWord
                | DataType::MatrixSByte
        )
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Byte => "byte",
            DataType::SByte => "sbyte",
            DataType::Word => "word",
            DataType::SWord => "sword",
            DataType::Float => "float",
            DataType::ArrayByte => "byte[]",
            DataType::ArraySByte => "sbyte[]",
            DataType::ArrayWord => "word[]",
            DataType::ArraySWord => "sword[]",
            DataType::MatrixByte => "byte[][]",
            DataType::MatrixSByte => "sbyte[][]",
        };
        write!(f, "{}", name)
    }
}

/// The three kinds of variable declaration (`VarDef.vartype` in spec.md).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Const,
    Var,
    Memory,
}

/// The register alphabet (spec.md §6): single-byte registers, word-pair
/// registers, and pseudo registers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterName {
    A,
    X,
    Y,
    /// Status bit pseudo-registers (carry, zero, etc), named by letter.
    Status(char),
    /// Word-pair registers.
    AX,
    AY,
    XY,
    /// Scratch pseudo register, used by generated code.
    SC,
}

impl RegisterName {
    /// Byte registers and word registers are distinguished sets that
    /// determine a Register node's data type.
    pub fn datatype(self) -> DataType {
        match self {
            RegisterName::A
            | RegisterName::X
            | RegisterName::Y
            | RegisterName::Status(_)
            | RegisterName::SC => DataType::Byte,
            RegisterName::AX | RegisterName::AY | RegisterName::XY => {
                DataType::Word
            }
        }
    }
}

impl Display for RegisterName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegisterName::A => write!(f, "A"),
            RegisterName::X => write!(f, "X"),
            RegisterName::Y => write!(f, "Y"),
            RegisterName::Status(c) => write!(f, "{}", c),
            RegisterName::AX => write!(f, "AX"),
            RegisterName::AY => write!(f, "AY"),
            RegisterName::XY => write!(f, "XY"),
            RegisterName::SC => write!(f, "SC"),
        }
    }
}
