//! The stable opcode table.
//!
//! Opcode numbering is part of the `.nxb` wire contract: values are never
//! reused or renumbered. `0x80..=0x8F` is reserved for AI-native intrinsic
//! operations and `0x90..=0xBF` for future tensor/neural operations; a
//! reader that meets an opcode outside the table fails closed.
//!
//! Operand widths are fixed per opcode (see [`Opcode::operand_width`]):
//!
//! | opcode | operands |
//! |---|---|
//! | `LOAD_CONST` | u16 constant-pool id |
//! | `LOAD_TRUE` / `LOAD_FALSE` | — |
//! | `LOAD_SYM` | u16 symbol id |
//! | `STORE` | u16 symbol id |
//! | `STORE_NEW` | u16 symbol id, u8 const flag |
//! | `POP` / `DUP` | — |
//! | `MAKE_ARRAY` / `MAKE_MAPPING` | u16 element/entry count |
//! | `MAKE_RANGE` | — |
//! | `GET_INDEX` / `SET_INDEX` | — |
//! | `GET_MEMBER` / `SET_MEMBER` | u16 name symbol id |
//! | `CALL` | u8 positional count, u8 named count |
//! | `MAKE_CLOSURE` | u16 function id |
//! | `RETURN` | — |
//! | `JUMP` / `JUMP_IF_FALSE` / `JUMP_IF_TRUE` | i16 relative offset |
//! | `ITER_NEW` / `ITER_DROP` | — |
//! | `ITER_NEXT` | u16 bound symbol id, i16 exhausted-jump offset |
//! | `OP_*` / `UOP_*` | — |
//! | `CALL_INTRINSIC` | u8 intrinsic id, u8 argument count |
//! | `SET_TRAIT` | u16 name symbol id, u16 constant id |
//!
//! Relative jump offsets are measured from the end of the instruction.
//! Named call arguments sit on the stack as (name-string, value) pairs after
//! the positional arguments.

/// One bytecode operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Opcode {
    LoadConst = 0x01,
    LoadSym = 0x02,
    Store = 0x03,
    StoreNew = 0x04,
    Pop = 0x05,
    MakeArray = 0x06,
    MakeMapping = 0x07,
    GetIndex = 0x08,
    SetIndex = 0x09,
    GetMember = 0x0A,
    SetMember = 0x0B,
    MakeRange = 0x0C,
    LoadTrue = 0x0D,
    LoadFalse = 0x0E,
    Dup = 0x0F,

    Call = 0x10,
    MakeClosure = 0x11,
    Return = 0x12,

    Jump = 0x20,
    JumpIfFalse = 0x21,
    JumpIfTrue = 0x22,

    IterNew = 0x30,
    IterNext = 0x31,
    IterDrop = 0x32,

    OpAdd = 0x40,
    OpSub = 0x41,
    OpMul = 0x42,
    OpDiv = 0x43,
    OpMod = 0x44,
    OpEq = 0x45,
    OpNeq = 0x46,
    OpLt = 0x47,
    OpLeq = 0x48,
    OpGt = 0x49,
    OpGeq = 0x4A,

    UopNeg = 0x50,
    UopNot = 0x51,

    // 0x80..=0x8F: AI-native intrinsic range.
    CallIntrinsic = 0x80,
    SetTrait = 0x81,
}

impl Opcode {
    /// Total operand bytes following the opcode byte.
    #[must_use]
    pub fn operand_width(self) -> usize {
        match self {
            Self::Pop
            | Self::Dup
            | Self::GetIndex
            | Self::SetIndex
            | Self::MakeRange
            | Self::LoadTrue
            | Self::LoadFalse
            | Self::Return
            | Self::IterNew
            | Self::IterDrop
            | Self::OpAdd
            | Self::OpSub
            | Self::OpMul
            | Self::OpDiv
            | Self::OpMod
            | Self::OpEq
            | Self::OpNeq
            | Self::OpLt
            | Self::OpLeq
            | Self::OpGt
            | Self::OpGeq
            | Self::UopNeg
            | Self::UopNot => 0,
            Self::LoadConst
            | Self::LoadSym
            | Self::Store
            | Self::MakeArray
            | Self::MakeMapping
            | Self::GetMember
            | Self::SetMember
            | Self::MakeClosure
            | Self::Jump
            | Self::JumpIfFalse
            | Self::JumpIfTrue
            | Self::Call
            | Self::CallIntrinsic => 2,
            Self::StoreNew => 3,
            Self::IterNext | Self::SetTrait => 4,
        }
    }
}
