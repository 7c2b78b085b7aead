//! Agent bytecode opcodes
//!
//! Every opcode carries a fixed description: how many operand bytes follow
//! it in the buffer, the width of the value it references, and its stack
//! effect. The static analyzer reads nothing but this table.

use serde::{Deserialize, Serialize};

/// Static description of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    /// Mnemonic used in disassembly and log output
    pub name: &'static str,
    /// Operand bytes following the opcode byte
    pub op_size: usize,
    /// Width in bits of the value the op fetches or pushes (0 if none)
    pub data_size: u32,
    /// Stack entries popped
    pub consumed: i32,
    /// Stack entries pushed
    pub produced: i32,
}

macro_rules! define_ops {
    ($( $variant:ident = $code:literal, $name:literal, $op_size:literal, $data:literal, $pops:literal, $pushes:literal; )*) => {
        /// Agent bytecode operation
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Op {
            $( $variant = $code, )*
        }

        impl Op {
            /// Decode an opcode byte, `None` for bytes outside the table
            pub fn from_byte(byte: u8) -> Option<Op> {
                match byte {
                    $( $code => Some(Op::$variant), )*
                    _ => None,
                }
            }

            /// Table entry for this opcode
            pub fn info(self) -> OpInfo {
                match self {
                    $( Op::$variant => OpInfo {
                        name: $name,
                        op_size: $op_size,
                        data_size: $data,
                        consumed: $pops,
                        produced: $pushes,
                    }, )*
                }
            }
        }
    };
}

define_ops! {
    Float = 0x01, "float", 0, 0, 0, 0;
    Add = 0x02, "add", 0, 0, 2, 1;
    Sub = 0x03, "sub", 0, 0, 2, 1;
    Mul = 0x04, "mul", 0, 0, 2, 1;
    DivSigned = 0x05, "div_signed", 0, 0, 2, 1;
    DivUnsigned = 0x06, "div_unsigned", 0, 0, 2, 1;
    RemSigned = 0x07, "rem_signed", 0, 0, 2, 1;
    RemUnsigned = 0x08, "rem_unsigned", 0, 0, 2, 1;
    Lsh = 0x09, "lsh", 0, 0, 2, 1;
    RshSigned = 0x0a, "rsh_signed", 0, 0, 2, 1;
    RshUnsigned = 0x0b, "rsh_unsigned", 0, 0, 2, 1;
    Trace = 0x0c, "trace", 0, 0, 2, 0;
    TraceQuick = 0x0d, "trace_quick", 1, 0, 1, 1;
    LogNot = 0x0e, "log_not", 0, 0, 1, 1;
    BitAnd = 0x0f, "bit_and", 0, 0, 2, 1;
    BitOr = 0x10, "bit_or", 0, 0, 2, 1;
    BitXor = 0x11, "bit_xor", 0, 0, 2, 1;
    BitNot = 0x12, "bit_not", 0, 0, 1, 1;
    Equal = 0x13, "equal", 0, 0, 2, 1;
    LessSigned = 0x14, "less_signed", 0, 0, 2, 1;
    LessUnsigned = 0x15, "less_unsigned", 0, 0, 2, 1;
    Ext = 0x16, "ext", 1, 0, 1, 1;
    Ref8 = 0x17, "ref8", 0, 8, 1, 1;
    Ref16 = 0x18, "ref16", 0, 16, 1, 1;
    Ref32 = 0x19, "ref32", 0, 32, 1, 1;
    Ref64 = 0x1a, "ref64", 0, 64, 1, 1;
    RefFloat = 0x1b, "ref_float", 0, 0, 1, 1;
    RefDouble = 0x1c, "ref_double", 0, 0, 1, 1;
    RefLongDouble = 0x1d, "ref_long_double", 0, 0, 1, 1;
    LToD = 0x1e, "l_to_d", 0, 0, 1, 1;
    DToL = 0x1f, "d_to_l", 0, 0, 1, 1;
    IfGoto = 0x20, "if_goto", 2, 0, 1, 0;
    Goto = 0x21, "goto", 2, 0, 0, 0;
    Const8 = 0x22, "const8", 1, 8, 0, 1;
    Const16 = 0x23, "const16", 2, 16, 0, 1;
    Const32 = 0x24, "const32", 4, 32, 0, 1;
    Const64 = 0x25, "const64", 8, 64, 0, 1;
    Reg = 0x26, "reg", 2, 0, 0, 1;
    End = 0x27, "end", 0, 0, 0, 0;
    Dup = 0x28, "dup", 0, 0, 1, 2;
    Pop = 0x29, "pop", 0, 0, 1, 0;
    ZeroExt = 0x2a, "zero_ext", 1, 0, 1, 1;
    Swap = 0x2b, "swap", 0, 0, 2, 2;
    Getv = 0x2c, "getv", 2, 0, 0, 1;
    Setv = 0x2d, "setv", 2, 0, 1, 1;
    Tracev = 0x2e, "tracev", 2, 0, 0, 0;
    Tracenz = 0x2f, "tracenz", 0, 0, 2, 0;
    Trace16 = 0x30, "trace16", 2, 0, 1, 1;
    Pick = 0x32, "pick", 1, 0, 0, 1;
    Rot = 0x33, "rot", 0, 0, 3, 3;
    Printf = 0x34, "printf", 0, 0, 0, 0;
}

impl Op {
    /// Whether the op transfers control to a 2-byte big-endian target
    pub fn is_jump(self) -> bool {
        matches!(self, Op::IfGoto | Op::Goto)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.info().name)
    }
}
