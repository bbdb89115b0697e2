use std::fmt::{Display, Formatter};

use crate::vm::registers::{SegmentType, BYTE_NAMES, SEGMENT_NAMES, WORD_NAMES};

const WORD_MASK: u8 = 0b_00_00_00_01;
const DIRECTION_MASK: u8 = 0b_00_00_00_10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    #[inline(always)]
    fn of(opcode: u8) -> Self {
        if opcode & WORD_MASK != 0 { Width::Word } else { Width::Byte }
    }

    fn suffix(self) -> char {
        match self {
            Width::Byte => 'B',
            Width::Word => 'W',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    /// Bits 5-3 of an opcode in 00-3F or the reg field of group 80-83.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b_111 {
            0b_000 => AluOp::Add,
            0b_001 => AluOp::Or,
            0b_010 => AluOp::Adc,
            0b_011 => AluOp::Sbb,
            0b_100 => AluOp::And,
            0b_101 => AluOp::Sub,
            0b_110 => AluOp::Xor,
            _ => AluOp::Cmp,
        }
    }

    #[inline]
    pub fn is_logical(self) -> bool {
        matches!(self, AluOp::Or | AluOp::And | AluOp::Xor)
    }

    fn name(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Or => "OR",
            AluOp::Adc => "ADC",
            AluOp::Sbb => "SBB",
            AluOp::And => "AND",
            AluOp::Sub => "SUB",
            AluOp::Xor => "XOR",
            AluOp::Cmp => "CMP",
        }
    }
}

/// Flag test of a 70-7F jump; the low opcode bit negates it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Overflow,
    Below,
    Zero,
    BelowOrEqual,
    Sign,
    Parity,
    Less,
    LessOrEqual,
}

impl Condition {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b_111 {
            0b_000 => Condition::Overflow,
            0b_001 => Condition::Below,
            0b_010 => Condition::Zero,
            0b_011 => Condition::BelowOrEqual,
            0b_100 => Condition::Sign,
            0b_101 => Condition::Parity,
            0b_110 => Condition::Less,
            _ => Condition::LessOrEqual,
        }
    }

    fn name(self, negate: bool) -> &'static str {
        match (self, negate) {
            (Condition::Overflow, false) => "JO",
            (Condition::Overflow, true) => "JNO",
            (Condition::Below, false) => "JB",
            (Condition::Below, true) => "JNB",
            (Condition::Zero, false) => "JZ",
            (Condition::Zero, true) => "JNZ",
            (Condition::BelowOrEqual, false) => "JBE",
            (Condition::BelowOrEqual, true) => "JA",
            (Condition::Sign, false) => "JS",
            (Condition::Sign, true) => "JNS",
            (Condition::Parity, false) => "JP",
            (Condition::Parity, true) => "JNP",
            (Condition::Less, false) => "JL",
            (Condition::Less, true) => "JGE",
            (Condition::LessOrEqual, false) => "JLE",
            (Condition::LessOrEqual, true) => "JG",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringOp {
    Movs,
    Cmps,
    Stos,
    Lods,
    Scas,
}

impl StringOp {
    fn name(self) -> &'static str {
        match self {
            StringOp::Movs => "MOVS",
            StringOp::Cmps => "CMPS",
            StringOp::Stos => "STOS",
            StringOp::Lods => "LODS",
            StringOp::Scas => "SCAS",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopKind {
    WhileNotZero,
    WhileZero,
    Always,
}

/// An 8086 opcode byte, decoded to its operation. Operands still sit in the
/// instruction stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    // Prefixes
    SegmentOverride(SegmentType),
    Rep { zero: bool },
    Lock,

    // Arithmetic and logic
    AluRm { op: AluOp, width: Width, to_reg: bool },
    AluAccImm { op: AluOp, width: Width },
    AluGroup { width: Width, sign_extend: bool },
    TestRm { width: Width },
    TestAccImm { width: Width },
    IncReg(u8),
    DecReg(u8),
    Group3 { width: Width },
    Group4,
    Group5,
    Daa,
    Das,
    Aaa,
    Aas,
    Aam,
    Aad,
    Cbw,
    Cwd,
    Shift { width: Width, by_cl: bool },

    // Data movement
    MovRm { width: Width, to_reg: bool },
    MovFromSeg,
    MovToSeg,
    MovRegImm { width: Width, reg: u8 },
    MovRmImm { width: Width },
    MovAccMem { width: Width, to_acc: bool },
    XchgRm { width: Width },
    XchgAcc(u8),
    Lea,
    Les,
    Lds,
    Lahf,
    Sahf,
    Xlat,
    In { width: Width, from_dx: bool },
    Out { width: Width, to_dx: bool },

    // Stack
    PushReg(u8),
    PopReg(u8),
    PushSeg(SegmentType),
    PopSeg(SegmentType),
    PopRm,
    Pushf,
    Popf,

    // Control transfer
    Jcc { condition: Condition, negate: bool },
    Loop(LoopKind),
    Jcxz,
    JmpShort,
    JmpNear,
    JmpFar,
    CallNear,
    CallFar,
    Ret { far: bool, pop: bool },
    Int3,
    Int,
    Into,
    Iret,

    // Strings
    String { op: StringOp, width: Width },

    // Flag control
    Clc,
    Stc,
    Cmc,
    Cli,
    Sti,
    Cld,
    Std,

    // Processor control
    Wait,
    Esc,
    Hlt,
}

impl Instruction {
    /// `None` for bytes with no 8086 meaning.
    pub fn decode(opcode: u8) -> Option<Instruction> {
        use Instruction::*;

        let width = Width::of(opcode);
        let directional = opcode & DIRECTION_MASK != 0;

        Some(match opcode {
            // Segment prefixes: 26, 2E, 36, 3E
            0b_0010_0110 | 0b_0010_1110 | 0b_0011_0110 | 0b_0011_1110 => {
                SegmentOverride(SegmentType::from_bits(opcode >> 3))
            }
            // DAA, DAS, AAA, AAS
            0x27 => Daa,
            0x2F => Das,
            0x37 => Aaa,
            0x3F => Aas,
            // PUSH sreg: 06, 0E, 16, 1E
            0b_0000_0110 | 0b_0000_1110 | 0b_0001_0110 | 0b_0001_1110 => {
                PushSeg(SegmentType::from_bits(opcode >> 3))
            }
            // POP sreg: 07, 17, 1F; 0F is not POP CS here
            0b_0000_0111 | 0b_0001_0111 | 0b_0001_1111 => {
                PopSeg(SegmentType::from_bits(opcode >> 3))
            }
            0x00..=0x3F => match opcode & 0b_111 {
                0b_000..=0b_011 => AluRm {
                    op: AluOp::from_bits(opcode >> 3),
                    width,
                    to_reg: directional,
                },
                0b_100 | 0b_101 => AluAccImm { op: AluOp::from_bits(opcode >> 3), width },
                _ => return None,
            },
            0x40..=0x47 => IncReg(opcode & 0b_111),
            0x48..=0x4F => DecReg(opcode & 0b_111),
            0x50..=0x57 => PushReg(opcode & 0b_111),
            0x58..=0x5F => PopReg(opcode & 0b_111),
            0x70..=0x7F => Jcc {
                condition: Condition::from_bits(opcode >> 1),
                negate: opcode & 1 != 0,
            },
            // 82 is the byte form again
            0x80..=0x83 => AluGroup {
                width,
                sign_extend: opcode == 0x83,
            },
            0x84 | 0x85 => TestRm { width },
            0x86 | 0x87 => XchgRm { width },
            0x88..=0x8B => MovRm { width, to_reg: directional },
            0x8C => MovFromSeg,
            0x8D => Lea,
            0x8E => MovToSeg,
            0x8F => PopRm,
            0x90..=0x97 => XchgAcc(opcode & 0b_111),
            0x98 => Cbw,
            0x99 => Cwd,
            0x9A => CallFar,
            0x9B => Wait,
            0x9C => Pushf,
            0x9D => Popf,
            0x9E => Sahf,
            0x9F => Lahf,
            0xA0..=0xA3 => MovAccMem { width, to_acc: !directional },
            0xA4 | 0xA5 => String { op: StringOp::Movs, width },
            0xA6 | 0xA7 => String { op: StringOp::Cmps, width },
            0xA8 | 0xA9 => TestAccImm { width },
            0xAA | 0xAB => String { op: StringOp::Stos, width },
            0xAC | 0xAD => String { op: StringOp::Lods, width },
            0xAE | 0xAF => String { op: StringOp::Scas, width },
            0xB0..=0xB7 => MovRegImm { width: Width::Byte, reg: opcode & 0b_111 },
            0xB8..=0xBF => MovRegImm { width: Width::Word, reg: opcode & 0b_111 },
            0xC2 => Ret { far: false, pop: true },
            0xC3 => Ret { far: false, pop: false },
            0xC4 => Les,
            0xC5 => Lds,
            0xC6 | 0xC7 => MovRmImm { width },
            0xCA => Ret { far: true, pop: true },
            0xCB => Ret { far: true, pop: false },
            0xCC => Int3,
            0xCD => Int,
            0xCE => Into,
            0xCF => Iret,
            0xD0..=0xD3 => Shift { width, by_cl: directional },
            0xD4 => Aam,
            0xD5 => Aad,
            0xD7 => Xlat,
            0xD8..=0xDF => Esc,
            0xE0 => Loop(LoopKind::WhileNotZero),
            0xE1 => Loop(LoopKind::WhileZero),
            0xE2 => Loop(LoopKind::Always),
            0xE3 => Jcxz,
            0xE4 | 0xE5 => In { width, from_dx: false },
            0xE6 | 0xE7 => Out { width, to_dx: false },
            0xE8 => CallNear,
            0xE9 => JmpNear,
            0xEA => JmpFar,
            0xEB => JmpShort,
            0xEC | 0xED => In { width, from_dx: true },
            0xEE | 0xEF => Out { width, to_dx: true },
            0xF0 => Lock,
            0xF2 => Rep { zero: false },
            0xF3 => Rep { zero: true },
            0xF4 => Hlt,
            0xF5 => Cmc,
            0xF6 | 0xF7 => Group3 { width },
            0xF8 => Clc,
            0xF9 => Stc,
            0xFA => Cli,
            0xFB => Sti,
            0xFC => Cld,
            0xFD => Std,
            0xFE => Group4,
            0xFF => Group5,
            // 0F, 60-6F, C0, C1, C8, C9, D6, F1
            _ => return None,
        })
    }

    #[inline]
    pub fn is_prefix(&self) -> bool {
        matches!(
            self,
            Instruction::SegmentOverride(_) | Instruction::Rep { .. } | Instruction::Lock
        )
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Instruction::*;
        match *self {
            SegmentOverride(segment) => write!(f, "{}:", SEGMENT_NAMES[segment as usize]),
            Rep { zero: true } => write!(f, "REPZ"),
            Rep { zero: false } => write!(f, "REPNZ"),
            Lock => write!(f, "LOCK"),
            AluRm { op, .. } | AluAccImm { op, .. } => write!(f, "{}", op.name()),
            AluGroup { .. } => write!(f, "GRP1"),
            TestRm { .. } | TestAccImm { .. } => write!(f, "TEST"),
            IncReg(reg) => write!(f, "INC {}", WORD_NAMES[reg as usize]),
            DecReg(reg) => write!(f, "DEC {}", WORD_NAMES[reg as usize]),
            Group3 { .. } => write!(f, "GRP3"),
            Group4 => write!(f, "GRP4"),
            Group5 => write!(f, "GRP5"),
            Daa => write!(f, "DAA"),
            Das => write!(f, "DAS"),
            Aaa => write!(f, "AAA"),
            Aas => write!(f, "AAS"),
            Aam => write!(f, "AAM"),
            Aad => write!(f, "AAD"),
            Cbw => write!(f, "CBW"),
            Cwd => write!(f, "CWD"),
            Shift { .. } => write!(f, "GRP2"),
            MovRm { .. } | MovFromSeg | MovToSeg | MovRmImm { .. } | MovAccMem { .. } => {
                write!(f, "MOV")
            }
            MovRegImm { width: Width::Byte, reg } => write!(f, "MOV {}", BYTE_NAMES[reg as usize]),
            MovRegImm { width: Width::Word, reg } => write!(f, "MOV {}", WORD_NAMES[reg as usize]),
            XchgAcc(0) => write!(f, "NOP"),
            XchgAcc(reg) => write!(f, "XCHG AX,{}", WORD_NAMES[reg as usize]),
            XchgRm { .. } => write!(f, "XCHG"),
            Lea => write!(f, "LEA"),
            Les => write!(f, "LES"),
            Lds => write!(f, "LDS"),
            Lahf => write!(f, "LAHF"),
            Sahf => write!(f, "SAHF"),
            Xlat => write!(f, "XLAT"),
            In { .. } => write!(f, "IN"),
            Out { .. } => write!(f, "OUT"),
            PushReg(reg) => write!(f, "PUSH {}", WORD_NAMES[reg as usize]),
            PopReg(reg) => write!(f, "POP {}", WORD_NAMES[reg as usize]),
            PushSeg(segment) => write!(f, "PUSH {}", SEGMENT_NAMES[segment as usize]),
            PopSeg(segment) => write!(f, "POP {}", SEGMENT_NAMES[segment as usize]),
            PopRm => write!(f, "POP"),
            Pushf => write!(f, "PUSHF"),
            Popf => write!(f, "POPF"),
            Jcc { condition, negate } => write!(f, "{}", condition.name(negate)),
            Loop(LoopKind::WhileNotZero) => write!(f, "LOOPNZ"),
            Loop(LoopKind::WhileZero) => write!(f, "LOOPZ"),
            Loop(LoopKind::Always) => write!(f, "LOOP"),
            Jcxz => write!(f, "JCXZ"),
            JmpShort | JmpNear | JmpFar => write!(f, "JMP"),
            CallNear | CallFar => write!(f, "CALL"),
            Ret { far: false, .. } => write!(f, "RET"),
            Ret { far: true, .. } => write!(f, "RETF"),
            Int3 => write!(f, "INT3"),
            Int => write!(f, "INT"),
            Into => write!(f, "INTO"),
            Iret => write!(f, "IRET"),
            String { op, width } => write!(f, "{}{}", op.name(), width.suffix()),
            Clc => write!(f, "CLC"),
            Stc => write!(f, "STC"),
            Cmc => write!(f, "CMC"),
            Cli => write!(f, "CLI"),
            Sti => write!(f, "STI"),
            Cld => write!(f, "CLD"),
            Std => write!(f, "STD"),
            Wait => write!(f, "WAIT"),
            Esc => write!(f, "ESC"),
            Hlt => write!(f, "HLT"),
        }
    }
}
