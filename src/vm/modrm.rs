use crate::utils::number::{extend_sign, SpecialOps};
use crate::vm::cpu::Cpu;
use crate::vm::error::Result;
use crate::vm::registers::{Registers, SegmentType};

const MODE_DIRECT: u8 = 0b_00;
const MODE_DISP8: u8 = 0b_01;
const MODE_DISP16: u8 = 0b_10;
const MODE_REGISTER: u8 = 0b_11;
const RM_BP: u8 = 0b_110;

/// The three fields of a ModR/M byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModRm {
    pub mode: u8,
    pub reg: u8,
    pub rm: u8,
}

impl ModRm {
    #[inline(always)]
    pub fn new(byte: u8) -> Self {
        Self {
            mode: (byte >> 6) & 0b_11,
            reg: (byte >> 3) & 0b_111,
            rm: byte & 0b_111,
        }
    }

    #[inline(always)]
    pub fn is_register(&self) -> bool {
        self.mode == MODE_REGISTER
    }

    #[inline]
    pub fn is_direct(&self) -> bool {
        self.mode == MODE_DIRECT && self.rm == RM_BP
    }

    /// Number of displacement bytes that follow the ModR/M byte.
    #[inline]
    pub fn displacement_len(&self) -> u16 {
        match self.mode {
            MODE_DIRECT if self.rm == RM_BP => 2,
            MODE_DISP8 => 1,
            MODE_DISP16 => 2,
            _ => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(u8),
    Memory { segment: SegmentType, offset: u16 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub modrm: ModRm,
    pub operand: Operand,
    /// Displacement bytes taken from the stream.
    pub consumed: u16,
}

#[inline(always)]
pub fn base_offset(registers: &Registers, rm: u8) -> u16 {
    let bx = registers.bx.word();
    let bp = registers.bp.word();
    let si = registers.si.word();
    let di = registers.di.word();
    match rm & 0b_111 {
        0b000 => bx.wrapping_add(si),
        0b001 => bx.wrapping_add(di),
        0b010 => bp.wrapping_add(si),
        0b011 => bp.wrapping_add(di),
        0b100 => si,
        0b101 => di,
        0b110 => bp,
        _ => bx,
    }
}

/// BP-based forms address the stack segment; everything else, including
/// the direct form, addresses DS.
#[inline]
pub fn default_segment(modrm: &ModRm) -> SegmentType {
    match modrm.rm {
        0b010 | 0b011 => SegmentType::SS,
        RM_BP if !modrm.is_direct() => SegmentType::SS,
        _ => SegmentType::DS,
    }
}

/// Resolves a ModR/M byte against the two stream bytes that follow it.
pub fn decode(
    byte: u8,
    stream: [u8; 2],
    registers: &Registers,
    segment_override: Option<SegmentType>,
) -> Decoded {
    let modrm = ModRm::new(byte);
    let consumed = modrm.displacement_len();

    if modrm.is_register() {
        return Decoded { modrm, operand: Operand::Register(modrm.rm), consumed };
    }

    let offset = match modrm.mode {
        MODE_DIRECT if modrm.is_direct() => u16::from_le_bytes(stream),
        MODE_DIRECT => base_offset(registers, modrm.rm),
        MODE_DISP8 => base_offset(registers, modrm.rm).wrapping_add(extend_sign(stream[0])),
        _ => base_offset(registers, modrm.rm).wrapping_add(u16::from_le_bytes(stream)),
    };
    let segment = segment_override.unwrap_or_else(|| default_segment(&modrm));

    Decoded {
        modrm,
        operand: Operand::Memory { segment, offset },
        consumed,
    }
}

/// Operand access shared by the byte and word forms of an instruction.
pub trait ModRM: SpecialOps {
    fn read_reg(registers: &Registers, reg: u8) -> Self;
    fn write_reg(registers: &mut Registers, reg: u8, value: Self);
    fn read_mem(cpu: &Cpu, segment: SegmentType, offset: u16) -> Result<Self>;
    fn write_mem(cpu: &mut Cpu, segment: SegmentType, offset: u16, value: Self) -> Result<()>;
    fn fetch(cpu: &mut Cpu) -> Result<Self>;

    #[inline]
    fn read(cpu: &Cpu, operand: &Operand) -> Result<Self> {
        match *operand {
            Operand::Register(reg) => Ok(Self::read_reg(&cpu.registers, reg)),
            Operand::Memory { segment, offset } => Self::read_mem(cpu, segment, offset),
        }
    }

    #[inline]
    fn write(cpu: &mut Cpu, operand: &Operand, value: Self) -> Result<()> {
        match *operand {
            Operand::Register(reg) => {
                Self::write_reg(&mut cpu.registers, reg, value);
                Ok(())
            }
            Operand::Memory { segment, offset } => Self::write_mem(cpu, segment, offset, value),
        }
    }
}

impl ModRM for u8 {
    #[inline(always)]
    fn read_reg(registers: &Registers, reg: u8) -> u8 {
        registers.read_reg_byte(reg)
    }

    #[inline(always)]
    fn write_reg(registers: &mut Registers, reg: u8, value: u8) {
        registers.write_reg_byte(reg, value);
    }

    #[inline(always)]
    fn read_mem(cpu: &Cpu, segment: SegmentType, offset: u16) -> Result<u8> {
        cpu.read_byte(segment, offset)
    }

    #[inline(always)]
    fn write_mem(cpu: &mut Cpu, segment: SegmentType, offset: u16, value: u8) -> Result<()> {
        cpu.write_byte(segment, offset, value)
    }

    #[inline(always)]
    fn fetch(cpu: &mut Cpu) -> Result<u8> {
        cpu.fetch_byte()
    }
}

impl ModRM for u16 {
    #[inline(always)]
    fn read_reg(registers: &Registers, reg: u8) -> u16 {
        registers.read_reg_word(reg)
    }

    #[inline(always)]
    fn write_reg(registers: &mut Registers, reg: u8, value: u16) {
        registers.write_reg_word(reg, value);
    }

    #[inline(always)]
    fn read_mem(cpu: &Cpu, segment: SegmentType, offset: u16) -> Result<u16> {
        cpu.read_word(segment, offset)
    }

    #[inline(always)]
    fn write_mem(cpu: &mut Cpu, segment: SegmentType, offset: u16, value: u16) -> Result<()> {
        cpu.write_word(segment, offset, value)
    }

    #[inline(always)]
    fn fetch(cpu: &mut Cpu) -> Result<u16> {
        cpu.fetch_word()
    }
}
