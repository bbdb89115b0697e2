/// A 16-bit register with little-endian byte views.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Register(u16);

impl Register {
    pub const fn new(word: u16) -> Self {
        Self(word)
    }

    #[inline(always)]
    pub fn word(&self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub fn low(&self) -> u8 {
        self.0.to_le_bytes()[0]
    }

    #[inline(always)]
    pub fn high(&self) -> u8 {
        self.0.to_le_bytes()[1]
    }

    #[inline(always)]
    pub fn set(&mut self, word: u16) {
        self.0 = word;
    }

    #[inline(always)]
    pub fn set_low(&mut self, byte: u8) {
        self.0 = u16::from_le_bytes([byte, self.high()]);
    }

    #[inline(always)]
    pub fn set_high(&mut self, byte: u8) {
        self.0 = u16::from_le_bytes([self.low(), byte]);
    }

    #[inline(always)]
    pub fn operation<T>(&mut self, value: T, operation: fn (u16, T) -> u16) -> u16 {
        let res = operation(self.word(), value);
        self.set(res);
        res
    }

    #[inline(always)]
    #[inline(always)]
    pub fn operation_low<T>(&mut self, value: T, operation: fn (u8, T) -> u8) -> u8 {
        let res = operation(self.low(), value);
        self.set_low(res);
        res
    }

    #[inline(always)]
    pub fn apply_low<T, U>(&self, value: U, operation: fn (u8, U) -> T) -> T {
        operation(self.low(), value)
    }

    #[inline(always)]
    pub fn operation_high<T>(&mut self, value: T, operation: fn (u8, T) -> u8) -> u8 {
        let res = operation(self.high(), value);
        self.set_high(res);
        res
    }
}

impl std::fmt::Debug for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentType {
    ES = 0b_00,
    CS = 0b_01,
    SS = 0b_10,
    DS = 0b_11,
}

impl SegmentType {
    /// Decodes a 2-bit segment field; higher bits are ignored.
    #[inline]
    pub fn from_bits(value: u8) -> Self {
        match value & 0b_11 {
            0b_00 => SegmentType::ES,
            0b_01 => SegmentType::CS,
            0b_10 => SegmentType::SS,
            _ => SegmentType::DS,
        }
    }
}

pub const AX: u8 = 0b000;
pub const SP: u8 = 0b100;

pub const BYTE_NAMES: [&str; 8] = ["AL", "CL", "DL", "BL", "AH", "CH", "DH", "BH"];
pub const WORD_NAMES: [&str; 8] = ["AX", "CX", "DX", "BX", "SP", "BP", "SI", "DI"];
pub const SEGMENT_NAMES: [&str; 4] = ["ES", "CS", "SS", "DS"];

pub const RESET_CS: u16 = 0xFFFF;

#[derive(Clone, Default)]
pub struct Registers {
    pub ax: Register,
    pub bx: Register,
    pub cx: Register,
    pub dx: Register,
    pub si: Register,
    pub di: Register,
    pub sp: Register,
    pub bp: Register,
    pub cs: Register,
    pub ds: Register,
    pub es: Register,
    pub ss: Register,
    pub pc: Register,
    /// IP of the instruction being executed, prefixes included.
    pub op_pc: u16,
}

impl Registers {
    /// Architectural reset state: CS=FFFF, everything else zero.
    pub fn new() -> Self {
        Self {
            cs: Register::new(RESET_CS),
            ..Self::default()
        }
    }

    #[inline(always)]
    pub fn read_reg_byte(&self, reg: u8) -> u8 {
        match reg & 0b111 {
            0b000 => self.ax.low(),
            0b001 => self.cx.low(),
            0b010 => self.dx.low(),
            0b011 => self.bx.low(),
            0b100 => self.ax.high(),
            0b101 => self.cx.high(),
            0b110 => self.dx.high(),
            _ => self.bx.high(),
        }
    }

    #[inline(always)]
    pub fn write_reg_byte(&mut self, reg: u8, byte: u8) {
        match reg & 0b111 {
            0b000 => self.ax.set_low(byte),
            0b001 => self.cx.set_low(byte),
            0b010 => self.dx.set_low(byte),
            0b011 => self.bx.set_low(byte),
            0b100 => self.ax.set_high(byte),
            0b101 => self.cx.set_high(byte),
            0b110 => self.dx.set_high(byte),
            _ => self.bx.set_high(byte),
        }
    }

    #[inline(always)]
    pub fn ref_reg_word(&mut self, reg: u8) -> &mut Register {
        match reg & 0b111 {
            0b000 => &mut self.ax,
            0b001 => &mut self.cx,
            0b010 => &mut self.dx,
            0b011 => &mut self.bx,
            0b100 => &mut self.sp,
            0b101 => &mut self.bp,
            0b110 => &mut self.si,
            _ => &mut self.di,
        }
    }

    #[inline(always)]
    pub fn read_reg_word(&self, reg: u8) -> u16 {
        match reg & 0b111 {
            0b000 => self.ax.word(),
            0b001 => self.cx.word(),
            0b010 => self.dx.word(),
            0b011 => self.bx.word(),
            0b100 => self.sp.word(),
            0b101 => self.bp.word(),
            0b110 => self.si.word(),
            _ => self.di.word(),
        }
    }

    #[inline(always)]
    pub fn write_reg_word(&mut self, reg: u8, word: u16) {
        self.ref_reg_word(reg).set(word);
    }

    #[inline]
    pub fn segment(&self, segment: SegmentType) -> u16 {
        match segment {
            SegmentType::ES => self.es.word(),
            SegmentType::CS => self.cs.word(),
            SegmentType::SS => self.ss.word(),
            SegmentType::DS => self.ds.word(),
        }
    }

    #[inline]
    pub fn set_segment(&mut self, segment: SegmentType, word: u16) {
        match segment {
            SegmentType::ES => self.es.set(word),
            SegmentType::CS => self.cs.set(word),
            SegmentType::SS => self.ss.set(word),
            SegmentType::DS => self.ds.set(word),
        }
    }
}
