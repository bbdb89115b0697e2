use crate::vm::error::Result;
use crate::vm::flags::{CpuFlag, Flags};
use crate::vm::memory::{translate, Memory, IVT_BASE};
use crate::vm::registers::{Registers, SegmentType};

pub struct Cpu {
    pub registers: Registers,
    pub memory: Memory,
    pub flags: Flags,
    pub halted: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            registers: Registers::new(),
            memory: Memory::new(),
            flags: Flags::default(),
            halted: false,
        }
    }

    /// Puts registers and flags back to their power-on values. Memory is kept.
    pub fn reset(&mut self) {
        self.registers = Registers::new();
        self.flags = Flags::default();
        self.halted = false;
    }

    #[inline]
    pub fn fetch_byte(&mut self) -> Result<u8> {
        let res = self.read_byte(SegmentType::CS, self.registers.pc.word())?;
        self.registers.pc.operation(1, u16::wrapping_add);
        Ok(res)
    }

    #[inline]
    pub fn fetch_word(&mut self) -> Result<u16> {
        let res = self.read_word(SegmentType::CS, self.registers.pc.word())?;
        self.registers.pc.operation(2, u16::wrapping_add);
        Ok(res)
    }

    /// Reads at `CS:IP + ahead` without moving IP.
    #[inline]
    pub fn peek_byte(&self, ahead: u16) -> Result<u8> {
        self.read_byte(SegmentType::CS, self.registers.pc.word().wrapping_add(ahead))
    }

    #[inline]
    pub fn read_byte(&self, segment: SegmentType, offset: u16) -> Result<u8> {
        self.memory.read_byte(translate(self.registers.segment(segment), offset))
    }

    #[inline]
    pub fn write_byte(&mut self, segment: SegmentType, offset: u16, value: u8) -> Result<()> {
        self.memory.write_byte(translate(self.registers.segment(segment), offset), value)
    }

    /// Word reads wrap inside the segment: the high byte of `seg:FFFF` is `seg:0000`.
    #[inline]
    pub fn read_word(&self, segment: SegmentType, offset: u16) -> Result<u16> {
        let low = self.read_byte(segment, offset)?;
        let high = self.read_byte(segment, offset.wrapping_add(1))?;
        Ok(u16::from_le_bytes([low, high]))
    }

    #[inline]
    pub fn write_word(&mut self, segment: SegmentType, offset: u16, value: u16) -> Result<()> {
        let [low, high] = value.to_le_bytes();
        self.write_byte(segment, offset, low)?;
        self.write_byte(segment, offset.wrapping_add(1), high)
    }

    pub fn push_word(&mut self, word: u16) -> Result<()> {
        let address = self.registers.sp.operation(2, u16::wrapping_sub);
        self.write_word(SegmentType::SS, address, word)
    }

    pub fn pop_word(&mut self) -> Result<u16> {
        let address = self.registers.sp.word();
        let word = self.read_word(SegmentType::SS, address)?;
        self.registers.sp.operation(2, u16::wrapping_add);
        Ok(word)
    }

    /// Interrupt vector table entry as `(cs, ip)`.
    pub fn read_vector(&self, vector: u8) -> Result<(u16, u16)> {
        let address = IVT_BASE + vector as usize * 4;
        let ip = self.memory.read_word(address)?;
        let cs = self.memory.read_word(address + 2)?;
        Ok((cs, ip))
    }

    pub fn write_vector(&mut self, vector: u8, cs: u16, ip: u16) -> Result<()> {
        let address = IVT_BASE + vector as usize * 4;
        self.memory.write_word(address, ip)?;
        self.memory.write_word(address + 2, cs)
    }

    #[inline(always)]
    pub fn set_flag(&mut self, flag: CpuFlag) {
        self.flags.set(flag);
    }

    #[inline(always)]
    pub fn unset_flag(&mut self, flag: CpuFlag) {
        self.flags.unset(flag);
    }

    #[inline(always)]
    pub fn update_flag(&mut self, flag: CpuFlag, active: bool) {
        self.flags.update(flag, active);
    }

    #[inline(always)]
    pub fn flip_flag(&mut self, flag: CpuFlag) {
        self.flags.flip(flag);
    }

    #[inline(always)]
    pub fn check_flag(&self, flag: CpuFlag) -> bool {
        self.flags.check(flag)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
