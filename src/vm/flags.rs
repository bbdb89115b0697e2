#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CpuFlag {
    Carry = 0,
    Parity = 2,
    AuxCarry = 4,
    Zero = 6,
    Sign = 7,
    Trap = 8,
    Interrupt = 9,
    Directional = 10,
    Overflow = 11,
}

/// Bits of the flag word that carry state.
pub const DEFINED_FLAGS: u16 = 0b_0000_1111_1101_0101;
/// SF, ZF, AF, PF and CF: the part of the flag word LAHF/SAHF see.
pub const LOW_FLAGS: u8 = 0b_1101_0101;
/// 8086: bits 12-15 and bit 1 always read back as 1 from the stack.
pub const RESERVED_FLAGS: u16 = 0b_1111_0000_0000_0010;

/// The status flags, packed in the architectural flag-word layout.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u16);

impl Flags {
    #[inline(always)]
    pub fn set(&mut self, flag: CpuFlag) {
        self.0 |= 1u16 << (flag as u8);
    }

    #[inline(always)]
    pub fn unset(&mut self, flag: CpuFlag) {
        self.0 &= !(1u16 << (flag as u8));
    }

    #[inline(always)]
    pub fn update(&mut self, flag: CpuFlag, active: bool) {
        if active {
            self.set(flag);
        } else {
            self.unset(flag);
        }
    }

    #[inline(always)]
    pub fn flip(&mut self, flag: CpuFlag) {
        self.update(flag, !self.check(flag));
    }

    #[inline(always)]
    pub fn check(&self, flag: CpuFlag) -> bool {
        (self.0 & 1u16 << (flag as u8)) != 0
    }

    /// Flag word with undefined bits masked to zero.
    #[inline]
    pub fn pack(&self) -> u16 {
        self.0 & DEFINED_FLAGS
    }

    #[inline]
    pub fn unpack(&mut self, word: u16) {
        self.0 = word & DEFINED_FLAGS;
    }

    /// The flag word as PUSHF and interrupt entry store it.
    #[inline]
    pub fn pushed(&self) -> u16 {
        self.pack() | RESERVED_FLAGS
    }

    #[inline]
    pub fn pack_low(&self) -> u8 {
        self.0 as u8 & LOW_FLAGS
    }

    /// Replaces SF/ZF/AF/PF/CF, leaving the high flags alone.
    #[inline]
    pub fn unpack_low(&mut self, byte: u8) {
        self.0 = (self.0 & 0xFF00) | (byte & LOW_FLAGS) as u16;
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use CpuFlag::*;
        const LETTERS: [(CpuFlag, char); 9] = [
            (Overflow, 'O'),
            (Directional, 'D'),
            (Interrupt, 'I'),
            (Trap, 'T'),
            (Sign, 'S'),
            (Zero, 'Z'),
            (AuxCarry, 'A'),
            (Parity, 'P'),
            (Carry, 'C'),
        ];
        for (flag, c) in LETTERS {
            write!(f, "{}", if self.check(flag) { c } else { '-' })?;
        }
        Ok(())
    }
}
