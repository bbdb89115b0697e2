use byteorder::{ByteOrder, LittleEndian};

use crate::vm::error::{CpuError, Result};

/// 1 MiB, the whole 20-bit address space.
pub const MEMORY_SIZE: usize = 0x10_0000;
pub const ADDRESS_MASK: usize = 0xF_FFFF;
/// Interrupt vector table: 256 far pointers at the bottom of memory.
pub const IVT_BASE: usize = 0x0000;

/// Physical address of `segment:offset`, wrapped to 20 bits like the 8086.
#[inline(always)]
pub fn translate(segment: u16, offset: u16) -> usize {
    (((segment as usize) << 4) + offset as usize) & ADDRESS_MASK
}

pub struct Memory {
    bytes: Box<[u8]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            bytes: vec![0u8; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn range(&self, address: usize, len: usize) -> Result<std::ops::Range<usize>> {
        match address.checked_add(len) {
            Some(end) if end <= self.capacity() => Ok(address..end),
            _ => Err(CpuError::OutOfBounds { address }),
        }
    }

    pub fn slice(&self, address: usize, len: usize) -> Result<&[u8]> {
        let range = self.range(address, len)?;
        Ok(&self.bytes[range])
    }

    #[inline]
    pub fn read_byte(&self, address: usize) -> Result<u8> {
        self.bytes
            .get(address)
            .copied()
            .ok_or(CpuError::OutOfBounds { address })
    }

    #[inline]
    pub fn write_byte(&mut self, address: usize, value: u8) -> Result<()> {
        let byte = self
            .bytes
            .get_mut(address)
            .ok_or(CpuError::OutOfBounds { address })?;
        *byte = value;
        Ok(())
    }

    #[inline]
    pub fn read_word(&self, address: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.slice(address, 2)?))
    }

    #[inline]
    pub fn write_word(&mut self, address: usize, value: u16) -> Result<()> {
        let range = self.range(address, 2)?;
        LittleEndian::write_u16(&mut self.bytes[range], value);
        Ok(())
    }

    /// Copies `data` to `address`; nothing is written unless all of it fits.
    pub fn load(&mut self, address: usize, data: &[u8]) -> Result<()> {
        let range = self.range(address, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
