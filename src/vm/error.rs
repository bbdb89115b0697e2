use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CpuError {
    #[error("illegal instruction {opcode:#04X} at {cs:04X}:{ip:04X}")]
    IllegalInstruction { opcode: u8, cs: u16, ip: u16 },
    #[error("memory access out of bounds at {address:#07X}")]
    OutOfBounds { address: usize },
    #[error("program of {size} bytes does not fit in its segment")]
    ProgramTooLarge { size: usize },
    #[error("host I/O failed: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CpuError>;
