pub mod cpu;
pub mod error;
pub mod flags;
pub mod instructions;
pub mod interrupt;
pub mod memory;
pub mod modrm;
pub mod opcode;
pub mod registers;
pub mod runtime;
