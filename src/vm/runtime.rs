use std::fmt::{Debug, Formatter};

use log::{debug, trace, warn};

use crate::vm::cpu::Cpu;
use crate::vm::error::{CpuError, Result};
use crate::vm::flags::CpuFlag::{Interrupt, Trap};
use crate::vm::instructions::execute;
use crate::vm::interrupt::{InterruptBus, InterruptHandler, Service};
use crate::vm::memory::translate;
use crate::vm::modrm::{self, Decoded};
use crate::vm::opcode::Instruction;
use crate::vm::registers::SegmentType;

/// Segment a program image is loaded into.
pub const LOAD_SEGMENT: u16 = 0x1000;
/// Offset of the first program byte; 0000-00FF is the program segment prefix.
pub const LOAD_OFFSET: u16 = 0x0100;
pub const INITIAL_SP: u16 = 0xFFFE;
/// The image must end below the zero return word at `SS:INITIAL_SP`.
pub const MAX_PROGRAM_SIZE: usize = INITIAL_SP as usize - LOAD_OFFSET as usize;

/// Prefix bytes consumed by one `step`. A longer run is split across steps
/// with the pending prefixes kept, so `run` limits still apply.
pub const MAX_PREFIX_RUN: usize = 16;

const PSP_COMMAND_TAIL: u16 = 0x0080;

/// Result of a single `step`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halted,
    /// A vector without a handler or a table entry, or a service number the
    /// handler does not provide. Execution continues after the `INT`.
    Unhandled { vector: u8, service: Option<u8> },
    Exited(u8),
}

/// Why `run` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Halted,
    Exited(u8),
    LimitReached,
}

pub struct Runtime {
    pub cpu: Cpu,
    interrupts: InterruptBus,
    pub segment_override: Option<SegmentType>,
    /// Pending REP prefix; `true` for REPZ, `false` for REPNZ.
    pub repeat: Option<bool>,
    pub instruction_count: u64,
    pub trace: bool,
    /// Prefixes were consumed but the instruction they apply to was not.
    prefix_pending: bool,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            interrupts: InterruptBus::new(),
            segment_override: None,
            repeat: None,
            instruction_count: 0,
            trace: false,
            prefix_pending: false,
        }
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Power-on state. Memory and registered handlers are kept.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.segment_override = None;
        self.repeat = None;
        self.prefix_pending = false;
        self.instruction_count = 0;
    }

    pub fn register_handler(&mut self, start: u8, end: u8, handler: Box<dyn InterruptHandler>) {
        debug!("Registering {} for INT {:02X}h-{:02X}h", handler.name(), start, end);
        if (start..=end).any(|vector| self.interrupts.is_claimed(vector)) {
            warn!("{} overlaps an earlier handler, which keeps its vectors", handler.name());
        }
        self.interrupts.register(start, end, handler);
    }

    pub fn load_at(&mut self, segment: u16, offset: u16, data: &[u8]) -> Result<()> {
        self.cpu.memory.load(translate(segment, offset), data)
    }

    /// Loads a flat `.COM` image at `LOAD_SEGMENT:0100` and points every
    /// segment register at it.
    pub fn load_program(&mut self, program: &[u8]) -> Result<()> {
        if program.len() > MAX_PROGRAM_SIZE {
            return Err(CpuError::ProgramTooLarge { size: program.len() });
        }
        self.reset();
        self.load_at(LOAD_SEGMENT, LOAD_OFFSET, program)?;

        // PSP: INT 20h at offset 0 so a bare RET terminates, and an empty command tail.
        self.load_at(LOAD_SEGMENT, 0x0000, &[0xCD, 0x20])?;
        self.load_at(LOAD_SEGMENT, PSP_COMMAND_TAIL, &[0x00, 0x0D])?;

        let registers = &mut self.cpu.registers;
        for segment in [SegmentType::CS, SegmentType::DS, SegmentType::ES, SegmentType::SS] {
            registers.set_segment(segment, LOAD_SEGMENT);
        }
        registers.pc.set(LOAD_OFFSET);
        registers.sp.set(INITIAL_SP);
        self.cpu.write_word(SegmentType::SS, INITIAL_SP, 0x0000)?;

        debug!(
            "Loaded {} bytes at {:04X}:{:04X}",
            program.len(),
            LOAD_SEGMENT,
            LOAD_OFFSET
        );
        Ok(())
    }

    /// Executes one instruction including its prefixes.
    pub fn step(&mut self) -> Result<Step> {
        if self.cpu.halted {
            return Ok(Step::Halted);
        }
        if self.trace {
            debug!("{:?}", self);
        }

        if !self.prefix_pending {
            self.cpu.registers.op_pc = self.cpu.registers.pc.word();
        }
        let result = match self.fetch_and_execute() {
            Ok(None) => {
                trace!("Prefix run continues past {} bytes", MAX_PREFIX_RUN);
                self.prefix_pending = true;
                self.instruction_count += 1;
                return Ok(Step::Continue);
            }
            Ok(Some(step)) => Ok(step),
            Err(err) => Err(err),
        };
        self.prefix_pending = false;
        self.segment_override = None;
        self.repeat = None;

        match result {
            Err(err @ CpuError::IllegalInstruction { .. }) => {
                self.cpu.registers.pc.set(self.cpu.registers.op_pc);
                Err(err)
            }
            Err(err) => Err(err),
            Ok(step) => {
                self.instruction_count += 1;
                Ok(step)
            }
        }
    }

    /// `None` when only prefixes were consumed.
    fn fetch_and_execute(&mut self) -> Result<Option<Step>> {
        for _ in 0..MAX_PREFIX_RUN {
            let opcode = self.cpu.fetch_byte()?;
            let instruction = Instruction::decode(opcode).ok_or_else(|| self.illegal(opcode))?;
            if !instruction.is_prefix() {
                if self.trace {
                    debug!(
                        "{:04X}:{:04X} {}",
                        self.cpu.registers.cs.word(),
                        self.cpu.registers.op_pc,
                        instruction
                    );
                }
                return execute(self, opcode, instruction).map(Some);
            }
            match instruction {
                Instruction::SegmentOverride(segment) => self.segment_override = Some(segment),
                Instruction::Rep { zero } => self.repeat = Some(zero),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Steps until the program halts or exits, a fault occurs, or `limit`
    /// instructions have executed.
    pub fn run(&mut self, limit: Option<u64>) -> Result<Outcome> {
        let start = self.instruction_count;
        if self.trace {
            debug!("Tracing Enabled");
        }

        loop {
            if limit.is_some_and(|limit| self.instruction_count - start >= limit) {
                debug!("Instruction limit reached after {} instructions", self.instruction_count - start);
                return Ok(Outcome::LimitReached);
            }
            match self.step()? {
                Step::Continue => {}
                Step::Halted => {
                    debug!("Halted after {} instructions", self.instruction_count - start);
                    return Ok(Outcome::Halted);
                }
                Step::Exited(code) => {
                    debug!(
                        "Exited with status {:02X} after {} instructions",
                        code,
                        self.instruction_count - start
                    );
                    return Ok(Outcome::Exited(code));
                }
                Step::Unhandled { vector, service: Some(service) } => {
                    warn!(
                        "INT {:02X}h service {:02X}h not implemented at {:04X}:{:04X}",
                        vector,
                        service,
                        self.cpu.registers.cs.word(),
                        self.cpu.registers.op_pc
                    );
                }
                Step::Unhandled { vector, service: None } => {
                    warn!(
                        "INT {:02X}h has no handler at {:04X}:{:04X}",
                        vector,
                        self.cpu.registers.cs.word(),
                        self.cpu.registers.op_pc
                    );
                }
            }
        }
    }

    /// Delivers a software interrupt: host handler first, then the vector
    /// table, otherwise reports it unhandled.
    pub fn raise(&mut self, vector: u8) -> Result<Step> {
        if let Some(handler) = self.interrupts.handler_mut(vector) {
            trace!(
                "INT {:02X}h -> {} AH={:02X}",
                vector,
                handler.name(),
                self.cpu.registers.ax.high()
            );
            return Ok(match handler.handle(vector, &mut self.cpu)? {
                Service::Done => Step::Continue,
                Service::Unimplemented(service) => Step::Unhandled { vector, service: Some(service) },
                Service::Terminate(code) => Step::Exited(code),
            });
        }

        let (cs, ip) = self.cpu.read_vector(vector)?;
        if cs == 0 && ip == 0 {
            return Ok(Step::Unhandled { vector, service: None });
        }

        debug!(
            "[IVT] INT {:02X}h -> {:04X}:{:04X} at {:04X}:{:04X}",
            vector,
            cs,
            ip,
            self.cpu.registers.cs.word(),
            self.cpu.registers.op_pc
        );

        self.cpu.push_word(self.cpu.flags.pushed())?;
        self.cpu.unset_flag(Interrupt);
        self.cpu.unset_flag(Trap);
        self.cpu.push_word(self.cpu.registers.cs.word())?;
        self.cpu.push_word(self.cpu.registers.pc.word())?;

        self.cpu.registers.cs.set(cs);
        self.cpu.registers.pc.set(ip);
        Ok(Step::Continue)
    }

    pub(crate) fn illegal(&self, opcode: u8) -> CpuError {
        CpuError::IllegalInstruction {
            opcode,
            cs: self.cpu.registers.cs.word(),
            ip: self.cpu.registers.op_pc,
        }
    }

    /// Fetches a ModR/M byte and its displacement, resolving the operand.
    pub fn fetch_modrm(&mut self) -> Result<Decoded> {
        let byte = self.cpu.fetch_byte()?;
        let stream = [self.cpu.peek_byte(0)?, self.cpu.peek_byte(1)?];
        let decoded = modrm::decode(byte, stream, &self.cpu.registers, self.segment_override);
        self.cpu.registers.pc.operation(decoded.consumed, u16::wrapping_add);
        Ok(decoded)
    }

    /// Segment for DS-relative operands, after any override.
    #[inline]
    pub fn data_segment(&self) -> SegmentType {
        self.segment_override.unwrap_or(SegmentType::DS)
    }

    pub fn port_in_byte(&mut self, port: u16) -> u8 {
        trace!("IN {:04X}h -> FFh (no device)", port);
        0xFF
    }

    pub fn port_in_word(&mut self, port: u16) -> u16 {
        u16::from_le_bytes([self.port_in_byte(port), self.port_in_byte(port.wrapping_add(1))])
    }

    pub fn port_out_byte(&mut self, port: u16, value: u8) {
        trace!("OUT {:04X}h <- {:02X}h (discarded)", port, value);
    }

    pub fn port_out_word(&mut self, port: u16, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.port_out_byte(port, low);
        self.port_out_byte(port.wrapping_add(1), high);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Runtime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let registers = &self.cpu.registers;
        let code = |ahead| self.cpu.peek_byte(ahead).unwrap_or(0xFF);
        write!(
            f,
            "AX={:?} BX={:?} CX={:?} DX={:?} SP={:?} BP={:?} SI={:?} DI={:?} \
             DS={:?} ES={:?} SS={:?} {:?} {:04X}:{:04X} {:02X}{:02X}{}",
            registers.ax,
            registers.bx,
            registers.cx,
            registers.dx,
            registers.sp,
            registers.bp,
            registers.si,
            registers.di,
            registers.ds,
            registers.es,
            registers.ss,
            self.cpu.flags,
            registers.cs.word(),
            registers.pc.word(),
            code(0),
            code(1),
            if self.cpu.halted { " Halted" } else { "" }
        )
    }
}
