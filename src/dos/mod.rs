use log::{debug, trace};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::io::console::Console;
use crate::vm::cpu::Cpu;
use crate::vm::error::Result;
use crate::vm::flags::CpuFlag::{Carry, Zero};
use crate::vm::interrupt::{InterruptHandler, Service};
use crate::vm::registers::SegmentType;


pub const TERMINATE_VECTOR: u8 = 0x20;
pub const SERVICE_VECTOR: u8 = 0x21;

/// Longest `$`-terminated string service 09h will walk before giving up.
const MAX_STRING_LEN: usize = 0x1_0000;

/// DOS 2.x error code for a handle that is not open.
const ERROR_INVALID_HANDLE: u16 = 0x0006;

/// INT 21h function numbers (AH).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum DosService {
    ProgramTerminate = 0x00,
    CharacterInput = 0x01,
    CharacterOutput = 0x02,
    AuxiliaryInput = 0x03,
    AuxiliaryOutput = 0x04,
    PrinterOutput = 0x05,
    DirectConsoleIo = 0x06,
    DirectConsoleInput = 0x07,
    ConsoleInputNoEcho = 0x08,
    DisplayString = 0x09,
    BufferedInput = 0x0A,
    InputStatus = 0x0B,
    FlushAndInput = 0x0C,
    DiskReset = 0x0D,
    SelectDisk = 0x0E,
    OpenFcb = 0x0F,
    CloseFcb = 0x10,
    FindFirstFcb = 0x11,
    FindNextFcb = 0x12,
    DeleteFcb = 0x13,
    SequentialRead = 0x14,
    SequentialWrite = 0x15,
    CreateFcb = 0x16,
    RenameFcb = 0x17,
    CurrentDisk = 0x19,
    SetDta = 0x1A,
    RandomRead = 0x21,
    RandomWrite = 0x22,
    SetVector = 0x25,
    CreatePsp = 0x26,
    GetDate = 0x2A,
    SetDate = 0x2B,
    GetTime = 0x2C,
    SetTime = 0x2D,
    SetVerify = 0x2E,
    GetDta = 0x2F,
    GetVersion = 0x30,
    KeepProcess = 0x31,
    CtrlBreak = 0x33,
    GetVector = 0x35,
    FreeSpace = 0x36,
    CountryInfo = 0x38,
    MakeDirectory = 0x39,
    RemoveDirectory = 0x3A,
    ChangeDirectory = 0x3B,
    CreateFile = 0x3C,
    OpenFile = 0x3D,
    CloseFile = 0x3E,
    ReadFile = 0x3F,
    WriteFile = 0x40,
    DeleteFile = 0x41,
    Seek = 0x42,
    FileAttributes = 0x43,
    Ioctl = 0x44,
    DuplicateHandle = 0x45,
    ForceDuplicate = 0x46,
    CurrentDirectory = 0x47,
    Allocate = 0x48,
    Free = 0x49,
    Resize = 0x4A,
    Exec = 0x4B,
    Terminate = 0x4C,
    ReturnCode = 0x4D,
    FindFirst = 0x4E,
    FindNext = 0x4F,
    GetVerify = 0x54,
    RenameFile = 0x56,
    FileTime = 0x57,
}

/// OEM number reported in BH by function 30h.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromPrimitive)]
pub enum OemId {
    #[default]
    Ibm = 0x00,
    Compaq = 0x01,
    Zenith = 0x05,
    Att = 0x0C,
    Microsoft = 0xFF,
}

/// Console-only MS-DOS services for INT 20h and INT 21h.
pub struct DosServices<C: Console> {
    console: C,
    version: (u8, u8),
    oem: OemId,
    /// A key taken by the input status check but not read yet.
    lookahead: Option<u8>,
}

impl<C: Console> DosServices<C> {
    pub fn new(console: C) -> Self {
        Self {
            console,
            version: (0, 0),
            oem: OemId::default(),
            lookahead: None,
        }
    }

    pub fn with_version(mut self, major: u8, minor: u8) -> Self {
        self.version = (major, minor);
        self
    }

    pub fn with_oem(mut self, oem: OemId) -> Self {
        self.oem = oem;
        self
    }

    #[cfg(test)]
    pub fn console(&self) -> &C {
        &self.console
    }

    fn read_key(&mut self) -> Result<u8> {
        match self.lookahead.take() {
            Some(byte) => Ok(byte),
            None => Ok(self.console.read_char()?),
        }
    }

    fn poll_key(&mut self) -> Result<Option<u8>> {
        if self.lookahead.is_none() {
            self.lookahead = self.console.poll_char()?;
        }
        Ok(self.lookahead)
    }

    fn service(&mut self, cpu: &mut Cpu) -> Result<Service> {
        let ah = cpu.registers.ax.high();
        let Some(service) = DosService::from_u8(ah) else {
            return Ok(Service::Unimplemented(ah));
        };
        trace!("INT 21h {:?}", service);

        match service {
            DosService::ProgramTerminate => return Ok(Service::Terminate(0)),
            DosService::CharacterInput => {
                let byte = self.read_key()?;
                self.console.write_char(byte)?;
                cpu.registers.ax.set_low(byte);
            }
            DosService::CharacterOutput => {
                let dl = cpu.registers.dx.low();
                self.console.write_char(dl)?;
                cpu.registers.ax.set_low(dl);
            }
            DosService::DirectConsoleIo => {
                let dl = cpu.registers.dx.low();
                if dl == 0xFF {
                    let key = self.poll_key()?;
                    self.lookahead = None;
                    cpu.registers.ax.set_low(key.unwrap_or(0));
                    cpu.update_flag(Zero, key.is_none());
                } else {
                    self.console.write_char(dl)?;
                    cpu.registers.ax.set_low(dl);
                }
            }
            DosService::DirectConsoleInput | DosService::ConsoleInputNoEcho => {
                let byte = self.read_key()?;
                cpu.registers.ax.set_low(byte);
            }
            DosService::DisplayString => {
                let text = dollar_string(cpu, cpu.registers.dx.word())?;
                self.console.write_bytes(&text)?;
                cpu.registers.ax.set_low(b'$');
            }
            DosService::InputStatus => {
                let ready = self.poll_key()?.is_some();
                cpu.registers.ax.set_low(if ready { 0xFF } else { 0x00 });
            }
            DosService::SetVector => {
                let vector = cpu.registers.ax.low();
                let segment = cpu.registers.ds.word();
                let offset = cpu.registers.dx.word();
                debug!("INT 21h set vector {:02X}h -> {:04X}:{:04X}", vector, segment, offset);
                cpu.write_vector(vector, segment, offset)?;
            }
            DosService::GetVersion => {
                let (major, minor) = self.version;
                cpu.registers.ax.set_low(major);
                cpu.registers.ax.set_high(minor);
                cpu.registers.bx.set_high(self.oem as u8);
                cpu.registers.bx.set_low(0);
                cpu.registers.cx.set(0);
            }
            DosService::GetVector => {
                let (segment, offset) = cpu.read_vector(cpu.registers.ax.low())?;
                cpu.registers.es.set(segment);
                cpu.registers.bx.set(offset);
            }
            DosService::WriteFile => {
                let handle = cpu.registers.bx.word();
                if !matches!(handle, 1 | 2) {
                    debug!("INT 21h write to handle {} refused", handle);
                    cpu.registers.ax.set(ERROR_INVALID_HANDLE);
                    cpu.set_flag(Carry);
                    return Ok(Service::Done);
                }
                let count = cpu.registers.cx.word();
                let offset = cpu.registers.dx.word();
                let bytes = (0..count)
                    .map(|i| cpu.read_byte(SegmentType::DS, offset.wrapping_add(i)))
                    .collect::<Result<Vec<u8>>>()?;
                self.console.write_bytes(&bytes)?;
                cpu.registers.ax.set(count);
                cpu.unset_flag(Carry);
            }
            DosService::Terminate => return Ok(Service::Terminate(cpu.registers.ax.low())),
            _ => return Ok(Service::Unimplemented(ah)),
        }
        Ok(Service::Done)
    }
}

/// Bytes at `DS:offset` up to, not including, the first `$`.
fn dollar_string(cpu: &Cpu, offset: u16) -> Result<Vec<u8>> {
    let mut text = Vec::new();
    let mut offset = offset;
    while text.len() < MAX_STRING_LEN {
        let byte = cpu.read_byte(SegmentType::DS, offset)?;
        if byte == b'$' {
            return Ok(text);
        }
        text.push(byte);
        offset = offset.wrapping_add(1);
    }
    debug!("INT 21h/09h string has no terminator, output truncated");
    Ok(text)
}

impl<C: Console> InterruptHandler for DosServices<C> {
    fn handle(&mut self, vector: u8, cpu: &mut Cpu) -> Result<Service> {
        match vector {
            TERMINATE_VECTOR => Ok(Service::Terminate(0)),
            SERVICE_VECTOR => self.service(cpu),
            _ => Ok(Service::Unimplemented(cpu.registers.ax.high())),
        }
    }

    fn name(&self) -> &'static str {
        "MS-DOS"
    }
}
