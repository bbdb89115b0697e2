use crate::vm::error::Result;
use crate::vm::flags::RESERVED_FLAGS;
use crate::vm::modrm::{ModRM, Operand};
use crate::vm::opcode::Width;
use crate::vm::registers::{SegmentType, AX, SP};
use crate::vm::runtime::Runtime;

pub(super) fn mov_rm<T: ModRM>(vm: &mut Runtime, to_reg: bool) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    if to_reg {
        let value = T::read(&vm.cpu, &decoded.operand)?;
        T::write_reg(&mut vm.cpu.registers, decoded.modrm.reg, value);
        Ok(())
    } else {
        let value = T::read_reg(&vm.cpu.registers, decoded.modrm.reg);
        T::write(&mut vm.cpu, &decoded.operand, value)
    }
}

/// 8C: MOV r/m16, sreg. Only ES, CS, SS and DS exist.
pub(super) fn mov_from_seg(vm: &mut Runtime, opcode: u8) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    if decoded.modrm.reg > 0b_011 {
        return Err(vm.illegal(opcode));
    }
    let word = vm.cpu.registers.segment(SegmentType::from_bits(decoded.modrm.reg));
    u16::write(&mut vm.cpu, &decoded.operand, word)
}

/// 8E: MOV sreg, r/m16.
pub(super) fn mov_to_seg(vm: &mut Runtime, opcode: u8) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    if decoded.modrm.reg > 0b_011 {
        return Err(vm.illegal(opcode));
    }
    let word = u16::read(&vm.cpu, &decoded.operand)?;
    vm.cpu.registers.set_segment(SegmentType::from_bits(decoded.modrm.reg), word);
    Ok(())
}

pub(super) fn mov_reg_imm<T: ModRM>(vm: &mut Runtime, reg: u8) -> Result<()> {
    let imm = T::fetch(&mut vm.cpu)?;
    T::write_reg(&mut vm.cpu.registers, reg, imm);
    Ok(())
}

/// C6/C7: only /0 is defined.
pub(super) fn mov_rm_imm<T: ModRM>(vm: &mut Runtime, opcode: u8) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    if decoded.modrm.reg != 0 {
        return Err(vm.illegal(opcode));
    }
    let imm = T::fetch(&mut vm.cpu)?;
    T::write(&mut vm.cpu, &decoded.operand, imm)
}

/// A0-A3: the accumulator and a direct 16-bit offset.
pub(super) fn mov_acc_mem<T: ModRM>(vm: &mut Runtime, to_acc: bool) -> Result<()> {
    let offset = vm.cpu.fetch_word()?;
    let segment = vm.data_segment();
    if to_acc {
        let value = T::read_mem(&vm.cpu, segment, offset)?;
        T::write_reg(&mut vm.cpu.registers, AX, value);
        Ok(())
    } else {
        let value = T::read_reg(&vm.cpu.registers, AX);
        T::write_mem(&mut vm.cpu, segment, offset, value)
    }
}

pub(super) fn xchg_rm<T: ModRM>(vm: &mut Runtime) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    let reg = T::read_reg(&vm.cpu.registers, decoded.modrm.reg);
    let rm = T::read(&vm.cpu, &decoded.operand)?;
    T::write(&mut vm.cpu, &decoded.operand, reg)?;
    T::write_reg(&mut vm.cpu.registers, decoded.modrm.reg, rm);
    Ok(())
}

/// 90-97; XCHG AX,AX is NOP.
pub(super) fn xchg_acc(vm: &mut Runtime, reg: u8) {
    let registers = &mut vm.cpu.registers;
    let ax = registers.ax.word();
    let other = registers.read_reg_word(reg);
    registers.ax.set(other);
    registers.write_reg_word(reg, ax);
}

/// The offset of a memory operand; register forms have none.
fn memory_offset(vm: &Runtime, operand: &Operand, opcode: u8) -> Result<(SegmentType, u16)> {
    match *operand {
        Operand::Memory { segment, offset } => Ok((segment, offset)),
        Operand::Register(_) => Err(vm.illegal(opcode)),
    }
}

pub(super) fn lea(vm: &mut Runtime, opcode: u8) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    let (_, offset) = memory_offset(vm, &decoded.operand, opcode)?;
    vm.cpu.registers.write_reg_word(decoded.modrm.reg, offset);
    Ok(())
}

/// LES/LDS: reg = [m16], segment = [m16 + 2].
pub(super) fn load_far_pointer(vm: &mut Runtime, opcode: u8, target: SegmentType) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    let (segment, offset) = memory_offset(vm, &decoded.operand, opcode)?;
    let pointer = vm.cpu.read_word(segment, offset)?;
    let selector = vm.cpu.read_word(segment, offset.wrapping_add(2))?;
    vm.cpu.registers.write_reg_word(decoded.modrm.reg, pointer);
    vm.cpu.registers.set_segment(target, selector);
    Ok(())
}

/// AH = SF ZF - AF - PF - CF, bit 1 reads as 1.
pub(super) fn lahf(vm: &mut Runtime) {
    let flags = vm.cpu.flags.pack_low() | RESERVED_FLAGS as u8;
    vm.cpu.registers.ax.set_high(flags);
}

pub(super) fn sahf(vm: &mut Runtime) {
    let ah = vm.cpu.registers.ax.high();
    vm.cpu.flags.unpack_low(ah);
}

/// AL = [seg:BX + AL]
pub(super) fn xlat(vm: &mut Runtime) -> Result<()> {
    let offset = vm.cpu.registers.bx.word().wrapping_add(vm.cpu.registers.ax.low() as u16);
    let byte = vm.cpu.read_byte(vm.data_segment(), offset)?;
    vm.cpu.registers.ax.set_low(byte);
    Ok(())
}

fn port(vm: &mut Runtime, via_dx: bool) -> Result<u16> {
    if via_dx {
        Ok(vm.cpu.registers.dx.word())
    } else {
        Ok(vm.cpu.fetch_byte()? as u16)
    }
}

pub(super) fn port_in(vm: &mut Runtime, width: Width, from_dx: bool) -> Result<()> {
    let port = port(vm, from_dx)?;
    match width {
        Width::Byte => {
            let byte = vm.port_in_byte(port);
            vm.cpu.registers.ax.set_low(byte);
        }
        Width::Word => {
            let word = vm.port_in_word(port);
            vm.cpu.registers.ax.set(word);
        }
    }
    Ok(())
}

pub(super) fn port_out(vm: &mut Runtime, width: Width, to_dx: bool) -> Result<()> {
    let port = port(vm, to_dx)?;
    match width {
        Width::Byte => vm.port_out_byte(port, vm.cpu.registers.ax.low()),
        Width::Word => vm.port_out_word(port, vm.cpu.registers.ax.word()),
    }
    Ok(())
}

/// 8086: PUSH SP stores the already-decremented SP.
pub(super) fn push_reg(vm: &mut Runtime, reg: u8) -> Result<()> {
    if reg == SP {
        let sp = vm.cpu.registers.sp.operation(2, u16::wrapping_sub);
        return vm.cpu.write_word(SegmentType::SS, sp, sp);
    }
    let word = vm.cpu.registers.read_reg_word(reg);
    vm.cpu.push_word(word)
}

pub(super) fn pop_reg(vm: &mut Runtime, reg: u8) -> Result<()> {
    let word = vm.cpu.pop_word()?;
    vm.cpu.registers.write_reg_word(reg, word);
    Ok(())
}

pub(super) fn push_seg(vm: &mut Runtime, segment: SegmentType) -> Result<()> {
    let word = vm.cpu.registers.segment(segment);
    vm.cpu.push_word(word)
}

pub(super) fn pop_seg(vm: &mut Runtime, segment: SegmentType) -> Result<()> {
    let word = vm.cpu.pop_word()?;
    vm.cpu.registers.set_segment(segment, word);
    Ok(())
}

/// 8F: only /0 is defined.
pub(super) fn pop_rm(vm: &mut Runtime, opcode: u8) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    if decoded.modrm.reg != 0 {
        return Err(vm.illegal(opcode));
    }
    let word = vm.cpu.pop_word()?;
    u16::write(&mut vm.cpu, &decoded.operand, word)
}

pub(super) fn pushf(vm: &mut Runtime) -> Result<()> {
    let flags = vm.cpu.flags.pushed();
    vm.cpu.push_word(flags)
}

pub(super) fn popf(vm: &mut Runtime) -> Result<()> {
    let flags = vm.cpu.pop_word()?;
    vm.cpu.flags.unpack(flags);
    Ok(())
}
