use super::alu::inc_dec;
use crate::utils::number::extend_sign;
use crate::vm::cpu::Cpu;
use crate::vm::error::Result;
use crate::vm::flags::CpuFlag::*;
use crate::vm::modrm::{ModRM, Operand};
use crate::vm::opcode::{Condition, LoopKind};
use crate::vm::registers::{SegmentType, SP};
use crate::vm::runtime::{Runtime, Step};

#[inline]
fn condition_met(cpu: &Cpu, condition: Condition) -> bool {
    match condition {
        Condition::Overflow => cpu.check_flag(Overflow),
        Condition::Below => cpu.check_flag(Carry),
        Condition::Zero => cpu.check_flag(Zero),
        Condition::BelowOrEqual => cpu.check_flag(Carry) || cpu.check_flag(Zero),
        Condition::Sign => cpu.check_flag(Sign),
        Condition::Parity => cpu.check_flag(Parity),
        Condition::Less => cpu.check_flag(Sign) != cpu.check_flag(Overflow),
        Condition::LessOrEqual => {
            cpu.check_flag(Zero) || cpu.check_flag(Sign) != cpu.check_flag(Overflow)
        }
    }
}

/// Reads a rel8 and jumps relative to the next instruction when `taken`.
#[inline]
fn short_jump_if(vm: &mut Runtime, taken: bool) -> Result<()> {
    let disp = extend_sign(vm.cpu.fetch_byte()?);
    if taken {
        vm.cpu.registers.pc.operation(disp, u16::wrapping_add);
    }
    Ok(())
}

pub(super) fn jcc(vm: &mut Runtime, condition: Condition, negate: bool) -> Result<()> {
    let taken = condition_met(&vm.cpu, condition) != negate;
    short_jump_if(vm, taken)
}

/// LOOP, LOOPZ, LOOPNZ: CX is decremented first and no flag changes.
pub(super) fn loop_cx(vm: &mut Runtime, kind: LoopKind) -> Result<()> {
    let cx = vm.cpu.registers.cx.operation(1, u16::wrapping_sub);
    let taken = cx != 0
        && match kind {
            LoopKind::Always => true,
            LoopKind::WhileZero => vm.cpu.check_flag(Zero),
            LoopKind::WhileNotZero => !vm.cpu.check_flag(Zero),
        };
    short_jump_if(vm, taken)
}

pub(super) fn jcxz(vm: &mut Runtime) -> Result<()> {
    let taken = vm.cpu.registers.cx.word() == 0;
    short_jump_if(vm, taken)
}

pub(super) fn jmp_short(vm: &mut Runtime) -> Result<()> {
    short_jump_if(vm, true)
}

pub(super) fn jmp_near(vm: &mut Runtime) -> Result<()> {
    let disp = vm.cpu.fetch_word()?;
    vm.cpu.registers.pc.operation(disp, u16::wrapping_add);
    Ok(())
}

pub(super) fn jmp_far(vm: &mut Runtime) -> Result<()> {
    let pc = vm.cpu.fetch_word()?;
    let cs = vm.cpu.fetch_word()?;
    vm.cpu.registers.pc.set(pc);
    vm.cpu.registers.cs.set(cs);
    Ok(())
}

pub(super) fn call_near(vm: &mut Runtime) -> Result<()> {
    let disp = vm.cpu.fetch_word()?;
    vm.cpu.push_word(vm.cpu.registers.pc.word())?;
    vm.cpu.registers.pc.operation(disp, u16::wrapping_add);
    Ok(())
}

pub(super) fn call_far(vm: &mut Runtime) -> Result<()> {
    let pc = vm.cpu.fetch_word()?;
    let cs = vm.cpu.fetch_word()?;
    far_call(&mut vm.cpu, cs, pc)
}

fn far_call(cpu: &mut Cpu, cs: u16, pc: u16) -> Result<()> {
    cpu.push_word(cpu.registers.cs.word())?;
    cpu.push_word(cpu.registers.pc.word())?;
    cpu.registers.cs.set(cs);
    cpu.registers.pc.set(pc);
    Ok(())
}

/// RET/RETF, optionally releasing imm16 bytes of arguments.
pub(super) fn ret(vm: &mut Runtime, far: bool, pop: bool) -> Result<()> {
    let release = if pop { vm.cpu.fetch_word()? } else { 0 };
    let pc = vm.cpu.pop_word()?;
    vm.cpu.registers.pc.set(pc);
    if far {
        let cs = vm.cpu.pop_word()?;
        vm.cpu.registers.cs.set(cs);
    }
    vm.cpu.registers.sp.operation(release, u16::wrapping_add);
    Ok(())
}

pub(super) fn iret(vm: &mut Runtime) -> Result<()> {
    let pc = vm.cpu.pop_word()?;
    let cs = vm.cpu.pop_word()?;
    let flags = vm.cpu.pop_word()?;
    vm.cpu.registers.pc.set(pc);
    vm.cpu.registers.cs.set(cs);
    vm.cpu.flags.unpack(flags);
    Ok(())
}

/// FE: INC/DEC r/m8. /2-/7 are undefined.
pub(super) fn group_fe(vm: &mut Runtime, opcode: u8) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    let decrement = match decoded.modrm.reg {
        0b_000 => false,
        0b_001 => true,
        _ => return Err(vm.illegal(opcode)),
    };
    let prev = u8::read(&vm.cpu, &decoded.operand)?;
    let res = inc_dec(&mut vm.cpu, prev, decrement);
    u8::write(&mut vm.cpu, &decoded.operand, res)
}

/// FF: INC, DEC, CALL, CALL far, JMP, JMP far, PUSH. /7 is undefined, as are
/// the far forms with a register operand.
pub(super) fn group_ff(vm: &mut Runtime, opcode: u8) -> Result<Step> {
    let decoded = vm.fetch_modrm()?;
    let operand = decoded.operand;

    match decoded.modrm.reg {
        // INC / DEC
        reg @ (0b_000 | 0b_001) => {
            let prev = u16::read(&vm.cpu, &operand)?;
            let res = inc_dec(&mut vm.cpu, prev, reg == 0b_001);
            u16::write(&mut vm.cpu, &operand, res)?;
        }
        // CALL r/m16 (target read before the push so CALL [SP-relative] sees the old stack)
        0b_010 => {
            let target = u16::read(&vm.cpu, &operand)?;
            vm.cpu.push_word(vm.cpu.registers.pc.word())?;
            vm.cpu.registers.pc.set(target);
        }
        // CALL m16:16
        0b_011 => {
            let (cs, pc) = far_pointer(vm, &operand, opcode)?;
            far_call(&mut vm.cpu, cs, pc)?;
        }
        // JMP r/m16
        0b_100 => {
            let target = u16::read(&vm.cpu, &operand)?;
            vm.cpu.registers.pc.set(target);
        }
        // JMP m16:16
        0b_101 => {
            let (cs, pc) = far_pointer(vm, &operand, opcode)?;
            vm.cpu.registers.cs.set(cs);
            vm.cpu.registers.pc.set(pc);
        }
        // PUSH r/m16; PUSH SP stores the decremented value
        0b_110 => {
            if operand == Operand::Register(SP) {
                let sp = vm.cpu.registers.sp.operation(2, u16::wrapping_sub);
                vm.cpu.write_word(SegmentType::SS, sp, sp)?;
            } else {
                let word = u16::read(&vm.cpu, &operand)?;
                vm.cpu.push_word(word)?;
            }
        }
        _ => return Err(vm.illegal(opcode)),
    }
    Ok(Step::Continue)
}

/// `(cs, ip)` stored at a memory operand, offset first.
fn far_pointer(vm: &Runtime, operand: &Operand, opcode: u8) -> Result<(u16, u16)> {
    match *operand {
        Operand::Memory { segment, offset } => {
            let pc = vm.cpu.read_word(segment, offset)?;
            let cs = vm.cpu.read_word(segment, offset.wrapping_add(2))?;
            Ok((cs, pc))
        }
        Operand::Register(_) => Err(vm.illegal(opcode)),
    }
}

/// Divide error: vector 0, with IP already past the faulting instruction.
pub(super) fn div_zero(vm: &mut Runtime) -> Result<Step> {
    vm.raise(0)
}
