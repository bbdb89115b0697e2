use super::apply_alu;
use crate::vm::error::Result;
use crate::vm::flags::CpuFlag::*;
use crate::vm::modrm::ModRM;
use crate::vm::opcode::{AluOp, StringOp};
use crate::vm::registers::{Register, SegmentType, AX};
use crate::vm::runtime::Runtime;

#[inline(always)]
fn advance(register: &mut Register, size: u16, backwards: bool) {
    if backwards {
        register.operation(size, u16::wrapping_sub);
    } else {
        register.operation(size, u16::wrapping_add);
    }
}

/// One element of a string operation. The source is DS:SI (or the
/// override), the destination always ES:DI.
fn once<T: ModRM>(vm: &mut Runtime, op: StringOp) -> Result<()> {
    let size = (T::zero().count_zeros() / 8) as u16;
    let backwards = vm.cpu.check_flag(Directional);
    let source = vm.data_segment();
    let si = vm.cpu.registers.si.word();
    let di = vm.cpu.registers.di.word();

    match op {
        StringOp::Movs => {
            let value = T::read_mem(&vm.cpu, source, si)?;
            T::write_mem(&mut vm.cpu, SegmentType::ES, di, value)?;
        }
        StringOp::Cmps => {
            let lhs = T::read_mem(&vm.cpu, source, si)?;
            let rhs = T::read_mem(&vm.cpu, SegmentType::ES, di)?;
            apply_alu(&mut vm.cpu, AluOp::Cmp, lhs, rhs);
        }
        StringOp::Stos => {
            let value = T::read_reg(&vm.cpu.registers, AX);
            T::write_mem(&mut vm.cpu, SegmentType::ES, di, value)?;
        }
        StringOp::Lods => {
            let value = T::read_mem(&vm.cpu, source, si)?;
            T::write_reg(&mut vm.cpu.registers, AX, value);
        }
        StringOp::Scas => {
            let acc = T::read_reg(&vm.cpu.registers, AX);
            let rhs = T::read_mem(&vm.cpu, SegmentType::ES, di)?;
            apply_alu(&mut vm.cpu, AluOp::Cmp, acc, rhs);
        }
    }

    let registers = &mut vm.cpu.registers;
    if matches!(op, StringOp::Movs | StringOp::Cmps | StringOp::Lods) {
        advance(&mut registers.si, size, backwards);
    }
    if !matches!(op, StringOp::Lods) {
        advance(&mut registers.di, size, backwards);
    }
    Ok(())
}

/// MOVS, CMPS, STOS, LODS, SCAS with an optional REP/REPZ/REPNZ prefix.
/// A repeated operation runs to completion within one step.
pub(super) fn run<T: ModRM>(vm: &mut Runtime, op: StringOp) -> Result<()> {
    let Some(zero) = vm.repeat else {
        return once::<T>(vm, op);
    };
    let compares = matches!(op, StringOp::Cmps | StringOp::Scas);

    while vm.cpu.registers.cx.word() != 0 {
        once::<T>(vm, op)?;
        vm.cpu.registers.cx.operation(1, u16::wrapping_sub);
        if compares && vm.cpu.check_flag(Zero) != zero {
            break;
        }
    }
    Ok(())
}
