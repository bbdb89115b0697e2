/// Calls the byte or word instantiation of a generic handler.
macro_rules! sized {
    ($width:expr, $($f:ident)::+ ($($arg:expr),* $(,)?)) => {
        match $width {
            $crate::vm::opcode::Width::Byte => $($f)::+::<u8>($($arg),*),
            $crate::vm::opcode::Width::Word => $($f)::+::<u16>($($arg),*),
        }
    };
}

mod alu;
mod bcd;
mod control;
mod shift;
mod string;
mod transfer;

#[cfg(test)]
mod tests;

use crate::utils::number::SpecialOps;
use crate::vm::cpu::Cpu;
use crate::vm::error::Result;
use crate::vm::flags::CpuFlag::*;
use crate::vm::opcode::{AluOp, Instruction};
use crate::vm::registers::SegmentType;
use crate::vm::runtime::{Runtime, Step};

#[inline]
fn update_result_flags<T: SpecialOps>(cpu: &mut Cpu, res: T) {
    cpu.update_flag(Zero, res == T::zero());
    cpu.update_flag(Sign, res.sign());
    cpu.update_flag(Parity, res.parity());
}

#[inline]
fn update_arithmetic_flags<T: SpecialOps>(cpu: &mut Cpu, res: T, overflow: bool, carry: bool) {
    cpu.update_flag(Overflow, overflow);
    cpu.update_flag(Carry, carry);
    update_result_flags(cpu, res);
}

/// AF is left as it was.
#[inline]
fn update_logical_flags<T: SpecialOps>(cpu: &mut Cpu, res: T) {
    cpu.unset_flag(Overflow);
    cpu.unset_flag(Carry);
    update_result_flags(cpu, res);
}

/// One of the eight group-1 operations, flags included. CMP callers drop the result.
fn apply_alu<T: SpecialOps>(cpu: &mut Cpu, op: AluOp, lhs: T, rhs: T) -> T {
    let carry_in = cpu.check_flag(Carry);
    let (res, overflow, carry) = match op {
        AluOp::Add => lhs.oc_add(rhs),
        AluOp::Adc => lhs.oc_carry_add(rhs, carry_in),
        AluOp::Sub | AluOp::Cmp => lhs.oc_sub(rhs),
        AluOp::Sbb => lhs.oc_carry_sub(rhs, carry_in),
        AluOp::Or => (lhs | rhs, false, false),
        AluOp::And => (lhs & rhs, false, false),
        AluOp::Xor => (lhs ^ rhs, false, false),
    };

    if op.is_logical() {
        update_logical_flags(cpu, res);
    } else {
        update_arithmetic_flags(cpu, res, overflow, carry);
        cpu.update_flag(AuxCarry, lhs.aux_carry(rhs, res));
    }
    res
}

pub fn execute(vm: &mut Runtime, opcode: u8, instruction: Instruction) -> Result<Step> {
    use Instruction::*;

    match instruction {
        SegmentOverride(_) | Rep { .. } | Lock => {}

        AluRm { op, width, to_reg } => sized!(width, alu::alu_rm(vm, op, to_reg))?,
        AluAccImm { op, width } => sized!(width, alu::alu_acc_imm(vm, op))?,
        AluGroup { width, sign_extend } => alu::group_80_83(vm, width, sign_extend)?,
        TestRm { width } => sized!(width, alu::test_rm(vm))?,
        TestAccImm { width } => sized!(width, alu::test_acc_imm(vm))?,
        IncReg(reg) => alu::inc_dec_reg(vm, reg, false),
        DecReg(reg) => alu::inc_dec_reg(vm, reg, true),
        Group3 { width } => return alu::group_f6_f7(vm, width),
        Group4 => control::group_fe(vm, opcode)?,
        Group5 => return control::group_ff(vm, opcode),
        Cbw => alu::cbw(vm),
        Cwd => alu::cwd(vm),
        Shift { width, by_cl } => sized!(width, shift::group_d0_d3(vm, by_cl))?,

        Daa => bcd::daa(vm),
        Das => bcd::das(vm),
        Aaa => bcd::aaa(vm),
        Aas => bcd::aas(vm),
        Aam => return bcd::aam(vm),
        Aad => bcd::aad(vm)?,

        MovRm { width, to_reg } => sized!(width, transfer::mov_rm(vm, to_reg))?,
        MovFromSeg => transfer::mov_from_seg(vm, opcode)?,
        MovToSeg => transfer::mov_to_seg(vm, opcode)?,
        MovRegImm { width, reg } => sized!(width, transfer::mov_reg_imm(vm, reg))?,
        MovRmImm { width } => sized!(width, transfer::mov_rm_imm(vm, opcode))?,
        MovAccMem { width, to_acc } => sized!(width, transfer::mov_acc_mem(vm, to_acc))?,
        XchgRm { width } => sized!(width, transfer::xchg_rm(vm))?,
        XchgAcc(reg) => transfer::xchg_acc(vm, reg),
        Lea => transfer::lea(vm, opcode)?,
        Les => transfer::load_far_pointer(vm, opcode, SegmentType::ES)?,
        Lds => transfer::load_far_pointer(vm, opcode, SegmentType::DS)?,
        Lahf => transfer::lahf(vm),
        Sahf => transfer::sahf(vm),
        Xlat => transfer::xlat(vm)?,
        In { width, from_dx } => transfer::port_in(vm, width, from_dx)?,
        Out { width, to_dx } => transfer::port_out(vm, width, to_dx)?,

        PushReg(reg) => transfer::push_reg(vm, reg)?,
        PopReg(reg) => transfer::pop_reg(vm, reg)?,
        PushSeg(segment) => transfer::push_seg(vm, segment)?,
        PopSeg(segment) => transfer::pop_seg(vm, segment)?,
        PopRm => transfer::pop_rm(vm, opcode)?,
        Pushf => transfer::pushf(vm)?,
        Popf => transfer::popf(vm)?,

        Jcc { condition, negate } => control::jcc(vm, condition, negate)?,
        Loop(kind) => control::loop_cx(vm, kind)?,
        Jcxz => control::jcxz(vm)?,
        JmpShort => control::jmp_short(vm)?,
        JmpNear => control::jmp_near(vm)?,
        JmpFar => control::jmp_far(vm)?,
        CallNear => control::call_near(vm)?,
        CallFar => control::call_far(vm)?,
        Ret { far, pop } => control::ret(vm, far, pop)?,
        Int3 => return vm.raise(3),
        Int => {
            let vector = vm.cpu.fetch_byte()?;
            return vm.raise(vector);
        }
        Into => {
            if vm.cpu.check_flag(Overflow) {
                return vm.raise(4);
            }
        }
        Iret => control::iret(vm)?,

        String { op, width } => sized!(width, string::run(vm, op))?,

        Clc => vm.cpu.unset_flag(Carry),
        Stc => vm.cpu.set_flag(Carry),
        Cmc => vm.cpu.flip_flag(Carry),
        Cli => vm.cpu.unset_flag(Interrupt),
        Sti => vm.cpu.set_flag(Interrupt),
        Cld => vm.cpu.unset_flag(Directional),
        Std => vm.cpu.set_flag(Directional),

        // No coprocessor and no TEST pin: WAIT returns at once
        Wait => {}
        // No coprocessor: only the operand is decoded
        Esc => {
            vm.fetch_modrm()?;
        }
        Hlt => {
            vm.cpu.halted = true;
            return Ok(Step::Halted);
        }
    }
    Ok(Step::Continue)
}
