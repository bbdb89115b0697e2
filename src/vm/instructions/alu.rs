
use super::control::div_zero;
use super::{apply_alu, update_arithmetic_flags, update_logical_flags};
use crate::utils::number::{extend_sign, SpecialOps};
use crate::vm::error::Result;
use crate::vm::flags::CpuFlag::*;
use crate::vm::modrm::{ModRM, Operand};
use crate::vm::opcode::{AluOp, Width};
use crate::vm::cpu::Cpu;
use crate::vm::registers::AX;
use crate::vm::runtime::{Runtime, Step};

pub(super) fn alu_rm<T: ModRM>(vm: &mut Runtime, op: AluOp, to_reg: bool) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    let reg = T::read_reg(&vm.cpu.registers, decoded.modrm.reg);
    let rm = T::read(&vm.cpu, &decoded.operand)?;

    if to_reg {
        let res = apply_alu(&mut vm.cpu, op, reg, rm);
        if op != AluOp::Cmp {
            T::write_reg(&mut vm.cpu.registers, decoded.modrm.reg, res);
        }
    } else {
        let res = apply_alu(&mut vm.cpu, op, rm, reg);
        if op != AluOp::Cmp {
            T::write(&mut vm.cpu, &decoded.operand, res)?;
        }
    }
    Ok(())
}

pub(super) fn alu_acc_imm<T: ModRM>(vm: &mut Runtime, op: AluOp) -> Result<()> {
    let imm = T::fetch(&mut vm.cpu)?;
    let acc = T::read_reg(&vm.cpu.registers, AX);
    let res = apply_alu(&mut vm.cpu, op, acc, imm);
    if op != AluOp::Cmp {
        T::write_reg(&mut vm.cpu.registers, AX, res);
    }
    Ok(())
}

fn alu_operand<T: ModRM>(vm: &mut Runtime, op: AluOp, operand: &Operand, imm: T) -> Result<()> {
    let lhs = T::read(&vm.cpu, operand)?;
    let res = apply_alu(&mut vm.cpu, op, lhs, imm);
    if op != AluOp::Cmp {
        T::write(&mut vm.cpu, operand, res)?;
    }
    Ok(())
}

/// 80-83: ADD, OR, ADC, SBB, AND, SUB, XOR, CMP r/m, imm. 83 sign-extends imm8.
pub(super) fn group_80_83(vm: &mut Runtime, width: Width, sign_extend: bool) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    let op = AluOp::from_bits(decoded.modrm.reg);

    match width {
        Width::Byte => {
            let imm = vm.cpu.fetch_byte()?;
            alu_operand::<u8>(vm, op, &decoded.operand, imm)
        }
        Width::Word => {
            let imm = if sign_extend {
                extend_sign(vm.cpu.fetch_byte()?)
            } else {
                vm.cpu.fetch_word()?
            };
            alu_operand::<u16>(vm, op, &decoded.operand, imm)
        }
    }
}

pub(super) fn test_rm<T: ModRM>(vm: &mut Runtime) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    let reg = T::read_reg(&vm.cpu.registers, decoded.modrm.reg);
    let rm = T::read(&vm.cpu, &decoded.operand)?;
    update_logical_flags(&mut vm.cpu, rm & reg);
    Ok(())
}

pub(super) fn test_acc_imm<T: ModRM>(vm: &mut Runtime) -> Result<()> {
    let imm = T::fetch(&mut vm.cpu)?;
    let acc = T::read_reg(&vm.cpu.registers, AX);
    update_logical_flags(&mut vm.cpu, acc & imm);
    Ok(())
}

/// INC/DEC: every arithmetic flag except CF.
pub(super) fn inc_dec<T: SpecialOps>(cpu: &mut Cpu, prev: T, decrement: bool) -> T {
    let (res, overflow, _) = if decrement {
        prev.oc_sub(T::one())
    } else {
        prev.oc_add(T::one())
    };
    let carry = cpu.check_flag(Carry);
    update_arithmetic_flags(cpu, res, overflow, carry);
    cpu.update_flag(AuxCarry, prev.aux_carry(T::one(), res));
    res
}

pub(super) fn inc_dec_reg(vm: &mut Runtime, reg: u8, decrement: bool) {
    let prev = vm.cpu.registers.read_reg_word(reg);
    let res = inc_dec(&mut vm.cpu, prev, decrement);
    vm.cpu.registers.write_reg_word(reg, res);
}

pub(super) fn cbw(vm: &mut Runtime) {
    let al = vm.cpu.registers.ax.low();
    vm.cpu.registers.ax.set(extend_sign(al));
}

pub(super) fn cwd(vm: &mut Runtime) {
    let dx = if vm.cpu.registers.ax.word().sign() { 0xFFFF } else { 0x0000 };
    vm.cpu.registers.dx.set(dx);
}

fn test_imm<T: ModRM>(vm: &mut Runtime, operand: &Operand) -> Result<()> {
    let value = T::read(&vm.cpu, operand)?;
    let imm = T::fetch(&mut vm.cpu)?;
    update_logical_flags(&mut vm.cpu, value & imm);
    Ok(())
}

/// NOT leaves every flag alone.
fn not<T: ModRM>(vm: &mut Runtime, operand: &Operand) -> Result<()> {
    let value = T::read(&vm.cpu, operand)?;
    T::write(&mut vm.cpu, operand, !value)
}

fn neg<T: ModRM>(vm: &mut Runtime, operand: &Operand) -> Result<()> {
    let value = T::read(&vm.cpu, operand)?;
    let (res, overflow, carry) = T::zero().oc_sub(value);
    update_arithmetic_flags(&mut vm.cpu, res, overflow, carry);
    vm.cpu.update_flag(AuxCarry, T::zero().aux_carry(value, res));
    T::write(&mut vm.cpu, operand, res)
}

/// F6/F7: TEST, NOT, NEG, MUL, IMUL, DIV, IDIV. A divide overflow raises vector 0.
pub(super) fn group_f6_f7(vm: &mut Runtime, width: Width) -> Result<Step> {
    let decoded = vm.fetch_modrm()?;
    let operand = decoded.operand;

    match decoded.modrm.reg {
        // TEST (reg=1 is an undocumented alias on 8086)
        0b_000 | 0b_001 => sized!(width, test_imm(vm, &operand))?,
        0b_010 => sized!(width, not(vm, &operand))?,
        0b_011 => sized!(width, neg(vm, &operand))?,
        reg => {
            return match width {
                Width::Byte => multiply_divide_byte(vm, reg, &operand),
                Width::Word => multiply_divide_word(vm, reg, &operand),
            }
        }
    }
    Ok(Step::Continue)
}

fn multiply_divide_byte(vm: &mut Runtime, reg: u8, operand: &Operand) -> Result<Step> {
    let src = u8::read(&vm.cpu, operand)?;
    // 8086 undocumented: a REP prefix negates the IMUL/IDIV result (internal F1 flag)
    let negate = vm.repeat.is_some();

    match reg {
        // MUL - only CF/OF defined
        0b_100 => {
            let res = (vm.cpu.registers.ax.low() as u16) * (src as u16);
            vm.cpu.registers.ax.set(res);
            let high_nonzero = res >> 8 != 0;
            vm.cpu.update_flag(Carry, high_nonzero);
            vm.cpu.update_flag(Overflow, high_nonzero);
        }
        // IMUL - CF/OF set when AH is more than the sign extension of AL
        0b_101 => {
            let mut res = (vm.cpu.registers.ax.low() as i8 as i16) * (src as i8 as i16);
            if negate { res = res.wrapping_neg(); }
            vm.cpu.registers.ax.set(res as u16);
            let sign_ext_check = (res as i8 as i16) != res;
            vm.cpu.update_flag(Carry, sign_ext_check);
            vm.cpu.update_flag(Overflow, sign_ext_check);
        }
        // DIV - no flags defined
        0b_110 => {
            let numerator = vm.cpu.registers.ax.word();
            let denum = src as u16;
            if denum == 0 {
                return div_zero(vm);
            }
            let quot = numerator / denum;
            let rem = numerator % denum;
            if quot > u8::MAX as u16 {
                return div_zero(vm);
            }
            vm.cpu.registers.ax.set_low(quot as u8);
            vm.cpu.registers.ax.set_high(rem as u8);
        }
        // IDIV - truncated division, no flags defined
        _ => {
            let numerator = vm.cpu.registers.ax.word() as i16 as i32;
            let denum = src as i8 as i32;
            if denum == 0 {
                return div_zero(vm);
            }
            let mut quot = numerator / denum;
            let rem = numerator % denum;
            if negate { quot = -quot; }
            if !(i8::MIN as i32..=i8::MAX as i32).contains(&quot) {
                return div_zero(vm);
            }
            vm.cpu.registers.ax.set_low(quot as u8);
            vm.cpu.registers.ax.set_high(rem as u8);
        }
    }
    Ok(Step::Continue)
}

fn multiply_divide_word(vm: &mut Runtime, reg: u8, operand: &Operand) -> Result<Step> {
    let src = u16::read(&vm.cpu, operand)?;
    let negate = vm.repeat.is_some();

    match reg {
        // MUL - only CF/OF defined
        0b_100 => {
            let res = (vm.cpu.registers.ax.word() as u32) * (src as u32);
            vm.cpu.registers.dx.set((res >> 16) as u16);
            vm.cpu.registers.ax.set(res as u16);
            let high_nonzero = res >> 16 != 0;
            vm.cpu.update_flag(Carry, high_nonzero);
            vm.cpu.update_flag(Overflow, high_nonzero);
        }
        // IMUL - CF/OF set when DX is more than the sign extension of AX
        0b_101 => {
            let mut res = (vm.cpu.registers.ax.word() as i16 as i32) * (src as i16 as i32);
            if negate { res = res.wrapping_neg(); }
            vm.cpu.registers.dx.set(((res as u32) >> 16) as u16);
            vm.cpu.registers.ax.set(res as u16);
            let sign_ext_check = (res as i16 as i32) != res;
            vm.cpu.update_flag(Carry, sign_ext_check);
            vm.cpu.update_flag(Overflow, sign_ext_check);
        }
        // DIV - no flags defined
        0b_110 => {
            let numerator = (vm.cpu.registers.dx.word() as u32) << 16 | vm.cpu.registers.ax.word() as u32;
            let denum = src as u32;
            if denum == 0 {
                return div_zero(vm);
            }
            let quot = numerator / denum;
            let rem = numerator % denum;
            if quot > u16::MAX as u32 {
                return div_zero(vm);
            }
            vm.cpu.registers.ax.set(quot as u16);
            vm.cpu.registers.dx.set(rem as u16);
        }
        // IDIV - truncated division, no flags defined
        _ => {
            let numerator = ((vm.cpu.registers.dx.word() as u32) << 16 | vm.cpu.registers.ax.word() as u32) as i32 as i64;
            let denum = src as i16 as i64;
            if denum == 0 {
                return div_zero(vm);
            }
            let mut quot = numerator / denum;
            let rem = numerator % denum;
            if negate { quot = -quot; }
            if !(i16::MIN as i64..=i16::MAX as i64).contains(&quot) {
                return div_zero(vm);
            }
            vm.cpu.registers.ax.set(quot as u16);
            vm.cpu.registers.dx.set(rem as u16);
        }
    }
    Ok(Step::Continue)
}
