use super::control::div_zero;
use super::update_result_flags;
use crate::utils::number::div_rem;
use crate::vm::error::Result;
use crate::vm::flags::CpuFlag::*;
use crate::vm::runtime::{Runtime, Step};

pub(super) fn daa(vm: &mut Runtime) {
    let old_al = vm.cpu.registers.ax.low();
    let old_cf = vm.cpu.check_flag(Carry);
    let old_af = vm.cpu.check_flag(AuxCarry);
    let mut cf = false;

    if old_af || (old_al & 0x0F) >= 0x0A {
        let (new_al, carry) = old_al.overflowing_add(0x06);
        vm.cpu.registers.ax.set_low(new_al);
        cf = old_cf || carry;
        vm.cpu.set_flag(AuxCarry);
    } else {
        vm.cpu.unset_flag(AuxCarry);
    }
    // 8086: with AF set on entry the high-nibble threshold is 9F, not 99
    let upper_threshold = if old_af { 0x9F } else { 0x99 };
    if old_cf || old_al > upper_threshold {
        vm.cpu.registers.ax.operation_low(0x60, u8::wrapping_add);
        cf = true;
    }
    vm.cpu.update_flag(Carry, cf);
    let al = vm.cpu.registers.ax.low();
    update_result_flags(&mut vm.cpu, al);
}

pub(super) fn das(vm: &mut Runtime) {
    let old_al = vm.cpu.registers.ax.low();
    let old_cf = vm.cpu.check_flag(Carry);
    let old_af = vm.cpu.check_flag(AuxCarry);
    // The borrow from the low-nibble step does not reach CF.
    let mut cf = old_cf;

    if old_af || (old_al & 0x0F) >= 0x0A {
        vm.cpu.registers.ax.operation_low(0x06, u8::wrapping_sub);
        vm.cpu.set_flag(AuxCarry);
    } else {
        vm.cpu.unset_flag(AuxCarry);
    }
    let upper_threshold = if old_af { 0x9F } else { 0x99 };
    if old_cf || old_al > upper_threshold {
        vm.cpu.registers.ax.operation_low(0x60, u8::wrapping_sub);
        cf = true;
    }
    vm.cpu.update_flag(Carry, cf);
    let al = vm.cpu.registers.ax.low();
    update_result_flags(&mut vm.cpu, al);
}

/// AAA and AAS adjust AL and AH separately; AL ends with its high nibble cleared.
pub(super) fn aaa(vm: &mut Runtime) {
    let al = vm.cpu.registers.ax.low();
    let adjust = (al & 0x0F) >= 0x0A || vm.cpu.check_flag(AuxCarry);

    if adjust {
        vm.cpu.registers.ax.set_low(al.wrapping_add(6));
        vm.cpu.registers.ax.operation_high(1, u8::wrapping_add);
    }
    vm.cpu.update_flag(AuxCarry, adjust);
    vm.cpu.update_flag(Carry, adjust);
    let al = vm.cpu.registers.ax.low() & 0x0F;
    vm.cpu.registers.ax.set_low(al);
}

pub(super) fn aas(vm: &mut Runtime) {
    let al = vm.cpu.registers.ax.low();
    let adjust = (al & 0x0F) >= 0x0A || vm.cpu.check_flag(AuxCarry);

    if adjust {
        vm.cpu.registers.ax.set_low(al.wrapping_sub(6));
        vm.cpu.registers.ax.operation_high(1, u8::wrapping_sub);
    }
    vm.cpu.update_flag(AuxCarry, adjust);
    vm.cpu.update_flag(Carry, adjust);
    let al = vm.cpu.registers.ax.low() & 0x0F;
    vm.cpu.registers.ax.set_low(al);
}

/// AAM imm8: AH = AL / imm, AL = AL % imm. A zero base raises vector 0.
pub(super) fn aam(vm: &mut Runtime) -> Result<Step> {
    let base = vm.cpu.fetch_byte()?;
    if base == 0 {
        // The stacked flags see PF/ZF/SF as for a zero result.
        update_result_flags(&mut vm.cpu, 0u8);
        return div_zero(vm);
    }
    let (ah, al) = vm.cpu.registers.ax.apply_low(base, div_rem);
    vm.cpu.registers.ax.set_high(ah);
    vm.cpu.registers.ax.set_low(al);
    update_result_flags(&mut vm.cpu, al);
    Ok(Step::Continue)
}

/// AAD imm8: AL = AH * imm + AL, AH = 0.
pub(super) fn aad(vm: &mut Runtime) -> Result<()> {
    let base = vm.cpu.fetch_byte()?;
    let ah = vm.cpu.registers.ax.high().wrapping_mul(base);
    let al = vm.cpu.registers.ax.operation_low(ah, u8::wrapping_add);
    vm.cpu.registers.ax.set_high(0);
    update_result_flags(&mut vm.cpu, al);
    Ok(())
}
