use super::update_arithmetic_flags;
use crate::utils::number::SpecialOps;
use crate::vm::error::Result;
use crate::vm::flags::CpuFlag::*;
use crate::vm::modrm::ModRM;
use crate::vm::runtime::Runtime;

#[inline(always)]
fn bit<T: SpecialOps>(value: T, n: u32) -> bool {
    n < T::zero().count_zeros() && (value >> n as usize) & T::one() == T::one()
}

/// D0-D3: ROL, ROR, RCL, RCR, SHL, SHR, SAL, SAR by 1 or by CL.
/// The count is not masked, as on the 8086; a zero count changes nothing.
pub(super) fn group_d0_d3<T: ModRM>(vm: &mut Runtime, by_cl: bool) -> Result<()> {
    let decoded = vm.fetch_modrm()?;
    let count = if by_cl { vm.cpu.registers.cx.low() as u32 } else { 1 };
    if count == 0 {
        return Ok(());
    }
    let reg = decoded.modrm.reg;
    let value = T::read(&vm.cpu, &decoded.operand)?;
    let bits = T::zero().count_zeros();
    let carry_in = vm.cpu.check_flag(Carry);

    let (res, c) = match reg {
        // ROL
        0b_000 => {
            let res = value.rotate_left(count);
            (res, bit(res, 0))
        }
        // ROR
        0b_001 => {
            let res = value.rotate_right(count);
            (res, res.sign())
        }
        // RCL
        0b_010 => value.rotate_carry_left(count, carry_in),
        // RCR
        0b_011 => value.rotate_carry_right(count, carry_in),
        // SHL | SAL (reg=6 is an undocumented alias on 8086)
        0b_100 | 0b_110 => {
            let res = if count >= bits { T::zero() } else { value.unsigned_shl(count) };
            (res, count <= bits && bit(value, bits - count))
        }
        // SHR
        0b_101 => {
            let res = if count >= bits { T::zero() } else { value.unsigned_shr(count) };
            (res, bit(value, count - 1))
        }
        // SAR
        _ => {
            if count >= bits {
                let fill = if value.sign() { !T::zero() } else { T::zero() };
                (fill, value.sign())
            } else {
                (value.signed_shr(count), bit(value, count - 1))
            }
        }
    };

    if reg & 0b_100 != 0 {
        // Shifts: OF is defined for a single-bit count only
        let overflow = if count == 1 {
            if reg & 0b_001 == 0 {
                res.sign() != c
            } else {
                (value ^ res).sign()
            }
        } else {
            vm.cpu.check_flag(Overflow)
        };
        update_arithmetic_flags(&mut vm.cpu, res, overflow, c);
    } else {
        // Rotates: only CF and OF
        vm.cpu.update_flag(Carry, c);
        if count == 1 {
            let overflow = match reg {
                // ROL / RCL: MSB(result) XOR CF
                0b_000 | 0b_010 => res.sign() != c,
                // ROR / RCR: the two top bits of the result differ
                _ => res.sign() != bit(res, bits - 2),
            };
            vm.cpu.update_flag(Overflow, overflow);
        }
    }
    T::write(&mut vm.cpu, &decoded.operand, res)
}
