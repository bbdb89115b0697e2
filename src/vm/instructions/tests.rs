use crate::vm::cpu::Cpu;
use crate::vm::error::{CpuError, Result};
use crate::vm::flags::CpuFlag::*;
use crate::vm::interrupt::{InterruptHandler, Service};
use crate::vm::registers::SegmentType;
use crate::vm::runtime::{
    Outcome, Runtime, Step, INITIAL_SP, LOAD_OFFSET, LOAD_SEGMENT, MAX_PREFIX_RUN, MAX_PROGRAM_SIZE,
};

const CODE_SEGMENT: u16 = 0x1000;

fn setup(code: &[u8]) -> Runtime {
    let mut vm = Runtime::new();
    // Code at 1000:0000 keeps the vector table at 0000:0000 clear
    for segment in [SegmentType::CS, SegmentType::DS, SegmentType::ES, SegmentType::SS] {
        vm.cpu.registers.set_segment(segment, CODE_SEGMENT);
    }
    vm.cpu.registers.sp.set(0xFFFE);
    vm.cpu.registers.pc.set(0);
    vm.load_at(CODE_SEGMENT, 0, code).unwrap();
    vm
}

fn exec(vm: &mut Runtime) -> Step {
    vm.step().unwrap()
}

fn exec_n(vm: &mut Runtime, n: usize) {
    for _ in 0..n {
        assert_eq!(vm.step().unwrap(), Step::Continue);
    }
}

fn ip(vm: &Runtime) -> u16 {
    vm.cpu.registers.pc.word()
}

struct Stub {
    service: Service,
}

impl InterruptHandler for Stub {
    fn handle(&mut self, _vector: u8, cpu: &mut Cpu) -> Result<Service> {
        cpu.registers.ax.set_low(0x5A);
        Ok(self.service)
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

fn stub(service: Service) -> Box<Stub> {
    Box::new(Stub { service })
}

// ========================================================================
// DATA TRANSFER
// ========================================================================

#[test]
fn mov_ax_imm16_advances_three_bytes() {
    // MOV AX,1234h
    let mut vm = setup(&[0xB8, 0x34, 0x12]);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0x1234);
    assert_eq!(ip(&vm), 3);
}

#[test]
fn mov_reg8_imm8_high_keeps_low() {
    // MOV AX,1111h; MOV AH,ABh
    let mut vm = setup(&[0xB8, 0x11, 0x11, 0xB4, 0xAB]);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ax.word(), 0xAB11);
}

#[test]
fn mov_reg_to_memory_via_modrm() {
    // MOV AX,ABCDh; MOV [0200h],AX (89 06 00 02)
    let mut vm = setup(&[0xB8, 0xCD, 0xAB, 0x89, 0x06, 0x00, 0x02]);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.read_word(SegmentType::DS, 0x0200).unwrap(), 0xABCD);
    assert_eq!(ip(&vm), 7);
}

#[test]
fn direct_address_is_distinct_from_bp() {
    // MOV AX,[0200h] (8B 06 00 02) reads DS; MOV CX,[BP+00] (8B 4E 00) reads SS
    let mut vm = setup(&[0x8B, 0x06, 0x00, 0x02, 0x8B, 0x4E, 0x00]);
    vm.cpu.registers.ss.set(0x2000);
    vm.cpu.registers.bp.set(0x0200);
    vm.cpu.write_word(SegmentType::DS, 0x0200, 0x1111).unwrap();
    vm.cpu.write_word(SegmentType::SS, 0x0200, 0x2222).unwrap();
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ax.word(), 0x1111);
    assert_eq!(vm.cpu.registers.cx.word(), 0x2222);
    assert_eq!(ip(&vm), 7);
}

#[test]
fn segment_override_redirects_data_access() {
    // ES: MOV AL,[0010h]
    let mut vm = setup(&[0x26, 0xA0, 0x10, 0x00]);
    vm.cpu.registers.es.set(0x3000);
    vm.cpu.write_byte(SegmentType::ES, 0x0010, 0x77).unwrap();
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x77);
    assert_eq!(vm.segment_override, None);
}

#[test]
fn mov_rm_imm_word() {
    // MOV WORD [0100h],5678h
    let mut vm = setup(&[0xC7, 0x06, 0x00, 0x01, 0x78, 0x56]);
    exec(&mut vm);
    assert_eq!(vm.cpu.read_word(SegmentType::DS, 0x0100).unwrap(), 0x5678);
    assert_eq!(ip(&vm), 6);
}

#[test]
fn mov_segment_registers() {
    // MOV AX,2345h; MOV ES,AX; MOV BX,ES
    let mut vm = setup(&[0xB8, 0x45, 0x23, 0x8E, 0xC0, 0x8C, 0xC3]);
    exec_n(&mut vm, 3);
    assert_eq!(vm.cpu.registers.es.word(), 0x2345);
    assert_eq!(vm.cpu.registers.bx.word(), 0x2345);
}

#[test]
fn xchg_and_xlat() {
    // XCHG AX,BX; XLAT
    let mut vm = setup(&[0x93, 0xD7]);
    vm.cpu.registers.ax.set(0x0003);
    vm.cpu.registers.bx.set(0x0300);
    vm.cpu.write_byte(SegmentType::DS, 0x0303, 0x99).unwrap();
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0x0300);
    assert_eq!(vm.cpu.registers.bx.word(), 0x0003);
    vm.cpu.registers.ax.set(0x0000);
    vm.cpu.registers.bx.set(0x0300);
    vm.cpu.write_byte(SegmentType::DS, 0x0300, 0x42).unwrap();
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x42);
}

#[test]
fn lea_and_les() {
    // LEA SI,[BX+DI+10h]; LES DI,[0400h]
    let mut vm = setup(&[0x8D, 0x71, 0x10, 0xC4, 0x3E, 0x00, 0x04]);
    vm.cpu.registers.bx.set(0x0100);
    vm.cpu.registers.di.set(0x0020);
    vm.cpu.write_word(SegmentType::DS, 0x0400, 0xBEEF).unwrap();
    vm.cpu.write_word(SegmentType::DS, 0x0402, 0x4000).unwrap();
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.si.word(), 0x0130);
    assert_eq!(vm.cpu.registers.di.word(), 0xBEEF);
    assert_eq!(vm.cpu.registers.es.word(), 0x4000);
}

#[test]
fn cbw_and_cwd_extend_the_sign() {
    let mut vm = setup(&[0x98, 0x99]);
    vm.cpu.registers.ax.set(0x1280);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0xFF80);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.dx.word(), 0xFFFF);
}

#[test]
fn in_reads_open_bus() {
    // IN AL,60h; IN AX,DX
    let mut vm = setup(&[0xE4, 0x60, 0xED]);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ax.word(), 0xFFFF);
    assert_eq!(ip(&vm), 3);
}

// ========================================================================
// STACK
// ========================================================================

#[test]
fn push_pop_round_trip() {
    // MOV BX,BEEFh; PUSH BX; POP CX
    let mut vm = setup(&[0xBB, 0xEF, 0xBE, 0x53, 0x59]);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.sp.word(), 0xFFFC);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFFC).unwrap(), 0xBEEF);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.cx.word(), 0xBEEF);
    assert_eq!(vm.cpu.registers.sp.word(), 0xFFFE);
}

#[test]
fn push_sp_stores_decremented_value() {
    let mut vm = setup(&[0x54]);
    exec(&mut vm);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFFC).unwrap(), 0xFFFC);
}

#[test]
fn push_pop_segment() {
    // PUSH CS; POP DS
    let mut vm = setup(&[0x0E, 0x1F]);
    vm.cpu.registers.ds.set(0);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ds.word(), CODE_SEGMENT);
}

#[test]
fn pushf_sets_reserved_bits_and_popf_masks_them() {
    // STC; PUSHF; POP AX; PUSH BX; POPF
    let mut vm = setup(&[0xF9, 0x9C, 0x58, 0x53, 0x9D]);
    vm.cpu.registers.bx.set(0xFFFF);
    exec_n(&mut vm, 3);
    assert_eq!(vm.cpu.registers.ax.word(), 0xF003);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.flags.pack(), 0x0FD5);
}

#[test]
fn lahf_and_sahf() {
    // STC; LAHF; MOV AH,C0h; SAHF
    let mut vm = setup(&[0xF9, 0x9F, 0xB4, 0xC0, 0x9E]);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ax.high(), 0x03);
    exec_n(&mut vm, 2);
    assert!(vm.cpu.check_flag(Sign));
    assert!(vm.cpu.check_flag(Zero));
    assert!(!vm.cpu.check_flag(Carry));
}

// ========================================================================
// ARITHMETIC AND LOGIC
// ========================================================================

#[test]
fn add_sets_overflow_sign_and_aux() {
    // MOV AL,7Fh; ADD AL,1
    let mut vm = setup(&[0xB0, 0x7F, 0x04, 0x01]);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ax.low(), 0x80);
    assert!(vm.cpu.check_flag(Overflow));
    assert!(vm.cpu.check_flag(Sign));
    assert!(vm.cpu.check_flag(AuxCarry));
    assert!(!vm.cpu.check_flag(Carry));
    assert!(!vm.cpu.check_flag(Zero));
}

#[test]
fn adc_and_sbb_use_carry() {
    // STC; ADC AX,0; STC; SBB BX,0
    let mut vm = setup(&[0xF9, 0x15, 0x00, 0x00, 0xF9, 0x83, 0xDB, 0x00]);
    vm.cpu.registers.ax.set(0xFFFF);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ax.word(), 0x0000);
    assert!(vm.cpu.check_flag(Carry));
    assert!(vm.cpu.check_flag(Zero));
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.bx.word(), 0xFFFF);
    assert!(vm.cpu.check_flag(Carry));
}

#[test]
fn cmp_only_touches_flags() {
    // CMP AL,5
    let mut vm = setup(&[0x3C, 0x05]);
    vm.cpu.registers.ax.set_low(0x03);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x03);
    assert!(vm.cpu.check_flag(Carry));
    assert!(vm.cpu.check_flag(Sign));
}

#[test]
fn group_83_sign_extends_immediate() {
    // ADD AX,-1
    let mut vm = setup(&[0x83, 0xC0, 0xFF]);
    vm.cpu.registers.ax.set(0x0010);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0x000F);
    assert!(vm.cpu.check_flag(Carry));
}

#[test]
fn group_80_on_memory() {
    // SUB BYTE [0300h],1
    let mut vm = setup(&[0x80, 0x2E, 0x00, 0x03, 0x01]);
    vm.cpu.write_byte(SegmentType::DS, 0x0300, 0x01).unwrap();
    exec(&mut vm);
    assert_eq!(vm.cpu.read_byte(SegmentType::DS, 0x0300).unwrap(), 0x00);
    assert!(vm.cpu.check_flag(Zero));
    assert_eq!(ip(&vm), 5);
}

#[test]
fn logical_ops_clear_carry_and_overflow_but_keep_aux() {
    // STC; XOR AX,AX
    let mut vm = setup(&[0xF9, 0x31, 0xC0]);
    vm.cpu.set_flag(AuxCarry);
    vm.cpu.set_flag(Overflow);
    vm.cpu.registers.ax.set(0x1234);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ax.word(), 0);
    assert!(vm.cpu.check_flag(Zero));
    assert!(vm.cpu.check_flag(Parity));
    assert!(!vm.cpu.check_flag(Carry));
    assert!(!vm.cpu.check_flag(Overflow));
    assert!(vm.cpu.check_flag(AuxCarry));
}

#[test]
fn test_sets_flags_without_writing() {
    // TEST AL,80h
    let mut vm = setup(&[0xA8, 0x80]);
    vm.cpu.registers.ax.set_low(0x81);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x81);
    assert!(vm.cpu.check_flag(Sign));
    assert!(!vm.cpu.check_flag(Zero));
}

#[test]
fn inc_dec_preserve_carry() {
    // STC; INC AX; DEC BYTE [0200h]
    let mut vm = setup(&[0xF9, 0x40, 0xFE, 0x0E, 0x00, 0x02]);
    vm.cpu.registers.ax.set(0x7FFF);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.ax.word(), 0x8000);
    assert!(vm.cpu.check_flag(Carry));
    assert!(vm.cpu.check_flag(Overflow));
    exec(&mut vm);
    assert_eq!(vm.cpu.read_byte(SegmentType::DS, 0x0200).unwrap(), 0xFF);
    assert!(vm.cpu.check_flag(Carry));
    assert!(vm.cpu.check_flag(AuxCarry));
}

#[test]
fn not_and_neg() {
    // NOT AX; NEG BL
    let mut vm = setup(&[0xF7, 0xD0, 0xF6, 0xDB]);
    vm.cpu.registers.ax.set(0x00FF);
    vm.cpu.registers.bx.set_low(0x01);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0xFF00);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.bx.low(), 0xFF);
    assert!(vm.cpu.check_flag(Carry));
}

#[test]
fn mul_and_imul_report_wide_results() {
    // MUL CL; IMUL BX
    let mut vm = setup(&[0xF6, 0xE1, 0xF7, 0xEB]);
    vm.cpu.registers.ax.set_low(0x80);
    vm.cpu.registers.cx.set_low(0x02);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0x0100);
    assert!(vm.cpu.check_flag(Carry));
    assert!(vm.cpu.check_flag(Overflow));

    vm.cpu.registers.ax.set(0xFFFF);
    vm.cpu.registers.bx.set(0x0002);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0xFFFE);
    assert_eq!(vm.cpu.registers.dx.word(), 0xFFFF);
    assert!(!vm.cpu.check_flag(Carry));
    assert!(!vm.cpu.check_flag(Overflow));
}

#[test]
fn rep_prefix_negates_signed_multiply() {
    // REP IMUL CL
    let mut vm = setup(&[0xF3, 0xF6, 0xE9]);
    vm.cpu.registers.ax.set_low(3);
    vm.cpu.registers.cx.set_low(2);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0xFFFA);
    assert_eq!(vm.repeat, None);
}

#[test]
fn rep_prefix_leaves_unsigned_multiply_and_divide_alone() {
    // REP MUL CL; REP DIV CL
    let mut vm = setup(&[0xF3, 0xF6, 0xE1, 0xF3, 0xF6, 0xF1]);
    vm.cpu.registers.ax.set_low(3);
    vm.cpu.registers.cx.set_low(2);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0x0006);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x03);
    assert_eq!(vm.cpu.registers.ax.high(), 0x00);
}

#[test]
fn div_and_idiv() {
    // DIV BL; IDIV CX
    let mut vm = setup(&[0xF6, 0xF3, 0xF7, 0xF9]);
    vm.cpu.registers.ax.set(0x0107);
    vm.cpu.registers.bx.set_low(0x10);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x10);
    assert_eq!(vm.cpu.registers.ax.high(), 0x07);

    vm.cpu.registers.dx.set(0xFFFF);
    vm.cpu.registers.ax.set(0xFFF9);
    vm.cpu.registers.cx.set(0x0002);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0xFFFD);
    assert_eq!(vm.cpu.registers.dx.word(), 0xFFFF);
}

#[test]
fn divide_by_zero_raises_vector_zero() {
    // DIV CL with CL=0 and nothing at vector 0
    let mut vm = setup(&[0xF6, 0xF1]);
    vm.cpu.registers.ax.set(0x1234);
    assert_eq!(exec(&mut vm), Step::Unhandled { vector: 0, service: None });
    assert_eq!(vm.cpu.registers.ax.word(), 0x1234);
    assert_eq!(ip(&vm), 2);
}

#[test]
fn divide_overflow_vectors_through_the_table() {
    // DIV BL with a quotient that does not fit in AL
    let mut vm = setup(&[0xF6, 0xF3]);
    vm.cpu.write_vector(0, 0x2000, 0x0040).unwrap();
    vm.cpu.registers.ax.set(0x1000);
    vm.cpu.registers.bx.set_low(0x02);
    assert_eq!(exec(&mut vm), Step::Continue);
    assert_eq!(vm.cpu.registers.cs.word(), 0x2000);
    assert_eq!(ip(&vm), 0x0040);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFF8).unwrap(), 0x0002);
}

// ========================================================================
// SHIFTS AND ROTATES
// ========================================================================

#[test]
fn shl_by_one_sets_carry_and_overflow() {
    let mut vm = setup(&[0xD0, 0xE0]);
    vm.cpu.registers.ax.set_low(0x81);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x02);
    assert!(vm.cpu.check_flag(Carry));
    assert!(vm.cpu.check_flag(Overflow));
}

#[test]
fn shr_by_cl() {
    // SHR AX,CL
    let mut vm = setup(&[0xD3, 0xE8]);
    vm.cpu.registers.ax.set(0x8010);
    vm.cpu.registers.cx.set_low(5);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0x0400);
    assert!(vm.cpu.check_flag(Carry));
}

#[test]
fn sar_keeps_the_sign() {
    let mut vm = setup(&[0xD0, 0xF8]);
    vm.cpu.registers.ax.set_low(0x82);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0xC1);
    assert!(!vm.cpu.check_flag(Carry));
    assert!(!vm.cpu.check_flag(Overflow));
}

#[test]
fn rotates_only_touch_carry_and_overflow() {
    // ROL AL,1; RCR AL,1
    let mut vm = setup(&[0xD0, 0xC0, 0xD0, 0xD8]);
    vm.cpu.registers.ax.set_low(0x80);
    vm.cpu.set_flag(Zero);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x01);
    assert!(vm.cpu.check_flag(Carry));
    assert!(vm.cpu.check_flag(Zero));
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x80);
    assert!(vm.cpu.check_flag(Carry));
}

#[test]
fn zero_count_changes_nothing() {
    let mut vm = setup(&[0xD2, 0xE0]);
    vm.cpu.registers.ax.set_low(0x81);
    vm.cpu.registers.cx.set_low(0);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x81);
    assert_eq!(vm.cpu.flags.pack(), 0);
    assert_eq!(ip(&vm), 2);
}

// ========================================================================
// DECIMAL ADJUST
// ========================================================================

#[test]
fn daa_low_nibble_with_aux_carry() {
    let mut vm = setup(&[0x27]);
    vm.cpu.registers.ax.set_low(0x0F);
    vm.cpu.set_flag(AuxCarry);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x15);
    assert!(vm.cpu.check_flag(AuxCarry));
    assert!(!vm.cpu.check_flag(Carry));
}

#[test]
fn daa_applies_both_corrections() {
    let mut vm = setup(&[0x27]);
    vm.cpu.registers.ax.set_low(0x9A);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x00);
    assert!(vm.cpu.check_flag(Carry));
    assert!(vm.cpu.check_flag(AuxCarry));
    assert!(vm.cpu.check_flag(Zero));
}

#[test]
fn das_after_borrow() {
    // MOV AL,10h; SUB AL,1; DAS
    let mut vm = setup(&[0xB0, 0x10, 0x2C, 0x01, 0x2F]);
    exec_n(&mut vm, 3);
    assert_eq!(vm.cpu.registers.ax.low(), 0x09);
    assert!(!vm.cpu.check_flag(Carry));
}

#[test]
fn aaa_carries_into_ah() {
    let mut vm = setup(&[0x37]);
    vm.cpu.registers.ax.set(0x000B);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0x0101);
    assert!(vm.cpu.check_flag(Carry));
}

#[test]
fn aam_and_aad() {
    // AAM; AAD
    let mut vm = setup(&[0xD4, 0x0A, 0xD5, 0x0A]);
    vm.cpu.registers.ax.set_low(63);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 0x0603);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.word(), 63);
}

#[test]
fn aam_zero_base_raises_vector_zero() {
    let mut vm = setup(&[0xD4, 0x00]);
    assert_eq!(exec(&mut vm), Step::Unhandled { vector: 0, service: None });
    assert_eq!(ip(&vm), 2);
}

// ========================================================================
// CONTROL TRANSFER
// ========================================================================

#[test]
fn jc_not_taken_advances_two() {
    let mut vm = setup(&[0x72, 0x10]);
    exec(&mut vm);
    assert_eq!(ip(&vm), 2);
}

#[test]
fn jc_taken_is_relative_to_next_instruction() {
    // JC -2 jumps to itself
    let mut vm = setup(&[0x72, 0xFE]);
    vm.cpu.set_flag(Carry);
    exec(&mut vm);
    assert_eq!(ip(&vm), 0);
}

#[test]
fn signed_conditions_use_sign_xor_overflow() {
    // CMP AX,BX; JL +4
    let mut vm = setup(&[0x39, 0xD8, 0x7C, 0x04]);
    vm.cpu.registers.ax.set(0x8000);
    vm.cpu.registers.bx.set(0x0001);
    exec_n(&mut vm, 2);
    assert_eq!(ip(&vm), 8);
}

#[test]
fn loop_runs_cx_times() {
    // INC DX; LOOP -3
    let mut vm = setup(&[0x42, 0xE2, 0xFD]);
    vm.cpu.registers.cx.set(3);
    exec_n(&mut vm, 6);
    assert_eq!(vm.cpu.registers.dx.word(), 3);
    assert_eq!(vm.cpu.registers.cx.word(), 0);
    assert_eq!(ip(&vm), 3);
}

#[test]
fn jcxz_and_loopnz() {
    // JCXZ +2; ... LOOPNZ
    let mut vm = setup(&[0xE3, 0x02, 0x90, 0x90, 0xE0, 0xFA]);
    exec(&mut vm);
    assert_eq!(ip(&vm), 4);
    vm.cpu.registers.cx.set(2);
    vm.cpu.set_flag(Zero);
    exec(&mut vm);
    assert_eq!(ip(&vm), 6);
    assert_eq!(vm.cpu.registers.cx.word(), 1);
}

#[test]
fn near_call_and_return() {
    // CALL +3; HLT; ...; RET
    let mut vm = setup(&[0xE8, 0x03, 0x00, 0xF4, 0x90, 0x90, 0xC3]);
    exec(&mut vm);
    assert_eq!(ip(&vm), 6);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFFC).unwrap(), 3);
    exec(&mut vm);
    assert_eq!(ip(&vm), 3);
    assert_eq!(vm.cpu.registers.sp.word(), 0xFFFE);
}

#[test]
fn ret_imm_releases_arguments() {
    let mut vm = setup(&[0xC2, 0x04, 0x00]);
    vm.cpu.registers.sp.set(0xFFF8);
    vm.cpu.write_word(SegmentType::SS, 0xFFF8, 0x0040).unwrap();
    exec(&mut vm);
    assert_eq!(ip(&vm), 0x0040);
    assert_eq!(vm.cpu.registers.sp.word(), 0xFFFE);
}

#[test]
fn far_call_and_return() {
    // CALL 1000:0010; ... RETF
    let mut code = vec![0x9A, 0x10, 0x00, 0x00, 0x10];
    code.resize(0x10, 0x90);
    code.push(0xCB);
    let mut vm = setup(&code);
    exec(&mut vm);
    assert_eq!(ip(&vm), 0x0010);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFFA).unwrap(), 5);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFFC).unwrap(), CODE_SEGMENT);
    exec(&mut vm);
    assert_eq!(ip(&vm), 5);
    assert_eq!(vm.cpu.registers.cs.word(), CODE_SEGMENT);
}

#[test]
fn jmp_far_and_indirect() {
    // JMP 2000:0000, then JMP [BX] there
    let mut vm = setup(&[0xEA, 0x00, 0x00, 0x00, 0x20]);
    vm.load_at(0x2000, 0, &[0xFF, 0x27]).unwrap();
    vm.cpu.registers.bx.set(0x0100);
    vm.cpu.write_word(SegmentType::DS, 0x0100, 0x1234).unwrap();
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.registers.cs.word(), 0x2000);
    assert_eq!(ip(&vm), 0x1234);
}

#[test]
fn jmp_short_backwards() {
    let mut vm = setup(&[0x90, 0x90, 0xEB, 0xFC]);
    exec_n(&mut vm, 3);
    assert_eq!(ip(&vm), 0);
}

// ========================================================================
// INTERRUPTS
// ========================================================================

#[test]
fn int_without_handler_or_vector_is_unhandled() {
    let mut vm = setup(&[0xCD, 0x21, 0x90]);
    assert_eq!(exec(&mut vm), Step::Unhandled { vector: 0x21, service: None });
    assert_eq!(ip(&vm), 2);
    assert_eq!(exec(&mut vm), Step::Continue);
}

#[test]
fn int_vectors_through_the_table_and_iret_returns() {
    let mut code = vec![0xCD, 0x80];
    code.resize(0x20, 0x90);
    code.push(0xCF);
    let mut vm = setup(&code);
    vm.cpu.write_vector(0x80, CODE_SEGMENT, 0x0020).unwrap();
    vm.cpu.set_flag(Interrupt);
    vm.cpu.set_flag(Carry);

    exec(&mut vm);
    assert_eq!(ip(&vm), 0x0020);
    assert!(!vm.cpu.check_flag(Interrupt));
    assert_eq!(vm.cpu.registers.sp.word(), 0xFFF8);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFF8).unwrap(), 0x0002);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFFA).unwrap(), CODE_SEGMENT);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, 0xFFFC).unwrap(), 0xF203);

    exec(&mut vm);
    assert_eq!(ip(&vm), 2);
    assert!(vm.cpu.check_flag(Interrupt));
    assert!(vm.cpu.check_flag(Carry));
    assert_eq!(vm.cpu.registers.sp.word(), 0xFFFE);
}

#[test]
fn registered_handler_takes_precedence() {
    let mut vm = setup(&[0xCD, 0x21]);
    vm.cpu.write_vector(0x21, 0x2000, 0x0000).unwrap();
    vm.register_handler(0x21, 0x21, stub(Service::Done));
    assert_eq!(exec(&mut vm), Step::Continue);
    assert_eq!(vm.cpu.registers.ax.low(), 0x5A);
    assert_eq!(vm.cpu.registers.cs.word(), CODE_SEGMENT);
    assert_eq!(ip(&vm), 2);
}

#[test]
fn handler_outcomes_map_to_steps() {
    let mut vm = setup(&[0xB4, 0x99, 0xCD, 0x21, 0xCD, 0x20]);
    vm.register_handler(0x21, 0x21, stub(Service::Unimplemented(0x99)));
    vm.register_handler(0x20, 0x20, stub(Service::Terminate(3)));
    exec(&mut vm);
    assert_eq!(exec(&mut vm), Step::Unhandled { vector: 0x21, service: Some(0x99) });
    assert_eq!(exec(&mut vm), Step::Exited(3));
}

#[test]
fn int3_and_into() {
    // INTO with OF clear; INT3
    let mut vm = setup(&[0xCE, 0xCC]);
    assert_eq!(exec(&mut vm), Step::Continue);
    assert_eq!(exec(&mut vm), Step::Unhandled { vector: 3, service: None });
    assert_eq!(ip(&vm), 2);
}

// ========================================================================
// STRING OPERATIONS
// ========================================================================

#[test]
fn rep_movsb_copies_and_counts_down() {
    let mut vm = setup(&[0xF3, 0xA4]);
    vm.load_at(CODE_SEGMENT, 0x0200, b"hello").unwrap();
    vm.cpu.registers.es.set(0x3000);
    vm.cpu.registers.si.set(0x0200);
    vm.cpu.registers.di.set(0x0000);
    vm.cpu.registers.cx.set(5);
    exec(&mut vm);
    assert_eq!(vm.cpu.memory.slice(0x30000, 5).unwrap(), b"hello");
    assert_eq!(vm.cpu.registers.cx.word(), 0);
    assert_eq!(vm.cpu.registers.si.word(), 0x0205);
    assert_eq!(vm.cpu.registers.di.word(), 0x0005);
    assert_eq!(ip(&vm), 2);
}

#[test]
fn rep_with_zero_count_does_nothing() {
    let mut vm = setup(&[0xF3, 0xAA]);
    vm.cpu.registers.di.set(0x0300);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.di.word(), 0x0300);
    assert_eq!(vm.cpu.read_byte(SegmentType::ES, 0x0300).unwrap(), 0);
}

#[test]
fn stosw_backwards_with_direction_flag() {
    // STD; STOSW
    let mut vm = setup(&[0xFD, 0xAB]);
    vm.cpu.registers.ax.set(0xA55A);
    vm.cpu.registers.di.set(0x0300);
    exec_n(&mut vm, 2);
    assert_eq!(vm.cpu.read_word(SegmentType::ES, 0x0300).unwrap(), 0xA55A);
    assert_eq!(vm.cpu.registers.di.word(), 0x02FE);
}

#[test]
fn repne_scasb_stops_on_match() {
    let mut vm = setup(&[0xF2, 0xAE]);
    vm.load_at(CODE_SEGMENT, 0x0400, b"abc$def").unwrap();
    vm.cpu.registers.ax.set_low(b'$');
    vm.cpu.registers.di.set(0x0400);
    vm.cpu.registers.cx.set(0x0010);
    exec(&mut vm);
    assert!(vm.cpu.check_flag(Zero));
    assert_eq!(vm.cpu.registers.di.word(), 0x0404);
    assert_eq!(vm.cpu.registers.cx.word(), 0x000C);
}

#[test]
fn repe_cmpsb_stops_on_mismatch() {
    let mut vm = setup(&[0xF3, 0xA6]);
    vm.load_at(CODE_SEGMENT, 0x0500, b"abcx").unwrap();
    vm.load_at(CODE_SEGMENT, 0x0600, b"abcy").unwrap();
    vm.cpu.registers.si.set(0x0500);
    vm.cpu.registers.di.set(0x0600);
    vm.cpu.registers.cx.set(4);
    exec(&mut vm);
    assert!(!vm.cpu.check_flag(Zero));
    assert!(vm.cpu.check_flag(Carry));
    assert_eq!(vm.cpu.registers.cx.word(), 0);
    assert_eq!(vm.cpu.registers.si.word(), 0x0504);
}

#[test]
fn lodsb_with_segment_override() {
    // CS: LODSB
    let mut vm = setup(&[0x2E, 0xAC]);
    vm.cpu.registers.ds.set(0);
    vm.cpu.registers.si.set(0x0000);
    exec(&mut vm);
    assert_eq!(vm.cpu.registers.ax.low(), 0x2E);
    assert_eq!(vm.cpu.registers.si.word(), 1);
}

// ========================================================================
// PROCESSOR CONTROL AND ILLEGAL ENCODINGS
// ========================================================================

#[test]
fn escape_decodes_its_operand_and_does_nothing() {
    // ESC 0,AL; ESC 0,[0100h]
    let mut vm = setup(&[0xD8, 0xC0, 0xD8, 0x06, 0x00, 0x01]);
    vm.cpu.registers.ax.set(0x1234);
    exec(&mut vm);
    assert_eq!(ip(&vm), 2);
    exec(&mut vm);
    assert_eq!(ip(&vm), 6);
    assert_eq!(vm.cpu.registers.ax.word(), 0x1234);
    assert_eq!(vm.cpu.flags.pack(), 0);
}

#[test]
fn flag_instructions() {
    // STC; CMC; STD; STI; CLD
    let mut vm = setup(&[0xF9, 0xF5, 0xFD, 0xFB, 0xFC]);
    exec_n(&mut vm, 2);
    assert!(!vm.cpu.check_flag(Carry));
    exec_n(&mut vm, 3);
    assert!(vm.cpu.check_flag(Interrupt));
    assert!(!vm.cpu.check_flag(Directional));
}

#[test]
fn undefined_opcode_is_reported_without_side_effects() {
    let mut vm = setup(&[0x0F, 0x00]);
    vm.cpu.registers.ax.set(0x4321);
    match vm.step() {
        Err(CpuError::IllegalInstruction { opcode, cs, ip }) => {
            assert_eq!(opcode, 0x0F);
            assert_eq!(cs, CODE_SEGMENT);
            assert_eq!(ip, 0);
        }
        other => panic!("expected an illegal instruction, got {:?}", other),
    }
    assert_eq!(ip(&vm), 0);
    assert_eq!(vm.cpu.registers.ax.word(), 0x4321);
    assert_eq!(vm.instruction_count, 0);
}

#[test]
fn illegal_after_prefix_points_at_the_prefix() {
    let mut vm = setup(&[0x90, 0x26, 0xF3, 0xC0]);
    exec(&mut vm);
    let err = vm.step().unwrap_err();
    assert!(matches!(err, CpuError::IllegalInstruction { opcode: 0xC0, ip: 1, .. }));
    assert_eq!(ip(&vm), 1);
    assert_eq!(vm.segment_override, None);
    assert_eq!(vm.repeat, None);
}

#[test]
fn undefined_group_encodings_are_illegal() {
    let cases: [&[u8]; 7] = [
        &[0xFE, 0xD0],       // FE /2
        &[0xFF, 0xF8],       // FF /7
        &[0xFF, 0xD8],       // CALL far with a register operand
        &[0x8D, 0xC0],       // LEA with a register operand
        &[0xC4, 0xC0],       // LES with a register operand
        &[0x8E, 0xE0],       // MOV to a segment register that does not exist
        &[0xC6, 0x08, 0x00], // C6 /1
    ];
    for code in cases {
        let mut vm = setup(code);
        let err = vm.step().unwrap_err();
        assert!(
            matches!(err, CpuError::IllegalInstruction { opcode, ip: 0, .. } if opcode == code[0]),
            "{:02X?}",
            code
        );
        assert_eq!(ip(&vm), 0);
    }
}

#[test]
fn halt_stops_the_machine() {
    let mut vm = setup(&[0xF4, 0x40]);
    assert_eq!(exec(&mut vm), Step::Halted);
    assert_eq!(exec(&mut vm), Step::Halted);
    assert_eq!(vm.cpu.registers.ax.word(), 0);
    assert_eq!(ip(&vm), 1);
}

#[test]
fn run_stops_on_halt() {
    let mut vm = setup(&[0x40, 0x40, 0xF4]);
    assert_eq!(vm.run(None).unwrap(), Outcome::Halted);
    assert_eq!(vm.cpu.registers.ax.word(), 2);
    assert_eq!(vm.instruction_count, 3);
}

#[test]
fn run_honours_the_instruction_limit() {
    let mut vm = setup(&[0xEB, 0xFE]);
    assert_eq!(vm.run(Some(10)).unwrap(), Outcome::LimitReached);
    assert_eq!(vm.instruction_count, 10);
}

#[test]
fn run_continues_past_unhandled_interrupts() {
    let mut vm = setup(&[0xCD, 0x10, 0xCD, 0x20]);
    vm.register_handler(0x20, 0x20, stub(Service::Terminate(7)));
    assert_eq!(vm.run(None).unwrap(), Outcome::Exited(7));
}

#[test]
fn segment_of_prefixes_does_not_hang_a_step() {
    let mut vm = setup(&vec![0x26; 0x1_0000]);
    assert_eq!(exec(&mut vm), Step::Continue);
    assert_eq!(ip(&vm), MAX_PREFIX_RUN as u16);
    assert_eq!(vm.run(Some(100)).unwrap(), Outcome::LimitReached);
}

#[test]
fn long_prefix_run_still_applies_to_its_instruction() {
    let mut code = vec![0x26; MAX_PREFIX_RUN + 4];
    code.extend_from_slice(&[0xA0, 0x04, 0x00]); // MOV AL,[0004]
    let mut vm = setup(&code);
    vm.cpu.registers.es.set(0x3000);
    vm.cpu.memory.write_byte(0x30004, 0x5A).unwrap();
    assert_eq!(exec(&mut vm), Step::Continue);
    assert_eq!(vm.cpu.registers.ax.low(), 0x00);
    assert_eq!(exec(&mut vm), Step::Continue);
    assert_eq!(vm.cpu.registers.ax.low(), 0x5A);
    assert_eq!(ip(&vm) as usize, code.len());
    assert_eq!(vm.instruction_count, 2);
}

#[test]
fn illegal_opcode_after_long_prefix_run_reports_the_first_prefix() {
    let mut code = vec![0x2E; MAX_PREFIX_RUN + 1];
    code.push(0x0F);
    let mut vm = setup(&code);
    exec(&mut vm);
    assert!(matches!(
        vm.step(),
        Err(CpuError::IllegalInstruction { opcode: 0x0F, ip: 0, .. })
    ));
    assert_eq!(ip(&vm), 0);
}

#[test]
fn run_propagates_faults() {
    let mut vm = setup(&[0x40, 0x63]);
    assert!(matches!(
        vm.run(None),
        Err(CpuError::IllegalInstruction { opcode: 0x63, ip: 1, .. })
    ));
    assert_eq!(vm.cpu.registers.ax.word(), 1);
}

// ========================================================================
// PROGRAM LOADING
// ========================================================================

#[test]
fn load_program_builds_the_prefix_and_registers() {
    let mut vm = Runtime::new();
    vm.load_program(&[0xB4, 0x4C, 0xCD, 0x21]).unwrap();
    let registers = &vm.cpu.registers;
    assert_eq!(registers.cs.word(), LOAD_SEGMENT);
    assert_eq!(registers.ds.word(), LOAD_SEGMENT);
    assert_eq!(registers.es.word(), LOAD_SEGMENT);
    assert_eq!(registers.ss.word(), LOAD_SEGMENT);
    assert_eq!(registers.pc.word(), LOAD_OFFSET);
    assert_eq!(registers.sp.word(), INITIAL_SP);
    assert_eq!(vm.cpu.read_byte(SegmentType::CS, LOAD_OFFSET).unwrap(), 0xB4);
    assert_eq!(vm.cpu.read_word(SegmentType::DS, 0x0000).unwrap(), 0x20CD);
    assert_eq!(vm.cpu.read_word(SegmentType::DS, 0x0080).unwrap(), 0x0D00);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, INITIAL_SP).unwrap(), 0x0000);
}

#[test]
fn ret_from_program_reaches_int_20() {
    let mut vm = Runtime::new();
    vm.register_handler(0x20, 0x20, stub(Service::Terminate(0)));
    vm.load_program(&[0xC3]).unwrap();
    assert_eq!(vm.run(Some(100)).unwrap(), Outcome::Exited(0));
    assert_eq!(vm.instruction_count, 2);
}

#[test]
fn oversized_program_is_rejected() {
    let mut vm = Runtime::new();
    let program = vec![0x90; MAX_PROGRAM_SIZE + 1];
    assert!(matches!(
        vm.load_program(&program),
        Err(CpuError::ProgramTooLarge { size: 0xFEFF })
    ));
}

#[test]
fn largest_program_keeps_its_tail_below_the_stack() {
    let mut vm = Runtime::new();
    let mut program = vec![0x90; MAX_PROGRAM_SIZE];
    program[MAX_PROGRAM_SIZE - 2..].copy_from_slice(&[0xF4, 0xF4]);
    vm.load_program(&program).unwrap();
    assert_eq!(vm.cpu.read_word(SegmentType::CS, 0xFFFC).unwrap(), 0xF4F4);
    assert_eq!(vm.cpu.read_word(SegmentType::SS, INITIAL_SP).unwrap(), 0x0000);
}

#[test]
fn reset_restores_power_on_state() {
    let mut vm = setup(&[0x40, 0xF4]);
    exec_n(&mut vm, 1);
    exec(&mut vm);
    vm.reset();
    assert!(!vm.cpu.halted);
    assert_eq!(vm.cpu.registers.cs.word(), 0xFFFF);
    assert_eq!(vm.cpu.registers.ds.word(), 0);
    assert_eq!(vm.cpu.registers.pc.word(), 0);
    assert_eq!(vm.cpu.registers.ax.word(), 0);
    assert_eq!(vm.instruction_count, 0);
    assert_eq!(vm.cpu.read_byte(SegmentType::DS, 0).unwrap(), 0x00);
}
