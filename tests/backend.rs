//! End-to-end backend scenarios: select, optimize, place, link, emit.

use famicc::prelude::*;
use famicc::locator::RuntimeRam;
use famicc::rom::{RomRule, Romv};

fn link_ctx(rom: &RomModel) -> LinkCtx<'_> {
    LinkCtx { rom, romv: Romv::Mode, fn_: None, bank: Some(0) }
}

/// A small countdown loop, from instruction list to final bytes.
#[test]
fn assemble_countdown_loop() {
    let loop_label = Locator::minor_label(0);

    let mut proc = AsmProc::default();
    proc.push_inst(Instr::with_arg(Op::LdaImmediate, Locator::const_byte(0x01)));
    proc.push_inst(Instr::with_arg(Op::StaAbsolute, Locator::addr(0x0200)));
    proc.push_inst(Instr::with_arg(Op::AsmLabel, loop_label));
    proc.push_inst(Instr::with_arg(Op::DecZeroPage, Locator::addr(0x10)));
    proc.push_inst(Instr::with_arg(Op::BneRelative, loop_label));
    proc.push_inst(Instr::new(Op::RtsImplied));

    proc.initial_optimize();
    proc.relocate(Locator::addr(0x8000)).unwrap();

    let rom = RomModel::default();
    let mut bytes = Vec::new();
    proc.write_bytes(&mut bytes, &link_ctx(&rom)).unwrap();

    assert_eq!(bytes, [0xA9, 0x01, 0x8D, 0x00, 0x02, 0xC6, 0x10, 0xD0, 0xFC, 0x60]);
}

/// The peephole pipeline rewrites the classic load/step/store and
/// ALR-forming sequences as part of a whole optimization run.
#[test]
fn optimize_pipeline_applies_peepholes() {
    let mut proc = AsmProc::default();
    proc.push_inst(Instr::with_arg(Op::LdxZeroPage, Locator::addr(0x00)));
    proc.push_inst(Instr::new(Op::InxImplied));
    proc.push_inst(Instr::with_arg(Op::StxZeroPage, Locator::addr(0x00)));
    proc.push_inst(Instr::with_arg(Op::LdaImmediate, Locator::const_byte(0x0F)));
    proc.push_inst(Instr::with_arg(Op::AndZeroPage, Locator::addr(0x10)));
    proc.push_inst(Instr::new(Op::LsrImplied));
    proc.push_inst(Instr::new(Op::RtsImplied));

    proc.initial_optimize();

    let kept: Vec<Op> = proc
        .code
        .iter()
        .map(|inst| inst.op)
        .filter(|&op| op != Op::AsmPruned)
        .collect();
    assert_eq!(
        kept,
        [
            Op::IncZeroPage,
            Op::LdxZeroPage,
            Op::LdaZeroPage,
            Op::AlrImmediate,
            Op::RtsImplied,
        ]
    );
}

/// A branch over 200 bytes is promoted to the five-byte long form and
/// emits an inverted branch over an absolute jump.
#[test]
fn far_branch_links_through_long_form() {
    let target = Locator::minor_label(0);

    let mut proc = AsmProc::default();
    proc.push_inst(Instr::with_arg(Op::BeqRelative, target));
    for _ in 0..100 {
        proc.push_inst(Instr::with_arg(Op::StaAbsolute, Locator::addr(0x0200)));
    }
    proc.push_inst(Instr::with_arg(Op::AsmLabel, target));
    proc.push_inst(Instr::new(Op::RtsImplied));

    proc.initial_optimize();
    assert_eq!(proc.code[0].op, Op::BeqLong);

    proc.relocate(Locator::addr(0xC000)).unwrap();
    let rom = RomModel::default();
    let mut bytes = Vec::new();
    proc.write_bytes(&mut bytes, &link_ctx(&rom)).unwrap();

    // BNE +3; JMP $C131. The long form occupies five bytes, the jump
    // target sits past the hundred stores.
    assert_eq!(&bytes[..5], &[0xD0, 0x03, 0x4C, 0x31, 0xC1]);
    assert_eq!(bytes.len(), 5 + 300 + 1);
    assert_eq!(bytes[bytes.len() - 1], 0x60);
}

/// Constant arrays found in SSA are interned, placed, and addressable
/// through rom-array locators, pointer halves and bank bytes included.
#[test]
fn rom_arrays_flow_from_ssa_to_bytes() {
    let ctx = CompilerCtx::new(Options::default());

    let mut ir = Ir::new();
    let cfg = ir.push_cfg();
    let mask = Scalar::U8.mask();
    let table = ir.emplace(
        cfg,
        SsaOp::InitArray,
        mask,
        vec![
            SsaValue::Num(Fixed::whole(0x11)),
            SsaValue::Num(Fixed::whole(0x22)),
            SsaValue::Num(Fixed::whole(0x33)),
        ],
    );
    let user = ir.emplace(cfg, SsaOp::Copy, mask, vec![SsaValue::Id(table)]);

    locate_rom_arrays(&mut ir, ctx.rom_arrays());
    let SsaValue::Loc(array_loc) = ir.node(user).input(0) else {
        panic!("array not replaced by a locator");
    };

    // Freeze the pool and place the array in bank 2 at $A000.
    ctx.advance_phase(Phase::AllocRom);
    let mut rom = RomModel::new(ctx.freeze_rom_arrays().freeze());
    let alloc = rom.add_alloc(RomAlloc::Once {
        bank: 2,
        span: Some(Span { addr: 0xA000, size: 3 }),
    });
    rom.arrays[array_loc.data() as usize].set_alloc(Romv::Mode, alloc);

    // Address a table entry absolutely, and take the pointer pair.
    let mut proc = AsmProc::default();
    proc.push_inst(Instr::with_arg(Op::LdaAbsolute, array_loc.with_advance_offset(1)));
    proc.push_inst(Instr::with_arg(
        Op::LdaImmediate,
        array_loc.with_is(IsSel::Ptr).with_byteified(true),
    ));
    proc.push_inst(Instr::with_arg(
        Op::LdxImmediate,
        array_loc.with_is(IsSel::PtrHi).with_byteified(true),
    ));
    proc.push_inst(Instr::with_arg(
        Op::LdyImmediate,
        array_loc.with_is(IsSel::Bank).with_byteified(true),
    ));

    let ctx = link_ctx(&rom);
    let mut bytes = Vec::new();
    proc.write_bytes(&mut bytes, &ctx).unwrap();

    assert_eq!(
        bytes,
        [
            0xAD, 0x01, 0xA0, // LDA $A001
            0xA9, 0x00, // LDA #<table
            0xA2, 0xA0, // LDX #>table
            0xA0, 0x02, // LDY #bank
        ]
    );
}

/// Interning is stable across duplicate content, so equal tables share
/// one allocation.
#[test]
fn duplicate_arrays_share_storage() {
    let ctx = CompilerCtx::new(Options::default());
    let data: Vec<Locator> = vec![Locator::const_byte(1), Locator::const_byte(2)];
    let a = ctx.intern_rom_array(data.clone(), false, RomRule::Normal, None);
    let b = ctx.intern_rom_array(data, false, RomRule::Normal, None);
    assert_eq!(a, b);
    assert_eq!(ctx.rom_arrays().len(), 1);
}

/// Zero-page runtime scratch gets promoted out of absolute addressing
/// once linking pins it below $0100.
#[test]
fn linking_promotes_runtime_scratch_to_zero_page() {
    let mut rom = RomModel::default();
    rom.set_runtime_ram_span(RuntimeRam::PtrTemp, Romv::Mode, Span { addr: 0x0040, size: 2 });

    let mut proc = AsmProc::default();
    proc.push_inst(Instr::with_arg(Op::LdaAbsolute, Locator::runtime_ram(RuntimeRam::PtrTemp)));
    proc.push_inst(Instr::new(Op::RtsImplied));

    proc.link(&link_ctx(&rom));
    assert_eq!(proc.code[0].op, Op::LdaZeroPage);
    assert_eq!(proc.code[0].arg, Locator::addr(0x0040));

    let mut bytes = Vec::new();
    proc.write_bytes(&mut bytes, &link_ctx(&rom)).unwrap();
    assert_eq!(bytes, [0xA5, 0x40, 0x60]);
}

/// The NROM header scenario, end to end through mapper validation.
#[test]
fn nrom_ines_header() {
    let params = MapperParams {
        mirroring: Some(Mirroring::Horizontal),
        prg_size: 32,
        chr_size: 8,
    };
    let mapper = Mapper::new(MapperKind::Nrom, &params).unwrap();
    let mut header = [0u8; 16];
    write_ines_header(&mut header, &mapper).unwrap();
    assert_eq!(
        header,
        [0x4E, 0x45, 0x53, 0x1A, 0x02, 0x01, 0x00, 0x08, 0, 0, 0, 0, 0, 0, 0, 0]
    );
}
