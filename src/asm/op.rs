//! 6502 opcode tables.
//!
//! Each [`Op`] is one (mnemonic, addressing mode) pair the backend can
//! emit: the official instruction set, the stable illegal opcodes the
//! peephole rewriter produces, `Long` pseudo-modes for out-of-range
//! conditional branches, and a handful of assembler pseudo-ops that
//! expand during byte emission.

use bitflags::bitflags;

/// Instruction mnemonics, including assembler pseudo-mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum OpName {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    // Stable illegals.
    Alr, Anc, Dcp, Isc, Lax, Rla, Rra, Slo, Sre, Skb, Ign,
    // Assembler pseudo-ops.
    Label, Pruned, Data, StoreC, StoreZ, StoreN, BankedYJsr, BankedYJmp,
    AsmXSwitch, AsmYSwitch,
}

/// Addressing modes, plus the `Long` pseudo-mode (an inverted branch
/// over an absolute jump).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum AddrMode {
    Implied,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
    Long,
}

impl AddrMode {
    /// Operand bytes following the opcode byte.
    pub const fn operand_size(self) -> u8 {
        match self {
            AddrMode::Implied => 0,
            AddrMode::Immediate
            | AddrMode::Relative
            | AddrMode::ZeroPage
            | AddrMode::ZeroPageX
            | AddrMode::ZeroPageY
            | AddrMode::IndirectX
            | AddrMode::IndirectY => 1,
            AddrMode::Absolute
            | AddrMode::AbsoluteX
            | AddrMode::AbsoluteY
            | AddrMode::Indirect => 2,
            AddrMode::Long => 4,
        }
    }

    /// Does the operand reference memory?
    pub const fn touches_mem(self) -> bool {
        matches!(
            self,
            AddrMode::ZeroPage
                | AddrMode::ZeroPageX
                | AddrMode::ZeroPageY
                | AddrMode::Absolute
                | AddrMode::AbsoluteX
                | AddrMode::AbsoluteY
                | AddrMode::Indirect
                | AddrMode::IndirectX
                | AddrMode::IndirectY
        )
    }
}

bitflags! {
    /// Static per-op properties.
    pub struct OpFlags: u8 {
        /// Conditional branch, relative or long.
        const BRANCH = 1 << 0;
        /// Unconditional transfer of control.
        const JUMP = 1 << 1;
        const RETURN = 1 << 2;
        /// Table dispatch; a jump that is not a return even without a
        /// label operand.
        const SWITCH = 1 << 3;
        /// Cannot reach byte emission without expanding first.
        const FAKE = 1 << 4;
    }
}

bitflags! {
    /// Registers an op reads or writes. Memory participation comes
    /// from the addressing mode; only the carry is tracked among the
    /// status flags.
    pub struct Regs: u8 {
        const A = 1 << 0;
        const X = 1 << 1;
        const Y = 1 << 2;
        const C = 1 << 3;
    }
}

macro_rules! define_ops {
    ($($variant:ident = ($name:ident, $mode:ident, $code:expr);)+) => {
        /// Every emittable (mnemonic, addressing mode) pair.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
        #[repr(u16)]
        pub enum Op {
            $($variant),+
        }

        impl Op {
            pub const fn name(self) -> OpName {
                match self {
                    $(Op::$variant => OpName::$name),+
                }
            }

            pub const fn addr_mode(self) -> AddrMode {
                match self {
                    $(Op::$variant => AddrMode::$mode),+
                }
            }

            /// The opcode byte. Meaningless for pseudo-ops and long
            /// branches, which never emit their own code byte.
            pub const fn code(self) -> u8 {
                match self {
                    $(Op::$variant => $code),+
                }
            }
        }

        /// Look up the op for a (mnemonic, addressing mode) pair.
        pub const fn get_op(name: OpName, mode: AddrMode) -> Option<Op> {
            match (name, mode) {
                $((OpName::$name, AddrMode::$mode) => Some(Op::$variant),)+
                _ => None,
            }
        }
    };
}

define_ops! {
    AdcImmediate = (Adc, Immediate, 0x69);
    AdcZeroPage = (Adc, ZeroPage, 0x65);
    AdcZeroPageX = (Adc, ZeroPageX, 0x75);
    AdcAbsolute = (Adc, Absolute, 0x6D);
    AdcAbsoluteX = (Adc, AbsoluteX, 0x7D);
    AdcAbsoluteY = (Adc, AbsoluteY, 0x79);
    AdcIndirectX = (Adc, IndirectX, 0x61);
    AdcIndirectY = (Adc, IndirectY, 0x71);
    AndImmediate = (And, Immediate, 0x29);
    AndZeroPage = (And, ZeroPage, 0x25);
    AndZeroPageX = (And, ZeroPageX, 0x35);
    AndAbsolute = (And, Absolute, 0x2D);
    AndAbsoluteX = (And, AbsoluteX, 0x3D);
    AndAbsoluteY = (And, AbsoluteY, 0x39);
    AndIndirectX = (And, IndirectX, 0x21);
    AndIndirectY = (And, IndirectY, 0x31);
    AslImplied = (Asl, Implied, 0x0A);
    AslZeroPage = (Asl, ZeroPage, 0x06);
    AslZeroPageX = (Asl, ZeroPageX, 0x16);
    AslAbsolute = (Asl, Absolute, 0x0E);
    AslAbsoluteX = (Asl, AbsoluteX, 0x1E);
    BccRelative = (Bcc, Relative, 0x90);
    BccLong = (Bcc, Long, 0x90);
    BcsRelative = (Bcs, Relative, 0xB0);
    BcsLong = (Bcs, Long, 0xB0);
    BeqRelative = (Beq, Relative, 0xF0);
    BeqLong = (Beq, Long, 0xF0);
    BitZeroPage = (Bit, ZeroPage, 0x24);
    BitAbsolute = (Bit, Absolute, 0x2C);
    BmiRelative = (Bmi, Relative, 0x30);
    BmiLong = (Bmi, Long, 0x30);
    BneRelative = (Bne, Relative, 0xD0);
    BneLong = (Bne, Long, 0xD0);
    BplRelative = (Bpl, Relative, 0x10);
    BplLong = (Bpl, Long, 0x10);
    BrkImplied = (Brk, Implied, 0x00);
    BvcRelative = (Bvc, Relative, 0x50);
    BvcLong = (Bvc, Long, 0x50);
    BvsRelative = (Bvs, Relative, 0x70);
    BvsLong = (Bvs, Long, 0x70);
    ClcImplied = (Clc, Implied, 0x18);
    CldImplied = (Cld, Implied, 0xD8);
    CliImplied = (Cli, Implied, 0x58);
    ClvImplied = (Clv, Implied, 0xB8);
    CmpImmediate = (Cmp, Immediate, 0xC9);
    CmpZeroPage = (Cmp, ZeroPage, 0xC5);
    CmpZeroPageX = (Cmp, ZeroPageX, 0xD5);
    CmpAbsolute = (Cmp, Absolute, 0xCD);
    CmpAbsoluteX = (Cmp, AbsoluteX, 0xDD);
    CmpAbsoluteY = (Cmp, AbsoluteY, 0xD9);
    CmpIndirectX = (Cmp, IndirectX, 0xC1);
    CmpIndirectY = (Cmp, IndirectY, 0xD1);
    CpxImmediate = (Cpx, Immediate, 0xE0);
    CpxZeroPage = (Cpx, ZeroPage, 0xE4);
    CpxAbsolute = (Cpx, Absolute, 0xEC);
    CpyImmediate = (Cpy, Immediate, 0xC0);
    CpyZeroPage = (Cpy, ZeroPage, 0xC4);
    CpyAbsolute = (Cpy, Absolute, 0xCC);
    DecZeroPage = (Dec, ZeroPage, 0xC6);
    DecZeroPageX = (Dec, ZeroPageX, 0xD6);
    DecAbsolute = (Dec, Absolute, 0xCE);
    DecAbsoluteX = (Dec, AbsoluteX, 0xDE);
    DexImplied = (Dex, Implied, 0xCA);
    DeyImplied = (Dey, Implied, 0x88);
    EorImmediate = (Eor, Immediate, 0x49);
    EorZeroPage = (Eor, ZeroPage, 0x45);
    EorZeroPageX = (Eor, ZeroPageX, 0x55);
    EorAbsolute = (Eor, Absolute, 0x4D);
    EorAbsoluteX = (Eor, AbsoluteX, 0x5D);
    EorAbsoluteY = (Eor, AbsoluteY, 0x59);
    EorIndirectX = (Eor, IndirectX, 0x41);
    EorIndirectY = (Eor, IndirectY, 0x51);
    IncZeroPage = (Inc, ZeroPage, 0xE6);
    IncZeroPageX = (Inc, ZeroPageX, 0xF6);
    IncAbsolute = (Inc, Absolute, 0xEE);
    IncAbsoluteX = (Inc, AbsoluteX, 0xFE);
    InxImplied = (Inx, Implied, 0xE8);
    InyImplied = (Iny, Implied, 0xC8);
    JmpAbsolute = (Jmp, Absolute, 0x4C);
    JmpIndirect = (Jmp, Indirect, 0x6C);
    JsrAbsolute = (Jsr, Absolute, 0x20);
    LdaImmediate = (Lda, Immediate, 0xA9);
    LdaZeroPage = (Lda, ZeroPage, 0xA5);
    LdaZeroPageX = (Lda, ZeroPageX, 0xB5);
    LdaAbsolute = (Lda, Absolute, 0xAD);
    LdaAbsoluteX = (Lda, AbsoluteX, 0xBD);
    LdaAbsoluteY = (Lda, AbsoluteY, 0xB9);
    LdaIndirectX = (Lda, IndirectX, 0xA1);
    LdaIndirectY = (Lda, IndirectY, 0xB1);
    LdxImmediate = (Ldx, Immediate, 0xA2);
    LdxZeroPage = (Ldx, ZeroPage, 0xA6);
    LdxZeroPageY = (Ldx, ZeroPageY, 0xB6);
    LdxAbsolute = (Ldx, Absolute, 0xAE);
    LdxAbsoluteY = (Ldx, AbsoluteY, 0xBE);
    LdyImmediate = (Ldy, Immediate, 0xA0);
    LdyZeroPage = (Ldy, ZeroPage, 0xA4);
    LdyZeroPageX = (Ldy, ZeroPageX, 0xB4);
    LdyAbsolute = (Ldy, Absolute, 0xAC);
    LdyAbsoluteX = (Ldy, AbsoluteX, 0xBC);
    LsrImplied = (Lsr, Implied, 0x4A);
    LsrZeroPage = (Lsr, ZeroPage, 0x46);
    LsrZeroPageX = (Lsr, ZeroPageX, 0x56);
    LsrAbsolute = (Lsr, Absolute, 0x4E);
    LsrAbsoluteX = (Lsr, AbsoluteX, 0x5E);
    NopImplied = (Nop, Implied, 0xEA);
    OraImmediate = (Ora, Immediate, 0x09);
    OraZeroPage = (Ora, ZeroPage, 0x05);
    OraZeroPageX = (Ora, ZeroPageX, 0x15);
    OraAbsolute = (Ora, Absolute, 0x0D);
    OraAbsoluteX = (Ora, AbsoluteX, 0x1D);
    OraAbsoluteY = (Ora, AbsoluteY, 0x19);
    OraIndirectX = (Ora, IndirectX, 0x01);
    OraIndirectY = (Ora, IndirectY, 0x11);
    PhaImplied = (Pha, Implied, 0x48);
    PhpImplied = (Php, Implied, 0x08);
    PlaImplied = (Pla, Implied, 0x68);
    PlpImplied = (Plp, Implied, 0x28);
    RolImplied = (Rol, Implied, 0x2A);
    RolZeroPage = (Rol, ZeroPage, 0x26);
    RolZeroPageX = (Rol, ZeroPageX, 0x36);
    RolAbsolute = (Rol, Absolute, 0x2E);
    RolAbsoluteX = (Rol, AbsoluteX, 0x3E);
    RorImplied = (Ror, Implied, 0x6A);
    RorZeroPage = (Ror, ZeroPage, 0x66);
    RorZeroPageX = (Ror, ZeroPageX, 0x76);
    RorAbsolute = (Ror, Absolute, 0x6E);
    RorAbsoluteX = (Ror, AbsoluteX, 0x7E);
    RtiImplied = (Rti, Implied, 0x40);
    RtsImplied = (Rts, Implied, 0x60);
    SbcImmediate = (Sbc, Immediate, 0xE9);
    SbcZeroPage = (Sbc, ZeroPage, 0xE5);
    SbcZeroPageX = (Sbc, ZeroPageX, 0xF5);
    SbcAbsolute = (Sbc, Absolute, 0xED);
    SbcAbsoluteX = (Sbc, AbsoluteX, 0xFD);
    SbcAbsoluteY = (Sbc, AbsoluteY, 0xF9);
    SbcIndirectX = (Sbc, IndirectX, 0xE1);
    SbcIndirectY = (Sbc, IndirectY, 0xF1);
    SecImplied = (Sec, Implied, 0x38);
    SedImplied = (Sed, Implied, 0xF8);
    SeiImplied = (Sei, Implied, 0x78);
    StaZeroPage = (Sta, ZeroPage, 0x85);
    StaZeroPageX = (Sta, ZeroPageX, 0x95);
    StaAbsolute = (Sta, Absolute, 0x8D);
    StaAbsoluteX = (Sta, AbsoluteX, 0x9D);
    StaAbsoluteY = (Sta, AbsoluteY, 0x99);
    StaIndirectX = (Sta, IndirectX, 0x81);
    StaIndirectY = (Sta, IndirectY, 0x91);
    StxZeroPage = (Stx, ZeroPage, 0x86);
    StxZeroPageY = (Stx, ZeroPageY, 0x96);
    StxAbsolute = (Stx, Absolute, 0x8E);
    StyZeroPage = (Sty, ZeroPage, 0x84);
    StyZeroPageX = (Sty, ZeroPageX, 0x94);
    StyAbsolute = (Sty, Absolute, 0x8C);
    TaxImplied = (Tax, Implied, 0xAA);
    TayImplied = (Tay, Implied, 0xA8);
    TsxImplied = (Tsx, Implied, 0xBA);
    TxaImplied = (Txa, Implied, 0x8A);
    TxsImplied = (Txs, Implied, 0x9A);
    TyaImplied = (Tya, Implied, 0x98);
    AlrImmediate = (Alr, Immediate, 0x4B);
    AncImmediate = (Anc, Immediate, 0x0B);
    DcpZeroPage = (Dcp, ZeroPage, 0xC7);
    DcpZeroPageX = (Dcp, ZeroPageX, 0xD7);
    DcpAbsolute = (Dcp, Absolute, 0xCF);
    DcpAbsoluteX = (Dcp, AbsoluteX, 0xDF);
    DcpAbsoluteY = (Dcp, AbsoluteY, 0xDB);
    DcpIndirectX = (Dcp, IndirectX, 0xC3);
    DcpIndirectY = (Dcp, IndirectY, 0xD3);
    IscZeroPage = (Isc, ZeroPage, 0xE7);
    IscZeroPageX = (Isc, ZeroPageX, 0xF7);
    IscAbsolute = (Isc, Absolute, 0xEF);
    IscAbsoluteX = (Isc, AbsoluteX, 0xFF);
    IscAbsoluteY = (Isc, AbsoluteY, 0xFB);
    IscIndirectX = (Isc, IndirectX, 0xE3);
    IscIndirectY = (Isc, IndirectY, 0xF3);
    LaxZeroPage = (Lax, ZeroPage, 0xA7);
    LaxZeroPageY = (Lax, ZeroPageY, 0xB7);
    LaxAbsolute = (Lax, Absolute, 0xAF);
    LaxAbsoluteY = (Lax, AbsoluteY, 0xBF);
    LaxIndirectX = (Lax, IndirectX, 0xA3);
    LaxIndirectY = (Lax, IndirectY, 0xB3);
    RlaZeroPage = (Rla, ZeroPage, 0x27);
    RlaZeroPageX = (Rla, ZeroPageX, 0x37);
    RlaAbsolute = (Rla, Absolute, 0x2F);
    RlaAbsoluteX = (Rla, AbsoluteX, 0x3F);
    RlaAbsoluteY = (Rla, AbsoluteY, 0x3B);
    RlaIndirectX = (Rla, IndirectX, 0x23);
    RlaIndirectY = (Rla, IndirectY, 0x33);
    RraZeroPage = (Rra, ZeroPage, 0x67);
    RraZeroPageX = (Rra, ZeroPageX, 0x77);
    RraAbsolute = (Rra, Absolute, 0x6F);
    RraAbsoluteX = (Rra, AbsoluteX, 0x7F);
    RraAbsoluteY = (Rra, AbsoluteY, 0x7B);
    RraIndirectX = (Rra, IndirectX, 0x63);
    RraIndirectY = (Rra, IndirectY, 0x73);
    SloZeroPage = (Slo, ZeroPage, 0x07);
    SloZeroPageX = (Slo, ZeroPageX, 0x17);
    SloAbsolute = (Slo, Absolute, 0x0F);
    SloAbsoluteX = (Slo, AbsoluteX, 0x1F);
    SloAbsoluteY = (Slo, AbsoluteY, 0x1B);
    SloIndirectX = (Slo, IndirectX, 0x03);
    SloIndirectY = (Slo, IndirectY, 0x13);
    SreZeroPage = (Sre, ZeroPage, 0x47);
    SreZeroPageX = (Sre, ZeroPageX, 0x57);
    SreAbsolute = (Sre, Absolute, 0x4F);
    SreAbsoluteX = (Sre, AbsoluteX, 0x5F);
    SreAbsoluteY = (Sre, AbsoluteY, 0x5B);
    SreIndirectX = (Sre, IndirectX, 0x43);
    SreIndirectY = (Sre, IndirectY, 0x53);
    // Single-byte skips: NOP immediate / NOP absolute emitting only the
    // opcode byte, so the following one or two bytes become the operand.
    SkbImplied = (Skb, Implied, 0x80);
    IgnImplied = (Ign, Implied, 0x0C);
    AsmLabel = (Label, Implied, 0x00);
    AsmPruned = (Pruned, Implied, 0x00);
    AsmData = (Data, Implied, 0x00);
    StoreCAbsolute = (StoreC, Absolute, 0x00);
    StoreZAbsolute = (StoreZ, Absolute, 0x00);
    StoreNAbsolute = (StoreN, Absolute, 0x00);
    BankedYJsrAbsolute = (BankedYJsr, Absolute, 0x00);
    BankedYJmpAbsolute = (BankedYJmp, Absolute, 0x00);
    AsmXSwitchAbsolute = (AsmXSwitch, Absolute, 0x00);
    AsmYSwitchAbsolute = (AsmYSwitch, Absolute, 0x00);
}

impl Op {
    /// Emitted size in bytes, pseudo-op expansions included.
    pub const fn size(self) -> u8 {
        match self.name() {
            OpName::Label | OpName::Pruned => 0,
            OpName::Data => 1,
            // PHP PHA LDA# ROL STA PLA PLP
            OpName::StoreC => 10,
            // PHP PHA PHP PLA ALR# STA PLA PLP
            OpName::StoreZ => 11,
            // PHP PHA PHP PLA ANC# ROL STA PLA PLP
            OpName::StoreN => 12,
            // LDA# LDX# JSR/JMP
            OpName::BankedYJsr | OpName::BankedYJmp => 7,
            // LDA,x PHA LDA,x PHA RTS
            OpName::AsmXSwitch | OpName::AsmYSwitch => 9,
            OpName::Skb | OpName::Ign => 1,
            _ => 1 + self.addr_mode().operand_size(),
        }
    }

    pub const fn flags(self) -> OpFlags {
        match self.name() {
            OpName::Bcc
            | OpName::Bcs
            | OpName::Beq
            | OpName::Bmi
            | OpName::Bne
            | OpName::Bpl
            | OpName::Bvc
            | OpName::Bvs => OpFlags::BRANCH,
            OpName::Jmp => OpFlags::JUMP,
            OpName::Rts | OpName::Rti => OpFlags::RETURN,
            OpName::Label | OpName::Pruned | OpName::StoreC | OpName::StoreZ
            | OpName::StoreN => OpFlags::FAKE,
            OpName::BankedYJmp => {
                OpFlags::from_bits_truncate(OpFlags::JUMP.bits() | OpFlags::FAKE.bits())
            }
            OpName::BankedYJsr => OpFlags::FAKE,
            OpName::AsmXSwitch | OpName::AsmYSwitch => OpFlags::from_bits_truncate(
                OpFlags::JUMP.bits() | OpFlags::SWITCH.bits() | OpFlags::FAKE.bits(),
            ),
            _ => OpFlags::empty(),
        }
    }

    /// Registers read, the addressing-mode memory operand aside.
    pub const fn input_regs(self) -> Regs {
        use OpName::*;
        match self.name() {
            Adc | Sbc | Rra | Isc => Regs::from_bits_truncate(Regs::A.bits() | Regs::C.bits()),
            And | Ora | Eor | Cmp | Bit | Sta | Pha | Alr | Anc | Dcp | Slo | Sre => Regs::A,
            Rol | Ror | Rla => {
                if matches!(self.addr_mode(), AddrMode::Implied) {
                    Regs::from_bits_truncate(Regs::A.bits() | Regs::C.bits())
                } else {
                    Regs::C
                }
            }
            Asl | Lsr => {
                if matches!(self.addr_mode(), AddrMode::Implied) {
                    Regs::A
                } else {
                    Regs::empty()
                }
            }
            Cpx | Stx | Inx | Dex | Txa | Txs => Regs::X,
            Cpy | Sty | Iny | Dey | Tya => Regs::Y,
            Tax | Tay => Regs::A,
            Bcc | Bcs => Regs::C,
            _ => Regs::empty(),
        }
    }

    /// Registers written, the addressing-mode memory operand aside.
    pub const fn output_regs(self) -> Regs {
        use OpName::*;
        match self.name() {
            Adc | Sbc | Rra | Isc | Alr | Anc => {
                Regs::from_bits_truncate(Regs::A.bits() | Regs::C.bits())
            }
            And | Ora | Eor | Lda | Pla | Txa | Tya => Regs::A,
            Lax => Regs::from_bits_truncate(Regs::A.bits() | Regs::X.bits()),
            Ldx | Inx | Dex | Tax | Tsx => Regs::X,
            Ldy | Iny | Dey | Tay => Regs::Y,
            Cmp | Cpx | Cpy | Clc | Sec | Dcp | Slo | Sre | Plp => Regs::C,
            Asl | Lsr | Rol | Ror | Rla => {
                if matches!(self.addr_mode(), AddrMode::Implied) {
                    Regs::from_bits_truncate(Regs::A.bits() | Regs::C.bits())
                } else {
                    Regs::C
                }
            }
            _ => Regs::empty(),
        }
    }

    pub const fn is_branch(self) -> bool {
        self.flags().contains(OpFlags::BRANCH)
    }

    pub const fn is_relative_branch(self) -> bool {
        self.is_branch() && matches!(self.addr_mode(), AddrMode::Relative)
    }

    pub const fn is_long_branch(self) -> bool {
        self.is_branch() && matches!(self.addr_mode(), AddrMode::Long)
    }
}

/// The branch testing the opposite condition.
pub const fn invert_branch(name: OpName) -> Option<OpName> {
    match name {
        OpName::Bcc => Some(OpName::Bcs),
        OpName::Bcs => Some(OpName::Bcc),
        OpName::Beq => Some(OpName::Bne),
        OpName::Bne => Some(OpName::Beq),
        OpName::Bmi => Some(OpName::Bpl),
        OpName::Bpl => Some(OpName::Bmi),
        OpName::Bvc => Some(OpName::Bvs),
        OpName::Bvs => Some(OpName::Bvc),
        _ => None,
    }
}
