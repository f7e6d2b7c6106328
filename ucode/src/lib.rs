extern crate strum;
#[macro_use]
extern crate strum_macros;

use std::fmt;

use itertools::Itertools;
use strum::IntoEnumIterator;

use common::*;

use lazy_static::lazy_static;
lazy_static! {
    pub static ref UCODE: MicrocodeTable = MicrocodeTable::reference();
}

#[derive(Clone, Copy, Display, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(EnumCount, EnumIter, EnumString, FromRepr)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum Opcode {
    #[strum(to_string = "NOP")]
    Nop = 0x00,

    #[strum(to_string = "LDAi")]
    LdaImm = 0x01, // A <- imm
    #[strum(to_string = "LDAm")]
    LdaMem = 0x02, // A <- MEM[addr]
    #[strum(to_string = "LDBi")]
    LdbImm = 0x07, // B <- imm
    #[strum(to_string = "LDBm")]
    LdbMem = 0x08, // B <- MEM[addr]

    #[strum(to_string = "STAm")]
    StaMem = 0x10, // MEM[addr] <- A
    #[strum(to_string = "STBm")]
    StbMem = 0x11, // MEM[addr] <- B

    #[strum(to_string = "ADD")]
    Add = 0x20, // A <- A + B
    #[strum(to_string = "ADDi")]
    AddImm = 0x21, // A <- A + imm, clobbers B
    #[strum(to_string = "ADDm")]
    AddMem = 0x22, // A <- A + MEM[addr], clobbers B
    #[strum(to_string = "SUB")]
    Sub = 0x24, // A <- A - B
    #[strum(to_string = "SUBi")]
    SubImm = 0x25,
    #[strum(to_string = "SUBm")]
    SubMem = 0x26,
    #[strum(to_string = "INCA")]
    IncA = 0x28,
    #[strum(to_string = "INCB")]
    IncB = 0x29,

    #[strum(to_string = "XOR")]
    Xor = 0x30, // A <- A ^ B
    #[strum(to_string = "XORi")]
    XorImm = 0x31,
    #[strum(to_string = "XORm")]
    XorMem = 0x32,
    #[strum(to_string = "AND")]
    And = 0x34, // A <- A & B
    #[strum(to_string = "ANDi")]
    AndImm = 0x35,
    #[strum(to_string = "ANDm")]
    AndMem = 0x36,
    #[strum(to_string = "OR")]
    Or = 0x38, // A <- A | B
    #[strum(to_string = "ORi")]
    OrImm = 0x39,
    #[strum(to_string = "ORm")]
    OrMem = 0x3A,
    #[strum(to_string = "NOTA")]
    NotA = 0x3C, // A <- ~A
    #[strum(to_string = "NOTB")]
    NotB = 0x3D, // B <- ~B
    #[strum(to_string = "CLRA")]
    ClrA = 0x3E, // A <- 0
    #[strum(to_string = "CLRB")]
    ClrB = 0x3F, // B <- 0

    #[strum(to_string = "JMPi")]
    JmpImm = 0x40, // PC <- imm
    #[strum(to_string = "JMPm")]
    JmpMem = 0x41, // PC <- MEM[addr]

    #[strum(to_string = "OUTA")]
    OutA = 0x50,
    #[strum(to_string = "OUTB")]
    OutB = 0x51,
    #[strum(to_string = "OUTi")]
    OutImm = 0x54,
    #[strum(to_string = "OUTm")]
    OutMem = 0x55,

    #[strum(to_string = "MOVi")]
    MovImm = 0x60, // MEM[addr] <- imm, via B
    #[strum(to_string = "MOVm")]
    MovMem = 0x61, // MEM[addr2] <- MEM[addr1], via B

    #[strum(to_string = "HLT")]
    Hlt = 0xFF,
}

impl Opcode {
    pub fn operand_bytes(&self) -> u8 {
        match self {
            Opcode::Nop
            | Opcode::Add
            | Opcode::Sub
            | Opcode::IncA
            | Opcode::IncB
            | Opcode::Xor
            | Opcode::And
            | Opcode::Or
            | Opcode::NotA
            | Opcode::NotB
            | Opcode::ClrA
            | Opcode::ClrB
            | Opcode::OutA
            | Opcode::OutB
            | Opcode::Hlt => 0,
            Opcode::MovImm | Opcode::MovMem => 2,
            _ => 1,
        }
    }

    /// Steps after the fetch cycle, ending with `RSC`.
    pub fn steps(&self) -> Vec<Signals> {
        use Signals as S;

        match self {
            Opcode::Nop => vec![S::RSC],

            Opcode::LdaImm => immediate(S::MO | S::CE | S::AI),
            Opcode::LdaMem => memory(S::MO | S::AI | S::CE),
            Opcode::LdbImm => immediate(S::MO | S::CE | S::BI),
            Opcode::LdbMem => memory(S::MO | S::BI | S::CE),

            Opcode::StaMem => memory(S::AO | S::MI | S::CE),
            Opcode::StbMem => memory(S::BO | S::MI | S::CE),

            Opcode::Add => alu_register(AluFunction::Add),
            Opcode::AddImm => alu_immediate(AluFunction::Add),
            Opcode::AddMem => alu_memory(AluFunction::Add),
            Opcode::Sub => alu_register(AluFunction::Subtract),
            Opcode::SubImm => alu_immediate(AluFunction::Subtract),
            Opcode::SubMem => alu_memory(AluFunction::Subtract),
            Opcode::IncA => vec![
                S::AO | S::BI,
                alu(AluFunction::Ones) | S::AI,
                alu(AluFunction::Add) | S::AI,
                S::AO | S::BI,
                S::RSC,
            ],
            Opcode::IncB => vec![
                alu(AluFunction::Ones) | S::AI,
                alu(AluFunction::Add) | S::AI,
                S::AO | S::BI,
                S::RSC,
            ],

            Opcode::Xor => alu_register(AluFunction::Xor),
            Opcode::XorImm => alu_immediate(AluFunction::Xor),
            Opcode::XorMem => alu_memory(AluFunction::Xor),
            Opcode::And => alu_register(AluFunction::And),
            Opcode::AndImm => alu_immediate(AluFunction::And),
            Opcode::AndMem => alu_memory(AluFunction::And),
            Opcode::Or => alu_register(AluFunction::Or),
            Opcode::OrImm => alu_immediate(AluFunction::Or),
            Opcode::OrMem => alu_memory(AluFunction::Or),
            Opcode::NotA => vec![alu(AluFunction::NotA) | S::AI, S::RSC],
            Opcode::NotB => vec![alu(AluFunction::NotB) | S::BI, S::RSC],
            Opcode::ClrA => vec![alu(AluFunction::Zero) | S::AI, S::RSC],
            Opcode::ClrB => vec![alu(AluFunction::Zero) | S::BI, S::RSC],

            Opcode::JmpImm => immediate(S::MO | S::PCI),
            Opcode::JmpMem => memory(S::MO | S::PCI),

            Opcode::OutA => vec![S::AO | S::OI, S::RSC],
            Opcode::OutB => vec![S::BO | S::OI, S::RSC],
            Opcode::OutImm => immediate(S::MO | S::OI | S::CE),
            Opcode::OutMem => memory(S::MO | S::OI | S::CE),

            Opcode::MovImm => vec![
                S::PCO | S::MAI,
                S::MO | S::BI | S::CE,
                S::PCO | S::MAI,
                S::BO | S::MI | S::CE,
                S::RSC,
            ],
            Opcode::MovMem => vec![
                S::PCO | S::MAI,
                S::MO | S::MAI,
                S::MO | S::BI | S::CE,
                S::PCO | S::MAI,
                S::BO | S::MI | S::CE,
                S::RSC,
            ],

            Opcode::Hlt => vec![S::HLT, S::RSC],
        }
    }
}

fn alu(f: AluFunction) -> Signals {
    f.signals() | Signals::EO
}

// operand byte at PC
fn immediate(op: Signals) -> Vec<Signals> {
    vec![Signals::PCO | Signals::MAI, op, Signals::RSC]
}

// operand byte at PC is the address
fn memory(op: Signals) -> Vec<Signals> {
    vec![Signals::PCO | Signals::MAI, Signals::MO | Signals::MAI, op, Signals::RSC]
}

fn alu_register(f: AluFunction) -> Vec<Signals> {
    vec![alu(f) | Signals::AI | Signals::CE, Signals::RSC]
}

fn alu_immediate(f: AluFunction) -> Vec<Signals> {
    vec![
        Signals::PCO | Signals::MAI,
        Signals::MO | Signals::BI,
        alu(f) | Signals::AI | Signals::CE,
        Signals::RSC,
    ]
}

fn alu_memory(f: AluFunction) -> Vec<Signals> {
    vec![
        Signals::PCO | Signals::MAI,
        Signals::MO | Signals::MAI,
        Signals::MO | Signals::BI,
        alu(f) | Signals::AI | Signals::CE,
        Signals::RSC,
    ]
}

/// The 8 control words an opcode runs through, fetch cycle included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MicroEntry {
    pub steps: [Signals; STEPS_PER_OPCODE],
}

impl MicroEntry {
    /// What an opcode with no instruction does: fetch, then start over.
    pub const NOP: MicroEntry = MicroEntry {
        steps: [
            FETCH[0],
            FETCH[1],
            Signals::RSC,
            Signals::empty(),
            Signals::empty(),
            Signals::empty(),
            Signals::empty(),
            Signals::empty(),
        ],
    };

    pub fn with_fetch(body: &[Signals]) -> MicroEntry {
        assert!(body.len() + FETCH.len() <= STEPS_PER_OPCODE, "{} steps do not fit", body.len());
        assert_eq!(Some(&Signals::RSC), body.last(), "sequence must end by resetting the step counter");

        let mut steps = [Signals::empty(); STEPS_PER_OPCODE];
        steps[..FETCH.len()].copy_from_slice(&FETCH);
        steps[FETCH.len()..FETCH.len() + body.len()].copy_from_slice(body);
        MicroEntry { steps }
    }

    pub fn words(&self) -> [u32; STEPS_PER_OPCODE] {
        self.steps.map(Signals::word)
    }

    /// Index of the step that asserts `RSC`.
    pub fn last_step(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.contains(Signals::RSC))
    }
}

impl fmt::Display for MicroEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.steps.iter().map(|s| format!("{:06X}", s.bits())).join(" "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MicrocodeTable {
    entries: Box<[MicroEntry; OPCODE_COUNT]>,
}

impl MicrocodeTable {
    /// Every opcode is the no-op entry.
    pub fn empty() -> MicrocodeTable {
        MicrocodeTable {
            entries: Box::new([MicroEntry::NOP; OPCODE_COUNT]),
        }
    }

    /// The instruction set wired into the control unit.
    pub fn reference() -> MicrocodeTable {
        let mut table = MicrocodeTable::empty();
        for opcode in Opcode::iter() {
            table.define(opcode as u8, &opcode.steps());
        }
        table
    }

    pub fn define(&mut self, opcode: u8, body: &[Signals]) {
        self.entries[opcode as usize] = MicroEntry::with_fetch(body);
    }

    pub fn entry(&self, opcode: u8) -> &MicroEntry {
        &self.entries[opcode as usize]
    }

    pub fn word(&self, opcode: u8, step: usize) -> Signals {
        self.entries[opcode as usize].steps[step]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &MicroEntry)> + '_ {
        (0..=u8::MAX).zip(self.entries.iter())
    }
}

impl Default for MicrocodeTable {
    fn default() -> Self {
        MicrocodeTable::reference()
    }
}
