extern crate strum;
#[macro_use]
extern crate strum_macros;

extern crate packed_struct;
extern crate packed_struct_codegen;
use packed_struct::prelude::*;

#[macro_use]
extern crate bitflags;

pub mod hexfile;

bitflags! {
    /// One control word: the set of control lines asserted during a single
    /// microinstruction step. Bit positions follow the control unit's wiring
    /// and never change.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Signals: u32 {
        // EEPROM 2, D23 - D16
        const CE = 1 << 23; // program counter count enable
        const HLT = 1 << 22; // halt
        const PCI = 1 << 21; // program counter in
        const PCO = 1 << 20; // program counter out
        const MAI = 1 << 19; // memory address register in
        const MI = 1 << 18; // memory in
        const MO = 1 << 17; // memory out
        const IRI = 1 << 16; // instruction register in

        // EEPROM 1, D15 - D08
        const EO = 1 << 15; // ALU out
        const OI = 1 << 14; // output register in
        const AI = 1 << 13; // A register in
        const AO = 1 << 12; // A register out
        const BI = 1 << 11; // B register in
        const BO = 1 << 10; // B register out
        const ALM = 1 << 9; // ALU mode, set for logic functions
        const AL0 = 1 << 8; // ALU function S0

        // EEPROM 0, D07 - D00
        const AL1 = 1 << 7; // ALU function S1
        const AL2 = 1 << 6; // ALU function S2
        const AL3 = 1 << 5; // ALU function S3
        const ALCI = 1 << 4; // ALU carry in
        const N3 = 1 << 3;
        const N2 = 1 << 2;
        const N1 = 1 << 1;
        const RSC = 1 << 0; // reset step counter
    }
}

impl Signals {
    pub const fn word(self) -> u32 {
        self.bits()
    }

    /// Signal names joined with `|`, or `-` when nothing is asserted.
    pub fn names(self) -> String {
        if self.is_empty() {
            return "-".to_owned();
        }
        self.iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join("|")
    }
}

pub const CONTROL_WORD_BITS: u32 = 24;
pub const CONTROL_WORD_MASK: u32 = (1 << CONTROL_WORD_BITS) - 1;

pub const STEP_BITS: u32 = 3;
pub const STEPS_PER_OPCODE: usize = 1 << STEP_BITS;
pub const OPCODE_COUNT: usize = 256;

pub const CHIP_COUNT: usize = 3;
pub const CHIP_SEGMENT_BITS: u32 = 11;
pub const CHIP_SEGMENT_SIZE: usize = 1 << CHIP_SEGMENT_BITS;

/// Fetch cycle shared by every opcode: step 0 then step 1.
pub const FETCH: [Signals; 2] = [
    Signals::MAI.union(Signals::PCO),
    Signals::MO.union(Signals::IRI).union(Signals::CE),
];

/// Address of `step` of `opcode` within one chip's segment.
pub const fn step_address(opcode: u8, step: usize) -> usize {
    assert!(step < STEPS_PER_OPCODE);
    ((opcode as usize) << STEP_BITS) | step
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChipError {
    #[error("chip index {0} out of range, expected 0, 1 or 2")]
    OutOfRange(u32),
}

/// One of the three EEPROMs holding an 8-bit slice of the control word.
#[derive(Clone, Copy, Display, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(EnumCount, EnumIter)]
pub enum ChipIndex {
    #[strum(to_string = "ROM 0")]
    Chip0 = 0,
    #[strum(to_string = "ROM 1")]
    Chip1 = 1,
    #[strum(to_string = "ROM 2")]
    Chip2 = 2,
}

impl ChipIndex {
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Start of this chip's segment in the programmer's address space.
    pub const fn base_address(self) -> u16 {
        (self as u16) << CHIP_SEGMENT_BITS
    }
}

impl TryFrom<u32> for ChipIndex {
    type Error = ChipError;

    fn try_from(i: u32) -> Result<Self, Self::Error> {
        match i {
            0 => Ok(ChipIndex::Chip0),
            1 => Ok(ChipIndex::Chip1),
            2 => Ok(ChipIndex::Chip2),
            _ => Err(ChipError::OutOfRange(i)),
        }
    }
}

impl TryFrom<u8> for ChipIndex {
    type Error = ChipError;

    fn try_from(i: u8) -> Result<Self, Self::Error> {
        ChipIndex::try_from(i as u32)
    }
}

/// A control word split across the three chips, plane 2 holding the top byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[derive(PackedStruct)]
#[packed_struct(size_bytes = "3", endian = "lsb", bit_numbering = "lsb0")]
pub struct Planes {
    #[packed_field(bits = "0..=7")]
    pub plane0: u8,
    #[packed_field(bits = "8..=15")]
    pub plane1: u8,
    #[packed_field(bits = "16..=23")]
    pub plane2: u8,
}

impl Planes {
    /// The three chip bytes of `word`.
    pub fn split(word: Signals) -> Planes {
        let bytes = word.bits().to_be_bytes();
        assert_eq!(0, bytes[0], "control word wider than 24 bits");
        // every bit pattern of three bytes is a valid Planes
        Planes::unpack(&[bytes[1], bytes[2], bytes[3]]).expect("unpack 3 plane bytes")
    }

    /// Reassembles the 24-bit word; bits with no named signal are kept.
    pub fn join(&self) -> u32 {
        let bytes = self.pack().expect("pack 3 plane bytes");
        u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
    }

    pub fn get(&self, chip: ChipIndex) -> u8 {
        match chip {
            ChipIndex::Chip0 => self.plane0,
            ChipIndex::Chip1 => self.plane1,
            ChipIndex::Chip2 => self.plane2,
        }
    }

    pub fn set(&mut self, chip: ChipIndex, b: u8) {
        match chip {
            ChipIndex::Chip0 => self.plane0 = b,
            ChipIndex::Chip1 => self.plane1 = b,
            ChipIndex::Chip2 => self.plane2 = b,
        }
    }
}

/// 74181 style function select. `ALM` picks logic mode, `AL3..AL0` carry
/// the S3..S0 code.
#[derive(Clone, Copy, Display, Debug, PartialEq, Eq)]
#[derive(EnumCount, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AluFunction {
    Add,
    Subtract,
    Xor,
    And,
    Or,
    NotA,
    NotB,
    Zero,
    Ones,
}

impl AluFunction {
    /// (logic mode, S3..S0)
    pub const fn select(self) -> (bool, u8) {
        match self {
            AluFunction::Add => (false, 0b1001),
            AluFunction::Subtract => (false, 0b0110),
            AluFunction::Xor => (true, 0b0110),
            AluFunction::And => (true, 0b1011),
            AluFunction::Or => (true, 0b1110),
            AluFunction::NotA => (true, 0b0000),
            AluFunction::NotB => (true, 0b0101),
            AluFunction::Zero => (true, 0b0011),
            AluFunction::Ones => (true, 0b1100),
        }
    }

    pub fn signals(self) -> Signals {
        let (logic, s) = self.select();
        let mut signals = Signals::empty();
        signals.set(Signals::ALM, logic);
        signals.set(Signals::AL0, s & 0b0001 != 0);
        signals.set(Signals::AL1, s & 0b0010 != 0);
        signals.set(Signals::AL2, s & 0b0100 != 0);
        signals.set(Signals::AL3, s & 0b1000 != 0);
        signals
    }

    pub const ALU_SELECT: Signals = Signals::ALM
        .union(Signals::AL0)
        .union(Signals::AL1)
        .union(Signals::AL2)
        .union(Signals::AL3);

    /// The function an ALU output step selects, if any.
    pub fn decode(word: Signals) -> Option<AluFunction> {
        use strum::IntoEnumIterator;

        if !word.contains(Signals::EO) {
            return None;
        }
        let select = word & AluFunction::ALU_SELECT;
        AluFunction::iter().find(|f| f.signals() == select)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn twenty_four_distinct_bits() {
        let mut seen = 0u32;
        for (name, flag) in Signals::all().iter_names() {
            assert_eq!(1, flag.bits().count_ones(), "{}", name);
            assert_eq!(0, seen & flag.bits(), "{} reuses a bit", name);
            seen |= flag.bits();
        }
        assert_eq!(CONTROL_WORD_MASK, seen);
        assert_eq!(CONTROL_WORD_MASK, Signals::all().bits());
    }

    #[test]
    fn fetch_cycle() {
        assert_eq!(0x18_0000, FETCH[0].bits());
        assert_eq!(0x83_0000, FETCH[1].bits());
    }

    #[test]
    fn chip_segments() {
        assert_eq!(0x0000, ChipIndex::Chip0.base_address());
        assert_eq!(0x0800, ChipIndex::Chip1.base_address());
        assert_eq!(0x1000, ChipIndex::Chip2.base_address());
        assert_eq!(Err(ChipError::OutOfRange(3)), ChipIndex::try_from(3u8));
        assert_eq!(Ok(ChipIndex::Chip2), ChipIndex::try_from(2u32));
    }

    #[test]
    fn plane_truncates() {
        let all = Signals::from_bits_retain(0xFF_FFFF);
        assert_eq!(0xFF, Planes::split(all).get(ChipIndex::Chip2));
        assert_eq!(0x00, Planes::split(Signals::CE).get(ChipIndex::Chip0));
        assert_eq!(0x80, Planes::split(Signals::CE).get(ChipIndex::Chip2));
        assert_eq!(0x01, Planes::split(Signals::RSC).get(ChipIndex::Chip0));
    }

    #[test]
    #[should_panic]
    fn wide_word_rejected() {
        Planes::split(Signals::from_bits_retain(0x100_0000));
    }

    #[test]
    fn step_addresses() {
        assert_eq!(0x000, step_address(0x00, 0));
        assert_eq!(0x0FF, step_address(0x1F, 7));
        assert_eq!(0x7F8, step_address(0xFF, 0));
    }

    #[test]
    #[should_panic]
    fn step_past_last_rejected() {
        step_address(0x01, STEPS_PER_OPCODE);
    }

    #[test]
    fn planes_split_and_join() {
        let word = Signals::MAI | Signals::PCO | Signals::EO | Signals::RSC;
        let planes = Planes::split(word);
        assert_eq!(0x18, planes.plane2);
        assert_eq!(0x80, planes.plane1);
        assert_eq!(0x01, planes.plane0);
        assert_eq!(word.bits(), planes.join());

        let mut rebuilt = Planes::default();
        for chip in ChipIndex::iter() {
            rebuilt.set(chip, planes.get(chip));
        }
        assert_eq!(planes, rebuilt);
    }

    #[test]
    fn alu_select_codes() {
        assert_eq!(Signals::AL3 | Signals::AL0, AluFunction::Add.signals());
        assert_eq!(Signals::AL2 | Signals::AL1, AluFunction::Subtract.signals());
        assert_eq!(Signals::ALM | Signals::AL2 | Signals::AL1, AluFunction::Xor.signals());
        assert_eq!(Signals::ALM | Signals::AL3 | Signals::AL1 | Signals::AL0, AluFunction::And.signals());
        assert_eq!(Signals::ALM | Signals::AL3 | Signals::AL2 | Signals::AL1, AluFunction::Or.signals());
        assert_eq!(Signals::ALM, AluFunction::NotA.signals());
        assert_eq!(Signals::ALM | Signals::AL2 | Signals::AL0, AluFunction::NotB.signals());
        assert_eq!(Signals::ALM | Signals::AL1 | Signals::AL0, AluFunction::Zero.signals());
        assert_eq!(Signals::ALM | Signals::AL3 | Signals::AL2, AluFunction::Ones.signals());
    }

    #[test]
    fn alu_decode() {
        for f in AluFunction::iter() {
            let word = f.signals() | Signals::EO | Signals::AI;
            assert_eq!(Some(f), AluFunction::decode(word));
        }
        assert_eq!(None, AluFunction::decode(AluFunction::Add.signals()));
        assert_eq!(Ok(AluFunction::NotB), "notb".parse::<AluFunction>());
    }

    #[test]
    fn names() {
        assert_eq!("-", Signals::empty().names());
        assert_eq!("PCO|MAI", FETCH[0].names());
        assert_eq!("CE|MO|IRI", FETCH[1].names());
    }
}
