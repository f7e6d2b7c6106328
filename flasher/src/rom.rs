use std::fmt;

use itertools::Itertools;
use strum::IntoEnumIterator;

use common::hexfile::HexFile;
use common::*;
use ucode::MicrocodeTable;

/// `WR AAAA VV VV VV VV VV VV VV VV !`: one opcode's 8 steps for one chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteCommand {
    pub address: u16,
    pub data: [u8; STEPS_PER_OPCODE],
}

impl fmt::Display for WriteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WR {:04X} {} !", self.address, self.data.iter().map(|b| format!("{:02X}", b)).join(" "))
    }
}

pub fn base_address(chip: ChipIndex, opcode: u8) -> u16 {
    chip.base_address() + ((opcode as u16) << STEP_BITS)
}

/// One write per opcode, in ascending opcode (and so address) order.
pub fn encode(chip: ChipIndex, table: &MicrocodeTable) -> impl Iterator<Item = WriteCommand> + '_ {
    table.iter().map(move |(opcode, entry)| WriteCommand {
        address: base_address(chip, opcode),
        data: entry.steps.map(|word| Planes::split(word).get(chip)),
    })
}

/// Chips 0, 1 and 2 back to back.
pub fn encode_all(table: &MicrocodeTable) -> impl Iterator<Item = WriteCommand> + '_ {
    ChipIndex::iter().flat_map(move |chip| encode(chip, table))
}

/// The 2 KiB one chip holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RomImage {
    pub chip: ChipIndex,
    pub bytes: Vec<u8>,
}

impl RomImage {
    pub fn new(chip: ChipIndex, table: &MicrocodeTable) -> RomImage {
        let mut bytes = vec![0; CHIP_SEGMENT_SIZE];
        for command in encode(chip, table) {
            let offset = (command.address - chip.base_address()) as usize;
            bytes[offset..offset + STEPS_PER_OPCODE].copy_from_slice(&command.data);
        }
        RomImage { chip, bytes }
    }

    pub fn byte(&self, opcode: u8, step: usize) -> u8 {
        self.bytes[step_address(opcode, step)]
    }

    pub fn to_hexfile(&self) -> HexFile {
        let mut file = HexFile::from_bytes(&self.bytes);
        file.comment(&format!(" {} base address 0x{:04X}", self.chip, self.chip.base_address()));
        file
    }
}

/// All three chips laid out at their segment offsets.
pub fn combined_image(table: &MicrocodeTable) -> Vec<u8> {
    ChipIndex::iter()
        .flat_map(|chip| RomImage::new(chip, table).bytes)
        .collect()
}

/// Reads one control word back out of the three chip images.
pub fn reconstruct(images: &[RomImage; CHIP_COUNT], opcode: u8, step: usize) -> u32 {
    let mut planes = Planes::default();
    for image in images {
        planes.set(image.chip, image.byte(opcode, step));
    }
    planes.join()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::hexfile::HexFileLine;
    use ucode::{Opcode, UCODE};

    #[test]
    fn opcode_0x10_on_chip_1() {
        let command = encode(ChipIndex::Chip1, &UCODE).nth(0x10).unwrap();
        assert_eq!(0x880, command.address);
        assert_eq!((1 << 11) + (0x10 << 3), command.address);
    }

    #[test]
    fn addresses_ascend() {
        for chip in ChipIndex::iter() {
            let addresses: Vec<u16> = encode(chip, &UCODE).map(|c| c.address).collect();
            assert_eq!(OPCODE_COUNT, addresses.len());
            assert_eq!(chip.base_address(), addresses[0]);
            assert_eq!(chip.base_address() + 0x7F8, addresses[255]);
            assert!(addresses.windows(2).all(|w| w[0] < w[1]));
        }

        let all: Vec<u16> = encode_all(&UCODE).map(|c| c.address).collect();
        assert_eq!(OPCODE_COUNT * CHIP_COUNT, all.len());
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn truncates_to_chip_byte() {
        let mut table = MicrocodeTable::empty();
        let all = Signals::from_bits_retain(0xFF_FFFF);
        table.define(0x42, &[all, Signals::CE, Signals::RSC]);

        let chip2 = encode(ChipIndex::Chip2, &table).nth(0x42).unwrap();
        assert_eq!(0xFF, chip2.data[2]);
        assert_eq!(0x80, chip2.data[3]);

        let chip0 = encode(ChipIndex::Chip0, &table).nth(0x42).unwrap();
        assert_eq!(0xFF, chip0.data[2]);
        assert_eq!(0x00, chip0.data[3]);
        assert_eq!(0x01, chip0.data[4]);
    }

    #[test]
    fn halt_on_chip_0() {
        let commands: Vec<_> = encode(ChipIndex::Chip0, &UCODE).collect();
        assert_eq!(256, commands.len());

        let halt = commands[Opcode::Hlt as usize];
        assert_eq!(0x07F8, halt.address);
        // MAI|PCO, MO|IRI|CE and HLT live entirely on chip 2
        assert_eq!([0x00, 0x00, 0x00, 0x01, 0, 0, 0, 0], halt.data);

        let halt = encode(ChipIndex::Chip2, &UCODE).last().unwrap();
        assert_eq!(0x17F8, halt.address);
        assert_eq!([0x18, 0x83, 0x40, 0x00, 0, 0, 0, 0], halt.data);
    }

    #[test]
    fn planes_rebuild_every_word() {
        let images = [
            RomImage::new(ChipIndex::Chip0, &UCODE),
            RomImage::new(ChipIndex::Chip1, &UCODE),
            RomImage::new(ChipIndex::Chip2, &UCODE),
        ];

        for (opcode, entry) in UCODE.iter() {
            for (step, word) in entry.steps.iter().enumerate() {
                let rebuilt = (images[2].byte(opcode, step) as u32) << 16
                    | (images[1].byte(opcode, step) as u32) << 8
                    | images[0].byte(opcode, step) as u32;
                assert_eq!(word.bits(), rebuilt, "{:02x}:{}", opcode, step);
                assert_eq!(word.bits(), reconstruct(&images, opcode, step));
            }
        }
    }

    #[test]
    fn command_text() {
        let command = encode(ChipIndex::Chip2, &UCODE).nth(Opcode::LdaImm as usize).unwrap();
        assert_eq!("WR 1008 18 83 18 82 00 00 00 00 !", command.to_string());
    }

    #[test]
    fn combined_layout() {
        let image = combined_image(&UCODE);
        assert_eq!(CHIP_SEGMENT_SIZE * CHIP_COUNT, image.len());
        for command in encode_all(&UCODE) {
            let start = command.address as usize;
            assert_eq!(&command.data[..], &image[start..start + STEPS_PER_OPCODE]);
        }
    }

    #[test]
    fn hexfile_matches_image() {
        let image = RomImage::new(ChipIndex::Chip1, &UCODE);
        let file = image.to_hexfile();
        assert_eq!(
            HexFileLine::Comment(" ROM 1 base address 0x0800".to_owned()),
            file.lines[0]);
        assert_eq!(&HexFile::from_bytes(&image.bytes).lines[..], &file.lines[1..]);
    }

    #[test]
    #[should_panic]
    fn byte_past_last_step() {
        RomImage::new(ChipIndex::Chip0, &UCODE).byte(0x01, STEPS_PER_OPCODE);
    }
}
