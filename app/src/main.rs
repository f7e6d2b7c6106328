#[macro_use]
extern crate slog;

use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use slog::{Drain, Logger};
use strum::IntoEnumIterator;

use common::hexfile::HexFile;
use common::*;
use flasher::protocol::READY_MARKER;
use flasher::rom::combined_image;
use flasher::*;
use ucode::{MicrocodeTable, Opcode, UCODE};

#[derive(Parser)]
#[command(name = "eeprom", version)]
#[command(about = "Encodes the control unit microcode and programs the three control EEPROMs", long_about = None)]
struct Cli {
    /// More log output, repeat for trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Print the WR commands for ROM 0, 1 and 2
    Dump,
    /// Print the microcode of a range of opcodes
    Show {
        /// First opcode, hex
        #[arg(value_parser = parse_hex)]
        start: u16,
        /// Number of opcodes, hex
        #[arg(value_parser = parse_hex, default_value = "1")]
        len: u16,
    },
    /// Write a ROM image in Logisim "v2.0 raw" format
    Image {
        /// Only this chip; all three back to back when omitted
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
        chip: Option<u8>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Program one chip, or all three
    Flash {
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
        chip: Option<u8>,
        #[command(flatten)]
        link: Link,
    },
    /// Interactive prompt
    Repl {
        #[command(flatten)]
        link: Link,
    },
}

#[derive(Args)]
struct Link {
    /// Serial port the programmer is attached to
    #[arg(long, env = "EEPROM_PORT", required_unless_present = "dry_run")]
    port: Option<String>,
    #[arg(long, env = "EEPROM_BAUD", default_value_t = 57600)]
    baud: u32,
    /// Use a simulated programmer
    #[arg(long)]
    dry_run: bool,
}

const HELP: &str = "\
CL              clear the EEPROM
RD AAAA LLLL    read LLLL bytes from AAAA
SH II LL        show microcode for LL opcodes from II
WR AAAA VV..VV  write 8 bytes at AAAA
W0 | W1 | W2    program one ROM
FL              program all three ROMs
QT              stop the programmer
Q | QUIT        leave
anything else is sent to the programmer as is";

fn parse_hex(s: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16)
}

fn logger(verbose: u8) -> Logger {
    let level = match verbose {
        0 => slog::Level::Info,
        1 => slog::Level::Debug,
        _ => slog::Level::Trace,
    };

    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(level).fuse();
    Logger::root(drain, o!())
}

fn connect(link: &Link, log: &Logger) -> Result<Programmer<Box<dyn Transport>>, Box<dyn Error>> {
    let transport: Box<dyn Transport> = match (&link.port, link.dry_run) {
        (_, true) => {
            info!(log, "using simulated programmer");
            Box::new(SimulatedDevice::new())
        }
        (Some(port), false) => {
            info!(log, "opening"; "port" => port, "baud" => link.baud);
            Box::new(SerialTransport::open(port, link.baud)?)
        }
        (None, false) => return Err("no serial port given".into()),
    };

    let (programmer, banner) = Programmer::connect(transport, log.clone())?;
    for line in banner {
        println!("{}", line);
    }
    Ok(programmer)
}

fn dump<W: Write>(table: &MicrocodeTable, out: &mut W) -> io::Result<()> {
    for chip in ChipIndex::iter() {
        writeln!(out, "# ===")?;
        writeln!(out, "# === Contents of {} base address is 0x{:04X}", chip, chip.base_address())?;
        writeln!(out, "# ===")?;
        for command in encode(chip, table) {
            writeln!(out, "{}", command)?;
        }
    }
    Ok(())
}

fn show<W: Write>(table: &MicrocodeTable, range: OpcodeRange, out: &mut W) -> io::Result<()> {
    for opcode in range.opcodes() {
        let entry = table.entry(opcode);
        let (name, operands) = match Opcode::from_repr(opcode) {
            Some(op) => (op.to_string(), op.operand_bytes().to_string()),
            None => ("-".to_owned(), "-".to_owned()),
        };
        writeln!(out, "{:02X} {:<5} {} {}", opcode, name, operands, entry)?;

        let used = entry.last_step().map_or(STEPS_PER_OPCODE, |last| last + 1);
        for (step, word) in entry.steps.iter().enumerate().take(used) {
            match AluFunction::decode(*word) {
                Some(f) => writeln!(out, "   {} {} ({})", step, word.names(), f)?,
                None => writeln!(out, "   {} {}", step, word.names())?,
            }
        }
    }
    Ok(())
}

fn repl<T, R, W>(
    programmer: &mut Programmer<T>,
    table: &MicrocodeTable,
    log: &Logger,
    mut input: R,
    out: &mut W,
) -> Result<(), Box<dyn Error>>
where
    T: Transport,
    R: BufRead,
    W: Write,
{
    loop {
        write!(out, "{} ", READY_MARKER)?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };
        debug!(log, "command"; "parsed" => format!("{:?}", command));

        match command {
            Command::Quit => break,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Show(range) => show(table, range, out)?,
            Command::Program(chip) => {
                let count = programmer.program_chip(chip, table)?;
                writeln!(out, "{}: {} writes", chip, count)?;
            }
            Command::ProgramAll => {
                let count = programmer.program_all(table)?;
                writeln!(out, "ROM 0, 1 and 2: {} writes", count)?;
            }
            command => {
                if let Some(device_line) = command.device_line() {
                    for response in programmer.execute(&device_line)? {
                        writeln!(out, "{}", response)?;
                    }
                }
                if command == Command::Stop {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let log = logger(cli.verbose);
    let table: &MicrocodeTable = &UCODE;

    match cli.mode {
        Mode::Dump => {
            dump(table, &mut io::stdout().lock())?;
        }
        Mode::Show { start, len } => {
            show(table, OpcodeRange::new(start, len)?, &mut io::stdout().lock())?;
        }
        Mode::Image { chip, output } => {
            let file = match chip {
                Some(chip) => RomImage::new(ChipIndex::try_from(chip)?, table).to_hexfile(),
                None => {
                    let mut file = HexFile::from_bytes(&combined_image(table));
                    file.comment(" ROM 0, 1 and 2 at 0x0000, 0x0800 and 0x1000");
                    file
                }
            };
            file.write(BufWriter::new(File::create(&output)?))?;
            info!(log, "wrote image"; "path" => output.display().to_string());
        }
        Mode::Flash { chip, link } => {
            let mut programmer = connect(&link, &log)?;
            let count = match chip {
                Some(chip) => programmer.program_chip(ChipIndex::try_from(chip)?, table)?,
                None => programmer.program_all(table)?,
            };
            info!(log, "done"; "writes" => count);
        }
        Mode::Repl { link } => {
            let mut programmer = connect(&link, &log)?;
            repl(&mut programmer, table, &log, io::stdin().lock(), &mut io::stdout().lock())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chip_option_range() {
        assert!(Cli::try_parse_from(["eeprom", "image", "--chip", "3", "-o", "x.hex"]).is_err());
        assert!(Cli::try_parse_from(["eeprom", "image", "--chip", "2", "-o", "x.hex"]).is_ok());
        assert!(Cli::try_parse_from(["eeprom", "flash", "--dry-run"]).is_ok());
    }

    #[test]
    fn dump_lists_every_chip() {
        let mut out = Vec::new();
        dump(&UCODE, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let writes: Vec<&str> = text.lines().filter(|l| l.starts_with("WR ")).collect();
        assert_eq!(768, writes.len());
        assert_eq!("WR 0000 00 00 01 00 00 00 00 00 !", writes[0]);
        assert_eq!("WR 17F8 18 83 40 00 00 00 00 00 !", writes[767]);
        assert!(text.contains("# === Contents of ROM 1 base address is 0x0800"));
    }

    #[test]
    fn show_names_signals() {
        let mut out = Vec::new();
        show(&UCODE, OpcodeRange::new(0x20, 1).unwrap(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!("20 ADD   0 180000 830000 80A120 000001 000000 000000 000000 000000", lines[0]);
        assert_eq!("   0 PCO|MAI", lines[1]);
        assert_eq!("   2 CE|EO|AI|AL0|AL3 (add)", lines[3]);
        assert_eq!("   3 RSC", lines[4]);
        assert_eq!(5, lines.len());
    }

    #[test]
    fn show_operands_and_unassigned() {
        let mut out = Vec::new();
        show(&UCODE, OpcodeRange::new(0x60, 0x04).unwrap(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let headers: Vec<&str> = text.lines().filter(|l| !l.starts_with(' ')).collect();

        assert_eq!(4, headers.len());
        assert!(headers[0].starts_with("60 MOVi  2 "));
        assert!(headers[2].starts_with("62 -     - 180000 830000 000001 "));
    }

    #[test]
    fn prompt_session() {
        let log = Logger::root(slog::Discard, o!());
        let (mut programmer, _) = Programmer::connect(SimulatedDevice::new(), log.clone()).unwrap();

        let script = "sh 20 1\nw1\nrd\nfoo\nqt\nrd 0 1\n";
        let mut out = Vec::new();
        repl(&mut programmer, &UCODE, &log, script.as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        // SH is answered here, never by the device
        assert!(text.contains("20 ADD   0 180000"));
        assert!(text.contains("ROM 1: 256 writes"));
        // a bad line is reported and the prompt carries on
        assert!(text.contains("'RD' expects AAAA LLLL"));
        assert!(text.contains("unknown command: foo !"));
        assert!(text.contains("stopped"));

        let device = programmer.into_inner();
        let received = device.received();
        assert_eq!(256 + 2, received.len());
        assert!(received[..256].iter().all(|line| line.starts_with("WR ")));
        assert_eq!("WR 0800 00 00 00 00 00 00 00 00 !", received[0]);
        assert_eq!(&["foo !".to_owned(), "QT !".to_owned()], &received[256..]);
        assert!(device.is_stopped());
    }

    #[test]
    fn prompt_ends_at_input_end() {
        let log = Logger::root(slog::Discard, o!());
        let (mut programmer, _) = Programmer::connect(SimulatedDevice::new(), log.clone()).unwrap();

        let mut out = Vec::new();
        repl(&mut programmer, &UCODE, &log, "fl\n".as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("ROM 0, 1 and 2: 768 writes"));
        assert_eq!(768, programmer.into_inner().received().len());
    }
}
