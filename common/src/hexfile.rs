use std::io::{BufRead, BufReader, Read, Write};

/// Logisim "v2.0 raw" ROM image. Runs of a repeated byte are written as
/// `count*VV` with a decimal count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HexFileLine {
    Data(Vec<HexFileData>),
    Comment(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HexFileData {
    Byte(u8),
    Run(u32, u8),
}

#[derive(Debug, thiserror::Error)]
pub enum HexFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing '{}' header", HexFile::header())]
    MissingHeader,
    #[error("line {line}: bad token '{token}'")]
    BadToken { line: usize, token: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HexFile {
    pub lines: Vec<HexFileLine>,
}

impl HexFile {
    pub const fn header() -> &'static str {
        "v2.0 raw"
    }

    const BYTES_PER_LINE: usize = 16;

    pub fn from_bytes(bytes: &[u8]) -> HexFile {
        let mut lines = Vec::new();

        let mut data = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            let run = bytes[i..].iter().take_while(|&&x| x == b).count();
            if run > 2 {
                data.push(HexFileData::Run(run as u32, b));
            } else {
                data.push(HexFileData::Byte(b));
            }
            i += if run > 2 { run } else { 1 };

            if data.len() == HexFile::BYTES_PER_LINE {
                lines.push(HexFileLine::Data(std::mem::take(&mut data)));
            }
        }

        if !data.is_empty() {
            lines.push(HexFileLine::Data(data));
        }

        HexFile { lines }
    }

    pub fn comment(&mut self, text: &str) {
        self.lines.insert(0, HexFileLine::Comment(text.to_owned()));
    }

    pub fn write<W: Write>(&self, mut w: W) -> Result<(), HexFileError> {
        writeln!(w, "{}", HexFile::header())?;
        for line in &self.lines {
            match line {
                HexFileLine::Comment(text) => writeln!(w, "#{}", text)?,
                HexFileLine::Data(data) => {
                    let tokens: Vec<String> = data.iter()
                        .map(|d| match d {
                            HexFileData::Byte(b) => format!("{:02x}", b),
                            HexFileData::Run(count, b) => format!("{}*{:02x}", count, b),
                        })
                        .collect();
                    writeln!(w, "{}", tokens.join(" "))?;
                }
            }
        }
        Ok(())
    }

    pub fn read<R: Read>(r: R) -> Result<HexFile, HexFileError> {
        let file = BufReader::new(r);
        let mut lines = file.lines();

        let header = lines.next().transpose()?;
        if header.as_deref().map(str::trim) != Some(HexFile::header()) {
            return Err(HexFileError::MissingHeader);
        }

        let mut parsed = Vec::new();

        for (line_number, line) in lines.enumerate() {
            let line = line?;
            let line = line.trim();

            if let Some(comment) = line.strip_prefix('#') {
                parsed.push(HexFileLine::Comment(comment.to_string()));
                continue;
            }

            let mut data = Vec::new();

            for block in line.split_whitespace() {
                let bad_token = || HexFileError::BadToken {
                    line: line_number + 2,
                    token: block.to_owned(),
                };

                let mut tokens = block.split('*');
                let first = tokens.next().ok_or_else(bad_token)?;
                let second = tokens.next();

                data.push(if let Some(value) = second {
                    HexFileData::Run(
                        first.parse::<u32>().map_err(|_| bad_token())?,
                        u8::from_str_radix(value, 16).map_err(|_| bad_token())?)
                } else {
                    HexFileData::Byte(u8::from_str_radix(first, 16).map_err(|_| bad_token())?)
                });
            }

            if !data.is_empty() {
                parsed.push(HexFileLine::Data(data));
            }
        }

        Ok(HexFile {
            lines: parsed,
        })
    }
}
