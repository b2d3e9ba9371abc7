//! Text files as simulators write them: UTF-8, UTF-16LE (LTspice logs and
//! some schematics) or Latin-1.

use std::path::Path;

use spicerun_raw::TextEncoding;

/// Encoding a text file was read in, so it can be written back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Utf8,
    Utf16Le { bom: bool },
    Latin1,
}

impl TextFormat {
    /// Decodes bytes, guessing the encoding.
    pub fn decode(bytes: &[u8]) -> (String, TextFormat) {
        match TextEncoding::detect(bytes) {
            (TextEncoding::Utf16Le, skip) => {
                let units: Vec<u16> = bytes[skip..]
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                (
                    String::from_utf16_lossy(&units),
                    TextFormat::Utf16Le { bom: skip > 0 },
                )
            }
            (TextEncoding::Utf8, skip) => match std::str::from_utf8(&bytes[skip..]) {
                Ok(text) => (text.to_string(), TextFormat::Utf8),
                Err(_) => (
                    bytes.iter().map(|&b| char::from(b)).collect(),
                    TextFormat::Latin1,
                ),
            },
        }
    }

    /// Encodes text back into this format.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextFormat::Utf8 => text.as_bytes().to_vec(),
            TextFormat::Utf16Le { bom } => {
                let mut out = if *bom { vec![0xFF, 0xFE] } else { Vec::new() };
                out.extend(TextEncoding::Utf16Le.encode(text));
                out
            }
            TextFormat::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// Reads a text file in whatever encoding it uses.
pub fn read_text(path: &Path) -> std::io::Result<(String, TextFormat)> {
    let bytes = std::fs::read(path)?;
    Ok(TextFormat::decode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_round_trip() {
        let format = TextFormat::Utf16Le { bom: true };
        let bytes = format.encode("Version 4\nSYMATTR Value 10µ\n");
        let (text, detected) = TextFormat::decode(&bytes);
        assert_eq!(detected, format);
        assert_eq!(text, "Version 4\nSYMATTR Value 10µ\n");
    }

    #[test]
    fn test_latin1_fallback() {
        let bytes = b"SYMATTR Value 10\xB5\n";
        let (text, format) = TextFormat::decode(bytes);
        assert_eq!(format, TextFormat::Latin1);
        assert_eq!(text, "SYMATTR Value 10µ\n");
        assert_eq!(format.encode(&text), bytes.to_vec());
    }
}
