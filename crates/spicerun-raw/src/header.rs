//! Raw file header: text encoding, flags, and the variable table.

use crate::error::{RawError, RawResult};

/// Text encoding of the header (and of ASCII data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// ASCII / UTF-8, as written by ngspice.
    Utf8,
    /// UTF-16 little endian, as written by LTspice.
    Utf16Le,
}

impl TextEncoding {
    /// Guesses the encoding from the first bytes. Returns the encoding and
    /// the number of BOM bytes to skip.
    pub fn detect(bytes: &[u8]) -> (TextEncoding, usize) {
        if bytes.starts_with(&[0xFF, 0xFE]) {
            (TextEncoding::Utf16Le, 2)
        } else if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
            (TextEncoding::Utf8, 3)
        } else if bytes.len() >= 2 && bytes[0] != 0 && bytes[1] == 0 {
            (TextEncoding::Utf16Le, 0)
        } else {
            (TextEncoding::Utf8, 0)
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16LE",
        }
    }

    /// Encodes text in this encoding.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }
}

/// Reads newline-terminated lines in either text encoding, tracking the byte
/// position so binary data can be located after the header.
pub(crate) struct LineReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    encoding: TextEncoding,
}

impl<'a> LineReader<'a> {
    pub(crate) fn new(bytes: &'a [u8], pos: usize, encoding: TextEncoding) -> Self {
        Self {
            bytes,
            pos,
            encoding,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.bytes.len());
    }

    pub(crate) fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Returns the next line without its terminator, or `None` at the end.
    pub(crate) fn next_line(&mut self) -> RawResult<Option<String>> {
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }
        let line = match self.encoding {
            TextEncoding::Utf8 => {
                let rest = &self.bytes[self.pos..];
                let end = rest.iter().position(|&b| b == b'\n');
                let raw = &rest[..end.unwrap_or(rest.len())];
                self.pos += end.map_or(rest.len(), |e| e + 1);
                std::str::from_utf8(raw)
                    .map_err(|_| RawError::InvalidText {
                        encoding: self.encoding.name(),
                    })?
                    .to_string()
            }
            TextEncoding::Utf16Le => {
                let mut units = Vec::new();
                while self.pos + 1 < self.bytes.len() {
                    let unit = u16::from_le_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
                    self.pos += 2;
                    if unit == u16::from(b'\n') {
                        break;
                    }
                    units.push(unit);
                }
                if self.pos + 1 == self.bytes.len() {
                    // Dangling odd byte.
                    self.pos += 1;
                }
                String::from_utf16(&units).map_err(|_| RawError::InvalidText {
                    encoding: self.encoding.name(),
                })?
            }
        };
        Ok(Some(line.trim_end_matches('\r').to_string()))
    }
}

/// Layout of the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// `Binary:` section of little-endian floats.
    Binary,
    /// `Values:` section of text numbers.
    Ascii,
}

/// The `Flags:` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub complex: bool,
    pub double: bool,
    pub forward: bool,
    pub log: bool,
    pub stepped: bool,
    pub fastaccess: bool,
}

impl Flags {
    /// Parses a whitespace-separated flag list.
    pub fn parse(value: &str) -> RawResult<Flags> {
        let mut flags = Flags::default();
        let mut real = false;
        for flag in value.split_whitespace() {
            match flag.to_ascii_lowercase().as_str() {
                "real" => real = true,
                "complex" => flags.complex = true,
                "double" => flags.double = true,
                "forward" => flags.forward = true,
                "log" => flags.log = true,
                "stepped" => flags.stepped = true,
                "fastaccess" => flags.fastaccess = true,
                _ => return Err(RawError::UnknownFlag(flag.to_string())),
            }
        }
        if real && flags.complex {
            return Err(RawError::ConflictingFlags);
        }
        Ok(flags)
    }

    /// Renders the flags as they appear in a header.
    pub fn render(&self) -> String {
        let mut parts = vec![if self.complex { "complex" } else { "real" }];
        for (set, name) in [
            (self.forward, "forward"),
            (self.log, "log"),
            (self.double, "double"),
            (self.stepped, "stepped"),
            (self.fastaccess, "fastaccess"),
        ] {
            if set {
                parts.push(name);
            }
        }
        parts.join(" ")
    }
}

/// One entry of the variable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub index: usize,
    pub name: String,
    pub kind: String,
}

impl Variable {
    pub fn new(index: usize, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// Unit symbol for the variable's quantity type.
    pub fn unit(&self) -> &'static str {
        unit_for_kind(&self.kind)
    }
}

/// Maps a raw-file quantity type to its unit symbol.
pub fn unit_for_kind(kind: &str) -> &'static str {
    match kind.to_ascii_lowercase().as_str() {
        "time" => "s",
        "frequency" => "Hz",
        "voltage" => "V",
        "current" | "device_current" | "subckt_current" => "A",
        "power" => "W",
        "impedance" => "Ohm",
        "admittance" => "S",
        _ => "",
    }
}

/// Maps a unit symbol back to a raw-file quantity type.
pub fn kind_for_unit(unit: &str) -> &'static str {
    match unit {
        "s" => "time",
        "Hz" => "frequency",
        "V" => "voltage",
        "A" => "device_current",
        "W" => "power",
        "Ohm" => "impedance",
        "S" => "admittance",
        _ => "notype",
    }
}

/// A parsed plot header.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHeader {
    pub title: String,
    pub date: String,
    pub plot_name: String,
    pub flags: Flags,
    pub n_points: usize,
    pub offset: f64,
    pub command: String,
    pub variables: Vec<Variable>,
    pub format: DataFormat,
    pub encoding: TextEncoding,
}

impl RawHeader {
    /// The independent variable (time or frequency).
    pub fn axis(&self) -> &Variable {
        &self.variables[0]
    }
}

/// Parses one plot header, leaving the reader at the first data byte.
pub(crate) fn parse_header(reader: &mut LineReader<'_>) -> RawResult<RawHeader> {
    let mut title = String::new();
    let mut date = String::new();
    let mut plot_name = String::new();
    let mut flags = None;
    let mut n_variables = None;
    let mut n_points = None;
    let mut offset = 0.0;
    let mut command = String::new();
    let mut variables = None;

    let format = loop {
        let line = reader.next_line()?.ok_or(RawError::MissingDataSection)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "title" => title = value.to_string(),
            "date" => date = value.to_string(),
            "plotname" => plot_name = value.to_string(),
            "flags" => flags = Some(Flags::parse(value)?),
            "no. variables" => n_variables = Some(parse_count("No. Variables", value)?),
            "no. points" => n_points = Some(parse_count("No. Points", value)?),
            "offset" => {
                offset = value.parse().map_err(|_| RawError::InvalidField {
                    field: "Offset",
                    value: value.to_string(),
                })?
            }
            "command" => command = value.to_string(),
            "variables" => {
                let declared = n_variables.ok_or(RawError::MissingField("No. Variables"))?;
                variables = Some(parse_variables(reader, value, declared)?);
            }
            "binary" => break DataFormat::Binary,
            "values" => break DataFormat::Ascii,
            _ => {}
        }
    };

    let n_variables = n_variables.ok_or(RawError::MissingField("No. Variables"))?;
    let variables = variables.ok_or(RawError::MissingField("Variables"))?;
    if n_variables == 0 {
        return Err(RawError::InvalidField {
            field: "No. Variables",
            value: "0".to_string(),
        });
    }
    if variables.len() != n_variables {
        return Err(RawError::VariableCountMismatch {
            declared: n_variables,
            listed: variables.len(),
        });
    }

    Ok(RawHeader {
        title,
        date,
        plot_name,
        flags: flags.unwrap_or_default(),
        n_points: n_points.ok_or(RawError::MissingField("No. Points"))?,
        offset,
        command,
        variables,
        format,
        encoding: reader.encoding(),
    })
}

fn parse_count(field: &'static str, value: &str) -> RawResult<usize> {
    value.parse().map_err(|_| RawError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn parse_variables(
    reader: &mut LineReader<'_>,
    inline: &str,
    declared: usize,
) -> RawResult<Vec<Variable>> {
    let mut variables = Vec::with_capacity(declared.min(1024));
    if !inline.is_empty() {
        variables.push(parse_variable(inline, 0)?);
    }
    while variables.len() < declared {
        let line = reader
            .next_line()?
            .ok_or(RawError::VariableCountMismatch {
                declared,
                listed: variables.len(),
            })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_section_line(trimmed) {
            return Err(RawError::VariableCountMismatch {
                declared,
                listed: variables.len(),
            });
        }
        let index = variables.len();
        variables.push(parse_variable(trimmed, index)?);
    }
    Ok(variables)
}

fn is_section_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("binary:") || lower.starts_with("values:")
}

fn parse_variable(line: &str, expected_index: usize) -> RawResult<Variable> {
    let mut fields = line.split_whitespace();
    let (Some(index), Some(name), Some(kind)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(RawError::MalformedVariable(line.to_string()));
    };
    match index.parse::<usize>() {
        Ok(i) if i == expected_index => Ok(Variable::new(i, name, kind)),
        _ => Err(RawError::MalformedVariable(line.to_string())),
    }
}

/// Renders a header in the layout both LTspice and ngspice use.
pub(crate) fn render_header(header: &RawHeader) -> String {
    let mut out = String::new();
    out.push_str(&format!("Title: {}\n", header.title));
    out.push_str(&format!("Date: {}\n", header.date));
    out.push_str(&format!("Plotname: {}\n", header.plot_name));
    out.push_str(&format!("Flags: {}\n", header.flags.render()));
    out.push_str(&format!("No. Variables: {}\n", header.variables.len()));
    out.push_str(&format!("No. Points: {}\n", header.n_points));
    out.push_str(&format!("Offset: {:e}\n", header.offset));
    out.push_str(&format!("Command: {}\n", header.command));
    out.push_str("Variables:\n");
    for var in &header.variables {
        out.push_str(&format!("\t{}\t{}\t{}\n", var.index, var.name, var.kind));
    }
    out.push_str(match header.format {
        DataFormat::Binary => "Binary:\n",
        DataFormat::Ascii => "Values:\n",
    });
    out
}
