//! Raw file decoding.

use byteorder::{ByteOrder, LittleEndian};
use spicerun_spec::{ensure_unique_names, RawDialect, Sample, SampleValue, WaveformTrace};

use crate::error::{RawError, RawResult};
use crate::header::{parse_header, DataFormat, LineReader, RawHeader, TextEncoding};
use crate::plot::{RawFile, RawPlot};

/// Decodes a raw file, inferring the dialect from the header.
///
/// UTF-16 headers and headers whose `Command:` names LTspice are decoded as
/// LTspice; everything else as SPICE3.
pub fn decode_raw(bytes: &[u8]) -> RawResult<RawFile> {
    decode(bytes, None)
}

/// Decodes a raw file using a known dialect.
pub fn decode_raw_as(bytes: &[u8], dialect: RawDialect) -> RawResult<RawFile> {
    decode(bytes, Some(dialect))
}

fn decode(bytes: &[u8], dialect: Option<RawDialect>) -> RawResult<RawFile> {
    if bytes.is_empty() {
        return Err(RawError::Empty);
    }
    let (encoding, bom) = TextEncoding::detect(bytes);
    let mut reader = LineReader::new(bytes, bom, encoding);
    let mut plots = Vec::new();

    loop {
        let header = parse_header(&mut reader)?;
        let dialect = dialect.unwrap_or_else(|| infer_dialect(&header));
        let columns = match header.format {
            DataFormat::Binary => {
                let start = reader.position();
                let (columns, consumed) = read_binary(&bytes[start..], &header, dialect)?;
                reader.seek(start + consumed);
                columns
            }
            DataFormat::Ascii => read_ascii(&mut reader, &header)?,
        };
        plots.push(build_plot(header, dialect, columns)?);

        match next_plot_start(bytes, reader.position(), encoding) {
            Some(pos) => reader.seek(pos),
            None => break,
        }
    }

    Ok(RawFile::new(plots))
}

fn infer_dialect(header: &RawHeader) -> RawDialect {
    if header.encoding == TextEncoding::Utf16Le
        || header.command.to_ascii_lowercase().contains("ltspice")
    {
        RawDialect::Ltspice
    } else {
        RawDialect::Spice3
    }
}

/// Byte width of one sample of variable `index`.
pub(crate) fn sample_width(header: &RawHeader, dialect: RawDialect, index: usize) -> usize {
    if header.flags.complex {
        16
    } else if dialect == RawDialect::Ltspice && !header.flags.double && index > 0 {
        4
    } else {
        8
    }
}

fn read_binary(
    data: &[u8],
    header: &RawHeader,
    dialect: RawDialect,
) -> RawResult<(Vec<Vec<SampleValue>>, usize)> {
    let n_vars = header.variables.len();
    let n_points = header.n_points;
    let widths: Vec<usize> = (0..n_vars)
        .map(|i| sample_width(header, dialect, i))
        .collect();
    let row: usize = widths.iter().sum();
    let expected = row.checked_mul(n_points).unwrap_or(usize::MAX);
    if data.len() < expected {
        return Err(RawError::Truncated {
            points: n_points,
            expected,
            found: data.len(),
        });
    }

    let read = |offset: usize, width: usize| -> SampleValue {
        match width {
            16 => SampleValue::Complex {
                re: LittleEndian::read_f64(&data[offset..]),
                im: LittleEndian::read_f64(&data[offset + 8..]),
            },
            8 => SampleValue::Real(LittleEndian::read_f64(&data[offset..])),
            _ => SampleValue::Real(f64::from(LittleEndian::read_f32(&data[offset..]))),
        }
    };

    let mut columns = vec![Vec::with_capacity(n_points); n_vars];
    if header.flags.fastaccess {
        let mut offset = 0;
        for (var, &width) in widths.iter().enumerate() {
            for _ in 0..n_points {
                columns[var].push(read(offset, width));
                offset += width;
            }
        }
    } else {
        let mut offset = 0;
        for _ in 0..n_points {
            for (var, &width) in widths.iter().enumerate() {
                columns[var].push(read(offset, width));
                offset += width;
            }
        }
    }
    Ok((columns, expected))
}

fn read_ascii(reader: &mut LineReader<'_>, header: &RawHeader) -> RawResult<Vec<Vec<SampleValue>>> {
    let n_vars = header.variables.len();
    let n_points = header.n_points;
    let mut columns = vec![Vec::with_capacity(n_points.min(4096)); n_vars];
    let mut point = 0;
    // Slot 0 is the point index, slots 1..=n_vars are values.
    let mut slot = 0;

    while point < n_points {
        let line_start = reader.position();
        let Some(line) = reader.next_line()? else {
            break;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if looks_like_header(trimmed) {
            reader.seek(line_start);
            break;
        }
        for token in trimmed.split_whitespace() {
            if point == n_points {
                return Err(RawError::PointIndex {
                    expected: n_points,
                    found: token.to_string(),
                });
            }
            if slot == 0 {
                match token.parse::<usize>() {
                    Ok(index) if index == point => {}
                    _ => {
                        return Err(RawError::PointIndex {
                            expected: point,
                            found: token.to_string(),
                        })
                    }
                }
            } else {
                columns[slot - 1].push(parse_value(token, header.flags.complex, point)?);
            }
            slot += 1;
            if slot > n_vars {
                slot = 0;
                point += 1;
            }
        }
    }

    if point < n_points {
        return Err(RawError::PointCountMismatch {
            expected: n_points,
            found: point,
        });
    }
    Ok(columns)
}

fn looks_like_header(line: &str) -> bool {
    line.starts_with(|c: char| c.is_ascii_alphabetic()) && line.contains(':')
}

fn parse_value(token: &str, complex: bool, point: usize) -> RawResult<SampleValue> {
    let invalid = || RawError::InvalidNumber {
        token: token.to_string(),
        point,
    };
    match token.split_once(',') {
        Some((re, im)) if complex => Ok(SampleValue::Complex {
            re: re.parse().map_err(|_| invalid())?,
            im: im.parse().map_err(|_| invalid())?,
        }),
        Some(_) => Err(invalid()),
        None => {
            let value: f64 = token.parse().map_err(|_| invalid())?;
            Ok(if complex {
                SampleValue::Complex { re: value, im: 0.0 }
            } else {
                SampleValue::Real(value)
            })
        }
    }
}

fn build_plot(
    header: RawHeader,
    dialect: RawDialect,
    mut columns: Vec<Vec<SampleValue>>,
) -> RawResult<RawPlot> {
    let abs_axis = dialect == RawDialect::Ltspice && !header.flags.complex;
    let axis: Vec<f64> = columns[0]
        .iter()
        .map(|v| if abs_axis { v.re().abs() } else { v.re() })
        .collect();

    let mut traces = Vec::with_capacity(columns.len() - 1);
    for (var, values) in header.variables.iter().zip(columns.drain(..)).skip(1) {
        let samples = axis
            .iter()
            .zip(values)
            .map(|(&time, value)| Sample { time, value })
            .collect();
        traces.push(WaveformTrace::new(var.name.clone(), var.unit(), samples)?);
    }
    ensure_unique_names(&traces)?;

    // Axis-only plots still need a validated axis.
    if traces.is_empty() {
        WaveformTrace::from_real(header.axis().name.clone(), header.axis().unit(), &axis, &axis)?;
    }

    Ok(RawPlot::from_parts(header, dialect, axis, traces))
}

/// Finds the start of another plot header after `pos`, skipping blank
/// lines. Anything else trailing the data is ignored.
fn next_plot_start(bytes: &[u8], pos: usize, encoding: TextEncoding) -> Option<usize> {
    let mut reader = LineReader::new(bytes, pos, encoding);
    loop {
        let line_start = reader.position();
        let line = reader.next_line().ok()??;
        let trimmed = line.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_ascii_lowercase();
        return (lower.starts_with("title:") || lower.starts_with("plotname:"))
            .then_some(line_start);
    }
}
