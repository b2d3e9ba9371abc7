//! Raw file writer.
//!
//! Produces files the decoder (and LTspice/ngspice tooling) can read back.
//! Used for synthetic backends and tests.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use spicerun_spec::{RawDialect, SampleValue};

use crate::decode::sample_width;
use crate::error::RawResult;
use crate::header::{render_header, DataFormat, RawHeader, TextEncoding};
use crate::plot::RawPlot;

/// Output layout for [`encode_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// LTspice writes UTF-16 headers and f32 values; SPICE3 writes text
    /// headers and f64 values.
    pub dialect: RawDialect,
    pub format: DataFormat,
    /// Write all real values as f64 (LTspice `double` flag).
    pub double: bool,
    /// Column-major binary data.
    pub fastaccess: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::spice3()
    }
}

impl EncodeOptions {
    pub fn spice3() -> Self {
        Self {
            dialect: RawDialect::Spice3,
            format: DataFormat::Binary,
            double: false,
            fastaccess: false,
        }
    }

    pub fn ltspice() -> Self {
        Self {
            dialect: RawDialect::Ltspice,
            ..Self::spice3()
        }
    }

    pub fn ascii(mut self) -> Self {
        self.format = DataFormat::Ascii;
        self
    }

    pub fn double(mut self) -> Self {
        self.double = true;
        self
    }

    pub fn fastaccess(mut self) -> Self {
        self.fastaccess = true;
        self
    }
}

/// Encodes a plot as a raw file.
pub fn encode_raw(plot: &RawPlot, options: &EncodeOptions) -> RawResult<Vec<u8>> {
    let mut out = Vec::new();
    write_raw(&mut out, plot, options)?;
    Ok(out)
}

/// Writes a plot as a raw file.
pub fn write_raw<W: Write>(writer: &mut W, plot: &RawPlot, options: &EncodeOptions) -> RawResult<()> {
    let header = output_header(plot, options);
    if header.encoding == TextEncoding::Utf16Le {
        writer.write_all(&[0xFF, 0xFE])?;
    }
    writer.write_all(&header.encoding.encode(&render_header(&header)))?;

    let columns = columns(plot);
    match header.format {
        DataFormat::Binary => write_binary(writer, &header, options.dialect, &columns)?,
        DataFormat::Ascii => {
            let text = ascii_data(&header, &columns);
            writer.write_all(&header.encoding.encode(&text))?;
        }
    }
    Ok(())
}

fn output_header(plot: &RawPlot, options: &EncodeOptions) -> RawHeader {
    let mut header = plot.header().clone();
    let binary = options.format == DataFormat::Binary;
    header.format = options.format;
    header.flags.fastaccess = binary && options.fastaccess;
    header.flags.double = options.dialect == RawDialect::Ltspice && options.double;
    header.flags.stepped = false;
    header.n_points = plot.axis().len();
    header.encoding = match options.dialect {
        RawDialect::Ltspice => TextEncoding::Utf16Le,
        RawDialect::Spice3 => TextEncoding::Utf8,
    };
    if options.dialect == RawDialect::Ltspice && header.command.is_empty() {
        header.command = "LTspice (spicerun)".to_string();
    }
    header
}

fn columns(plot: &RawPlot) -> Vec<Vec<SampleValue>> {
    let mut columns = vec![plot.axis().iter().map(|&t| SampleValue::Real(t)).collect()];
    columns.extend(
        plot.traces()
            .iter()
            .map(|t| t.samples().iter().map(|s| s.value).collect()),
    );
    columns
}

fn write_sample<W: Write>(writer: &mut W, value: SampleValue, width: usize) -> std::io::Result<()> {
    match width {
        16 => {
            writer.write_f64::<LittleEndian>(value.re())?;
            writer.write_f64::<LittleEndian>(value.im())
        }
        8 => writer.write_f64::<LittleEndian>(value.re()),
        _ => writer.write_f32::<LittleEndian>(value.re() as f32),
    }
}

fn write_binary<W: Write>(
    writer: &mut W,
    header: &RawHeader,
    dialect: RawDialect,
    columns: &[Vec<SampleValue>],
) -> std::io::Result<()> {
    let widths: Vec<usize> = (0..columns.len())
        .map(|i| sample_width(header, dialect, i))
        .collect();
    if header.flags.fastaccess {
        for (column, &width) in columns.iter().zip(&widths) {
            for &value in column {
                write_sample(writer, value, width)?;
            }
        }
    } else {
        for point in 0..header.n_points {
            for (column, &width) in columns.iter().zip(&widths) {
                write_sample(writer, column[point], width)?;
            }
        }
    }
    Ok(())
}

fn format_value(value: SampleValue, complex: bool) -> String {
    if complex {
        format!("{:e},{:e}", value.re(), value.im())
    } else {
        format!("{:e}", value.re())
    }
}

fn ascii_data(header: &RawHeader, columns: &[Vec<SampleValue>]) -> String {
    let complex = header.flags.complex;
    let mut out = String::new();
    for point in 0..header.n_points {
        for (var, column) in columns.iter().enumerate() {
            let value = format_value(column[point], complex);
            if var == 0 {
                out.push_str(&format!("{point}\t{value}\n"));
            } else {
                out.push_str(&format!("\t{value}\n"));
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_raw;
    use pretty_assertions::assert_eq;
    use spicerun_spec::{Sample, WaveformTrace};

    fn rc_plot() -> RawPlot {
        let axis = vec![0.0, 0.5e-3, 1e-3, 2e-3];
        let v = WaveformTrace::from_real("V(out)", "V", &axis, &[0.0, 0.25, 0.5, 0.75]).unwrap();
        let i = WaveformTrace::from_real("I(R1)", "A", &axis, &[1.0, 0.5, 0.25, 0.125]).unwrap();
        RawPlot::new("Transient Analysis", "time", "time", axis, vec![v, i]).unwrap()
    }

    #[test]
    fn test_spice3_binary_round_trip() {
        let plot = rc_plot();
        let bytes = encode_raw(&plot, &EncodeOptions::spice3()).unwrap();
        let decoded = decode_raw(&bytes).unwrap().into_primary();
        assert_eq!(decoded.axis(), plot.axis());
        assert_eq!(decoded.traces(), plot.traces());
    }

    #[test]
    fn test_ltspice_layouts_round_trip() {
        let plot = rc_plot();
        for options in [
            EncodeOptions::ltspice(),
            EncodeOptions::ltspice().double(),
            EncodeOptions::ltspice().fastaccess(),
            EncodeOptions::ltspice().ascii(),
        ] {
            let bytes = encode_raw(&plot, &options).unwrap();
            assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
            let decoded = decode_raw(&bytes).unwrap().into_primary();
            assert_eq!(decoded.dialect(), RawDialect::Ltspice, "{options:?}");
            assert_eq!(decoded.traces(), plot.traces(), "{options:?}");
        }
    }

    #[test]
    fn test_ltspice_binary_value_width() {
        let plot = rc_plot();
        let single = encode_raw(&plot, &EncodeOptions::ltspice()).unwrap();
        let double = encode_raw(&plot, &EncodeOptions::ltspice().double()).unwrap();
        // Two traces, four points, four extra bytes per value, plus the
        // longer flags line in UTF-16.
        let flag_bytes = " double".len() * 2;
        assert_eq!(double.len() - single.len(), 2 * 4 * 4 + flag_bytes);
    }

    #[test]
    fn test_complex_ascii_round_trip() {
        let axis = vec![1.0, 10.0, 100.0];
        let samples = axis
            .iter()
            .enumerate()
            .map(|(i, &f)| Sample {
                time: f,
                value: SampleValue::Complex {
                    re: 1.0 / (i as f64 + 1.0),
                    im: -0.5 * i as f64,
                },
            })
            .collect();
        let trace = WaveformTrace::new("V(out)", "V", samples).unwrap();
        let plot = RawPlot::new("AC Analysis", "frequency", "frequency", axis, vec![trace]).unwrap();
        assert!(plot.header().flags.complex);

        let bytes = encode_raw(&plot, &EncodeOptions::spice3().ascii()).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("Flags: complex"));
        let decoded = decode_raw(&bytes).unwrap().into_primary();
        assert_eq!(decoded.traces(), plot.traces());
        assert_eq!(decoded.trace("v(out)").unwrap().unit(), "V");
    }
}
