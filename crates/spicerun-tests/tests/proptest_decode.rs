//! Property-based tests for the raw decoder and override parsing.
//!
//! Decoding must never panic and must be all-or-nothing: a damaged file
//! yields an error, never a partial set of traces.

use proptest::prelude::*;
use spicerun_raw::{decode_raw, encode_raw, EncodeOptions, RawPlot};
use spicerun_spec::{parse_overrides, RawDialect, WaveformTrace};
use spicerun_tests::rc_raw_bytes;

/// Strictly increasing axis of `len` points.
fn axis_strategy(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1e-9f64..1e-3, len).prop_map(|steps| {
        steps
            .iter()
            .scan(0.0, |t, step| {
                let now = *t;
                *t += step;
                Some(now)
            })
            .collect()
    })
}

fn plot_strategy() -> impl Strategy<Value = RawPlot> {
    (2usize..40, 1usize..4).prop_flat_map(|(points, traces)| {
        (
            axis_strategy(points),
            prop::collection::vec(prop::collection::vec(-1e3f64..1e3, points), traces),
        )
            .prop_map(|(axis, columns)| {
                let traces = columns
                    .iter()
                    .enumerate()
                    .map(|(i, values)| {
                        WaveformTrace::from_real(format!("V(n{})", i), "V", &axis, values).unwrap()
                    })
                    .collect();
                RawPlot::new("Transient Analysis", "time", "time", axis, traces).unwrap()
            })
    })
}

proptest! {
    #[test]
    fn decode_never_panics_on_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_raw(&bytes);
    }

    #[test]
    fn decode_never_panics_on_corrupted_header(
        position in 0usize..200,
        byte in any::<u8>(),
    ) {
        let mut bytes = rc_raw_bytes(RawDialect::Spice3);
        let position = position % bytes.len();
        bytes[position] = byte;
        let _ = decode_raw(&bytes);
    }

    #[test]
    fn truncated_data_is_rejected(cut in 1usize..64) {
        let bytes = rc_raw_bytes(RawDialect::Spice3);
        let truncated = &bytes[..bytes.len() - cut];
        prop_assert!(decode_raw(truncated).is_err());
    }

    #[test]
    fn double_precision_binary_preserves_samples(plot in plot_strategy()) {
        let bytes = encode_raw(&plot, &EncodeOptions::spice3().double()).unwrap();
        let decoded = decode_raw(&bytes).unwrap().into_primary();
        prop_assert_eq!(decoded.axis(), plot.axis());
        prop_assert_eq!(decoded.traces(), plot.traces());
    }

    #[test]
    fn parse_overrides_never_panics(input in "[ -~]{0,64}") {
        let _ = parse_overrides(&input);
    }

    #[test]
    fn parsed_overrides_keep_every_pair(
        pairs in prop::collection::btree_map("[A-Z][A-Z0-9_]{0,6}", "[0-9]{1,3}(k|n|u|m)?", 1..6),
    ) {
        let input = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        let overrides = parse_overrides(&input).unwrap();
        prop_assert_eq!(overrides.len(), pairs.len());
        for (name, value) in &pairs {
            prop_assert_eq!(overrides.get(name), Some(value.as_str()));
        }
    }
}
