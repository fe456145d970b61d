//! Linear intensity rescaling into a narrower output depth.

use crate::format::pixels::{put_unsigned, sample_at};
use crate::format::{PixelType, SampleRange};

/// Map `value` from `range` onto `0..=max_out`.
///
/// The range minimum maps to 0 and the maximum to `max_out`. A degenerate
/// range (constant plane) maps everything to 0.
pub fn scale_sample(value: f64, range: SampleRange, max_out: f64) -> f64 {
    let span = range.max - range.min;
    if span <= 0.0 || !span.is_finite() {
        return 0.0;
    }
    ((value - range.min) / span * max_out).round().clamp(0.0, max_out)
}

/// One range covering every channel of a plane.
pub fn combined_range(ranges: &[SampleRange]) -> Option<SampleRange> {
    let (first, rest) = ranges.split_first()?;
    Some(rest.iter().fold(*first, |acc, r| acc.union(r)))
}

/// Rescale every sample of a buffer into `target`.
///
/// `target` must be [`PixelType::Uint8`] or [`PixelType::Uint16`]; any other
/// type is treated as 8-bit. Sample order is preserved; 16-bit output uses
/// the byte order given by `little_endian`.
pub fn autoscale(
    bytes: &[u8],
    pixel_type: PixelType,
    little_endian: bool,
    range: SampleRange,
    target: PixelType,
) -> Vec<u8> {
    let count = bytes.len() / pixel_type.bytes_per_pixel();
    let (out_bytes, max_out) = match target {
        PixelType::Uint16 => (2, u16::MAX as f64),
        _ => (1, u8::MAX as f64),
    };

    let mut out = vec![0u8; count * out_bytes];
    for i in 0..count {
        let value = sample_at(bytes, i, pixel_type, little_endian);
        let scaled = scale_sample(value, range, max_out) as u64;
        put_unsigned(
            &mut out[i * out_bytes..(i + 1) * out_bytes],
            scaled,
            out_bytes,
            little_endian,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_and_max_hit_the_ends() {
        let bytes: Vec<u8> = [100u16, 150, 300]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let range = SampleRange {
            min: 100.0,
            max: 300.0,
        };
        let out = autoscale(&bytes, PixelType::Uint16, true, range, PixelType::Uint8);
        assert_eq!(out, vec![0, 64, 255]);
    }

    #[test]
    fn test_constant_plane_maps_to_zero() {
        let range = SampleRange { min: 7.0, max: 7.0 };
        let out = autoscale(&[7, 7, 7], PixelType::Uint8, true, range, PixelType::Uint8);
        assert_eq!(out, vec![0, 0, 0]);
    }

    #[test]
    fn test_signed_and_float_input() {
        let bytes: Vec<u8> = [-1.0f32, 0.0, 1.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let range = SampleRange { min: -1.0, max: 1.0 };
        let out = autoscale(&bytes, PixelType::Float, true, range, PixelType::Uint8);
        assert_eq!(out, vec![0, 128, 255]);
    }

    #[test]
    fn test_sixteen_bit_target() {
        let range = SampleRange { min: 0.0, max: 255.0 };
        let out = autoscale(&[0, 255], PixelType::Uint8, false, range, PixelType::Uint16);
        assert_eq!(out, vec![0, 0, 0xFF, 0xFF]);
    }

    #[test]
    fn test_combined_range() {
        let ranges = [
            SampleRange { min: 3.0, max: 9.0 },
            SampleRange { min: -2.0, max: 4.0 },
        ];
        assert_eq!(
            combined_range(&ranges),
            Some(SampleRange { min: -2.0, max: 9.0 })
        );
        assert_eq!(combined_range(&[]), None);
    }

    #[test]
    fn test_values_outside_range_clamp() {
        let range = SampleRange { min: 10.0, max: 20.0 };
        assert_eq!(scale_sample(5.0, range, 255.0), 0.0);
        assert_eq!(scale_sample(25.0, range, 255.0), 255.0);
    }
}
