#![forbid(unsafe_code)]

//! Tile scale factor as a function of columns per row and user correction.
//!
//! | columns | base factor |
//! |---------|-------------|
//! | 0, 3    | 1.00        |
//! | 4       | 0.85        |
//! | 5       | 0.75        |
//! | 6       | 0.65        |
//!
//! Unrecognized column counts use the `0` row. The correction is added as
//! `percent / 100`. No rounding happens here; [`scale`] rounds derived
//! integer geometry half away from zero.

/// Base factor for a column count.
#[must_use]
pub fn base_factor(columns: i32) -> f32 {
    match columns {
        4 => 0.85,
        5 => 0.75,
        6 => 0.65,
        _ => 1.0,
    }
}

/// Multiplicative scale factor for tile geometry.
#[must_use]
pub fn factor(columns: i32, correction_percent: i32) -> f32 {
    base_factor(columns) + correction_percent as f32 / 100.0
}

/// Scale an integer geometry value, rounding half away from zero.
#[must_use]
pub fn scale(value: i32, factor: f32) -> i32 {
    (value as f32 * factor).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_at_zero_correction() {
        for (columns, expected) in [(0, 1.0), (3, 1.0), (4, 0.85), (5, 0.75), (6, 0.65)] {
            assert_eq!(factor(columns, 0), expected, "columns={columns}");
        }
    }

    #[test]
    fn unknown_columns_fall_back_to_unit() {
        assert_eq!(factor(2, 0), 1.0);
        assert_eq!(factor(7, 0), 1.0);
        assert_eq!(factor(-1, 5), factor(0, 5));
    }

    #[test]
    fn correction_is_additive() {
        assert!((factor(4, 10) - 0.95).abs() < 1e-6);
        assert!((factor(3, -20) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn scale_rounds_half_away_from_zero() {
        assert_eq!(scale(120, factor(4, 10)), 114);
        assert_eq!(scale(100, 0.85), 85);
        assert_eq!(scale(5, 0.5), 3);
        assert_eq!(scale(-5, 0.5), -3);
    }
}
