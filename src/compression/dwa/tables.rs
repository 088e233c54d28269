
//! Quantization base tables and the zig-zag coefficient order.

/// The classic luminance quantization base table,
/// relative error weights per frequency coefficient.
pub const LUMA_QUANTIZATION: [f32; 64] = [
    16.0, 11.0, 10.0, 16.0, 24.0, 40.0, 51.0, 61.0,
    12.0, 12.0, 14.0, 19.0, 26.0, 58.0, 60.0, 55.0,
    14.0, 13.0, 16.0, 24.0, 40.0, 57.0, 69.0, 56.0,
    14.0, 17.0, 22.0, 29.0, 51.0, 87.0, 80.0, 62.0,
    18.0, 22.0, 37.0, 56.0, 68.0, 109.0, 103.0, 77.0,
    24.0, 35.0, 55.0, 64.0, 81.0, 104.0, 113.0, 92.0,
    49.0, 64.0, 78.0, 87.0, 103.0, 121.0, 120.0, 101.0,
    72.0, 92.0, 95.0, 98.0, 112.0, 100.0, 103.0, 99.0,
];

/// The chrominance counterpart of [`LUMA_QUANTIZATION`].
pub const CHROMA_QUANTIZATION: [f32; 64] = [
    17.0, 18.0, 24.0, 47.0, 99.0, 99.0, 99.0, 99.0,
    18.0, 21.0, 26.0, 66.0, 99.0, 99.0, 99.0, 99.0,
    24.0, 26.0, 56.0, 99.0, 99.0, 99.0, 99.0, 99.0,
    47.0, 66.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0,
    99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0,
    99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0,
    99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0,
    99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0,
];

// the tables describe error weights relative to this midpoint
pub const QUANTIZATION_MIDPOINT: f32 = 16.0;

/// The order in which the 63 AC coefficients of an 8×8 block are serialized,
/// walking the block in diagonals from low to high frequencies.
pub const ZIG_ZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10,
    17, 24, 32, 25, 18, 11, 4, 5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13, 6, 7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zig_zag_is_a_permutation(){
        let mut seen = [false; 64];
        for &index in &ZIG_ZAG {
            assert!(!seen[index]);
            seen[index] = true;
        }
    }

    #[test]
    fn zig_zag_starts_at_the_dc_coefficient(){
        assert_eq!(ZIG_ZAG[0], 0);
        assert_eq!(ZIG_ZAG[1], 1);
        assert_eq!(ZIG_ZAG[2], 8);
    }
}
