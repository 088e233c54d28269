
//! Color space conversion between R'G'B' and Y'CbCr,
//! using the Rec. 709 luma weights.
//! The chroma components are not offset, so that zero input
//! converts to zero output and compresses maximally.

const YR: f32 = 0.2126;
const YG: f32 = 0.7152;
const YB: f32 = 0.0722;

const CB_SCALE: f32 = 1.8556; // 2 * (1 - YB)
const CR_SCALE: f32 = 1.5748; // 2 * (1 - YR)


/// Convert a single pixel from RGB to Y'CbCr.
#[inline]
pub fn forward(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let y = YR * r + YG * g + YB * b;
    let cb = (b - y) / CB_SCALE;
    let cr = (r - y) / CR_SCALE;

    (y, cb, cr)
}

/// Convert a single pixel from Y'CbCr back to RGB.
#[inline]
pub fn inverse(y: f32, cb: f32, cr: f32) -> (f32, f32, f32) {
    let r = y + cr * CR_SCALE;
    let b = y + cb * CB_SCALE;
    let g = (y - YR * r - YB * b) / YG;

    (r, g, b)
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_maps_to_zero(){
        assert_eq!(forward(0.0, 0.0, 0.0), (0.0, 0.0, 0.0));
        assert_eq!(inverse(0.0, 0.0, 0.0), (0.0, 0.0, 0.0));
    }

    #[test]
    fn roundtrip(){
        let pixels = [
            (1.0, 1.0, 1.0),
            (0.18, 0.18, 0.18),
            (0.9, 0.1, 0.05),
            (0.0, 0.5, 1.5),
            (12.0, 0.25, 3.0),
        ];

        for &(r, g, b) in &pixels {
            let (y, cb, cr) = forward(r, g, b);
            let (r2, g2, b2) = inverse(y, cb, cr);

            assert!((r - r2).abs() < 1e-4);
            assert!((g - g2).abs() < 1e-4);
            assert!((b - b2).abs() < 1e-4);
        }
    }

    #[test]
    fn grey_has_no_chroma(){
        let (y, cb, cr) = forward(0.5, 0.5, 0.5);
        assert!((y - 0.5).abs() < 1e-6);
        assert!(cb.abs() < 1e-6);
        assert!(cr.abs() < 1e-6);
    }
}
