
//! The perceptual transfer curve applied before quantization.
//! Small values use a gamma 2.2 power curve, values above one
//! continue logarithmically. The curve is continuous and
//! monotonic, and maps zero to zero.

const GAMMA: f32 = 2.2;


/// Convert a linear sample into the perceptually uniform space
/// in which quantization errors are evenly visible.
#[inline]
pub fn to_nonlinear(linear: f32) -> f32 {
    let magnitude = linear.abs();

    let converted =
        if magnitude < 1.0 { magnitude.powf(1.0 / GAMMA) }
        else { 1.0 + magnitude.ln() / GAMMA };

    converted.copysign(linear)
}

/// Reverse [`to_nonlinear`].
#[inline]
pub fn to_linear(nonlinear: f32) -> f32 {
    let magnitude = nonlinear.abs();

    let converted =
        if magnitude < 1.0 { magnitude.powf(GAMMA) }
        else { (GAMMA * (magnitude - 1.0)).exp() };

    converted.copysign(nonlinear)
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_and_one_are_fixed_points(){
        assert_eq!(to_nonlinear(0.0), 0.0);
        assert_eq!(to_linear(0.0), 0.0);
        assert!((to_nonlinear(1.0) - 1.0).abs() < 1e-6);
        assert!((to_linear(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn roundtrip(){
        for &value in &[0.0, 1e-5, 0.01, 0.18, 0.5, 0.99, 1.0, 1.5, 4.0, 100.0, 65504.0] {
            for &signed in &[value, -value] {
                let there = to_nonlinear(signed);
                let back = to_linear(there);

                let tolerance = (signed.abs() * 1e-5).max(1e-7);
                assert!(
                    (back - signed).abs() <= tolerance,
                    "{} -> {} -> {}", signed, there, back
                );
            }
        }
    }

    #[test]
    fn curve_is_monotonic(){
        let mut previous = to_nonlinear(-100.0);

        for step in -1000..=1000 {
            let value = step as f32 * 0.1;
            let converted = to_nonlinear(value);
            assert!(converted >= previous);
            previous = converted;
        }
    }
}
