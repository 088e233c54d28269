
//! Quantization of half precision frequency coefficients.
//! A coefficient is replaced by the half float with the fewest set bits
//! that stays within the acceptable error for its frequency.
//! Halfs with fewer set bits deflate better.

use half::f16;

use super::tables::{CHROMA_QUANTIZATION, LUMA_QUANTIZATION, QUANTIZATION_MIDPOINT};


/// The acceptable absolute errors for the 64 coefficients of a block,
/// derived from the base error and the frequency weight table.
#[derive(Debug, Clone)]
pub struct QuantizationTable {
    tolerances: [f32; 64],
}

impl QuantizationTable {

    /// Build the tolerance table for luminance and for channels
    /// that are compressed without color conversion.
    pub fn luma(base_error: f32) -> Self {
        Self::from_weights(base_error, &LUMA_QUANTIZATION)
    }

    /// Build the tolerance table for the chroma components.
    pub fn chroma(base_error: f32) -> Self {
        Self::from_weights(base_error, &CHROMA_QUANTIZATION)
    }

    fn from_weights(base_error: f32, weights: &[f32; 64]) -> Self {
        let mut tolerances = [0.0; 64];

        for (tolerance, weight) in tolerances.iter_mut().zip(weights.iter()) {
            *tolerance = base_error.max(0.0) * (weight / QUANTIZATION_MIDPOINT);
        }

        QuantizationTable { tolerances }
    }

    /// Quantize the coefficient at the specified position of a block.
    pub fn quantize(&self, coefficient_index: usize, coefficient: f16) -> f16 {
        quantize(coefficient, self.tolerances[coefficient_index])
    }
}


/// The half float with the fewest set bits
/// within the specified distance of the input.
/// Candidates are the inputs with progressively more
/// trailing significand bits removed, 15 at most.
pub fn quantize(value: f16, tolerance: f32) -> f16 {
    let source_bits = value.to_bits();
    if source_bits == 0 || tolerance <= 0.0 {
        return value;
    }

    let target = value.to_f32();

    let mut best_bits = source_bits;
    let mut best_count = source_bits.count_ones();

    let mut candidate = source_bits;
    while candidate != 0 {
        // clear the lowest set bit
        candidate &= candidate - 1;

        let candidate_value = f16::from_bits(candidate);
        let error = (candidate_value.to_f32() - target).abs();

        if error <= tolerance && candidate.count_ones() < best_count {
            best_bits = candidate;
            best_count = candidate.count_ones();
        }
    }

    f16::from_bits(best_bits)
}
