
//! The zip compression methods, compressing one scan line
//! or blocks of sixteen scan lines at once.
//! Combines the shared byte predictor with deflate.

use super::optimize_bytes::*;
use super::{ByteVec, Bytes};
use crate::error::Result;


/// Reverse the predictor and the deflate compression.
pub fn decompress_bytes(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let mut decompressed = super::uncompress_buffer(compressed, expected_byte_size)?;

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);

    Ok(decompressed)
}

/// Apply the predictor, then compress with deflate.
pub fn compress_bytes(uncompressed: Bytes<'_>, level: u8) -> Result<ByteVec> {
    let mut packed = Vec::from(uncompressed);

    separate_bytes_fragments(&mut packed);
    samples_to_differences(&mut packed);

    Ok(super::compress_buffer(level, &packed))
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip(){
        let datasets: Vec<Vec<u8>> = vec![
            vec![],
            vec![0; 512],
            (0..256).map(|value| value as u8).collect(),
            (0..2048_u32).map(|value| (value.wrapping_mul(0x9e3779b9) >> 17) as u8).collect(),
        ];

        for data in datasets {
            let compressed = compress_bytes(&data, 4).unwrap();
            let decompressed = decompress_bytes(&compressed, data.len()).unwrap();
            assert_eq!(decompressed, data);
        }
    }

    #[test]
    fn corrupt_stream_is_detected(){
        let data = vec![1_u8; 256];
        let mut compressed = compress_bytes(&data, 4).unwrap();

        let last = compressed.len() - 1;
        compressed[last] ^= 0xff;
        compressed[last / 2] ^= 0xff;

        assert!(decompress_bytes(&compressed, data.len()).is_err());
    }
}
