
//! The run length encoding compression method.
//! Combines the shared byte predictor with a simple run length coder.

use super::optimize_bytes::*;
use super::{ByteVec, Bytes};
use crate::error::{Error, ErrorKind, Result};

const MIN_RUN_LENGTH: usize = 3;
const MAX_RUN_LENGTH: usize = 127;


/// Reverse the predictor and the run length coding.
pub fn decompress_bytes(compressed: Bytes<'_>, expected_byte_size: usize, strict: bool) -> Result<ByteVec> {
    let mut decompressed = run_length_decode(compressed, expected_byte_size, strict)?;

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);

    Ok(decompressed)
}

/// Apply the predictor, then the run length coding.
pub fn compress_bytes(uncompressed: Bytes<'_>) -> Result<ByteVec> {
    let mut data = Vec::from(uncompressed);

    separate_bytes_fragments(&mut data);
    samples_to_differences(&mut data);

    Ok(run_length_encode(&data))
}


/// The plain run length coder: a signed count byte, followed by either
/// a single byte to repeat or a sequence of literal bytes.
pub fn run_length_encode(data: &[u8]) -> ByteVec {
    let mut compressed = Vec::with_capacity(data.len());
    let mut run_start = 0;
    let mut run_end = 1;

    while run_start < data.len() {
        while run_end < data.len()
            && data[run_start] == data[run_end]
            && (run_end - run_start) < MAX_RUN_LENGTH + 1
        {
            run_end += 1;
        }

        if run_end - run_start >= MIN_RUN_LENGTH {
            compressed.push(((run_end - run_start) as i32 - 1) as u8);
            compressed.push(data[run_start]);
            run_start = run_end;
        }
        else {
            while run_end < data.len()
                && (
                    (run_end + 1 >= data.len() || data[run_end] != data[run_end + 1])
                    || (run_end + 2 >= data.len() || data[run_end + 1] != data[run_end + 2])
                )
                && run_end - run_start < MAX_RUN_LENGTH
            {
                run_end += 1;
            }

            if run_end - run_start == 1 {
                // a lone literal byte is emitted as a run of one,
                // so that the count byte never has to be negative
                compressed.push(0);
                compressed.push(data[run_start]);
            }
            else {
                compressed.push((run_start as i32 - run_end as i32) as u8);
                compressed.extend_from_slice(&data[run_start .. run_end]);
            }

            run_start = run_end;
            run_end += 1;
        }
    }

    compressed
}

/// Reverse [`run_length_encode`]. Stops when the expected byte count
/// has been produced. Trailing input is an error in strict mode.
pub fn run_length_decode(compressed: Bytes<'_>, expected_byte_size: usize, strict: bool) -> Result<ByteVec> {
    let mut remaining = compressed;
    let mut decompressed = Vec::with_capacity(expected_byte_size.min(8 * 2048));

    while !remaining.is_empty() && decompressed.len() != expected_byte_size {
        let count = take_1(&mut remaining)? as i8 as i32;

        if count < 0 {
            // take the next '-count' bytes as-is
            let values = take_n(&mut remaining, (-count) as usize)?;
            decompressed.extend_from_slice(values);
        }
        else {
            // repeat the next value 'count + 1' times
            let value = take_1(&mut remaining)?;
            decompressed.resize(decompressed.len() + count as usize + 1, value);
        }
    }

    if strict && !remaining.is_empty() {
        return Err(Error::new(ErrorKind::CorruptChunk, "run length data exceeds expected length"));
    }

    if decompressed.len() > expected_byte_size {
        return Err(Error::new(ErrorKind::CorruptChunk, "run length data exceeds expected length"));
    }

    Ok(decompressed)
}

fn take_1(slice: &mut &[u8]) -> Result<u8> {
    if !slice.is_empty() {
        let result = slice[0];
        *slice = &slice[1..];
        Ok(result)
    }
    else {
        Err(Error::new(ErrorKind::CorruptChunk, "run length data ends unexpectedly"))
    }
}

fn take_n<'s>(slice: &mut &'s [u8], n: usize) -> Result<&'s [u8]> {
    if n <= slice.len() {
        let (front, back) = slice.split_at(n);
        *slice = back;
        Ok(front)
    }
    else {
        Err(Error::new(ErrorKind::CorruptChunk, "run length data ends unexpectedly"))
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_single_byte(){
        let data = [0x41_u8];

        let compressed = compress_bytes(&data).unwrap();

        // one byte cannot be predicted or interleaved into anything else,
        // so the result is a run of one: header 0, then the byte
        assert_eq!(compressed, [0x00, 0x41]);

        let decompressed = decompress_bytes(&compressed, data.len(), true).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn raw_coder_compresses_runs(){
        let data = [7_u8; 100];
        let encoded = run_length_encode(&data);
        assert_eq!(encoded, [99, 7]);

        let decoded = run_length_decode(&encoded, data.len(), true).unwrap();
        assert_eq!(decoded.as_slice(), &data[..]);
    }

    #[test]
    fn roundtrip_various_contents(){
        let datasets: Vec<Vec<u8>> = vec![
            vec![],
            vec![0; 19],
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
            (0..256).map(|value| value as u8).collect(),
            std::iter::repeat(&[0_u8, 0, 0, 0, 255, 255][..]).take(50).flatten().copied().collect(),
            (0..1024_u32).map(|value| (value.wrapping_mul(2654435761) >> 9) as u8).collect(),
        ];

        for data in datasets {
            let compressed = compress_bytes(&data).unwrap();
            let decompressed = decompress_bytes(&compressed, data.len(), true).unwrap();
            assert_eq!(decompressed, data);
        }
    }

    #[test]
    fn truncated_input_is_detected(){
        let data = [1_u8, 2, 3, 4, 5, 6, 7, 8];
        let compressed = compress_bytes(&data).unwrap();

        let error = decompress_bytes(&compressed[..compressed.len() - 1], data.len(), true);
        assert!(error.is_err() || error.unwrap().len() != data.len());
    }
}
