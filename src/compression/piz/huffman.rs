
//! 16-bit canonical huffman compression and decompression.
//! Codes are canonical, so the table can be transmitted as code lengths alone:
//! shorter codes, if filled with zeroes to the right, have a numerically
//! higher value than longer codes, and for codes with the same length,
//! numerical values increase with numerical symbol values.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;

use crate::compression::{ByteVec, Bytes};
use crate::error::{u64_to_usize, usize_to_u64, Error, ErrorKind, Result};
use crate::io::Data;


const ENCODE_BITS: u64 = 16; // literal (value) bit length
const DECODE_BITS: u64 = 14; // decoding bit size (>= 8)

const ENCODE_SIZE: usize = (1 << ENCODE_BITS) + 1; // encoding table size
const DECODE_SIZE: usize = 1 << DECODE_BITS; // decoding table size
const DECODE_MASK: u64 = DECODE_SIZE as u64 - 1;

const MAX_CODE_LENGTH: u64 = 58;

const SHORT_ZEROCODE_RUN: u64 = 59;
const LONG_ZEROCODE_RUN: u64 = 63;
const SHORTEST_LONG_RUN: u64 = 2 + LONG_ZEROCODE_RUN - SHORT_ZEROCODE_RUN;
const LONGEST_LONG_RUN: u64 = 255 + SHORTEST_LONG_RUN;


/// Huffman-encode a sequence of 16-bit values,
/// prepending the packed code length table.
pub fn compress(uncompressed: &[u16]) -> Result<ByteVec> {
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }

    let mut frequencies = count_frequencies(uncompressed);
    let (min_index, max_index) = build_encoding_table(&mut frequencies);

    let packed_table = pack_encoding_table(&frequencies, min_index, max_index)?;
    let (data, bit_count) = encode_symbols(&frequencies, uncompressed, max_index)?;

    let mut result = Vec::with_capacity(5 * u32::BYTE_SIZE + packed_table.len() + data.len());

    (min_index as u32).write(&mut result)?;
    (max_index as u32).write(&mut result)?;
    (packed_table.len() as u32).write(&mut result)?;
    (bit_count as u32).write(&mut result)?;
    0_u32.write(&mut result)?; // reserved

    result.extend_from_slice(&packed_table);
    result.extend_from_slice(&data);

    Ok(result)
}

/// Reverse [`compress`], producing exactly the expected number of 16-bit values.
pub fn decompress(compressed: Bytes<'_>, expected_size: usize) -> Result<Vec<u16>> {
    if expected_size == 0 {
        return Ok(Vec::new());
    }

    let mut remaining = compressed;
    let read = &mut remaining;

    let min_index = u64_to_usize(u32::read(read)? as u64);
    let max_index = u64_to_usize(u32::read(read)? as u64);
    let table_byte_count = u64_to_usize(u32::read(read)? as u64);
    let bit_count = u32::read(read)? as u64;
    let _reserved = u32::read(read)?;

    if min_index >= ENCODE_SIZE || max_index >= ENCODE_SIZE || min_index > max_index {
        return Err(invalid_data());
    }

    if table_byte_count > read.len() {
        return Err(invalid_data());
    }

    let (table_bytes, data_bytes) = read.split_at(table_byte_count);

    if usize_to_u64(data_bytes.len()) * 8 < bit_count {
        return Err(invalid_data());
    }

    let codes = unpack_encoding_table(table_bytes, min_index, max_index)?;
    decode_symbols(&codes, data_bytes, expected_size, max_index)
}

fn invalid_data() -> Error {
    Error::new(ErrorKind::CorruptChunk, "huffman data is corrupt")
}

fn invalid_table() -> Error {
    Error::new(ErrorKind::CorruptChunk, "huffman code table is corrupt")
}


#[inline]
fn code_length(code: u64) -> u64 {
    code & 63
}

#[inline]
fn code_bits(code: u64) -> u64 {
    code >> 6
}


fn count_frequencies(data: &[u16]) -> Vec<u64> {
    let mut frequencies = vec![0_u64; ENCODE_SIZE];

    for &value in data {
        frequencies[value as usize] += 1;
    }

    frequencies
}


/// Compute huffman code lengths (based on the input frequencies)
/// and store the canonical codes in the same array.
/// Code structure is `[63:lsb - 6:msb] | [5-0: bit length]`.
/// Returns the minimum and maximum indices with a non-zero frequency.
/// The maximum index is the added pseudo-symbol used for run length encoding.
fn build_encoding_table(frequencies: &mut [u64]) -> (usize, usize) {
    debug_assert_eq!(frequencies.len(), ENCODE_SIZE);

    let min_index = frequencies.iter().position(|&frequency| frequency != 0).unwrap_or(0);

    // The loop below does not build a tree; instead, the distances of the
    // leaves from the root are computed on the fly. When a new node is added
    // to the heap, its descendants are linked into a single linear list
    // starting at that node, and the code lengths of the descendants
    // (that is, their distance from the root of the tree) are incremented by one.
    let mut links: Vec<usize> = (0..ENCODE_SIZE).collect();
    let mut code_lengths = vec![0_u64; ENCODE_SIZE];

    // heap of (frequency, symbol), the least frequent symbol on top.
    // ties resolve to the smaller symbol for deterministic output
    let mut heap = BinaryHeap::with_capacity(1024);
    let mut max_index = min_index;

    for (index, &frequency) in frequencies.iter().enumerate().skip(min_index) {
        if frequency != 0 {
            heap.push(Reverse((frequency, index)));
            max_index = index;
        }
    }

    // add a pseudo-symbol with a frequency count of 1.
    // the encoder uses the pseudo-symbol for run length encoding
    max_index += 1;
    frequencies[max_index] = 1;
    heap.push(Reverse((1, max_index)));

    // repeatedly merge the two least frequent nodes,
    // lengthening the codes of all their descendants by one bit
    while heap.len() > 1 {
        let Reverse((least_frequency, least)) = heap.pop().unwrap();
        let Reverse((merged_frequency, merged)) = heap.pop().unwrap();

        heap.push(Reverse((least_frequency + merged_frequency, merged)));

        let mut index = merged;
        loop {
            code_lengths[index] += 1;
            debug_assert!(code_lengths[index] <= MAX_CODE_LENGTH, "huffman code length overflow bug");

            if links[index] == index {
                // merge the two linked lists
                links[index] = least;
                break;
            }

            index = links[index];
        }

        let mut index = least;
        loop {
            code_lengths[index] += 1;
            debug_assert!(code_lengths[index] <= MAX_CODE_LENGTH, "huffman code length overflow bug");

            if links[index] == index { break; }
            index = links[index];
        }
    }

    build_canonical_table(&mut code_lengths);
    frequencies.copy_from_slice(&code_lengths);

    (min_index, max_index)
}

/// Assign the canonical code values to the code lengths in place.
fn build_canonical_table(code_lengths: &mut [u64]) {
    debug_assert_eq!(code_lengths.len(), ENCODE_SIZE);

    // for each code length, count the number of codes with that length
    let mut count_per_length = [0_u64; (MAX_CODE_LENGTH + 1) as usize];
    for &length in code_lengths.iter() {
        count_per_length[length as usize] += 1;
    }

    // for each code length, compute the numerically lowest code with that length
    let mut code = 0_u64;
    for length in (1 ..= MAX_CODE_LENGTH as usize).rev() {
        let next_code = (code + count_per_length[length]) >> 1;
        count_per_length[length] = code;
        code = next_code;
    }

    // assign the next available code of each symbol's length to the symbol
    for code_length in code_lengths.iter_mut() {
        let length = *code_length;
        if length > 0 {
            *code_length = length | (count_per_length[length as usize] << 6);
            count_per_length[length as usize] += 1;
        }
    }
}


#[derive(Default)]
struct BitWriter {
    bytes: ByteVec,
    accumulator: u64,
    bit_buffer_length: u64,
    bit_count: u64,
}

impl BitWriter {

    #[inline]
    fn write_bits(&mut self, count: u64, bits: u64) {
        debug_assert!(count <= 58, "bit count out of range bug");

        self.accumulator = (self.accumulator << count) | bits;
        self.bit_buffer_length += count;
        self.bit_count += count;

        while self.bit_buffer_length >= 8 {
            self.bit_buffer_length -= 8;
            self.bytes.push((self.accumulator >> self.bit_buffer_length) as u8);
        }
    }

    #[inline]
    fn write_code(&mut self, code: u64) {
        self.write_bits(code_length(code), code_bits(code));
    }

    fn finish(mut self) -> (ByteVec, u64) {
        if self.bit_buffer_length > 0 {
            // pad the final byte with zeroes
            self.bytes.push((self.accumulator << (8 - self.bit_buffer_length)) as u8);
        }

        (self.bytes, self.bit_count)
    }
}


/// Pack the code lengths of the symbols between the
/// specified indices into a sequence of 6-bit records,
/// compressing runs of unused symbols.
fn pack_encoding_table(codes: &[u64], min_index: usize, max_index: usize) -> Result<ByteVec> {
    let mut writer = BitWriter::default();
    let mut index = min_index;

    while index <= max_index {
        let length = code_length(codes[index]);

        if length == 0 {
            let mut zero_run = 1_u64;

            while index < max_index && zero_run < LONGEST_LONG_RUN {
                if code_length(codes[index + 1]) > 0 { break; }
                index += 1;
                zero_run += 1;
            }

            if zero_run >= 2 {
                if zero_run >= SHORTEST_LONG_RUN {
                    writer.write_bits(6, LONG_ZEROCODE_RUN);
                    writer.write_bits(8, zero_run - SHORTEST_LONG_RUN);
                }
                else {
                    writer.write_bits(6, SHORT_ZEROCODE_RUN + zero_run - 2);
                }

                index += 1;
                continue;
            }
        }

        writer.write_bits(6, length);
        index += 1;
    }

    let (bytes, _bits) = writer.finish();
    Ok(bytes)
}

/// Reverse [`pack_encoding_table`], regenerating the canonical codes
/// from the transmitted code lengths.
fn unpack_encoding_table(table_bytes: Bytes<'_>, min_index: usize, max_index: usize) -> Result<Vec<u64>> {
    let mut reader = BitReader::new(table_bytes);
    let mut code_lengths = vec![0_u64; ENCODE_SIZE];

    let mut index = min_index;
    while index <= max_index {
        let length = reader.read_bits(6).ok_or_else(invalid_table)?;

        if length == LONG_ZEROCODE_RUN {
            let zero_run = reader.read_bits(8).ok_or_else(invalid_table)? + SHORTEST_LONG_RUN;

            if index + u64_to_usize(zero_run) > max_index + 1 {
                return Err(invalid_table());
            }

            index += u64_to_usize(zero_run);
        }
        else if length >= SHORT_ZEROCODE_RUN {
            let zero_run = length - SHORT_ZEROCODE_RUN + 2;

            if index + u64_to_usize(zero_run) > max_index + 1 {
                return Err(invalid_table());
            }

            index += u64_to_usize(zero_run);
        }
        else {
            code_lengths[index] = length;
            index += 1;
        }
    }

    build_canonical_table(&mut code_lengths);
    Ok(code_lengths)
}


/// Huffman-encode the values, using the pseudo-symbol
/// at `rle_index` to compress runs of equal values.
fn encode_symbols(codes: &[u64], data: &[u16], rle_index: usize) -> Result<(ByteVec, u64)> {
    let rle_code = codes[rle_index];
    let mut writer = BitWriter::default();

    let mut run_value = data[0];
    let mut run_count = 0_u64; // repetitions beyond the first value

    let mut send = |writer: &mut BitWriter, value: u16, run_count: u64| -> Result<()> {
        let code = codes[value as usize];

        if code_length(code) == 0 {
            return Err(Error::new(ErrorKind::CompressionFailed, "symbol misses huffman code"));
        }

        if run_count > 0
            && code_length(code) + code_length(rle_code) + 8 < code_length(code) * run_count
        {
            writer.write_code(code);
            writer.write_code(rle_code);
            writer.write_bits(8, run_count);
        }
        else {
            for _ in 0 ..= run_count {
                writer.write_code(code);
            }
        }

        Ok(())
    };

    for &value in &data[1..] {
        if value == run_value && run_count < 255 {
            run_count += 1;
        }
        else {
            send(&mut writer, run_value, run_count)?;
            run_value = value;
            run_count = 0;
        }
    }

    send(&mut writer, run_value, run_count)?;

    Ok(writer.finish())
}


struct BitReader<'b> {
    bytes: Bytes<'b>,
    position: usize,
    accumulator: u64,
    bit_buffer_length: u64,
}

impl<'b> BitReader<'b> {

    fn new(bytes: Bytes<'b>) -> Self {
        BitReader { bytes, position: 0, accumulator: 0, bit_buffer_length: 0 }
    }

    /// Pull bytes into the accumulator until
    /// the requested number of bits is buffered.
    #[inline]
    fn fill(&mut self, count: u64) {
        while self.bit_buffer_length < count && self.position < self.bytes.len() {
            self.accumulator = (self.accumulator << 8) | self.bytes[self.position] as u64;
            self.position += 1;
            self.bit_buffer_length += 8;
        }
    }

    #[inline]
    fn read_bits(&mut self, count: u64) -> Option<u64> {
        self.fill(count);
        if self.bit_buffer_length < count { return None; }

        self.bit_buffer_length -= count;
        Some((self.accumulator >> self.bit_buffer_length) & ((1 << count) - 1))
    }

    /// The next `count` bits without consuming them,
    /// padded with zeroes when the input has ended.
    #[inline]
    fn peek_bits_zero_padded(&mut self, count: u64) -> u64 {
        self.fill(count);

        if self.bit_buffer_length >= count {
            (self.accumulator >> (self.bit_buffer_length - count)) & ((1 << count) - 1)
        }
        else {
            (self.accumulator << (count - self.bit_buffer_length)) & ((1 << count) - 1)
        }
    }

    #[inline]
    fn skip_bits(&mut self, count: u64) -> Option<()> {
        if self.bit_buffer_length < count { return None; }
        self.bit_buffer_length -= count;
        Some(())
    }
}


#[derive(Clone, Copy, Default)]
struct ShortCode {
    length: u8,
    symbol: u32,
}

/// Decode the huffman bit stream into exactly `expected_size` values.
fn decode_symbols(codes: &[u64], data: Bytes<'_>, expected_size: usize, rle_index: usize) -> Result<Vec<u16>> {

    // table for all codes of up to DECODE_BITS length, indexed by the next 14 bits of input.
    // longer codes are collected in a map from (length, code) to symbol
    let mut short_table = vec![ShortCode::default(); DECODE_SIZE];
    let mut long_codes: HashMap<(u8, u64), u32> = HashMap::new();

    for (symbol, &code) in codes.iter().enumerate() {
        let length = code_length(code);
        if length == 0 { continue; }

        if length > MAX_CODE_LENGTH {
            return Err(invalid_table());
        }

        if length <= DECODE_BITS {
            let start = u64_to_usize(code_bits(code) << (DECODE_BITS - length));
            let count = 1_usize << (DECODE_BITS - length);

            if start + count > DECODE_SIZE {
                return Err(invalid_table());
            }

            for entry in &mut short_table[start .. start + count] {
                if entry.length != 0 {
                    return Err(invalid_table());
                }

                entry.length = length as u8;
                entry.symbol = symbol as u32;
            }
        }
        else {
            long_codes.insert((length as u8, code_bits(code)), symbol as u32);
        }
    }

    let mut reader = BitReader::new(data);
    let mut result = Vec::with_capacity(expected_size);

    while result.len() < expected_size {
        let entry = short_table[u64_to_usize(reader.peek_bits_zero_padded(DECODE_BITS))];

        let symbol = if entry.length != 0 {
            reader.skip_bits(entry.length as u64).ok_or_else(invalid_data)?;
            entry.symbol
        }
        else {
            // search for a long code, from shortest to longest
            let mut found = None;

            for length in DECODE_BITS + 1 ..= MAX_CODE_LENGTH {
                reader.fill(length);
                if reader.bit_buffer_length < length { break; }

                let candidate = (reader.accumulator >> (reader.bit_buffer_length - length)) & ((1 << length) - 1);

                if let Some(&symbol) = long_codes.get(&(length as u8, candidate)) {
                    reader.skip_bits(length).ok_or_else(invalid_data)?;
                    found = Some(symbol);
                    break;
                }
            }

            found.ok_or_else(invalid_data)?
        };

        if symbol as usize == rle_index {
            // repeat the previous value
            let &previous = result.last().ok_or_else(invalid_data)?;
            let repetitions = reader.read_bits(8).ok_or_else(invalid_data)?;

            if result.len() + u64_to_usize(repetitions) > expected_size {
                return Err(invalid_data());
            }

            result.resize(result.len() + u64_to_usize(repetitions), previous);
        }
        else {
            if symbol > u16::MAX as u32 {
                return Err(invalid_data());
            }

            result.push(symbol as u16);
        }
    }

    Ok(result)
}


#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(data: &[u16]) {
        let compressed = compress(data).unwrap();
        let decompressed = decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn roundtrip_simple_sequences(){
        roundtrip(&[0]);
        roundtrip(&[0, 0, 0, 0, 0, 0]);
        roundtrip(&[1, 2, 3, 4, 5, 6, 7, 8]);
        roundtrip(&[65535, 0, 65535, 0, 1]);
        roundtrip(&(0..4096).map(|value| value as u16).collect::<Vec<_>>());
    }

    #[test]
    fn roundtrip_long_runs(){
        let mut data = vec![99_u16; 10_000];
        data.extend(std::iter::repeat(3).take(300));
        data.push(12);
        roundtrip(&data);
    }

    #[test]
    fn roundtrip_noise(){
        let mut state = 0x2545F4914F6CDD1D_u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let few_symbols: Vec<u16> = (0..10_000).map(|_| (next() % 7) as u16).collect();
        roundtrip(&few_symbols);

        let many_symbols: Vec<u16> = (0..30_000).map(|_| next() as u16).collect();
        roundtrip(&many_symbols);
    }

    #[test]
    fn corrupt_data_does_not_panic(){
        let data: Vec<u16> = (0..2000).map(|value| (value % 50) as u16).collect();
        let compressed = compress(&data).unwrap();

        for cut in [0, 4, 9, 12, 20, compressed.len() / 2] {
            let _ = decompress(&compressed[..cut], data.len());
        }

        let mut corrupt = compressed;
        for index in (0 .. corrupt.len()).step_by(5) {
            corrupt[index] ^= 0b1010_1010;
        }

        let _ = decompress(&corrupt, data.len());
    }
}
