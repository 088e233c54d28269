
//! Lossy compression packing 4×4 blocks of `f16` pixels
//! into a fixed number of bytes.
//! Channels of other sample types are stored unmodified.

use super::{ByteVec, Bytes};
use crate::error::*;
use crate::math::{mod_p, Vec2};
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};


/// The byte value in the shift position that marks a 3-byte flat block.
/// Valid shift values never reach this range.
const FLAT_BLOCK_MARKER: u8 = 0xfc;

const BIAS: i32 = 0x20;


#[inline]
fn shift_and_round(x: i32, shift: i32) -> i32 {
    let x = x << 1;
    let a = (1 << shift) - 1;
    let shift = shift + 1;
    let b = (x >> shift) & 1;
    (x + a + b) >> shift
}

/// Pack a block of 4 by 4 16-bit pixels (32 bytes)
/// into either 14 or 3 bytes, returning the packed size.
fn pack(s: [u16; 16], b: &mut [u8; 14], flat_fields: bool, exact_max: bool) -> usize {

    // bias the sign bit away, so that the ordering
    // of the biased values matches the ordering of the floats.
    // non-finite values collapse to zero
    let mut t = [0_u16; 16];

    for i in 0..16 {
        if (s[i] & 0x7c00) == 0x7c00 {
            t[i] = 0x8000;
        }
        else if (s[i] & 0x8000) != 0 {
            t[i] = !s[i];
        }
        else {
            t[i] = s[i] | 0x8000;
        }
    }

    let t_max = t.iter().copied().max().expect("block is never empty");

    // Compute a set of running differences, r[0] ... r[14]:
    // find a shift value such that after rounding off the
    // rightmost bits and shifting, all differences are between
    // -32 and +31. Then bias the differences so that they
    // end up between 0 and 63.
    let mut shift = -1_i32;
    let mut d = [0_i32; 16];
    let mut r = [0_i32; 15];
    let mut r_min: i32;
    let mut r_max: i32;

    loop {
        shift += 1;

        // compute absolute differences between t_max and each value,
        // and shift and round them
        for i in 0..16 {
            d[i] = shift_and_round((t_max - t[i]) as i32, shift);
        }

        // convert d into running differences along the block edges
        r[0] = d[0] - d[4] + BIAS;
        r[1] = d[4] - d[8] + BIAS;
        r[2] = d[8] - d[12] + BIAS;

        r[3] = d[0] - d[1] + BIAS;
        r[4] = d[4] - d[5] + BIAS;
        r[5] = d[8] - d[9] + BIAS;
        r[6] = d[12] - d[13] + BIAS;

        r[7] = d[1] - d[2] + BIAS;
        r[8] = d[5] - d[6] + BIAS;
        r[9] = d[9] - d[10] + BIAS;
        r[10] = d[13] - d[14] + BIAS;

        r[11] = d[2] - d[3] + BIAS;
        r[12] = d[6] - d[7] + BIAS;
        r[13] = d[10] - d[11] + BIAS;
        r[14] = d[14] - d[15] + BIAS;

        r_min = r.iter().copied().min().expect("r is never empty");
        r_max = r.iter().copied().max().expect("r is never empty");

        if r_min >= 0 && r_max <= 0x3f {
            break;
        }
    }

    if r_min == BIAS && r_max == BIAS && flat_fields {
        // Special case - all pixels have the same value.
        // We encode this in 3 instead of 14 bytes by
        // storing the marker in the third output byte,
        // which cannot occur in the 14-byte encoding.
        b[0] = (t[0] >> 8) as u8;
        b[1] = t[0] as u8;
        b[2] = FLAT_BLOCK_MARKER;

        return 3;
    }

    if exact_max {
        // adjust t[0] so that the pixel whose value is equal
        // to t_max gets represented as accurately as possible
        t[0] = t_max.wrapping_sub((d[0] << shift) as u16);
    }

    // pack t[0], the shift and the 15 six-bit differences into 14 bytes
    b[0] = (t[0] >> 8) as u8;
    b[1] = t[0] as u8;

    b[2] = ((shift << 2) | (r[0] >> 4)) as u8;
    b[3] = ((r[0] << 4) | (r[1] >> 2)) as u8;
    b[4] = ((r[1] << 6) | r[2]) as u8;

    b[5] = ((r[3] << 2) | (r[4] >> 4)) as u8;
    b[6] = ((r[4] << 4) | (r[5] >> 2)) as u8;
    b[7] = ((r[5] << 6) | r[6]) as u8;

    b[8] = ((r[7] << 2) | (r[8] >> 4)) as u8;
    b[9] = ((r[8] << 4) | (r[9] >> 2)) as u8;
    b[10] = ((r[9] << 6) | r[10]) as u8;

    b[11] = ((r[11] << 2) | (r[12] >> 4)) as u8;
    b[12] = ((r[12] << 4) | (r[13] >> 2)) as u8;
    b[13] = ((r[13] << 6) | r[14]) as u8;

    14
}

const SIX_BITS: u32 = 0x3f;

#[inline]
fn byte(b: &[u8], index: usize) -> u32 {
    b[index] as u32
}

/// Unpack a 14-byte block into 4 by 4 16-bit pixels.
fn unpack14(b: &[u8], s: &mut [u16; 16]) {
    debug_assert_eq!(b.len(), 14, "14-byte block expected");
    debug_assert_ne!(b[2], FLAT_BLOCK_MARKER, "flat block dispatched to unpack14 bug");

    s[0] = ((byte(b, 0) << 8) | byte(b, 1)) as u16;

    let shift = byte(b, 2) >> 2;
    let bias = 0x20_u32 << shift;

    let unbias = |previous: u16, difference: u32| -> u16 {
        (previous as u32).wrapping_add(difference << shift).wrapping_sub(bias) as u16
    };

    s[4] = unbias(s[0], ((byte(b, 2) << 4) | (byte(b, 3) >> 4)) & SIX_BITS);
    s[8] = unbias(s[4], ((byte(b, 3) << 2) | (byte(b, 4) >> 6)) & SIX_BITS);
    s[12] = unbias(s[8], byte(b, 4) & SIX_BITS);

    s[1] = unbias(s[0], byte(b, 5) >> 2);
    s[5] = unbias(s[4], ((byte(b, 5) << 4) | (byte(b, 6) >> 4)) & SIX_BITS);
    s[9] = unbias(s[8], ((byte(b, 6) << 2) | (byte(b, 7) >> 6)) & SIX_BITS);
    s[13] = unbias(s[12], byte(b, 7) & SIX_BITS);

    s[2] = unbias(s[1], byte(b, 8) >> 2);
    s[6] = unbias(s[5], ((byte(b, 8) << 4) | (byte(b, 9) >> 4)) & SIX_BITS);
    s[10] = unbias(s[9], ((byte(b, 9) << 2) | (byte(b, 10) >> 6)) & SIX_BITS);
    s[14] = unbias(s[13], byte(b, 10) & SIX_BITS);

    s[3] = unbias(s[2], byte(b, 11) >> 2);
    s[7] = unbias(s[6], ((byte(b, 11) << 4) | (byte(b, 12) >> 4)) & SIX_BITS);
    s[11] = unbias(s[10], ((byte(b, 12) << 2) | (byte(b, 13) >> 6)) & SIX_BITS);
    s[15] = unbias(s[14], byte(b, 13) & SIX_BITS);

    // remove the sign bias
    for value in s.iter_mut() {
        if (*value & 0x8000) != 0 {
            *value &= 0x7fff;
        }
        else {
            *value = !*value;
        }
    }
}

/// Unpack a 3-byte block into 4 by 4 identical 16-bit pixels.
fn unpack3(b: &[u8], s: &mut [u16; 16]) {
    debug_assert_eq!(b[2], FLAT_BLOCK_MARKER, "non-flat block dispatched to unpack3 bug");

    let mut value = (((b[0] as u32) << 8) | b[1] as u32) as u16;

    if (value & 0x8000) != 0 {
        value &= 0x7fff;
    }
    else {
        value = !value;
    }

    for entry in s.iter_mut() {
        *entry = value;
    }
}


#[derive(Debug)]
struct ChannelData {
    tmp_start_index: usize,
    tmp_end_index: usize,

    resolution: Vec2<usize>,
    y_sampling: usize,
    sample_type: SampleType,

    // a 32-bit channel occupies two 16-bit samples
    samples_per_pixel: usize,
}

fn channel_data(channels: &ChannelList, rectangle: IntegerBounds) -> (Vec<ChannelData>, usize) {
    let mut result = Vec::with_capacity(channels.list.len());
    let mut tmp_index = 0;

    for channel in channels.list.iter() {
        let channel = ChannelData {
            tmp_start_index: tmp_index,
            tmp_end_index: tmp_index,
            y_sampling: channel.sampling.y(),
            resolution: channel.subsampled_pixels(rectangle),
            sample_type: channel.sample_type,
            samples_per_pixel: channel.sample_type.bytes_per_sample() / SampleType::F16.bytes_per_sample(),
        };

        tmp_index += channel.resolution.area() * channel.samples_per_pixel;
        result.push(channel);
    }

    (result, tmp_index)
}


pub fn compress(channels: &ChannelList, uncompressed: Bytes<'_>, rectangle: IntegerBounds, flat_fields: bool) -> Result<ByteVec> {
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }

    let (mut channel_data, tmp_value_count) = channel_data(channels, rectangle);
    debug_assert_eq!(tmp_value_count * 2, uncompressed.len(), "pixel buffer size mismatch bug");

    // reorder the line-interleaved input into one plane per channel
    let mut tmp = vec![0_u16; tmp_value_count];
    let mut remaining_bytes = uncompressed;

    for y in rectangle.position.y() .. rectangle.end().y() {
        for channel in &mut channel_data {
            if mod_p(y, usize_to_i32(channel.y_sampling)) != 0 { continue; }

            let u16s_per_line = channel.resolution.x() * channel.samples_per_pixel;
            let next_tmp_end_index = channel.tmp_end_index + u16s_per_line;
            let target = &mut tmp[channel.tmp_end_index .. next_tmp_end_index];
            channel.tmp_end_index = next_tmp_end_index;

            for (value, bytes) in target.iter_mut().zip(remaining_bytes.chunks_exact(2)) {
                *value = u16::from_ne_bytes([bytes[0], bytes[1]]);
            }

            remaining_bytes = &remaining_bytes[u16s_per_line * 2 ..];
        }
    }

    let mut out = Vec::with_capacity(uncompressed.len() / 2);

    for channel in &channel_data {
        let plane = &tmp[channel.tmp_start_index .. channel.tmp_end_index];

        // other sample types than f16 are stored unmodified
        if channel.sample_type != SampleType::F16 {
            for &value in plane {
                out.extend_from_slice(&value.to_ne_bytes());
            }

            continue;
        }

        let count_x = channel.resolution.x();
        let count_y = channel.resolution.y();

        let mut block = [0_u8; 14];

        for block_y in (0 .. count_y).step_by(4) {
            for block_x in (0 .. count_x).step_by(4) {

                // gather the 4x4 block, repeating the last row
                // and column where the plane ends
                let mut s = [0_u16; 16];
                for row in 0..4 {
                    let y = (block_y + row).min(count_y - 1);
                    for column in 0..4 {
                        let x = (block_x + column).min(count_x - 1);
                        s[row * 4 + column] = plane[y * count_x + x];
                    }
                }

                let packed_size = pack(s, &mut block, flat_fields, true);
                out.extend_from_slice(&block[..packed_size]);
            }
        }
    }

    Ok(out)
}


pub fn decompress(channels: &ChannelList, compressed: Bytes<'_>, rectangle: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    let (mut channel_data, tmp_value_count) = channel_data(channels, rectangle);
    debug_assert_eq!(tmp_value_count * 2, expected_byte_size, "pixel buffer size mismatch bug");

    let mut tmp = vec![0_u16; tmp_value_count];
    let mut remaining = compressed;

    for channel in &channel_data {
        let plane_end = channel.tmp_start_index + channel.resolution.area() * channel.samples_per_pixel;
        let plane = &mut tmp[channel.tmp_start_index .. plane_end];

        if channel.sample_type != SampleType::F16 {
            let byte_count = plane.len() * 2;
            if remaining.len() < byte_count {
                return Err(not_enough_data());
            }

            for (value, bytes) in plane.iter_mut().zip(remaining.chunks_exact(2)) {
                *value = u16::from_ne_bytes([bytes[0], bytes[1]]);
            }

            remaining = &remaining[byte_count ..];
            continue;
        }

        let count_x = channel.resolution.x();
        let count_y = channel.resolution.y();

        for block_y in (0 .. count_y).step_by(4) {
            for block_x in (0 .. count_x).step_by(4) {
                let mut s = [0_u16; 16];

                if remaining.len() < 3 {
                    return Err(not_enough_data());
                }

                if remaining[2] == FLAT_BLOCK_MARKER {
                    unpack3(&remaining[..3], &mut s);
                    remaining = &remaining[3..];
                }
                else {
                    if remaining.len() < 14 {
                        return Err(not_enough_data());
                    }

                    unpack14(&remaining[..14], &mut s);
                    remaining = &remaining[14..];
                }

                // scatter the block, discarding the padding
                // beyond the plane boundary
                for row in 0..4 {
                    let y = block_y + row;
                    if y >= count_y { break; }

                    for column in 0..4 {
                        let x = block_x + column;
                        if x >= count_x { break; }

                        plane[y * count_x + x] = s[row * 4 + column];
                    }
                }
            }
        }
    }

    // reorder the channel planes into the line-interleaved native layout
    let mut out = Vec::with_capacity(expected_byte_size);

    for y in rectangle.position.y() .. rectangle.end().y() {
        for channel in &mut channel_data {
            if mod_p(y, usize_to_i32(channel.y_sampling)) != 0 { continue; }

            let u16s_per_line = channel.resolution.x() * channel.samples_per_pixel;
            let next_tmp_end_index = channel.tmp_end_index + u16s_per_line;
            let values = &tmp[channel.tmp_end_index .. next_tmp_end_index];
            channel.tmp_end_index = next_tmp_end_index;

            for &value in values {
                out.extend_from_slice(&value.to_ne_bytes());
            }
        }
    }

    debug_assert_eq!(out.len(), expected_byte_size, "pixel buffer size mismatch bug");
    Ok(out)
}

fn not_enough_data() -> Error {
    Error::new(ErrorKind::CorruptChunk, "not enough data in chunk")
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, Text};
    use half::f16;
    use smallvec::smallvec;

    fn pack_unpack(s: [u16; 16], flat_fields: bool) -> [u16; 16] {
        let mut block = [0_u8; 14];
        let size = pack(s, &mut block, flat_fields, true);

        let mut decoded = [0_u16; 16];
        match size {
            3 => unpack3(&block[..3], &mut decoded),
            14 => unpack14(&block[..14], &mut decoded),
            _ => panic!("unexpected block size"),
        }

        decoded
    }

    #[test]
    fn flat_block_is_three_bytes(){
        let value = f16::from_f32(0.75).to_bits();
        let mut block = [0_u8; 14];

        assert_eq!(pack([value; 16], &mut block, true, true), 3);
        assert_eq!(pack([value; 16], &mut block, false, true), 14);

        assert_eq!(pack_unpack([value; 16], true), [value; 16]);
        assert_eq!(pack_unpack([value; 16], false), [value; 16]);
    }

    #[test]
    fn non_finite_values_become_zero(){
        let nan = f16::NAN.to_bits();
        let infinity = f16::INFINITY.to_bits();
        let negative_infinity = f16::NEG_INFINITY.to_bits();

        let decoded = pack_unpack([nan, infinity, negative_infinity, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], false);

        for value in decoded {
            assert_eq!(f16::from_bits(value).to_f32(), 0.0);
        }
    }

    #[test]
    fn quantization_error_is_small(){
        let values: [f32; 16] = [
            0.1, 0.11, 0.102, 0.1,
            0.093, 0.104, 0.198, 0.11,
            0.102, 0.1, 0.095, 0.104,
            0.1, 0.105, 0.103, 0.104,
        ];

        let mut s = [0_u16; 16];
        for (bits, &value) in s.iter_mut().zip(values.iter()) {
            *bits = f16::from_f32(value).to_bits();
        }

        let decoded = pack_unpack(s, false);

        for (&bits, &original) in decoded.iter().zip(values.iter()) {
            let error = (f16::from_bits(bits).to_f32() - original).abs();
            assert!(error < 0.01, "error {} too large", error);
        }
    }

    #[test]
    fn roundtrip_mixed_channels(){
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new_or_panic("H"), SampleType::F16, false),
            ChannelDescription::new(Text::new_or_panic("U"), SampleType::U32, true),
        ]);

        // the resolution is not divisible by the block size on purpose
        let rectangle = IntegerBounds::new(Vec2(3, -2), Vec2(13, 9));
        let byte_count = rectangle.size.area() * channels.bytes_per_pixel;

        let mut pixel_bytes = vec![0_u8; byte_count];
        for (index, byte) in pixel_bytes.iter_mut().enumerate() {
            *byte = ((index as u32).wrapping_mul(2654435761) >> 11) as u8;
        }

        for flat_fields in [false, true] {
            let compressed = compress(&channels, &pixel_bytes, rectangle, flat_fields).unwrap();
            let decompressed = decompress(&channels, &compressed, rectangle, byte_count).unwrap();
            assert_eq!(decompressed.len(), byte_count);

            // the u32 channel is not quantized at all
            // (channels are sorted alphabetically, H is decoded before U)
            let uint_bytes_per_line = rectangle.size.width() * 4;
            let half_bytes_per_line = rectangle.size.width() * 2;
            let bytes_per_line = uint_bytes_per_line + half_bytes_per_line;

            for line in 0 .. rectangle.size.height() {
                let line_start = line * bytes_per_line;
                let uint_range = line_start + half_bytes_per_line .. line_start + bytes_per_line;
                assert_eq!(decompressed[uint_range.clone()], pixel_bytes[uint_range]);
            }
        }
    }

    #[test]
    fn half_roundtrip_is_lossless_for_14bit_patterns(){
        // values whose top 14 bits describe them exactly survive unharmed
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new_or_panic("G"), SampleType::F16, false),
        ]);

        let rectangle = IntegerBounds::from_dimensions(Vec2(8, 8));

        let value = f16::from_f32(0.5);
        let mut pixel_bytes = Vec::new();
        for _ in 0 .. rectangle.size.area() {
            pixel_bytes.extend_from_slice(&value.to_bits().to_ne_bytes());
        }

        let compressed = compress(&channels, &pixel_bytes, rectangle, false).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, pixel_bytes.len()).unwrap();

        assert_eq!(decompressed, pixel_bytes);
    }
}
