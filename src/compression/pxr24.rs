
//! Lossy compression for `f32` data, but lossless compression for `u32` and `f16` data.
// This compression method is based on an algorithm
// contributed to OpenEXR by Pixar Animation Studios,
// originally developed by Loren Carpenter.

// The compression method preprocesses the pixel data to reduce entropy, and then calls zlib.
// 32-bit floating-point numbers are converted to 24 bits by rounding the significand to 15 bits.
// The pixel values are then split into byte planes. Each byte is replaced with the
// difference between the byte and its left neighbor, which turns flat fields
// into runs of zeroes and ramps into strings of similar values.
// The resulting string of bytes is compressed with deflate.

use super::{ByteVec, Bytes};
use crate::error::*;
use crate::math::{mod_p, Vec2};
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};


pub fn compress(channels: &ChannelList, remaining_bytes: Bytes<'_>, area: IntegerBounds, level: u8) -> Result<ByteVec> {
    if remaining_bytes.is_empty() { return Ok(Vec::new()); }

    let mut remaining_bytes = remaining_bytes;
    let mut raw = vec![0_u8; byte_plane_size(channels, area)];
    let mut write_index = 0;

    for y in area.position.y() .. area.end().y() {
        for channel in &channels.list {
            if mod_p(y, usize_to_i32(channel.sampling.y())) != 0 { continue; }

            let sample_count_x = channel.subsampled_line_samples(area.size.width());

            let mut indices = [0_usize; 4];
            let mut previous_pixel: u32 = 0;

            match channel.sample_type {
                SampleType::F16 => {
                    indices[0] = write_index;
                    indices[1] = indices[0] + sample_count_x;
                    write_index = indices[1] + sample_count_x;

                    for _ in 0 .. sample_count_x {
                        let pixel = read_u16_native(&mut remaining_bytes) as u32;
                        let difference = pixel.wrapping_sub(previous_pixel);
                        previous_pixel = pixel;

                        raw[indices[0]] = (difference >> 8) as u8;
                        raw[indices[1]] = difference as u8;

                        indices[0] += 1;
                        indices[1] += 1;
                    }
                },

                SampleType::U32 => {
                    indices[0] = write_index;
                    indices[1] = indices[0] + sample_count_x;
                    indices[2] = indices[1] + sample_count_x;
                    indices[3] = indices[2] + sample_count_x;
                    write_index = indices[3] + sample_count_x;

                    for _ in 0 .. sample_count_x {
                        let pixel = read_u32_native(&mut remaining_bytes);
                        let difference = pixel.wrapping_sub(previous_pixel);
                        previous_pixel = pixel;

                        raw[indices[0]] = (difference >> 24) as u8;
                        raw[indices[1]] = (difference >> 16) as u8;
                        raw[indices[2]] = (difference >> 8) as u8;
                        raw[indices[3]] = difference as u8;

                        indices[0] += 1;
                        indices[1] += 1;
                        indices[2] += 1;
                        indices[3] += 1;
                    }
                },

                SampleType::F32 => {
                    indices[0] = write_index;
                    indices[1] = indices[0] + sample_count_x;
                    indices[2] = indices[1] + sample_count_x;
                    write_index = indices[2] + sample_count_x;

                    for _ in 0 .. sample_count_x {
                        let pixel = f32_to_f24(f32::from_bits(read_u32_native(&mut remaining_bytes)));
                        let difference = pixel.wrapping_sub(previous_pixel);
                        previous_pixel = pixel;

                        raw[indices[0]] = (difference >> 16) as u8;
                        raw[indices[1]] = (difference >> 8) as u8;
                        raw[indices[2]] = difference as u8;

                        indices[0] += 1;
                        indices[1] += 1;
                        indices[2] += 1;
                    }
                },
            }
        }
    }

    debug_assert_eq!(write_index, raw.len(), "byte plane size mismatch bug");
    Ok(super::compress_buffer(level, &raw))
}

pub fn decompress(channels: &ChannelList, bytes: Bytes<'_>, area: IntegerBounds, expected_byte_size: usize, strict: bool) -> Result<ByteVec> {
    if bytes.is_empty() { return Ok(Vec::new()) }

    let raw = super::uncompress_buffer(bytes, byte_plane_size(channels, area))?;

    let mut read_index = 0;
    let mut out = Vec::with_capacity(expected_byte_size);

    for y in area.position.y() .. area.end().y() {
        for channel in &channels.list {
            if mod_p(y, usize_to_i32(channel.sampling.y())) != 0 { continue; }

            let sample_count_x = channel.subsampled_line_samples(area.size.width());

            let mut indices = [0_usize; 4];
            let mut pixel_accumulation: u32 = 0;

            match channel.sample_type {
                SampleType::F16 => {
                    indices[0] = read_index;
                    indices[1] = indices[0] + sample_count_x;
                    read_index = indices[1] + sample_count_x;

                    if read_index > raw.len() {
                        return Err(not_enough_data());
                    }

                    for _ in 0 .. sample_count_x {
                        let difference = ((raw[indices[0]] as u32) << 8) | raw[indices[1]] as u32;
                        indices[0] += 1;
                        indices[1] += 1;

                        pixel_accumulation = pixel_accumulation.wrapping_add(difference);
                        out.extend_from_slice(&(pixel_accumulation as u16).to_ne_bytes());
                    }
                },

                SampleType::U32 => {
                    indices[0] = read_index;
                    indices[1] = indices[0] + sample_count_x;
                    indices[2] = indices[1] + sample_count_x;
                    indices[3] = indices[2] + sample_count_x;
                    read_index = indices[3] + sample_count_x;

                    if read_index > raw.len() {
                        return Err(not_enough_data());
                    }

                    for _ in 0 .. sample_count_x {
                        let difference = ((raw[indices[0]] as u32) << 24)
                            | ((raw[indices[1]] as u32) << 16)
                            | ((raw[indices[2]] as u32) << 8)
                            | raw[indices[3]] as u32;

                        indices[0] += 1;
                        indices[1] += 1;
                        indices[2] += 1;
                        indices[3] += 1;

                        pixel_accumulation = pixel_accumulation.wrapping_add(difference);
                        out.extend_from_slice(&pixel_accumulation.to_ne_bytes());
                    }
                },

                SampleType::F32 => {
                    indices[0] = read_index;
                    indices[1] = indices[0] + sample_count_x;
                    indices[2] = indices[1] + sample_count_x;
                    read_index = indices[2] + sample_count_x;

                    if read_index > raw.len() {
                        return Err(not_enough_data());
                    }

                    for _ in 0 .. sample_count_x {
                        let difference = ((raw[indices[0]] as u32) << 24)
                            | ((raw[indices[1]] as u32) << 16)
                            | ((raw[indices[2]] as u32) << 8);

                        indices[0] += 1;
                        indices[1] += 1;
                        indices[2] += 1;

                        pixel_accumulation = pixel_accumulation.wrapping_add(difference);
                        out.extend_from_slice(&pixel_accumulation.to_ne_bytes());
                    }
                },
            }
        }
    }

    if strict && read_index != raw.len() {
        return Err(Error::new(ErrorKind::CorruptChunk, "too much data in chunk"));
    }

    Ok(out)
}


/// The number of bytes of the byte-plane representation of a pixel section.
/// An `f32` sample shrinks from four to three planes, all other types keep their size.
fn byte_plane_size(channels: &ChannelList, area: IntegerBounds) -> usize {
    let mut byte_count = 0;

    for y in area.position.y() .. area.end().y() {
        for channel in &channels.list {
            if mod_p(y, usize_to_i32(channel.sampling.y())) != 0 { continue; }

            let bytes_per_sample = match channel.sample_type {
                SampleType::F16 => 2,
                SampleType::F32 => 3,
                SampleType::U32 => 4,
            };

            byte_count += channel.subsampled_line_samples(area.size.width()) * bytes_per_sample;
        }
    }

    byte_count
}

fn not_enough_data() -> Error {
    Error::new(ErrorKind::CorruptChunk, "not enough data in chunk")
}

#[inline]
fn read_u16_native(bytes: &mut Bytes<'_>) -> u16 {
    let value = u16::from_ne_bytes([bytes[0], bytes[1]]);
    *bytes = &bytes[2..];
    value
}

#[inline]
fn read_u32_native(bytes: &mut Bytes<'_>) -> u32 {
    let value = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    *bytes = &bytes[4..];
    value
}


/// Conversion from 32-bit to 24-bit floating-point numbers.
/// Reverse conversion is just a simple 8-bit left shift.
pub fn f32_to_f24(float: f32) -> u32 {
    let bits = float.to_bits();

    let sign = bits & 0x8000_0000;
    let exponent = bits & 0x7f80_0000;
    let mantissa = bits & 0x007f_ffff;

    let result = if exponent == 0x7f80_0000 {
        if mantissa != 0 {
            // the value is a NaN; we preserve the sign bit and
            // the 15 leftmost bits of the significand,
            // with one exception: if the 15 leftmost
            // bits are all zero, the NaN would turn
            // into an infinity, so we have to set at
            // least one bit in the significand

            let mantissa = mantissa >> 8;
            (exponent >> 8) | mantissa | if mantissa == 0 { 1 } else { 0 }
        }
        else {
            // the value is an infinity
            exponent >> 8
        }
    }
    else {
        // the value is finite, round the significand to 15 bits
        let result = ((exponent | mantissa) + (mantissa & 0x0000_0080)) >> 8;

        if result >= 0x7f8000 {
            // the value was close to the maximum float, and the significand was
            // rounded up, resulting in an exponent overflow.
            // avoid the overflow by truncating the significand instead of rounding it
            (exponent | mantissa) >> 8
        }
        else {
            result
        }
    };

    (sign >> 8) | result
}
