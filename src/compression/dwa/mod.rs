
//! The DWA compression method, a lossy frequency-space compression
//! developed at DreamWorks Animation.
//!
//! Half float channels are transformed in 8×8 blocks: color channels are
//! converted to luminance and chroma, passed through a perceptual transfer
//! curve, frequency-transformed, and quantized to halfs with few set bits.
//! The quantized coefficients are run length coded and deflated.
//! All other channels fall back to prediction and run length coding.

mod classifier;
mod csc;
mod dct;
mod nonlinear;
mod quantize;
mod rle;
mod tables;

use half::f16;

use crate::compression::{ByteVec, Bytes, CodecOptions};
use crate::error::*;
use crate::io::Data;
use crate::math::{div_ceil, mod_p, Vec2};
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};

use classifier::{classify, Classification};
use dct::BLOCK_SIZE;
use quantize::QuantizationTable;
use tables::ZIG_ZAG;


/// The version of the chunk layout this module writes.
const VERSION: u16 = 2;

/// The strategy identifier for deflate-compressed AC coefficients.
/// The static huffman strategy of the original file format is not written
/// by this implementation, and rejected when read.
const AC_STRATEGY_DEFLATE: u8 = 0;

const HEADER_BYTE_SIZE: usize = 2 + 1 + 9 * 8;


#[derive(Debug)]
struct ChannelData {
    tmp_start_index: usize,
    tmp_end_index: usize,

    resolution: Vec2<usize>,
    y_sampling: usize,

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
            samples_per_pixel: channel.sample_type.bytes_per_sample() / SampleType::F16.bytes_per_sample(),
        };

        tmp_index += channel.resolution.area() * channel.samples_per_pixel;
        result.push(channel);
    }

    (result, tmp_index)
}

fn plane_block_count(resolution: Vec2<usize>) -> usize {
    div_ceil(resolution.x(), 8) * div_ceil(resolution.y(), 8)
}

/// The number of dc and ac coefficients the
/// frequency-transformed channels of this part produce.
fn coefficient_counts(classification: &Classification, channel_data: &[ChannelData]) -> (usize, usize) {
    let dct_planes = classification.csc_groups.iter().flatten()
        .chain(classification.solo_dct.iter());

    let block_count: usize = dct_planes
        .map(|&channel| plane_block_count(channel_data[channel].resolution))
        .sum();

    (block_count, block_count * (BLOCK_SIZE - 1))
}


/// Read a channel plane from the staging buffer as f32 values.
/// Values that cannot be quantized are replaced with zero.
fn plane_to_f32(tmp: &[u16], channel: &ChannelData) -> Vec<f32> {
    debug_assert_eq!(channel.samples_per_pixel, 1, "frequency transform of a non-half channel bug");

    tmp[channel.tmp_start_index .. channel.tmp_start_index + channel.resolution.area()]
        .iter()
        .map(|&bits| {
            let value = f16::from_bits(bits).to_f32();
            if value.is_finite() { value } else { 0.0 }
        })
        .collect()
}

fn plane_to_f16_bits(plane: &[f32], tmp: &mut [u16], channel: &ChannelData) {
    let target = &mut tmp[channel.tmp_start_index .. channel.tmp_start_index + channel.resolution.area()];

    for (bits, &value) in target.iter_mut().zip(plane.iter()) {
        *bits = f16::from_f32(value).to_bits();
    }
}


/// Quantize and serialize the coefficients of one plane.
fn encode_plane(
    plane: &[f32],
    resolution: Vec2<usize>,
    table: &QuantizationTable,
    dc_stream: &mut Vec<u16>,
    ac_stream: &mut Vec<u16>,
) {
    let count_x = resolution.x();
    let count_y = resolution.y();

    for block_y in (0 .. count_y).step_by(8) {
        for block_x in (0 .. count_x).step_by(8) {

            // gather the block, repeating the last row and column at the borders
            let mut block = [0.0_f32; BLOCK_SIZE];
            for row in 0..8 {
                let y = (block_y + row).min(count_y - 1);
                for column in 0..8 {
                    let x = (block_x + column).min(count_x - 1);
                    block[row * 8 + column] = plane[y * count_x + x];
                }
            }

            dct::forward(&mut block);

            let mut quantized = [0_u16; BLOCK_SIZE];
            for (index, &coefficient) in block.iter().enumerate() {
                quantized[index] = table.quantize(index, f16::from_f32(coefficient)).to_bits();
            }

            dc_stream.push(quantized[0]);
            for &index in &ZIG_ZAG[1..] {
                ac_stream.push(quantized[index]);
            }
        }
    }
}

/// Reverse [`encode_plane`], pulling coefficients from the streams.
fn decode_plane(
    resolution: Vec2<usize>,
    dc_stream: &mut impl Iterator<Item = u16>,
    ac_stream: &mut impl Iterator<Item = u16>,
    plane: &mut [f32],
) -> UnitResult {
    let count_x = resolution.x();
    let count_y = resolution.y();

    for block_y in (0 .. count_y).step_by(8) {
        for block_x in (0 .. count_x).step_by(8) {

            let mut quantized = [0_u16; BLOCK_SIZE];
            quantized[0] = dc_stream.next().ok_or_else(missing_coefficients)?;
            for &index in &ZIG_ZAG[1..] {
                quantized[index] = ac_stream.next().ok_or_else(missing_coefficients)?;
            }

            let mut block = [0.0_f32; BLOCK_SIZE];
            for (value, &bits) in block.iter_mut().zip(quantized.iter()) {
                *value = f16::from_bits(bits).to_f32();
            }

            dct::inverse(&mut block);

            // scatter the block, discarding the border padding
            for row in 0..8 {
                let y = block_y + row;
                if y >= count_y { break; }

                for column in 0..8 {
                    let x = block_x + column;
                    if x >= count_x { break; }

                    plane[y * count_x + x] = block[row * 8 + column];
                }
            }
        }
    }

    Ok(())
}

fn missing_coefficients() -> Error {
    Error::new(ErrorKind::CorruptChunk, "missing frequency coefficients")
}


pub fn compress(channels: &ChannelList, uncompressed: Bytes<'_>, rectangle: IntegerBounds, options: &CodecOptions) -> Result<ByteVec> {
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

    let classification = classify(channels);

    let base_error = options.dwa_compression_level / 100_000.0;
    let luma_table = QuantizationTable::luma(base_error);
    let chroma_table = QuantizationTable::chroma(base_error);

    let mut dc_stream = Vec::new();
    let mut ac_stream = Vec::new();

    for group in &classification.csc_groups {
        let mut red = plane_to_f32(&tmp, &channel_data[group[0]]);
        let mut green = plane_to_f32(&tmp, &channel_data[group[1]]);
        let mut blue = plane_to_f32(&tmp, &channel_data[group[2]]);

        for ((red, green), blue) in red.iter_mut().zip(green.iter_mut()).zip(blue.iter_mut()) {
            let (luma, chroma_b, chroma_r) = csc::forward(*red, *green, *blue);

            *red = nonlinear::to_nonlinear(luma);
            *green = nonlinear::to_nonlinear(chroma_b);
            *blue = nonlinear::to_nonlinear(chroma_r);
        }

        let resolution = channel_data[group[0]].resolution;
        encode_plane(&red, resolution, &luma_table, &mut dc_stream, &mut ac_stream);
        encode_plane(&green, resolution, &chroma_table, &mut dc_stream, &mut ac_stream);
        encode_plane(&blue, resolution, &chroma_table, &mut dc_stream, &mut ac_stream);
    }

    for &channel in &classification.solo_dct {
        let mut plane = plane_to_f32(&tmp, &channel_data[channel]);

        for value in plane.iter_mut() {
            *value = nonlinear::to_nonlinear(*value);
        }

        encode_plane(&plane, channel_data[channel].resolution, &luma_table, &mut dc_stream, &mut ac_stream);
    }

    // channels that cannot be frequency-transformed
    // fall back to prediction and run length coding
    let mut raw_bytes = Vec::new();
    for &channel in &classification.raw {
        let channel = &channel_data[channel];
        let plane = &tmp[channel.tmp_start_index .. channel.tmp_start_index + channel.resolution.area() * channel.samples_per_pixel];

        for &value in plane {
            raw_bytes.extend_from_slice(&value.to_ne_bytes());
        }
    }

    let raw_uncompressed_size = raw_bytes.len();
    super::optimize_bytes::separate_bytes_fragments(&mut raw_bytes);
    super::optimize_bytes::samples_to_differences(&mut raw_bytes);
    let raw_encoded = super::rle::run_length_encode(&raw_bytes);
    let raw_compressed = super::compress_buffer(options.zip_compression_level, &raw_encoded);

    // serialize the coefficient streams and deflate them
    let ac_encoded = rle::encode(&ac_stream);
    let mut ac_bytes = Vec::with_capacity(ac_encoded.len() * 2);
    u16::write_slice(&mut ac_bytes, &ac_encoded)?;
    let ac_compressed = super::compress_buffer(options.zip_compression_level, &ac_bytes);

    let mut previous = 0_u16;
    let mut dc_bytes = Vec::with_capacity(dc_stream.len() * 2);
    for &value in &dc_stream {
        value.wrapping_sub(previous).write(&mut dc_bytes)?;
        previous = value;
    }
    let dc_compressed = super::compress_buffer(options.zip_compression_level, &dc_bytes);

    let mut out = Vec::with_capacity(
        HEADER_BYTE_SIZE + ac_compressed.len() + dc_compressed.len() + raw_compressed.len()
    );

    VERSION.write(&mut out)?;
    AC_STRATEGY_DEFLATE.write(&mut out)?;

    0_u64.write(&mut out)?; // unknown channel bytes, uncompressed
    0_u64.write(&mut out)?; // unknown channel bytes, compressed
    usize_to_u64(ac_compressed.len()).write(&mut out)?;
    usize_to_u64(dc_compressed.len()).write(&mut out)?;
    usize_to_u64(raw_compressed.len()).write(&mut out)?;
    usize_to_u64(raw_uncompressed_size).write(&mut out)?;
    usize_to_u64(raw_encoded.len()).write(&mut out)?;
    usize_to_u64(ac_stream.len()).write(&mut out)?;
    usize_to_u64(dc_stream.len()).write(&mut out)?;

    out.extend_from_slice(&ac_compressed);
    out.extend_from_slice(&dc_compressed);
    out.extend_from_slice(&raw_compressed);

    Ok(out)
}


pub fn decompress(channels: &ChannelList, compressed: Bytes<'_>, rectangle: IntegerBounds, expected_byte_size: usize, strict: bool) -> Result<ByteVec> {
    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    let (mut channel_data, tmp_value_count) = channel_data(channels, rectangle);
    debug_assert_eq!(tmp_value_count * 2, expected_byte_size, "pixel buffer size mismatch bug");

    let mut remaining = compressed;
    let read = &mut remaining;

    let version = u16::read(read)?;
    if version > VERSION {
        return Err(Error::new(ErrorKind::CorruptChunk, "unknown chunk layout version"));
    }

    let ac_strategy = u8::read(read)?;
    if ac_strategy != AC_STRATEGY_DEFLATE {
        return Err(Error::unsupported("static huffman coefficient data"));
    }

    let unknown_uncompressed_size = u64_to_usize(u64::read(read)?);
    let unknown_compressed_size = u64_to_usize(u64::read(read)?);
    let ac_compressed_size = u64_to_usize(u64::read(read)?);
    let dc_compressed_size = u64_to_usize(u64::read(read)?);
    let raw_compressed_size = u64_to_usize(u64::read(read)?);
    let raw_uncompressed_size = u64_to_usize(u64::read(read)?);
    let raw_encoded_size = u64_to_usize(u64::read(read)?);
    let ac_count = u64_to_usize(u64::read(read)?);
    let dc_count = u64_to_usize(u64::read(read)?);

    if unknown_uncompressed_size != 0 || unknown_compressed_size != 0 {
        return Err(Error::new(ErrorKind::CorruptChunk, "unclassified channel data"));
    }

    let section_bytes = ac_compressed_size
        .checked_add(dc_compressed_size)
        .and_then(|size| size.checked_add(raw_compressed_size));

    match section_bytes {
        Some(expected) if expected == remaining.len() => {},
        _ => return Err(Error::new(ErrorKind::CorruptChunk, "section sizes do not match chunk size")),
    }

    let classification = classify(channels);
    let (expected_dc_count, expected_ac_count) = coefficient_counts(&classification, &channel_data);

    if dc_count != expected_dc_count || ac_count != expected_ac_count {
        return Err(Error::new(ErrorKind::CorruptChunk, "coefficient counts do not match channel list"));
    }

    let (ac_section, remaining) = remaining.split_at(ac_compressed_size);
    let (dc_section, raw_section) = remaining.split_at(dc_compressed_size);

    // undo the deflate and run length coding of the ac coefficients
    let ac_bytes = super::uncompress_buffer(ac_section, ac_count.saturating_mul(2))?;
    if ac_bytes.len() % 2 != 0 {
        return Err(Error::new(ErrorKind::CorruptChunk, "coefficient data is corrupt"));
    }

    let mut ac_encoded = vec![0_u16; ac_bytes.len() / 2];
    u16::read_slice(&mut ac_bytes.as_slice(), &mut ac_encoded)?;
    let ac_stream = rle::decode(&ac_encoded, ac_count)?;

    // undo the deflate and the prediction of the dc coefficients
    let dc_bytes = super::uncompress_buffer(dc_section, dc_count * 2)?;
    if dc_bytes.len() != dc_count * 2 {
        return Err(Error::new(ErrorKind::CorruptChunk, "coefficient data is corrupt"));
    }

    let mut dc_stream = vec![0_u16; dc_count];
    u16::read_slice(&mut dc_bytes.as_slice(), &mut dc_stream)?;

    let mut previous = 0_u16;
    for value in dc_stream.iter_mut() {
        *value = previous.wrapping_add(*value);
        previous = *value;
    }

    // undo the deflate, run length coding and prediction of the raw channels
    let raw_encoded = super::uncompress_buffer(raw_section, raw_encoded_size)?;
    let mut raw_bytes = super::rle::run_length_decode(&raw_encoded, raw_uncompressed_size, strict)?;

    if raw_bytes.len() != raw_uncompressed_size {
        return Err(Error::new(ErrorKind::CorruptChunk, "raw channel data is corrupt"));
    }

    super::optimize_bytes::differences_to_samples(&mut raw_bytes);
    super::optimize_bytes::interleave_byte_blocks(&mut raw_bytes);

    // rebuild all channel planes
    let mut tmp = vec![0_u16; tmp_value_count];
    let mut dc_iterator = dc_stream.into_iter();
    let mut ac_iterator = ac_stream.into_iter();

    for group in &classification.csc_groups {
        let resolution = channel_data[group[0]].resolution;
        let area = resolution.area();

        let mut luma = vec![0.0_f32; area];
        let mut chroma_b = vec![0.0_f32; area];
        let mut chroma_r = vec![0.0_f32; area];

        decode_plane(resolution, &mut dc_iterator, &mut ac_iterator, &mut luma)?;
        decode_plane(resolution, &mut dc_iterator, &mut ac_iterator, &mut chroma_b)?;
        decode_plane(resolution, &mut dc_iterator, &mut ac_iterator, &mut chroma_r)?;

        for ((luma, chroma_b), chroma_r) in luma.iter_mut().zip(chroma_b.iter_mut()).zip(chroma_r.iter_mut()) {
            let (red, green, blue) = csc::inverse(
                nonlinear::to_linear(*luma),
                nonlinear::to_linear(*chroma_b),
                nonlinear::to_linear(*chroma_r),
            );

            *luma = red;
            *chroma_b = green;
            *chroma_r = blue;
        }

        plane_to_f16_bits(&luma, &mut tmp, &channel_data[group[0]]);
        plane_to_f16_bits(&chroma_b, &mut tmp, &channel_data[group[1]]);
        plane_to_f16_bits(&chroma_r, &mut tmp, &channel_data[group[2]]);
    }

    for &channel in &classification.solo_dct {
        let resolution = channel_data[channel].resolution;
        let mut plane = vec![0.0_f32; resolution.area()];

        decode_plane(resolution, &mut dc_iterator, &mut ac_iterator, &mut plane)?;

        for value in plane.iter_mut() {
            *value = nonlinear::to_linear(*value);
        }

        plane_to_f16_bits(&plane, &mut tmp, &channel_data[channel]);
    }

    let mut raw_remaining = raw_bytes.as_slice();
    for &channel in &classification.raw {
        let channel = &channel_data[channel];
        let plane_end = channel.tmp_start_index + channel.resolution.area() * channel.samples_per_pixel;
        let plane = &mut tmp[channel.tmp_start_index .. plane_end];

        if raw_remaining.len() < plane.len() * 2 {
            return Err(Error::new(ErrorKind::CorruptChunk, "raw channel data is corrupt"));
        }

        for (value, bytes) in plane.iter_mut().zip(raw_remaining.chunks_exact(2)) {
            *value = u16::from_ne_bytes([bytes[0], bytes[1]]);
        }

        raw_remaining = &raw_remaining[plane.len() * 2 ..];
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


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, Text};
    use smallvec::smallvec;

    fn rgb_channels() -> ChannelList {
        ChannelList::new(smallvec![
            ChannelDescription::new(Text::new_or_panic("B"), SampleType::F16, false),
            ChannelDescription::new(Text::new_or_panic("G"), SampleType::F16, false),
            ChannelDescription::new(Text::new_or_panic("R"), SampleType::F16, false),
        ])
    }

    fn interleave_planes(planes: &[Vec<f16>], width: usize, height: usize) -> Vec<u8> {
        let mut bytes = Vec::new();

        for y in 0..height {
            for plane in planes {
                for x in 0..width {
                    bytes.extend_from_slice(&plane[y * width + x].to_bits().to_ne_bytes());
                }
            }
        }

        bytes
    }

    #[test]
    fn smooth_color_image_stays_close(){
        let channels = rgb_channels();
        let rectangle = IntegerBounds::from_dimensions(Vec2(40, 32));
        let (width, height) = (40, 32);

        // a smooth gradient in the [0, 1) range
        let mut planes = vec![Vec::new(); 3];
        for y in 0..height {
            for x in 0..width {
                let position = (x as f32 / width as f32 + y as f32 / height as f32) * 0.5;

                planes[0].push(f16::from_f32(0.8 * position)); // b
                planes[1].push(f16::from_f32(0.9 * position + 0.05)); // g
                planes[2].push(f16::from_f32(position)); // r
            }
        }

        let pixel_bytes = interleave_planes(&planes, width, height);
        let options = CodecOptions::default();

        let compressed = compress(&channels, &pixel_bytes, rectangle, &options).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, pixel_bytes.len(), true).unwrap();
        assert_eq!(decompressed.len(), pixel_bytes.len());

        for (decoded, original) in decompressed.chunks_exact(2).zip(pixel_bytes.chunks_exact(2)) {
            let decoded = f16::from_bits(u16::from_ne_bytes([decoded[0], decoded[1]])).to_f32();
            let original = f16::from_bits(u16::from_ne_bytes([original[0], original[1]])).to_f32();

            assert!(
                (decoded - original).abs() < 0.1,
                "decoded {} too far from {}", decoded, original
            );
        }
    }

    #[test]
    fn uint_channels_roundtrip_exactly(){
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new_or_panic("id"), SampleType::U32, false),
        ]);

        let rectangle = IntegerBounds::from_dimensions(Vec2(17, 9));
        let byte_count = rectangle.size.area() * 4;

        let mut pixel_bytes = vec![0_u8; byte_count];
        for (index, byte) in pixel_bytes.iter_mut().enumerate() {
            *byte = ((index as u32).wrapping_mul(2654435761) >> 13) as u8;
        }

        let options = CodecOptions::default();
        let compressed = compress(&channels, &pixel_bytes, rectangle, &options).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, byte_count, true).unwrap();

        assert_eq!(decompressed, pixel_bytes);
    }

    #[test]
    fn flat_image_compresses_well(){
        let channels = rgb_channels();
        let rectangle = IntegerBounds::from_dimensions(Vec2(64, 32));
        let byte_count = rectangle.size.area() * channels.bytes_per_pixel;

        let pixel_bytes = vec![0_u8; byte_count];
        let options = CodecOptions::default();

        let compressed = compress(&channels, &pixel_bytes, rectangle, &options).unwrap();
        assert!(compressed.len() < byte_count / 4);

        let decompressed = decompress(&channels, &compressed, rectangle, byte_count, true).unwrap();
        assert_eq!(decompressed, pixel_bytes);
    }

    #[test]
    fn nan_becomes_zero(){
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new_or_panic("Y"), SampleType::F16, false),
        ]);

        let rectangle = IntegerBounds::from_dimensions(Vec2(8, 8));

        let mut pixel_bytes = Vec::new();
        for _ in 0 .. rectangle.size.area() {
            pixel_bytes.extend_from_slice(&f16::NAN.to_bits().to_ne_bytes());
        }

        let options = CodecOptions::default();
        let compressed = compress(&channels, &pixel_bytes, rectangle, &options).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, pixel_bytes.len(), true).unwrap();

        for bytes in decompressed.chunks_exact(2) {
            let value = f16::from_bits(u16::from_ne_bytes([bytes[0], bytes[1]]));
            assert_eq!(value.to_f32(), 0.0);
        }
    }
}
