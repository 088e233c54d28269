
//! The PIZ compression method is a wavelet compression,
//! based on the PIZ image format, customized for OpenEXR.
//! A bitmap of actually occurring 16-bit values shrinks the symbol
//! alphabet before the wavelet transform and the huffman coder run.

mod huffman;
mod wavelet;

use crate::compression::{ByteVec, Bytes};
use crate::error::*;
use crate::io::Data;
use crate::math::{mod_p, Vec2};
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};


const U16_RANGE: usize = 1 << 16;
const BITMAP_SIZE: usize = U16_RANGE >> 3;

#[derive(Debug)]
struct ChannelData {
    tmp_start_index: usize,
    tmp_end_index: usize,

    resolution: Vec2<usize>,
    y_sampling: usize,

    // a 32-bit channel occupies two interleaved 16-bit samples
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


pub fn compress(channels: &ChannelList, uncompressed: Bytes<'_>, rectangle: IntegerBounds) -> Result<ByteVec> {
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }

    let (mut channel_data, tmp_value_count) = channel_data(channels, rectangle);

    debug_assert_eq!(tmp_value_count * 2, uncompressed.len(), "pixel buffer size mismatch bug");
    let mut tmp = vec![0_u16; tmp_value_count];

    // reorder the line-interleaved input into one plane per channel
    let mut remaining_bytes = uncompressed;
    for y in rectangle.position.y() .. rectangle.end().y() {
        for channel in &mut channel_data {
            if mod_p(y, usize_to_i32(channel.y_sampling)) != 0 { continue; }

            let u16s_per_line = channel.resolution.x() * channel.samples_per_pixel;
            let next_tmp_end_index = channel.tmp_end_index + u16s_per_line;
            let target = &mut tmp[channel.tmp_end_index .. next_tmp_end_index];
            channel.tmp_end_index = next_tmp_end_index;

            // the input bytes are in the native byte order of the machine
            for (value, bytes) in target.iter_mut().zip(remaining_bytes.chunks_exact(2)) {
                *value = u16::from_ne_bytes([bytes[0], bytes[1]]);
            }

            remaining_bytes = &remaining_bytes[u16s_per_line * 2 ..];
        }
    }

    let (min_non_zero, max_non_zero, bitmap) = bitmap_from_data(&tmp);
    let (max_value, table) = forward_lookup_table_from_bitmap(&bitmap);
    apply_lookup_table(&mut tmp, &table);

    let mut piz_compressed = Vec::with_capacity(uncompressed.len() / 2);
    usize_to_u16(min_non_zero)?.write(&mut piz_compressed)?;
    usize_to_u16(max_non_zero)?.write(&mut piz_compressed)?;

    if min_non_zero <= max_non_zero {
        piz_compressed.extend_from_slice(&bitmap[min_non_zero ..= max_non_zero]);
    }

    for channel in channel_data {
        for offset in 0 .. channel.samples_per_pixel {
            // a 32-bit channel is transformed as two interleaved 16-bit planes
            wavelet::encode(
                &mut tmp[channel.tmp_start_index + offset .. channel.tmp_end_index],
                channel.resolution,
                Vec2(channel.samples_per_pixel, channel.resolution.x() * channel.samples_per_pixel),
                max_value,
            )?;
        }
    }

    let huffman_compressed = huffman::compress(&tmp)?;
    u8::write_i32_sized_slice(&mut piz_compressed, &huffman_compressed)?;

    Ok(piz_compressed)
}


pub fn decompress(
    channels: &ChannelList,
    compressed: Bytes<'_>,
    rectangle: IntegerBounds,
    expected_byte_size: usize,
    strict: bool,
) -> Result<ByteVec>
{
    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    let expected_value_count = expected_byte_size / 2;
    let (mut channel_data, tmp_value_count) = channel_data(channels, rectangle);
    debug_assert_eq!(tmp_value_count, expected_value_count, "pixel buffer size mismatch bug");

    let mut bitmap = vec![0_u8; BITMAP_SIZE];

    let mut remaining_input = compressed;
    let min_non_zero = u16::read(&mut remaining_input)? as usize;
    let max_non_zero = u16::read(&mut remaining_input)? as usize;

    if max_non_zero >= BITMAP_SIZE || min_non_zero >= BITMAP_SIZE {
        return Err(Error::new(ErrorKind::CorruptChunk, "invalid bitmap bounds"));
    }

    if min_non_zero <= max_non_zero {
        u8::read_slice(&mut remaining_input, &mut bitmap[min_non_zero ..= max_non_zero])?;
    }

    let (lookup_table, max_value) = reverse_lookup_table_from_bitmap(&bitmap);

    {
        let length = i32::read(&mut remaining_input)?;

        if strict && length as i64 != remaining_input.len() as i64 {
            return Err(Error::new(ErrorKind::CorruptChunk, "huffman data length mismatch"));
        }

        if length < 0 || length as i64 > remaining_input.len() as i64 {
            return Err(Error::new(ErrorKind::CorruptChunk, "huffman data length mismatch"));
        }
    }

    let mut tmp = huffman::decompress(remaining_input, expected_value_count)?;

    for channel in &channel_data {
        for offset in 0 .. channel.samples_per_pixel {
            wavelet::decode(
                &mut tmp[channel.tmp_start_index + offset .. channel.tmp_start_index + channel.resolution.area() * channel.samples_per_pixel],
                channel.resolution,
                Vec2(channel.samples_per_pixel, channel.resolution.x() * channel.samples_per_pixel),
                max_value,
            )?;
        }
    }

    // expand the symbol indices back to their original 16-bit values
    apply_lookup_table(&mut tmp, &lookup_table);

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

    for index in 1 .. channel_data.len() {
        debug_assert_eq!(channel_data[index - 1].tmp_end_index, channel_data[index].tmp_start_index, "channel plane bounds bug");
    }

    debug_assert_eq!(out.len(), expected_byte_size, "pixel buffer size mismatch bug");
    Ok(out)
}


fn bitmap_from_data(data: &[u16]) -> (usize, usize, Vec<u8>) {
    let mut bitmap = vec![0_u8; BITMAP_SIZE];

    for value in data {
        bitmap[*value as usize >> 3] |= 1 << (*value as u8 & 7);
    }

    // zero is not explicitly stored in the bitmap; we assume that the data always contain zeroes
    bitmap[0] &= !1;

    let min_index = bitmap.iter().position(|&value| value != 0);
    let max_index = min_index.map(|min| // only if min was found
        min + bitmap[min..].iter().rposition(|&value| value != 0).expect("[min] not found")
    );

    (min_index.unwrap_or(0), max_index.unwrap_or(0), bitmap)
}

fn forward_lookup_table_from_bitmap(bitmap: &[u8]) -> (u16, Vec<u16>) {
    debug_assert_eq!(bitmap.len(), BITMAP_SIZE, "invalid bitmap length bug");

    let mut table = vec![0_u16; U16_RANGE];
    let mut count = 0_usize;

    for (index, entry) in table.iter_mut().enumerate() {
        if index == 0 || bitmap[index >> 3] as usize & (1 << (index & 7)) != 0 {
            *entry = usize_to_u16(count).unwrap();
            count += 1;
        }
    }

    (usize_to_u16(count - 1).unwrap(), table)
}

fn reverse_lookup_table_from_bitmap(bitmap: Bytes<'_>) -> (Vec<u16>, u16) {
    let mut table = Vec::with_capacity(U16_RANGE);

    for index in 0 .. U16_RANGE {
        if index == 0 || (bitmap[index >> 3] as usize & (1 << (index & 7))) != 0 {
            table.push(usize_to_u16(index).unwrap());
        }
    }

    debug_assert!(!table.is_empty(), "empty reverse lookup table bug");
    let max_value = usize_to_u16(table.len() - 1).unwrap();

    // fill remaining up to u16 range
    table.resize(U16_RANGE, 0);

    (table, max_value)
}

fn apply_lookup_table(data: &mut [u16], table: &[u16]) {
    for data in data {
        *data = table[*data as usize];
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, Text};
    use smallvec::smallvec;

    fn test_roundtrip_noise_with(channels: ChannelList, rectangle: IntegerBounds){
        let byte_count = rectangle.size.area() * channels.bytes_per_pixel;
        let pixel_bytes: ByteVec = (0 .. byte_count).map(|_| rand::random()).collect();

        let compressed = compress(&channels, &pixel_bytes, rectangle).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, pixel_bytes.len(), true).unwrap();

        assert_eq!(pixel_bytes, decompressed);
    }

    #[test]
    fn roundtrip_any_sample_type(){
        for &sample_type in &[SampleType::F16, SampleType::F32, SampleType::U32] {
            let channel = ChannelDescription::new(Text::new_or_panic("C"), sample_type, false);
            let channels = ChannelList::new(smallvec![ channel.clone(), channel ]);

            let rectangle = IntegerBounds {
                position: Vec2(-30, 100),
                size: Vec2(318, 129),
            };

            test_roundtrip_noise_with(channels, rectangle);
        }
    }

    #[test]
    fn roundtrip_two_channels(){
        let channel = ChannelDescription::new(Text::new_or_panic("A"), SampleType::F16, false);
        let channel2 = ChannelDescription::new(Text::new_or_panic("B"), SampleType::F32, false);
        let channels = ChannelList::new(smallvec![ channel, channel2 ]);

        let rectangle = IntegerBounds {
            position: Vec2(-3, 1),
            size: Vec2(223, 131),
        };

        test_roundtrip_noise_with(channels, rectangle);
    }

    #[test]
    fn roundtrip_flat_data(){
        let channel = ChannelDescription::new(Text::new_or_panic("L"), SampleType::F16, false);
        let channels = ChannelList::new(smallvec![ channel ]);

        let rectangle = IntegerBounds::from_dimensions(Vec2(97, 32));
        let pixel_bytes = vec![0_u8; rectangle.size.area() * channels.bytes_per_pixel];

        let compressed = compress(&channels, &pixel_bytes, rectangle).unwrap();
        assert!(compressed.len() < pixel_bytes.len());

        let decompressed = decompress(&channels, &compressed, rectangle, pixel_bytes.len(), true).unwrap();
        assert_eq!(pixel_bytes, decompressed);
    }
}
