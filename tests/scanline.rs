
//! Write and read flat scan line files,
//! checking the exact byte layout where the file format pins it down.

use exr_core::prelude::*;
use smallvec::smallvec;
use std::convert::TryInto;


fn rgb_half_channels() -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic("B"), SampleType::F16, false),
        ChannelDescription::new(Text::new_or_panic("G"), SampleType::F16, false),
        ChannelDescription::new(Text::new_or_panic("R"), SampleType::F16, false),
    ])
}

/// Write a single-part scan line file where every channel stores
/// the provided plane, then return the file bytes.
fn write_scan_line_file(header: Header, planes: &[(&str, SampleType, Vec<u8>)]) -> Vec<u8> {
    let backend = SharedMemoryBackend::new();

    let mut context = Context::start_write_to_backend(Box::new(backend.clone()), ContextOptions::default()).unwrap();
    let part = context.add_header(header).unwrap();

    let chunk_count = context.chunk_count(part).unwrap();
    let data_window = context.data_window(part).unwrap();
    let width = data_window.size.width();

    for chunk_index in 0 .. chunk_count {
        let chunk = context.chunk_by_index(part, chunk_index).unwrap();

        let mut encoder = EncodePipeline::new(&context, part, chunk.locator).unwrap();

        // cut this chunk's rows out of each full-resolution plane
        let chunk_planes: Vec<(&str, SampleType, Vec<u8>)> = planes.iter()
            .map(|(name, sample_type, plane)| {
                let bytes_per_sample = sample_type.bytes_per_sample();
                let row_bytes = width * bytes_per_sample;

                let first_row = (chunk.bounds.position.y() - data_window.position.y()) as usize;
                let row_count = chunk.bounds.size.height();

                let start = first_row * row_bytes;
                let end = start + row_count * row_bytes;

                (*name, *sample_type, plane[start .. end].to_vec())
            })
            .collect();

        for (name, sample_type, plane) in &chunk_planes {
            encoder.set_channel_source(name.as_bytes(), ChannelSource {
                sample_type: *sample_type,
                pixel_stride: sample_type.bytes_per_sample(),
                row_stride: width * sample_type.bytes_per_sample(),
                pixels: plane,
            }).unwrap();
        }

        encoder.run().unwrap();
    }

    context.finish().unwrap();
    backend.contents()
}

/// Read every channel of the single part back into full-resolution planes.
fn read_scan_line_file(bytes: Vec<u8>, channel_types: &[(&str, SampleType)]) -> Vec<Vec<u8>> {
    let context = Context::start_read_from_bytes(bytes, ContextOptions::default()).unwrap();

    let data_window = context.data_window(0).unwrap();
    let width = data_window.size.width();
    let height = data_window.size.height();

    let mut planes: Vec<Vec<u8>> = channel_types.iter()
        .map(|(_, sample_type)| vec![0_u8; width * height * sample_type.bytes_per_sample()])
        .collect();

    for chunk_index in 0 .. context.chunk_count(0).unwrap() {
        let chunk = context.chunk_by_index(0, chunk_index).unwrap();
        let mut decoder = DecodePipeline::new(&context, 0, chunk.locator).unwrap();

        let first_row = (chunk.bounds.position.y() - data_window.position.y()) as usize;

        for ((name, sample_type), plane) in channel_types.iter().zip(planes.iter_mut()) {
            let bytes_per_sample = sample_type.bytes_per_sample();
            let row_bytes = width * bytes_per_sample;

            let start = first_row * row_bytes;
            let end = start + chunk.bounds.size.height() * row_bytes;

            decoder.request_channel(name.as_bytes(), ChannelTarget {
                sample_type: *sample_type,
                pixel_stride: bytes_per_sample,
                row_stride: row_bytes,
                pixels: &mut plane[start .. end],
            }).unwrap();
        }

        decoder.run().unwrap();
    }

    context.finish().unwrap();
    planes
}


#[test]
fn minimal_file_has_expected_byte_layout(){
    // a 16x16 single-part rgb file, compressed with zip,
    // fits into a single chunk of sixteen scan lines
    let header = Header::new_scan_line(
        IntegerBounds::from_dimensions(Vec2(16, 16)),
        rgb_half_channels(), Compression::ZIP,
    );

    let header_byte_size = {
        let mut serialized = Vec::new();
        exr_core::meta::header::Header::write(&header, &mut serialized).unwrap();
        serialized.len()
    };

    let zero_plane = vec![0_u8; 16 * 16 * 2];
    let bytes = write_scan_line_file(header, &[
        ("B", SampleType::F16, zero_plane.clone()),
        ("G", SampleType::F16, zero_plane.clone()),
        ("R", SampleType::F16, zero_plane.clone()),
    ]);

    // magic number and version word are pinned down bit-exactly
    assert_eq!(&bytes[0..4], &[0x76, 0x2F, 0x31, 0x01]);
    assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x02]);

    // the offset table has exactly one entry, pointing
    // directly behind itself
    let table_position = 8 + header_byte_size;
    let offset = u64::from_be_bytes(bytes[table_position .. table_position + 8].try_into().unwrap());
    assert_eq!(offset as usize, table_position + 8);

    // the file decodes back to all zeroes
    let planes = read_scan_line_file(bytes, &[
        ("B", SampleType::F16),
        ("G", SampleType::F16),
        ("R", SampleType::F16),
    ]);

    for plane in planes {
        assert_eq!(plane, zero_plane);
    }
}

#[test]
fn roundtrip_gradient_with_every_lossless_compression(){
    let compressions = [
        Compression::Uncompressed,
        Compression::RLE,
        Compression::ZIPS,
        Compression::ZIP,
        Compression::PIZ,
    ];

    let (width, height) = (61, 37);

    let mut half_plane = Vec::new();
    let mut float_plane = Vec::new();
    let mut uint_plane = Vec::new();

    for index in 0 .. width * height {
        let value = index as f32 / (width * height) as f32;
        half_plane.extend_from_slice(&f16::from_f32(value).to_bits().to_ne_bytes());
        float_plane.extend_from_slice(&(value * 1000.0 - 500.0).to_bits().to_ne_bytes());
        uint_plane.extend_from_slice(&(index as u32 * 17).to_ne_bytes());
    }

    let channels = ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic("L"), SampleType::F16, false),
        ChannelDescription::new(Text::new_or_panic("Z"), SampleType::F32, true),
        ChannelDescription::new(Text::new_or_panic("id"), SampleType::U32, false),
    ]);

    for compression in compressions {
        let header = Header::new_scan_line(
            IntegerBounds::new(Vec2(-7, 100), Vec2(width, height)),
            channels.clone(), compression,
        );

        let bytes = write_scan_line_file(header, &[
            ("L", SampleType::F16, half_plane.clone()),
            ("Z", SampleType::F32, float_plane.clone()),
            ("id", SampleType::U32, uint_plane.clone()),
        ]);

        let planes = read_scan_line_file(bytes, &[
            ("L", SampleType::F16),
            ("Z", SampleType::F32),
            ("id", SampleType::U32),
        ]);

        assert_eq!(planes[0], half_plane, "half plane differs with {}", compression);
        assert_eq!(planes[1], float_plane, "float plane differs with {}", compression);
        assert_eq!(planes[2], uint_plane, "uint plane differs with {}", compression);
    }
}

#[test]
fn incompressible_chunk_is_stored_raw(){
    // a single line of random halfs cannot shrink under deflate,
    // so the encoder stores the packed bytes unmodified
    let (width, height) = (128, 1);

    let plane: Vec<u8> = (0 .. width * height * 2).map(|_| rand::random()).collect();

    let channels = ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic("N"), SampleType::F16, false),
    ]);

    let header = Header::new_scan_line(
        IntegerBounds::from_dimensions(Vec2(width, height)),
        channels, Compression::ZIPS,
    );

    let header_byte_size = {
        let mut serialized = Vec::new();
        exr_core::meta::header::Header::write(&header, &mut serialized).unwrap();
        serialized.len()
    };

    let bytes = write_scan_line_file(header, &[("N", SampleType::F16, plane.clone())]);

    // the chunk leader declares exactly the unpacked size,
    // which tells the reader to skip the codec
    let chunk_position = 8 + header_byte_size + 8;
    let stored_size = i32::from_be_bytes(bytes[chunk_position + 4 .. chunk_position + 8].try_into().unwrap());
    assert_eq!(stored_size as usize, width * height * 2);

    let planes = read_scan_line_file(bytes, &[("N", SampleType::F16)]);
    assert_eq!(planes[0], plane);
}

#[test]
fn sample_types_convert_while_packing_and_unpacking(){
    // the file stores halfs, the caller writes and reads floats
    let (width, height) = (8, 4);

    let mut float_plane = Vec::new();
    for index in 0 .. width * height {
        float_plane.extend_from_slice(&(index as f32 * 0.25).to_bits().to_ne_bytes());
    }

    let channels = ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic("Y"), SampleType::F16, false),
    ]);

    let header = Header::new_scan_line(
        IntegerBounds::from_dimensions(Vec2(width, height)),
        channels, Compression::Uncompressed,
    );

    let bytes = write_scan_line_file(header, &[("Y", SampleType::F32, float_plane)]);

    // read back as unsigned integers: floats clamp towards zero
    let planes = read_scan_line_file(bytes, &[("Y", SampleType::U32)]);

    for (index, sample) in planes[0].chunks_exact(4).enumerate() {
        let value = u32::from_ne_bytes(sample.try_into().unwrap());
        assert_eq!(value, (index as f32 * 0.25) as u32);
    }
}

#[test]
fn absent_channel_is_filled(){
    let (width, height) = (6, 3);
    let zero_plane = vec![0_u8; width * height * 2];

    let channels = ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic("R"), SampleType::F16, false),
    ]);

    let header = Header::new_scan_line(
        IntegerBounds::from_dimensions(Vec2(width, height)),
        channels, Compression::RLE,
    );

    let bytes = write_scan_line_file(header, &[("R", SampleType::F16, zero_plane)]);
    let context = Context::start_read_from_bytes(bytes, ContextOptions::default()).unwrap();

    let mut alpha = vec![0_u8; width * height * 2];
    let mut decoder = DecodePipeline::new(&context, 0, ChunkLocator::ScanLine { y: 0 }).unwrap();

    decoder.request_channel_or_fill(b"A", ChannelTarget {
        sample_type: SampleType::F16,
        pixel_stride: 2,
        row_stride: width * 2,
        pixels: &mut alpha,
    }, 1.0).unwrap();

    decoder.run().unwrap();

    for sample in alpha.chunks_exact(2) {
        let value = f16::from_bits(u16::from_ne_bytes(sample.try_into().unwrap()));
        assert_eq!(value.to_f32(), 1.0);
    }
}

#[test]
fn subsampled_chroma_channels_roundtrip(){
    let (width, height) = (16, 8);

    let mut luma_plane = Vec::new();
    for index in 0 .. width * height {
        luma_plane.extend_from_slice(&f16::from_f32(index as f32 / 128.0).to_bits().to_ne_bytes());
    }

    // chroma is stored at half resolution in both dimensions
    let mut chroma_plane = Vec::new();
    for index in 0 .. (width / 2) * (height / 2) {
        chroma_plane.extend_from_slice(&f16::from_f32(0.5 - index as f32 / 64.0).to_bits().to_ne_bytes());
    }

    let mut chroma = ChannelDescription::new(Text::new_or_panic("BY"), SampleType::F16, true);
    chroma.sampling = Vec2(2, 2);

    let channels = ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic("Y"), SampleType::F16, false),
        chroma,
    ]);

    let header = Header::new_scan_line(
        IntegerBounds::from_dimensions(Vec2(width, height)),
        channels, Compression::ZIP,
    );

    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend.clone()), ContextOptions::default()).unwrap();
    let part = context.add_header(header).unwrap();

    // sixteen lines per chunk: the whole image is one chunk
    let chunk = context.chunk_by_index(part, 0).unwrap();
    let mut encoder = EncodePipeline::new(&context, part, chunk.locator).unwrap();

    encoder.set_channel_source(b"Y", ChannelSource {
        sample_type: SampleType::F16,
        pixel_stride: 2, row_stride: width * 2,
        pixels: &luma_plane,
    }).unwrap();

    encoder.set_channel_source(b"BY", ChannelSource {
        sample_type: SampleType::F16,
        pixel_stride: 2, row_stride: (width / 2) * 2,
        pixels: &chroma_plane,
    }).unwrap();

    encoder.run().unwrap();
    context.finish().unwrap();

    let context = Context::start_read_from_bytes(backend.contents(), ContextOptions::default()).unwrap();
    let mut decoder = DecodePipeline::new(&context, 0, ChunkLocator::ScanLine { y: 0 }).unwrap();

    let mut luma_out = vec![0_u8; luma_plane.len()];
    let mut chroma_out = vec![0_u8; chroma_plane.len()];

    decoder.request_channel(b"Y", ChannelTarget {
        sample_type: SampleType::F16,
        pixel_stride: 2, row_stride: width * 2,
        pixels: &mut luma_out,
    }).unwrap();

    decoder.request_channel(b"BY", ChannelTarget {
        sample_type: SampleType::F16,
        pixel_stride: 2, row_stride: (width / 2) * 2,
        pixels: &mut chroma_out,
    }).unwrap();

    decoder.run().unwrap();

    assert_eq!(luma_out, luma_plane);
    assert_eq!(chroma_out, chroma_plane);
}
