
//! Files with multiple parts: every chunk leader carries its
//! part number, and parts are addressed independently.

use exr_core::prelude::*;
use smallvec::smallvec;
use std::convert::TryInto;


fn single_channel(name: &str, sample_type: SampleType) -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic(name), sample_type, false),
    ])
}


#[test]
fn two_parts_roundtrip(){
    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend.clone()), ContextOptions::default()).unwrap();

    let scan_part = context.add_header(
        Header::new_scan_line(
            IntegerBounds::from_dimensions(Vec2(9, 5)),
            single_channel("L", SampleType::F16),
            Compression::ZIPS,
        ).with_part_identification(Text::new_or_panic("left"), Storage::ScanLine)
    ).unwrap();

    let tile_part = context.add_header(
        Header::new_tiled(
            IntegerBounds::from_dimensions(Vec2(8, 8)),
            single_channel("D", SampleType::F32),
            Compression::RLE,
            TileDescription {
                tile_size: Vec2(8, 8),
                level_mode: LevelMode::Singular,
                rounding_mode: RoundingMode::Down,
            },
        ).with_part_identification(Text::new_or_panic("depth"), Storage::Tile)
    ).unwrap();

    assert_eq!((scan_part, tile_part), (0, 1));

    // the scan line part: one chunk per line, 0.5 everywhere
    let scan_plane: Vec<u8> = (0 .. 9_usize)
        .flat_map(|_| f16::from_f32(0.5).to_bits().to_ne_bytes())
        .collect();

    for y in 0 .. 5 {
        let mut encoder = EncodePipeline::new(&context, scan_part, ChunkLocator::ScanLine { y }).unwrap();

        encoder.set_channel_source(b"L", ChannelSource {
            sample_type: SampleType::F16,
            pixel_stride: 2, row_stride: 9 * 2,
            pixels: &scan_plane,
        }).unwrap();

        encoder.run().unwrap();
    }

    // the tiled part: a single tile of floats
    let tile_plane: Vec<u8> = (0 .. 64_usize)
        .flat_map(|index| (index as f32).to_bits().to_ne_bytes())
        .collect();

    let locator = ChunkLocator::Tile { tile: Vec2(0, 0), level: Vec2(0, 0) };
    let mut encoder = EncodePipeline::new(&context, tile_part, locator).unwrap();

    encoder.set_channel_source(b"D", ChannelSource {
        sample_type: SampleType::F32,
        pixel_stride: 4, row_stride: 8 * 4,
        pixels: &tile_plane,
    }).unwrap();

    encoder.run().unwrap();
    context.finish().unwrap();


    let context = Context::start_read_from_bytes(backend.contents(), ContextOptions::default()).unwrap();

    assert_eq!(context.part_count(), 2);
    assert_ne!(context.version() & (1 << 12), 0); // the multipart flag is set

    assert_eq!(context.header(0).unwrap().name().unwrap(), &Text::new_or_panic("left"));
    assert_eq!(context.header(1).unwrap().name().unwrap(), &Text::new_or_panic("depth"));

    assert_eq!(context.part_storage(0).unwrap(), Storage::ScanLine);
    assert_eq!(context.part_storage(1).unwrap(), Storage::Tile);

    assert!(context.has_channel(0, b"L"));
    assert!(!context.has_channel(0, b"D"));
    assert!(context.has_channel(1, b"D"));

    // decode a line of the first part
    let mut line = vec![0_u8; 9 * 2];
    let mut decoder = DecodePipeline::new(&context, 0, ChunkLocator::ScanLine { y: 3 }).unwrap();

    decoder.request_channel(b"L", ChannelTarget {
        sample_type: SampleType::F16,
        pixel_stride: 2, row_stride: 9 * 2,
        pixels: &mut line,
    }).unwrap();

    decoder.run().unwrap();

    for sample in line.chunks_exact(2) {
        assert_eq!(f16::from_bits(u16::from_ne_bytes([sample[0], sample[1]])).to_f32(), 0.5);
    }

    // decode the tile of the second part
    let mut tile = vec![0_u8; 64 * 4];
    let locator = ChunkLocator::Tile { tile: Vec2(0, 0), level: Vec2(0, 0) };
    let mut decoder = DecodePipeline::new(&context, 1, locator).unwrap();

    decoder.request_channel(b"D", ChannelTarget {
        sample_type: SampleType::F32,
        pixel_stride: 4, row_stride: 8 * 4,
        pixels: &mut tile,
    }).unwrap();

    decoder.run().unwrap();

    for (index, sample) in tile.chunks_exact(4).enumerate() {
        let value = f32::from_bits(u32::from_ne_bytes(sample.try_into().unwrap()));
        assert_eq!(value, index as f32);
    }
}

#[test]
fn reading_a_chunk_of_the_wrong_part_fails(){
    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend.clone()), ContextOptions::default()).unwrap();

    for name in ["one", "two"] {
        context.add_header(
            Header::new_scan_line(
                IntegerBounds::from_dimensions(Vec2(4, 1)),
                single_channel("Y", SampleType::F16),
                Compression::Uncompressed,
            ).with_part_identification(Text::new_or_panic(name), Storage::ScanLine)
        ).unwrap();
    }

    let plane = vec![0_u8; 4 * 2];
    for part in 0 .. 2 {
        let mut encoder = EncodePipeline::new(&context, part, ChunkLocator::ScanLine { y: 0 }).unwrap();

        encoder.set_channel_source(b"Y", ChannelSource {
            sample_type: SampleType::F16,
            pixel_stride: 2, row_stride: 4 * 2,
            pixels: &plane,
        }).unwrap();

        encoder.run().unwrap();
    }

    context.finish().unwrap();

    // corrupt the offset tables so that part 0 points at part 1's chunk
    let mut bytes = backend.contents();

    let mut header_bytes = 8;
    let read_context = Context::start_read_from_bytes(bytes.clone(), ContextOptions::default()).unwrap();
    for part in 0 .. 2 {
        header_bytes += read_context.header(part).unwrap().byte_size();
    }
    header_bytes += 1; // the end-of-headers marker

    let part_one_offset = u64::from_be_bytes(bytes[header_bytes + 8 .. header_bytes + 16].try_into().unwrap());
    bytes[header_bytes .. header_bytes + 8].copy_from_slice(&part_one_offset.to_be_bytes());

    let context = Context::start_read_from_bytes(bytes, ContextOptions::default()).unwrap();
    let mut pixels = vec![0_u8; 4 * 2];

    let mut decoder = DecodePipeline::new(&context, 0, ChunkLocator::ScanLine { y: 0 }).unwrap();
    decoder.request_channel(b"Y", ChannelTarget {
        sample_type: SampleType::F16,
        pixel_stride: 2, row_stride: 4 * 2,
        pixels: &mut pixels,
    }).unwrap();

    let error = decoder.run().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IncorrectPart);
}
