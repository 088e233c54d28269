
//! Write and read tiled files, including resolution levels.

use exr_core::prelude::*;
use smallvec::smallvec;
use std::convert::TryInto;


fn gz_channels() -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic("G"), SampleType::F16, false),
        ChannelDescription::new(Text::new_or_panic("Z"), SampleType::F32, true),
    ])
}

fn half_bytes(value: f32) -> [u8; 2] {
    f16::from_f32(value).to_bits().to_ne_bytes()
}


#[test]
fn single_level_tile_roundtrip(){
    // a 12x24 tile with a half and a float channel,
    // requested separately after writing
    let tile_size = Vec2(12, 24);
    let image_size = Vec2(36, 48);

    let header = Header::new_tiled(
        IntegerBounds::from_dimensions(image_size),
        gz_channels(), Compression::ZIP,
        TileDescription {
            tile_size,
            level_mode: LevelMode::Singular,
            rounding_mode: RoundingMode::Down,
        },
    );

    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend.clone()), ContextOptions::default()).unwrap();
    let part = context.add_header(header).unwrap();

    assert_eq!(context.chunk_count(part).unwrap(), 3 * 2);

    // every tile stores a recognizable value in its top left corner
    let corner_g = 0.244778_f32;
    let corner_z = 0.244778_f32;

    for chunk_index in 0 .. context.chunk_count(part).unwrap() {
        let chunk = context.chunk_by_index(part, chunk_index).unwrap();
        let pixel_count = chunk.bounds.size.area();

        let mut g_plane = Vec::with_capacity(pixel_count * 2);
        let mut z_plane = Vec::with_capacity(pixel_count * 4);

        for pixel in 0 .. pixel_count {
            let fraction = pixel as f32 / pixel_count as f32;
            let (g, z) = if pixel == 0 { (corner_g, corner_z) } else { (fraction, fraction * 9.0) };

            g_plane.extend_from_slice(&half_bytes(g));
            z_plane.extend_from_slice(&z.to_bits().to_ne_bytes());
        }

        let mut encoder = EncodePipeline::new(&context, part, chunk.locator).unwrap();

        encoder.set_channel_source(b"G", ChannelSource {
            sample_type: SampleType::F16,
            pixel_stride: 2, row_stride: chunk.bounds.size.width() * 2,
            pixels: &g_plane,
        }).unwrap();

        encoder.set_channel_source(b"Z", ChannelSource {
            sample_type: SampleType::F32,
            pixel_stride: 4, row_stride: chunk.bounds.size.width() * 4,
            pixels: &z_plane,
        }).unwrap();

        encoder.run().unwrap();
    }

    context.finish().unwrap();

    // read one specific tile back
    let context = Context::start_read_from_bytes(backend.contents(), ContextOptions::default()).unwrap();
    assert_eq!(context.part_storage(0).unwrap(), Storage::Tile);

    let locator = ChunkLocator::Tile { tile: Vec2(1, 1), level: Vec2(0, 0) };
    let mut decoder = DecodePipeline::new(&context, 0, locator).unwrap();

    let chunk = *decoder.chunk();
    assert_eq!(chunk.bounds.size, tile_size);

    let mut g_pixels = vec![0_u8; tile_size.area() * 2];
    let mut z_pixels = vec![0_u8; tile_size.area() * 4];

    // 12 x 24 pixels of a half channel and a float channel
    assert_eq!(g_pixels.len(), 576);
    assert_eq!(z_pixels.len(), 1152);

    decoder.request_channel(b"G", ChannelTarget {
        sample_type: SampleType::F16,
        pixel_stride: 2, row_stride: tile_size.width() * 2,
        pixels: &mut g_pixels,
    }).unwrap();

    decoder.request_channel(b"Z", ChannelTarget {
        sample_type: SampleType::F32,
        pixel_stride: 4, row_stride: tile_size.width() * 4,
        pixels: &mut z_pixels,
    }).unwrap();

    decoder.run().unwrap();

    let top_left_g = u16::from_ne_bytes(g_pixels[0..2].try_into().unwrap());
    assert_eq!(top_left_g, f16::from_f32(corner_g).to_bits());

    let top_left_z = f32::from_bits(u32::from_ne_bytes(z_pixels[0..4].try_into().unwrap()));
    assert!((top_left_z - corner_z).abs() < 1e-6);
}

#[test]
fn mip_map_levels_roundtrip(){
    let header = Header::new_tiled(
        IntegerBounds::from_dimensions(Vec2(64, 48)),
        gz_channels(), Compression::RLE,
        TileDescription {
            tile_size: Vec2(32, 32),
            level_mode: LevelMode::MipMap,
            rounding_mode: RoundingMode::Down,
        },
    );

    // levels are 64x48, 32x24, 16x12, 8x6, 4x3, 2x1, 1x1
    let expected_chunks = (2 * 2) + 1 + 1 + 1 + 1 + 1 + 1;
    assert_eq!(header.chunk_count().unwrap(), expected_chunks);

    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend.clone()), ContextOptions::default()).unwrap();
    let part = context.add_header(header).unwrap();

    for chunk_index in 0 .. expected_chunks {
        let chunk = context.chunk_by_index(part, chunk_index).unwrap();
        let pixel_count = chunk.bounds.size.area();

        // each chunk stores its own index in every pixel
        let g_plane: Vec<u8> = (0 .. pixel_count)
            .flat_map(|_| half_bytes(chunk_index as f32))
            .collect();

        let z_plane: Vec<u8> = (0 .. pixel_count)
            .flat_map(|_| (chunk_index as f32).to_bits().to_ne_bytes())
            .collect();

        let mut encoder = EncodePipeline::new(&context, part, chunk.locator).unwrap();

        encoder.set_channel_source(b"G", ChannelSource {
            sample_type: SampleType::F16,
            pixel_stride: 2, row_stride: chunk.bounds.size.width() * 2,
            pixels: &g_plane,
        }).unwrap();

        encoder.set_channel_source(b"Z", ChannelSource {
            sample_type: SampleType::F32,
            pixel_stride: 4, row_stride: chunk.bounds.size.width() * 4,
            pixels: &z_plane,
        }).unwrap();

        encoder.run().unwrap();
    }

    context.finish().unwrap();

    let context = Context::start_read_from_bytes(backend.contents(), ContextOptions::default()).unwrap();
    assert!(context.chunk_table_valid(0).unwrap());

    // the smallest level holds the last chunk index
    let locator = ChunkLocator::Tile { tile: Vec2(0, 0), level: Vec2(6, 6) };
    let mut decoder = DecodePipeline::new(&context, 0, locator).unwrap();
    assert_eq!(decoder.chunk().bounds.size, Vec2(1, 1));

    let mut pixel = [0_u8; 4];
    decoder.request_channel(b"Z", ChannelTarget {
        sample_type: SampleType::F32,
        pixel_stride: 4, row_stride: 4,
        pixels: &mut pixel,
    }).unwrap();

    decoder.run().unwrap();

    let value = f32::from_bits(u32::from_ne_bytes(pixel));
    assert_eq!(value, (expected_chunks - 1) as f32);
}

#[test]
fn scan_line_api_is_rejected_on_tiled_parts(){
    let header = Header::new_tiled(
        IntegerBounds::from_dimensions(Vec2(16, 16)),
        gz_channels(), Compression::RLE,
        TileDescription {
            tile_size: Vec2(16, 16),
            level_mode: LevelMode::Singular,
            rounding_mode: RoundingMode::Down,
        },
    );

    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend), ContextOptions::default()).unwrap();
    let part = context.add_header(header).unwrap();

    let error = context.scan_line_chunk(part, 0).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ScanTileMixedApi);

    // and the other way around
    let scan_header = Header::new_scan_line(
        IntegerBounds::from_dimensions(Vec2(16, 16)),
        gz_channels(), Compression::RLE,
    );

    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend), ContextOptions::default()).unwrap();
    let part = context.add_header(scan_header).unwrap();

    let error = context.tile_chunk(part, Vec2(0, 0), Vec2(0, 0)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TileScanMixedApi);
}
