
//! Deep data: chunks with a variable number of samples per pixel,
//! addressed through a sample count table.

use exr_core::prelude::*;
use smallvec::smallvec;


const WIDTH: usize = 7;
const HEIGHT: usize = 3;

fn deep_header(compression: Compression) -> Header {
    let channels = ChannelList::new(smallvec![
        ChannelDescription::new(Text::new_or_panic("Z"), SampleType::F32, true),
    ]);

    let mut header = Header::new_scan_line(
        IntegerBounds::from_dimensions(Vec2(WIDTH, HEIGHT)),
        channels, compression,
    ).with_part_identification(Text::new_or_panic("deep"), Storage::DeepScanLine);

    header.insert(Text::new_or_panic("version"), AttributeValue::I32(1)).unwrap();
    header.insert(Text::new_or_panic("maxSamplesPerPixel"), AttributeValue::I32(4)).unwrap();
    header
}

/// Every pixel stores `x % 4` samples, each sample holding the pixel index.
fn sample_counts() -> Vec<i32> {
    (0 .. WIDTH * HEIGHT).map(|index| (index % WIDTH % 4) as i32).collect()
}

fn sample_payload(counts: &[i32]) -> Vec<u8> {
    let mut payload = Vec::new();

    for (pixel, &count) in counts.iter().enumerate() {
        for _ in 0 .. count {
            payload.extend_from_slice(&(pixel as f32).to_bits().to_ne_bytes());
        }
    }

    payload
}

fn write_deep_file(compression: Compression) -> Vec<u8> {
    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend.clone()), ContextOptions::default()).unwrap();
    let part = context.add_header(deep_header(compression)).unwrap();

    let counts = sample_counts();
    let payload = sample_payload(&counts);

    for y in 0 .. HEIGHT {
        let chunk = context.scan_line_chunk(part, y as i32).unwrap();
        let line_counts = &counts[y * WIDTH .. (y + 1) * WIDTH];

        let payload_start: usize = counts[.. y * WIDTH].iter().map(|&count| count as usize * 4).sum();
        let payload_length: usize = line_counts.iter().map(|&count| count as usize * 4).sum();

        let mut encoder = EncodePipeline::new_deep(&context, part, chunk.locator).unwrap();

        encoder.set_deep_source(DeepChunkSource {
            sample_counts: line_counts,
            samples: &payload[payload_start .. payload_start + payload_length],
        }).unwrap();

        encoder.run().unwrap();
    }

    context.finish().unwrap();
    backend.contents()
}


#[test]
fn deep_scan_lines_roundtrip(){
    for compression in [Compression::Uncompressed, Compression::RLE, Compression::ZIPS] {
        let bytes = write_deep_file(compression);

        let context = Context::start_read_from_bytes(bytes, ContextOptions::default()).unwrap();
        assert_eq!(context.part_storage(0).unwrap(), Storage::DeepScanLine);

        let counts = sample_counts();
        let payload = sample_payload(&counts);

        for y in 0 .. HEIGHT {
            let mut decoder = DecodePipeline::new(&context, 0, ChunkLocator::ScanLine { y: y as i32 }).unwrap();
            decoder.run().unwrap();

            let line_counts = &counts[y * WIDTH .. (y + 1) * WIDTH];
            assert_eq!(decoder.sample_counts_per_pixel(), line_counts, "{} line {}", compression, y);

            let payload_start: usize = counts[.. y * WIDTH].iter().map(|&count| count as usize * 4).sum();
            let payload_length: usize = line_counts.iter().map(|&count| count as usize * 4).sum();

            assert_eq!(
                decoder.deep_sample_data(),
                &payload[payload_start .. payload_start + payload_length],
                "{} line {}", compression, y
            );
        }
    }
}

#[test]
fn sample_counts_only_skips_the_payload(){
    let bytes = write_deep_file(Compression::ZIPS);
    let context = Context::start_read_from_bytes(bytes, ContextOptions::default()).unwrap();

    let mut decoder = DecodePipeline::new(&context, 0, ChunkLocator::ScanLine { y: 0 }).unwrap();
    decoder.sample_data_only = true;
    decoder.run().unwrap();

    let counts = sample_counts();
    assert_eq!(decoder.sample_counts_per_pixel(), &counts[.. WIDTH]);
    assert!(decoder.deep_sample_data().is_empty());
}

#[test]
fn cumulative_counts_accumulate_within_each_line(){
    let bytes = write_deep_file(Compression::RLE);
    let context = Context::start_read_from_bytes(bytes, ContextOptions::default()).unwrap();

    let mut decoder = DecodePipeline::new(&context, 0, ChunkLocator::ScanLine { y: 1 }).unwrap();
    decoder.sample_data_only = true;
    decoder.run().unwrap();

    let cumulative = decoder.cumulative_sample_counts();
    assert_eq!(cumulative.len(), WIDTH);

    let mut expected_accumulated = 0;
    for (x, &value) in cumulative.iter().enumerate() {
        expected_accumulated += (x % 4) as i32;
        assert_eq!(value, expected_accumulated);
    }
}

#[test]
fn flat_pipeline_rejects_deep_parts(){
    let bytes = write_deep_file(Compression::RLE);
    let context = Context::start_read_from_bytes(bytes, ContextOptions::default()).unwrap();

    // the context is read-only, so create the pipeline against it
    let error = EncodePipeline::new(&context, 0, ChunkLocator::ScanLine { y: 0 }).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UseScanDeepWrite);
}

#[test]
fn piz_cannot_compress_deep_data(){
    let backend = SharedMemoryBackend::new();
    let mut context = Context::start_write_to_backend(Box::new(backend), ContextOptions::default()).unwrap();

    let error = context.add_header(deep_header(Compression::PIZ)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
}
