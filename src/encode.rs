
//! The encoding pipeline: gathers pixels from caller buffers,
//! packs them into the file layout, compresses them,
//! and commits the finished chunk to the context.
//!
//! Every stage can be replaced by the caller before running the pipeline.
//! A pipeline is reused for many chunks of the same part,
//! so the transcoding buffers are allocated only once.

use crate::chunk::{ChunkInfo, ChunkLocator, ChunkSizes};
use crate::compression::{CodecOptions, Compression};
use crate::context::Context;
use crate::error::*;
use crate::io::Data;
use crate::math::mod_p;
use crate::meta::attribute::{ChannelList, SampleType};
use crate::samples::Sample;


/// One stage of the encoding pipeline.
/// The default stages are installed by [`EncodePipeline::choose_default_routines`],
/// and any of them can be replaced with a custom function.
pub type EncodeStage = for<'c, 'b> fn(&mut EncodePipeline<'c, 'b>) -> UnitResult;


/// The pixels of one channel of the current chunk,
/// in the memory of the caller.
#[derive(Debug)]
pub struct ChannelSource<'b> {

    /// The sample type of the caller's buffer.
    /// Converted to the channel's file type while packing.
    pub sample_type: SampleType,

    /// The byte offset between horizontally adjacent samples.
    pub pixel_stride: usize,

    /// The byte offset between vertically adjacent samples.
    pub row_stride: usize,

    /// The pixel memory, covering the subsampled resolution of the chunk.
    pub pixels: &'b [u8],
}

/// The pre-packed sample data of a deep chunk,
/// in the memory of the caller.
#[derive(Debug)]
pub struct DeepChunkSource<'b> {

    /// The number of samples of each pixel of the chunk, in scan line order.
    pub sample_counts: &'b [i32],

    /// The sample payload, one contiguous buffer.
    pub samples: &'b [u8],
}


/// Encodes chunks of one part of a file.
/// Pipelines must not be shared across threads; to encode chunks
/// in parallel, create one pipeline per thread.
pub struct EncodePipeline<'c, 'b> {
    context: &'c Context,
    part_index: usize,

    channels: ChannelList,
    compression: Compression,
    options: CodecOptions,
    deep: bool,

    chunk: ChunkInfo,
    sources: Vec<Option<ChannelSource<'b>>>,
    deep_source: Option<DeepChunkSource<'b>>,

    // transcoding buffers, reused between chunks
    packed: Vec<u8>,
    compressed: Vec<u8>,
    packed_sample_table: Vec<u8>,
    compressed_sample_table: Vec<u8>,

    /// Converts the caller's pixels into the packed file layout.
    pub convert_and_pack: EncodeStage,

    /// Compresses the packed pixels.
    pub compress: EncodeStage,

    /// Runs between compressing and writing, for custom write scheduling.
    pub yield_until_ready: EncodeStage,

    /// Commits the chunk to the context.
    pub write_chunk: EncodeStage,
}

impl<'c, 'b> std::fmt::Debug for EncodePipeline<'c, 'b> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("EncodePipeline")
            .field("part_index", &self.part_index)
            .field("compression", &self.compression)
            .field("chunk", &self.chunk)
            .finish()
    }
}


impl<'c, 'b> EncodePipeline<'c, 'b> {

    /// Start encoding flat chunks of the specified part.
    /// Returns an error for deep parts, which use [`EncodePipeline::new_deep`].
    pub fn new(context: &'c Context, part_index: usize, locator: ChunkLocator) -> Result<Self> {
        let pipeline = Self::initialize(context, part_index, locator)?;

        if pipeline.deep {
            return Err(Error::from_kind(pipeline.storage_error_kind(true)));
        }

        Ok(pipeline)
    }

    /// Start encoding deep chunks of the specified part.
    /// Returns an error for flat parts, which use [`EncodePipeline::new`].
    pub fn new_deep(context: &'c Context, part_index: usize, locator: ChunkLocator) -> Result<Self> {
        let pipeline = Self::initialize(context, part_index, locator)?;

        if !pipeline.deep {
            return Err(Error::from_kind(pipeline.storage_error_kind(false)));
        }

        Ok(pipeline)
    }

    fn initialize(context: &'c Context, part_index: usize, locator: ChunkLocator) -> Result<Self> {
        let header = context.header(part_index)?;
        let channels = header.channels()?.clone();
        let compression = header.compression()?;
        let storage = header.storage()?;

        let chunk = crate::chunk::chunk_info(header, locator)?;
        let channel_count = channels.list.len();

        Ok(EncodePipeline {
            context, part_index,
            channels, compression,
            options: context.codec_options(part_index)?,
            deep: storage.is_deep(),
            chunk,
            sources: (0 .. channel_count).map(|_| None).collect(),
            deep_source: None,

            packed: Vec::new(),
            compressed: Vec::new(),
            packed_sample_table: Vec::new(),
            compressed_sample_table: Vec::new(),

            convert_and_pack: default_convert_and_pack,
            compress: default_compress,
            yield_until_ready: default_yield,
            write_chunk: default_write_chunk,
        })
    }

    fn storage_error_kind(&self, part_is_deep: bool) -> ErrorKind {
        let tiled = matches!(self.chunk.locator, ChunkLocator::Tile { .. });

        match (part_is_deep, tiled) {
            (true, false) => ErrorKind::UseScanDeepWrite,
            (true, true) => ErrorKind::UseTileDeepWrite,
            (false, false) => ErrorKind::UseScanNonDeepWrite,
            (false, true) => ErrorKind::UseTileNonDeepWrite,
        }
    }

    /// Reinstall the default implementations of all four stages.
    pub fn choose_default_routines(&mut self) {
        self.convert_and_pack = default_convert_and_pack;
        self.compress = default_compress;
        self.yield_until_ready = default_yield;
        self.write_chunk = default_write_chunk;
    }

    /// Continue with another chunk of the same part.
    /// The channel sources remain registered, the buffers remain allocated.
    pub fn restart(&mut self, locator: ChunkLocator) -> UnitResult {
        let header = self.context.header(self.part_index)?;
        self.chunk = crate::chunk::chunk_info(header, locator)?;
        Ok(())
    }

    /// The chunk this pipeline currently encodes.
    pub fn chunk(&self) -> &ChunkInfo {
        &self.chunk
    }

    /// Provide the pixels for one channel of the current chunk.
    /// All channels of the part must be provided before running.
    pub fn set_channel_source(&mut self, channel_name: &[u8], source: ChannelSource<'b>) -> UnitResult {
        let index = self.channels.list.iter()
            .position(|channel| channel.name.as_slice() == channel_name)
            .ok_or_else(|| Error::invalid("no channel with that name"))?;

        let channel = &self.channels.list[index];
        let bytes_per_sample = source.sample_type.bytes_per_sample();

        if source.pixel_stride < bytes_per_sample {
            return Err(Error::new(ErrorKind::InvalidArgument, "pixel stride smaller than sample"));
        }

        let resolution = channel.subsampled_pixels(self.chunk.bounds);
        let required_bytes = source_length(&source, resolution.x(), resolution.y());

        if source.pixels.len() < required_bytes {
            return Err(Error::new(ErrorKind::ArgumentOutOfRange, "channel source buffer too small"));
        }

        self.sources[index] = Some(source);
        Ok(())
    }

    /// Provide the sample counts and the packed sample payload
    /// for the current deep chunk.
    pub fn set_deep_source(&mut self, source: DeepChunkSource<'b>) -> UnitResult {
        if !self.deep {
            return Err(Error::from_kind(self.storage_error_kind(false)));
        }

        if source.sample_counts.len() != self.chunk.bounds.size.area() {
            return Err(Error::new(ErrorKind::InvalidSampleData, "sample count table does not match chunk size"));
        }

        self.deep_source = Some(source);
        Ok(())
    }

    /// Run all stages, encoding and writing the current chunk.
    pub fn run(&mut self) -> UnitResult {
        (self.convert_and_pack)(self)?;
        (self.compress)(self)?;
        (self.yield_until_ready)(self)?;
        (self.write_chunk)(self)?;
        Ok(())
    }
}

fn source_length(source: &ChannelSource<'_>, samples_per_row: usize, rows: usize) -> usize {
    if rows == 0 || samples_per_row == 0 { return 0; }

    (rows - 1) * source.row_stride
        + (samples_per_row - 1) * source.pixel_stride
        + source.sample_type.bytes_per_sample()
}


fn default_convert_and_pack(pipeline: &mut EncodePipeline<'_, '_>) -> UnitResult {
    if pipeline.deep {
        return pack_deep(pipeline);
    }

    let bounds = pipeline.chunk.bounds;

    pipeline.packed.clear();
    pipeline.packed.reserve(pipeline.chunk.unpacked_size);

    let mut rows_packed = vec![0_usize; pipeline.channels.list.len()];

    for y in bounds.position.y() .. bounds.end().y() {
        for (channel_index, channel) in pipeline.channels.list.iter().enumerate() {
            if mod_p(y, usize_to_i32(channel.sampling.y())) != 0 { continue; }

            let source = pipeline.sources[channel_index].as_ref().ok_or_else(||
                Error::new(ErrorKind::InvalidArgument, "a channel source is missing")
            )?;

            let samples = channel.subsampled_line_samples(bounds.size.width());
            let source_bytes_per_sample = source.sample_type.bytes_per_sample();

            let row = rows_packed[channel_index];
            rows_packed[channel_index] = row + 1;

            let mut sample_bytes = [0_u8; 4];
            for x in 0 .. samples {
                let offset = row * source.row_stride + x * source.pixel_stride;
                let source_bytes = &source.pixels[offset .. offset + source_bytes_per_sample];

                let sample = Sample::from_native_bytes(source_bytes, source.sample_type)
                    .convert_to(channel.sample_type);

                let packed_bytes = &mut sample_bytes[.. channel.sample_type.bytes_per_sample()];
                sample.write_native_bytes(packed_bytes);
                pipeline.packed.extend_from_slice(packed_bytes);
            }
        }
    }

    debug_assert_eq!(pipeline.packed.len(), pipeline.chunk.unpacked_size, "packed size mismatch bug");
    Ok(())
}

fn pack_deep(pipeline: &mut EncodePipeline<'_, '_>) -> UnitResult {
    let source = pipeline.deep_source.as_ref().ok_or_else(||
        Error::new(ErrorKind::InvalidSampleData, "deep chunk source is missing")
    )?;

    // the sample count table stores, within each scan line,
    // the cumulative number of samples up to and including each pixel
    pipeline.packed_sample_table.clear();
    pipeline.packed_sample_table.reserve(source.sample_counts.len() * i32::BYTE_SIZE);

    let width = pipeline.chunk.bounds.size.width();

    for line in source.sample_counts.chunks(width) {
        let mut accumulated = 0_i32;

        for &count in line {
            if count < 0 {
                return Err(Error::new(ErrorKind::InvalidSampleData, "negative sample count"));
            }

            accumulated = accumulated.checked_add(count)
                .ok_or_else(|| Error::new(ErrorKind::InvalidSampleData, "sample count overflow"))?;

            accumulated.write(&mut pipeline.packed_sample_table)?;
        }
    }

    pipeline.packed.clear();
    pipeline.packed.extend_from_slice(source.samples);
    Ok(())
}

fn default_compress(pipeline: &mut EncodePipeline<'_, '_>) -> UnitResult {
    if pipeline.deep {
        pipeline.compressed_sample_table = pipeline.compression
            .compress_deep_bytes(&pipeline.packed_sample_table, &pipeline.options)?;

        pipeline.compressed = pipeline.compression
            .compress_deep_bytes(&pipeline.packed, &pipeline.options)?;

        return Ok(());
    }

    let packed = std::mem::take(&mut pipeline.packed);
    let packed_size = packed.len();

    pipeline.compressed = pipeline.compression.compress_image_section(
        &pipeline.channels, packed, pipeline.chunk.bounds, &pipeline.options,
    )?;

    debug_assert!(pipeline.compressed.len() <= packed_size, "compressed output exceeds fallback size bug");
    Ok(())
}

fn default_yield(_pipeline: &mut EncodePipeline<'_, '_>) -> UnitResult {
    std::thread::yield_now();
    Ok(())
}

fn default_write_chunk(pipeline: &mut EncodePipeline<'_, '_>) -> UnitResult {
    let sizes = if pipeline.deep {
        ChunkSizes::Deep {
            packed_sample_table_size: pipeline.compressed_sample_table.len(),
            packed_size: pipeline.compressed.len(),
            unpacked_size: pipeline.packed.len(),
        }
    }
    else {
        ChunkSizes::Flat { packed_size: pipeline.compressed.len() }
    };

    let sample_table: &[u8] = if pipeline.deep { &pipeline.compressed_sample_table } else { &[] };

    pipeline.context.write_chunk(
        pipeline.part_index,
        &pipeline.chunk,
        sizes,
        sample_table,
        &pipeline.compressed,
    )
}
