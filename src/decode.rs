
//! The decoding pipeline: locates a chunk through the context,
//! decompresses it, and scatters the pixels into caller buffers,
//! converting sample types and filling absent channels on the way.
//!
//! Every stage can be replaced by the caller before running the pipeline.
//! A pipeline is reused for many chunks of the same part,
//! so the transcoding buffers are allocated only once.

use crate::chunk::{ChunkInfo, ChunkLeader, ChunkLocator, ChunkSizes};
use crate::compression::{CodecOptions, Compression};
use crate::context::Context;
use crate::error::*;
use crate::io::Data;
use crate::math::mod_p;
use crate::meta::attribute::{ChannelList, SampleType};
use crate::samples::Sample;


/// One stage of the decoding pipeline.
/// The default stages are installed by [`DecodePipeline::choose_default_routines`],
/// and any of them can be replaced with a custom function.
pub type DecodeStage = for<'c, 'b> fn(&mut DecodePipeline<'c, 'b>) -> UnitResult;


/// The destination for one channel of the current chunk,
/// in the memory of the caller.
#[derive(Debug)]
pub struct ChannelTarget<'b> {

    /// The sample type of the caller's buffer.
    /// The file samples are converted to this type while unpacking.
    pub sample_type: SampleType,

    /// The byte offset between horizontally adjacent samples.
    pub pixel_stride: usize,

    /// The byte offset between vertically adjacent samples.
    pub row_stride: usize,

    /// The pixel memory, covering the subsampled resolution of the chunk.
    pub pixels: &'b mut [u8],
}

#[derive(Debug)]
enum TargetContents {

    /// The samples come from the channel at this
    /// position of the file's channel list.
    FileChannel(usize),

    /// The channel is absent from the file; every sample
    /// receives this value, converted to the buffer type.
    Fill(f32),
}

#[derive(Debug)]
struct RequestedChannel<'b> {
    target: ChannelTarget<'b>,
    contents: TargetContents,
}


/// Decodes chunks of one part of a file.
/// Pipelines must not be shared across threads; to decode chunks
/// in parallel, create one pipeline per thread.
pub struct DecodePipeline<'c, 'b> {
    context: &'c Context,
    part_index: usize,

    channels: ChannelList,
    compression: Compression,
    options: CodecOptions,
    deep: bool,

    chunk: ChunkInfo,
    leader: Option<ChunkLeader>,
    requested: Vec<RequestedChannel<'b>>,

    /// Stop after decoding the deep sample count table,
    /// skipping the sample payload entirely.
    pub sample_data_only: bool,

    // transcoding buffers, reused between chunks
    compressed: Vec<u8>,
    unpacked: Vec<u8>,
    compressed_sample_table: Vec<u8>,
    sample_counts: Vec<i32>,

    /// Reads the chunk leader and the compressed payloads.
    pub read_chunk: DecodeStage,

    /// Decompresses the payloads.
    pub decompress: DecodeStage,

    /// Converts the decompressed pixels into the caller buffers.
    pub convert_and_unpack: DecodeStage,
}

impl<'c, 'b> std::fmt::Debug for DecodePipeline<'c, 'b> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("DecodePipeline")
            .field("part_index", &self.part_index)
            .field("compression", &self.compression)
            .field("chunk", &self.chunk)
            .finish()
    }
}


impl<'c, 'b> DecodePipeline<'c, 'b> {

    /// Start decoding chunks of the specified part.
    pub fn new(context: &'c Context, part_index: usize, locator: ChunkLocator) -> Result<Self> {
        let header = context.header(part_index)?;
        let channels = header.channels()?.clone();
        let compression = header.compression()?;
        let storage = header.storage()?;

        let chunk = crate::chunk::chunk_info(header, locator)?;

        Ok(DecodePipeline {
            context, part_index,
            channels, compression,
            options: context.codec_options(part_index)?,
            deep: storage.is_deep(),
            chunk,
            leader: None,
            requested: Vec::new(),
            sample_data_only: false,

            compressed: Vec::new(),
            unpacked: Vec::new(),
            compressed_sample_table: Vec::new(),
            sample_counts: Vec::new(),

            read_chunk: default_read_chunk,
            decompress: default_decompress,
            convert_and_unpack: default_convert_and_unpack,
        })
    }

    /// Reinstall the default implementations of all three stages.
    pub fn choose_default_routines(&mut self) {
        self.read_chunk = default_read_chunk;
        self.decompress = default_decompress;
        self.convert_and_unpack = default_convert_and_unpack;
    }

    /// Continue with another chunk of the same part.
    /// The channel requests are dropped, as their buffers are chunk-specific;
    /// the transcoding buffers remain allocated.
    pub fn restart(&mut self, locator: ChunkLocator) -> UnitResult {
        let header = self.context.header(self.part_index)?;
        self.chunk = crate::chunk::chunk_info(header, locator)?;
        self.leader = None;
        self.requested.clear();
        Ok(())
    }

    /// The chunk this pipeline currently decodes.
    pub fn chunk(&self) -> &ChunkInfo {
        &self.chunk
    }

    /// Request one channel of the current chunk to be decoded
    /// into the specified buffer. Channels that are never requested
    /// are skipped while unpacking.
    /// Returns `NoAttrByName` if the part has no channel with that name.
    pub fn request_channel(&mut self, channel_name: &[u8], target: ChannelTarget<'b>) -> UnitResult {
        let index = self.channels.list.iter()
            .position(|channel| channel.name.as_slice() == channel_name)
            .ok_or_else(|| Error::new(ErrorKind::NoAttrByName, "no channel with that name"))?;

        let channel = &self.channels.list[index];
        let resolution = channel.subsampled_pixels(self.chunk.bounds);
        self.validate_target(&target, resolution.x(), resolution.y())?;

        self.requested.push(RequestedChannel { target, contents: TargetContents::FileChannel(index) });
        Ok(())
    }

    /// Request one channel, filling the buffer with the specified value
    /// if the part has no channel with that name.
    pub fn request_channel_or_fill(&mut self, channel_name: &[u8], target: ChannelTarget<'b>, fill_value: f32) -> UnitResult {
        if self.channels.find_by_name(channel_name).is_some() {
            return self.request_channel(channel_name, target);
        }

        // absent channels are not subsampled
        self.validate_target(&target, self.chunk.bounds.size.width(), self.chunk.bounds.size.height())?;
        self.requested.push(RequestedChannel { target, contents: TargetContents::Fill(fill_value) });
        Ok(())
    }

    fn validate_target(&self, target: &ChannelTarget<'b>, samples_per_row: usize, rows: usize) -> UnitResult {
        let bytes_per_sample = target.sample_type.bytes_per_sample();

        if target.pixel_stride < bytes_per_sample {
            return Err(Error::new(ErrorKind::InvalidArgument, "pixel stride smaller than sample"));
        }

        let required = if rows == 0 || samples_per_row == 0 { 0 }
            else {
                (rows - 1) * target.row_stride
                    + (samples_per_row - 1) * target.pixel_stride
                    + bytes_per_sample
            };

        if target.pixels.len() < required {
            return Err(Error::new(ErrorKind::ArgumentOutOfRange, "channel target buffer too small"));
        }

        Ok(())
    }

    /// Run all stages, decoding the current chunk.
    pub fn run(&mut self) -> UnitResult {
        (self.read_chunk)(self)?;
        (self.decompress)(self)?;

        if self.deep && self.sample_data_only {
            return Ok(());
        }

        (self.convert_and_unpack)(self)?;
        Ok(())
    }

    /// The sample count table of the current deep chunk after decoding:
    /// for each scan line of the chunk, the cumulative sample count
    /// up to and including each pixel.
    pub fn cumulative_sample_counts(&self) -> &[i32] {
        &self.sample_counts
    }

    /// The number of samples of each pixel of the
    /// current deep chunk, in scan line order.
    pub fn sample_counts_per_pixel(&self) -> Vec<i32> {
        let width = self.chunk.bounds.size.width();
        let mut counts = Vec::with_capacity(self.sample_counts.len());

        for line in self.sample_counts.chunks(width) {
            let mut previous = 0;
            for &cumulative in line {
                counts.push(cumulative - previous);
                previous = cumulative;
            }
        }

        counts
    }

    /// The decompressed sample payload of the current deep chunk,
    /// one contiguous buffer addressed through the sample counts.
    pub fn deep_sample_data(&self) -> &[u8] {
        debug_assert!(self.deep, "sample data of a flat chunk bug");
        &self.unpacked
    }
}


fn default_read_chunk(pipeline: &mut DecodePipeline<'_, '_>) -> UnitResult {
    let leader = pipeline.context.read_chunk_into(
        pipeline.part_index,
        &pipeline.chunk,
        &mut pipeline.compressed,
        &mut pipeline.compressed_sample_table,
    )?;

    pipeline.leader = Some(leader);
    Ok(())
}

fn default_decompress(pipeline: &mut DecodePipeline<'_, '_>) -> UnitResult {
    let leader = pipeline.leader.as_ref().ok_or_else(||
        Error::new(ErrorKind::ArgumentOutOfRange, "chunk has not been read yet")
    )?;

    if pipeline.deep {
        let table_bytes = pipeline.compression.decompress_deep_bytes(
            &pipeline.compressed_sample_table,
            pipeline.chunk.sample_count_table_size,
            &pipeline.options,
        )?;

        pipeline.sample_counts.resize(table_bytes.len() / i32::BYTE_SIZE, 0);
        i32::read_slice(&mut table_bytes.as_slice(), &mut pipeline.sample_counts)?;

        validate_cumulative_counts(&pipeline.sample_counts, pipeline.chunk.bounds.size.width())?;

        if pipeline.sample_data_only {
            return Ok(());
        }

        let unpacked_size = match leader.sizes {
            ChunkSizes::Deep { unpacked_size, .. } => unpacked_size,
            ChunkSizes::Flat { .. } => return Err(Error::new(ErrorKind::BadChunkLeader, "flat chunk in deep part")),
        };

        pipeline.unpacked = pipeline.compression.decompress_deep_bytes(
            &pipeline.compressed, unpacked_size, &pipeline.options,
        )?;

        return Ok(());
    }

    let compressed = std::mem::take(&mut pipeline.compressed);

    pipeline.unpacked = pipeline.compression.decompress_image_section(
        &pipeline.channels,
        compressed,
        pipeline.chunk.bounds,
        pipeline.chunk.unpacked_size,
        &pipeline.options,
    )?;

    Ok(())
}

fn validate_cumulative_counts(counts: &[i32], width: usize) -> UnitResult {
    for line in counts.chunks(width) {
        let mut previous = 0;

        for &cumulative in line {
            if cumulative < previous {
                return Err(Error::new(ErrorKind::InvalidSampleData, "sample counts are not increasing"));
            }

            previous = cumulative;
        }
    }

    Ok(())
}

fn default_convert_and_unpack(pipeline: &mut DecodePipeline<'_, '_>) -> UnitResult {
    if pipeline.deep {
        // the payload of a deep chunk stays in the pipeline buffer,
        // addressed through the sample count table
        return Ok(());
    }

    let bounds = pipeline.chunk.bounds;

    if pipeline.unpacked.len() != pipeline.chunk.unpacked_size {
        return Err(Error::new(ErrorKind::DecompressionFailed, "decompressed data has unexpected length"));
    }

    // fill the buffers of channels that are absent from the file
    for request in pipeline.requested.iter_mut() {
        if let TargetContents::Fill(value) = request.contents {
            let target = &mut request.target;
            let sample = Sample::fill_value(value, target.sample_type);
            let bytes_per_sample = target.sample_type.bytes_per_sample();

            let mut sample_bytes = [0_u8; 4];
            sample.write_native_bytes(&mut sample_bytes);

            for row in 0 .. bounds.size.height() {
                for x in 0 .. bounds.size.width() {
                    let offset = row * target.row_stride + x * target.pixel_stride;
                    target.pixels[offset .. offset + bytes_per_sample]
                        .copy_from_slice(&sample_bytes[.. bytes_per_sample]);
                }
            }
        }
    }

    // scatter the line-interleaved pixels into the requested buffers,
    // skipping over the channels nobody asked for
    let mut rows_unpacked = vec![0_usize; pipeline.channels.list.len()];
    let mut position = 0;

    for y in bounds.position.y() .. bounds.end().y() {
        for (channel_index, channel) in pipeline.channels.list.iter().enumerate() {
            if mod_p(y, usize_to_i32(channel.sampling.y())) != 0 { continue; }

            let samples = channel.subsampled_line_samples(bounds.size.width());
            let bytes_per_sample = channel.sample_type.bytes_per_sample();
            let line_bytes = samples * bytes_per_sample;

            let row = rows_unpacked[channel_index];
            rows_unpacked[channel_index] = row + 1;

            let line = &pipeline.unpacked[position .. position + line_bytes];
            position += line_bytes;

            for request in pipeline.requested.iter_mut() {
                let target = match request.contents {
                    TargetContents::FileChannel(index) if index == channel_index => &mut request.target,
                    _ => continue,
                };

                let target_bytes_per_sample = target.sample_type.bytes_per_sample();
                let mut sample_bytes = [0_u8; 4];

                for x in 0 .. samples {
                    let sample = Sample::from_native_bytes(
                        &line[x * bytes_per_sample ..],
                        channel.sample_type,
                    ).convert_to(target.sample_type);

                    sample.write_native_bytes(&mut sample_bytes);

                    let offset = row * target.row_stride + x * target.pixel_stride;
                    target.pixels[offset .. offset + target_bytes_per_sample]
                        .copy_from_slice(&sample_bytes[.. target_bytes_per_sample]);
                }
            }
        }
    }

    debug_assert_eq!(position, pipeline.unpacked.len(), "unpacked buffer walk mismatch bug");
    Ok(())
}
