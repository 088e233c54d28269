
//! Contains the compression attribute definition
//! and methods to compress and decompress chunk data.

mod zip;
mod rle;
mod piz;
mod pxr24;
mod b44;
mod dwa;


use crate::error::*;
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};
use crate::io::{Read, Write, Data};


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];


/// Specifies which compression method to use.
/// Use uncompressed data for fastest loading and writing speeds.
/// Use RLE compression for fast loading and writing with slight memory savings.
/// Use ZIP compression for slow processing with large memory savings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    /// Consider using RLE instead, as it provides some compression with almost equivalent speed.
    Uncompressed,

    /// Produces slightly smaller files
    /// that can still be read and written rather quickly.
    /// The compressed file size is usually between 60 and 75 percent of the uncompressed size.
    /// Works best for images with large flat areas, such as masks and abstract graphics.
    /// This compression method is lossless.
    RLE,

    /// Uses ZIP compression to compress each scan line separately.
    /// This compression method is lossless.
    /// Might be slightly faster but larger than `ZIP`.
    ZIPS,

    /// Uses ZIP compression to compress blocks of 16 scan lines.
    /// This compression method is lossless.
    /// Might be slightly slower but smaller than `ZIPS`.
    ZIP,

    /// PIZ compression works well for noisy and natural images. Works better with larger tiles.
    /// Only supported for flat images, but not for deep data.
    /// This compression method is lossless.
    // A wavelet transform is applied to the pixel data, and the result is Huffman-encoded.
    // This scheme tends to provide the best compression ratio for the types of
    // images that are typically processed at Industrial Light & Magic.
    // For photographic images with film grain, the files are reduced to between
    // 35 and 55 percent of their uncompressed size.
    PIZ,

    /// Like `ZIP`, but reduces precision of `f32` images to `f24`.
    /// Therefore, this is lossless compression for `f16` and `u32` data, lossy compression for `f32` data.
    /// This produces really small image files. Only supported for flat images, not for deep data.
    // After reducing 32-bit floating-point data to 24 bits by rounding (while leaving 16-bit
    // floating-point data unchanged), differences between horizontally adjacent pixels
    // are compressed with zlib. PXR24 compression preserves image
    // channels of type HALF and UINT exactly, but the relative error of FLOAT data
    // increases to about 3 × 10^-5. This compression method works well for depth
    // buffers and similar images, where the possible range of values is very large, but
    // where full 32-bit floating-point accuracy is not necessary.
    PXR24,

    /// This lossy compression packs each 4×4 block of `f16` pixels into
    /// exactly 14 bytes. Channels of type `u32` or `f32` are stored uncompressed.
    /// The compressed file size is predictable, depending only on resolution
    /// and channel list, never on the pixel contents.
    B44,

    /// Like `B44`, but 4×4 blocks where all pixels have the same value
    /// are packed into 3 instead of 14 bytes. For images with large uniform
    /// areas, B44A produces smaller files than B44 compression.
    B44A,

    /// Lossy DCT based compression, in chunks of 32 scan lines.
    /// More efficient for partial buffer access.
    DWAA,

    /// Lossy DCT based compression, in chunks of 256 scan lines.
    /// More efficient space-wise and faster to decode full frames than `DWAA`.
    DWAB,

    /// High-Throughput JPEG 2000 compression, in chunks of 256 scan lines.
    /// Requires an external codec library which this build does not include.
    HTJ2K256,

    /// High-Throughput JPEG 2000 compression, in chunks of 32 scan lines.
    /// Requires an external codec library which this build does not include.
    HTJ2K32,
}

/// The byte order of the bytes a compressor produces when decompressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFormat {

    /// The decompressed bytes are in the big-endian wire representation.
    Xdr,

    /// The decompressed bytes are in the byte order of the host machine.
    Native,
}

/// Tuning values for the lossy and deflate-based compression methods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecOptions {

    /// The deflate effort for the zip-based compression methods, from 1 to 9.
    pub zip_compression_level: u8,

    /// The quantization base error for dwa compression.
    /// Greater values produce smaller files with lower quality.
    pub dwa_compression_level: f32,

    /// Reject any files that could confuse other exr readers,
    /// even if this library could recover from the defect.
    pub strict: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        CodecOptions {
            // found to be the better trade off of speed vs size
            zip_compression_level: 4,
            dwa_compression_level: 45.0,
            strict: false,
        }
    }
}

/// The names of all compression methods, ordered by their identifier in the file.
pub const COMPRESSION_NAMES: &[&str] = &[
    "none", "rle", "zips", "zip", "piz", "pxr24",
    "b44", "b44a", "dwaa", "dwab", "htj2k256", "htj2k32",
];


impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", self.name())
    }
}


impl Compression {

    /// The identifier of this compression method inside the file.
    pub fn id(self) -> u8 {
        use self::Compression::*;
        match self {
            Uncompressed => 0,
            RLE => 1,
            ZIPS => 2,
            ZIP => 3,
            PIZ => 4,
            PXR24 => 5,
            B44 => 6,
            B44A => 7,
            DWAA => 8,
            DWAB => 9,
            HTJ2K256 => 10,
            HTJ2K32 => 11,
        }
    }

    /// Look up the compression method with the specified file identifier.
    pub fn from_id(id: u8) -> Option<Self> {
        use self::Compression::*;
        Some(match id {
            0 => Uncompressed,
            1 => RLE,
            2 => ZIPS,
            3 => ZIP,
            4 => PIZ,
            5 => PXR24,
            6 => B44,
            7 => B44A,
            8 => DWAA,
            9 => DWAB,
            10 => HTJ2K256,
            11 => HTJ2K32,
            _ => return None,
        })
    }

    /// The lower-case name of this compression method.
    pub fn name(self) -> &'static str {
        COMPRESSION_NAMES[self.id() as usize]
    }

    /// Look up a compression method by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        COMPRESSION_NAMES.iter()
            .position(|&candidate| candidate.eq_ignore_ascii_case(name))
            .and_then(|index| Self::from_id(index as u8))
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(self, write: &mut impl Write) -> UnitResult {
        self.id().write(write)
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let id = u8::read(read)?;
        Self::from_id(id).ok_or_else(|| Error::new(ErrorKind::InvalidAttr, "compression attribute value"))
    }

    /// For scan line images and deep scan line images, one or more scan lines may be
    /// stored together as a scan line chunk. The number of scan lines per chunk
    /// depends on how the pixel data are compressed.
    pub fn scan_lines_per_chunk(self) -> usize {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIPS            => 1,
            ZIP          | PXR24                 => 16,
            PIZ | B44 | B44A | DWAA | HTJ2K32    => 32,
            DWAB | HTJ2K256                      => 256,
        }
    }

    /// Deep data can only be compressed using uncompressed, RLE or ZIPS compression.
    pub fn supports_deep_data(self) -> bool {
        use self::Compression::*;
        matches!(self, Uncompressed | RLE | ZIPS)
    }

    /// The byte order this compression method produces when decompressing.
    /// If a chunk was stored uncompressed because the compressed form was larger,
    /// its bytes are in `Xdr` order regardless of this value.
    pub fn data_format(self) -> DataFormat {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIPS | ZIP => DataFormat::Xdr,
            PIZ | PXR24 | B44 | B44A | DWAA | DWAB | HTJ2K256 | HTJ2K32 => DataFormat::Native,
        }
    }

    /// Most compression methods will reconstruct the exact pixel bytes,
    /// but some might throw away unimportant data for specific types of samples.
    pub fn is_lossless_for(self, sample_type: SampleType) -> bool {
        use self::Compression::*;
        match self {
            PXR24 => sample_type != SampleType::F32, // pxr reduces f32 to f24
            B44 | B44A => sample_type != SampleType::F16, // b44 only quantizes f16 values, others are left uncompressed
            Uncompressed | RLE | ZIPS | ZIP | PIZ => true,
            DWAA | DWAB | HTJ2K256 | HTJ2K32 => false,
        }
    }

    /// Most compression methods will reconstruct the exact pixel bytes,
    /// but some might throw away unimportant data in some cases.
    pub fn may_loose_data(self) -> bool {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIPS | ZIP | PIZ => false,
            PXR24 | B44 | B44A | DWAA | DWAB | HTJ2K256 | HTJ2K32 => true,
        }
    }

    /// Most compression methods will reconstruct the exact pixel bytes,
    /// but some might replace NaN with zeroes.
    pub fn supports_nan(self) -> bool {
        use self::Compression::*;
        !matches!(self, B44 | B44A | DWAA | DWAB)
    }


    /// Compress the pixel bytes of one chunk.
    ///
    /// The input bytes are expected in the native byte order of the machine,
    /// laid out line-interleaved as produced by the encoding pipeline.
    /// If the compressed form would be larger than the input, the input
    /// is returned in wire byte order instead, and the caller detects this
    /// by comparing the returned length with the input length.
    pub fn compress_image_section(self, channels: &ChannelList, uncompressed: ByteVec, pixel_section: IntegerBounds, options: &CodecOptions) -> Result<ByteVec> {
        if uncompressed.is_empty() {
            return Ok(uncompressed);
        }

        let mut uncompressed = uncompressed;

        // compressors that operate on wire-order bytes want their input converted first
        if self.data_format() == DataFormat::Xdr {
            convert_native_endian_to_xdr(&mut uncompressed, channels, pixel_section);
        }

        use self::Compression::*;
        let compressed = match self {
            Uncompressed => Ok(uncompressed.clone()),
            RLE => rle::compress_bytes(&uncompressed),
            ZIPS | ZIP => zip::compress_bytes(&uncompressed, options.zip_compression_level),
            PIZ => piz::compress(channels, &uncompressed, pixel_section),
            PXR24 => pxr24::compress(channels, &uncompressed, pixel_section, options.zip_compression_level),
            B44 => b44::compress(channels, &uncompressed, pixel_section, false),
            B44A => b44::compress(channels, &uncompressed, pixel_section, true),
            DWAA | DWAB => dwa::compress(channels, &uncompressed, pixel_section, options),
            HTJ2K256 | HTJ2K32 => Err(Error::unsupported("this build does not include an htj2k codec")),
        };

        let compressed = match compressed {
            Ok(compressed) => compressed,
            Err(error) if error.kind() == ErrorKind::FeatureNotImplemented => return Err(error),
            Err(error) => return Err(Error::new(ErrorKind::CompressionFailed, error.message().to_string())),
        };

        if compressed.len() < uncompressed.len() {
            // only write compressed if it actually is smaller than raw
            Ok(compressed)
        }
        else {
            // the compressed data was larger than the raw data, so the raw data is stored,
            // which is always wire-ordered on disk
            if self.data_format() == DataFormat::Native {
                convert_native_endian_to_xdr(&mut uncompressed, channels, pixel_section);
            }

            Ok(uncompressed)
        }
    }

    /// Decompress the pixel bytes of one chunk,
    /// returning them in the native byte order of the machine.
    pub fn decompress_image_section(self, channels: &ChannelList, compressed: ByteVec, pixel_section: IntegerBounds, expected_byte_size: usize, options: &CodecOptions) -> Result<ByteVec> {
        if expected_byte_size == 0 {
            return Ok(Vec::new());
        }

        if compressed.len() == expected_byte_size {
            // the compressed data was larger than the raw data, so the raw data has been written.
            // raw stored bytes are always wire-ordered, regardless of the compression format
            let mut bytes = compressed;
            convert_xdr_to_native_endian(&mut bytes, channels, pixel_section);
            return Ok(bytes);
        }

        use self::Compression::*;
        let bytes = match self {
            Uncompressed => Ok(compressed),
            RLE => rle::decompress_bytes(&compressed, expected_byte_size, options.strict),
            ZIPS | ZIP => zip::decompress_bytes(&compressed, expected_byte_size),
            PIZ => piz::decompress(channels, &compressed, pixel_section, expected_byte_size, options.strict),
            PXR24 => pxr24::decompress(channels, &compressed, pixel_section, expected_byte_size, options.strict),
            B44 | B44A => b44::decompress(channels, &compressed, pixel_section, expected_byte_size),
            DWAA | DWAB => dwa::decompress(channels, &compressed, pixel_section, expected_byte_size, options.strict),
            HTJ2K256 | HTJ2K32 => Err(Error::unsupported("this build does not include an htj2k codec")),
        };

        let mut bytes = match bytes {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::FeatureNotImplemented => return Err(error),
            Err(error) => return Err(Error::new(ErrorKind::DecompressionFailed, error.message().to_string())),
        };

        if bytes.len() != expected_byte_size {
            return Err(Error::new(ErrorKind::DecompressionFailed, "decompressed data has unexpected length"));
        }

        if self.data_format() == DataFormat::Xdr {
            convert_xdr_to_native_endian(&mut bytes, channels, pixel_section);
        }

        Ok(bytes)
    }

    /// Compress the sample count table or the sample payload of a deep chunk.
    /// Only the compression methods that support deep data are valid here.
    /// The input is stored uncompressed when compression would grow it,
    /// which the reader detects by comparing sizes.
    pub fn compress_deep_bytes(self, bytes: Bytes<'_>, options: &CodecOptions) -> Result<ByteVec> {
        if !self.supports_deep_data() {
            return Err(Error::invalid("compression method does not support deep data"));
        }

        use self::Compression::*;
        let compressed = match self {
            Uncompressed => return Ok(bytes.to_vec()),
            RLE => rle::compress_bytes(bytes)?,
            ZIPS => zip::compress_bytes(bytes, options.zip_compression_level)?,
            _ => unreachable!("deep support is checked above"),
        };

        if compressed.len() < bytes.len() { Ok(compressed) }
        else { Ok(bytes.to_vec()) }
    }

    /// Reverse [`Compression::compress_deep_bytes`].
    pub fn decompress_deep_bytes(self, compressed: Bytes<'_>, expected_byte_size: usize, options: &CodecOptions) -> Result<ByteVec> {
        if !self.supports_deep_data() {
            return Err(Error::invalid("compression method does not support deep data"));
        }

        if compressed.len() == expected_byte_size {
            return Ok(compressed.to_vec());
        }

        use self::Compression::*;
        let bytes = match self {
            Uncompressed => compressed.to_vec(),
            RLE => rle::decompress_bytes(compressed, expected_byte_size, options.strict)?,
            ZIPS => zip::decompress_bytes(compressed, expected_byte_size)?,
            _ => unreachable!("deep support is checked above"),
        };

        if bytes.len() != expected_byte_size {
            return Err(Error::new(ErrorKind::InvalidSampleData, "deep data has unexpected length"));
        }

        Ok(bytes)
    }
}


/// An upper bound for the number of bytes that compressing
/// an input of the specified length can produce with any compression method.
pub fn compress_max_buffer_size(in_bytes: usize) -> usize {
    // twice the input covers block codecs on degenerate chunk shapes,
    // the constant covers the huffman code length table and some header slack
    in_bytes.saturating_mul(2)
        .saturating_add(65536 + 8192)
}

/// Compress arbitrary bytes with deflate at the specified level.
/// This is the codec used for all zip-based compression methods.
pub fn compress_buffer(level: u8, bytes: Bytes<'_>) -> ByteVec {
    miniz_oxide::deflate::compress_to_vec_zlib(bytes, level)
}

/// Decompress deflate-compressed bytes.
/// The expected byte count protects against malicious allocation sizes.
pub fn uncompress_buffer(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let bytes = zune_inflate::DeflateDecoder::new_with_options(
        compressed,
        zune_inflate::DeflateOptions::default()
            .set_limit(expected_byte_size)
            .set_size_hint(expected_byte_size)
    ).decode_zlib();

    bytes.map_err(|_| Error::new(ErrorKind::DecompressionFailed, "deflate stream is corrupt"))
}

/// Run-length encode arbitrary bytes, without any prediction applied.
pub fn rle_compress_buffer(bytes: Bytes<'_>) -> ByteVec {
    rle::run_length_encode(bytes)
}

/// Reverse [`rle_compress_buffer`].
pub fn rle_uncompress_buffer(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    rle::run_length_decode(compressed, expected_byte_size, true)
}

/// The chunk height of the compression method with the specified file identifier.
/// Mirrors the identifier-based query of the file format, for tooling that
/// inspects files without constructing a `Compression` value.
pub fn compression_lines_per_chunk(compression_id: u8) -> Result<usize> {
    Compression::from_id(compression_id)
        .map(Compression::scan_lines_per_chunk)
        .ok_or_else(|| Error::new(ErrorKind::ArgumentOutOfRange, "unknown compression id"))
}


/// Swap the byte order of every sample in a line-interleaved pixel buffer.
/// On big-endian machines, the wire representation is the native one.
fn swap_element_bytes(bytes: &mut [u8], channels: &ChannelList, rectangle: IntegerBounds) {
    if cfg!(target_endian = "big") {
        return;
    }

    let mut position = 0;

    for y in rectangle.position.y() .. rectangle.end().y() {
        for channel in &channels.list {
            if crate::math::mod_p(y, usize_to_i32(channel.sampling.y())) != 0 { continue; }

            let sample_count = channel.subsampled_line_samples(rectangle.size.width());
            let bytes_per_sample = channel.sample_type.bytes_per_sample();
            let line_bytes = sample_count * bytes_per_sample;

            let line = &mut bytes[position .. position + line_bytes];

            if bytes_per_sample == 2 {
                for sample in line.chunks_exact_mut(2) { sample.swap(0, 1); }
            }
            else {
                debug_assert_eq!(bytes_per_sample, 4, "unexpected sample size bug");
                for sample in line.chunks_exact_mut(4) { sample.swap(0, 3); sample.swap(1, 2); }
            }

            position += line_bytes;
        }
    }

    debug_assert_eq!(position, bytes.len(), "pixel buffer size mismatch bug");
}

pub(crate) fn convert_native_endian_to_xdr(bytes: &mut [u8], channels: &ChannelList, rectangle: IntegerBounds) {
    swap_element_bytes(bytes, channels, rectangle);
}

pub(crate) fn convert_xdr_to_native_endian(bytes: &mut [u8], channels: &ChannelList, rectangle: IntegerBounds) {
    swap_element_bytes(bytes, channels, rectangle);
}


/// A collection of functions used to prepare data for compression.
/// The predictor turns flat image regions into runs of equal bytes,
/// which compress well with both run-length encoding and deflate.
mod optimize_bytes {

    /// Integrate over all differences to the previous value in order to reconstruct sample values.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        for index in 1..buffer.len() {
            buffer[index] = (buffer[index - 1] as i32 + buffer[index] as i32 - 128) as u8;
        }
    }

    /// Derive over all values in order to produce differences to the previous value.
    pub fn samples_to_differences(buffer: &mut [u8]) {
        for index in (1..buffer.len()).rev() {
            buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8;
        }
    }

    /// Interleave the bytes such that the second half of the array is every other byte.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let mut interleaved = Vec::with_capacity(separated.len());
        let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);

        let mut first = first_half.iter();
        let mut second = second_half.iter();

        while interleaved.len() < separated.len() {
            if let Some(&byte) = first.next() { interleaved.push(byte); }
            if let Some(&byte) = second.next() { interleaved.push(byte); }
        }

        separated.copy_from_slice(interleaved.as_slice())
    }

    /// Separate the bytes such that the second half contains every other byte.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let mut first_half = Vec::with_capacity((source.len() + 1) / 2);
        let mut second_half = Vec::with_capacity(source.len() / 2);

        for (index, &byte) in source.iter().enumerate() {
            if index % 2 == 0 { first_half.push(byte); }
            else { second_half.push(byte); }
        }

        let mut result = first_half;
        result.append(&mut second_half);
        source.copy_from_slice(result.as_slice());
    }


    #[cfg(test)]
    pub mod test {

        #[test]
        fn roundtrip_interleave(){
            let source = vec![ 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10 ];
            let mut modified = source.clone();

            super::separate_bytes_fragments(&mut modified);
            super::interleave_byte_blocks(&mut modified);

            assert_eq!(source, modified);
        }

        #[test]
        fn roundtrip_derive(){
            let source = vec![ 0, 1, 2, 7, 4, 5, 6, 7, 13, 9, 10 ];
            let mut modified = source.clone();

            super::samples_to_differences(&mut modified);
            super::differences_to_samples(&mut modified);

            assert_eq!(source, modified);
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compression_identifiers_and_names_roundtrip(){
        for id in 0 .. COMPRESSION_NAMES.len() as u8 {
            let compression = Compression::from_id(id).unwrap();
            assert_eq!(compression.id(), id);

            let name = compression.name();
            assert!(!name.is_empty());
            assert!(COMPRESSION_NAMES.contains(&name));

            assert_eq!(Compression::from_name(name), Some(compression));
            assert_eq!(Compression::from_name(&name.to_uppercase()), Some(compression));
        }

        assert_eq!(Compression::from_id(COMPRESSION_NAMES.len() as u8), None);
        assert_eq!(Compression::from_name("lzw"), None);
    }

    #[test]
    fn scan_lines_per_chunk_matches_file_format(){
        use self::Compression::*;

        assert_eq!(Uncompressed.scan_lines_per_chunk(), 1);
        assert_eq!(RLE.scan_lines_per_chunk(), 1);
        assert_eq!(ZIPS.scan_lines_per_chunk(), 1);
        assert_eq!(ZIP.scan_lines_per_chunk(), 16);
        assert_eq!(PXR24.scan_lines_per_chunk(), 16);
        assert_eq!(PIZ.scan_lines_per_chunk(), 32);
        assert_eq!(B44.scan_lines_per_chunk(), 32);
        assert_eq!(B44A.scan_lines_per_chunk(), 32);
        assert_eq!(DWAA.scan_lines_per_chunk(), 32);
        assert_eq!(DWAB.scan_lines_per_chunk(), 256);
        assert_eq!(HTJ2K32.scan_lines_per_chunk(), 32);
        assert_eq!(HTJ2K256.scan_lines_per_chunk(), 256);

        for id in 0 .. COMPRESSION_NAMES.len() as u8 {
            assert!(compression_lines_per_chunk(id).is_ok());
        }

        assert!(compression_lines_per_chunk(200).is_err());
    }

    #[test]
    fn deflate_stays_in_bounds(){
        let mut noise = Vec::new();
        for index in 0 .. 4096_u32 {
            noise.push((index.wrapping_mul(2654435761) >> 13) as u8);
        }

        for size in [0, 1, 100, 4096] {
            let bytes = &noise[..size];
            let compressed = compress_buffer(4, bytes);
            assert!(compressed.len() <= compress_max_buffer_size(bytes.len()));

            let decompressed = uncompress_buffer(&compressed, bytes.len()).unwrap();
            assert_eq!(decompressed, bytes);
        }
    }

    #[test]
    fn htj2k_is_declared_but_not_compiled(){
        let channels = ChannelList::new(smallvec::smallvec![
            crate::meta::attribute::ChannelDescription::new(
                crate::meta::attribute::Text::new_or_panic("R"),
                SampleType::F16, false
            ),
        ]);

        let section = IntegerBounds::from_dimensions(crate::math::Vec2(4, 4));
        let error = Compression::HTJ2K32
            .compress_image_section(&channels, vec![0; 4 * 4 * 2], section, &CodecOptions::default())
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::FeatureNotImplemented);
    }
}
