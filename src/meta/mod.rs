
//! Describes all meta data possible in an exr file.

pub mod attribute;
pub mod header;

use bit_field::BitField;
use smallvec::SmallVec;

use crate::error::*;
use crate::io::*;
use crate::math::*;
use crate::meta::attribute::{TileDescription, LevelMode};
use crate::meta::header::{Header, Headers};
use crate::compression::Compression;


/// Contains the complete meta data of an exr file.
/// Defines how the image is split up in the file,
/// the number and type of parts and channels,
/// and various other attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {

    /// Some flags summarizing the features that must be supported to decode the file.
    pub requirements: Requirements,

    /// One header to describe each part in this file.
    pub headers: Headers,
}


/// List of chunk offset tables, one per part.
pub type OffsetTables = SmallVec<[OffsetTable; 3]>;

/// The offset table is an ordered list of indices referencing pixel data in the exr file.
/// For each chunk in the part, an index exists, which points to the byte-location
/// of the corresponding pixel data in the file. That index can be used to load specific
/// portions of an image without processing all bytes in a file.
/// The indices are ordered by the logical chunk position, not the physical file order.
/// An entry of zero marks a chunk that has not been written or could not be located.
pub type OffsetTable = Vec<u64>;


/// A summary of requirements that must be met to read this exr file.
/// Used to determine whether this file can be read by a given reader.
/// It includes the OpenEXR version number. This library aims to support version `2.0`.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Requirements {

    /// This library supports reading version 1 and 2, and writing version 2.
    file_format_version: u8,

    /// If true, this image has tiled chunks and contains only a single part.
    /// If false and not deep and not multipart, this image is a single part image with scan line chunks.
    is_single_part_and_tiled: bool,

    /// Whether this file has strings with a length greater than 31.
    /// Strings can never be longer than 255.
    has_long_names: bool,

    /// This image contains at least one part with deep data.
    has_deep_data: bool,

    /// Whether this file contains multiple parts.
    is_multipart: bool,
}


/// The first four bytes of each exr file.
/// Used to abort reading non-exr files.
pub mod magic_number {
    use super::*;

    /// The first four bytes of each exr file.
    /// This is the four-byte sequence of the magic value `0x01312F76`.
    pub const BYTES: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

    /// Without validation, write this instance to the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, &self::BYTES)
    }

    /// Consumes four bytes from the reader and returns whether the file may be an exr file.
    pub fn is_exr(read: &mut impl Read) -> Result<bool> {
        let mut magic_num = [0; 4];
        u8::read_slice(read, &mut magic_num)?;
        Ok(magic_num == self::BYTES)
    }

    /// Validate this image. If it is an exr file, return `Ok(())`.
    pub fn validate_exr(read: &mut impl Read) -> UnitResult {
        if self::is_exr(read)? {
            Ok(())
        }
        else {
            Err(Error::new(ErrorKind::FileBadHeader, "file identifier missing"))
        }
    }
}


impl Requirements {

    /// Create requirements for a single-part scan line file of version 2.
    pub fn new(version: u8) -> Self {
        Requirements {
            file_format_version: version,
            is_single_part_and_tiled: false,
            has_long_names: false,
            has_deep_data: false,
            is_multipart: false,
        }
    }

    /// Infer the requirement flags from the part headers.
    pub fn infer(headers: &[Header]) -> Result<Self> {
        let is_multipart = headers.len() > 1;

        let mut has_deep_data = false;
        let mut has_long_names = false;
        let mut is_single_part_and_tiled = false;

        for header in headers {
            let storage = header.storage()?;
            if storage.is_deep() { has_deep_data = true; }
            if !is_multipart && storage.is_tiled() { is_single_part_and_tiled = true; }

            for attribute in header.iter() {
                if attribute.name.len() > 31 {
                    has_long_names = true;
                }
            }
        }

        Ok(Requirements {
            file_format_version: 2,
            is_single_part_and_tiled,
            has_long_names, has_deep_data, is_multipart,
        })
    }

    /// The file format version of this file, currently `1` or `2`.
    pub fn version(self) -> u8 {
        self.file_format_version
    }

    /// Is this file a multipart file?
    pub fn is_multipart(self) -> bool {
        self.is_multipart
    }

    /// Does this file contain deep data in at least one part?
    pub fn has_deep_data(self) -> bool {
        self.has_deep_data
    }

    /// Is this file a single part file with tiled chunks?
    pub fn is_single_part_and_tiled(self) -> bool {
        self.is_single_part_and_tiled
    }

    /// May attribute names and channel names of this file be longer than 31 bytes?
    pub fn has_long_names(self) -> bool {
        self.has_long_names
    }

    /// Allow or disallow names longer than 31 bytes in this file.
    pub fn set_long_names(&mut self, support: bool) {
        self.has_long_names = support;
    }

    /// The maximum byte size any single attribute value may declare.
    pub fn max_attribute_size(self) -> usize {
        i32::MAX as usize
    }

    /// Roundtrip the requirements as the `u32` version word of the file.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        let mut version_and_flags = self.file_format_version as u32;

        // the first byte is zero, the flags are stored in the upper 24 bits
        version_and_flags.set_bit(9, self.is_single_part_and_tiled);
        version_and_flags.set_bit(10, self.has_long_names);
        version_and_flags.set_bit(11, self.has_deep_data);
        version_and_flags.set_bit(12, self.is_multipart);

        version_and_flags.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let version_and_flags = u32::read(read)?;

        // take the 8 least significant bits, they contain the file format version number
        let version = (version_and_flags & 0x00FF) as u8;

        // the 24 most significant bits are treated as a set of boolean flags
        let is_single_part_and_tiled = version_and_flags.get_bit(9);
        let has_long_names = version_and_flags.get_bit(10);
        let has_deep_data = version_and_flags.get_bit(11);
        let is_multipart = version_and_flags.get_bit(12);

        // all remaining bits except 9, 10, 11 and 12 are reserved and should be 0
        if version_and_flags >> 13 != 0 {
            return Err(Error::new(ErrorKind::FileBadHeader, "reserved version flags are set"));
        }

        let requirements = Requirements {
            file_format_version: version,
            is_single_part_and_tiled, has_long_names,
            has_deep_data, is_multipart,
        };

        requirements.validate()?;
        Ok(requirements)
    }

    /// Validate this instance.
    pub fn validate(&self) -> UnitResult {
        if self.file_format_version == 0 || self.file_format_version > 2 {
            return Err(Error::new(ErrorKind::FileBadHeader, "unsupported file format version"));
        }

        if self.file_format_version == 1 && (self.is_multipart || self.has_deep_data) {
            return Err(Error::new(ErrorKind::FileBadHeader, "multipart and deep data require file format version 2"));
        }

        if self.is_multipart && self.is_single_part_and_tiled {
            return Err(Error::new(ErrorKind::FileBadHeader, "single-part-tiled flag is set in a multipart file"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for Requirements {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Requirements")
            .field("version", &self.file_format_version)
            .field("single_part_and_tiled", &self.is_single_part_and_tiled)
            .field("long_names", &self.has_long_names)
            .field("deep_data", &self.has_deep_data)
            .field("multipart", &self.is_multipart)
            .finish()
    }
}

impl Default for Requirements {
    fn default() -> Self {
        Requirements::new(2)
    }
}


/// Compute the number of chunks required to contain all values.
pub fn compute_chunk_size(full_res: usize, chunk_size: usize) -> usize {
    // round up, because if the image is not evenly divisible by the chunks,
    // we add another chunk at the end (which is only partially used)
    RoundingMode::Up.divide(full_res, chunk_size)
}

/// Calculate the position and pixel size of a chunk inside one dimension.
/// If this is the last chunk in that dimension, the size is
/// smaller than the default chunk size.
#[inline]
pub fn calculate_chunk_position_and_size(total_size: usize, chunk_size: usize, chunk_index: usize) -> Result<(usize, usize)> {
    let chunk_position = chunk_size * chunk_index;

    Ok((
        chunk_position,
        calculate_chunk_size(total_size, chunk_size, chunk_position)?
    ))
}

/// Calculate the pixel size of a single chunk at the specified position.
#[inline]
pub fn calculate_chunk_size(total_size: usize, chunk_size: usize, chunk_position: usize) -> Result<usize> {
    if chunk_position >= total_size {
        return Err(Error::new(ErrorKind::IncorrectChunk, "chunk index out of bounds"));
    }

    if chunk_position + chunk_size <= total_size {
        Ok(chunk_size)
    }
    else {
        Ok(total_size - chunk_position)
    }
}


/// Calculate the number of mip levels in a given resolution.
pub fn compute_level_count(round: RoundingMode, full_res: usize) -> usize {
    u32_to_usize(round.log2(full_res as u32)) + 1
}

/// Calculate the size of a single mip level by index.
pub fn compute_level_size(round: RoundingMode, full_res: usize, level_index: usize) -> usize {
    assert!(level_index < std::mem::size_of::<usize>() * 8, "level index exceeds integer maximum");
    round.divide(full_res, 1 << level_index).max(1)
}

/// Iterates over all rip map level resolutions of a given size, including the indices of each level.
pub fn rip_map_levels(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item = (Vec2<usize>, Vec2<usize>)> {
    rip_map_indices(round, max_resolution).map(move |level_indices| {
        let width = compute_level_size(round, max_resolution.width(), level_indices.x());
        let height = compute_level_size(round, max_resolution.height(), level_indices.y());
        (level_indices, Vec2(width, height))
    })
}

/// Iterates over all mip map level resolutions of a given size, including the indices of each level.
pub fn mip_map_levels(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item = (usize, Vec2<usize>)> {
    mip_map_indices(round, max_resolution)
        .map(move |level_index|{
            let width = compute_level_size(round, max_resolution.width(), level_index);
            let height = compute_level_size(round, max_resolution.height(), level_index);
            (level_index, Vec2(width, height))
        })
}

/// Iterates over all rip map level indices of a given size.
pub fn rip_map_indices(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item = Vec2<usize>> {
    let (width, height) = (
        compute_level_count(round, max_resolution.width()),
        compute_level_count(round, max_resolution.height())
    );

    (0..height).flat_map(move |y_level| {
        (0..width).map(move |x_level| {
            Vec2(x_level, y_level)
        })
    })
}

/// Iterates over all mip map level indices of a given size.
pub fn mip_map_indices(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item = usize> {
    0..compute_level_count(round, max_resolution.width().max(max_resolution.height()))
}

/// Compute the number of chunks that a part is divided into.
// If not multipart and chunkCount not present,
// the number of entries in the chunk table is computed
// using the dataWindow and tileDesc attributes and the compression format
pub fn compute_chunk_count(compression: Compression, data_size: Vec2<usize>, tiles: Option<TileDescription>) -> Result<usize> {

    if let Some(tiles) = tiles {
        let round = tiles.rounding_mode;
        let Vec2(tile_width, tile_height) = tiles.tile_size;

        if tile_width == 0 || tile_height == 0 {
            return Err(Error::new(ErrorKind::InvalidAttr, "zero tile size"));
        }

        Ok(match tiles.level_mode {
            LevelMode::Singular => {
                let tiles_x = compute_chunk_size(data_size.width(), tile_width);
                let tiles_y = compute_chunk_size(data_size.height(), tile_height);
                tiles_x * tiles_y
            },

            LevelMode::MipMap => {
                mip_map_levels(round, data_size).map(|(_, Vec2(level_width, level_height))| {
                    compute_chunk_size(level_width, tile_width) * compute_chunk_size(level_height, tile_height)
                }).sum()
            },

            LevelMode::RipMap => {
                rip_map_levels(round, data_size).map(|(_, Vec2(level_width, level_height))| {
                    compute_chunk_size(level_width, tile_width) * compute_chunk_size(level_height, tile_height)
                }).sum()
            },
        })
    }

    // scan line chunks cannot have mip maps
    else {
        Ok(compute_chunk_size(data_size.height(), compression.scan_lines_per_chunk()))
    }
}


impl MetaData {

    /// Infers version requirements from headers.
    pub fn new(headers: Headers) -> Result<Self> {
        Ok(MetaData {
            requirements: Requirements::infer(headers.as_slice())?,
            headers,
        })
    }

    /// Read the exr meta data from a reader.
    /// Consumes the magic number, the version word, and all headers.
    pub fn read_from_buffered_peekable(read: &mut PeekRead<impl Read>, strict: bool) -> Result<Self> {
        magic_number::validate_exr(read)?;

        let requirements = Requirements::read(read)?;
        let headers = Header::read_all(read, &requirements, strict)?;

        let meta = MetaData { requirements, headers };
        meta.validate(None, strict)?;

        Ok(meta)
    }

    /// Validates the meta data and writes it to the stream.
    pub fn write_validating_to_buffered(&self, write: &mut impl Write, strict: bool) -> UnitResult {
        self.validate(None, strict)?;

        magic_number::write(write)?;
        self.requirements.write(write)?;
        Header::write_all(self.headers.as_slice(), write, self.requirements.is_multipart())?;
        Ok(())
    }

    /// Read one offset table from the reader for each header.
    pub fn read_offset_tables(read: &mut PeekRead<impl Read>, headers: &Headers) -> Result<OffsetTables> {
        headers.iter()
            .map(|header| {
                let chunk_count = header.chunk_count()?;
                u64::read_vec(read, chunk_count, u16::MAX as usize, None, "chunk offset table size")
            })
            .collect()
    }

    /// The number of bytes all chunk offset tables of these headers consume in the file.
    pub fn offset_tables_byte_size(headers: &Headers) -> Result<usize> {
        let chunk_count: usize = headers.iter()
            .map(Header::chunk_count)
            .sum::<Result<usize>>()?;

        Ok(chunk_count * u64::BYTE_SIZE)
    }

    /// Validates this meta data. Always validates the part structure,
    /// additionally validates conventions when strict.
    pub fn validate(&self, max_image_size: Option<Vec2<usize>>, strict: bool) -> UnitResult {
        self.requirements.validate()?;

        if self.headers.is_empty() {
            return Err(Error::new(ErrorKind::FileBadHeader, "at least one part is required"));
        }

        if self.headers.len() > 1 && !self.requirements.is_multipart() {
            return Err(Error::new(ErrorKind::FileBadHeader, "multipart flag is not set but multiple headers exist"));
        }

        for header in &self.headers {
            header.validate(&self.requirements, max_image_size, strict)?;
        }

        if strict {
            // all parts of a multi-part file must have distinct names
            let mut names: Vec<&[u8]> = self.headers.iter()
                .flat_map(|header| header.name().ok())
                .map(|name| name.as_slice())
                .collect();

            names.sort_unstable();
            let count_before_dedup = names.len();
            names.dedup();

            if names.len() != count_before_dedup {
                return Err(Error::invalid("part names are not unique"));
            }
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_word_roundtrip(){
        let mut requirements = Requirements::new(2);
        requirements.set_long_names(true);

        let mut bytes = Vec::new();
        requirements.write(&mut bytes).unwrap();

        // the version number in the lowest byte, the long name flag in bit 10
        assert_eq!(bytes, [0x00, 0x00, 0x04, 0x02]);

        let read_back = Requirements::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(read_back, requirements);
    }

    #[test]
    fn version_word_rejects_unknown_flags(){
        // bit 13 is reserved
        let bytes = [0x00, 0x00, 0x20, 0x02];
        assert!(Requirements::read(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn level_sizes(){
        let round_down = RoundingMode::Down;
        let round_up = RoundingMode::Up;

        assert_eq!(compute_level_count(round_down, 64), 7);
        assert_eq!(compute_level_count(round_down, 100), 7);
        assert_eq!(compute_level_count(round_up, 100), 8);

        assert_eq!(compute_level_size(round_down, 100, 1), 50);
        assert_eq!(compute_level_size(round_down, 101, 1), 50);
        assert_eq!(compute_level_size(round_up, 101, 1), 51);
        assert_eq!(compute_level_size(round_down, 100, 30), 1);
    }
}
