
//! Locate and describe the chunks of a part,
//! and read and write the chunk leader records of the file.
//! Does not include compression and decompression.

use crate::compression::compress_max_buffer_size;
use crate::error::*;
use crate::io::*;
use crate::math::Vec2;
use crate::meta::attribute::{IntegerBounds, LevelMode};
use crate::meta::header::{Header, Storage};
use crate::meta::{calculate_chunk_size, compute_chunk_size, compute_level_size, mip_map_levels, rip_map_levels};


/// Addresses one chunk within one part,
/// either by scan line position or by tile coordinates.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ChunkLocator {

    /// The first scan line of the chunk,
    /// in absolute pixel space coordinates.
    ScanLine {

        /// The pixel space y coordinate of the top scan line in the chunk.
        y: i32,
    },

    /// The tile coordinates of the chunk.
    Tile {

        /// Index of the tile within the level, not a pixel position.
        tile: Vec2<usize>,

        /// Index of the Mip/Rip level.
        level: Vec2<usize>,
    },
}

/// The byte counts of one chunk payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChunkSizes {

    /// A flat chunk carries a single payload of compressed pixels.
    Flat {

        /// The number of compressed bytes in the file.
        packed_size: usize,
    },

    /// A deep chunk carries a compressed sample count table
    /// and a compressed sample payload.
    Deep {

        /// The number of compressed bytes of the sample count table.
        packed_sample_table_size: usize,

        /// The number of compressed bytes of the sample payload.
        packed_size: usize,

        /// The number of bytes the sample payload decompresses to.
        unpacked_size: usize,
    },
}

/// The leader record written in front of every chunk payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ChunkLeader {

    /// The part this chunk belongs to.
    /// Only present in the file for multi-part files.
    pub part_number: usize,

    /// The position of this chunk within its part.
    pub locator: ChunkLocator,

    /// The byte counts of the payload following this leader.
    pub sizes: ChunkSizes,
}

/// Fully describes one chunk of one part:
/// its logical index in the chunk offset table, its pixel rectangle,
/// and the byte count of its uncompressed pixel data.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ChunkInfo {

    /// The position of this chunk in the chunk offset table of the part.
    pub index: usize,

    /// The position of this chunk within its part.
    pub locator: ChunkLocator,

    /// The absolute pixel rectangle this chunk covers.
    pub bounds: IntegerBounds,

    /// The number of bytes of the uncompressed pixel data of this chunk,
    /// respecting channel subsampling. For deep chunks, this value
    /// describes only a full chunk worth of sample count table entries.
    pub unpacked_size: usize,

    /// The byte count of the uncompressed deep sample count table.
    /// Zero for flat chunks.
    pub sample_count_table_size: usize,
}


impl ChunkSizes {

    /// The number of compressed pixel bytes in the file.
    pub fn packed_size(self) -> usize {
        match self {
            ChunkSizes::Flat { packed_size } => packed_size,
            ChunkSizes::Deep { packed_size, .. } => packed_size,
        }
    }
}


impl ChunkLocator {

    /// Without validation, write this locator to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        match self {
            ChunkLocator::ScanLine { y } => y.write(write),

            ChunkLocator::Tile { tile, level } => {
                usize_to_i32(tile.x()).write(write)?;
                usize_to_i32(tile.y()).write(write)?;
                usize_to_i32(level.x()).write(write)?;
                usize_to_i32(level.y()).write(write)
            },
        }
    }

    /// Read a locator of the specified storage kind without validating.
    pub fn read(read: &mut impl Read, storage: Storage) -> Result<Self> {
        if storage.is_tiled() {
            let tile_x = i32::read(read)?;
            let tile_y = i32::read(read)?;
            let level_x = i32::read(read)?;
            let level_y = i32::read(read)?;

            if level_x > 31 || level_y > 31 {
                // there can be at most 31 levels, because the largest level
                // would have a size of 2^31, which exceeds the maximum 32-bit integer value
                return Err(Error::new(ErrorKind::BadChunkLeader, "level index exceeding integer maximum"));
            }

            Ok(ChunkLocator::Tile {
                tile: Vec2(tile_x, tile_y).to_usize("tile coordinate index")?,
                level: Vec2(level_x, level_y).to_usize("tile coordinate level")?,
            })
        }
        else {
            Ok(ChunkLocator::ScanLine { y: i32::read(read)? })
        }
    }

    /// Returns if this is the original resolution or a smaller copy.
    pub fn is_largest_resolution_level(self) -> bool {
        match self {
            ChunkLocator::ScanLine { .. } => true,
            ChunkLocator::Tile { level, .. } => level == Vec2(0, 0),
        }
    }
}


fn read_u64_size(read: &mut impl Read) -> Result<usize> {
    let value = u64::read(read)?;

    if value > i64::MAX as u64 {
        return Err(Error::new(ErrorKind::BadChunkLeader, "chunk size out of range"));
    }

    Ok(u64_to_usize(value))
}

impl ChunkLeader {

    /// Without validation, write this leader to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W, is_multipart: bool) -> UnitResult {
        if is_multipart {
            usize_to_i32(self.part_number).write(write)?;
        }
        else {
            debug_assert_eq!(self.part_number, 0, "invalid part number bug");
        }

        self.locator.write(write)?;

        match self.sizes {
            ChunkSizes::Flat { packed_size } => {
                usize_to_i32(packed_size).write(write)?;
            },

            ChunkSizes::Deep { packed_sample_table_size, packed_size, unpacked_size } => {
                usize_to_u64(packed_sample_table_size).write(write)?;
                usize_to_u64(packed_size).write(write)?;
                usize_to_u64(unpacked_size).write(write)?;
            },
        }

        Ok(())
    }

    /// Read the leader of the next chunk. The headers determine
    /// whether a part number is present and how the chunk is addressed.
    pub fn read(read: &mut impl Read, is_multipart: bool, headers: &[Header]) -> Result<Self> {
        let part_number = {
            if is_multipart { i32_to_usize(i32::read(read)?, "chunk part number")? }
            else { 0_usize }
        };

        let header = headers.get(part_number)
            .ok_or_else(|| Error::new(ErrorKind::BadChunkLeader, "chunk part number out of range"))?;

        let storage = header.storage()?;
        let locator = ChunkLocator::read(read, storage)?;

        let max_packed = compress_max_buffer_size(max_chunk_unpacked_size(header)?);

        let sizes = if storage.is_deep() {
            let packed_sample_table_size = read_u64_size(read)?;
            let packed_size = read_u64_size(read)?;
            let unpacked_size = read_u64_size(read)?;

            // deep payloads are not bounded by the flat chunk size,
            // the caller additionally checks them against the file size
            if packed_sample_table_size > compress_max_buffer_size(max_chunk_sample_table_size(header)?) {
                return Err(Error::new(ErrorKind::BadChunkLeader, "deep chunk sizes out of range"));
            }

            ChunkSizes::Deep { packed_sample_table_size, packed_size, unpacked_size }
        }
        else {
            let packed_size = i32_to_usize(i32::read(read)?, "chunk packed size")?;

            if packed_size > max_packed {
                return Err(Error::new(ErrorKind::BadChunkLeader, "chunk packed size out of range"));
            }

            ChunkSizes::Flat { packed_size }
        };

        Ok(ChunkLeader { part_number, locator, sizes })
    }

    /// The byte count of this leader in the file.
    pub fn byte_size(&self, is_multipart: bool) -> usize {
        let part = if is_multipart { i32::BYTE_SIZE } else { 0 };

        let locator = match self.locator {
            ChunkLocator::ScanLine { .. } => i32::BYTE_SIZE,
            ChunkLocator::Tile { .. } => 4 * i32::BYTE_SIZE,
        };

        let sizes = match self.sizes {
            ChunkSizes::Flat { .. } => i32::BYTE_SIZE,
            ChunkSizes::Deep { .. } => 3 * u64::BYTE_SIZE,
        };

        part + locator + sizes
    }
}


/// The resolutions of all levels of a part, in the file order of the offset table.
/// A part without tiles has a single full-resolution level.
pub fn level_sizes(header: &Header) -> Result<Vec<(Vec2<usize>, Vec2<usize>)>> {
    let data_size = header.data_window()?.size;

    if header.storage()?.is_tiled() {
        let tiles = header.tiles()?;

        Ok(match tiles.level_mode {
            LevelMode::Singular => vec![ (Vec2(0, 0), data_size) ],

            LevelMode::MipMap => mip_map_levels(tiles.rounding_mode, data_size)
                .map(|(level, size)| (Vec2(level, level), size))
                .collect(),

            LevelMode::RipMap => rip_map_levels(tiles.rounding_mode, data_size).collect(),
        })
    }
    else {
        Ok(vec![ (Vec2(0, 0), data_size) ])
    }
}

/// The pixel resolution of the specified level of this part.
pub fn level_size(header: &Header, level: Vec2<usize>) -> Result<Vec2<usize>> {
    let data_size = header.data_window()?.size;

    if !header.storage()?.is_tiled() {
        if level != Vec2(0, 0) {
            return Err(Error::new(ErrorKind::IncorrectChunk, "level index out of range"));
        }

        return Ok(data_size);
    }

    let tiles = header.tiles()?;
    let round = tiles.rounding_mode;

    let level_count_x = crate::meta::compute_level_count(round, data_size.width());
    let level_count_y = crate::meta::compute_level_count(round, data_size.height());

    let valid = match tiles.level_mode {
        LevelMode::Singular => level == Vec2(0, 0),
        LevelMode::MipMap => level.x() == level.y() && level.x() < level_count_x.max(level_count_y),
        LevelMode::RipMap => level.x() < level_count_x && level.y() < level_count_y,
    };

    if !valid {
        return Err(Error::new(ErrorKind::IncorrectChunk, "level index out of range"));
    }

    Ok(Vec2(
        compute_level_size(round, data_size.width(), level.x()),
        compute_level_size(round, data_size.height(), level.y()),
    ))
}

/// The number of bytes the sample count table of the tallest
/// chunk of a deep part consumes when uncompressed.
pub fn max_chunk_sample_table_size(header: &Header) -> Result<usize> {
    let data_window = header.data_window()?;

    let height = match header.storage()? {
        Storage::DeepTile => header.tiles()?.tile_size.height(),
        _ => header.compression()?.scan_lines_per_chunk(),
    };

    Ok(data_window.size.width() * height.min(data_window.size.height()) * i32::BYTE_SIZE)
}

/// The number of bytes that the widest chunk of this part
/// consumes when uncompressed.
pub fn max_chunk_unpacked_size(header: &Header) -> Result<usize> {
    let data_window = header.data_window()?;
    let channels = header.channels()?;

    let chunk_size = match header.storage()? {
        Storage::Tile | Storage::DeepTile => {
            let tiles = header.tiles()?;
            Vec2(
                tiles.tile_size.width().min(data_window.size.width()),
                tiles.tile_size.height().min(data_window.size.height()),
            )
        },

        Storage::ScanLine | Storage::DeepScanLine => Vec2(
            data_window.size.width(),
            header.compression()?.scan_lines_per_chunk().min(data_window.size.height()),
        ),
    };

    // ignore subsampling, producing a possibly larger but never smaller estimate
    Ok(chunk_size.area() * channels.bytes_per_pixel)
}

/// The number of bytes of the uncompressed pixel data of a chunk
/// with the specified absolute pixel rectangle, respecting channel subsampling.
pub fn chunk_unpacked_size(header: &Header, bounds: IntegerBounds) -> Result<usize> {
    let channels = header.channels()?;

    let mut byte_count = 0;
    for y in bounds.position.y() .. bounds.end().y() {
        byte_count += channels.bytes_per_line(y, bounds.size.width());
    }

    Ok(byte_count)
}


/// Describe the scan line chunk that starts at the specified
/// absolute y coordinate. The coordinate must be aligned to the
/// chunk height of the compression method.
pub fn scan_line_chunk_info(header: &Header, y: i32) -> Result<ChunkInfo> {
    let storage = header.storage()?;
    if storage.is_tiled() {
        return Err(Error::new(ErrorKind::ScanTileMixedApi, "part does not store scan line chunks"));
    }

    let data_window = header.data_window()?;
    let lines_per_chunk = header.compression()?.scan_lines_per_chunk();

    if y < data_window.position.y() || y >= data_window.end().y() {
        return Err(Error::new(ErrorKind::IncorrectChunk, "scan line position outside data window"));
    }

    let relative_y = i32_to_usize(y - data_window.position.y(), "chunk y position")?;

    if relative_y % lines_per_chunk != 0 {
        return Err(Error::new(ErrorKind::IncorrectChunk, "scan line position not aligned to chunk height"));
    }

    let index = relative_y / lines_per_chunk;
    let height = calculate_chunk_size(data_window.size.height(), lines_per_chunk, relative_y)?;

    let bounds = IntegerBounds::new(
        Vec2(data_window.position.x(), y),
        Vec2(data_window.size.width(), height),
    );

    Ok(ChunkInfo {
        index,
        locator: ChunkLocator::ScanLine { y },
        bounds,
        unpacked_size: chunk_unpacked_size(header, bounds)?,
        sample_count_table_size: if storage.is_deep() { bounds.size.area() * i32::BYTE_SIZE } else { 0 },
    })
}

/// Describe the tile chunk at the specified tile and level coordinates.
pub fn tile_chunk_info(header: &Header, tile: Vec2<usize>, level: Vec2<usize>) -> Result<ChunkInfo> {
    let storage = header.storage()?;
    if !storage.is_tiled() {
        return Err(Error::new(ErrorKind::TileScanMixedApi, "part does not store tile chunks"));
    }

    let data_window = header.data_window()?;
    let tiles = header.tiles()?;
    let level_resolution = level_size(header, level)?;

    let tile_count_x = compute_chunk_size(level_resolution.width(), tiles.tile_size.width());
    let tile_count_y = compute_chunk_size(level_resolution.height(), tiles.tile_size.height());

    if tile.x() >= tile_count_x || tile.y() >= tile_count_y {
        return Err(Error::new(ErrorKind::IncorrectChunk, "tile index out of range"));
    }

    // linear chunk index: all tiles of the preceding levels, then row-major within this level
    let mut index = 0;
    for (preceding_level, preceding_size) in level_sizes(header)? {
        if preceding_level == level { break; }

        index += compute_chunk_size(preceding_size.width(), tiles.tile_size.width())
            * compute_chunk_size(preceding_size.height(), tiles.tile_size.height());
    }

    index += tile.y() * tile_count_x + tile.x();

    let position = Vec2(
        tile.x() * tiles.tile_size.width(),
        tile.y() * tiles.tile_size.height(),
    );

    let size = Vec2(
        calculate_chunk_size(level_resolution.width(), tiles.tile_size.width(), position.x())?,
        calculate_chunk_size(level_resolution.height(), tiles.tile_size.height(), position.y())?,
    );

    let bounds = IntegerBounds::new(position.to_i32(), size)
        .with_origin(data_window.position);

    Ok(ChunkInfo {
        index,
        locator: ChunkLocator::Tile { tile, level },
        bounds,
        unpacked_size: chunk_unpacked_size(header, bounds)?,
        sample_count_table_size: if storage.is_deep() { bounds.size.area() * i32::BYTE_SIZE } else { 0 },
    })
}

/// Describe the chunk identified by the specified locator.
pub fn chunk_info(header: &Header, locator: ChunkLocator) -> Result<ChunkInfo> {
    match locator {
        ChunkLocator::ScanLine { y } => scan_line_chunk_info(header, y),
        ChunkLocator::Tile { tile, level } => tile_chunk_info(header, tile, level),
    }
}

/// Describe the chunk at the specified position in the chunk offset table.
pub fn chunk_info_by_index(header: &Header, index: usize) -> Result<ChunkInfo> {
    if header.storage()?.is_tiled() {
        let tiles = header.tiles()?;
        let mut remaining = index;

        for (level, level_resolution) in level_sizes(header)? {
            let tile_count_x = compute_chunk_size(level_resolution.width(), tiles.tile_size.width());
            let tile_count_y = compute_chunk_size(level_resolution.height(), tiles.tile_size.height());
            let level_chunks = tile_count_x * tile_count_y;

            if remaining < level_chunks {
                let tile = Vec2(remaining % tile_count_x, remaining / tile_count_x);
                return tile_chunk_info(header, tile, level);
            }

            remaining -= level_chunks;
        }

        Err(Error::new(ErrorKind::IncorrectChunk, "chunk index out of range"))
    }
    else {
        let data_window = header.data_window()?;
        let lines_per_chunk = header.compression()?.scan_lines_per_chunk();

        if index >= compute_chunk_size(data_window.size.height(), lines_per_chunk) {
            return Err(Error::new(ErrorKind::IncorrectChunk, "chunk index out of range"));
        }

        let y = data_window.position.y() + usize_to_i32(index * lines_per_chunk);
        scan_line_chunk_info(header, y)
    }
}
