
//! Describes a single part of an exr file: an ordered bag of named attributes.
//! Provides typed accessors for the attributes that every part must carry.

use smallvec::SmallVec;

use crate::compression::Compression;
use crate::error::*;
use crate::io::*;
use crate::math::Vec2;
use crate::meta::attribute::*;
use crate::meta::{compute_chunk_count, Requirements};


/// Identifies how the pixel data of a part is laid out in the file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Storage {

    /// The part is divided into scan line chunks.
    ScanLine,

    /// The part is divided into tile chunks, possibly with resolution levels.
    Tile,

    /// The part is divided into scan line chunks with a variable sample count per pixel.
    DeepScanLine,

    /// The part is divided into tile chunks with a variable sample count per pixel.
    DeepTile,
}

impl Storage {

    /// The value of the `type` attribute corresponding to this storage kind.
    pub fn kind_name(self) -> &'static [u8] {
        match self {
            Storage::ScanLine => b"scanlineimage",
            Storage::Tile => b"tiledimage",
            Storage::DeepScanLine => b"deepscanline",
            Storage::DeepTile => b"deeptile",
        }
    }

    /// Parse the value of a `type` attribute.
    pub fn parse(text: &Text) -> Result<Self> {
        match text.as_slice() {
            b"scanlineimage" => Ok(Storage::ScanLine),
            b"tiledimage" => Ok(Storage::Tile),
            b"deepscanline" => Ok(Storage::DeepScanLine),
            b"deeptile" => Ok(Storage::DeepTile),
            _ => Err(Error::new(ErrorKind::InvalidAttr, "part type attribute value")),
        }
    }

    /// Whether this storage addresses chunks by tile coordinates.
    pub fn is_tiled(self) -> bool {
        self == Storage::Tile || self == Storage::DeepTile
    }

    /// Whether each pixel stores a variable number of samples.
    pub fn is_deep(self) -> bool {
        self == Storage::DeepScanLine || self == Storage::DeepTile
    }
}


/// Describes a single part in a file.
/// A file can have any number of parts.
/// The meta data contains one header per part.
///
/// The header owns all attributes of the part, in insertion order.
/// Attribute names are unique; inserting a value of a conflicting
/// type for an existing name is rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Header {
    attributes: Vec<Attribute>,
}

/// List of `Header`s.
pub type Headers = SmallVec<[Header; 3]>;


impl Header {

    /// Create a header with the required attributes for a flat scan line part.
    /// More attributes can be inserted afterwards.
    pub fn new_scan_line(data_window: IntegerBounds, channels: ChannelList, compression: Compression) -> Self {
        let mut header = Header::default();

        // insertion cannot fail on an empty header
        header.insert(Text::new_or_panic("channels"), AttributeValue::ChannelList(channels)).unwrap();
        header.insert(Text::new_or_panic("compression"), AttributeValue::Compression(compression)).unwrap();
        header.insert(Text::new_or_panic("dataWindow"), AttributeValue::IntegerBounds(data_window)).unwrap();
        header.insert(Text::new_or_panic("displayWindow"), AttributeValue::IntegerBounds(data_window)).unwrap();
        header.insert(Text::new_or_panic("lineOrder"), AttributeValue::LineOrder(LineOrder::IncreasingY)).unwrap();
        header.insert(Text::new_or_panic("pixelAspectRatio"), AttributeValue::F32(1.0)).unwrap();
        header.insert(Text::new_or_panic("screenWindowCenter"), AttributeValue::FloatVec2(Vec2(0.0, 0.0))).unwrap();
        header.insert(Text::new_or_panic("screenWindowWidth"), AttributeValue::F32(1.0)).unwrap();

        header
    }

    /// Create a header with the required attributes for a flat tiled part.
    /// More attributes can be inserted afterwards.
    pub fn new_tiled(data_window: IntegerBounds, channels: ChannelList, compression: Compression, tiles: TileDescription) -> Self {
        let mut header = Self::new_scan_line(data_window, channels, compression);
        header.insert(Text::new_or_panic("tiles"), AttributeValue::TileDescription(tiles)).unwrap();
        header
    }

    /// Mark this header as one part of a multi-part file,
    /// inserting the additionally required attributes.
    pub fn with_part_identification(mut self, name: Text, storage: Storage) -> Self {
        self.insert(Text::new_or_panic("name"), AttributeValue::Text(name)).unwrap();
        self.insert(Text::new_or_panic("type"), AttributeValue::Text(Text::from_slice_unchecked(storage.kind_name()))).unwrap();
        self.insert(Text::new_or_panic("version"), AttributeValue::I32(1)).unwrap();

        let chunks = self.chunk_count().expect("header misses required attributes");
        self.insert(Text::new_or_panic("chunkCount"), AttributeValue::I32(usize_to_i32(chunks))).unwrap();
        self
    }

    /// The number of attributes in this header.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether this header contains no attributes yet.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// The attribute at the specified position in insertion order.
    pub fn get_by_index(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    /// Find the attribute with the specified name.
    pub fn find(&self, name: &[u8]) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name.as_slice() == name)
    }

    /// Find the attribute with the specified name, or return `NoAttrByName`.
    pub fn get(&self, name: &[u8]) -> Result<&Attribute> {
        self.find(name).ok_or_else(|| Error::new(ErrorKind::NoAttrByName, "no attribute with that name"))
    }

    /// Insert an attribute value for the specified name.
    ///
    /// Inserting the same name with a value of the same type replaces the
    /// previous value and is considered idempotent. A value of a different
    /// type than the existing attribute is rejected without modifying the header.
    pub fn insert(&mut self, name: Text, value: AttributeValue) -> UnitResult {
        name.validate(true, None)?;

        match self.attributes.iter_mut().find(|attribute| attribute.name == name) {
            None => {
                self.attributes.push(Attribute::new(name, value));
                Ok(())
            },

            Some(existing) => {
                if existing.value.kind_name() == value.kind_name() {
                    existing.value = value;
                    Ok(())
                }
                else {
                    Err(Error::new(ErrorKind::InvalidArgument, "attribute already exists with a different type"))
                }
            }
        }
    }

    /// Remove and return the attribute with the specified name.
    pub fn remove(&mut self, name: &[u8]) -> Option<Attribute> {
        let index = self.attributes.iter().position(|attribute| attribute.name.as_slice() == name)?;
        Some(self.attributes.remove(index))
    }

    /// Mutable access for the context, which unpacks and packs
    /// opaque attributes with its registered handlers.
    pub(crate) fn attributes_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.attributes.iter_mut()
    }


    /// The channel list of this part.
    pub fn channels(&self) -> Result<&ChannelList> {
        self.required(standard_names::CHANNELS)?.to_channel_list()
    }

    /// The compression method of this part.
    pub fn compression(&self) -> Result<Compression> {
        self.required(standard_names::COMPRESSION)?.to_compression()
    }

    /// The rectangle of pixel coordinates that this part stores.
    pub fn data_window(&self) -> Result<IntegerBounds> {
        self.required(standard_names::DATA_WINDOW)?.to_integer_bounds()
    }

    /// The rectangle that should be displayed of this file.
    pub fn display_window(&self) -> Result<IntegerBounds> {
        self.required(standard_names::DISPLAY_WINDOW)?.to_integer_bounds()
    }

    /// In what order the chunks of this part appear in the file.
    pub fn line_order(&self) -> Result<LineOrder> {
        self.required(standard_names::LINE_ORDER)?.to_line_order()
    }

    /// The aspect ratio of each pixel of this part.
    pub fn pixel_aspect(&self) -> Result<f32> {
        self.required(standard_names::PIXEL_ASPECT)?.to_f32()
    }

    /// Part of the perspective projection.
    pub fn screen_window_center(&self) -> Result<Vec2<f32>> {
        self.required(standard_names::WINDOW_CENTER)?.to_float_vec2()
    }

    /// Part of the perspective projection.
    pub fn screen_window_width(&self) -> Result<f32> {
        self.required(standard_names::WINDOW_WIDTH)?.to_f32()
    }

    /// The tiling of this part. Required for tiled parts, absent otherwise.
    pub fn tiles(&self) -> Result<TileDescription> {
        self.required(standard_names::TILES)?.to_tile_description()
    }

    /// The name of this part. Required in multi-part files.
    pub fn name(&self) -> Result<&Text> {
        self.required(standard_names::NAME)?.to_text()
    }

    /// How the pixel data of this part is laid out in the file.
    /// Inferred from the `tiles` attribute if no `type` attribute exists.
    pub fn storage(&self) -> Result<Storage> {
        match self.find(standard_names::BLOCK_TYPE) {
            Some(attribute) => Storage::parse(attribute.value.to_text()?),
            None => Ok(
                if self.find(standard_names::TILES).is_some() { Storage::Tile }
                else { Storage::ScanLine }
            ),
        }
    }

    /// The deep data version of this part. Required for deep parts.
    pub fn version(&self) -> Result<i32> {
        self.required(standard_names::VERSION)?.to_i32()
    }

    /// The level of compression for lossy dwa compression, if specified.
    pub fn dwa_compression_level(&self) -> Option<f32> {
        self.find(standard_names::DWA_COMPRESSION_LEVEL)
            .and_then(|attribute| attribute.value.to_f32().ok())
    }

    /// The zip compression level for deflate-based compression, if specified.
    pub fn zip_compression_level(&self) -> Option<i32> {
        self.find(standard_names::ZIP_COMPRESSION_LEVEL)
            .and_then(|attribute| attribute.value.to_i32().ok())
    }

    /// The number of chunks of this part, including all resolution levels.
    /// Prefers the `chunkCount` attribute where present, and otherwise
    /// computes the count from data window, compression and tiling.
    pub fn chunk_count(&self) -> Result<usize> {
        if let Some(attribute) = self.find(standard_names::CHUNK_COUNT) {
            return i32_to_usize(attribute.value.to_i32()?, "chunk count attribute");
        }

        compute_chunk_count(
            self.compression()?,
            self.data_window()?.size,
            self.find(standard_names::TILES)
                .map(|tiles| tiles.value.to_tile_description())
                .transpose()?
        )
    }

    fn required(&self, name: &'static [u8]) -> Result<&AttributeValue> {
        match self.find(name) {
            Some(attribute) => Ok(&attribute.value),
            None => Err(Error::new(ErrorKind::MissingRequiredAttr, "missing required attribute")),
        }
    }


    /// Read all headers, one per part, until the end-of-headers marker.
    pub fn read_all(read: &mut PeekRead<impl Read>, requirements: &Requirements, strict: bool) -> Result<Headers> {
        if !requirements.is_multipart() {
            // a single header, without a sequence end marker
            Ok(smallvec::smallvec![ Header::read(read, requirements, strict)? ])
        }
        else {
            let mut headers = SmallVec::new();

            while !sequence_end::has_come(read)? {
                headers.push(Header::read(read, requirements, strict)?);
            }

            if headers.is_empty() {
                return Err(Error::new(ErrorKind::FileBadHeader, "multipart file without parts"));
            }

            Ok(headers)
        }
    }

    /// Write all headers and, for multi-part files, the end-of-headers marker.
    pub fn write_all(headers: &[Header], write: &mut impl Write, is_multipart: bool) -> UnitResult {
        for header in headers {
            header.write(write)?;
        }

        if is_multipart {
            sequence_end::write(write)?;
        }

        Ok(())
    }

    /// Read the attribute bag of a single part.
    /// A failed parse of a known attribute type aborts when `strict`,
    /// and otherwise preserves the attribute as opaque bytes.
    pub fn read(read: &mut PeekRead<impl Read>, requirements: &Requirements, strict: bool) -> Result<Self> {
        let max_attribute_size = requirements.max_attribute_size();

        // build into a temporary header, swap on success,
        // so an error can never leave a half-built header behind
        let mut header = Header::default();

        while !sequence_end::has_come(read)? {
            let attribute = Attribute::read(read, max_attribute_size, strict)?;

            // duplicate attribute names are a defect of the file
            if strict && header.find(attribute.name.as_slice()).is_some() {
                return Err(Error::new(ErrorKind::InvalidAttr, "duplicate attribute name"));
            }

            header.attributes.push(attribute);
        }

        Ok(header)
    }

    /// Without validation, write the attribute bag and the terminating zero byte.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        for attribute in &self.attributes {
            attribute.write(write)?;
        }

        sequence_end::write(write)?;
        Ok(())
    }

    /// Number of bytes this header would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        self.attributes.iter().map(Attribute::byte_size).sum::<usize>()
            + sequence_end::byte_size()
    }

    /// Validate this header against the file-level requirements.
    pub fn validate(&self, requirements: &Requirements, max_image_size: Option<Vec2<usize>>, strict: bool) -> UnitResult {
        let data_window = self.data_window()?;
        data_window.validate(max_image_size)?;
        self.display_window()?.validate(max_image_size)?;

        let storage = self.storage()?;
        let compression = self.compression()?;
        let line_order = self.line_order()?;

        let allow_subsampling = storage == Storage::ScanLine && !requirements.is_multipart();
        self.channels()?.validate(allow_subsampling, data_window, strict)?;

        for attribute in &self.attributes {
            attribute.validate(requirements.has_long_names(), allow_subsampling, data_window, strict)?;
        }

        if storage.is_tiled() {
            let tiles = match self.find(standard_names::TILES) {
                Some(tiles) => tiles.value.to_tile_description()?,
                None => return Err(Error::new(ErrorKind::MissingRequiredAttr, "missing tiles attribute for tiled part")),
            };

            tiles.validate()?;

            if strict && line_order == LineOrder::DecreasingY {
                return Err(Error::invalid("tiled parts must not use decreasing line order"));
            }
        }

        if storage.is_deep() {
            if !compression.supports_deep_data() {
                return Err(Error::invalid("compression method does not support deep data"));
            }

            if self.version()? != 1 {
                return Err(Error::invalid("deep data version other than 1 is not supported"));
            }
        }

        if requirements.is_multipart() || storage.is_deep() {
            // multi-part and deep headers must identify themselves
            self.name()?.validate(true, Some(requirements.has_long_names()))?;
            self.get(standard_names::BLOCK_TYPE)?;
            self.get(standard_names::CHUNK_COUNT)?;

            let declared = i32_to_usize(self.get(standard_names::CHUNK_COUNT)?.value.to_i32()?, "chunk count attribute")?;
            let computed = compute_chunk_count(
                compression, data_window.size,
                self.find(standard_names::TILES).map(|tiles| tiles.value.to_tile_description()).transpose()?
            )?;

            if declared != computed {
                return Err(Error::invalid("chunk count attribute does not match data window"));
            }
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use smallvec::smallvec;

    fn rgb_channels() -> ChannelList {
        ChannelList::new(smallvec![
            ChannelDescription::new(Text::new_or_panic("B"), SampleType::F16, false),
            ChannelDescription::new(Text::new_or_panic("G"), SampleType::F16, false),
            ChannelDescription::new(Text::new_or_panic("R"), SampleType::F16, false),
        ])
    }

    #[test]
    fn insert_same_type_is_idempotent(){
        let mut header = Header::new_scan_line(
            IntegerBounds::from_dimensions(Vec2(16, 16)),
            rgb_channels(), Compression::ZIP,
        );

        header.insert(Text::new_or_panic("foo"), AttributeValue::IntegerBounds(IntegerBounds::from_dimensions(Vec2(1, 1)))).unwrap();
        header.insert(Text::new_or_panic("foo"), AttributeValue::IntegerBounds(IntegerBounds::from_dimensions(Vec2(2, 2)))).unwrap();

        assert_eq!(
            header.get(b"foo").unwrap().value.to_integer_bounds().unwrap().size,
            Vec2(2, 2)
        );
    }

    #[test]
    fn insert_mismatching_type_keeps_existing_attribute(){
        let mut header = Header::new_scan_line(
            IntegerBounds::from_dimensions(Vec2(16, 16)),
            rgb_channels(), Compression::ZIP,
        );

        header.insert(Text::new_or_panic("foo"), AttributeValue::IntegerBounds(IntegerBounds::from_dimensions(Vec2(1, 1)))).unwrap();

        let error = header
            .insert(Text::new_or_panic("foo"), AttributeValue::FloatRect(FloatRect { min: Vec2(0.0, 0.0), max: Vec2(1.0, 1.0) }))
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::InvalidArgument);

        // the first value survives unchanged
        assert!(header.get(b"foo").unwrap().value.to_integer_bounds().is_ok());
    }

    #[test]
    fn chunk_counts(){
        let scan_lines = Header::new_scan_line(
            IntegerBounds::from_dimensions(Vec2(64, 100)),
            rgb_channels(), Compression::ZIP,
        );

        // zip compresses 16 scan lines per chunk
        assert_eq!(scan_lines.chunk_count().unwrap(), 7);

        let single_level = Header::new_tiled(
            IntegerBounds::from_dimensions(Vec2(100, 100)),
            rgb_channels(), Compression::RLE,
            TileDescription {
                tile_size: Vec2(32, 32),
                level_mode: LevelMode::Singular,
                rounding_mode: crate::math::RoundingMode::Down,
            },
        );

        assert_eq!(single_level.chunk_count().unwrap(), 4 * 4);

        let mip_maps = Header::new_tiled(
            IntegerBounds::from_dimensions(Vec2(64, 64)),
            rgb_channels(), Compression::RLE,
            TileDescription {
                tile_size: Vec2(32, 32),
                level_mode: LevelMode::MipMap,
                rounding_mode: crate::math::RoundingMode::Down,
            },
        );

        // levels are 64, 32, 16, 8, 4, 2, 1 pixels wide
        assert_eq!(mip_maps.chunk_count().unwrap(), 4 + 1 + 1 + 1 + 1 + 1 + 1);
    }

    #[test]
    fn header_roundtrip(){
        let header = Header::new_scan_line(
            IntegerBounds::new(Vec2(-2, 4), Vec2(17, 33)),
            rgb_channels(), Compression::PIZ,
        );

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), header.byte_size());

        let requirements = Requirements::default();
        let mut read = PeekRead::new(bytes.as_slice());
        let decoded = Header::read(&mut read, &requirements, true).unwrap();

        assert_eq!(header, decoded);
        decoded.validate(&requirements, None, true).unwrap();
    }
}
