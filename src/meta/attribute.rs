
//! Contains all meta data attributes.
//! Each part can have any number of [`Attribute`]s, including custom attributes.

use smallvec::SmallVec;


/// A named attribute value, as it appears in the attribute bag of a header.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {

    /// The name of this attribute. Unique within one header.
    pub name: Text,

    /// The value of this attribute, tagged with its type.
    pub value: AttributeValue,
}


/// Contains one of all possible attributes.
/// Includes a variant for attributes of unknown type, which round-trip byte-exact.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {

    /// Channel meta data.
    ChannelList(ChannelList),

    /// Color space definition.
    Chromaticities(Chromaticities),

    /// Compression method of this part.
    Compression(Compression),

    /// This image is an environment map.
    EnvironmentMap(EnvironmentMap),

    /// Film roll information.
    KeyCode(KeyCode),

    /// Order of the chunks in the file.
    LineOrder(LineOrder),

    /// A 3x3 matrix of floats.
    Matrix3x3(Matrix3x3),

    /// A 4x4 matrix of floats.
    Matrix4x4(Matrix4x4),

    /// A 3x3 matrix of doubles.
    Matrix3x3F64(Matrix3x3F64),

    /// A 4x4 matrix of doubles.
    Matrix4x4F64(Matrix4x4F64),

    /// 8-bit RGBA Preview of the image.
    Preview(Preview),

    /// An integer dividend and divisor.
    Rational(Rational),

    /// List of texts.
    TextVector(Vec<Text>),

    /// List of 32-bit floats.
    FloatVector(Vec<f32>),

    /// How to tile up the image.
    TileDescription(TileDescription),

    /// Timepoint and more.
    TimeCode(TimeCode),

    /// A string of byte-chars.
    Text(Text),

    /// 64-bit float
    F64(f64),

    /// 32-bit float
    F32(f32),

    /// 32-bit signed integer
    I32(i32),

    /// 2D integer rectangle.
    IntegerBounds(IntegerBounds),

    /// 2D float rectangle.
    FloatRect(FloatRect),

    /// 2D integer vector.
    IntVec2(Vec2<i32>),

    /// 2D float vector.
    FloatVec2(Vec2<f32>),

    /// 2D double vector.
    DoubleVec2(Vec2<f64>),

    /// 3D integer vector.
    IntVec3((i32, i32, i32)),

    /// 3D float vector.
    FloatVec3((f32, f32, f32)),

    /// 3D double vector.
    DoubleVec3((f64, f64, f64)),

    /// An attribute of unknown or user-defined type.
    /// The byte content round-trips exactly,
    /// unless the context has a handler registered for the type.
    Opaque {

        /// The name of the type this attribute is an instance of.
        kind: Text,

        /// The value, stored in the wire byte order of the unknown type.
        bytes: Vec<u8>,
    },
}

/// A byte array with each byte being a char.
/// This is not UTF and must be constructed from a standard string.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Text {
    bytes: TextBytes,
}

/// The raw bytes that make up a string in an exr file.
/// Each `u8` is a single char.
// will mostly be "R", "G", "B" or "deepscanline"
type TextBytes = SmallVec<[u8; 24]>;

/// Contains time information, as bit-packed time and user data words.
#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub struct TimeCode {

    /// The packed hours, minutes, seconds, frame and flag bits.
    pub time_and_flags: u32,

    /// The packed user data fields.
    pub user_data: u32,
}

/// An integer dividend and divisor, together forming a ratio.
pub type Rational = (i32, u32);

/// A float matrix with four rows and four columns.
pub type Matrix4x4 = [f32; 4*4];

/// A float matrix with three rows and three columns.
pub type Matrix3x3 = [f32; 3*3];

/// A double precision matrix with four rows and four columns.
pub type Matrix4x4F64 = [f64; 4*4];

/// A double precision matrix with three rows and three columns.
pub type Matrix3x3F64 = [f64; 3*3];

/// A rectangular section anywhere in 2D integer space.
/// Valid from minimum coordinate (including) to maximum coordinate (including).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Hash)]
pub struct IntegerBounds {

    /// The top left corner of this rectangle.
    /// The rectangle includes this pixel if the size is not zero.
    pub position: Vec2<i32>,

    /// How many pixels to include in this rectangle.
    /// Extends to the right and downwards.
    /// Does not include the actual boundary, just like `Vec::len()`.
    pub size: Vec2<usize>,
}

/// A rectangular section anywhere in 2D float space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloatRect {

    /// The top left corner location of the rectangle (inclusive)
    pub min: Vec2<f32>,

    /// The bottom right corner location of the rectangle (inclusive)
    pub max: Vec2<f32>,
}

/// A List of channels. Channels must be sorted alphabetically.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelList {

    /// The channels in this list, sorted alphabetically by name.
    pub list: SmallVec<[ChannelDescription; 5]>,

    /// The number of bytes that one pixel in this image needs
    /// (summed over all channels, ignoring subsampling).
    pub bytes_per_pixel: usize,

    /// The sample type of all channels, if all channels have the same type.
    pub uniform_sample_type: Option<SampleType>,
}

/// A single channel in a part.
/// Does not contain the actual pixel data,
/// but instead merely describes it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// One of "R", "G", or "B" most of the time.
    pub name: Text,

    /// U32, F16 or F32.
    pub sample_type: SampleType,

    /// This attribute only tells lossy compression methods
    /// whether this value should be quantized exponentially or linearly.
    ///
    /// Should be `false` for red, green, or blue channels.
    /// Should be `true` for hue, chroma, saturation, or alpha channels.
    pub quantize_linearly: bool,

    /// How many of the samples are skipped compared to the other channels in this part.
    ///
    /// Can be used for chroma subsampling for manual lossy data compression.
    /// Values other than 1 are allowed only in flat, scan-line based parts.
    /// If an image is deep or tiled, x and y sampling rates for all of its channels must be 1.
    pub sampling: Vec2<usize>,
}

/// What kind of pixels are in this channel.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// This channel contains 32-bit unsigned int values.
    U32,

    /// This channel contains 16-bit float values.
    F16,

    /// This channel contains 32-bit float values.
    F32,
}

/// The color space of the pixels.
///
/// If a file doesn't have a chromaticities attribute, display software
/// should assume that the file's primaries and the white point match `Rec. ITU-R BT.709-3`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticities {

    /// "Red" location on the CIE XY chromaticity diagram.
    pub red: Vec2<f32>,

    /// "Green" location on the CIE XY chromaticity diagram.
    pub green: Vec2<f32>,

    /// "Blue" location on the CIE XY chromaticity diagram.
    pub blue: Vec2<f32>,

    /// "White" location on the CIE XY chromaticity diagram.
    pub white: Vec2<f32>,
}

/// If this attribute is present, it describes
/// how this texture should be projected onto an environment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EnvironmentMap {

    /// This image is an environment map projected like a world map.
    LatitudeLongitude,

    /// This image contains the six sides of a cube.
    Cube,
}

/// Uniquely identifies a motion picture film frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct KeyCode {

    /// Identifies a film manufacturer.
    pub film_manufacturer_code: i32,

    /// Identifies a film type.
    pub film_type: i32,

    /// Specifies the film roll prefix.
    pub film_roll_prefix: i32,

    /// Specifies the film count.
    pub count: i32,

    /// Specifies the perforation offset.
    pub perforation_offset: i32,

    /// Specifies the perforation count of each single frame.
    pub perforations_per_frame: i32,

    /// Specifies the perforation count of each single film.
    pub perforations_per_count: i32,
}

/// In what order the chunks of pixel data appear in a file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LineOrder {

    /// The chunks in the file are ordered from bottom towards the top of the image.
    IncreasingY,

    /// The chunks in the file are ordered from the top towards the bottom of the image.
    DecreasingY,

    /// The chunks appear in the file in no particular order.
    /// Readers must consult the chunk offset table, never the physical file order.
    RandomY,
}

/// A small `rgba` image of `u8` values that approximates the real exr image.
#[derive(Clone, Eq, PartialEq)]
pub struct Preview {

    /// The dimensions of the preview image.
    pub size: Vec2<usize>,

    /// An array with a length of 4 × width × height.
    /// Each pixel consists of the four `u8` values red, green, blue, alpha.
    pub pixel_data: Vec<u8>,
}

/// Describes how a part is divided into tiles.
/// Specifies the size of each tile in the image
/// and whether this image contains multiple resolution levels.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TileDescription {

    /// The size of each tile.
    /// Stays the same number of pixels across all levels.
    pub tile_size: Vec2<usize>,

    /// Whether to also store smaller versions of the image.
    pub level_mode: LevelMode,

    /// Whether to round up or down when calculating Mip/Rip levels.
    pub rounding_mode: RoundingMode,
}

/// Whether to also store increasingly smaller versions of the original image.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LevelMode {

    /// Only a single level.
    Singular,

    /// Levels with a similar aspect ratio.
    MipMap,

    /// Levels with all possible aspect ratios.
    RipMap,
}


pub use crate::compression::Compression;

use crate::io::*;
use crate::error::*;
use crate::math::{RoundingMode, Vec2};
use std::convert::TryFrom;


fn invalid_type() -> Error {
    Error::new(ErrorKind::AttrTypeMismatch, "attribute type mismatch")
}


impl Text {

    /// Create a `Text` from an `str` reference.
    /// Returns `None` if this string contains unsupported chars.
    pub fn new_or_none(string: impl AsRef<str>) -> Option<Self> {
        let vec: Option<TextBytes> = string.as_ref().chars()
            .map(|character| u8::try_from(character as u64).ok())
            .collect();

        vec.map(Self::from_bytes_unchecked)
    }

    /// Create a `Text` from an `str` reference.
    /// Panics if this string contains unsupported chars.
    pub fn new_or_panic(string: impl AsRef<str>) -> Self {
        Self::new_or_none(string).expect("exr text contains unsupported characters")
    }

    /// Create a `Text` from a slice of bytes,
    /// without checking any of the bytes.
    pub fn from_slice_unchecked(text: &[u8]) -> Self {
        Self::from_bytes_unchecked(SmallVec::from_slice(text))
    }

    /// Create a `Text` from the specified bytes object,
    /// without checking any of the bytes.
    pub fn from_bytes_unchecked(bytes: TextBytes) -> Self {
        Text { bytes }
    }

    /// The internal ASCII bytes this text is made of.
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// The number of bytes in this text.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns whether this text contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check whether this string is valid, considering the maximum text length.
    pub fn validate(&self, null_terminated: bool, long_names: Option<bool>) -> UnitResult {
        Self::validate_bytes(self.as_slice(), null_terminated, long_names)
    }

    /// Check whether some bytes are valid, considering the maximum text length.
    pub fn validate_bytes(text: &[u8], null_terminated: bool, long_names: Option<bool>) -> UnitResult {
        if null_terminated && text.is_empty() {
            return Err(Error::invalid("text must not be empty"));
        }

        if let Some(long) = long_names {
            let max_len = if long { 255 } else { 31 };
            if text.len() > max_len {
                return Err(Error::new(ErrorKind::NameTooLong, "text too long for this file"));
            }
        }

        Ok(())
    }

    /// The byte count this string would occupy if it was encoded as a null-terminated string.
    pub fn null_terminated_byte_size(&self) -> usize {
        self.bytes.len() + sequence_end::byte_size()
    }

    /// The byte count this string would occupy if it was encoded as a size-prefixed string.
    pub fn i32_sized_byte_size(&self) -> usize {
        self.bytes.len() + i32::BYTE_SIZE
    }

    /// Write the length of a string and then the contents with that length.
    pub fn write_i32_sized<W: Write>(&self, write: &mut W) -> UnitResult {
        u8::write_i32_sized_slice(write, self.as_slice())
    }

    /// Read the length of a string and then the contents with that length.
    pub fn read_i32_sized(read: &mut impl Read, max_size: usize) -> Result<Self> {
        let size = i32_to_usize(i32::read(read)?, "vector size")?;
        let bytes = u8::read_vec(read, size, 1024, Some(max_size), "text attribute length")?;
        Ok(Text::from_bytes_unchecked(SmallVec::from_vec(bytes)))
    }

    /// Read the contents with that length.
    pub fn read_sized(read: &mut impl Read, size: usize) -> Result<Self> {
        const SMALL_SIZE: usize = 24;

        // for small strings, read into small vec without heap allocation
        if size <= SMALL_SIZE {
            let mut buffer = [0_u8; SMALL_SIZE];
            let data = &mut buffer[..size];

            u8::read_slice(read, data)?;
            Ok(Text::from_slice_unchecked(data))
        }

        // for large strings, read a dynamic vec of arbitrary size
        else {
            let bytes = u8::read_vec(read, size, 1024, None, "text attribute length")?;
            Ok(Text::from_bytes_unchecked(SmallVec::from_vec(bytes)))
        }
    }

    /// Write the string contents and a null-terminator.
    pub fn write_null_terminated<W: Write>(&self, write: &mut W) -> UnitResult {
        Self::write_null_terminated_bytes(self.as_slice(), write)
    }

    /// Write the string contents and a null-terminator.
    fn write_null_terminated_bytes(bytes: &[u8], write: &mut impl Write) -> UnitResult {
        debug_assert!(!bytes.contains(&0), "text contains null bytes");

        u8::write_slice(write, bytes)?;
        sequence_end::write(write)?;
        Ok(())
    }

    /// Read a string until the null-terminator is found. Then skips the null-terminator.
    pub fn read_null_terminated(read: &mut impl Read, max_len: usize) -> Result<Self> {
        let mut bytes = SmallVec::new();

        loop {
            match u8::read(read)? {
                0 => break,
                non_terminator => bytes.push(non_terminator),
            }

            if bytes.len() > max_len {
                return Err(Error::new(ErrorKind::NameTooLong, "text too long for this file"));
            }
        }

        Ok(Text { bytes })
    }

    /// Allows any text length since it is only used for attribute values,
    /// but not attribute names, attribute type names, or channel names.
    fn read_vec_of_i32_sized(read: &mut impl Read, total_byte_size: usize) -> Result<Vec<Text>> {
        let mut result = Vec::with_capacity(2);

        // length of the text-vector can be inferred from attribute size
        let mut processed_bytes = 0;

        while processed_bytes < total_byte_size {
            let text = Self::read_i32_sized(read, total_byte_size)?;
            processed_bytes += text.i32_sized_byte_size();
            result.push(text);
        }

        // the expected byte size did not match the actual text byte size
        if processed_bytes != total_byte_size {
            return Err(Error::new(ErrorKind::AttrSizeMismatch, "text array size mismatch"));
        }

        Ok(result)
    }

    /// Allows any text length since it is only used for attribute values,
    /// but not attribute names, attribute type names, or channel names.
    fn write_vec_of_i32_sized_texts<W: Write>(write: &mut W, texts: &[Text]) -> UnitResult {
        for text in texts {
            text.write_i32_sized(write)?;
        }

        Ok(())
    }
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.as_slice() == other.as_bytes()
    }
}

impl PartialEq<Text> for str {
    fn eq(&self, other: &Text) -> bool {
        other == self
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &byte in self.as_slice() {
            write!(formatter, "{}", byte as char)?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Text {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "\"{}\"", self)
    }
}

impl std::borrow::Borrow<[u8]> for Text {
    fn borrow(&self) -> &[u8] {
        self.as_slice()
    }
}

// forbidding this enables Text to use the str equality everywhere
// impl From<&str> is not implemented because it might panic


/// A `0_u8` at the end of a sequence.
pub mod sequence_end {
    use super::*;

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        1
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(write: &mut W) -> UnitResult {
        0_u8.write(write)
    }

    /// Peeks the next byte. If it is zero, consumes the byte and returns true.
    pub fn has_come(read: &mut PeekRead<impl Read>) -> Result<bool> {
        Ok(read.skip_if_eq(0)?)
    }
}


impl SampleType {

    /// How many bytes a single sample takes up.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::F16 => 2,
            SampleType::F32 => 4,
            SampleType::U32 => 4,
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(self, write: &mut impl Write) -> UnitResult {
        match self {
            SampleType::U32 => 0_i32,
            SampleType::F16 => 1_i32,
            SampleType::F32 => 2_i32,
        }.write(write)
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        // there's definitely going to be more than 255 of these
        match i32::read(read)? {
            0 => Ok(SampleType::U32),
            1 => Ok(SampleType::F16),
            2 => Ok(SampleType::F32),
            _ => Err(Error::new(ErrorKind::InvalidAttr, "pixel type attribute value")),
        }
    }
}


impl ChannelDescription {

    /// Create a new channel with the specified properties and a sampling rate of (1,1).
    pub fn new(name: impl Into<Text>, sample_type: SampleType, quantize_linearly: bool) -> Self {
        Self { name: name.into(), sample_type, quantize_linearly, sampling: Vec2(1, 1) }
    }

    /// The count of samples for a region of the specified size,
    /// respecting the subsampling factors of this channel.
    /// Assumes the region starts at a sampled position,
    /// which is always true for a whole data window.
    pub fn subsampled_resolution(&self, dimensions: Vec2<usize>) -> Vec2<usize> {
        Vec2(
            crate::math::div_ceil(dimensions.x(), self.sampling.x()),
            crate::math::div_ceil(dimensions.y(), self.sampling.y()),
        )
    }

    /// The count of samples within the specified pixel rectangle.
    /// Exact even when the rectangle starts between two sampled rows,
    /// which happens for chunks whose height the sampling factor does not divide.
    pub fn subsampled_pixels(&self, bounds: IntegerBounds) -> Vec2<usize> {
        Vec2(
            crate::math::count_sampled(bounds.position.x(), bounds.size.width(), self.sampling.x()),
            crate::math::count_sampled(bounds.position.y(), bounds.size.height(), self.sampling.y()),
        )
    }

    /// The number of sample values a single line of the specified width contains.
    pub fn subsampled_line_samples(&self, width: usize) -> usize {
        crate::math::div_ceil(width, self.sampling.x())
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        self.name.null_terminated_byte_size()
            + i32::BYTE_SIZE // pixel type
            + 1 + 3 // pLinear and reserved bytes
            + 2 * i32::BYTE_SIZE // sampling x, y
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        self.name.write_null_terminated(write)?;
        self.sample_type.write(write)?;

        match self.quantize_linearly {
            true => 1_u8,
            false => 0_u8,
        }.write(write)?;

        i8::write_slice(write, &[0_i8, 0_i8, 0_i8])?; // reserved bytes
        usize_to_i32(self.sampling.x()).write(write)?;
        usize_to_i32(self.sampling.y()).write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let name = Text::read_null_terminated(read, 255)?;
        let sample_type = SampleType::read(read)?;

        let is_linear = match u8::read(read)? {
            1 => true,
            0 => false,
            _ => return Err(Error::new(ErrorKind::InvalidAttr, "channel linearity attribute value")),
        };

        let mut reserved = [0_i8; 3];
        i8::read_slice(read, &mut reserved)?;

        let x_sampling = i32_to_usize(i32::read(read)?, "x channel sampling")?;
        let y_sampling = i32_to_usize(i32::read(read)?, "y channel sampling")?;

        if x_sampling == 0 || y_sampling == 0 {
            return Err(Error::new(ErrorKind::InvalidAttr, "zero channel sampling factor"));
        }

        Ok(ChannelDescription {
            name, sample_type,
            quantize_linearly: is_linear,
            sampling: Vec2(x_sampling, y_sampling),
        })
    }

    /// Validate this instance.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds, strict: bool) -> UnitResult {
        self.name.validate(true, None)?; // channel names may always be long

        if self.sampling.x() == 0 || self.sampling.y() == 0 {
            return Err(Error::invalid("zero sampling factor"));
        }

        if strict && !allow_sampling && self.sampling != Vec2(1, 1) {
            return Err(Error::invalid("subsampling is only allowed in flat scan line images"));
        }

        if data_window.position.x() % usize_to_i32(self.sampling.x()) != 0
            || data_window.position.y() % usize_to_i32(self.sampling.y()) != 0 {
            return Err(Error::invalid("channel sampling factor not dividing data window position"));
        }

        if data_window.size.x() % self.sampling.x() != 0
            || data_window.size.y() % self.sampling.y() != 0 {
            return Err(Error::invalid("channel sampling factor not dividing data window size"));
        }

        Ok(())
    }
}


impl ChannelList {

    /// Does not validate channel order.
    pub fn new(channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        let mut sorted = channels;
        sorted.sort_by(|a, b| a.name.as_slice().cmp(b.name.as_slice()));
        Self::from_sorted(sorted)
    }

    fn from_sorted(channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        let uniform_sample_type = {
            let mut sample_types = channels.iter().map(|channel| channel.sample_type);
            let first_type = sample_types.next();
            first_type.filter(|first| sample_types.all(|sample_type| sample_type == *first))
        };

        ChannelList {
            bytes_per_pixel: channels.iter()
                .map(|channel| channel.sample_type.bytes_per_sample())
                .sum(),

            list: channels,
            uniform_sample_type,
        }
    }

    /// Insert a new channel, keeping the list sorted by name.
    /// Returns an error if a channel with that name already exists.
    pub fn insert(&mut self, channel: ChannelDescription) -> UnitResult {
        match self.list.binary_search_by(|existing| existing.name.as_slice().cmp(channel.name.as_slice())) {
            Ok(_) => Err(Error::invalid("duplicate channel name")),
            Err(index) => {
                self.bytes_per_pixel += channel.sample_type.bytes_per_sample();

                self.uniform_sample_type = self.uniform_sample_type
                    .filter(|&uniform| self.list.is_empty() || uniform == channel.sample_type);

                if self.list.is_empty() {
                    self.uniform_sample_type = Some(channel.sample_type);
                }

                self.list.insert(index, channel);
                Ok(())
            }
        }
    }

    /// Find the channel with the specified name.
    pub fn find_by_name(&self, name: &[u8]) -> Option<&ChannelDescription> {
        self.list
            .binary_search_by(|channel| channel.name.as_slice().cmp(name)).ok()
            .map(|index| &self.list[index])
    }

    /// The number of bytes a single unpacked line of pixels in the
    /// specified row consumes, respecting subsampling.
    pub fn bytes_per_line(&self, y: i32, width: usize) -> usize {
        self.list.iter()
            .filter(|channel| crate::math::mod_p(y, usize_to_i32(channel.sampling.y())) == 0)
            .map(|channel| channel.subsampled_line_samples(width) * channel.sample_type.bytes_per_sample())
            .sum()
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        self.list.iter().map(ChannelDescription::byte_size).sum::<usize>()
            + sequence_end::byte_size()
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        for channel in &self.list {
            channel.write(write)?;
        }

        sequence_end::write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut PeekRead<impl Read>) -> Result<Self> {
        let mut channels = SmallVec::new();

        while !sequence_end::has_come(read)? {
            channels.push(ChannelDescription::read(read)?);
        }

        Ok(ChannelList::new(channels))
    }

    /// Check if channels are valid and sorted.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds, strict: bool) -> UnitResult {
        let mut iter = self.list.iter().map(|chan| chan.validate(allow_sampling, data_window, strict).map(|_| &chan.name));
        let mut previous = iter.next().ok_or_else(|| Error::invalid("at least one channel is required"))??;

        for result in iter {
            let value = result?;
            if previous == value { return Err(Error::invalid("channel names are not unique")); }
            else if previous > value { return Err(Error::invalid("channel names are not sorted alphabetically")); }

            previous = value;
        }

        Ok(())
    }
}


impl IntegerBounds {

    /// Create a new rectangle from a position and size.
    pub fn new(position: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        Self { position: position.into(), size: size.into() }
    }

    /// Create a box with no size located at (0,0).
    pub fn zero() -> Self {
        Self::from_dimensions(Vec2(0, 0))
    }

    /// Create a box with a size starting at zero.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        Self::new(Vec2(0, 0), size)
    }

    /// The exclusive end position of this rectangle.
    pub fn end(self) -> Vec2<i32> {
        assert!(self.size.x() < i32::MAX as usize && self.size.y() < i32::MAX as usize, "rectangle size too large");
        self.position + self.size.to_i32()
    }

    /// The inclusive maximum coordinate of this rectangle.
    pub fn max(self) -> Vec2<i32> {
        self.end() - Vec2(1, 1)
    }

    /// Returns whether the specified rectangle is equal to or inside this rectangle.
    pub fn contains(self, other: Self) -> bool {
        other.position.x() >= self.position.x()
            && other.position.y() >= self.position.y()
            && other.end().x() <= self.end().x()
            && other.end().y() <= self.end().y()
    }

    /// Create a new rectangle, offset by the specified origin.
    pub fn with_origin(self, origin: Vec2<i32>) -> Self {
        IntegerBounds { position: self.position + origin, size: self.size }
    }

    /// Validate this instance, and report sizes that surpass the specified maximum.
    pub fn validate(&self, max_size: Option<Vec2<usize>>) -> UnitResult {
        if let Some(max_size) = max_size {
            if self.size.width() > max_size.width() || self.size.height() > max_size.height() {
                return Err(Error::invalid("window attribute dimension value"));
            }
        }

        let min_i64 = Vec2(self.position.x() as i64, self.position.y() as i64);

        let max_i64 = Vec2(
            self.position.x() as i64 + self.size.width() as i64,
            self.position.y() as i64 + self.size.height() as i64,
        );

        Self::validate_min_max_u64(min_i64, max_i64)
    }

    fn validate_min_max_u64(min: Vec2<i64>, max: Vec2<i64>) -> UnitResult {
        let max_box_size_as_i64 = i32::MAX as i64;

        if max.x() >= max_box_size_as_i64
            || max.y() >= max_box_size_as_i64
            || min.x() <= -max_box_size_as_i64
            || min.y() <= -max_box_size_as_i64
        {
            return Err(Error::invalid("window attribute dimension value"));
        }

        Ok(())
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        4 * i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        let max = self.max();

        self.position.x().write(write)?;
        self.position.y().write(write)?;

        max.x().write(write)?;
        max.y().write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let x_min = i32::read(read)?;
        let y_min = i32::read(read)?;
        let x_max = i32::read(read)?;
        let y_max = i32::read(read)?;

        let min = Vec2(x_min.min(x_max), y_min.min(y_max));
        let max  = Vec2(x_min.max(x_max), y_min.max(y_max));

        // prevent addition overflow
        Self::validate_min_max_u64(
            Vec2(min.x() as i64, min.y() as i64),
            Vec2(max.x() as i64, max.y() as i64),
        )?;

        // add one to max because the max inclusive, but our size is exclusive
        let size = Vec2(max.x() + 1 - min.x(), max.y() + 1 - min.y());
        let size = size.to_usize("box coordinates")?;

        Ok(IntegerBounds { position: min, size })
    }
}


impl FloatRect {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        4 * f32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.min.x().write(write)?;
        self.min.y().write(write)?;
        self.max.x().write(write)?;
        self.max.y().write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let x_min = f32::read(read)?;
        let y_min = f32::read(read)?;
        let x_max = f32::read(read)?;
        let y_max = f32::read(read)?;

        Ok(FloatRect {
            min: Vec2(x_min, y_min),
            max: Vec2(x_max, y_max),
        })
    }
}


impl TimeCode {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        2 * u32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.time_and_flags.write(write)?;
        self.user_data.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Ok(Self {
            time_and_flags: u32::read(read)?,
            user_data: u32::read(read)?,
        })
    }
}


impl Chromaticities {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        8 * f32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.red.x().write(write)?;
        self.red.y().write(write)?;

        self.green.x().write(write)?;
        self.green.y().write(write)?;

        self.blue.x().write(write)?;
        self.blue.y().write(write)?;

        self.white.x().write(write)?;
        self.white.y().write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Ok(Chromaticities {
            red: Vec2(f32::read(read)?, f32::read(read)?),
            green: Vec2(f32::read(read)?, f32::read(read)?),
            blue: Vec2(f32::read(read)?, f32::read(read)?),
            white: Vec2(f32::read(read)?, f32::read(read)?),
        })
    }
}


impl KeyCode {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        7 * i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.film_manufacturer_code.write(write)?;
        self.film_type.write(write)?;
        self.film_roll_prefix.write(write)?;
        self.count.write(write)?;
        self.perforation_offset.write(write)?;
        self.perforations_per_frame.write(write)?;
        self.perforations_per_count.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Ok(KeyCode {
            film_manufacturer_code: i32::read(read)?,
            film_type: i32::read(read)?,
            film_roll_prefix: i32::read(read)?,
            count: i32::read(read)?,
            perforation_offset: i32::read(read)?,
            perforations_per_frame: i32::read(read)?,
            perforations_per_count: i32::read(read)?,
        })
    }
}


impl EnvironmentMap {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        u8::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        match self {
            EnvironmentMap::LatitudeLongitude => 0_u8,
            EnvironmentMap::Cube => 1_u8,
        }.write(write)
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        match u8::read(read)? {
            0 => Ok(EnvironmentMap::LatitudeLongitude),
            1 => Ok(EnvironmentMap::Cube),
            _ => Err(Error::new(ErrorKind::InvalidAttr, "environment map attribute value")),
        }
    }
}


impl LineOrder {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        u8::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::LineOrder::*;
        match self {
            IncreasingY => 0_u8,
            DecreasingY => 1_u8,
            RandomY => 2_u8,
        }.write(write)
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        use self::LineOrder::*;
        Ok(match u8::read(read)? {
            0 => IncreasingY,
            1 => DecreasingY,
            2 => RandomY,
            _ => return Err(Error::new(ErrorKind::InvalidAttr, "line order attribute value")),
        })
    }
}


impl Preview {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        2 * u32::BYTE_SIZE + self.pixel_data.len()
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        u32::try_from(self.size.x())?.write(write)?;
        u32::try_from(self.size.y())?.write(write)?;
        u8::write_slice(write, &self.pixel_data)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let width = u32_to_usize(u32::read(read)?);
        let height = u32_to_usize(u32::read(read)?);

        let pixel_count = width.checked_mul(height)
            .and_then(|area| area.checked_mul(4))
            .ok_or_else(|| Error::invalid("preview dimensions"))?;

        let pixel_data = u8::read_vec(read, pixel_count, 1024 * 1024 * 4, None, "preview attribute pixel count")?;

        let preview = Preview {
            size: Vec2(width, height),
            pixel_data,
        };

        Ok(preview)
    }

    /// Validate this instance.
    pub fn validate(&self) -> UnitResult {
        if self.size.area() * 4 != self.pixel_data.len() {
            return Err(Error::new(ErrorKind::AttrSizeMismatch, "preview dimensions do not match content length"));
        }

        Ok(())
    }
}

impl ::std::fmt::Debug for Preview {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Preview ({}x{} px)", self.size.x(), self.size.y())
    }
}


impl TileDescription {

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        2 * u32::BYTE_SIZE + 1 // size x,y + (level mode + rounding mode)
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        u32::try_from(self.tile_size.x())?.write(write)?;
        u32::try_from(self.tile_size.y())?.write(write)?;

        let level_mode = match self.level_mode {
            LevelMode::Singular => 0_u8,
            LevelMode::MipMap => 1_u8,
            LevelMode::RipMap => 2_u8,
        };

        let rounding_mode = match self.rounding_mode {
            RoundingMode::Down => 0_u8,
            RoundingMode::Up => 1_u8,
        };

        let mode: u8 = level_mode + (rounding_mode * 16);
        mode.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let x_size = u32_to_usize(u32::read(read)?);
        let y_size = u32_to_usize(u32::read(read)?);

        let mode = u8::read(read)?;

        // wow you really saved that one byte here
        let level_mode = mode & 0b00001111; // wow that works
        let rounding_mode = mode >> 4; // wow that works

        let level_mode = match level_mode {
            0 => LevelMode::Singular,
            1 => LevelMode::MipMap,
            2 => LevelMode::RipMap,
            _ => return Err(Error::new(ErrorKind::InvalidAttr, "tile level mode attribute value")),
        };

        let rounding_mode = match rounding_mode {
            0 => RoundingMode::Down,
            1 => RoundingMode::Up,
            _ => return Err(Error::new(ErrorKind::InvalidAttr, "tile rounding mode attribute value")),
        };

        Ok(TileDescription {
            tile_size: Vec2(x_size, y_size),
            level_mode, rounding_mode,
        })
    }

    /// Validate this instance.
    pub fn validate(&self) -> UnitResult {
        let max = i32::MAX as i64 / 2;

        if self.tile_size.width() == 0 || self.tile_size.height() == 0
            || self.tile_size.width() as i64 >= max || self.tile_size.height() as i64 >= max
        {
            return Err(Error::new(ErrorKind::InvalidAttr, "tile size attribute value"));
        }

        Ok(())
    }
}


impl Attribute {

    /// Create a new attribute from name and value.
    pub fn new(name: Text, value: AttributeValue) -> Self {
        Self { name, value }
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        self.name.null_terminated_byte_size()
            + self.value.kind_name().len() + sequence_end::byte_size()
            + i32::BYTE_SIZE // serialized byte size
            + self.value.byte_size()
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.name.write_null_terminated(write)?;
        Text::write_null_terminated_bytes(self.value.kind_name(), write)?;
        i32::try_from(self.value.byte_size()).map_err(|_| Error::invalid("attribute byte size"))?.write(write)?;
        self.value.write(write)
    }

    /// Read the attribute without validating.
    /// On a parse failure inside a known attribute type, the byte content
    /// is preserved as an opaque attribute instead when `strict` is disabled.
    pub fn read(read: &mut PeekRead<impl Read>, max_size: usize, strict: bool) -> Result<Self> {
        let name = Text::read_null_terminated(read, 255)?;
        let kind = Text::read_null_terminated(read, 255)?;
        let size = i32_to_usize(i32::read(read)?, "attribute size")?;

        let value = AttributeValue::read(read, kind, size, max_size, strict)?;
        Ok(Attribute { name, value })
    }

    /// Validate this instance.
    pub fn validate(&self, long_names: bool, allow_sampling: bool, data_window: IntegerBounds, strict: bool) -> UnitResult {
        self.name.validate(true, Some(long_names))?;
        self.value.validate(allow_sampling, data_window, strict)
    }
}


impl AttributeValue {

    /// The exr name string of the type that an attribute can have.
    pub fn kind_name(&self) -> &[u8] {
        use self::AttributeValue::*;
        use self::type_names as ty;

        match *self {
            IntegerBounds(_) => ty::I32BOX2,
            FloatRect(_) => ty::F32BOX2,
            I32(_) => ty::I32,
            F32(_) => ty::F32,
            F64(_) => ty::F64,
            Rational(_) => ty::RATIONAL,
            TimeCode(_) => ty::TIME_CODE,
            IntVec2(_) => ty::I32VEC2,
            FloatVec2(_) => ty::F32VEC2,
            DoubleVec2(_) => ty::F64VEC2,
            IntVec3(_) => ty::I32VEC3,
            FloatVec3(_) => ty::F32VEC3,
            DoubleVec3(_) => ty::F64VEC3,
            ChannelList(_) => ty::CHANNEL_LIST,
            Chromaticities(_) => ty::CHROMATICITIES,
            Compression(_) => ty::COMPRESSION,
            EnvironmentMap(_) => ty::ENVIRONMENT_MAP,
            KeyCode(_) => ty::KEY_CODE,
            LineOrder(_) => ty::LINE_ORDER,
            Matrix3x3(_) => ty::F32MATRIX3X3,
            Matrix4x4(_) => ty::F32MATRIX4X4,
            Matrix3x3F64(_) => ty::F64MATRIX3X3,
            Matrix4x4F64(_) => ty::F64MATRIX4X4,
            Preview(_) => ty::PREVIEW,
            Text(_) => ty::TEXT,
            TextVector(_) => ty::TEXT_VECTOR,
            FloatVector(_) => ty::FLOAT_VECTOR,
            TileDescription(_) => ty::TILES,
            Opaque { ref kind, .. } => kind.as_slice(),
        }
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        use self::AttributeValue::*;

        match *self {
            IntegerBounds(_) => self::IntegerBounds::byte_size(),
            FloatRect(_) => self::FloatRect::byte_size(),

            I32(_) => i32::BYTE_SIZE,
            F32(_) => f32::BYTE_SIZE,
            F64(_) => f64::BYTE_SIZE,

            Rational(_) => i32::BYTE_SIZE + u32::BYTE_SIZE,
            TimeCode(_) => self::TimeCode::byte_size(),

            IntVec2(_) => 2 * i32::BYTE_SIZE,
            FloatVec2(_) => 2 * f32::BYTE_SIZE,
            DoubleVec2(_) => 2 * f64::BYTE_SIZE,
            IntVec3(_) => 3 * i32::BYTE_SIZE,
            FloatVec3(_) => 3 * f32::BYTE_SIZE,
            DoubleVec3(_) => 3 * f64::BYTE_SIZE,

            ChannelList(ref channels) => channels.byte_size(),
            Chromaticities(_) => self::Chromaticities::byte_size(),
            Compression(_) => 1,
            EnvironmentMap(_) => self::EnvironmentMap::byte_size(),

            KeyCode(_) => self::KeyCode::byte_size(),
            LineOrder(_) => self::LineOrder::byte_size(),

            Matrix3x3(ref value) => value.len() * f32::BYTE_SIZE,
            Matrix4x4(ref value) => value.len() * f32::BYTE_SIZE,
            Matrix3x3F64(ref value) => value.len() * f64::BYTE_SIZE,
            Matrix4x4F64(ref value) => value.len() * f64::BYTE_SIZE,

            Preview(ref value) => value.byte_size(),

            // attribute value texts do not have a null terminator,
            // the size i32 instead determines the length
            Text(ref value) => value.len(),

            TextVector(ref value) => value.iter().map(self::Text::i32_sized_byte_size).sum(),
            FloatVector(ref value) => value.len() * f32::BYTE_SIZE,
            TileDescription(_) => self::TileDescription::byte_size(),
            Opaque { ref bytes, .. } => bytes.len(),
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        use self::AttributeValue::*;

        match *self {
            IntegerBounds(value) => value.write(write)?,
            FloatRect(value) => value.write(write)?,

            I32(value) => value.write(write)?,
            F32(value) => value.write(write)?,
            F64(value) => value.write(write)?,

            Rational((a, b)) => { a.write(write)?; b.write(write)?; },
            TimeCode(codes) => codes.write(write)?,

            IntVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            FloatVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            DoubleVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            IntVec3((x, y, z)) => { x.write(write)?; y.write(write)?; z.write(write)?; },
            FloatVec3((x, y, z)) => { x.write(write)?; y.write(write)?; z.write(write)?; },
            DoubleVec3((x, y, z)) => { x.write(write)?; y.write(write)?; z.write(write)?; },

            ChannelList(ref channels) => channels.write(write)?,
            Chromaticities(ref value) => value.write(write)?,
            Compression(value) => value.write(write)?,
            EnvironmentMap(value) => value.write(write)?,

            KeyCode(value) => value.write(write)?,
            LineOrder(value) => value.write(write)?,

            Matrix3x3(value) => f32::write_slice(write, &value)?,
            Matrix4x4(value) => f32::write_slice(write, &value)?,
            Matrix3x3F64(value) => f64::write_slice(write, &value)?,
            Matrix4x4F64(value) => f64::write_slice(write, &value)?,

            Preview(ref value) => value.write(write)?,

            // attribute value texts do not have a null terminator,
            // the size i32 instead determines the length
            Text(ref value) => u8::write_slice(write, value.as_slice())?,

            TextVector(ref value) => self::Text::write_vec_of_i32_sized_texts(write, value)?,
            FloatVector(ref value) => f32::write_slice(write, value)?,
            TileDescription(ref value) => value.write(write)?,
            Opaque { ref bytes, .. } => u8::write_slice(write, bytes)?,
        };

        Ok(())
    }

    /// Read the value without validating.
    /// The byte size of the value is required to parse
    /// size-delimited content such as texts and arrays.
    pub fn read(read: &mut PeekRead<impl Read>, kind: Text, byte_size: usize, max_size: usize, strict: bool) -> Result<Self> {
        if byte_size > max_size {
            return Err(Error::new(ErrorKind::AttrSizeMismatch, "attribute size too large"));
        }

        // read the full attribute content upfront:
        // a failed parse must never leave the stream cursor in the middle of the value
        let bytes = u8::read_vec(read, byte_size, 1024 * 64, Some(max_size), "attribute size")?;

        match Self::parse_from_bytes(&kind, &bytes) {
            Ok(value) => Ok(value),

            // unknown attribute types round trip as opaque bytes
            Err(error) if error.kind() == ErrorKind::FeatureNotImplemented =>
                Ok(AttributeValue::Opaque { kind, bytes }),

            Err(error) => {
                if strict { Err(error) }

                // tolerant parsing keeps the raw bytes of malformed attributes
                else { Ok(AttributeValue::Opaque { kind, bytes }) }
            }
        }
    }

    fn parse_from_bytes(kind: &Text, bytes: &[u8]) -> Result<Self> {
        use self::AttributeValue::*;
        use self::type_names as ty;

        let byte_size = bytes.len();
        let mut read = PeekRead::new(bytes);
        let read = &mut read;

        let expect_size = |expected: usize| -> UnitResult {
            if byte_size == expected { Ok(()) }
            else { Err(Error::new(ErrorKind::AttrSizeMismatch, "attribute size does not match type")) }
        };

        let value = match kind.as_slice() {
            ty::I32BOX2 => { expect_size(self::IntegerBounds::byte_size())?; IntegerBounds(self::IntegerBounds::read(read)?) },
            ty::F32BOX2 => { expect_size(self::FloatRect::byte_size())?; FloatRect(self::FloatRect::read(read)?) },

            ty::I32 => { expect_size(i32::BYTE_SIZE)?; I32(i32::read(read)?) },
            ty::F32 => { expect_size(f32::BYTE_SIZE)?; F32(f32::read(read)?) },
            ty::F64 => { expect_size(f64::BYTE_SIZE)?; F64(f64::read(read)?) },

            ty::RATIONAL => { expect_size(i32::BYTE_SIZE + u32::BYTE_SIZE)?; Rational((i32::read(read)?, u32::read(read)?)) },
            ty::TIME_CODE => { expect_size(self::TimeCode::byte_size())?; TimeCode(self::TimeCode::read(read)?) },

            ty::I32VEC2 => { expect_size(2 * i32::BYTE_SIZE)?; IntVec2(Vec2(i32::read(read)?, i32::read(read)?)) },
            ty::F32VEC2 => { expect_size(2 * f32::BYTE_SIZE)?; FloatVec2(Vec2(f32::read(read)?, f32::read(read)?)) },
            ty::F64VEC2 => { expect_size(2 * f64::BYTE_SIZE)?; DoubleVec2(Vec2(f64::read(read)?, f64::read(read)?)) },
            ty::I32VEC3 => { expect_size(3 * i32::BYTE_SIZE)?; IntVec3((i32::read(read)?, i32::read(read)?, i32::read(read)?)) },
            ty::F32VEC3 => { expect_size(3 * f32::BYTE_SIZE)?; FloatVec3((f32::read(read)?, f32::read(read)?, f32::read(read)?)) },
            ty::F64VEC3 => { expect_size(3 * f64::BYTE_SIZE)?; DoubleVec3((f64::read(read)?, f64::read(read)?, f64::read(read)?)) },

            ty::CHANNEL_LIST => {
                let channels = self::ChannelList::read(read)?;

                // trailing bytes behind the terminator would silently vanish
                if channels.byte_size() != byte_size {
                    return Err(Error::new(ErrorKind::AttrSizeMismatch, "channel list attribute size mismatch"));
                }

                ChannelList(channels)
            },
            ty::CHROMATICITIES => { expect_size(self::Chromaticities::byte_size())?; Chromaticities(self::Chromaticities::read(read)?) },
            ty::COMPRESSION => { expect_size(1)?; Compression(self::Compression::read(read)?) },
            ty::ENVIRONMENT_MAP => { expect_size(self::EnvironmentMap::byte_size())?; EnvironmentMap(self::EnvironmentMap::read(read)?) },

            ty::KEY_CODE => { expect_size(self::KeyCode::byte_size())?; KeyCode(self::KeyCode::read(read)?) },
            ty::LINE_ORDER => { expect_size(self::LineOrder::byte_size())?; LineOrder(self::LineOrder::read(read)?) },

            ty::F32MATRIX3X3 => {
                expect_size(9 * f32::BYTE_SIZE)?;
                let mut result = [0.0_f32; 9];
                f32::read_slice(read, &mut result)?;
                Matrix3x3(result)
            },

            ty::F32MATRIX4X4 => {
                expect_size(16 * f32::BYTE_SIZE)?;
                let mut result = [0.0_f32; 16];
                f32::read_slice(read, &mut result)?;
                Matrix4x4(result)
            },

            ty::F64MATRIX3X3 => {
                expect_size(9 * f64::BYTE_SIZE)?;
                let mut result = [0.0_f64; 9];
                f64::read_slice(read, &mut result)?;
                Matrix3x3F64(result)
            },

            ty::F64MATRIX4X4 => {
                expect_size(16 * f64::BYTE_SIZE)?;
                let mut result = [0.0_f64; 16];
                f64::read_slice(read, &mut result)?;
                Matrix4x4F64(result)
            },

            ty::PREVIEW => {
                let preview = self::Preview::read(read)?;
                if preview.byte_size() != byte_size {
                    return Err(Error::new(ErrorKind::AttrSizeMismatch, "preview attribute size mismatch"));
                }

                preview.validate()?;
                Preview(preview)
            },

            ty::TEXT => Text(self::Text::read_sized(read, byte_size)?),
            ty::TEXT_VECTOR => TextVector(self::Text::read_vec_of_i32_sized(read, byte_size)?),

            ty::FLOAT_VECTOR => {
                if byte_size % f32::BYTE_SIZE != 0 {
                    return Err(Error::new(ErrorKind::AttrSizeMismatch, "float vector attribute size mismatch"));
                }

                // the number of floats is implied by the attribute size
                let count = byte_size / f32::BYTE_SIZE;
                let mut values = vec![0.0_f32; count];
                f32::read_slice(read, &mut values)?;
                FloatVector(values)
            },

            ty::TILES => { expect_size(self::TileDescription::byte_size())?; TileDescription(self::TileDescription::read(read)?) },

            _ => return Err(Error::unsupported("unknown attribute type")),
        };

        Ok(value)
    }

    /// Validate this instance.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds, strict: bool) -> UnitResult {
        use self::AttributeValue::*;

        match *self {
            ChannelList(ref channels) => channels.validate(allow_sampling, data_window, strict)?,
            TileDescription(ref value) => value.validate()?,
            Preview(ref value) => value.validate()?,
            TextVector(ref value) => {
                for text in value {
                    text.validate(false, None)?;
                }
            },

            _ => {}
        };

        Ok(())
    }


    /// Return `Ok(i32)` if this attribute is an i32.
    pub fn to_i32(&self) -> Result<i32> {
        match *self {
            AttributeValue::I32(value) => Ok(value),
            _ => Err(invalid_type())
        }
    }

    /// Return `Ok(f32)` if this attribute is an f32.
    pub fn to_f32(&self) -> Result<f32> {
        match *self {
            AttributeValue::F32(value) => Ok(value),
            _ => Err(invalid_type())
        }
    }

    /// Return `Ok(Text)` if this attribute is a text.
    pub fn to_text(&self) -> Result<&Text> {
        match *self {
            AttributeValue::Text(ref value) => Ok(value),
            _ => Err(invalid_type())
        }
    }

    /// Return `Ok(IntegerBounds)` if this attribute is an integer rectangle.
    pub fn to_integer_bounds(&self) -> Result<IntegerBounds> {
        match *self {
            AttributeValue::IntegerBounds(value) => Ok(value),
            _ => Err(invalid_type())
        }
    }

    /// Return `Ok(ChannelList)` if this attribute is a channel list.
    pub fn to_channel_list(&self) -> Result<&ChannelList> {
        match *self {
            AttributeValue::ChannelList(ref value) => Ok(value),
            _ => Err(invalid_type())
        }
    }

    /// Return `Ok(Compression)` if this attribute is a compression method.
    pub fn to_compression(&self) -> Result<Compression> {
        match *self {
            AttributeValue::Compression(value) => Ok(value),
            _ => Err(invalid_type())
        }
    }

    /// Return `Ok(LineOrder)` if this attribute is a line order.
    pub fn to_line_order(&self) -> Result<LineOrder> {
        match *self {
            AttributeValue::LineOrder(value) => Ok(value),
            _ => Err(invalid_type())
        }
    }

    /// Return `Ok(TileDescription)` if this attribute is a tile description.
    pub fn to_tile_description(&self) -> Result<TileDescription> {
        match *self {
            AttributeValue::TileDescription(value) => Ok(value),
            _ => Err(invalid_type())
        }
    }

    /// Return `Ok(Vec2<f32>)` if this attribute is a float vector.
    pub fn to_float_vec2(&self) -> Result<Vec2<f32>> {
        match *self {
            AttributeValue::FloatVec2(value) => Ok(value),
            _ => Err(invalid_type())
        }
    }
}


/// Contains string literals identifying the type of an attribute.
pub mod type_names {
    macro_rules! define_attribute_type_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte-string name of this attribute type as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_attribute_type_names! {
        I32BOX2:        b"box2i",
        F32BOX2:        b"box2f",
        I32:            b"int",
        F32:            b"float",
        F64:            b"double",
        RATIONAL:       b"rational",
        TIME_CODE:      b"timecode",
        I32VEC2:        b"v2i",
        F32VEC2:        b"v2f",
        F64VEC2:        b"v2d",
        I32VEC3:        b"v3i",
        F32VEC3:        b"v3f",
        F64VEC3:        b"v3d",
        CHANNEL_LIST:   b"chlist",
        CHROMATICITIES: b"chromaticities",
        COMPRESSION:    b"compression",
        ENVIRONMENT_MAP:b"envmap",
        KEY_CODE:       b"keycode",
        LINE_ORDER:     b"lineOrder",
        F32MATRIX3X3:   b"m33f",
        F32MATRIX4X4:   b"m44f",
        F64MATRIX3X3:   b"m33d",
        F64MATRIX4X4:   b"m44d",
        PREVIEW:        b"preview",
        TEXT:           b"string",
        TEXT_VECTOR:    b"stringvector",
        FLOAT_VECTOR:   b"floatvector",
        TILES:          b"tiledesc"
    }
}

/// Contains string literals identifying the names of standard attributes.
pub mod standard_names {
    macro_rules! define_standard_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte-string name of this standard attribute as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_standard_names! {
        CHANNELS:             b"channels",
        COMPRESSION:          b"compression",
        DATA_WINDOW:          b"dataWindow",
        DISPLAY_WINDOW:       b"displayWindow",
        LINE_ORDER:           b"lineOrder",
        PIXEL_ASPECT:         b"pixelAspectRatio",
        WINDOW_CENTER:        b"screenWindowCenter",
        WINDOW_WIDTH:         b"screenWindowWidth",
        TILES:                b"tiles",
        NAME:                 b"name",
        BLOCK_TYPE:           b"type",
        VERSION:              b"version",
        CHUNK_COUNT:          b"chunkCount",
        MAX_SAMPLES:          b"maxSamplesPerPixel",
        DWA_COMPRESSION_LEVEL:b"dwaCompressionLevel",
        ZIP_COMPRESSION_LEVEL:b"zipCompressionLevel"
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use smallvec::smallvec;

    fn roundtrip(attribute: Attribute) {
        let mut bytes = Vec::new();
        attribute.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), attribute.byte_size());

        let mut read = PeekRead::new(Cursor::new(bytes));
        let decoded = Attribute::read(&mut read, 1024 * 1024, true).unwrap();
        assert_eq!(attribute, decoded);
    }

    #[test]
    fn attribute_roundtrips(){
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new_or_panic("B"), SampleType::F16, false),
            ChannelDescription::new(Text::new_or_panic("G"), SampleType::F16, false),
            ChannelDescription::new(Text::new_or_panic("Z"), SampleType::F32, true),
        ]);

        let attributes = vec![
            Attribute::new(Text::new_or_panic("dataWindow"), AttributeValue::IntegerBounds(
                IntegerBounds::new(Vec2(-3, 9), Vec2(100, 200))
            )),

            Attribute::new(Text::new_or_panic("channels"), AttributeValue::ChannelList(channels)),
            Attribute::new(Text::new_or_panic("pixelAspectRatio"), AttributeValue::F32(1.5)),
            Attribute::new(Text::new_or_panic("version"), AttributeValue::I32(1)),
            Attribute::new(Text::new_or_panic("longitude"), AttributeValue::F64(-63.1)),

            Attribute::new(Text::new_or_panic("tiles"), AttributeValue::TileDescription(TileDescription {
                tile_size: Vec2(64, 32),
                level_mode: LevelMode::MipMap,
                rounding_mode: RoundingMode::Up,
            })),

            Attribute::new(Text::new_or_panic("comments"), AttributeValue::Text(Text::new_or_panic("a comment with some characters"))),

            Attribute::new(Text::new_or_panic("multiView"), AttributeValue::TextVector(vec![
                Text::new_or_panic("left"),
                Text::new_or_panic("right"),
            ])),

            Attribute::new(Text::new_or_panic("fieldOfView"), AttributeValue::FloatVector(vec![ 0.2, 0.5, -1.0 ])),

            Attribute::new(Text::new_or_panic("chromaticities"), AttributeValue::Chromaticities(Chromaticities {
                red: Vec2(0.64, 0.33), green: Vec2(0.3, 0.6),
                blue: Vec2(0.15, 0.06), white: Vec2(0.3127, 0.329),
            })),

            Attribute::new(Text::new_or_panic("keycode"), AttributeValue::KeyCode(KeyCode {
                film_manufacturer_code: 2, film_type: 8, film_roll_prefix: 1,
                count: 7, perforation_offset: 0, perforations_per_frame: 4, perforations_per_count: 64,
            })),

            Attribute::new(Text::new_or_panic("previewImage"), AttributeValue::Preview(Preview {
                size: Vec2(2, 2),
                pixel_data: vec![0; 2 * 2 * 4],
            })),

            Attribute::new(Text::new_or_panic("customUserData"), AttributeValue::Opaque {
                kind: Text::new_or_panic("mystery"),
                bytes: vec![1, 2, 3, 4, 5],
            }),
        ];

        for attribute in attributes {
            roundtrip(attribute);
        }
    }

    #[test]
    fn unknown_attribute_type_roundtrips_as_opaque(){
        let mut bytes = Vec::new();
        Attribute::new(
            Text::new_or_panic("custom"),
            AttributeValue::Opaque { kind: Text::new_or_panic("mystery"), bytes: vec![9, 9, 9] }
        ).write(&mut bytes).unwrap();

        let mut read = PeekRead::new(Cursor::new(bytes.clone()));
        let decoded = Attribute::read(&mut read, 1024, true).unwrap();

        let mut bytes_again = Vec::new();
        decoded.write(&mut bytes_again).unwrap();
        assert_eq!(bytes, bytes_again);
    }

    #[test]
    fn malformed_known_attribute_is_kept_opaque_when_tolerant(){
        // a "box2i" attribute with a truncated payload of 3 bytes
        let mut bytes = Vec::new();
        Text::new_or_panic("dataWindow").write_null_terminated(&mut bytes).unwrap();
        Text::new_or_panic("box2i").write_null_terminated(&mut bytes).unwrap();
        3_i32.write(&mut bytes).unwrap();
        u8::write_slice(&mut bytes, &[1, 2, 3]).unwrap();

        let mut read = PeekRead::new(Cursor::new(bytes.clone()));
        let tolerant = Attribute::read(&mut read, 1024, false).unwrap();
        match tolerant.value {
            AttributeValue::Opaque { ref kind, ref bytes } => {
                assert_eq!(kind, &Text::new_or_panic("box2i"));
                assert_eq!(bytes.as_slice(), &[1, 2, 3]);
            },
            _ => panic!("expected opaque fallback value"),
        }

        let mut read = PeekRead::new(Cursor::new(bytes));
        assert!(Attribute::read(&mut read, 1024, true).is_err());
    }

    #[test]
    fn channel_list_stays_sorted(){
        let mut channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new_or_panic("Z"), SampleType::F32, true),
            ChannelDescription::new(Text::new_or_panic("A"), SampleType::F16, true),
            ChannelDescription::new(Text::new_or_panic("R"), SampleType::F16, false),
        ]);

        let names: Vec<_> = channels.list.iter().map(|chan| chan.name.to_string()).collect();
        assert_eq!(names, ["A", "R", "Z"]);

        channels.insert(ChannelDescription::new(Text::new_or_panic("G"), SampleType::F16, false)).unwrap();
        let names: Vec<_> = channels.list.iter().map(|chan| chan.name.to_string()).collect();
        assert_eq!(names, ["A", "G", "R", "Z"]);

        assert!(channels.insert(ChannelDescription::new(Text::new_or_panic("G"), SampleType::F32, false)).is_err());
        assert_eq!(channels.bytes_per_pixel, 2 + 2 + 2 + 4);
    }

    #[test]
    fn subsampled_resolution(){
        let mut channel = ChannelDescription::new(Text::new_or_panic("Y"), SampleType::F16, false);
        channel.sampling = Vec2(2, 2);

        assert_eq!(channel.subsampled_resolution(Vec2(5, 4)), Vec2(3, 2));
        assert_eq!(channel.subsampled_resolution(Vec2(4, 4)), Vec2(2, 2));
    }
}
