
//! The context owns all file-level state:
//! the storage backend, the parsed headers, and the chunk offset tables.
//! A context is created for either reading or writing,
//! used by any number of chunk pipelines, and then torn down with `finish`.

pub mod backend;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::chunk::{self, ChunkInfo, ChunkLeader, ChunkSizes};
use crate::compression::{compress_max_buffer_size, CodecOptions};
use crate::error::*;
use crate::io::{Data, PeekRead};
use crate::math::Vec2;
use crate::meta::attribute::{Attribute, AttributeValue, ChannelList, IntegerBounds, LineOrder, Text};
use crate::meta::header::{Header, Storage};
use crate::meta::{magic_number, MetaData, OffsetTables, Requirements};

use backend::{Backend, FileBackend, MemoryBackend, SequentialReader};


/// Tuning values for creating a context.
#[derive(Debug, Clone)]
pub struct ContextOptions {

    /// Reject any files that could confuse other exr readers,
    /// even if this library could read them. When disabled,
    /// malformed attributes are preserved as opaque bytes
    /// instead of failing the whole file.
    pub strict: bool,

    /// Reject files with a data window larger than this, as a
    /// protection against allocation attacks from malformed headers.
    pub max_image_size: Option<Vec2<usize>>,

    /// Reject files with single tiles larger than this.
    pub max_tile_size: Option<Vec2<usize>>,

    /// The deflate effort used where a part does not override it.
    pub default_zip_compression_level: u8,

    /// The dwa quantization base error used where a part does not override it.
    pub default_dwa_compression_level: f32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        ContextOptions {
            strict: false,
            max_image_size: None,
            max_tile_size: None,
            default_zip_compression_level: 4,
            default_dwa_compression_level: 45.0,
        }
    }
}


/// What a context was created for.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ContextMode {

    /// The context reads an existing file.
    Read,

    /// The context writes a new file.
    Write,

    /// The context reads an existing file and rewrites
    /// attribute values in place, without moving any pixel data.
    Update,

    /// The context writes a temporary file which replaces
    /// the destination only when `finish` succeeds.
    Temporary,
}

/// How far a writing context has progressed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum WriteProgress {

    /// Headers may still be added and modified.
    Attributes,

    /// The headers are flushed and pixel chunks are being written.
    WritingData {

        /// Where the chunk offset tables live in the file.
        chunk_table_position: u64,

        /// Where the next chunk will be written.
        next_chunk_position: u64,
    },

    /// All data including the offset tables has been written.
    Finished,
}


/// Converts the bytes of an attribute with a user-defined type
/// between its file representation and its in-memory representation.
pub struct AttributeHandler {

    /// The attribute type name this handler is responsible for.
    pub type_name: Text,

    /// Convert file bytes to the in-memory representation.
    pub unpack: Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>,

    /// Convert the in-memory representation back to file bytes.
    pub pack: Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>,
}

impl std::fmt::Debug for AttributeHandler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("AttributeHandler")
            .field("type_name", &self.type_name)
            .finish()
    }
}


#[derive(Debug)]
struct ContextState {
    chunk_tables: OffsetTables,
    progress: WriteProgress,

    /// Set after a write failure that leaves the offset tables unflushable.
    /// Only `finish` remains valid on a poisoned context.
    poisoned: bool,

    /// The message of the most recent error, for later inspection.
    last_error: Option<String>,
}


/// An open exr file.
#[derive(Debug)]
pub struct Context {
    file_name: Option<PathBuf>,

    /// In temporary mode, the path of the backing file
    /// that is renamed over `file_name` on success.
    temporary_file_name: Option<PathBuf>,

    backend: Box<dyn Backend>,
    mode: ContextMode,
    options: ContextOptions,
    meta: MetaData,
    handlers: Vec<AttributeHandler>,

    /// The byte count of the serialized header section,
    /// which in-place updates must not change.
    header_block_size: u64,

    state: Mutex<ContextState>,
}

impl Context {

    /// Open the file at the specified path for reading.
    /// Parses all headers and loads the chunk offset tables,
    /// reconstructing them from the chunk stream where they are damaged.
    pub fn start_read(path: impl AsRef<Path>, options: ContextOptions) -> Result<Self> {
        let backend = FileBackend::open(path.as_ref())?;
        let mut context = Self::start_read_from_backend(Box::new(backend), options)?;
        context.file_name = Some(path.as_ref().to_path_buf());
        Ok(context)
    }

    /// Read a file that is already loaded into memory.
    pub fn start_read_from_bytes(bytes: Vec<u8>, options: ContextOptions) -> Result<Self> {
        Self::start_read_from_backend(Box::new(MemoryBackend::new(bytes)), options)
    }

    /// Read a file from any user-provided storage.
    pub fn start_read_from_backend(backend: Box<dyn Backend>, options: ContextOptions) -> Result<Self> {
        let file_size = backend.byte_size()?;

        let (meta, chunk_tables) = {
            let mut read = PeekRead::new(SequentialReader::new(backend.as_ref(), 0));

            let meta = MetaData::read_from_buffered_peekable(&mut read, options.strict)?;
            Self::validate_size_limits(&meta, &options)?;

            let chunk_tables = MetaData::read_offset_tables(&mut read, &meta.headers)?;
            (meta, chunk_tables)
        };

        // parsing consumes exactly the serialized byte count,
        // so the chunk stream starts at the computed position
        let chunk_data_start = Self::offset_table_end(&meta)?;
        let header_block_size = chunk_data_start - usize_to_u64(MetaData::offset_tables_byte_size(&meta.headers)?);

        let mut context = Context {
            file_name: None,
            temporary_file_name: None,
            backend,
            mode: ContextMode::Read,
            options,
            meta,
            handlers: Vec::new(),
            header_block_size,
            state: Mutex::new(ContextState {
                chunk_tables,
                progress: WriteProgress::Finished,
                poisoned: false,
                last_error: None,
            }),
        };

        context.repair_offset_tables(chunk_data_start, file_size)?;
        Ok(context)
    }

    /// Create the file at the specified path for writing.
    /// Headers are added with [`Context::add_header`] before
    /// the first chunk is written.
    pub fn start_write(path: impl AsRef<Path>, options: ContextOptions) -> Result<Self> {
        let backend = FileBackend::create(path.as_ref())?;
        let mut context = Self::start_write_to_backend(Box::new(backend), options)?;
        context.file_name = Some(path.as_ref().to_path_buf());
        Ok(context)
    }

    /// Write a file to any user-provided storage.
    pub fn start_write_to_backend(backend: Box<dyn Backend>, options: ContextOptions) -> Result<Self> {
        Ok(Context {
            file_name: None,
            temporary_file_name: None,
            backend,
            mode: ContextMode::Write,
            options,
            meta: MetaData { requirements: Requirements::default(), headers: Default::default() },
            handlers: Vec::new(),
            header_block_size: 0,
            state: Mutex::new(ContextState {
                chunk_tables: Default::default(),
                progress: WriteProgress::Attributes,
                poisoned: false,
                last_error: None,
            }),
        })
    }

    /// Open the file at the specified path for in-place attribute updates.
    /// Pixel chunks can be read but not rewritten; attribute values can be
    /// replaced as long as their serialized size does not change.
    pub fn start_update(path: impl AsRef<Path>, options: ContextOptions) -> Result<Self> {
        let backend = FileBackend::open_read_write(path.as_ref())?;
        let mut context = Self::start_read_from_backend(Box::new(backend), options)?;

        context.mode = ContextMode::Update;
        context.file_name = Some(path.as_ref().to_path_buf());
        Ok(context)
    }

    /// Replace the value of an existing attribute of an update context.
    /// The new value must have the same type and the same serialized size
    /// as the existing one, so that no other file content has to move.
    pub fn update_attribute(&mut self, part_index: usize, name: &[u8], value: AttributeValue) -> UnitResult {
        if self.mode != ContextMode::Update {
            return Err(self.remember_error(Error::from_kind(ErrorKind::NotOpenWrite)));
        }

        let header = self.meta.headers.get_mut(part_index)
            .ok_or_else(|| Error::new(ErrorKind::IncorrectPart, "no such part"))?;

        let attribute = header.attributes_mut()
            .find(|attribute| attribute.name.as_slice() == name)
            .ok_or_else(|| Error::new(ErrorKind::NoAttrByName, "no attribute with that name"))?;

        if attribute.value.kind_name() != value.kind_name() {
            return Err(Error::new(ErrorKind::AttrTypeMismatch, "attribute type mismatch"));
        }

        if attribute.value.byte_size() != value.byte_size() {
            return Err(Error::new(ErrorKind::ModifySizeChange, "update would change the attribute size"));
        }

        attribute.value = value;
        Ok(())
    }

    /// Write to a temporary file next to the specified path.
    /// The destination is only replaced when `finish` succeeds,
    /// so a crash never leaves a half-written file behind.
    pub fn start_temporary(path: impl AsRef<Path>, options: ContextOptions) -> Result<Self> {
        let path = path.as_ref();

        let mut temporary_name = path.as_os_str().to_os_string();
        temporary_name.push(format!(".tmp{}", std::process::id()));
        let temporary_path = PathBuf::from(temporary_name);

        let backend = FileBackend::create(&temporary_path)?;
        let mut context = Self::start_write_to_backend(Box::new(backend), options)?;

        context.mode = ContextMode::Temporary;
        context.file_name = Some(path.to_path_buf());
        context.temporary_file_name = Some(temporary_path);
        Ok(context)
    }

    /// Flush everything and tear the context down.
    /// For writing contexts, this writes the chunk offset tables
    /// and, in temporary mode, moves the file to its destination.
    pub fn finish(self) -> UnitResult {
        if self.mode == ContextMode::Read {
            return Ok(());
        }

        if self.mode == ContextMode::Update {
            // rewrite the header section in place.
            // the attribute sizes are unchanged, so everything behind it stays put
            let meta = Self::pack_opaque_attributes(self.meta.clone(), &self.handlers)?;

            let mut header_bytes = Vec::new();
            meta.write_validating_to_buffered(&mut header_bytes, self.options.strict)?;

            if usize_to_u64(header_bytes.len()) != self.header_block_size {
                return Err(Error::new(ErrorKind::ModifySizeChange, "updated headers do not fit the original header section"));
            }

            self.backend.write_at(0, &header_bytes)?;
            self.backend.flush()?;
            return Ok(());
        }

        let mut state = self.lock_state()?;

        if state.poisoned {
            // the offset tables cannot be completed anymore.
            // the file is left with zeroed table entries,
            // which readers repair by scanning the chunk stream
            return Ok(());
        }

        if state.progress == WriteProgress::Attributes && !self.meta.headers.is_empty() {
            Self::flush_headers(&*self.backend, &self.meta, &self.handlers, self.options.strict, &mut state)?;
        }

        if let WriteProgress::WritingData { chunk_table_position, .. } = state.progress {
            let mut table_bytes = Vec::new();
            for table in &state.chunk_tables {
                u64::write_slice(&mut table_bytes, table)?;
            }

            self.backend.write_at(chunk_table_position, &table_bytes)?;
            state.progress = WriteProgress::Finished;
        }

        self.backend.flush()?;
        drop(state);

        if let (Some(temporary), Some(destination)) = (&self.temporary_file_name, &self.file_name) {
            std::fs::rename(temporary, destination)
                .map_err(|error| Error::new(ErrorKind::FileAccess, error.to_string()))?;
        }

        Ok(())
    }


    /// The path of the file, if this context operates on a file.
    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    /// What this context was created for.
    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    /// The version word of the file: the format version
    /// in the low byte and the feature flags above it.
    pub fn version(&self) -> u32 {
        let mut bytes = Vec::with_capacity(4);
        self.requirements().write(&mut bytes).expect("write to in-memory buffer failed");
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn requirements(&self) -> Requirements {
        match self.mode {
            // preserve the exact flags of the existing file
            ContextMode::Read | ContextMode::Update => self.meta.requirements,
            _ => Requirements::infer(&self.meta.headers).unwrap_or_default(),
        }
    }

    /// The number of parts in this file.
    pub fn part_count(&self) -> usize {
        self.meta.headers.len()
    }

    /// The header of the specified part.
    pub fn header(&self, part_index: usize) -> Result<&Header> {
        self.meta.headers.get(part_index)
            .ok_or_else(|| Error::new(ErrorKind::IncorrectPart, "no such part"))
    }

    /// How the pixel data of the specified part is laid out in the file.
    pub fn part_storage(&self, part_index: usize) -> Result<Storage> {
        self.header(part_index)?.storage()
    }

    /// The pixel rectangle of the specified part.
    pub fn data_window(&self, part_index: usize) -> Result<IntegerBounds> {
        self.header(part_index)?.data_window()
    }

    /// The channels of the specified part.
    pub fn channels(&self, part_index: usize) -> Result<&ChannelList> {
        self.header(part_index)?.channels()
    }

    /// Whether the specified part stores a channel with that name.
    pub fn has_channel(&self, part_index: usize, name: &[u8]) -> bool {
        self.channels(part_index)
            .map(|channels| channels.find_by_name(name).is_some())
            .unwrap_or(false)
    }

    /// The chunk ordering of the specified part.
    pub fn line_order(&self, part_index: usize) -> Result<LineOrder> {
        self.header(part_index)?.line_order()
    }

    /// The number of attributes of the specified part.
    pub fn attr_count(&self, part_index: usize) -> Result<usize> {
        Ok(self.header(part_index)?.len())
    }

    /// The attribute at the specified position in insertion order.
    pub fn get_attr_by_index(&self, part_index: usize, attribute_index: usize) -> Result<&Attribute> {
        self.header(part_index)?.get_by_index(attribute_index)
            .ok_or_else(|| Error::new(ErrorKind::ArgumentOutOfRange, "attribute index out of range"))
    }

    /// The attribute with the specified name.
    pub fn get_attr_by_name(&self, part_index: usize, name: &[u8]) -> Result<&Attribute> {
        self.header(part_index)?.get(name)
    }

    /// Add a part to a writing context.
    /// Returns the index of the new part.
    /// Fails after the headers have been flushed to the file.
    pub fn add_header(&mut self, header: Header) -> Result<usize> {
        if self.mode == ContextMode::Read || self.mode == ContextMode::Update {
            return Err(self.remember_error(Error::from_kind(ErrorKind::NotOpenWrite)));
        }

        {
            let state = self.lock_state()?;
            if state.progress != WriteProgress::Attributes {
                return Err(Error::from_kind(ErrorKind::AlreadyWroteAttrs));
            }
        }

        let chunk_count = header.chunk_count()?;

        self.meta.headers.push(header);

        let validation = {
            let requirements = self.requirements();
            let meta = &self.meta;
            Self::validate_size_limits(meta, &self.options)
                .and_then(|_| meta.headers.last().unwrap().validate(&requirements, self.options.max_image_size, self.options.strict))
        };

        if let Err(error) = validation {
            self.meta.headers.pop();
            return Err(self.remember_error(error));
        }

        let mut state = self.lock_state()?;
        state.chunk_tables.push(vec![0_u64; chunk_count]);
        Ok(self.meta.headers.len() - 1)
    }

    /// Whether the chunk offset table of the specified part is complete,
    /// with every chunk located inside the file.
    pub fn chunk_table_valid(&self, part_index: usize) -> Result<bool> {
        self.header(part_index)?;

        let file_size = self.backend.byte_size()?;
        let state = self.lock_state()?;

        Ok(state.chunk_tables[part_index].iter()
            .all(|&offset| offset != 0 && offset < file_size))
    }

    /// Allow or disallow attribute names and channel names
    /// longer than 31 bytes. Must be decided before the headers
    /// are flushed to the file.
    pub fn set_longname_support(&mut self, support: bool) -> UnitResult {
        {
            let state = self.lock_state()?;
            if self.mode != ContextMode::Read && state.progress != WriteProgress::Attributes {
                return Err(Error::from_kind(ErrorKind::AlreadyWroteAttrs));
            }
        }

        self.meta.requirements.set_long_names(support);
        Ok(())
    }

    /// Register a converter for attributes of a user-defined type.
    /// On reading contexts, matching opaque attributes are unpacked
    /// immediately. Registration is not possible while other threads
    /// use this context, which the mutable reference enforces.
    pub fn register_attribute_handler(&mut self, handler: AttributeHandler) -> UnitResult {
        for header in self.meta.headers.iter_mut() {
            for attribute in header.attributes_mut() {
                if let AttributeValue::Opaque { kind, bytes } = &mut attribute.value {
                    if kind == &handler.type_name {
                        *bytes = (handler.unpack)(bytes)?;
                    }
                }
            }
        }

        self.handlers.push(handler);
        Ok(())
    }

    /// The message of the most recent error of this context, if any.
    pub fn last_error_message(&self) -> Option<String> {
        self.state.lock().ok()?.last_error.clone()
    }

    /// A human-readable description of the file structure.
    pub fn print_context_info(&self) -> String {
        let mut info = String::new();

        let name = self.file_name.as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<stream>".to_string());

        let _ = writeln!(info, "file: {}", name);
        let _ = writeln!(info, "version word: {:#010x}", self.version());
        let _ = writeln!(info, "parts: {}", self.part_count());

        for (index, header) in self.meta.headers.iter().enumerate() {
            let _ = writeln!(info, "part {}:", index);

            if let Ok(name) = header.name() {
                let _ = writeln!(info, "    name: {}", name);
            }

            if let Ok(storage) = header.storage() {
                let _ = writeln!(info, "    storage: {:?}", storage);
            }

            if let Ok(window) = header.data_window() {
                let _ = writeln!(
                    info, "    data window: {} x {} at ({}, {})",
                    window.size.x(), window.size.y(),
                    window.position.x(), window.position.y()
                );
            }

            if let Ok(compression) = header.compression() {
                let _ = writeln!(info, "    compression: {}", compression.name());
            }

            if let Ok(channels) = header.channels() {
                let names: Vec<String> = channels.list.iter()
                    .map(|channel| channel.name.to_string())
                    .collect();

                let _ = writeln!(info, "    channels: {}", names.join(", "));
            }

            let _ = writeln!(info, "    attributes: {}", header.len());
        }

        info
    }


    /// Whether chunk leaders in this file carry a part number.
    pub(crate) fn is_multipart(&self) -> bool {
        self.requirements().is_multipart()
    }

    /// The codec tuning for the specified part, combining the
    /// part's attributes with the context defaults.
    pub(crate) fn codec_options(&self, part_index: usize) -> Result<CodecOptions> {
        let header = self.header(part_index)?;

        let zip_compression_level = header.zip_compression_level()
            .map(|level| level.clamp(1, 9) as u8)
            .unwrap_or(self.options.default_zip_compression_level);

        let dwa_compression_level = header.dwa_compression_level()
            .unwrap_or(self.options.default_dwa_compression_level);

        Ok(CodecOptions {
            zip_compression_level,
            dwa_compression_level,
            strict: self.options.strict,
        })
    }

    /// Read and validate the leader of the specified chunk, and its
    /// compressed payloads, into the provided reusable buffers.
    pub(crate) fn read_chunk_into(
        &self,
        part_index: usize,
        chunk: &ChunkInfo,
        compressed: &mut Vec<u8>,
        compressed_sample_table: &mut Vec<u8>,
    ) -> Result<ChunkLeader>
    {
        if self.mode != ContextMode::Read && self.mode != ContextMode::Update {
            return Err(self.remember_error(Error::from_kind(ErrorKind::NotOpenRead)));
        }

        let header = self.header(part_index)?;

        let offset = {
            let state = self.lock_state()?;

            *state.chunk_tables.get(part_index)
                .and_then(|table| table.get(chunk.index))
                .ok_or_else(|| Error::new(ErrorKind::IncorrectChunk, "chunk index out of range"))?
        };

        if offset == 0 {
            // the offset table had no valid entry and the chunk stream
            // scan could not locate this chunk either
            return Err(self.remember_error(Error::new(ErrorKind::BadChunkLeader, "chunk is missing from the file")));
        }

        let mut reader = SequentialReader::new(self.backend.as_ref(), offset);
        let leader = ChunkLeader::read(&mut reader, self.is_multipart(), &self.meta.headers)
            .map_err(|error| self.remember_error(Error::new(ErrorKind::BadChunkLeader, error.message().to_string())))?;

        if leader.part_number != part_index {
            return Err(self.remember_error(Error::new(ErrorKind::IncorrectPart, "chunk belongs to another part")));
        }

        if leader.locator != chunk.locator {
            return Err(self.remember_error(Error::new(ErrorKind::BadChunkLeader, "chunk leader does not match its table position")));
        }

        let storage = header.storage()?;

        match leader.sizes {
            ChunkSizes::Flat { packed_size } => {
                if storage.is_deep() {
                    return Err(Error::new(ErrorKind::BadChunkLeader, "flat chunk in deep part"));
                }

                if packed_size > compress_max_buffer_size(chunk.unpacked_size) {
                    return Err(self.remember_error(Error::new(ErrorKind::BadChunkLeader, "chunk size out of range")));
                }

                compressed.resize(packed_size, 0);
                compressed_sample_table.clear();
                self.backend.read_exact_at(reader.position(), compressed)?;
            },

            ChunkSizes::Deep { packed_sample_table_size, packed_size, .. } => {
                if !storage.is_deep() {
                    return Err(Error::new(ErrorKind::BadChunkLeader, "deep chunk in flat part"));
                }

                // the deep payload size is only bounded by the file itself
                let file_size = self.backend.byte_size()?;
                let payload_end = reader.position()
                    .checked_add(usize_to_u64(packed_sample_table_size))
                    .and_then(|position| position.checked_add(usize_to_u64(packed_size)));

                match payload_end {
                    Some(end) if end <= file_size => {},
                    _ => return Err(self.remember_error(Error::new(ErrorKind::BadChunkLeader, "deep chunk sizes exceed the file"))),
                }

                compressed_sample_table.resize(packed_sample_table_size, 0);
                self.backend.read_exact_at(reader.position(), compressed_sample_table)?;

                compressed.resize(packed_size, 0);
                self.backend.read_exact_at(
                    reader.position() + usize_to_u64(packed_sample_table_size),
                    compressed,
                )?;
            },
        }

        Ok(leader)
    }

    /// Append one chunk to the file and record its offset.
    /// The first call flushes the headers; afterwards, headers
    /// can no longer change. Calls may arrive from any thread,
    /// and commit in call order.
    pub(crate) fn write_chunk(
        &self,
        part_index: usize,
        chunk: &ChunkInfo,
        sizes: ChunkSizes,
        sample_table_payload: &[u8],
        payload: &[u8],
    ) -> UnitResult
    {
        if self.mode == ContextMode::Read || self.mode == ContextMode::Update {
            return Err(self.remember_error(Error::from_kind(ErrorKind::NotOpenWrite)));
        }

        self.header(part_index)?;

        let mut state = self.lock_state()?;

        if state.poisoned {
            return Err(Error::new(ErrorKind::WriteIo, "context failed a previous write"));
        }

        if state.progress == WriteProgress::Attributes {
            if self.meta.headers.is_empty() {
                return Err(Error::from_kind(ErrorKind::HeaderNotWritten));
            }

            Self::flush_headers(&*self.backend, &self.meta, &self.handlers, self.options.strict, &mut state)?;
        }

        let (chunk_table_position, next_chunk_position) = match state.progress {
            WriteProgress::WritingData { chunk_table_position, next_chunk_position } =>
                (chunk_table_position, next_chunk_position),

            _ => return Err(Error::from_kind(ErrorKind::HeaderNotWritten)),
        };

        let leader = ChunkLeader {
            part_number: part_index,
            locator: chunk.locator,
            sizes,
        };

        let mut bytes = Vec::with_capacity(
            leader.byte_size(self.is_multipart()) + sample_table_payload.len() + payload.len()
        );

        leader.write(&mut bytes, self.is_multipart())?;
        bytes.extend_from_slice(sample_table_payload);
        bytes.extend_from_slice(payload);

        if let Err(error) = self.backend.write_at(next_chunk_position, &bytes) {
            state.poisoned = true;
            state.last_error = Some(error.message().to_string());
            return Err(error);
        }

        state.chunk_tables[part_index][chunk.index] = next_chunk_position;

        state.progress = WriteProgress::WritingData {
            chunk_table_position,
            next_chunk_position: next_chunk_position + usize_to_u64(bytes.len()),
        };

        Ok(())
    }


    /// Describe the scan line chunk of a part starting at the specified y coordinate.
    pub fn scan_line_chunk(&self, part_index: usize, y: i32) -> Result<ChunkInfo> {
        chunk::scan_line_chunk_info(self.header(part_index)?, y)
    }

    /// Describe the tile chunk of a part at the specified tile and level coordinates.
    pub fn tile_chunk(&self, part_index: usize, tile: Vec2<usize>, level: Vec2<usize>) -> Result<ChunkInfo> {
        chunk::tile_chunk_info(self.header(part_index)?, tile, level)
    }

    /// Describe the chunk of a part at the specified offset table position.
    pub fn chunk_by_index(&self, part_index: usize, chunk_index: usize) -> Result<ChunkInfo> {
        chunk::chunk_info_by_index(self.header(part_index)?, chunk_index)
    }

    /// The number of chunks of the specified part.
    pub fn chunk_count(&self, part_index: usize) -> Result<usize> {
        self.header(part_index)?.chunk_count()
    }


    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ContextState>> {
        self.state.lock().map_err(|_| Error::new(ErrorKind::Unknown, "context lock was poisoned"))
    }

    fn remember_error(&self, error: Error) -> Error {
        if let Ok(mut state) = self.state.lock() {
            state.last_error = Some(error.message().to_string());
        }

        error
    }

    fn validate_size_limits(meta: &MetaData, options: &ContextOptions) -> UnitResult {
        meta.validate(options.max_image_size, options.strict)?;

        if let Some(max_tile_size) = options.max_tile_size {
            for header in &meta.headers {
                if let Ok(tiles) = header.tiles() {
                    if tiles.tile_size.width() > max_tile_size.width()
                        || tiles.tile_size.height() > max_tile_size.height()
                    {
                        return Err(Error::new(ErrorKind::InvalidAttr, "tile size exceeds limit"));
                    }
                }
            }
        }

        Ok(())
    }

    /// The absolute position of the first chunk, which is
    /// where the headers and the offset tables end.
    fn offset_table_end(meta: &MetaData) -> Result<u64> {
        let mut header_bytes = magic_number::BYTES.len() + 4;

        for header in &meta.headers {
            header_bytes += header.byte_size();
        }

        if meta.requirements.is_multipart() {
            header_bytes += 1; // end-of-headers marker
        }

        Ok(usize_to_u64(header_bytes + MetaData::offset_tables_byte_size(&meta.headers)?))
    }

    /// Zero out implausible table entries, and scan the chunk stream
    /// to locate the chunks of damaged tables. Reading a chunk that
    /// could not be located reports `BadChunkLeader` later on.
    fn repair_offset_tables(&mut self, chunk_data_start: u64, file_size: u64) -> UnitResult {
        let state = self.state.get_mut()
            .map_err(|_| Error::new(ErrorKind::Unknown, "context lock was poisoned"))?;

        let mut any_invalid = false;
        for table in state.chunk_tables.iter_mut() {
            for offset in table.iter_mut() {
                if *offset == 0 || *offset >= file_size {
                    *offset = 0;
                    any_invalid = true;
                }
            }
        }

        if !any_invalid {
            return Ok(());
        }

        // never fails: chunks that cannot be located stay zero
        let mut position = chunk_data_start;

        while position < file_size {
            let mut reader = SequentialReader::new(self.backend.as_ref(), position);

            let leader = match ChunkLeader::read(&mut reader, self.meta.requirements.is_multipart(), &self.meta.headers) {
                Ok(leader) => leader,
                Err(_) => break,
            };

            let header = match self.meta.headers.get(leader.part_number) {
                Some(header) => header,
                None => break,
            };

            let info = match chunk::chunk_info(header, leader.locator) {
                Ok(info) => info,
                Err(_) => break,
            };

            let payload_size = match leader.sizes {
                ChunkSizes::Flat { packed_size } => packed_size,
                ChunkSizes::Deep { packed_sample_table_size, packed_size, .. } =>
                    packed_sample_table_size + packed_size,
            };

            let next_position = reader.position() + usize_to_u64(payload_size);
            if next_position > file_size {
                break;
            }

            let entry = &mut state.chunk_tables[leader.part_number][info.index];
            if *entry == 0 {
                *entry = position;
            }

            position = next_position;
        }

        Ok(())
    }

    /// Serialize the headers and reserve the zeroed chunk offset tables.
    /// Afterwards, the header section of the file is sealed.
    fn flush_headers(
        backend: &dyn Backend,
        meta: &MetaData,
        handlers: &[AttributeHandler],
        strict: bool,
        state: &mut ContextState,
    ) -> UnitResult
    {
        // pack user attribute types with their registered handlers,
        // on a copy, since the in-memory form stays unpacked
        let meta = Self::pack_opaque_attributes(
            MetaData {
                requirements: Requirements::infer(&meta.headers).map(|mut inferred| {
                    inferred.set_long_names(inferred.has_long_names() || meta.requirements.has_long_names());
                    inferred
                })?,

                headers: meta.headers.clone(),
            },
            handlers,
        )?;

        let mut header_bytes = Vec::new();
        meta.write_validating_to_buffered(&mut header_bytes, strict)?;

        let chunk_table_position = usize_to_u64(header_bytes.len());
        let table_byte_size = MetaData::offset_tables_byte_size(&meta.headers)?;

        // reserve the chunk table region with zeroes,
        // so that an interrupted write stays recoverable
        header_bytes.resize(header_bytes.len() + table_byte_size, 0);

        backend.write_at(0, &header_bytes)?;

        state.progress = WriteProgress::WritingData {
            chunk_table_position,
            next_chunk_position: chunk_table_position + usize_to_u64(table_byte_size),
        };

        Ok(())
    }

    /// Convert the in-memory representation of opaque attributes
    /// back to their file representation using the registered handlers.
    fn pack_opaque_attributes(mut meta: MetaData, handlers: &[AttributeHandler]) -> Result<MetaData> {
        for header in meta.headers.iter_mut() {
            for attribute in header.attributes_mut() {
                if let AttributeValue::Opaque { kind, bytes } = &mut attribute.value {
                    if let Some(handler) = handlers.iter().find(|handler| &handler.type_name == kind) {
                        *bytes = (handler.pack)(bytes)?;
                    }
                }
            }
        }

        Ok(meta)
    }
}
