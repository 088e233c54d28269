
//! The byte storage a context operates on.
//! Files and in-memory buffers are provided here; any other storage
//! can participate by implementing the [`Backend`] trait.

use std::fs::File;
use std::io::{Read as _, Seek, SeekFrom, Write as _};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::*;


/// Random-access byte storage for one exr file.
///
/// All methods take a shared reference: implementations guard their own
/// internal state. When [`Backend::stateless_read`] returns true, concurrent
/// `read_at` calls proceed without any serialization, and a context
/// will read chunks from multiple threads simultaneously.
pub trait Backend: std::fmt::Debug + Send + Sync {

    /// The current total byte count of the storage.
    fn byte_size(&self) -> Result<u64>;

    /// Read bytes starting at the absolute position into the buffer.
    /// Returns the number of bytes read, which is less than the buffer
    /// length only at the end of the storage.
    fn read_at(&self, position: u64, buffer: &mut [u8]) -> Result<usize>;

    /// Write all bytes at the absolute position,
    /// growing the storage where necessary.
    fn write_at(&self, _position: u64, _bytes: &[u8]) -> UnitResult {
        Err(Error::new(ErrorKind::NotOpenWrite, "backend does not support writing"))
    }

    /// Persist all written bytes.
    fn flush(&self) -> UnitResult {
        Ok(())
    }

    /// Whether concurrent `read_at` calls are safe without serialization.
    fn stateless_read(&self) -> bool {
        false
    }

    /// Fill the whole buffer, erroring when the storage ends too early.
    fn read_exact_at(&self, position: u64, buffer: &mut [u8]) -> UnitResult {
        let mut filled = 0;

        while filled < buffer.len() {
            let count = self.read_at(position + usize_to_u64(filled), &mut buffer[filled ..])?;
            if count == 0 {
                return Err(Error::new(ErrorKind::ReadIo, "unexpected end of file"));
            }

            filled += count;
        }

        Ok(())
    }
}


/// A backend reading and writing an ordinary file.
/// Access is serialized internally, as the operating system
/// file cursor is shared state.
#[derive(Debug)]
pub struct FileBackend {
    file: Mutex<File>,
}

impl FileBackend {

    /// Open an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)
            .map_err(|error| Error::new(ErrorKind::FileAccess, error.to_string()))?;

        Ok(FileBackend { file: Mutex::new(file) })
    }

    /// Create or truncate a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::options().read(true).write(true).create(true).truncate(true).open(path)
            .map_err(|error| Error::new(ErrorKind::FileAccess, error.to_string()))?;

        Ok(FileBackend { file: Mutex::new(file) })
    }

    /// Open an existing file for reading and in-place modification.
    pub fn open_read_write(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::options().read(true).write(true).open(path)
            .map_err(|error| Error::new(ErrorKind::FileAccess, error.to_string()))?;

        Ok(FileBackend { file: Mutex::new(file) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, File>> {
        self.file.lock().map_err(|_| Error::new(ErrorKind::Unknown, "file lock was poisoned"))
    }
}

impl Backend for FileBackend {
    fn byte_size(&self) -> Result<u64> {
        let file = self.lock()?;
        let length = file.metadata().map_err(Error::read_io)?.len();
        Ok(length)
    }

    fn read_at(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(position)).map_err(Error::read_io)?;

        let mut filled = 0;
        while filled < buffer.len() {
            match file.read(&mut buffer[filled ..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(Error::read_io(error)),
            }
        }

        Ok(filled)
    }

    fn write_at(&self, position: u64, bytes: &[u8]) -> UnitResult {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(position)).map_err(Error::write_io)?;
        file.write_all(bytes).map_err(Error::write_io)?;
        Ok(())
    }

    fn flush(&self) -> UnitResult {
        let mut file = self.lock()?;
        file.flush().map_err(Error::write_io)?;
        file.sync_all().map_err(Error::write_io)?;
        Ok(())
    }
}


/// A read-only backend over a byte buffer.
/// Reads are stateless, so chunks can be read from any number
/// of threads simultaneously.
#[derive(Debug)]
pub struct MemoryBackend {
    bytes: Vec<u8>,
}

impl MemoryBackend {

    /// Wrap the bytes of an already loaded file.
    pub fn new(bytes: Vec<u8>) -> Self {
        MemoryBackend { bytes }
    }
}

impl Backend for MemoryBackend {
    fn byte_size(&self) -> Result<u64> {
        Ok(usize_to_u64(self.bytes.len()))
    }

    fn read_at(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        let start = u64_to_usize(position).min(self.bytes.len());
        let end = (start + buffer.len()).min(self.bytes.len());

        let count = end - start;
        buffer[.. count].copy_from_slice(&self.bytes[start .. end]);
        Ok(count)
    }

    fn stateless_read(&self) -> bool {
        true
    }
}


/// A growable in-memory backend that can be written to.
/// Clones share the same buffer, so the written file can be
/// inspected after the writing context has finished.
#[derive(Debug, Clone, Default)]
pub struct SharedMemoryBackend {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl SharedMemoryBackend {

    /// Create an empty shared buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current buffer contents.
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.read().expect("memory lock was poisoned").clone()
    }
}

impl Backend for SharedMemoryBackend {
    fn byte_size(&self) -> Result<u64> {
        let bytes = self.bytes.read().map_err(|_| Error::new(ErrorKind::Unknown, "memory lock was poisoned"))?;
        Ok(usize_to_u64(bytes.len()))
    }

    fn read_at(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        let bytes = self.bytes.read().map_err(|_| Error::new(ErrorKind::Unknown, "memory lock was poisoned"))?;

        let start = u64_to_usize(position).min(bytes.len());
        let end = (start + buffer.len()).min(bytes.len());

        let count = end - start;
        buffer[.. count].copy_from_slice(&bytes[start .. end]);
        Ok(count)
    }

    fn write_at(&self, position: u64, new_bytes: &[u8]) -> UnitResult {
        let mut bytes = self.bytes.write().map_err(|_| Error::new(ErrorKind::Unknown, "memory lock was poisoned"))?;

        let start = u64_to_usize(position);
        let end = start + new_bytes.len();

        if bytes.len() < end {
            bytes.resize(end, 0);
        }

        bytes[start .. end].copy_from_slice(new_bytes);
        Ok(())
    }

    fn stateless_read(&self) -> bool {
        true
    }
}


/// Adapts a backend to the standard sequential `Read` trait,
/// for parsing the contiguous header section of a file.
#[derive(Debug)]
pub struct SequentialReader<'b> {
    backend: &'b dyn Backend,
    position: u64,
}

impl<'b> SequentialReader<'b> {

    /// Start reading at the specified absolute position.
    pub fn new(backend: &'b dyn Backend, position: u64) -> Self {
        SequentialReader { backend, position }
    }

    /// The absolute position of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<'b> std::io::Read for SequentialReader<'b> {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        let count = self.backend.read_at(self.position, buffer)
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error.message().to_string()))?;

        self.position += usize_to_u64(count);
        Ok(count)
    }
}
