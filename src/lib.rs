
//! Read and write the chunks of OpenEXR files without any unsafe code.
//!
//! This crate operates below the level of image objects:
//! it parses and writes file meta data, locates and transcodes
//! individual compressed pixel chunks, and converts between the file
//! representation and caller-provided strided pixel buffers.
//!
//! The main entry points are [`context::Context`] for opening a file,
//! [`decode::DecodePipeline`] for reading chunks,
//! and [`encode::EncodePipeline`] for writing chunks.

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
    clippy::pedantic,
)]

#![forbid(unsafe_code)]

pub mod io; // public to allow for custom attribute byte parsing

pub mod math;
pub mod error;
pub mod meta;
pub mod chunk;
pub mod samples;
pub mod compression;
pub mod context;
pub mod encode;
pub mod decode;


/// Re-exports of all types commonly required
/// for reading and writing chunks of an exr file.
pub mod prelude {

    // main exports
    pub use crate::context::{Context, ContextMode, ContextOptions};
    pub use crate::context::backend::{Backend, FileBackend, MemoryBackend, SharedMemoryBackend};
    pub use crate::decode::{ChannelTarget, DecodePipeline};
    pub use crate::encode::{ChannelSource, DeepChunkSource, EncodePipeline};

    // secondary data types
    pub use crate::chunk::{ChunkInfo, ChunkLocator};
    pub use crate::compression::Compression;
    pub use crate::meta::attribute::{
        Attribute, AttributeValue, ChannelDescription, ChannelList,
        IntegerBounds, LevelMode, LineOrder, SampleType, Text, TileDescription,
    };
    pub use crate::meta::header::{Header, Storage};
    pub use crate::meta::MetaData;
    pub use crate::samples::Sample;

    pub use crate::error::{Error, ErrorKind, Result, UnitResult};
    pub use crate::math::{RoundingMode, Vec2};

    // re-export external stuff
    pub use half::f16;
}
