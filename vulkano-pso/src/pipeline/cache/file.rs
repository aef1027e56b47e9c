//! The on-disk format of a pipeline cache.
//!
//! A file is a fixed-size header followed by a bincode payload:
//!
//! | field          | type  |
//! |----------------|-------|
//! | magic          | `u32` |
//! | version        | `u32` |
//! | payload size   | `u64` |
//! | payload hash   | `u64` |
//! | unpacked size  | `u64` |
//!
//! Header fields are little-endian. The payload hash is the xxh3 hash of the stored payload
//! bytes. An unpacked size of 0 means the payload is stored as is; otherwise it is an LZ4 block
//! that decompresses to that many bytes. A file whose header does not match exactly is rejected
//! as a whole.

use crate::{
    device::DeviceProperties,
    pipeline::{compute::ComputePipelineDescription, graphics::GraphicsPipelineDescription},
    shader::{ShaderCode, ShaderHash},
};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt, fs, io, mem::size_of, path::Path};

const MAGIC: u32 = u32::from_le_bytes(*b"VPSO");

/// Bumped whenever the payload layout changes.
pub(crate) const VERSION: u32 = 2;

#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
struct FileHeader {
    magic: u32,
    version: u32,
    payload_size: u64,
    payload_hash: u64,
    unpacked_size: u64,
}

impl FileHeader {
    /// Converts every field between native and little-endian byte order. The conversion is its
    /// own inverse.
    fn swap_le(self) -> Self {
        FileHeader {
            magic: self.magic.to_le(),
            version: self.version.to_le(),
            payload_size: self.payload_size.to_le(),
            payload_hash: self.payload_hash.to_le(),
            unpacked_size: self.unpacked_size.to_le(),
        }
    }
}

/// Everything stored in a cache file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CacheFileContents {
    pub(crate) graphics: Vec<GraphicsPipelineDescription>,
    pub(crate) compute: Vec<ComputePipelineDescription>,
    pub(crate) shaders: Vec<(ShaderHash, Vec<u32>)>,
    pub(crate) driver_cache: Vec<u8>,
}

/// The largest size an LZ4 block of `compressed_len` bytes can decompress to.
fn max_lz4_unpacked_len(compressed_len: u64) -> u64 {
    compressed_len.saturating_mul(255).saturating_add(16)
}

pub(crate) fn encode(
    contents: &CacheFileContents,
    compress: bool,
) -> Result<Vec<u8>, CacheFileError> {
    let mut payload =
        bincode::serialize(contents).map_err(|err| CacheFileError::Malformed(err.to_string()))?;
    let mut unpacked_size = 0;

    if compress && !payload.is_empty() {
        unpacked_size = payload.len() as u64;
        payload = lz4_flex::block::compress(&payload);
    }

    let header = FileHeader {
        magic: MAGIC,
        version: VERSION,
        payload_size: payload.len() as u64,
        payload_hash: xxhash_rust::xxh3::xxh3_64(&payload),
        unpacked_size,
    }
    .swap_le();

    let mut bytes = Vec::with_capacity(size_of::<FileHeader>() + payload.len());
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(&payload);

    Ok(bytes)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<CacheFileContents, CacheFileError> {
    if bytes.len() < size_of::<FileHeader>() {
        return Err(CacheFileError::Truncated);
    }

    let (header_bytes, payload) = bytes.split_at(size_of::<FileHeader>());
    let header = bytemuck::pod_read_unaligned::<FileHeader>(header_bytes).swap_le();

    if header.magic != MAGIC {
        return Err(CacheFileError::BadMagic);
    }

    if header.version != VERSION {
        return Err(CacheFileError::VersionMismatch {
            found: header.version,
        });
    }

    if header.payload_size != payload.len() as u64 {
        return Err(CacheFileError::SizeMismatch {
            expected: header.payload_size,
            found: payload.len() as u64,
        });
    }

    if header.payload_hash != xxhash_rust::xxh3::xxh3_64(payload) {
        return Err(CacheFileError::ChecksumMismatch);
    }

    let unpacked;
    let payload = match header.unpacked_size {
        0 => payload,
        size if size > max_lz4_unpacked_len(payload.len() as u64) => {
            return Err(CacheFileError::Decompression(format!(
                "{} payload bytes cannot unpack to {} bytes",
                payload.len(),
                size,
            )));
        }
        size => {
            let size = usize::try_from(size)
                .map_err(|err| CacheFileError::Decompression(err.to_string()))?;
            unpacked = lz4_flex::block::decompress(payload, size)
                .map_err(|err| CacheFileError::Decompression(err.to_string()))?;

            unpacked.as_slice()
        }
    };

    let contents: CacheFileContents =
        bincode::deserialize(payload).map_err(|err| CacheFileError::Malformed(err.to_string()))?;

    for (hash, words) in &contents.shaders {
        if ShaderHash::of_words(words) != *hash {
            return Err(CacheFileError::ShaderHashMismatch(*hash));
        }
    }

    Ok(contents)
}

/// Returns whether a driver pipeline cache blob was produced by a device with `properties`.
pub(crate) fn driver_cache_matches(properties: &DeviceProperties, data: &[u8]) -> bool {
    const HEADER_SIZE: usize = 16 + vk::UUID_SIZE;

    if data.len() < HEADER_SIZE {
        return false;
    }

    let read_u32 = |offset: usize| {
        u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    };

    read_u32(0) as usize == HEADER_SIZE
        && read_u32(4) == vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32
        && read_u32(8) == properties.vendor_id
        && read_u32(12) == properties.device_id
        && data[16..HEADER_SIZE] == properties.pipeline_cache_uuid
}

/// Writes `bytes` to a temporary file next to `path`, then renames it over `path`, so that
/// readers never observe a partially written cache.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path)
}

impl CacheFileContents {
    /// Returns the shader bytecode stored in the file.
    pub(crate) fn shader_codes(&self) -> impl Iterator<Item = ShaderCode> + '_ {
        self.shaders
            .iter()
            .map(|(_, words)| ShaderCode::from_words(words.as_slice()))
    }
}

/// Error that can happen when reading a cache file. These are never returned to the user: a
/// rejected file is logged and treated as empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CacheFileError {
    Truncated,
    BadMagic,
    VersionMismatch { found: u32 },
    SizeMismatch { expected: u64, found: u64 },
    ChecksumMismatch,
    ShaderHashMismatch(ShaderHash),
    Decompression(String),
    Malformed(String),
}

impl Error for CacheFileError {}

impl fmt::Display for CacheFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "the file is shorter than its header"),
            Self::BadMagic => write!(f, "the file is not a pipeline cache"),
            Self::VersionMismatch { found } => write!(
                f,
                "the file has version {}, but version {} is required",
                found, VERSION,
            ),
            Self::SizeMismatch { expected, found } => write!(
                f,
                "the header announces {} payload bytes, but the file holds {}",
                expected, found,
            ),
            Self::ChecksumMismatch => write!(f, "the payload checksum does not match"),
            Self::ShaderHashMismatch(hash) => {
                write!(f, "the bytecode stored for shader {} does not match its hash", hash)
            }
            Self::Decompression(message) => {
                write!(f, "the payload could not be decompressed: {}", message)
            }
            Self::Malformed(message) => write!(f, "the payload is malformed: {}", message),
        }
    }
}
