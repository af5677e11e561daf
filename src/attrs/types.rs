//! NTFS type codes and small enumerations shared across the attribute
//! engine.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum AttributeType {
    StandardInformation = 0x10,
    AttributeList = 0x20,
    FileName = 0x30,
    ObjectId = 0x40,
    SecurityDescriptor = 0x50,
    VolumeName = 0x60,
    VolumeInformation = 0x70,
    Data = 0x80,
    IndexRoot = 0x90,
    IndexAllocation = 0xA0,
    Bitmap = 0xB0,
    ReparsePoint = 0xC0,
    EaInformation = 0xD0,
    Ea = 0xE0,
    LoggedUtilityStream = 0x100,
}

pub const ATTRIBUTE_TERMINATOR: u32 = 0xFFFF_FFFF;

impl AttributeType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0x10 => Self::StandardInformation,
            0x20 => Self::AttributeList,
            0x30 => Self::FileName,
            0x40 => Self::ObjectId,
            0x50 => Self::SecurityDescriptor,
            0x60 => Self::VolumeName,
            0x70 => Self::VolumeInformation,
            0x80 => Self::Data,
            0x90 => Self::IndexRoot,
            0xA0 => Self::IndexAllocation,
            0xB0 => Self::Bitmap,
            0xC0 => Self::ReparsePoint,
            0xD0 => Self::EaInformation,
            0xE0 => Self::Ea,
            0x100 => Self::LoggedUtilityStream,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilenameNamespace {
    Posix = 0,
    Win32 = 1,
    Dos = 2,
    Win32AndDos = 3,
}

impl FilenameNamespace {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Posix),
            1 => Some(Self::Win32),
            2 => Some(Self::Dos),
            3 => Some(Self::Win32AndDos),
            _ => None,
        }
    }

    /// Ranks namespaces for the primary-name dominance rule:
    /// POSIX then Win32 then Win32&DOS83 (DOS-only never wins).
    pub fn dominance_rank(self) -> u8 {
        match self {
            FilenameNamespace::Posix => 3,
            FilenameNamespace::Win32 => 2,
            FilenameNamespace::Win32AndDos => 1,
            FilenameNamespace::Dos => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseClass {
    MountPoint,
    SymbolicLink,
    Wof,
    Generic(u32),
}

pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;
pub const IO_REPARSE_TAG_WOF: u32 = 0x8000_0017;

impl ReparseClass {
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            IO_REPARSE_TAG_MOUNT_POINT => ReparseClass::MountPoint,
            IO_REPARSE_TAG_SYMLINK => ReparseClass::SymbolicLink,
            IO_REPARSE_TAG_WOF => ReparseClass::Wof,
            other => ReparseClass::Generic(other),
        }
    }
}

/// WOF / XPRESS chunk-size variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WofAlgorithm {
    Xpress4k,
    Xpress8k,
    Xpress16k,
    Lzx,
}

impl WofAlgorithm {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(WofAlgorithm::Xpress4k),
            1 => Some(WofAlgorithm::Lzx),
            2 => Some(WofAlgorithm::Xpress8k),
            3 => Some(WofAlgorithm::Xpress16k),
            _ => None,
        }
    }

    pub fn chunk_size(self) -> Option<usize> {
        match self {
            WofAlgorithm::Xpress4k => Some(4096),
            WofAlgorithm::Xpress8k => Some(8192),
            WofAlgorithm::Xpress16k => Some(16384),
            WofAlgorithm::Lzx => None,
        }
    }
}

pub mod file_attributes {
    pub const READONLY: u32 = 0x0000_0001;
    pub const HIDDEN: u32 = 0x0000_0002;
    pub const SYSTEM: u32 = 0x0000_0004;
    pub const DIRECTORY: u32 = 0x0000_0010;
    pub const ARCHIVE: u32 = 0x0000_0020;
    pub const NORMAL: u32 = 0x0000_0080;
    pub const TEMPORARY: u32 = 0x0000_0100;
    pub const SPARSE_FILE: u32 = 0x0000_0200;
    pub const REPARSE_POINT: u32 = 0x0000_0400;
    pub const COMPRESSED: u32 = 0x0000_0800;
    pub const OFFLINE: u32 = 0x0000_1000;
    pub const NOT_CONTENT_INDEXED: u32 = 0x0000_2000;
    pub const ENCRYPTED: u32 = 0x0000_4000;
}

/// Convert a Windows FILETIME (100ns intervals since 1601-01-01) to UTC.
pub fn filetime_to_datetime(filetime: u64) -> chrono::DateTime<chrono::Utc> {
    use chrono::{TimeZone, Utc};
    const EPOCH_DIFF_100NS: u64 = 116_444_736_000_000_000;
    let unix_100ns = filetime.saturating_sub(EPOCH_DIFF_100NS);
    let secs = (unix_100ns / 10_000_000) as i64;
    let nanos = ((unix_100ns % 10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap())
}
