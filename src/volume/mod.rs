//! Volume abstraction: uniform `seek + read` over a device, image
//! file, offline `$MFT` dump, or a carved partition of any of those,
//! plus the shared boot-sector/geometry parser.
//!
//! Rather than a trait object, the four backing stores are folded into
//! one tagged enum (`VolumeIo`) per the DESIGN NOTES guidance on
//! avoiding class-hierarchy style polymorphism where a closed, small set
//! of variants already describes every case.

pub mod boot_sector;
#[cfg(windows)]
pub mod device;
pub mod geometry;
pub mod image;
pub mod offline_mft;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::instrument;

use crate::error::{EngineError, Result};
use geometry::Geometry;
use image::ImageStore;
use offline_mft::OfflineMftStore;

#[cfg(windows)]
use device::DeviceStore;

/// Where to find the bytes backing a volume.
#[derive(Debug, Clone)]
pub enum VolumeLocation {
    /// `\\.\C:` or `\\.\PhysicalDrive0`-style Windows device path.
    Device(String),
    /// A flat image file (dd image, raw VHD/VHDX payload).
    Image(PathBuf),
    /// A dumped `$MFT` file with caller-supplied geometry.
    OfflineMft(PathBuf),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Reserved for parity with the read/write/share flags a live Windows
    /// handle takes; the engine is read-only, so this only ever widens
    /// the share mode, never the access mode.
    pub share_write: bool,
}

/// Shared `seek + read` contract over one of the backing stores.
pub enum VolumeIo {
    #[cfg(windows)]
    Device { store: Arc<DeviceStore>, path: String, geometry: Geometry },
    Image { store: Arc<ImageStore>, path: PathBuf, geometry: Geometry },
    OfflineMft { store: Arc<OfflineMftStore>, path: PathBuf, geometry: Geometry },
    Partition { inner: Box<VolumeIo>, base_offset: u64, geometry: Geometry },
}

impl VolumeIo {
    pub fn geometry(&self) -> &Geometry {
        match self {
            #[cfg(windows)]
            VolumeIo::Device { geometry, .. } => geometry,
            VolumeIo::Image { geometry, .. } => geometry,
            VolumeIo::OfflineMft { geometry, .. } => geometry,
            VolumeIo::Partition { geometry, .. } => geometry,
        }
    }

    #[instrument(level = "trace", skip(self, buffer))]
    pub fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        match self {
            #[cfg(windows)]
            VolumeIo::Device { store, .. } => store.read_at(offset, buffer),
            VolumeIo::Image { store, .. } => store.read_at(offset, buffer),
            VolumeIo::OfflineMft { store, .. } => store.read_at(offset, buffer),
            VolumeIo::Partition { inner, base_offset, .. } => {
                inner.read_at(base_offset + offset, buffer)
            }
        }
    }

    /// Read exactly `length` bytes, failing with `ShortRead` if the
    /// backing store returned fewer at a non-EOF offset.
    pub fn read_exact_at(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        let got = self.read_at(offset, &mut buffer)?;
        if got != length {
            return Err(EngineError::ShortRead { offset, wanted: length, got });
        }
        Ok(buffer)
    }

    /// Independent file handle with an independent seek position over
    /// the same backing identity.
    pub fn reopen(&self, options: OpenOptions) -> Result<VolumeIo> {
        match self {
            #[cfg(windows)]
            VolumeIo::Device { path, geometry, .. } => Ok(VolumeIo::Device {
                store: Arc::new(DeviceStore::open(path)?),
                path: path.clone(),
                geometry: geometry.clone(),
            }),
            VolumeIo::Image { path, geometry, .. } => Ok(VolumeIo::Image {
                store: Arc::new(ImageStore::open(path)?),
                path: path.clone(),
                geometry: geometry.clone(),
            }),
            VolumeIo::OfflineMft { path, geometry, .. } => Ok(VolumeIo::OfflineMft {
                store: Arc::new(OfflineMftStore::open(path, geometry)?),
                path: path.clone(),
                geometry: geometry.clone(),
            }),
            VolumeIo::Partition { inner, base_offset, geometry } => {
                Ok(VolumeIo::Partition {
                    inner: Box::new(inner.reopen(options)?),
                    base_offset: *base_offset,
                    geometry: geometry.clone(),
                })
            }
        }
    }

    /// Independent cursor sharing the same backing identity (cheap: the
    /// underlying store is reference-counted).
    pub fn clone_reader(&self) -> VolumeIo {
        match self {
            #[cfg(windows)]
            VolumeIo::Device { store, path, geometry } => {
                VolumeIo::Device { store: store.clone(), path: path.clone(), geometry: geometry.clone() }
            }
            VolumeIo::Image { store, path, geometry } => {
                VolumeIo::Image { store: store.clone(), path: path.clone(), geometry: geometry.clone() }
            }
            VolumeIo::OfflineMft { store, path, geometry } => {
                VolumeIo::OfflineMft { store: store.clone(), path: path.clone(), geometry: geometry.clone() }
            }
            VolumeIo::Partition { inner, base_offset, geometry } => VolumeIo::Partition {
                inner: Box::new(inner.clone_reader()),
                base_offset: *base_offset,
                geometry: geometry.clone(),
            },
        }
    }
}

/// Open a volume/image/device and parse its boot sector.
#[instrument(level = "debug", skip(_options))]
pub fn open_volume(location: VolumeLocation, _options: OpenOptions) -> Result<VolumeIo> {
    match location {
        VolumeLocation::Device(path) => open_device(&path),
        VolumeLocation::Image(path) => open_image(&path),
        VolumeLocation::OfflineMft(_) => Err(EngineError::InvalidConfig(
            "use open_offline_mft (geometry must be supplied explicitly)".into(),
        )),
    }
}

#[cfg(windows)]
fn open_device(path: &str) -> Result<VolumeIo> {
    let store = DeviceStore::open(path)?;
    let mut boot = [0u8; 512];
    store.read_at(0, &mut boot)?;
    let geometry = boot_sector::parse_boot_sector(&boot)?;
    Ok(VolumeIo::Device { store: Arc::new(store), path: path.to_string(), geometry })
}

#[cfg(not(windows))]
fn open_device(_path: &str) -> Result<VolumeIo> {
    Err(EngineError::NotSupported("live device access requires the windows-device feature".into()))
}

fn open_image(path: &Path) -> Result<VolumeIo> {
    let store = ImageStore::open(path)?;
    let mut boot = [0u8; 512];
    store.read_at(0, &mut boot)?;
    let geometry = boot_sector::parse_boot_sector(&boot)?;
    Ok(VolumeIo::Image { store: Arc::new(store), path: path.to_path_buf(), geometry })
}

/// Open a dumped `$MFT` file; geometry has no boot sector to derive
/// from, so the caller supplies it directly.
pub fn open_offline_mft(path: impl AsRef<Path>, geometry: Geometry) -> Result<VolumeIo> {
    let path = path.as_ref().to_path_buf();
    let store = OfflineMftStore::open(&path, &geometry)?;
    Ok(VolumeIo::OfflineMft { store: Arc::new(store), path, geometry })
}

/// Carve a sub-range out of an already-open reader (an image containing
/// several partitions, or a physical disk carved by a partition table).
pub fn open_partition(inner: VolumeIo, base_offset: u64) -> Result<VolumeIo> {
    let mut boot = [0u8; 512];
    inner.read_at(base_offset, &mut boot)?;
    let geometry = boot_sector::parse_boot_sector(&boot)?;
    Ok(VolumeIo::Partition { inner: Box::new(inner), base_offset, geometry })
}
