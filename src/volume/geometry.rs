//! Volume geometry: the immutable facts derived once from a boot
//! sector and shared by every reader variant.

/// Conventional NTFS reserved file reference numbers.
pub const ROOT_DIRECTORY_FRN: u64 = 5;
pub const SECURE_FRN: u64 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Ntfs,
    Fat12,
    Fat16,
    Fat32,
    ReFs,
    BitLocker,
}

impl FsKind {
    pub fn is_ntfs(&self) -> bool {
        matches!(self, FsKind::Ntfs)
    }
}

/// Filesystem geometry, parsed once at `open_volume` time and then
/// treated as read-only for the lifetime of the reader.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub bytes_per_cluster: u32,
    pub bytes_per_frs: u32,
    pub total_sectors: u64,
    pub serial: u64,
    pub fs_kind: FsKind,
    /// Starting LCN of $MFT (NTFS only; zero otherwise).
    pub mft_start_lcn: u64,
    /// Starting LCN of the $MFT mirror (NTFS only; zero otherwise).
    pub mft_mirror_start_lcn: u64,
    pub root_dir_frn: u64,
    pub secure_frn: u64,
}

impl Geometry {
    /// Sanity check applied by every boot-sector parser before handing
    /// a `Geometry` back to a caller.
    pub fn is_well_formed(&self) -> bool {
        self.bytes_per_frs > 0
            && self.bytes_per_frs % 1024 == 0
            && self.bytes_per_cluster > 0
            && self.bytes_per_cluster.is_power_of_two()
            && self.bytes_per_cluster % self.bytes_per_sector.max(1) == 0
    }

    pub fn mft_byte_offset(&self) -> u64 {
        self.mft_start_lcn * self.bytes_per_cluster as u64
    }
}
