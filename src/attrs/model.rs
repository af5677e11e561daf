//! Typed attribute model.

use crate::attrs::attribute_list::AttributeListEntry;
use crate::attrs::dataruns::Extent;
use crate::attrs::types::{AttributeType, FilenameNamespace, ReparseClass, WofAlgorithm};
use crate::error::Frn;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StandardInformation {
    pub creation_time: u64,
    pub modification_time: u64,
    pub mft_modification_time: u64,
    pub access_time: u64,
    pub file_attributes: u32,
    pub owner_id: u32,
    pub security_id: u32,
    pub quota_charged: u64,
    pub usn: u64,
}

#[derive(Debug, Clone)]
pub struct FileName {
    pub parent_reference: u64,
    pub creation_time: u64,
    pub modification_time: u64,
    pub mft_modification_time: u64,
    pub access_time: u64,
    pub allocated_size: u64,
    pub data_size: u64,
    pub file_attributes: u32,
    pub namespace: FilenameNamespace,
    pub name: String,
}

impl FileName {
    pub fn parent_record_number(&self) -> u64 {
        self.parent_reference & 0x0000_FFFF_FFFF_FFFF
    }
}

#[derive(Debug, Clone)]
pub struct ReparsePointPayload {
    pub tag: u32,
    pub class: ReparseClass,
    pub wof_algorithm: Option<WofAlgorithm>,
    pub wof_data_size: Option<u64>,
}

/// Tagged payload per the NTFS type code, instead of a class hierarchy
/// per attribute type.
#[derive(Debug, Clone)]
pub enum AttributePayload {
    StandardInformation(StandardInformation),
    FileName(FileName),
    AttributeList(Vec<AttributeListEntry>),
    Data,
    IndexRoot { raw: Vec<u8> },
    IndexAllocation,
    Bitmap { raw: Vec<u8> },
    ReparsePoint(ReparsePointPayload),
    SecurityDescriptor,
    ObjectId,
    Ea,
    EaInformation,
    LoggedUtilityStream,
    Generic,
}

#[derive(Debug, Clone)]
pub struct NonResidentDescriptor {
    pub lowest_vcn: u64,
    pub highest_vcn: u64,
    pub compression_unit: u16,
    pub allocated_size: u64,
    pub file_size: u64,
    pub valid_data_size: u64,
    pub extents: Vec<Extent>,
}

#[derive(Debug, Clone)]
pub enum AttributeForm {
    Resident { value: Vec<u8> },
    NonResident(NonResidentDescriptor),
}

impl AttributeForm {
    pub fn is_non_resident(&self) -> bool {
        matches!(self, AttributeForm::NonResident(_))
    }

    pub fn size(&self) -> u64 {
        match self {
            AttributeForm::Resident { value } => value.len() as u64,
            AttributeForm::NonResident(nr) => nr.file_size,
        }
    }
}

/// One parsed attribute, as found on a single MFT record. Cross-record
/// continuation chains are assembled by the MFT walker's record arena,
/// not here.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub type_code: AttributeType,
    pub name: Option<String>,
    pub instance_id: u16,
    pub host_frn: Frn,
    pub form: AttributeForm,
    pub payload: AttributePayload,
}

impl Attribute {
    pub fn is_named(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
    }

    pub fn is_default_data(&self) -> bool {
        matches!(self.payload, AttributePayload::Data) && !self.is_named()
    }

    /// Non-resident only: whether this instance is a continuation
    /// fragment (`lowest_vcn > 0`) rather than the head.
    pub fn is_continuation(&self) -> bool {
        match &self.form {
            AttributeForm::NonResident(nr) => nr.lowest_vcn > 0,
            AttributeForm::Resident { .. } => false,
        }
    }
}

/// Merge a head attribute's extents with zero or more continuation
/// fragments (same type + name), ordered and deduplicated by
/// `lowest_vcn`.
pub fn merge_continuation_extents(head: &mut NonResidentDescriptor, fragments: &[NonResidentDescriptor]) {
    let mut seen_vcns: std::collections::BTreeSet<u64> =
        head.extents.iter().map(|e| e.vcn).collect();
    let mut ordered: Vec<&NonResidentDescriptor> = fragments.iter().collect();
    ordered.sort_by_key(|f| f.lowest_vcn);

    for fragment in ordered {
        for extent in &fragment.extents {
            if seen_vcns.insert(extent.vcn) {
                head.extents.push(*extent);
            }
        }
        head.highest_vcn = head.highest_vcn.max(fragment.highest_vcn);
    }
    head.extents.sort_by_key(|e| e.vcn);
}
