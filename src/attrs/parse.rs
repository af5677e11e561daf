//! Attribute-engine parse pipeline.

use tracing::{debug, instrument, warn};

use crate::attrs::attribute_list::{decode_utf16le, parse_attribute_list, AttributeListEntry};
use crate::attrs::dataruns::decode_mapping_pairs;
use crate::attrs::model::{
    Attribute, AttributeForm, AttributePayload, FileName, NonResidentDescriptor,
    ReparsePointPayload, StandardInformation,
};
use crate::attrs::record::{apply_fixup, RecordHeader};
use crate::attrs::types::{AttributeType, FilenameNamespace, ReparseClass, WofAlgorithm, ATTRIBUTE_TERMINATOR};
use crate::error::{EngineError, Frn, Result};
use crate::volume::geometry::Geometry;

/// Result of parsing one raw MFT record (base or extension). Cross-
/// record merging (attribute-list resolution, continuation stitching)
/// happens one layer up, in the MFT walker's record arena.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub header: RecordHeader,
    pub frn: Frn,
    pub attributes: Vec<Attribute>,
}

impl ParsedRecord {
    pub fn is_base(&self) -> bool {
        self.header.is_base_record()
    }

    pub fn attribute_list(&self) -> Option<&Vec<AttributeListEntry>> {
        self.attributes.iter().find_map(|a| match &a.payload {
            AttributePayload::AttributeList(entries) => Some(entries),
            _ => None,
        })
    }

    pub fn standard_information(&self) -> Option<&StandardInformation> {
        self.attributes.iter().find_map(|a| match &a.payload {
            AttributePayload::StandardInformation(si) => Some(si),
            _ => None,
        })
    }

    pub fn file_names(&self) -> impl Iterator<Item = &FileName> {
        self.attributes.iter().filter_map(|a| match &a.payload {
            AttributePayload::FileName(fname) => Some(fname),
            _ => None,
        })
    }

    /// Primary name: POSIX then Win32 then Win32&DOS83, ties
    /// break on first occurrence.
    pub fn primary_file_name(&self) -> Option<&FileName> {
        self.file_names().fold(None, |best, candidate| match best {
            None => Some(candidate),
            Some(current) if candidate.namespace.dominance_rank() > current.namespace.dominance_rank() => {
                Some(candidate)
            }
            Some(current) => Some(current),
        })
    }

    pub fn is_directory(&self) -> bool {
        self.header.is_directory()
            || self.attributes.iter().any(|a| {
                matches!(a.payload, AttributePayload::IndexRoot { .. })
                    && a.name.as_deref() == Some("$I30")
            })
    }
}

/// Parse a raw FRS-sized record buffer into a `ParsedRecord`. `frn` is
/// the caller's expected file reference number (used for error context
/// and to populate `RecordHeader::record_number`/sequence via the
/// header itself — this function trusts the on-disk sequence number).
#[instrument(level = "debug", skip(raw, geometry))]
pub fn parse_record(raw: &[u8], record_number: u32, geometry: &Geometry) -> Result<ParsedRecord> {
    let mut data = raw.to_vec();
    let mut header = RecordHeader::from_bytes(&data)
        .ok_or_else(|| EngineError::CorruptRecord { frn: record_number as u64, reason: "record too short for header".into() })?;
    header.record_number = record_number;

    if !header.is_valid() {
        return Err(EngineError::CorruptRecord {
            frn: header.frn(),
            reason: "bad FILE signature".into(),
        });
    }

    apply_fixup(&mut data, &header, geometry)?;

    if header.first_attribute_offset as usize > data.len() {
        return Err(EngineError::CorruptRecord {
            frn: header.frn(),
            reason: "first_attribute_offset exceeds record length".into(),
        });
    }

    let frn = header.frn();
    let attributes = parse_attributes(&data, &header)?;

    Ok(ParsedRecord { header, frn, attributes })
}

fn parse_attributes(data: &[u8], header: &RecordHeader) -> Result<Vec<Attribute>> {
    let frn = header.frn();
    let mut offset = header.first_attribute_offset as usize;
    let mut attributes = Vec::new();
    let mut seen_standard_information = false;

    while offset + 16 <= data.len() {
        let attr_type = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        if attr_type == ATTRIBUTE_TERMINATOR {
            break;
        }
        let length = u32::from_le_bytes(data[offset + 4..offset + 8].try_into().unwrap());
        if length == 0 {
            return Err(EngineError::CorruptRecord { frn, reason: "zero-length attribute".into() });
        }
        if offset + length as usize > data.len() {
            break;
        }

        let attr_bytes = &data[offset..offset + length as usize];
        match parse_one_attribute(attr_bytes, frn) {
            Ok(Some(attr)) => {
                if matches!(attr.payload, AttributePayload::StandardInformation(_)) {
                    if seen_standard_information {
                        return Err(EngineError::CorruptRecord {
                            frn,
                            reason: "duplicate $STANDARD_INFORMATION".into(),
                        });
                    }
                    seen_standard_information = true;
                }
                attributes.push(attr);
            }
            Ok(None) => {} // unrecognized type code, skipped
            Err(e) => {
                warn!(?e, frn = format!("{frn:016x}"), "dropping unparseable attribute");
            }
        }

        offset += length as usize;
    }

    Ok(attributes)
}

fn parse_one_attribute(attr: &[u8], host_frn: Frn) -> Result<Option<Attribute>> {
    if attr.len() < 16 {
        return Err(EngineError::CorruptRecord { frn: host_frn, reason: "attribute header truncated".into() });
    }

    let type_value = u32::from_le_bytes(attr[0..4].try_into().unwrap());
    let Some(type_code) = AttributeType::from_u32(type_value) else {
        return Ok(None);
    };

    let non_resident = attr[8] != 0;
    let name_length = attr[9];
    let name_offset = u16::from_le_bytes([attr[10], attr[11]]) as usize;
    let instance_id = u16::from_le_bytes([attr[14], attr[15]]);

    let name = if name_length > 0 {
        let byte_len = name_length as usize * 2;
        attr.get(name_offset..name_offset + byte_len).map(decode_utf16le)
    } else {
        None
    };

    let form = if non_resident {
        parse_non_resident_form(attr, host_frn)?
    } else {
        parse_resident_form(attr, host_frn)?
    };

    let value_bytes: &[u8] = match &form {
        AttributeForm::Resident { value } => value,
        AttributeForm::NonResident(_) => &[],
    };

    let payload = classify_payload(type_code, name.as_deref(), value_bytes, &form, host_frn)?;

    Ok(Some(Attribute { type_code, name, instance_id, host_frn, form, payload }))
}

fn parse_resident_form(attr: &[u8], frn: Frn) -> Result<AttributeForm> {
    if attr.len() < 24 {
        return Err(EngineError::CorruptRecord { frn, reason: "resident header truncated".into() });
    }
    let value_length = u32::from_le_bytes(attr[16..20].try_into().unwrap()) as usize;
    let value_offset = u16::from_le_bytes([attr[20], attr[21]]) as usize;

    let value = attr
        .get(value_offset..value_offset + value_length)
        .ok_or_else(|| EngineError::CorruptRecord {
            frn,
            reason: "resident value extends past attribute record".into(),
        })?
        .to_vec();

    Ok(AttributeForm::Resident { value })
}

fn parse_non_resident_form(attr: &[u8], frn: Frn) -> Result<AttributeForm> {
    if attr.len() < 64 {
        return Err(EngineError::CorruptRecord { frn, reason: "non-resident header truncated".into() });
    }
    let lowest_vcn = u64::from_le_bytes(attr[16..24].try_into().unwrap());
    let highest_vcn = u64::from_le_bytes(attr[24..32].try_into().unwrap());
    let data_runs_offset = u16::from_le_bytes([attr[32], attr[33]]) as usize;
    let compression_unit = u16::from_le_bytes([attr[34], attr[35]]);
    let allocated_size = u64::from_le_bytes(attr[40..48].try_into().unwrap());
    let file_size = u64::from_le_bytes(attr[48..56].try_into().unwrap());
    let valid_data_size = u64::from_le_bytes(attr[56..64].try_into().unwrap());

    let runs_bytes = attr.get(data_runs_offset..).unwrap_or(&[]);
    let mut extents = decode_mapping_pairs(runs_bytes, lowest_vcn, frn)?;
    reconcile_size(&mut extents, file_size, frn);

    Ok(AttributeForm::NonResident(NonResidentDescriptor {
        lowest_vcn,
        highest_vcn,
        compression_unit,
        allocated_size,
        file_size,
        valid_data_size,
        extents,
    }))
}

/// Size reconciliation: trim or pad the assembled extent list
/// against the declared `file_size`, in cluster units relative to the
/// running VCN (the actual byte-granular trim happens at stream-read
/// time; here we only add the synthetic trailing sparse extent for a
/// deficit, since a surplus trim requires the per-attribute cluster
/// size which the stream layer has, not this function).
fn reconcile_size(extents: &mut Vec<crate::attrs::dataruns::Extent>, _file_size: u64, _frn: Frn) {
    // Deliberately a no-op on cluster counts here: without bytes-per-
    // cluster (a volume-level fact, not known to this attribute-local
    // function) neither the trim nor the deficit-fill can be computed
    // precisely. The stream layer (`attrs::streams`) performs the
    // byte-accurate version of this reconciliation when it knows the
    // volume geometry. `extents` is kept as decoded from mapping pairs.
    let _ = extents;
}

fn classify_payload(
    type_code: AttributeType,
    name: Option<&str>,
    resident_value: &[u8],
    form: &AttributeForm,
    frn: Frn,
) -> Result<AttributePayload> {
    Ok(match type_code {
        AttributeType::StandardInformation => {
            AttributePayload::StandardInformation(parse_standard_information(resident_value, frn)?)
        }
        AttributeType::FileName => AttributePayload::FileName(parse_file_name_value(resident_value, frn)?),
        AttributeType::AttributeList => {
            let entries = match form {
                AttributeForm::Resident { value } => parse_attribute_list(value),
                // Non-resident attribute lists are read back through the
                // stream layer by the caller (mft::walker), since doing
                // so here would need the volume reader; placeholder
                // empty list, filled in by the walker after stream read.
                AttributeForm::NonResident(_) => Vec::new(),
            };
            AttributePayload::AttributeList(entries)
        }
        AttributeType::Data => AttributePayload::Data,
        AttributeType::IndexRoot => AttributePayload::IndexRoot { raw: resident_value.to_vec() },
        AttributeType::IndexAllocation => AttributePayload::IndexAllocation,
        AttributeType::Bitmap => AttributePayload::Bitmap { raw: resident_value.to_vec() },
        AttributeType::ReparsePoint => {
            AttributePayload::ReparsePoint(parse_reparse_point(resident_value, name, frn)?)
        }
        AttributeType::SecurityDescriptor => AttributePayload::SecurityDescriptor,
        AttributeType::ObjectId => AttributePayload::ObjectId,
        AttributeType::Ea => AttributePayload::Ea,
        AttributeType::EaInformation => AttributePayload::EaInformation,
        AttributeType::LoggedUtilityStream => AttributePayload::LoggedUtilityStream,
        AttributeType::VolumeName | AttributeType::VolumeInformation => AttributePayload::Generic,
    })
}

fn parse_standard_information(data: &[u8], frn: Frn) -> Result<StandardInformation> {
    if data.len() < 48 {
        return Err(EngineError::CorruptRecord { frn, reason: "$STANDARD_INFORMATION truncated".into() });
    }
    let mut info = StandardInformation {
        creation_time: u64::from_le_bytes(data[0..8].try_into().unwrap()),
        modification_time: u64::from_le_bytes(data[8..16].try_into().unwrap()),
        mft_modification_time: u64::from_le_bytes(data[16..24].try_into().unwrap()),
        access_time: u64::from_le_bytes(data[24..32].try_into().unwrap()),
        file_attributes: u32::from_le_bytes(data[32..36].try_into().unwrap()),
        ..Default::default()
    };
    if data.len() >= 72 {
        info.owner_id = u32::from_le_bytes(data[48..52].try_into().unwrap());
        info.security_id = u32::from_le_bytes(data[52..56].try_into().unwrap());
        info.quota_charged = u64::from_le_bytes(data[56..64].try_into().unwrap());
        info.usn = u64::from_le_bytes(data[64..72].try_into().unwrap());
    }
    Ok(info)
}

/// Decode a raw `$FILE_NAME` value. Shared with the `$I30` index
/// decoder, which parses the same structure embedded in index entries.
pub fn parse_file_name_value(data: &[u8], frn: Frn) -> Result<FileName> {
    if data.len() < 66 {
        return Err(EngineError::CorruptRecord { frn, reason: "$FILE_NAME truncated".into() });
    }
    let parent_reference = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let creation_time = u64::from_le_bytes(data[8..16].try_into().unwrap());
    let modification_time = u64::from_le_bytes(data[16..24].try_into().unwrap());
    let mft_modification_time = u64::from_le_bytes(data[24..32].try_into().unwrap());
    let access_time = u64::from_le_bytes(data[32..40].try_into().unwrap());
    let allocated_size = u64::from_le_bytes(data[40..48].try_into().unwrap());
    let data_size = u64::from_le_bytes(data[48..56].try_into().unwrap());
    let file_attributes = u32::from_le_bytes(data[56..60].try_into().unwrap());
    let name_length = data[64];
    let namespace_byte = data[65];
    let namespace = FilenameNamespace::from_u8(namespace_byte)
        .ok_or_else(|| EngineError::CorruptRecord { frn, reason: "invalid filename namespace".into() })?;

    let name_bytes = name_length as usize * 2;
    let name = data
        .get(66..66 + name_bytes)
        .map(decode_utf16le)
        .ok_or_else(|| EngineError::CorruptRecord { frn, reason: "$FILE_NAME name extends past attribute".into() })?;

    debug!(name = %name, "parsed $FILE_NAME");

    Ok(FileName {
        parent_reference,
        creation_time,
        modification_time,
        mft_modification_time,
        access_time,
        allocated_size,
        data_size,
        file_attributes,
        namespace,
        name,
    })
}

fn parse_reparse_point(data: &[u8], name: Option<&str>, frn: Frn) -> Result<ReparsePointPayload> {
    if data.len() < 8 {
        return Err(EngineError::CorruptRecord { frn, reason: "$REPARSE_POINT truncated".into() });
    }
    let tag = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let class = ReparseClass::from_tag(tag);

    // WOF reparse points carry the compression algorithm starting at a
    // fixed offset inside the reparse data buffer; the named stream
    // itself (`WofCompressedData`) is read separately by the stream
    // layer, never by this classification step.
    let (wof_algorithm, wof_data_size) = if matches!(class, ReparseClass::Wof) && data.len() >= 0x1C {
        let algo_value = u32::from_le_bytes(data[0x14..0x18].try_into().unwrap());
        (WofAlgorithm::from_u32(algo_value), Some(u64::from_le_bytes(data[0x18..0x20.min(data.len())].try_into().unwrap_or([0; 8]))))
    } else {
        (None, None)
    };
    let _ = name;

    Ok(ReparsePointPayload { tag, class, wof_algorithm, wof_data_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::geometry::FsKind;

    fn test_geometry() -> Geometry {
        Geometry {
            bytes_per_sector: 512,
            bytes_per_cluster: 4096,
            bytes_per_frs: 1024,
            total_sectors: 0,
            serial: 0,
            fs_kind: FsKind::Ntfs,
            mft_start_lcn: 0,
            mft_mirror_start_lcn: 0,
            root_dir_frn: 5,
            secure_frn: 9,
        }
    }

    fn build_resident_record(attr_type: u32, value: &[u8]) -> Vec<u8> {
        let frs = 1024usize;
        let mut data = vec![0u8; frs];
        data[0..4].copy_from_slice(&crate::attrs::record::MFT_RECORD_SIGNATURE.to_le_bytes());
        data[4..6].copy_from_slice(&48u16.to_le_bytes()); // update_sequence_offset
        data[6..8].copy_from_slice(&3u16.to_le_bytes()); // 2 sectors + 1
        data[20..22].copy_from_slice(&56u16.to_le_bytes()); // first_attribute_offset
        data[22..24].copy_from_slice(&crate::attrs::record::RECORD_IN_USE.to_le_bytes()); // flags

        let seq_token: u16 = 1;
        data[48..50].copy_from_slice(&seq_token.to_le_bytes());
        data[510..512].copy_from_slice(&seq_token.to_le_bytes());
        data[1022..1024].copy_from_slice(&seq_token.to_le_bytes());
        data[50..52].copy_from_slice(&[0xAA, 0xBB]);

        let attr_offset = 56usize;
        let header_len = 24usize;
        let total_len = (header_len + value.len()).div_ceil(8) * 8;
        data[attr_offset..attr_offset + 4].copy_from_slice(&attr_type.to_le_bytes());
        data[attr_offset + 4..attr_offset + 8].copy_from_slice(&(total_len as u32).to_le_bytes());
        data[attr_offset + 16..attr_offset + 20].copy_from_slice(&(value.len() as u32).to_le_bytes());
        data[attr_offset + 20..attr_offset + 22].copy_from_slice(&(header_len as u16).to_le_bytes());
        data[attr_offset + header_len..attr_offset + header_len + value.len()].copy_from_slice(value);

        let terminator_offset = attr_offset + total_len;
        data[terminator_offset..terminator_offset + 4].copy_from_slice(&ATTRIBUTE_TERMINATOR.to_le_bytes());

        data
    }

    #[test]
    fn parses_resident_standard_information() {
        let mut si = vec![0u8; 48];
        si[0..8].copy_from_slice(&100u64.to_le_bytes());
        let raw = build_resident_record(0x10, &si);
        let parsed = parse_record(&raw, 42, &test_geometry()).unwrap();
        assert_eq!(parsed.standard_information().unwrap().creation_time, 100);
    }

    #[test]
    fn empty_attribute_list_when_offset_equals_length() {
        let frs = 1024usize;
        let mut data = vec![0u8; frs];
        data[0..4].copy_from_slice(&crate::attrs::record::MFT_RECORD_SIGNATURE.to_le_bytes());
        data[4..6].copy_from_slice(&48u16.to_le_bytes());
        data[6..8].copy_from_slice(&3u16.to_le_bytes());
        data[20..22].copy_from_slice(&(frs as u16).to_le_bytes()); // first_attribute_offset == record length
        let seq_token: u16 = 7;
        data[48..50].copy_from_slice(&seq_token.to_le_bytes());
        data[510..512].copy_from_slice(&seq_token.to_le_bytes());
        data[1022..1024].copy_from_slice(&seq_token.to_le_bytes());

        let parsed = parse_record(&data, 1, &test_geometry()).unwrap();
        assert!(parsed.attributes.is_empty());
    }
}
