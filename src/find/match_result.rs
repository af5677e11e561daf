//! The `Match` result type. `Serialize`-derived so a
//! caller-owned reporter can emit results as JSON; the open streams
//! carried alongside a matched attribute are deliberately not part of
//! that representation.

use serde::Serialize;

use crate::attrs::model::StandardInformation;
use crate::attrs::streams::AttributeStream;
use crate::attrs::types::AttributeType;
use crate::error::Frn;

#[derive(Debug, Clone, Serialize)]
pub struct MatchedName {
    pub name: String,
    pub full_path: String,
}

#[derive(Serialize)]
pub struct MatchedAttribute {
    pub type_code: AttributeType,
    pub instance_id: u16,
    pub name: Option<String>,
    pub size: u64,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    #[serde(skip)]
    pub data: Option<AttributeStream>,
    #[serde(skip)]
    pub raw: Option<AttributeStream>,
}

#[derive(Serialize)]
pub struct Match {
    pub term_index: usize,
    pub frn: Frn,
    pub is_deleted: bool,
    pub standard_information: Option<StandardInformation>,
    pub names: Vec<MatchedName>,
    pub attributes: Vec<MatchedAttribute>,
}

impl Match {
    pub fn new(term_index: usize, frn: Frn, is_deleted: bool) -> Self {
        Self {
            term_index,
            frn,
            is_deleted,
            standard_information: None,
            names: Vec::new(),
            attributes: Vec::new(),
        }
    }
}
