//! Match term criteria and configuration-time validation.

use serde::{Deserialize, Serialize};

use crate::attrs::types::AttributeType;
use crate::config::HashKind;
use crate::error::{EngineError, Result};

/// A string criterion evaluated one of three ways. Regex criteria are
/// compiled lazily by the term index, not stored pre-compiled here, so
/// `MatchTerm` stays `Serialize`/`Deserialize` and cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringMatch {
    Exact(String),
    Wildcard(String),
    Regex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeComparison {
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeCriterion {
    pub op: SizeComparison,
    pub bytes: u64,
}

/// A byte needle, given either as literal bytes or as hex text that is
/// decoded once when the term is compiled into the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteNeedle {
    Plain(Vec<u8>),
    Hex(String),
}

impl ByteNeedle {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ByteNeedle::Plain(bytes) => Ok(bytes.clone()),
            ByteNeedle::Hex(text) => hex::decode(text)
                .map_err(|e| EngineError::InvalidConfig(format!("bad hex needle {text:?}: {e}"))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchTerm {
    pub name: Option<StringMatch>,
    pub path: Option<StringMatch>,
    pub ads_name: Option<StringMatch>,
    pub ea_name: Option<StringMatch>,
    /// A name criterion that is neither name- nor path-anchored; split
    /// into `name/path` sub-terms by the caller before indexing.
    pub generic_name: Option<StringMatch>,
    pub attribute_type: Option<AttributeType>,
    pub attribute_name: Option<StringMatch>,
    pub size: Option<SizeCriterion>,
    pub hashes: Vec<(HashKind, String)>,
    pub contains: Vec<ByteNeedle>,
    pub header: Option<HeaderMatch>,
    pub yara_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderPattern {
    Plain(Vec<u8>),
    Hex(String),
    Regex(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMatch {
    pub pattern: HeaderPattern,
    /// Bytes inspected from the start of the stream. Defaults to the
    /// needle's length when the pattern is plain/hex and `None`.
    pub window: Option<usize>,
}

impl MatchTerm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks cross-field compatibility rules. Called once per term
    /// when a configuration is loaded, never per record.
    pub fn validate(&self) -> Result<()> {
        if self.generic_name.is_some()
            && (self.name.is_some() || self.path.is_some() || self.ea_name.is_some() || self.ads_name.is_some())
        {
            return Err(invalid("generic_name cannot coexist with name/path/ea_name/ads_name in one term"));
        }

        if self.ea_name.is_some() && self.ads_name.is_some() {
            return Err(invalid("ea_name and ads_name are mutually exclusive in one term"));
        }

        let has_attribute_level = self.attribute_type.is_some() || self.attribute_name.is_some();
        if has_attribute_level && (self.ea_name.is_some() || self.ads_name.is_some()) {
            return Err(invalid("attribute type/name criteria are mutually exclusive with ea_name/ads_name"));
        }

        // `size` holds a single `SizeComparison`, so `==` coexisting
        // with a range operator in one term is structurally impossible
        // rather than something to check for here.

        Ok(())
    }

    pub fn depends_on_name(&self) -> bool {
        self.name.is_some() || self.generic_name.is_some()
    }

    pub fn depends_on_path(&self) -> bool {
        self.path.is_some() || self.generic_name.is_some()
    }
}

fn invalid(reason: &str) -> EngineError {
    EngineError::InvalidConfig(reason.to_string())
}
