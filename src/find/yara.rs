//! Yara rule-set contract. The scanner itself is opaque to the engine:
//! this module only defines the enable/disable and stream-scan surface
//! a concrete scanner must implement, so wiring in a real `yara`
//! binding doesn't touch `find::eval`.

use crate::attrs::streams::AttributeStream;
use crate::error::Result;

pub trait YaraScanner {
    /// Activates the named rules for subsequent scans. `"*"` activates
    /// every loaded rule.
    fn enable_rules(&mut self, rule_names: &[String]) -> Result<()>;

    fn disable_rules(&mut self, rule_names: &[String]) -> Result<()>;

    /// Scans `stream` to end-of-stream against the currently enabled
    /// rules, returning the names of rules that matched.
    fn scan(&mut self, stream: &mut AttributeStream) -> Result<Vec<String>>;
}

/// A scanner that never matches anything, used when a configuration
/// declares `yara_rules` but the caller hasn't wired in a real scanner.
#[derive(Default)]
pub struct NullYaraScanner;

impl YaraScanner for NullYaraScanner {
    fn enable_rules(&mut self, _rule_names: &[String]) -> Result<()> {
        Ok(())
    }

    fn disable_rules(&mut self, _rule_names: &[String]) -> Result<()> {
        Ok(())
    }

    fn scan(&mut self, _stream: &mut AttributeStream) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
