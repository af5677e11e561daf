//! Walker/find callback contract. All callbacks are optional,
//! run synchronously on the walker's thread, and are boxed rather than
//! generic so a `WalkCallbacks` value can be built up field-by-field
//! and passed as one argument to `walk_volume`/`find`.

use crate::attrs::model::{Attribute, FileName};
use crate::attrs::parse::ParsedRecord;
use crate::attrs::attribute_list::AttributeListEntry;
use crate::mft::i30::IndexEntry;
use crate::mft::secure::SecurityDescriptorEntry;
use crate::volume::VolumeIo;

/// Returned by cancellable callbacks. `Stop` is a clean, non-error
/// termination distinct from a fatal `EngineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Stop,
}

impl ControlFlow {
    pub fn is_stop(self) -> bool {
        matches!(self, ControlFlow::Stop)
    }
}

type ElementFn = Box<dyn FnMut(&VolumeIo, &ParsedRecord) -> ControlFlow>;
type FilenameFn = Box<dyn FnMut(&VolumeIo, &ParsedRecord, &FileName, &str)>;
type AttributeFn = Box<dyn FnMut(&VolumeIo, &ParsedRecord, &AttributeListEntry)>;
type DataFn = Box<dyn FnMut(&VolumeIo, &ParsedRecord, &Attribute)>;
type FilenameAndDataFn = Box<dyn FnMut(&ParsedRecord, &FileName, &Attribute)>;
type DirectoryFn = Box<dyn FnMut(&ParsedRecord, &FileName, bool)>;
type I30Fn = Box<dyn FnMut(&VolumeIo, &ParsedRecord, &IndexEntry, &str, bool)>;
type SecurityDescriptorFn = Box<dyn FnMut(&VolumeIo, &SecurityDescriptorEntry)>;
type KeepAliveFn = Box<dyn FnMut(&ParsedRecord) -> bool>;
type ProgressFn = Box<dyn FnMut(f64) -> ControlFlow>;

/// Builder-style bundle of optional callback hooks. Fields are `pub`
/// so a caller can also construct one directly with struct syntax.
#[derive(Default)]
pub struct WalkCallbacks {
    pub element: Option<ElementFn>,
    pub filename: Option<FilenameFn>,
    pub attribute: Option<AttributeFn>,
    pub data: Option<DataFn>,
    pub filename_and_data: Option<FilenameAndDataFn>,
    pub directory: Option<DirectoryFn>,
    pub i30: Option<I30Fn>,
    pub security_descriptor: Option<SecurityDescriptorFn>,
    pub keep_alive: Option<KeepAliveFn>,
    pub progress: Option<ProgressFn>,
}

impl WalkCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_element(mut self, f: impl FnMut(&VolumeIo, &ParsedRecord) -> ControlFlow + 'static) -> Self {
        self.element = Some(Box::new(f));
        self
    }

    pub fn on_filename(mut self, f: impl FnMut(&VolumeIo, &ParsedRecord, &FileName, &str) + 'static) -> Self {
        self.filename = Some(Box::new(f));
        self
    }

    pub fn on_attribute(mut self, f: impl FnMut(&VolumeIo, &ParsedRecord, &AttributeListEntry) + 'static) -> Self {
        self.attribute = Some(Box::new(f));
        self
    }

    pub fn on_data(mut self, f: impl FnMut(&VolumeIo, &ParsedRecord, &Attribute) + 'static) -> Self {
        self.data = Some(Box::new(f));
        self
    }

    pub fn on_filename_and_data(mut self, f: impl FnMut(&ParsedRecord, &FileName, &Attribute) + 'static) -> Self {
        self.filename_and_data = Some(Box::new(f));
        self
    }

    pub fn on_directory(mut self, f: impl FnMut(&ParsedRecord, &FileName, bool) + 'static) -> Self {
        self.directory = Some(Box::new(f));
        self
    }

    pub fn on_i30(mut self, f: impl FnMut(&VolumeIo, &ParsedRecord, &IndexEntry, &str, bool) + 'static) -> Self {
        self.i30 = Some(Box::new(f));
        self
    }

    pub fn on_security_descriptor(mut self, f: impl FnMut(&VolumeIo, &SecurityDescriptorEntry) + 'static) -> Self {
        self.security_descriptor = Some(Box::new(f));
        self
    }

    pub fn on_keep_alive(mut self, f: impl FnMut(&ParsedRecord) -> bool + 'static) -> Self {
        self.keep_alive = Some(Box::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(f64) -> ControlFlow + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }
}
