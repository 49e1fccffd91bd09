//! Asset-source collaborators for the decode cache.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::common::types::SampleFormat;

/// One opened asset: its PCM shape plus a byte stream positioned at the
/// start of the decoded data. Closing is dropping.
pub struct OpenedAsset {
    pub format: SampleFormat,
    pub reader: Box<dyn Read + Send>,
}

/// Resolves names to asset byte streams. Registered once per cache;
/// `None` from `open` means the asset does not exist.
pub trait AssetSource: Send + Sync {
    fn open(&self, name: &str) -> Option<OpenedAsset>;
}

/// Loads assets from files under a root directory, all assumed to share
/// one PCM format.
pub struct FsAssetSource {
    root: PathBuf,
    format: SampleFormat,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>, format: SampleFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }
}

impl AssetSource for FsAssetSource {
    fn open(&self, name: &str) -> Option<OpenedAsset> {
        let file = File::open(self.root.join(name)).ok()?;
        Some(OpenedAsset {
            format: self.format,
            reader: Box::new(file),
        })
    }
}
