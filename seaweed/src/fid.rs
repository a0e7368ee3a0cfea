//! Opaque file identifiers handed out by the master.

use crate::error::{Result, SeaweedError};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A file id of the form `<volume>,<key><cookie>[_<index>]`.
///
/// The client never looks inside the key or cookie. It only appends the
/// `_<index>` suffix for batch siblings and reads the volume prefix when it
/// has to ask the master where the volume lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(fid: impl Into<String>) -> Self {
        Self(fid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Id of the `index`-th object of a multi-count assignment.
    pub fn with_index(&self, index: usize) -> FileId {
        if index == 0 {
            self.clone()
        } else {
            FileId(format!("{}_{index}", self.0))
        }
    }

    pub fn volume_id(&self) -> Result<&str> {
        match self.0.split_once(',') {
            Some((vid, _)) if !vid.is_empty() => Ok(vid),
            _ => Err(SeaweedError::InvalidFileId(self.0.clone())),
        }
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for FileId {
    fn from(fid: String) -> Self {
        Self(fid)
    }
}

impl From<&str> for FileId {
    fn from(fid: &str) -> Self {
        Self(fid.to_string())
    }
}
