//! Payload types held by items and crates.
//!
//! Images are plain `image::RgbaImage`; the types here cover the other
//! resource kinds and the crate values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{EaselError, EaselResult};

/// An open file owned by a file item. Closed by the file disposer.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    file: Option<fs::File>,
}

impl FileHandle {
    /// Create (or truncate) `path` for writing.
    pub fn create(path: impl AsRef<Path>) -> EaselResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::create(&path)?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> EaselResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn file_mut(&mut self) -> EaselResult<&mut fs::File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(EaselError::not_found(format!(
                "file handle for {} is closed",
                self.path.display()
            ))),
        }
    }

    /// Flush to disk and release the OS handle. Closing twice is a no-op.
    pub fn close(&mut self) -> EaselResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }
}

/// Variables of one script execution context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecContext {
    vars: serde_json::Map<String, serde_json::Value>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.vars.get(name)
    }

    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<serde_json::Value> {
        self.vars.remove(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Square module grid of a QR code (`true` = dark module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrMatrix {
    size: u32,
    modules: Vec<bool>,
}

impl QrMatrix {
    /// All-light grid of `size`×`size` modules.
    pub fn new(size: u32) -> Self {
        Self {
            size,
            modules: vec![false; (size as usize) * (size as usize)],
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn get(&self, x: u32, y: u32) -> Option<bool> {
        self.index(x, y).map(|i| self.modules[i])
    }

    pub fn set(&mut self, x: u32, y: u32, dark: bool) -> EaselResult<()> {
        let i = self.index(x, y).ok_or_else(|| {
            EaselError::validation(format!(
                "module ({x}, {y}) outside {0}x{0} grid",
                self.size
            ))
        })?;
        self.modules[i] = dark;
        Ok(())
    }

    pub fn dark_modules(&self) -> usize {
        self.modules.iter().filter(|dark| **dark).count()
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.size && y < self.size).then(|| (y as usize) * (self.size as usize) + x as usize)
    }
}

/// Terminal text style.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    pub foreground: Option<[u8; 3]>,
    pub background: Option<[u8; 3]>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

/// Host-side copy of a GPU buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuBuffer {
    pub label: String,
    pub contents: Vec<u8>,
}

impl GpuBuffer {
    pub fn zeroed(label: impl Into<String>, len: usize) -> Self {
        Self {
            label: label.into(),
            contents: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}
