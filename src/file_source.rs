#![cfg(feature = "std")]

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::core::source::{ByteSource, SourceKind};

/// A file chosen for upload, read lazily one slice at a time.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len();
        Ok(Self { path, file, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, String> {
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read(buf))
            .map_err(|e| e.to_string())
    }

    fn len(&self) -> Option<u64> {
        Some(self.len)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }
}
