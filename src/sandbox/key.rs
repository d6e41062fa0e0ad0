//! Cache key derivation
//!
//! A sandbox directory is named `{declaration}-{content}`:
//! - `declaration`: SHA-256 of the stage identity (command arguments, then
//!   target paths, each length-prefixed), truncated to 128 bits
//! - `content`: SHA-256 of every input file in order, each framed by its
//!   length so bytes cannot shift between adjacent files unnoticed

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::GradeError;
use crate::pipeline::{PathMapping, ResolvedStage};

const DECLARATION_HEX_LEN: usize = 32;
const READ_CHUNK: usize = 64 * 1024;

/// Deterministic identity of a resolved stage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub declaration: String,
    pub content: String,
}

impl CacheKey {
    /// Derive the key for a stage, reading every input file
    pub async fn derive(stage: &ResolvedStage) -> Result<Self, GradeError> {
        Ok(Self {
            declaration: declaration_hash(stage),
            content: content_hash(&stage.files).await?,
        })
    }

    /// Sandbox directory name under the cache root
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.declaration, self.content)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Hash of the command and file placement, not of file contents
pub fn declaration_hash(stage: &ResolvedStage) -> String {
    let mut hasher = Sha256::new();

    hasher.update(b"command");
    hasher.update((stage.command.len() as u64).to_le_bytes());
    for arg in &stage.command {
        update_framed(&mut hasher, arg.as_bytes());
    }

    hasher.update(b"targets");
    hasher.update((stage.files.len() as u64).to_le_bytes());
    for file in &stage.files {
        update_framed(&mut hasher, file.target.to_string_lossy().as_bytes());
    }

    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(DECLARATION_HEX_LEN);
    digest
}

/// Hash of the bytes of every input file, in list order
pub async fn content_hash(files: &[PathMapping]) -> Result<String, GradeError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];

    for file in files {
        hash_file(&mut hasher, &file.source, &mut buf).await?;
    }

    Ok(hex::encode(hasher.finalize()))
}

async fn hash_file(hasher: &mut Sha256, path: &Path, buf: &mut [u8]) -> Result<(), GradeError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| GradeError::io(path, e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| GradeError::io(path, e))?
        .len();
    hasher.update(len.to_le_bytes());

    loop {
        let read = file.read(buf).await.map_err(|e| GradeError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(())
}
