//! Chunk file naming.
//!
//! Chunk files are named `{prefix}{index:06}.{version:06}`. A chunk is
//! rewritten (scavenged, merged, replicated) by writing a temp file and
//! renaming it to the next free version of the same index, so several
//! versions of an index can coexist briefly on disk.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use evlog_error::Result;
use uuid::Uuid;

/// Maps chunk numbers and versions to file paths.
pub trait FileNamingStrategy: fmt::Debug + Send + Sync {
    /// Path of version `version` of chunk `index`.
    fn filename_for(&self, index: usize, version: u32) -> PathBuf;

    /// A fresh, unique path for a chunk that is still being built.
    fn temp_filename(&self) -> PathBuf;

    /// Every existing version of chunk `index`, highest version first.
    fn all_versions_for(&self, index: usize) -> Result<Vec<PathBuf>>;

    /// Every chunk file in the directory, sorted by name.
    fn all_present_files(&self) -> Result<Vec<PathBuf>>;

    /// Every leftover temp file in the directory.
    fn all_temp_files(&self) -> Result<Vec<PathBuf>>;

    /// The path the next version of chunk `index` should be written to.
    fn determine_best_version_filename_for(&self, index: usize) -> Result<PathBuf> {
        let versions = self.all_versions_for(index)?;
        let next = versions
            .first()
            .and_then(|path| self.version_of(path))
            .map_or(0, |version| version + 1);
        Ok(self.filename_for(index, next))
    }

    /// Parse the version out of a path produced by [`Self::filename_for`].
    fn version_of(&self, path: &Path) -> Option<u32>;
}

/// `{prefix}{index:06}.{version:06}` inside a single directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPatternFileNamingStrategy {
    dir: PathBuf,
    prefix: String,
}

impl VersionedPatternFileNamingStrategy {
    /// Default prefix for chunk files.
    pub const DEFAULT_PREFIX: &'static str = "chunk-";

    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn parse(&self, file_name: &str) -> Option<(usize, u32)> {
        let rest = file_name.strip_prefix(self.prefix.as_str())?;
        let (index_text, version_text) = rest.split_once('.')?;
        if index_text.len() < 6 || version_text.len() < 6 {
            return None;
        }
        if !index_text.bytes().all(|b| b.is_ascii_digit())
            || !version_text.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some((index_text.parse().ok()?, version_text.parse().ok()?))
    }

    fn scan(&self) -> Result<Vec<(String, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            files.push((name.to_owned(), entry.path()));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

impl FileNamingStrategy for VersionedPatternFileNamingStrategy {
    fn filename_for(&self, index: usize, version: u32) -> PathBuf {
        self.dir
            .join(format!("{}{index:06}.{version:06}", self.prefix))
    }

    fn temp_filename(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", Uuid::new_v4()))
    }

    fn all_versions_for(&self, index: usize) -> Result<Vec<PathBuf>> {
        let mut versions: Vec<(u32, PathBuf)> = self
            .scan()?
            .into_iter()
            .filter_map(|(name, path)| {
                let (file_index, version) = self.parse(&name)?;
                (file_index == index).then_some((version, path))
            })
            .collect();
        versions.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(versions.into_iter().map(|(_, path)| path).collect())
    }

    fn all_present_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|(name, _)| self.parse(name).is_some())
            .map(|(_, path)| path)
            .collect())
    }

    fn all_temp_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|(name, _)| {
                Path::new(name)
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("tmp"))
            })
            .map(|(_, path)| path)
            .collect())
    }

    fn version_of(&self, path: &Path) -> Option<u32> {
        let name = path.file_name()?.to_str()?;
        self.parse(name).map(|(_, version)| version)
    }
}
