//! Sorted word index queried by binary search over a fixed-width cache file
//!
//! The source word list is preprocessed once into a cache where every entry
//! occupies exactly `line_width` bytes (NUL-padded) followed by `\n`. A
//! membership query seeks straight to each midpoint entry, so only
//! `O(log n)` entries are ever read and the list is never loaded into
//! memory.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{self, AtomicU64};
use std::sync::OnceLock;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Result, VaultError};

/// Entries longer than this many characters are dropped by default
pub const DEFAULT_MAX_LENGTH: usize = 15;

/// Extension of the derived cache file
pub const CACHE_EXTENSION: &str = "ws";

const TERMINATOR: u8 = b'\n';

/// Upper bound on the first cache line when probing its width
const MAX_LINE_SCAN: u64 = 4096;

/// Where the word list lives and how it is indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryConfig {
    /// Newline-separated source word list
    pub source: PathBuf,
    /// Cache file; defaults to the source path with a `.ws` extension
    pub cache: Option<PathBuf>,
    /// Maximum entry length in characters
    pub max_length: usize,
}

impl DictionaryConfig {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            cache: None,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    pub fn with_cache(mut self, cache: impl Into<PathBuf>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Resolved cache file path
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .clone()
            .unwrap_or_else(|| self.source.with_extension(CACHE_EXTENSION))
    }
}

/// Read-only membership index over a cache file
///
/// Safe to share between threads; each query opens its own file handle.
#[derive(Debug)]
pub struct DictionaryIndex {
    path: PathBuf,
    line_width: usize,
    entry_count: u64,
    max_length: usize,
    seeks: AtomicU64,
}

impl DictionaryIndex {
    /// Open the index, building the cache file first if it is absent
    pub fn open(config: &DictionaryConfig) -> Result<Self> {
        let path = config.cache_path();

        let (line_width, entry_count) = if path.exists() {
            debug!("Using existing dictionary cache {}", path.display());
            read_layout(&path)?
        } else {
            build_cache(&config.source, &path, config.max_length)?
        };

        Ok(Self {
            path,
            line_width,
            entry_count,
            max_length: config.max_length,
            seeks: AtomicU64::new(0),
        })
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of indexed entries
    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Width in bytes of every padded entry
    pub fn line_width(&self) -> usize {
        self.line_width
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Total seeks performed by queries so far
    pub fn seek_count(&self) -> u64 {
        self.seeks.load(atomic::Ordering::Relaxed)
    }

    /// Whether `candidate` is an entry of the word list
    pub fn contains(&self, candidate: &str) -> Result<bool> {
        // Never stored, so no need to touch the file
        if candidate.is_empty()
            || self.entry_count == 0
            || candidate.len() > self.line_width
            || candidate.chars().count() > self.max_length
        {
            return Ok(false);
        }

        let mut file = File::open(&self.path)?;
        let stride = self.line_width as u64 + 1;
        let mut entry = vec![0u8; self.line_width];
        let (mut low, mut high) = (0u64, self.entry_count);

        while low < high {
            let mid = low + (high - low) / 2;
            file.seek(SeekFrom::Start(mid * stride))?;
            self.seeks.fetch_add(1, atomic::Ordering::Relaxed);
            file.read_exact(&mut entry)?;

            match strip_padding(&entry).cmp(candidate.as_bytes()) {
                Ordering::Equal => return Ok(true),
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
            }
        }

        Ok(false)
    }
}

fn strip_padding(entry: &[u8]) -> &[u8] {
    let end = entry.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &entry[..end]
}

/// Derive `(line_width, entry_count)` from an existing cache file
fn read_layout(cache: &Path) -> Result<(usize, u64)> {
    let file = File::open(cache)?;
    let file_len = file.metadata()?.len();
    if file_len == 0 {
        return Ok((0, 0));
    }

    let mut first = Vec::new();
    BufReader::new(file)
        .take(MAX_LINE_SCAN)
        .read_until(TERMINATOR, &mut first)?;

    if first.last() != Some(&TERMINATOR) || first.len() < 2 {
        return Err(VaultError::Dictionary(format!(
            "{}: first entry has no terminator",
            cache.display()
        )));
    }

    let line_width = first.len() - 1;
    let stride = line_width as u64 + 1;
    if file_len % stride != 0 {
        return Err(VaultError::Dictionary(format!(
            "{}: size {} is not a multiple of {}",
            cache.display(),
            file_len,
            stride
        )));
    }

    Ok((line_width, file_len / stride))
}

/// Preprocess `source` into the fixed-width cache at `cache`
fn build_cache(source: &Path, cache: &Path, max_length: usize) -> Result<(usize, u64)> {
    let file = File::open(source).map_err(|err| {
        VaultError::Dictionary(format!("cannot read word list {}: {}", source.display(), err))
    })?;

    let mut words = Vec::new();
    let mut dropped = 0usize;
    for line in BufReader::new(file).split(TERMINATOR) {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() || line.contains(&0) {
            continue;
        }
        let word = String::from_utf8_lossy(&line).into_owned();
        if word.chars().count() > max_length {
            dropped += 1;
            continue;
        }
        words.push(word);
    }

    if !words.windows(2).all(|pair| pair[0] <= pair[1]) {
        debug!("Sorting {} dictionary entries", words.len());
        words.sort_unstable();
    }

    let line_width = words.iter().map(String::len).max().unwrap_or(0);

    // Unique sibling file, renamed over the cache once complete
    let dir = match cache.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(&mut temp);
        let mut line = vec![0u8; line_width + 1];
        for word in &words {
            line.fill(0);
            line[..word.len()].copy_from_slice(word.as_bytes());
            line[line_width] = TERMINATOR;
            out.write_all(&line)?;
        }
        out.flush()?;
    }
    temp.persist(cache).map_err(|err| err.error)?;

    info!(
        "Built dictionary cache {} ({} entries, width {}, {} too long)",
        cache.display(),
        words.len(),
        line_width,
        dropped
    );
    Ok((line_width, words.len() as u64))
}

/// Dictionary built on first use
///
/// Owned by whoever needs it (the vault) rather than living in a global.
#[derive(Debug)]
pub struct LazyDictionary {
    config: DictionaryConfig,
    index: OnceLock<DictionaryIndex>,
}

impl LazyDictionary {
    pub fn new(config: DictionaryConfig) -> Self {
        Self {
            config,
            index: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }

    /// Whether the index has been opened yet
    pub fn is_loaded(&self) -> bool {
        self.index.get().is_some()
    }

    /// Open the index if needed and return it
    pub fn get(&self) -> Result<&DictionaryIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let opened = DictionaryIndex::open(&self.config)?;
        Ok(self.index.get_or_init(|| opened))
    }

    pub fn contains(&self, candidate: &str) -> Result<bool> {
        self.get()?.contains(candidate)
    }
}
