//! Flat, exact L2 nearest-neighbor index with a parallel metadata list.
//!
//! Vectors live in one contiguous buffer; offset `i` in the buffer and in the
//! metadata list refer to the same document. Persistence is explicit: the
//! geometric store goes to a binary file (bincode header + little-endian f32
//! payload, read back through a memory map) and the metadata goes to a JSON
//! array. The two writes are not transactional.

use memmap2::Mmap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Number;
use crate::error::{RagError, Result};
use crate::record::SearchHit;
use crate::vector_ops::l2_distance_squared;

const INDEX_MAGIC: [u8; 4] = *b"CGIX";
const INDEX_VERSION: u32 = 1;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
struct IndexHeader {
    magic: [u8; 4],
    version: u32,
    dimension: u32,
    count: u64,
}

impl IndexHeader {
    fn new(dimension: usize, count: usize) -> Result<Self> {
        let dimension = u32::try_from(dimension).map_err(|_| {
            RagError::CorruptIndex(format!("dimension {} does not fit the header", dimension))
        })?;
        Ok(Self {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            dimension,
            count: count as u64,
        })
    }

    fn encoded_len() -> Result<usize> {
        Ok(bincode::serialized_size(&IndexHeader {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            dimension: 0,
            count: 0,
        })? as usize)
    }
}

/// Locations of the two persisted files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub index_file: PathBuf,
    pub metadata_file: PathBuf,
}

impl IndexPaths {
    pub fn new(index_file: impl Into<PathBuf>, metadata_file: impl Into<PathBuf>) -> Self {
        Self {
            index_file: index_file.into(),
            metadata_file: metadata_file.into(),
        }
    }
}

struct FlatStore {
    dimension: usize,
    vectors: Vec<Number>,
    metadata: Vec<String>,
}

impl FlatStore {
    fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    fn count(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    fn vector(&self, offset: usize) -> &[Number] {
        let start = offset * self.dimension;
        &self.vectors[start..start + self.dimension]
    }
}

/// Exact nearest-neighbor store. Created uninitialized, then loaded from disk
/// or created empty by [`VectorIndex::initialize`].
pub struct VectorIndex {
    paths: IndexPaths,
    store: Option<FlatStore>,
}

impl VectorIndex {
    pub fn new(paths: IndexPaths) -> Self {
        Self { paths, store: None }
    }

    /// Shorthand for `new` followed by `initialize`.
    pub fn open(paths: IndexPaths, dimension: usize) -> Result<Self> {
        let mut index = Self::new(paths);
        index.initialize(dimension)?;
        Ok(index)
    }

    /// Loads the persisted index if its file exists, otherwise creates an
    /// empty one. The loaded dimension wins over `dimension`.
    pub fn initialize(&mut self, dimension: usize) -> Result<()> {
        if self.store.is_some() {
            debug!("Vector index already initialized; ignoring repeated initialize");
            return Ok(());
        }

        if self.paths.index_file.exists() {
            self.load()?;
            if let Some(loaded) = self.dimension() {
                if loaded != dimension {
                    warn!(
                        "Loaded index dimension {} differs from requested {}; using {}",
                        loaded, dimension, loaded
                    );
                }
            }
            return Ok(());
        }

        if dimension == 0 {
            return Err(RagError::Config(
                "index dimension must be greater than zero".to_string(),
            ));
        }
        self.store = Some(FlatStore::empty(dimension));
        info!("New flat L2 index initialized with dimension {}.", dimension);
        Ok(())
    }

    /// Replaces the in-memory state with the persisted files.
    pub fn load(&mut self) -> Result<()> {
        let (dimension, vectors) = read_index_file(&self.paths.index_file)?;
        let count = vectors.len() / dimension;
        info!(
            "Vector index loaded from {}. Size: {}",
            self.paths.index_file.display(),
            count
        );

        let metadata: Vec<String> = if self.paths.metadata_file.exists() {
            let file = File::open(&self.paths.metadata_file)?;
            let metadata: Vec<String> = serde_json::from_reader(BufReader::new(file))?;
            info!("Loaded metadata with {} entries.", metadata.len());
            metadata
        } else {
            warn!(
                "No metadata file found at {}. Metadata is empty.",
                self.paths.metadata_file.display()
            );
            Vec::new()
        };

        if metadata.len() != count {
            warn!(
                "Index and metadata have drifted: {} vectors, {} metadata entries",
                count,
                metadata.len()
            );
        }

        self.store = Some(FlatStore {
            dimension,
            vectors,
            metadata,
        });
        Ok(())
    }

    /// Writes the geometric store, then the metadata list.
    pub fn save(&self) -> Result<()> {
        let store = self.store.as_ref().ok_or(RagError::NotInitialized)?;

        write_index_file(&self.paths.index_file, store.dimension, &store.vectors)?;
        info!("Vector index saved to {}.", self.paths.index_file.display());

        ensure_parent(&self.paths.metadata_file)?;
        let mut writer = BufWriter::new(File::create(&self.paths.metadata_file)?);
        serde_json::to_writer(&mut writer, &store.metadata)?;
        writer.flush()?;
        info!("Metadata saved to {}.", self.paths.metadata_file.display());
        Ok(())
    }

    /// Appends one document and returns its offset.
    pub fn add(&mut self, vector: &[Number], metadata: impl Into<String>) -> Result<usize> {
        let store = self.store.as_mut().ok_or(RagError::NotInitialized)?;
        if vector.len() != store.dimension {
            return Err(RagError::DimensionMismatch {
                expected: store.dimension,
                actual: vector.len(),
            });
        }

        let offset = store.count();
        store.vectors.extend_from_slice(vector);
        store.metadata.push(metadata.into());
        debug!(
            "Added embedding. Index size: {}, metadata length: {}",
            store.count(),
            store.metadata.len()
        );
        Ok(offset)
    }

    /// Metadata of up to `k` nearest documents, closest first.
    pub fn search(&self, query: &[Number], k: usize) -> Vec<String> {
        self.search_hits(query, k)
            .into_iter()
            .map(|hit| hit.metadata)
            .collect()
    }

    /// Ranked neighbors by ascending squared L2 distance, ties broken by the
    /// lower offset. Never fails: an unusable index or query yields nothing.
    pub fn search_hits(&self, query: &[Number], k: usize) -> Vec<SearchHit> {
        let store = match self.store.as_ref() {
            Some(store) if store.count() > 0 => store,
            _ => {
                warn!("Vector index is not initialized or empty.");
                return Vec::new();
            }
        };
        if k == 0 {
            return Vec::new();
        }
        if query.len() != store.dimension {
            warn!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                store.dimension
            );
            return Vec::new();
        }

        let mut scored: Vec<(usize, Number)> = (0..store.count())
            .into_par_iter()
            .filter_map(|offset| {
                l2_distance_squared(query, store.vector(offset)).map(|d| (offset, d))
            })
            .collect();

        scored.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        scored
            .into_iter()
            .filter_map(|(offset, distance)| match store.metadata.get(offset) {
                Some(metadata) => Some(SearchHit {
                    offset,
                    distance,
                    metadata: metadata.clone(),
                }),
                None => {
                    warn!("Invalid index {} encountered during search.", offset);
                    None
                }
            })
            .collect()
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.store.as_ref().map(|s| s.dimension)
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.store.as_ref().map_or(0, FlatStore::count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metadata_len(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.metadata.len())
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_index_file(path: &Path, dimension: usize, vectors: &[Number]) -> Result<()> {
    ensure_parent(path)?;
    let header = IndexHeader::new(dimension, vectors.len() / dimension)?;

    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, &header)?;
    for value in vectors {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

fn read_index_file(path: &Path) -> Result<(usize, Vec<Number>)> {
    let file = File::open(path)?;
    let header_len = IndexHeader::encoded_len()?;
    let file_len = file.metadata()?.len() as usize;
    if file_len < header_len {
        return Err(RagError::CorruptIndex(format!(
            "{} is {} bytes, shorter than the {}-byte header",
            path.display(),
            file_len,
            header_len
        )));
    }

    let mmap = unsafe { Mmap::map(&file)? };
    let header: IndexHeader = bincode::deserialize(&mmap[..header_len])?;
    if header.magic != INDEX_MAGIC {
        return Err(RagError::CorruptIndex(format!(
            "{} is not a vector index file",
            path.display()
        )));
    }
    if header.version != INDEX_VERSION {
        return Err(RagError::CorruptIndex(format!(
            "unsupported index version {}",
            header.version
        )));
    }
    let dimension = header.dimension as usize;
    if dimension == 0 {
        return Err(RagError::CorruptIndex("zero dimension".to_string()));
    }

    let vector_size = dimension * size_of::<Number>();
    let available = (mmap.len() - header_len) / vector_size;
    let count = if (available as u64) < header.count {
        warn!(
            "Index file {} declares {} vectors but holds {}; loading the complete ones",
            path.display(),
            header.count,
            available
        );
        available
    } else {
        header.count as usize
    };

    let body = &mmap[header_len..header_len + count * vector_size];
    let vectors = body
        .chunks_exact(size_of::<Number>())
        .map(|b| Number::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((dimension, vectors))
}
