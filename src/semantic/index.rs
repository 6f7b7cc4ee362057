//! Vector index seam and an in-memory implementation with L2 kNN search.
//!
//! Inserts are staged and only become searchable after [`VectorIndex::flush`],
//! mirroring how remote vector stores behave.

use std::collections::HashMap;
use std::sync::RwLock;

/// A search hit: the stored text and its L2 distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub text: String,
    pub distance: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(usize),

    #[error("Index unavailable: {0}")]
    Unavailable(String),
}

/// Named collections of `(text, embedding)` entries.
pub trait VectorIndex: Send + Sync {
    fn has_collection(&self, name: &str) -> Result<bool, IndexError>;

    /// Drop `name` if it exists.
    fn drop_collection(&self, name: &str) -> Result<(), IndexError>;

    fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), IndexError>;

    /// Drop any existing collection called `name` and create an empty one.
    fn create_or_reset(&self, name: &str, dimensions: usize) -> Result<(), IndexError> {
        if self.has_collection(name)? {
            log::info!("dropping existing collection '{name}'");
            self.drop_collection(name)?;
        }
        self.create_collection(name, dimensions)
    }

    /// Stage entries keyed by text; a repeated text replaces its embedding.
    fn insert(&self, name: &str, entries: &[(String, Vec<f32>)]) -> Result<usize, IndexError>;

    /// Make staged entries searchable.
    fn flush(&self, name: &str) -> Result<(), IndexError>;

    /// Up to `k` searchable entries, nearest first.
    fn knn_search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<Hit>, IndexError>;

    /// Number of searchable entries.
    fn len(&self, name: &str) -> Result<usize, IndexError>;
}

#[derive(Debug, Clone)]
struct VectorEntry {
    text: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    entries: Vec<VectorEntry>,
    positions: HashMap<String, usize>,
    staged: Vec<VectorEntry>,
}

impl Collection {
    fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Default::default()
        }
    }

    fn check_dimensions(&self, got: usize) -> Result<(), IndexError> {
        if got != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got,
            });
        }
        Ok(())
    }

    fn commit(&mut self) {
        for entry in std::mem::take(&mut self.staged) {
            match self.positions.get(&entry.text) {
                Some(&pos) => self.entries[pos] = entry,
                None => {
                    self.positions.insert(entry.text.clone(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
    }
}

/// In-process vector index, safe to share across query workers.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(
        &self,
        name: &str,
        op: impl FnOnce(&Collection) -> Result<R, IndexError>,
    ) -> Result<R, IndexError> {
        let collections = self
            .collections
            .read()
            .map_err(|e| IndexError::Unavailable(format!("lock poisoned: {e}")))?;
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::UnknownCollection(name.to_string()))?;
        op(collection)
    }

    fn write<R>(
        &self,
        name: &str,
        op: impl FnOnce(&mut Collection) -> Result<R, IndexError>,
    ) -> Result<R, IndexError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| IndexError::Unavailable(format!("lock poisoned: {e}")))?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::UnknownCollection(name.to_string()))?;
        op(collection)
    }
}

impl VectorIndex for MemoryIndex {
    fn has_collection(&self, name: &str) -> Result<bool, IndexError> {
        let collections = self
            .collections
            .read()
            .map_err(|e| IndexError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(collections.contains_key(name))
    }

    fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| IndexError::Unavailable(format!("lock poisoned: {e}")))?;
        collections.remove(name);
        Ok(())
    }

    fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), IndexError> {
        if dimensions == 0 {
            return Err(IndexError::InvalidDimensions(dimensions));
        }
        let mut collections = self
            .collections
            .write()
            .map_err(|e| IndexError::Unavailable(format!("lock poisoned: {e}")))?;
        collections.insert(name.to_string(), Collection::new(dimensions));
        Ok(())
    }

    fn insert(&self, name: &str, entries: &[(String, Vec<f32>)]) -> Result<usize, IndexError> {
        self.write(name, |collection| {
            for (_, embedding) in entries {
                collection.check_dimensions(embedding.len())?;
            }
            collection
                .staged
                .extend(entries.iter().map(|(text, embedding)| VectorEntry {
                    text: text.clone(),
                    embedding: embedding.clone(),
                }));
            Ok(entries.len())
        })
    }

    fn flush(&self, name: &str) -> Result<(), IndexError> {
        self.write(name, |collection| {
            collection.commit();
            Ok(())
        })
    }

    fn knn_search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<Hit>, IndexError> {
        self.read(name, |collection| {
            collection.check_dimensions(query.len())?;

            let mut hits: Vec<Hit> = collection
                .entries
                .iter()
                .map(|entry| Hit {
                    text: entry.text.clone(),
                    distance: l2_distance(query, &entry.embedding),
                })
                .filter(|hit| hit.distance.is_finite())
                .collect();

            // stable: ties keep insertion order
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            hits.truncate(k);
            Ok(hits)
        })
    }

    fn len(&self, name: &str) -> Result<usize, IndexError> {
        self.read(name, |collection| Ok(collection.entries.len()))
    }
}

/// Euclidean distance between two equal-length vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
