//! Named tensor lookup.
//!
//! Implementations:
//! - `SafetensorsSource` - Memory-mapped `model.safetensors` via candle
//! - `InMemoryTensorSource` - For testing and for callers that already hold weights
//!
//! Sources hand out one tensor at a time so a conversion never holds more
//! than a single tensor's f32 copy in memory.

use candle_core::safetensors::MmapedSafetensors;
use candle_core::{DType, Device};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("Tensor not found: {0}")]
    NotFound(String),

    #[error("Tensor {name} has {len} elements, which does not fill shape {shape:?}")]
    Inconsistent {
        name: String,
        shape: Vec<usize>,
        len: usize,
    },

    #[error("Tensor archive error: {0}")]
    Archive(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// A fetched tensor: row-major f32 elements plus their shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorHandle {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorHandle {
    /// Build a handle, checking that `data` fills `shape` exactly.
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        if element_count(&shape) != Some(data.len()) {
            return Err(TensorError::Inconsistent {
                name,
                shape,
                len: data.len(),
            });
        }
        Ok(Self { name, shape, data })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Product of dimensions, or `None` if it overflows. A rank-0 shape holds
/// one element.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Fetch-by-name capability over a weight archive.
pub trait TensorSource {
    /// Fetch a tensor converted to f32. Fails with [`TensorError::NotFound`]
    /// if the archive has no tensor under `name`.
    fn fetch(&self, name: &str) -> Result<TensorHandle>;

    /// Every tensor in the archive with its stored shape, sorted by name.
    fn inventory(&self) -> Vec<(String, Vec<usize>)>;
}

impl<T: TensorSource + ?Sized> TensorSource for &T {
    fn fetch(&self, name: &str) -> Result<TensorHandle> {
        (**self).fetch(name)
    }

    fn inventory(&self) -> Vec<(String, Vec<usize>)> {
        (**self).inventory()
    }
}

/// Tensor source backed by a memory-mapped safetensors file.
pub struct SafetensorsSource {
    archive: MmapedSafetensors,
    shapes: BTreeMap<String, Vec<usize>>,
    device: Device,
}

impl SafetensorsSource {
    /// Map a safetensors file and index its tensor names.
    pub fn open(path: &Path) -> Result<Self> {
        // SAFETY: the mapping is read-only and the archive is not expected to be
        // modified by another process for the duration of the conversion.
        let archive = unsafe { MmapedSafetensors::new(path)? };
        let shapes = archive
            .tensors()
            .into_iter()
            .map(|(name, view)| {
                let shape = view.shape().to_vec();
                (name, shape)
            })
            .collect();

        Ok(Self {
            archive,
            shapes,
            device: Device::Cpu,
        })
    }

    /// Number of tensors in the archive.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl TensorSource for SafetensorsSource {
    fn fetch(&self, name: &str) -> Result<TensorHandle> {
        if !self.shapes.contains_key(name) {
            return Err(TensorError::NotFound(name.to_string()));
        }

        let tensor = self.archive.load(name, &self.device)?;
        let shape = tensor.dims().to_vec();
        let data = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        TensorHandle::new(name, shape, data)
    }

    fn inventory(&self) -> Vec<(String, Vec<usize>)> {
        self.shapes
            .iter()
            .map(|(name, shape)| (name.clone(), shape.clone()))
            .collect()
    }
}

/// Tensor source holding its tensors in a map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTensorSource {
    tensors: HashMap<String, TensorHandle>,
}

impl InMemoryTensorSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tensor.
    pub fn insert(&mut self, tensor: TensorHandle) {
        self.tensors.insert(tensor.name.clone(), tensor);
    }

    /// Remove a tensor, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<TensorHandle> {
        self.tensors.remove(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl TensorSource for InMemoryTensorSource {
    fn fetch(&self, name: &str) -> Result<TensorHandle> {
        self.tensors
            .get(name)
            .cloned()
            .ok_or_else(|| TensorError::NotFound(name.to_string()))
    }

    fn inventory(&self) -> Vec<(String, Vec<usize>)> {
        let mut entries: Vec<_> = self
            .tensors
            .values()
            .map(|t| (t.name.clone(), t.shape.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Tensor;
    use tempfile::TempDir;

    #[test]
    fn test_handle_rejects_wrong_element_count() {
        let err = TensorHandle::new("w", vec![2, 3], vec![0.0; 5]).unwrap_err();
        match err {
            TensorError::Inconsistent { len, shape, .. } => {
                assert_eq!(len, 5);
                assert_eq!(shape, vec![2, 3]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scalar_shape_holds_one_element() {
        assert_eq!(element_count(&[]), Some(1));
        assert!(TensorHandle::new("s", vec![], vec![1.0]).is_ok());
    }

    #[test]
    fn test_overflowing_shape_is_inconsistent() {
        assert_eq!(element_count(&[usize::MAX, 2]), None);
        assert!(matches!(
            TensorHandle::new("w", vec![usize::MAX, 2], vec![0.0; 2]),
            Err(TensorError::Inconsistent { len: 2, .. })
        ));
    }

    #[test]
    fn test_in_memory_fetch_and_not_found() {
        let mut source = InMemoryTensorSource::new();
        source.insert(TensorHandle::new("b", vec![2], vec![1.0, 2.0]).unwrap());
        source.insert(TensorHandle::new("a", vec![1], vec![3.0]).unwrap());

        assert_eq!(source.fetch("b").unwrap().data, vec![1.0, 2.0]);
        assert!(matches!(
            source.fetch("missing"),
            Err(TensorError::NotFound(name)) if name == "missing"
        ));

        let names: Vec<_> = source.inventory().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_safetensors_source_converts_to_f32() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.safetensors");

        let weight = Tensor::new(&[[0.5f32, -1.0], [2.0, 0.25]], &Device::Cpu)
            .unwrap()
            .to_dtype(DType::F16)
            .unwrap();
        let bias = Tensor::new(&[1.5f64, -2.5], &Device::Cpu).unwrap();
        let tensors = HashMap::from([
            ("dense.weight".to_string(), weight),
            ("dense.bias".to_string(), bias),
        ]);
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let source = SafetensorsSource::open(&path).unwrap();
        assert_eq!(source.len(), 2);

        let weight = source.fetch("dense.weight").unwrap();
        assert_eq!(weight.shape, vec![2, 2]);
        assert_eq!(weight.data, vec![0.5, -1.0, 2.0, 0.25]);

        let bias = source.fetch("dense.bias").unwrap();
        assert_eq!(bias.data, vec![1.5, -2.5]);

        assert!(matches!(
            source.fetch("dense.missing"),
            Err(TensorError::NotFound(_))
        ));
        assert_eq!(
            source.inventory(),
            vec![
                ("dense.bias".to_string(), vec![2]),
                ("dense.weight".to_string(), vec![2, 2]),
            ]
        );
    }

    #[test]
    fn test_safetensors_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = SafetensorsSource::open(&dir.path().join("absent.safetensors"));
        assert!(matches!(result, Err(TensorError::Archive(_))));
    }
}
