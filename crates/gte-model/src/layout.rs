//! The fixed tensor order of a `.gtemodel` artifact.
//!
//! The artifact stores no names, shapes or offsets for its tensors. A reader
//! recovers each tensor purely from its position in this sequence and the
//! header values, so the order here is the format. Changing it requires a new
//! magic.

use crate::config::ModelConfig;
use crate::format::{HEADER_LEN, VOCAB_LEN_PREFIX};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Tensor {name} with shape {shape:?} is too large to address")]
    TensorTooLarge { name: String, shape: Vec<usize> },

    #[error("Artifact size overflows 64 bits")]
    ArtifactTooLarge,
}

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Row count of `embeddings.token_type_embeddings.weight`.
///
/// Not carried in the header; the format fixes it at two segment types.
pub const TYPE_VOCAB_SIZE: usize = 2;

/// Tensors before the first encoder layer.
pub const EMBEDDING_TENSORS: [&str; 5] = [
    "embeddings.word_embeddings.weight",
    "embeddings.position_embeddings.weight",
    "embeddings.token_type_embeddings.weight",
    "embeddings.LayerNorm.weight",
    "embeddings.LayerNorm.bias",
];

/// Per-layer tensor suffixes, appended to `encoder.layer.{i}.`.
pub const LAYER_TENSORS: [&str; 16] = [
    "attention.self.query.weight",
    "attention.self.query.bias",
    "attention.self.key.weight",
    "attention.self.key.bias",
    "attention.self.value.weight",
    "attention.self.value.bias",
    "attention.output.dense.weight",
    "attention.output.dense.bias",
    "attention.output.LayerNorm.weight",
    "attention.output.LayerNorm.bias",
    "intermediate.dense.weight",
    "intermediate.dense.bias",
    "output.dense.weight",
    "output.dense.bias",
    "output.LayerNorm.weight",
    "output.LayerNorm.bias",
];

/// Tensors after the last encoder layer.
pub const POOLER_TENSORS: [&str; 2] = ["pooler.dense.weight", "pooler.dense.bias"];

/// Which part of the model a planned tensor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Embeddings,
    Layer(u32),
    Pooler,
}

/// One entry of the plan: a tensor name and the shape a reader expects for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub section: Section,
}

impl PlannedTensor {
    fn too_large(&self) -> LayoutError {
        LayoutError::TensorTooLarge {
            name: self.name.clone(),
            shape: self.shape.clone(),
        }
    }

    /// Product of the dimensions.
    pub fn element_count(&self) -> Result<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| self.too_large())
    }

    /// Payload size in the artifact.
    pub fn byte_len(&self) -> Result<u64> {
        u64::try_from(self.element_count()?)
            .ok()
            .and_then(|count| count.checked_mul(4))
            .ok_or_else(|| self.too_large())
    }
}

/// Number of tensors an artifact with `num_layers` layers holds.
pub fn plan_len(num_layers: u32) -> usize {
    EMBEDDING_TENSORS.len() + LAYER_TENSORS.len() * num_layers as usize + POOLER_TENSORS.len()
}

fn layer_prefix(layer_idx: u32) -> String {
    format!("encoder.layer.{layer_idx}")
}

/// Tensor names in artifact order.
pub fn plan(num_layers: u32) -> Vec<String> {
    let mut names = Vec::with_capacity(plan_len(num_layers));
    names.extend(EMBEDDING_TENSORS.iter().map(|n| n.to_string()));
    for layer_idx in 0..num_layers {
        let prefix = layer_prefix(layer_idx);
        names.extend(LAYER_TENSORS.iter().map(|suffix| format!("{prefix}.{suffix}")));
    }
    names.extend(POOLER_TENSORS.iter().map(|n| n.to_string()));
    names
}

fn embedding_tensors(config: ModelConfig) -> impl Iterator<Item = PlannedTensor> {
    let vocab = config.vocab_size as usize;
    let hidden = config.hidden_size as usize;
    let max_seq = config.max_seq_length as usize;
    let shapes = [
        vec![vocab, hidden],
        vec![max_seq, hidden],
        vec![TYPE_VOCAB_SIZE, hidden],
        vec![hidden],
        vec![hidden],
    ];

    EMBEDDING_TENSORS
        .into_iter()
        .zip(shapes)
        .map(|(name, shape)| PlannedTensor {
            name: name.to_string(),
            shape,
            section: Section::Embeddings,
        })
}

fn layer_tensors(config: ModelConfig, layer_idx: u32) -> impl Iterator<Item = PlannedTensor> {
    let hidden = config.hidden_size as usize;
    let inter = config.intermediate_size as usize;
    let shapes = [
        vec![hidden, hidden],
        vec![hidden],
        vec![hidden, hidden],
        vec![hidden],
        vec![hidden, hidden],
        vec![hidden],
        vec![hidden, hidden],
        vec![hidden],
        vec![hidden],
        vec![hidden],
        vec![inter, hidden],
        vec![inter],
        vec![hidden, inter],
        vec![hidden],
        vec![hidden],
        vec![hidden],
    ];

    let prefix = layer_prefix(layer_idx);
    LAYER_TENSORS
        .into_iter()
        .zip(shapes)
        .map(move |(suffix, shape)| PlannedTensor {
            name: format!("{prefix}.{suffix}"),
            shape,
            section: Section::Layer(layer_idx),
        })
}

fn pooler_tensors(config: ModelConfig) -> impl Iterator<Item = PlannedTensor> {
    let hidden = config.hidden_size as usize;
    let shapes = [vec![hidden, hidden], vec![hidden]];

    POOLER_TENSORS
        .into_iter()
        .zip(shapes)
        .map(|(name, shape)| PlannedTensor {
            name: name.to_string(),
            shape,
            section: Section::Pooler,
        })
}

fn sum_bytes(mut tensors: impl Iterator<Item = PlannedTensor>) -> Result<u64> {
    tensors.try_fold(0u64, |total, tensor| {
        total
            .checked_add(tensor.byte_len()?)
            .ok_or(LayoutError::ArtifactTooLarge)
    })
}

/// Total size of the tensor section for `config`.
///
/// Every layer has the same shapes, so this costs the same for any layer
/// count. Fails if any tensor or the total does not fit in 64 bits.
pub fn tensor_section_len(config: &ModelConfig) -> Result<u64> {
    let config = *config;
    let embeddings = sum_bytes(embedding_tensors(config))?;
    let layer = sum_bytes(layer_tensors(config, 0))?;
    let pooler = sum_bytes(pooler_tensors(config))?;

    layer
        .checked_mul(u64::from(config.num_layers))
        .and_then(|layers| layers.checked_add(embeddings))
        .and_then(|total| total.checked_add(pooler))
        .ok_or(LayoutError::ArtifactTooLarge)
}

/// The plan for `config`, with each tensor's expected shape, in artifact order.
///
/// Tensors are produced lazily. Sizes are checked up front, so every yielded
/// tensor has a valid [`PlannedTensor::byte_len`].
///
/// Linear weights are `[out_features, in_features]`, as stored upstream.
pub fn plan_tensors(
    config: &ModelConfig,
) -> Result<impl Iterator<Item = PlannedTensor> + use<>> {
    tensor_section_len(config)?;

    let config = *config;
    let layers = (0..config.num_layers).flat_map(move |layer_idx| layer_tensors(config, layer_idx));
    Ok(embedding_tensors(config)
        .chain(layers)
        .chain(pooler_tensors(config)))
}

/// Encoded size of the vocabulary table.
pub fn vocab_table_len(vocab: &[String]) -> u64 {
    vocab
        .iter()
        .map(|token| (VOCAB_LEN_PREFIX + token.len()) as u64)
        .sum()
}

/// Exact byte length of the artifact for `config` and `vocab`.
pub fn expected_artifact_size(config: &ModelConfig, vocab: &[String]) -> Result<u64> {
    tensor_section_len(config)?
        .checked_add(HEADER_LEN as u64 + vocab_table_len(vocab))
        .ok_or(LayoutError::ArtifactTooLarge)
}
