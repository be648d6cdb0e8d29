//! The conversion pipeline: config, vocabulary, then every planned tensor.

use crate::config::ModelConfig;
use crate::error::{ConvertError, Result};
use crate::layout::{self, Section};
use crate::reader::ArtifactReader;
use crate::tensor::{SafetensorsSource, TensorSource};
use crate::vocab::{check_vocab_size, load_vocab};
use crate::writer::{ArtifactWriter, check_vocabulary};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files expected in a model directory
pub const CONFIG_FILE: &str = "config.json";
pub const VOCAB_FILE: &str = "vocab.txt";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub bytes_written: u64,
    pub tensors_written: usize,
    pub layers_written: u32,
    pub vocab_entries: usize,
}

impl ConversionReport {
    pub fn size_mib(&self) -> f64 {
        self.bytes_written as f64 / 1024.0 / 1024.0
    }
}

/// What [`verify_artifact`] found in a written file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub config: ModelConfig,
    pub vocab_entries: usize,
    pub tensors: usize,
    pub bytes: u64,
}

/// Convert the model in `model_dir` into a `.gtemodel` file at `output`.
///
/// Reads `config.json`, `vocab.txt` and `model.safetensors`. The config, the
/// vocabulary (count and token lengths), the weights archive and the artifact
/// size are all checked before `output` is created. A missing or misshapen
/// tensor is only found while writing and leaves the partial file on disk; it
/// must not be used.
pub fn convert(model_dir: &Path, output: &Path) -> Result<ConversionReport> {
    let config = ModelConfig::load(&model_dir.join(CONFIG_FILE))?;
    log_config(&config);

    let vocab = load_vocab(&model_dir.join(VOCAB_FILE))?;
    check_vocab_size(&vocab, config.vocab_size)?;
    info!("  Loaded {} vocabulary entries", vocab.len());

    let source = SafetensorsSource::open(&model_dir.join(WEIGHTS_FILE))?;
    info!("Opened {} ({} tensors)", WEIGHTS_FILE, source.len());

    pack(&config, &vocab, &source, output)
}

/// Run the pipeline against an arbitrary tensor source.
pub fn convert_with_source<S: TensorSource>(
    config: &ModelConfig,
    vocab: &[String],
    source: &S,
    output: &Path,
) -> Result<ConversionReport> {
    log_config(config);
    check_vocab_size(vocab, config.vocab_size)?;
    info!("  Loaded {} vocabulary entries", vocab.len());

    pack(config, vocab, source, output)
}

fn log_config(config: &ModelConfig) {
    info!("Model config:");
    info!("  vocab_size: {}", config.vocab_size);
    info!("  hidden_size: {}", config.hidden_size);
    info!("  num_layers: {}", config.num_layers);
    info!("  num_heads: {}", config.num_heads);
    info!("  intermediate_size: {}", config.intermediate_size);
    info!("  max_seq_length: {}", config.max_seq_length);

    if !config.heads_divide_hidden() {
        warn!(
            "num_heads ({}) does not divide hidden_size ({}); runtimes will reject this model",
            config.num_heads, config.hidden_size
        );
    }
}

fn pack<S: TensorSource>(
    config: &ModelConfig,
    vocab: &[String],
    source: &S,
    output: &Path,
) -> Result<ConversionReport> {
    debug!("Tensors in source:");
    for (name, shape) in source.inventory() {
        debug!("  {}: {:?}", name, shape);
    }

    check_vocabulary(vocab)?;
    let expected_size = layout::expected_artifact_size(config, vocab)?;
    let mut planned = layout::plan_tensors(config)?.peekable();

    let file = File::create(output).map_err(|source| ConvertError::CreateOutput {
        path: output.display().to_string(),
        source,
    })?;
    let mut writer = ArtifactWriter::new(BufWriter::new(file));

    writer.write_header(config)?;
    writer.write_vocabulary(vocab)?;
    debug!("Header and vocabulary: {} bytes", writer.bytes_written());

    let mut layers_written = 0;
    let mut previous = None;
    while let Some(tensor_plan) = planned.next() {
        if previous != Some(tensor_plan.section) {
            match tensor_plan.section {
                Section::Embeddings => info!("Writing embeddings..."),
                Section::Layer(0) => info!("Writing transformer layers..."),
                Section::Layer(_) => {}
                Section::Pooler => info!("Writing pooler..."),
            }
        }

        let tensor = source.fetch(&tensor_plan.name)?;
        writer.write_tensor(&tensor_plan, &tensor)?;
        debug!(
            "  {} {:?} ({} bytes)",
            tensor_plan.name,
            tensor_plan.shape,
            tensor_plan.byte_len()?
        );

        let section_ends = planned
            .peek()
            .is_none_or(|next| next.section != tensor_plan.section);
        if let (true, Section::Layer(layer_idx)) = (section_ends, tensor_plan.section) {
            layers_written += 1;
            info!("  Layer {} done", layer_idx);
        }
        previous = Some(tensor_plan.section);
    }

    let tensors_written = writer.tensors_written();
    let bytes_written = writer.bytes_written();
    writer.finish()?;

    debug!(
        "Wrote {} bytes, layout predicts {}",
        bytes_written, expected_size
    );
    info!("Model saved to {}", output.display());

    Ok(ConversionReport {
        output: output.to_path_buf(),
        bytes_written,
        tensors_written,
        layers_written,
        vocab_entries: vocab.len(),
    })
}

/// Decode an artifact end to end and check that it holds exactly the
/// header, vocabulary and tensors its header describes.
pub fn verify_artifact(path: &Path) -> Result<ArtifactSummary> {
    let file = File::open(path).map_err(|e| ConvertError::Verify(e.into()))?;
    let mut reader = ArtifactReader::new(BufReader::new(file));

    let config = reader.read_header()?;
    let vocab = reader.read_vocabulary(&config)?;
    let mut tensors = 0;
    for tensor_plan in layout::plan_tensors(&config)? {
        reader.skip_tensor(&tensor_plan)?;
        tensors += 1;
    }
    let bytes = reader.finish()?;
    info!(
        "Verified {}: {} tokens, {} tensors, {} bytes",
        path.display(),
        vocab.len(),
        tensors,
        bytes
    );

    Ok(ArtifactSummary {
        config,
        vocab_entries: vocab.len(),
        tensors,
        bytes,
    })
}
