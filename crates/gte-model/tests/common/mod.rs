#![allow(dead_code)]

use candle_core::{Device, Tensor};
use gte_model::{InMemoryTensorSource, ModelConfig, TensorHandle, plan_tensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// The smallest interesting model: one layer, hidden size 4.
pub fn tiny_config(num_layers: u32) -> ModelConfig {
    ModelConfig {
        vocab_size: 2,
        hidden_size: 4,
        num_layers,
        num_heads: 1,
        intermediate_size: 8,
        max_seq_length: 16,
    }
}

pub fn tiny_vocab() -> Vec<String> {
    vec!["[PAD]".to_string(), "[UNK]".to_string()]
}

/// Deterministic element value: the tensor's plan index plus a small ramp.
pub fn fixture_value(tensor_idx: usize, elem_idx: usize) -> f32 {
    tensor_idx as f32 + elem_idx as f32 / 1024.0
}

/// A source holding every tensor the plan asks for, with the planned shapes.
pub fn fixture_source(config: &ModelConfig) -> InMemoryTensorSource {
    let mut source = InMemoryTensorSource::new();
    for (i, planned) in plan_tensors(config).unwrap().enumerate() {
        let data = (0..planned.element_count().unwrap())
            .map(|j| fixture_value(i, j))
            .collect();
        source.insert(TensorHandle::new(&planned.name, planned.shape.clone(), data).unwrap());
    }
    source
}

/// Write config.json, vocab.txt and model.safetensors for `config`.
pub fn write_model_dir(dir: &Path, config: &ModelConfig, vocab: &[String]) {
    let config_json = serde_json::json!({
        "architectures": ["BertModel"],
        "hidden_act": "gelu",
        "model_type": "bert",
        "type_vocab_size": 2,
        "vocab_size": config.vocab_size,
        "hidden_size": config.hidden_size,
        "num_hidden_layers": config.num_layers,
        "num_attention_heads": config.num_heads,
        "intermediate_size": config.intermediate_size,
        "max_position_embeddings": config.max_seq_length,
    });
    fs::write(dir.join("config.json"), config_json.to_string()).unwrap();

    let mut vocab_txt = vocab.join("\n");
    vocab_txt.push('\n');
    fs::write(dir.join("vocab.txt"), vocab_txt).unwrap();

    let mut tensors = HashMap::new();
    for (i, planned) in plan_tensors(config).unwrap().enumerate() {
        let data: Vec<f32> = (0..planned.element_count().unwrap())
            .map(|j| fixture_value(i, j))
            .collect();
        let tensor = Tensor::from_vec(data, planned.shape.as_slice(), &Device::Cpu).unwrap();
        tensors.insert(planned.name.clone(), tensor);
    }
    candle_core::safetensors::save(&tensors, dir.join("model.safetensors")).unwrap();
}
