//! Conversion from a model directory on disk, through the safetensors source.

mod common;

use candle_core::{DType, Device, Tensor};
use common::{fixture_value, tiny_config, tiny_vocab, write_model_dir};
use gte_model::vocab::VocabularyError;
use gte_model::{
    ArtifactReader, ConfigError, ConvertError, TensorError, convert, plan_tensors,
    verify_artifact,
};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_convert_model_directory() {
    let dir = TempDir::new().unwrap();
    let config = tiny_config(2);
    write_model_dir(dir.path(), &config, &tiny_vocab());

    let output = dir.path().join("model.gtemodel");
    let report = convert(dir.path(), &output).unwrap();
    assert_eq!(report.tensors_written, 5 + 2 * 16 + 2);
    assert_eq!(report.layers_written, 2);

    let summary = verify_artifact(&output).unwrap();
    assert_eq!(summary.config, config);
    assert_eq!(summary.vocab_entries, 2);
    assert_eq!(summary.bytes, report.bytes_written);

    let bytes = fs::read(&output).unwrap();
    let mut reader = ArtifactReader::new(bytes.as_slice());
    let header = reader.read_header().unwrap();
    assert_eq!(reader.read_vocabulary(&header).unwrap(), tiny_vocab());
    for (i, planned) in plan_tensors(&header).unwrap().enumerate() {
        let data = reader.read_tensor(&planned).unwrap();
        assert_eq!(data[0], fixture_value(i, 0), "tensor {}", planned.name);
        assert_eq!(
            data[data.len() - 1],
            fixture_value(i, data.len() - 1),
            "tensor {}",
            planned.name
        );
    }
}

#[test]
fn test_half_precision_weights_are_widened() {
    let dir = TempDir::new().unwrap();
    let config = tiny_config(0);
    write_model_dir(dir.path(), &config, &tiny_vocab());

    // Replace the archive with one storing every tensor as f16.
    let mut tensors = HashMap::new();
    for planned in plan_tensors(&config).unwrap() {
        let data = vec![0.5f32; planned.element_count().unwrap()];
        let tensor = Tensor::from_vec(data, planned.shape.as_slice(), &Device::Cpu)
            .unwrap()
            .to_dtype(DType::F16)
            .unwrap();
        tensors.insert(planned.name.clone(), tensor);
    }
    candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors")).unwrap();

    let output = dir.path().join("half.gtemodel");
    convert(dir.path(), &output).unwrap();

    let bytes = fs::read(&output).unwrap();
    let mut reader = ArtifactReader::new(bytes.as_slice());
    let header = reader.read_header().unwrap();
    reader.read_vocabulary(&header).unwrap();
    for planned in plan_tensors(&header).unwrap() {
        let data = reader.read_tensor(&planned).unwrap();
        assert!(data.iter().all(|&v| v == 0.5), "tensor {}", planned.name);
    }
    reader.finish().unwrap();
}

#[test]
fn test_extra_archive_tensors_are_ignored() {
    let dir = TempDir::new().unwrap();
    let config = tiny_config(1);
    write_model_dir(dir.path(), &config, &tiny_vocab());

    let reference = dir.path().join("reference.gtemodel");
    convert(dir.path(), &reference).unwrap();

    let weights = dir.path().join("model.safetensors");
    let mut tensors = candle_core::safetensors::load(&weights, &Device::Cpu).unwrap();
    tensors.insert(
        "embeddings.position_ids".to_string(),
        Tensor::new(&[0i64, 1, 2, 3], &Device::Cpu).unwrap(),
    );
    candle_core::safetensors::save(&tensors, &weights).unwrap();

    let output = dir.path().join("extra.gtemodel");
    convert(dir.path(), &output).unwrap();
    assert_eq!(fs::read(&output).unwrap(), fs::read(&reference).unwrap());
}

#[test]
fn test_missing_config_field() {
    let dir = TempDir::new().unwrap();
    write_model_dir(dir.path(), &tiny_config(1), &tiny_vocab());
    fs::write(
        dir.path().join("config.json"),
        r#"{"vocab_size": 2, "hidden_size": 4, "num_hidden_layers": 1}"#,
    )
    .unwrap();

    let output = dir.path().join("out.gtemodel");
    let result = convert(dir.path(), &output);
    assert!(matches!(
        result,
        Err(ConvertError::Config(ConfigError::Parse(_)))
    ));
    assert!(!output.exists());
}

#[test]
fn test_vocab_mismatch_checked_before_output() {
    let dir = TempDir::new().unwrap();
    write_model_dir(dir.path(), &tiny_config(1), &tiny_vocab());
    fs::write(dir.path().join("vocab.txt"), "[PAD]\n").unwrap();

    let output = dir.path().join("out.gtemodel");
    let result = convert(dir.path(), &output);
    assert!(matches!(
        result,
        Err(ConvertError::Vocabulary(VocabularyError::CountMismatch { .. }))
    ));
    assert!(!output.exists());
}

#[test]
fn test_missing_vocab_file() {
    let dir = TempDir::new().unwrap();
    write_model_dir(dir.path(), &tiny_config(1), &tiny_vocab());
    fs::remove_file(dir.path().join("vocab.txt")).unwrap();

    let output = dir.path().join("out.gtemodel");
    let result = convert(dir.path(), &output);
    assert!(matches!(
        result,
        Err(ConvertError::Vocabulary(VocabularyError::Io { .. }))
    ));
    assert!(!output.exists());
}

#[test]
fn test_missing_weights_file() {
    let dir = TempDir::new().unwrap();
    write_model_dir(dir.path(), &tiny_config(1), &tiny_vocab());
    fs::remove_file(dir.path().join("model.safetensors")).unwrap();

    let output = dir.path().join("out.gtemodel");
    let result = convert(dir.path(), &output);
    assert!(matches!(
        result,
        Err(ConvertError::Tensor(TensorError::Archive(_)))
    ));
    assert!(!output.exists());
}
