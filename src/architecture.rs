//! Architecture configuration structures
//!
//! This module describes a layer chain in JSON so that network shapes can be
//! changed without touching code. Widths flow down the chain: only linear
//! layers declare a `node_count`, every other layer inherits its
//! predecessor's width.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};
use crate::layers::{Activation, ActivationKind, Dropout, Layer, Linear};

/// Configuration for a single layer in the chain.
///
/// Different layer types require different fields:
///
/// - **Linear**: requires `node_count`
/// - **Activation**: requires `activation` (`relu`, `softmax`, `sigmoid`,
///   `tanh` or `leaky_relu`)
/// - **Dropout**: optional `drop_rate` in `[0.0, 1.0)`, default 0.1
///
/// # Examples
///
/// ```json
/// { "layer_type": "linear", "node_count": 64 }
/// ```
///
/// ```json
/// { "layer_type": "activation", "activation": "tanh" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    /// "linear", "activation" or "dropout"
    pub layer_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_rate: Option<f32>,
}

impl LayerConfig {
    pub fn linear(node_count: usize) -> Self {
        Self {
            layer_type: "linear".into(),
            node_count: Some(node_count),
            activation: None,
            drop_rate: None,
        }
    }

    pub fn activation(kind: ActivationKind) -> Self {
        Self {
            layer_type: "activation".into(),
            node_count: None,
            activation: Some(kind),
            drop_rate: None,
        }
    }

    pub fn dropout(drop_rate: f32) -> Self {
        Self {
            layer_type: "dropout".into(),
            node_count: None,
            activation: None,
            drop_rate: Some(drop_rate),
        }
    }
}

/// A whole layer chain.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "linear", "node_count": 512 },
///     { "layer_type": "activation", "activation": "relu" },
///     { "layer_type": "dropout", "drop_rate": 0.1 },
///     { "layer_type": "linear", "node_count": 10 },
///     { "layer_type": "activation", "activation": "softmax" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerConfig>,
}

impl ArchitectureConfig {
    /// Width of the chain's last layer when fed `input_count` values.
    pub fn output_width(&self, input_count: usize) -> usize {
        self.layers
            .iter()
            .fold(input_count, |width, layer| match layer.layer_type.to_lowercase().as_str() {
                "linear" => layer.node_count.unwrap_or(width),
                _ => width,
            })
    }
}

/// Loads and validates an architecture from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use neural_ppo::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/fashion_mnist.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Checks that the chain is non-empty, every layer has the fields its type
/// needs, and the chain ends in a layer with a definite width.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(NnError::Config(
            "architecture must have at least one layer".into(),
        ));
    }
    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
    }
    Ok(())
}

fn validate_layer(layer: &LayerConfig, index: usize) -> Result<()> {
    match layer.layer_type.to_lowercase().as_str() {
        "linear" => match layer.node_count {
            None => Err(NnError::Config(format!(
                "layer {index}: linear layer requires 'node_count'"
            ))),
            Some(0) => Err(NnError::Config(format!(
                "layer {index}: node_count must be greater than 0"
            ))),
            Some(_) => Ok(()),
        },
        "activation" => {
            if layer.activation.is_none() {
                return Err(NnError::Config(format!(
                    "layer {index}: activation layer requires 'activation'"
                )));
            }
            Ok(())
        }
        "dropout" => match layer.drop_rate {
            Some(rate) if !(0.0..1.0).contains(&rate) => Err(NnError::Config(format!(
                "layer {index}: drop_rate must be in range [0.0, 1.0)"
            ))),
            _ => Ok(()),
        },
        other => Err(NnError::Config(format!(
            "layer {index}: invalid layer type '{other}', must be one of: linear, activation, dropout"
        ))),
    }
}

/// Builds the layer chain described by `config`.
///
/// # Examples
///
/// ```
/// use neural_ppo::architecture::{build_layers, ArchitectureConfig, LayerConfig};
/// use neural_ppo::layers::ActivationKind;
///
/// let config = ArchitectureConfig {
///     layers: vec![
///         LayerConfig::linear(8),
///         LayerConfig::activation(ActivationKind::Relu),
///         LayerConfig::linear(2),
///     ],
/// };
/// let layers = build_layers(&config).unwrap();
/// assert_eq!(layers.len(), 3);
/// ```
pub fn build_layers(config: &ArchitectureConfig) -> Result<Vec<Box<dyn Layer>>> {
    validate_architecture(config)?;
    config
        .layers
        .iter()
        .map(|layer| -> Result<Box<dyn Layer>> {
            Ok(match layer.layer_type.to_lowercase().as_str() {
                "linear" => Box::new(Linear::new(layer.node_count.unwrap_or(1))),
                "activation" => Box::new(Activation::new(
                    layer.activation.unwrap_or(ActivationKind::Relu),
                )),
                "dropout" => Box::new(match layer.drop_rate {
                    Some(rate) => Dropout::new(rate),
                    None => Dropout::default(),
                }),
                other => {
                    return Err(NnError::Config(format!("invalid layer type '{other}'")));
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerKind;

    fn parse(json: &str) -> ArchitectureConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_validate_linear_layer() {
        let config = parse(r#"{"layers": [{"layer_type": "linear", "node_count": 4}]}"#);
        assert!(validate_architecture(&config).is_ok());
    }

    #[test]
    fn test_validate_linear_missing_node_count() {
        let config = parse(r#"{"layers": [{"layer_type": "linear"}]}"#);
        let err = validate_architecture(&config).unwrap_err();
        assert!(err.to_string().contains("node_count"));
    }

    #[test]
    fn test_validate_invalid_layer_type() {
        let config = parse(r#"{"layers": [{"layer_type": "conv2d"}]}"#);
        let err = validate_architecture(&config).unwrap_err();
        assert!(err.to_string().contains("invalid layer type"));
    }

    #[test]
    fn test_validate_empty_architecture() {
        let config = ArchitectureConfig { layers: Vec::new() };
        assert!(validate_architecture(&config).is_err());
    }

    #[test]
    fn test_validate_dropout_rate() {
        let config = ArchitectureConfig {
            layers: vec![LayerConfig::dropout(1.0)],
        };
        assert!(validate_architecture(&config).is_err());
    }

    #[test]
    fn test_unknown_activation_rejected_by_parser() {
        let result: std::result::Result<ArchitectureConfig, _> = serde_json::from_str(
            r#"{"layers": [{"layer_type": "activation", "activation": "gelu"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_build_layers_kinds() {
        let config = ArchitectureConfig {
            layers: vec![
                LayerConfig::linear(16),
                LayerConfig::activation(ActivationKind::Tanh),
                LayerConfig::dropout(0.2),
                LayerConfig::linear(3),
            ],
        };
        let layers = build_layers(&config).unwrap();
        let kinds: Vec<LayerKind> = layers.iter().map(|l| l.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                LayerKind::Linear,
                LayerKind::Activation,
                LayerKind::Dropout,
                LayerKind::Linear
            ]
        );
        assert_eq!(config.output_width(5), 3);
    }
}
