//! Layer-chain network: wiring, forward/backward orchestration and weight I/O.
//!
//! A [`NeuralNet`] owns its layers, an optional terminal loss layer, the
//! dataset that feeds it and the one [`LayerSwapBuffer`] every layer shares.
//! Backward always runs in strict reverse order from a single loop here, with
//! a swap after every layer.
//!
//! # Weight format
//!
//! Parameters are persisted as a bare stream of little-endian `f32` values:
//! for every linear layer in chain order, its `input_count × node_count`
//! weights followed by its `node_count` biases. There is no header; the reader
//! must build the same topology first.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use log::{debug, trace};

use crate::clip::GradientClipper;
use crate::config::{LossKind, NetConfig};
use crate::dataset::Dataset;
use crate::error::{NnError, Result};
use crate::layers::{
    BackwardPass, Feed, InitContext, Layer, LayerKind, LayerSwapBuffer, Linear, LossLayer,
};
use crate::optimizers::{HyperparamCache, Hyperparams};
use crate::utils::Rng;

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// An ordered chain of layers plus an optional loss.
///
/// Lifecycle: [`new`](Self::new) → [`init`](Self::init) → repeated
/// forward/backward → [`release`](Self::release).
///
/// # Example
///
/// ```
/// use neural_ppo::config::{LossKind, NetConfig};
/// use neural_ppo::dataset::Dataset;
/// use neural_ppo::layers::{Activation, ActivationKind, Layer, Linear};
/// use neural_ppo::network::NeuralNet;
/// use neural_ppo::utils::Rng;
///
/// let layers: Vec<Box<dyn Layer>> = vec![
///     Box::new(Linear::new(8)),
///     Box::new(Activation::new(ActivationKind::Tanh)),
///     Box::new(Linear::new(1)),
/// ];
/// let config = NetConfig { loss: LossKind::Mse, ..NetConfig::default() };
/// let mut net = NeuralNet::new(config, layers, Dataset::new(4, 2, 1)).unwrap();
/// net.init(&mut Rng::new(1));
///
/// net.dataset_mut().upload_input(&[0.0; 8]);
/// net.dataset_mut().upload_output(&[1.0; 4]);
/// net.forward();
/// net.backward();
/// assert_eq!(net.output().len(), 4);
/// ```
pub struct NeuralNet {
    config: NetConfig,
    layers: Vec<Box<dyn Layer>>,
    loss: Option<LossLayer>,
    dataset: Dataset,
    swap: LayerSwapBuffer,
    clipper: Option<GradientClipper>,
    hyper: HyperparamCache,
    widths: Vec<usize>,
    initialized: bool,
}

impl NeuralNet {
    /// Validates the chain against the dataset and allocates the swap buffer.
    ///
    /// The swap buffer holds `max_batch × w` values, where `w` is the widest of
    /// the dataset input, the dataset output and every layer.
    pub fn new(config: NetConfig, layers: Vec<Box<dyn Layer>>, dataset: Dataset) -> Result<Self> {
        config.validate()?;
        if layers.is_empty() {
            return Err(NnError::Config("a network needs at least one layer".into()));
        }

        let mut widths = Vec::with_capacity(layers.len());
        let mut prev = dataset.input_count();
        for layer in &layers {
            if layer.kind() == LayerKind::Loss {
                return Err(NnError::Config(
                    "loss layers are configured through NetConfig::loss".into(),
                ));
            }
            let width = layer.node_count().unwrap_or(prev);
            if width == 0 {
                return Err(NnError::Config("layer width must be at least 1".into()));
            }
            widths.push(width);
            prev = width;
        }

        if config.loss != LossKind::None && prev != dataset.output_count() {
            return Err(NnError::ShapeMismatch {
                what: "loss target width",
                expected: prev,
                actual: dataset.output_count(),
            });
        }

        let max_width = widths
            .iter()
            .copied()
            .chain([dataset.input_count(), dataset.output_count()])
            .max()
            .unwrap_or(0);
        let swap = LayerSwapBuffer::new(dataset.max_batch_size(), max_width, !config.clip_grad);
        let loss = match config.loss {
            LossKind::None => None,
            kind => Some(LossLayer::new(kind)),
        };

        Ok(Self {
            config,
            layers,
            loss,
            dataset,
            swap,
            clipper: None,
            hyper: HyperparamCache::new(),
            widths,
            initialized: false,
        })
    }

    /// Wires widths, allocates buffers and initialises parameters.
    pub fn init(&mut self, rng: &mut Rng) {
        let max_batch = self.dataset.max_batch_size();
        let mut prev = self.dataset.input_count();
        for layer in self.layers.iter_mut() {
            layer.init(InitContext {
                config: &self.config,
                prev_node_count: prev,
                max_batch,
                rng: &mut *rng,
            });
            prev = layer.node_count().unwrap_or(prev);
        }
        if let Some(loss) = self.loss.as_mut() {
            loss.init(InitContext {
                config: &self.config,
                prev_node_count: prev,
                max_batch,
                rng: &mut *rng,
            });
        }

        if self.config.clip_grad && self.config.is_train() {
            let lens: Vec<usize> = self
                .linear_layers()
                .flat_map(|linear| [linear.weight_len(), linear.bias_len()])
                .collect();
            self.clipper = Some(GradientClipper::new(&lens));
        }
        self.initialized = true;

        debug!(
            "network initialised: widths {:?}, {} parameters, loss {:?}, optimizer {:?}",
            self.widths,
            self.weight_and_bias_len(),
            self.config.loss,
            self.config.optimizer
        );
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn is_train(&self) -> bool {
        self.config.is_train()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    pub fn linear_layers(&self) -> impl Iterator<Item = &Linear> {
        self.layers.iter().filter_map(|layer| layer.as_linear())
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.dataset
    }

    pub fn clipper(&self) -> Option<&GradientClipper> {
        self.clipper.as_ref()
    }

    /// Width of the last layer.
    pub fn output_width(&self) -> usize {
        self.widths.last().copied().unwrap_or(0)
    }

    /// Installs the optimizer hyperparameters for the next backward passes.
    ///
    /// Returns `true` when they differ from the current ones.
    pub fn set_hyperparams(&mut self, params: Hyperparams) -> bool {
        self.hyper.set(params)
    }

    pub fn hyperparams(&self) -> &HyperparamCache {
        &self.hyper
    }

    /// Runs every layer forward, without the loss.
    pub fn predict(&mut self) {
        assert!(self.initialized, "network used before init");
        let batch = self.dataset.batch_size();
        let target = self.dataset.output();
        for i in 0..self.layers.len() {
            let (done, rest) = self.layers.split_at_mut(i);
            let input = done
                .last()
                .map_or(self.dataset.input(), |prev| prev.output());
            rest[0].forward(Feed {
                input,
                target,
                batch,
            });
        }
    }

    /// Runs every layer forward, then the loss if one is configured.
    pub fn forward(&mut self) {
        self.predict();
        let batch = self.dataset.batch_size();
        if let (Some(loss), Some(last)) = (self.loss.as_mut(), self.layers.last()) {
            loss.forward(Feed {
                input: last.output(),
                target: self.dataset.output(),
                batch,
            });
        }
    }

    /// Backpropagates through the chain and updates parameters.
    ///
    /// Without a loss layer the caller must first write the output gradient
    /// through [`output_gradient_mut`](Self::output_gradient_mut). With
    /// clipping enabled every gradient is computed first, clipped jointly, and
    /// only then applied. In predict mode this is a no-op.
    pub fn backward(&mut self) {
        if !self.config.is_train() {
            return;
        }
        assert!(self.initialized, "network used before init");
        let step = *self.hyper.step();
        let batch = self.dataset.batch_size();
        let target = self.dataset.output();

        if let (Some(loss), Some(last)) = (self.loss.as_mut(), self.layers.last()) {
            loss.backward(BackwardPass {
                feed: Feed {
                    input: last.output(),
                    target,
                    batch,
                },
                swap: &mut self.swap,
                step: &step,
            });
            self.swap.swap();
        }

        for i in (0..self.layers.len()).rev() {
            let (before, rest) = self.layers.split_at_mut(i);
            let input = before
                .last()
                .map_or(self.dataset.input(), |prev| prev.output());
            rest[0].backward(BackwardPass {
                feed: Feed {
                    input,
                    target,
                    batch,
                },
                swap: &mut self.swap,
                step: &step,
            });
            self.swap.swap();
        }

        if let Some(clipper) = self.clipper.as_mut() {
            let mut grads: Vec<&mut [f32]> = self
                .layers
                .iter_mut()
                .filter_map(|layer| layer.as_linear_mut())
                .filter_map(|linear| linear.gradients_mut())
                .flat_map(|(dw, db)| [dw, db])
                .collect();
            let coef = clipper.clip(&mut grads, self.config.max_grad_norm);
            trace!(
                "gradient norm {:.6}, clip coefficient {:.6}",
                clipper.last_norm(),
                coef
            );

            for layer in self.layers.iter_mut().rev() {
                if let Some(linear) = layer.as_linear_mut() {
                    linear.apply_pending_update(&step);
                }
            }
        }
    }

    /// Output of the last layer for the current batch.
    pub fn output(&self) -> &[f32] {
        let len = self.dataset.batch_size() * self.output_width();
        self.layers
            .last()
            .map_or(&[][..], |layer| &layer.output()[..len])
    }

    /// Per-row loss values of the last forward pass.
    pub fn loss_values(&self) -> Option<&[f32]> {
        let batch = self.dataset.batch_size();
        self.loss.as_ref().map(|loss| &loss.output()[..batch])
    }

    pub fn mean_loss(&self) -> Option<f32> {
        self.loss
            .as_ref()
            .map(|loss| loss.mean_loss(self.dataset.batch_size()))
    }

    /// Gradient slot read by the last layer on the next backward pass.
    pub fn output_gradient_mut(&mut self) -> &mut [f32] {
        let len = self.dataset.batch_size() * self.output_width();
        &mut self.swap.d_output_mut()[..len]
    }

    /// Gradient with respect to the network input after a backward pass.
    pub fn input_gradient(&self) -> &[f32] {
        let len = self.dataset.batch_size() * self.dataset.input_count();
        &self.swap.d_output()[..len]
    }

    /// Total number of persisted floats.
    pub fn weight_and_bias_len(&self) -> usize {
        self.linear_layers().map(Linear::parameter_count).sum()
    }

    /// Copies every parameter into one little-endian byte buffer.
    pub fn weights_snapshot(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.weight_and_bias_len() * F32_BYTES);
        for linear in self.linear_layers() {
            for value in linear.weights().iter().chain(linear.bias()) {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        bytes
    }

    pub fn save_weights<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.weights_snapshot())?;
        writer.flush()?;
        Ok(())
    }

    /// Reads parameters written by [`save_weights`](Self::save_weights).
    pub fn load_weights<R: Read>(&mut self, reader: R) -> Result<()> {
        let expected = self.weight_and_bias_len() * F32_BYTES;
        let mut bytes = Vec::with_capacity(expected);
        reader.take(expected as u64).read_to_end(&mut bytes)?;
        if bytes.len() < expected {
            return Err(NnError::WeightStream {
                expected,
                actual: bytes.len(),
            });
        }

        let mut values = bytes
            .chunks_exact(F32_BYTES)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        for layer in self.layers.iter_mut() {
            if let Some(linear) = layer.as_linear_mut() {
                for slot in linear.weights_mut().iter_mut() {
                    *slot = values.next().unwrap_or_default();
                }
                for slot in linear.bias_mut().iter_mut() {
                    *slot = values.next().unwrap_or_default();
                }
            }
        }
        Ok(())
    }

    pub fn save_weights_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.save_weights(BufWriter::new(file))
    }

    pub fn load_weights_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path)?;
        self.load_weights(BufReader::new(file))
    }

    /// Snapshots the parameters now and writes them to `path` on a worker thread.
    ///
    /// The checkpoint is durable only once the returned handle has been joined
    /// and yielded `Ok`.
    pub fn save_weights_in_background(&self, path: impl Into<PathBuf>) -> JoinHandle<Result<()>> {
        let bytes = self.weights_snapshot();
        let path = path.into();
        thread::spawn(move || {
            let mut writer = BufWriter::new(File::create(&path)?);
            writer.write_all(&bytes)?;
            writer.flush()?;
            debug!("saved {} bytes of weights to {}", bytes.len(), path.display());
            Ok(())
        })
    }

    /// Frees every buffer. Any later use panics.
    pub fn release(&mut self) {
        if let Some(loss) = self.loss.as_mut() {
            loss.release();
        }
        for layer in self.layers.iter_mut() {
            layer.release();
        }
        self.swap.release();
        if let Some(clipper) = self.clipper.as_mut() {
            clipper.release();
        }
        self.dataset.release();
    }
}
