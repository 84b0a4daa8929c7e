// fashion_mnist - classifier over raw Fashion-MNIST record files.
//
// Each input file is a flat sequence of 785-byte records (label, then 784
// pixels).
//
// cargo run --release --bin fashion_mnist -- \
//   --train data/fashion-mnist_train.bin --test data/fashion-mnist_test.bin

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use log::{debug, info};

use neural_ppo::architecture::{build_layers, load_architecture, ArchitectureConfig, LayerConfig};
use neural_ppo::config::{load_config, LossKind, NetConfig, NetType};
use neural_ppo::data::{predict_indices, RawRecords, FASHION_MNIST_CLASSES};
use neural_ppo::dataset::Dataset;
use neural_ppo::layers::ActivationKind;
use neural_ppo::network::NeuralNet;
use neural_ppo::optimizers::Hyperparams;
use neural_ppo::utils::Rng;
use neural_ppo::{NnError, Result};

#[derive(Parser)]
#[command(name = "fashion_mnist", version, about = "Fashion-MNIST classifier")]
struct Cli {
    /// Training records (omit to only evaluate saved weights)
    #[arg(long)]
    train: Option<PathBuf>,

    /// Test records
    #[arg(long)]
    test: PathBuf,

    /// Layer chain (JSON); 784-512-512-10 with ReLU and softmax when omitted
    #[arg(long)]
    architecture: Option<PathBuf>,

    /// Network settings (JSON); Adam with cross-entropy when omitted
    #[arg(long)]
    net_config: Option<PathBuf>,

    #[arg(long, default_value_t = 64)]
    batch: usize,

    #[arg(long, default_value_t = 5)]
    epochs: usize,

    #[arg(long, default_value_t = 0.001)]
    learning_rate: f32,

    /// Stop once the mean batch loss falls below this
    #[arg(long, default_value_t = 0.001)]
    target_loss: f32,

    /// Weights file written after training and read before evaluation
    #[arg(long, default_value = "fashion_mnist.bin")]
    weights: PathBuf,

    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn default_architecture() -> ArchitectureConfig {
    ArchitectureConfig {
        layers: vec![
            LayerConfig::linear(512),
            LayerConfig::activation(ActivationKind::Relu),
            LayerConfig::linear(512),
            LayerConfig::activation(ActivationKind::Relu),
            LayerConfig::linear(FASHION_MNIST_CLASSES.len()),
            LayerConfig::activation(ActivationKind::Softmax),
        ],
    }
}

fn build_net(cli: &Cli, net_type: NetType, input: usize, rng: &mut Rng) -> Result<NeuralNet> {
    let architecture = match &cli.architecture {
        Some(path) => load_architecture(path)?,
        None => default_architecture(),
    };
    let mut config = match &cli.net_config {
        Some(path) => load_config(path)?,
        None => NetConfig {
            loss: LossKind::CrossEntropy,
            ..NetConfig::default()
        },
    };
    config.net_type = net_type;

    let classes = architecture.output_width(input);
    let mut net = NeuralNet::new(
        config,
        build_layers(&architecture)?,
        Dataset::new(cli.batch, input, classes),
    )?;
    net.init(rng);
    Ok(net)
}

fn train(cli: &Cli, path: &Path, rng: &mut Rng) -> Result<()> {
    let mut records = RawRecords::load(path)?;
    let batches = records.batch_count(cli.batch);
    if batches == 0 {
        return Err(NnError::Config(format!(
            "{} holds fewer than {} records",
            path.display(),
            cli.batch
        )));
    }
    let mut net = build_net(cli, NetType::Train, records.pixel_count(), rng)?;
    let classes = net.dataset().output_count();
    info!("training on {} records, {} batches per epoch", records.len(), batches);

    let start = Instant::now();
    let mut mean_loss = f32::MAX;
    'epochs: for epoch in 1..=cli.epochs {
        net.set_hyperparams(
            Hyperparams::default()
                .with_learning_rate(cli.learning_rate)
                .with_epoch(epoch as u32),
        );
        for batch_index in 0..batches {
            let dataset = net.dataset_mut();
            records.transform_to_input(batch_index, cli.batch, dataset.input_mut());
            records.transform_to_output(batch_index, cli.batch, classes, dataset.output_mut());
            net.forward();
            net.backward();

            mean_loss = net.mean_loss().unwrap_or(0.0);
            debug!("epoch {epoch} batch {}/{batches} loss {mean_loss:.6}", batch_index + 1);
            if mean_loss <= cli.target_loss {
                break 'epochs;
            }
        }
        info!("epoch {epoch} finished, last batch loss {mean_loss:.6}");
        records.shuffle(rng);
    }
    println!(
        "Training time: {:.2} seconds, final loss {mean_loss:.6}",
        start.elapsed().as_secs_f64()
    );

    let pending = net.save_weights_in_background(cli.weights.clone());
    match pending.join() {
        Ok(result) => result?,
        Err(_) => return Err(NnError::Config("weight writer thread panicked".into())),
    }
    println!("Saved weights to {}", cli.weights.display());
    net.release();
    Ok(())
}

fn evaluate(cli: &Cli, rng: &mut Rng) -> Result<()> {
    let records = RawRecords::load(&cli.test)?;
    let mut net = build_net(cli, NetType::Predict, records.pixel_count(), rng)?;
    net.load_weights_from_file(&cli.weights)?;
    let classes = net.output_width();

    let mut correct = 0usize;
    let mut total = 0usize;
    for batch_index in 0..records.batch_count(cli.batch) {
        records.transform_to_input(batch_index, cli.batch, net.dataset_mut().input_mut());
        net.predict();
        for (i, predicted) in predict_indices(net.output(), classes).into_iter().enumerate() {
            let actual = records.label(batch_index * cli.batch + i) as usize;
            debug!(
                "actual: {} predict: {}",
                FASHION_MNIST_CLASSES.get(actual).unwrap_or(&"?"),
                FASHION_MNIST_CLASSES.get(predicted).unwrap_or(&"?")
            );
            correct += usize::from(actual == predicted);
            total += 1;
        }
    }
    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    };
    println!("Test accuracy: {accuracy:.2}% ({correct}/{total})");
    net.release();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let mut rng = Rng::new(cli.seed);

    if let Some(path) = &cli.train {
        train(&cli, path, &mut rng)?;
    }
    evaluate(&cli, &mut rng)
}
