// curve_fit - regress a random 1-D curve with an externally computed loss.
//
// The network runs with `loss = none`: every step reads the prediction back,
// computes the MSE gradient on the host and writes it into the network's
// output gradient before calling backward.

use std::f32::consts::PI;
use std::time::Instant;

use clap::Parser;
use log::{debug, info};

use neural_ppo::config::{LossKind, NetConfig};
use neural_ppo::dataset::Dataset;
use neural_ppo::layers::{Activation, ActivationKind, Layer, Linear};
use neural_ppo::network::NeuralNet;
use neural_ppo::optimizers::Hyperparams;
use neural_ppo::utils::Rng;
use neural_ppo::Result;

#[derive(Parser)]
#[command(name = "curve_fit", version, about = "Fit a random curve with an MLP")]
struct Cli {
    /// Terms in the target curve
    #[arg(long, default_value_t = 10)]
    terms: usize,

    #[arg(long, default_value_t = 64)]
    hidden: usize,

    #[arg(long, default_value_t = 32)]
    batch: usize,

    /// Evenly spaced points used to report the fit
    #[arg(long, default_value_t = 100)]
    points: usize,

    #[arg(long, default_value_t = 5000)]
    max_steps: usize,

    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    #[arg(long, default_value_t = 0.001)]
    target_loss: f32,

    /// x range is [-range·π, range·π]
    #[arg(long, default_value_t = 1.0)]
    range: f32,

    #[arg(long, default_value_t = 1)]
    seed: u64,
}

#[derive(Debug, Clone, Copy)]
enum Term {
    Sin(f32),
    Cos(f32),
    /// Clamps the running sum at zero.
    Rectify,
}

/// Random mix of scaled sines and cosines with occasional rectification.
struct Curve {
    terms: Vec<Term>,
}

impl Curve {
    fn random(count: usize, rng: &mut Rng) -> Self {
        let terms = (0..count)
            .map(|_| {
                let scale = rng.gen_range_f32(-1.0, 1.0);
                match rng.gen_usize(3) {
                    0 => Term::Sin(scale),
                    1 => Term::Cos(scale),
                    _ => Term::Rectify,
                }
            })
            .collect();
        Self { terms }
    }

    fn value(&self, x: f32) -> f32 {
        self.terms.iter().fold(0.0, |sum, term| match *term {
            Term::Sin(a) => sum + a * x.sin(),
            Term::Cos(a) => sum + a * x.cos(),
            Term::Rectify => sum.max(0.0),
        })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let mut rng = Rng::new(cli.seed);
    let curve = Curve::random(cli.terms, &mut rng);

    let layers: Vec<Box<dyn Layer>> = vec![
        Box::new(Linear::new(cli.hidden)),
        Box::new(Activation::new(ActivationKind::Relu)),
        Box::new(Linear::new(cli.hidden)),
        Box::new(Activation::new(ActivationKind::Relu)),
        Box::new(Linear::new(1)),
    ];
    let config = NetConfig {
        loss: LossKind::None,
        ..NetConfig::default()
    };
    let capacity = cli.batch.max(cli.points);
    let mut net = NeuralNet::new(config, layers, Dataset::new(capacity, 1, 1))?;
    net.init(&mut rng);

    let (min_x, max_x) = (-PI * cli.range, PI * cli.range);
    let mut xs = vec![0.0; cli.batch];
    let mut ys = vec![0.0; cli.batch];
    let mut mean_loss = f32::MAX;
    let start = Instant::now();
    let mut step = 0;

    while step < cli.max_steps && mean_loss > cli.target_loss {
        for (x, y) in xs.iter_mut().zip(ys.iter_mut()) {
            *x = rng.gen_range_f32(min_x, max_x);
            *y = curve.value(*x);
        }
        net.set_hyperparams(
            Hyperparams::default()
                .with_learning_rate(cli.learning_rate)
                .with_epoch(step as u32 + 1),
        );
        let dataset = net.dataset_mut();
        dataset.set_batch_size(cli.batch);
        dataset.upload_input(&xs);
        net.forward();

        let prediction = net.output().to_vec();
        let scale = 2.0 / cli.batch as f32;
        mean_loss = prediction
            .iter()
            .zip(&ys)
            .map(|(p, y)| (p - y) * (p - y))
            .sum::<f32>()
            / cli.batch as f32;
        for ((g, p), y) in net.output_gradient_mut().iter_mut().zip(&prediction).zip(&ys) {
            *g = scale * (p - y);
        }
        net.backward();

        step += 1;
        debug!("step {step} loss {mean_loss:.6}");
        if step % 500 == 0 {
            info!("step {step} loss {mean_loss:.6}");
        }
    }
    println!(
        "Stopped after {step} steps in {:.2} seconds, loss {mean_loss:.6}",
        start.elapsed().as_secs_f64()
    );

    // Report the fit on an evenly spaced grid.
    let spacing = (max_x - min_x) / (cli.points.max(2) - 1) as f32;
    let grid: Vec<f32> = (0..cli.points).map(|i| min_x + i as f32 * spacing).collect();
    let dataset = net.dataset_mut();
    dataset.set_batch_size(cli.points);
    dataset.upload_input(&grid);
    net.predict();
    let grid_loss = net
        .output()
        .iter()
        .zip(&grid)
        .map(|(p, &x)| (p - curve.value(x)).powi(2))
        .sum::<f32>()
        / cli.points.max(1) as f32;
    println!("Grid MSE over {} points: {grid_loss:.6}", cli.points);

    net.release();
    Ok(())
}
