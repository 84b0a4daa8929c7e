// cartpole_ppo - train or replay a PPO agent on the cart-pole task.
//
// # train for 300 iterations and checkpoint both networks
// RUST_LOG=info cargo run --release --bin cartpole_ppo -- --iterations 300 --save
//
// # replay the saved weights without training
// cargo run --release --bin cartpole_ppo -- --predict --steps 2000

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::info;

use neural_ppo::config::{load_config, load_ppo_config, InitKind, NetConfig, NetType, PpoConfig};
use neural_ppo::rl::{CartPole, PpoAgent};
use neural_ppo::Result;

#[derive(Parser)]
#[command(name = "cartpole_ppo", version, about = "PPO on the cart-pole balancing task")]
struct Cli {
    /// PPO hyperparameters (JSON)
    #[arg(long, default_value = "config/ppo_cartpole.json")]
    ppo_config: PathBuf,

    /// Network settings (JSON)
    #[arg(long, default_value = "config/cartpole_net.json")]
    net_config: PathBuf,

    /// Training iterations of `num_steps` transitions each
    #[arg(long, default_value_t = 200)]
    iterations: usize,

    /// Replay saved weights instead of training
    #[arg(long)]
    predict: bool,

    /// Environment steps to replay in predict mode
    #[arg(long, default_value_t = 1000)]
    steps: usize,

    /// Directory holding `actor{tag}.bin` and `critic{tag}.bin`
    #[arg(long, default_value = "weights")]
    weights_dir: PathBuf,

    #[arg(long, default_value = "")]
    tag: String,

    /// Save the weights after training
    #[arg(long)]
    save: bool,

    /// Use the Sutton-Barto reward (0 per step, -1 on failure)
    #[arg(long)]
    sutton_barto: bool,
}

/// Reads both config files; `--predict` switches the networks to loaded weights.
fn load_configs(cli: &Cli) -> Result<(PpoConfig, NetConfig)> {
    let ppo = load_ppo_config(&cli.ppo_config)?;
    let mut net = load_config(&cli.net_config)?;
    if cli.predict {
        net.net_type = NetType::Predict;
        net.init = InitKind::None;
    }
    Ok((ppo, net))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let (ppo, net) = load_configs(&cli)?;

    let actor_path = cli.weights_dir.join(format!("actor{}.bin", cli.tag));
    let critic_path = cli.weights_dir.join(format!("critic{}.bin", cli.tag));

    let env = CartPole::new(ppo.seed).with_sutton_barto_reward(cli.sutton_barto);
    let load = !net.is_train() || net.init == InitKind::None;
    let mut agent = PpoAgent::new(ppo, net, env)?;
    if load {
        agent.load_weights_from_files(&actor_path, &critic_path)?;
        info!("loaded weights from {}", cli.weights_dir.display());
    }

    let start = Instant::now();
    if cli.predict {
        for _ in 0..cli.steps {
            agent.update();
        }
        println!("Replayed {} steps", agent.steps());
    } else {
        let mut last = None;
        for _ in 0..cli.iterations {
            last = agent.update_fast().or(last);
        }
        println!(
            "Trained {} iterations ({} minibatch updates) in {:.2} seconds",
            agent.iteration(),
            agent.train_count(),
            start.elapsed().as_secs_f64()
        );
        if let Some(summary) = last {
            println!(
                "Last iteration: mean episode length {:.1}, max {}, loss {:.4}",
                summary.episodes.mean, summary.episodes.max, summary.loss
            );
        }

        if cli.save {
            fs::create_dir_all(&cli.weights_dir)?;
            agent.save_weights_to_files(&actor_path, &critic_path)?;
            println!("Saved weights to {}", cli.weights_dir.display());
        }
    }

    agent.release();
    Ok(())
}
