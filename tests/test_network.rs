//! Network orchestration tests
//!
//! Covers the public behaviour of `NeuralNet`:
//! - Linear forward/backward against hand-computed values
//! - Weight persistence through streams, files and the background writer
//! - Global-norm gradient clipping
//! - Predict mode and hyperparameter caching

use std::io::Cursor;

use approx::assert_relative_eq;
use tempfile::NamedTempFile;

use neural_ppo::config::{InitKind, LossKind, NetConfig, NetType, OptimizerKind};
use neural_ppo::dataset::Dataset;
use neural_ppo::layers::{Activation, ActivationKind, Layer, Linear};
use neural_ppo::network::NeuralNet;
use neural_ppo::optimizers::Hyperparams;
use neural_ppo::utils::Rng;
use neural_ppo::NnError;

fn mlp() -> Vec<Box<dyn Layer>> {
    vec![
        Box::new(Linear::new(6)),
        Box::new(Activation::new(ActivationKind::Relu)),
        Box::new(Linear::new(3)),
        Box::new(Activation::new(ActivationKind::Softmax)),
    ]
}

fn build(config: NetConfig, seed: u64) -> NeuralNet {
    let mut net = NeuralNet::new(config, mlp(), Dataset::new(4, 5, 3)).unwrap();
    net.init(&mut Rng::new(seed));
    net
}

fn sample_batch(net: &mut NeuralNet) {
    let input: Vec<f32> = (0..20).map(|i| ((i * 7) % 11) as f32 / 11.0 - 0.4).collect();
    let target = [
        1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0,
    ];
    net.dataset_mut().upload_input(&input);
    net.dataset_mut().upload_output(&target);
}

fn all_parameters(net: &NeuralNet) -> Vec<f32> {
    net.linear_layers()
        .flat_map(|linear| linear.weights().iter().chain(linear.bias()).copied())
        .collect()
}

// ============================================================================
// Linear Layer Values
// ============================================================================

mod linear_value_tests {
    use super::*;

    fn known_linear() -> NeuralNet {
        let layers: Vec<Box<dyn Layer>> = vec![Box::new(Linear::new(3))];
        let config = NetConfig {
            optimizer: OptimizerKind::Sgd,
            ..NetConfig::default()
        };
        let mut net = NeuralNet::new(config, layers, Dataset::new(1, 2, 3)).unwrap();
        net.init(&mut Rng::new(1));
        net.set_hyperparams(Hyperparams::default().with_learning_rate(0.0));

        let linear = net.layers_mut()[0].as_linear_mut().unwrap();
        linear
            .weights_mut()
            .copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        linear.bias_mut().copy_from_slice(&[0.5, -0.5, 1.0]);
        net.dataset_mut().upload_input(&[1.0, 2.0]);
        net
    }

    #[test]
    fn test_forward_is_affine() {
        let mut net = known_linear();
        net.forward();
        assert_eq!(net.output(), &[9.5, 11.5, 16.0]);
    }

    #[test]
    fn test_backward_input_gradient() {
        let mut net = known_linear();
        net.forward();
        net.output_gradient_mut().copy_from_slice(&[1.0, 0.0, -1.0]);
        net.backward();
        assert_eq!(net.input_gradient(), &[-2.0, -2.0]);
    }

    #[test]
    fn test_output_width_and_parameter_count() {
        let net = known_linear();
        assert_eq!(net.output_width(), 3);
        assert_eq!(net.weight_and_bias_len(), 9);
    }
}

// ============================================================================
// Weight Persistence
// ============================================================================

mod persistence_tests {
    use super::*;

    fn predictor() -> NeuralNet {
        build(
            NetConfig {
                net_type: NetType::Predict,
                init: InitKind::None,
                ..NetConfig::default()
            },
            99,
        )
    }

    #[test]
    fn test_stream_round_trip_reproduces_outputs() {
        let mut trained = build(NetConfig::default(), 3);
        sample_batch(&mut trained);
        trained.predict();
        let expected = trained.output().to_vec();

        let mut bytes = Vec::new();
        trained.save_weights(&mut bytes).unwrap();
        assert_eq!(bytes.len(), trained.weight_and_bias_len() * 4);

        let mut restored = predictor();
        restored.load_weights(Cursor::new(bytes)).unwrap();
        sample_batch(&mut restored);
        restored.predict();
        assert_eq!(restored.output(), expected.as_slice());
    }

    #[test]
    fn test_file_round_trip() {
        let trained = build(NetConfig::default(), 5);
        let file = NamedTempFile::new().unwrap();
        trained.save_weights_to_file(file.path()).unwrap();

        let mut restored = predictor();
        restored.load_weights_from_file(file.path()).unwrap();
        assert_eq!(all_parameters(&restored), all_parameters(&trained));
    }

    #[test]
    fn test_background_save_matches_snapshot() {
        let trained = build(NetConfig::default(), 8);
        let file = NamedTempFile::new().unwrap();
        let handle = trained.save_weights_in_background(file.path().to_path_buf());
        handle.join().unwrap().unwrap();

        let written = std::fs::read(file.path()).unwrap();
        assert_eq!(written, trained.weights_snapshot());
    }

    #[test]
    fn test_short_stream_is_rejected() {
        let mut net = predictor();
        let err = net.load_weights(Cursor::new(vec![0u8; 10])).unwrap_err();
        assert!(matches!(err, NnError::WeightStream { actual: 10, .. }));
    }
}

// ============================================================================
// Gradient Clipping
// ============================================================================

mod clipping_tests {
    use super::*;

    fn train_config(clip_grad: bool, max_grad_norm: f32) -> NetConfig {
        NetConfig {
            loss: LossKind::CrossEntropy,
            clip_grad,
            max_grad_norm,
            ..NetConfig::default()
        }
    }

    fn one_step(net: &mut NeuralNet) {
        net.set_hyperparams(Hyperparams::default().with_learning_rate(0.01));
        sample_batch(net);
        net.forward();
        net.backward();
    }

    #[test]
    fn test_clipping_below_threshold_matches_unclipped() {
        let mut plain = build(train_config(false, 0.5), 11);
        let mut clipped = build(train_config(true, 1e3), 11);
        assert_eq!(all_parameters(&plain), all_parameters(&clipped));

        one_step(&mut plain);
        one_step(&mut clipped);
        assert_eq!(clipped.clipper().unwrap().last_coef(), 1.0);
        for (a, b) in all_parameters(&plain).iter().zip(all_parameters(&clipped)) {
            assert_relative_eq!(*a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_clipping_bounds_global_norm() {
        let max_norm = 1e-3;
        let mut net = build(train_config(true, max_norm), 13);
        one_step(&mut net);

        let clipper = net.clipper().unwrap();
        assert!(clipper.last_norm() > max_norm);
        assert!(clipper.last_coef() < 1.0);

        let norm = net
            .linear_layers()
            .filter_map(|linear| linear.gradients())
            .flat_map(|(dw, db)| dw.iter().chain(db))
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt();
        assert_relative_eq!(norm, max_norm, max_relative = 1e-3);
    }

    #[test]
    fn test_no_clipper_without_clip_grad() {
        let net = build(train_config(false, 0.5), 1);
        assert!(net.clipper().is_none());
        assert!(net.linear_layers().all(|linear| linear.gradients().is_none()));
    }
}

// ============================================================================
// Modes and Hyperparameters
// ============================================================================

mod mode_tests {
    use super::*;

    #[test]
    fn test_predict_mode_backward_is_noop() {
        let config = NetConfig {
            net_type: NetType::Predict,
            loss: LossKind::CrossEntropy,
            ..NetConfig::default()
        };
        let mut net = build(config, 21);
        let before = all_parameters(&net);

        sample_batch(&mut net);
        net.forward();
        net.backward();
        assert_eq!(all_parameters(&net), before);
    }

    #[test]
    fn test_training_moves_parameters_and_lowers_loss() {
        let config = NetConfig {
            loss: LossKind::CrossEntropy,
            ..NetConfig::default()
        };
        let mut net = build(config, 4);
        net.set_hyperparams(Hyperparams::default().with_learning_rate(0.01));
        sample_batch(&mut net);
        net.forward();
        let first = net.mean_loss().unwrap();
        let before = all_parameters(&net);

        for _ in 0..100 {
            net.forward();
            net.backward();
        }
        net.forward();
        assert_ne!(all_parameters(&net), before);
        assert!(net.mean_loss().unwrap() < first);
    }

    #[test]
    fn test_hyperparams_report_changes() {
        let mut net = build(NetConfig::default(), 2);
        let params = Hyperparams::default().with_learning_rate(0.05);
        assert!(net.set_hyperparams(params));
        assert!(!net.set_hyperparams(params));
        assert!(net.set_hyperparams(params.with_epoch(2)));
    }

    #[test]
    fn test_smaller_batch_limits_output() {
        let mut net = build(NetConfig::default(), 6);
        sample_batch(&mut net);
        net.dataset_mut().set_batch_size(2);
        net.predict();
        assert_eq!(net.output().len(), 6);
        for row in net.output().chunks(3) {
            assert_relative_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        }
    }
}
