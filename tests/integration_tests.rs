//! Integration tests for the rbfnet RBF network classifier.

use ndarray::{array, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rbfnet::propagation::euclidean;
use rbfnet::{
    read_dataset, DistanceKind, LabelColumn, LeastSquares, LvqKind, PrototypeInit, RbfClassifier, RbfConfig,
    RbfError,
};
use std::fs;
use tempfile::tempdir;

/// Three well separated square clouds, samples of the classes interleaved.
fn create_blobs(per_class: usize, seed: u64) -> (Array2<f64>, Vec<i32>) {
    let centers = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
    let class_labels = [20, 10, 30];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut values = Vec::with_capacity(per_class * 3 * 2);
    let mut labels = Vec::with_capacity(per_class * 3);
    for _ in 0..per_class {
        for (c, &(cx, cy)) in centers.iter().enumerate() {
            values.push(cx + rng.gen_range(-1.0..1.0));
            values.push(cy + rng.gen_range(-1.0..1.0));
            labels.push(class_labels[c]);
        }
    }

    let features = Array2::from_shape_vec((per_class * 3, 2), values).unwrap();
    (features, labels)
}

fn base_config() -> RbfConfig {
    RbfConfig {
        hidden_per_class: 3,
        presentations_a: 5,
        presentations_b: 10,
        seed: Some(42),
        ..Default::default()
    }
}

fn accuracy(net: &RbfClassifier, features: &Array2<f64>, labels: &[i32]) -> f64 {
    let correct = features
        .outer_iter()
        .zip(labels.iter())
        .filter(|(row, label)| net.classify(row.view()).unwrap().winner_label() == Some(**label))
        .count();
    correct as f64 / labels.len() as f64
}

#[test]
fn test_end_to_end_all_trainers() {
    let (features, labels) = create_blobs(15, 1);

    let phase_b = [
        (LvqKind::Lvq1, 0.0, 0.0),
        (LvqKind::Olvq1, 0.0, 0.0),
        (LvqKind::Lvq3, 0.3, 0.2),
        (LvqKind::Olvq3, 0.3, 0.2),
        (LvqKind::Lvq4, 0.3, 0.2),
    ];

    for &(kind, learn_factor, window_size) in &phase_b {
        for init in [PrototypeInit::Random, PrototypeInit::MaxDistance] {
            let config = RbfConfig {
                trainer_a: Some(LvqKind::Olvq1),
                trainer_b: Some(kind),
                learn_factor,
                window_size,
                prototype_init: init,
                ..base_config()
            };
            let mut net = RbfClassifier::new(config).unwrap();
            net.train(features.view(), &labels)
                .unwrap_or_else(|e| panic!("{} / {:?} failed: {}", kind, init, e));

            assert!(net.is_trained());
            assert_eq!(net.labels(), &[20, 10, 30]);
            assert_eq!(net.prototypes().unwrap().dim(), (9, 2));
            assert_eq!(net.prototype_classes().unwrap(), &[0, 0, 0, 1, 1, 1, 2, 2, 2]);
            assert_eq!(net.output_weights().unwrap().dim(), (3, 9));

            for row in features.outer_iter() {
                let result = net.classify(row).unwrap();
                assert!(!result.rejected);
                assert!(result.probabilities.iter().all(|&p| p >= 0.0));
                let sum: f64 = result.probabilities.iter().sum();
                assert!((sum - 1.0).abs() < 1e-9, "probabilities sum to {}", sum);
            }
            assert!(accuracy(&net, &features, &labels) > 0.95, "{} / {:?}", kind, init);
        }
    }
}

#[test]
fn test_two_class_init_only_scenario() {
    let features = array![
        [0.0, 0.0],
        [0.1, 0.0],
        [0.0, 0.1],
        [0.1, 0.1],
        [5.0, 5.0],
        [5.1, 5.0],
        [5.0, 5.1],
        [5.1, 5.1]
    ];
    let labels = [1, 1, 1, 1, 2, 2, 2, 2];
    let config = RbfConfig {
        hidden_per_class: 1,
        trainer_a: None,
        trainer_b: None,
        sigma_factor: 0.7,
        ..Default::default()
    };

    let mut net = RbfClassifier::new(config).unwrap();
    net.train(features.view(), &labels).unwrap();

    // The smallest-norm vector of each class becomes its prototype
    let prototypes = net.prototypes().unwrap();
    assert_eq!(prototypes.row(0), features.row(0));
    assert_eq!(prototypes.row(1), features.row(4));

    let mutual = euclidean(features.row(0), features.row(4));
    let sigmas = net.sigmas().unwrap();
    assert!((sigmas[0] - 0.7 * mutual).abs() < 1e-12);
    assert!((sigmas[1] - 0.7 * mutual).abs() < 1e-12);

    for (row, label) in [(0usize, 1), (4, 2)] {
        let result = net.classify(prototypes.row(row / 4)).unwrap();
        assert_eq!(result.winner_label(), Some(label));
        assert!(result.winner_probability() > 0.9);
    }
}

#[test]
fn test_sigmas_match_nearest_foreign_prototype() {
    let (features, labels) = create_blobs(10, 2);
    let config = RbfConfig {
        sigma_factor: 0.5,
        ..base_config()
    };
    let mut net = RbfClassifier::new(config).unwrap();
    net.train(features.view(), &labels).unwrap();

    let prototypes = net.prototypes().unwrap();
    let sigmas = net.sigmas().unwrap();
    for i in 0..prototypes.nrows() {
        let nearest = (0..prototypes.nrows())
            .filter(|&j| j / 3 != i / 3)
            .map(|j| euclidean(prototypes.row(i), prototypes.row(j)))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(sigmas[i], 0.5 * nearest);
    }
}

#[test]
fn test_inactive_class_keeps_trained_network() {
    // Class 2 only occurs where class 1 is three times as frequent
    let features = array![[0.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 0.0]];
    let labels = [1, 1, 1, 1, 2];
    let config = RbfConfig {
        hidden_per_class: 1,
        trainer_a: None,
        trainer_b: None,
        ..Default::default()
    };

    let mut net = RbfClassifier::new(config).unwrap();
    match net.train(features.view(), &labels) {
        Err(RbfError::InactiveClasses(inactive)) => assert_eq!(inactive, vec![2]),
        other => panic!("expected inactive classes, got {:?}", other),
    }

    assert!(net.is_trained());
    assert!(net.probability_table().unwrap()[1].is_empty());
    let result = net.classify(features.row(4)).unwrap();
    assert_eq!(result.winner_label(), Some(1));
    let sum: f64 = result.probabilities.iter().sum();
    assert!(sum > 0.0 && sum <= 1.0 + 1e-9);
}

#[test]
fn test_invalid_training_leaves_state_untouched() {
    let (features, labels) = create_blobs(6, 3);
    let mut net = RbfClassifier::new(base_config()).unwrap();
    net.train(features.view(), &labels).unwrap();
    let before = net.to_json_string().unwrap();

    assert!(matches!(
        net.train(features.view(), &labels[1..]),
        Err(RbfError::DimensionMismatch { .. })
    ));
    let empty = Array2::<f64>::zeros((0, 2));
    assert!(matches!(net.train(empty.view(), &[]), Err(RbfError::EmptyInput(_))));

    assert_eq!(net.to_json_string().unwrap(), before);
}

#[test]
fn test_training_is_deterministic_with_seed() {
    let (features, labels) = create_blobs(8, 4);
    let config = RbfConfig {
        prototype_init: PrototypeInit::Random,
        trainer_b: Some(LvqKind::Lvq3),
        ..base_config()
    };

    let mut a = RbfClassifier::new(config.clone()).unwrap();
    let mut b = RbfClassifier::new(config).unwrap();
    a.train(features.view(), &labels).unwrap();
    b.train(features.view(), &labels).unwrap();
    assert_eq!(a.to_json_string().unwrap(), b.to_json_string().unwrap());

    let mut c = RbfClassifier::new(base_config()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    c.train_with_rng(features.view(), &labels, &mut rng).unwrap();
    assert!(accuracy(&c, &features, &labels) > 0.95);
}

#[test]
fn test_json_round_trip() {
    let (features, labels) = create_blobs(10, 5);
    let mut net = RbfClassifier::new(base_config()).unwrap();
    net.train(features.view(), &labels).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("net.json");
    net.save_json(&path).unwrap();

    let loaded = RbfClassifier::load_json(&path).unwrap();
    assert_eq!(loaded.config(), net.config());
    assert_eq!(loaded.labels(), net.labels());
    assert_eq!(loaded.prototype_classes().unwrap(), net.prototype_classes().unwrap());

    let close = |a: &[f64], b: &[f64]| a.iter().zip(b).all(|(x, y)| (x - y).abs() <= 1e-9 * x.abs().max(1.0));
    assert!(close(
        loaded.prototypes().unwrap().as_slice().unwrap(),
        net.prototypes().unwrap().as_slice().unwrap()
    ));
    assert!(close(loaded.sigmas().unwrap(), net.sigmas().unwrap()));
    assert!(close(
        loaded.output_weights().unwrap().as_slice().unwrap(),
        net.output_weights().unwrap().as_slice().unwrap()
    ));
    assert_eq!(
        loaded.probability_table().unwrap().len(),
        net.probability_table().unwrap().len()
    );

    for row in features.outer_iter() {
        assert_eq!(loaded.classify(row).unwrap().winner, net.classify(row).unwrap().winner);
    }
}

#[test]
fn test_binary_round_trip() {
    let (features, labels) = create_blobs(10, 6);
    let mut net = RbfClassifier::new(base_config()).unwrap();
    net.train(features.view(), &labels).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("net.rbfn");
    net.save(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], b"RBFN");

    let loaded = RbfClassifier::load(&path).unwrap();
    assert_eq!(loaded.prototypes().unwrap(), net.prototypes().unwrap());
    assert_eq!(loaded.sigmas().unwrap(), net.sigmas().unwrap());
    assert_eq!(loaded.output_weights().unwrap(), net.output_weights().unwrap());
    assert_eq!(loaded.probability_table().unwrap(), net.probability_table().unwrap());
    for row in features.outer_iter() {
        assert_eq!(loaded.classify(row).unwrap(), net.classify(row).unwrap());
    }
}

#[test]
fn test_load_rejects_bad_files() {
    let dir = tempdir().unwrap();

    let path = dir.path().join("garbage.rbfn");
    fs::write(&path, b"NOPE1234").unwrap();
    assert!(matches!(
        RbfClassifier::load(&path),
        Err(RbfError::InvalidModelFormat(_))
    ));

    let short = dir.path().join("short.rbfn");
    fs::write(&short, b"RB").unwrap();
    assert!(matches!(
        RbfClassifier::load(&short),
        Err(RbfError::InvalidModelFormat(_))
    ));

    // Hidden layer size no longer matches the configuration
    let (features, labels) = create_blobs(5, 7);
    let mut net = RbfClassifier::new(base_config()).unwrap();
    net.train(features.view(), &labels).unwrap();
    let json = net
        .to_json_string()
        .unwrap()
        .replacen("\"hidden_per_class\": 3", "\"hidden_per_class\": 2", 1);
    assert!(matches!(
        RbfClassifier::from_json_str(&json),
        Err(RbfError::InvalidModelFormat(_))
    ));
}

#[test]
fn test_qr_solver_and_l1_distance() {
    let (features, labels) = create_blobs(10, 8);
    let config = RbfConfig {
        hidden_per_class: 1,
        least_squares: LeastSquares::Qr,
        distance: DistanceKind::L1,
        ..base_config()
    };
    let mut net = RbfClassifier::new(config).unwrap();
    net.train(features.view(), &labels).unwrap();
    assert!(accuracy(&net, &features, &labels) > 0.95);
}

#[test]
fn test_train_from_sample_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("train.csv");
    let mut text = String::from("# x, y, label\n");
    let (features, labels) = create_blobs(6, 9);
    for (row, label) in features.outer_iter().zip(labels.iter()) {
        text.push_str(&format!("{}, {}, {}\n", row[0], row[1], label));
    }
    fs::write(&path, text).unwrap();

    let data = read_dataset(&path, LabelColumn::Required).unwrap();
    assert_eq!(data.features, features);
    let file_labels = data.labels.unwrap();
    assert_eq!(file_labels, labels);

    let mut net = RbfClassifier::new(base_config()).unwrap();
    net.train(data.features.view(), &file_labels).unwrap();
    assert!(accuracy(&net, &data.features, &file_labels) > 0.95);
}

#[test]
fn test_invalid_phase_b_lvq1_defaults() {
    let config = RbfConfig {
        trainer_b: Some(LvqKind::Lvq1),
        ..Default::default()
    };
    assert!(matches!(RbfClassifier::new(config), Err(RbfError::Config(_))));
}
