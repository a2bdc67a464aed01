//! The RBF network classifier.

use super::calibration::{calibrate, LabelMap, ProbabilityTable};
use super::hidden::{HiddenLayer, HiddenLayerTrainer};
use super::output::OutputLayer;
use crate::config::RbfConfig;
use crate::error::{RbfError, Result};
use crate::lvq::{TrainerSettings, TrainingSet};
use crate::progress::{NoProgress, ProgressSink};
use crate::storage::{self, ModelFormat};
use log::{debug, info};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of classifying one vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// External labels, in internal class order.
    pub labels: Vec<i32>,
    /// Probability of each label.
    pub probabilities: Vec<f64>,
    /// Index of the most probable label.
    pub winner: usize,
    /// Set when the input could not be classified.
    pub rejected: bool,
}

impl Classification {
    /// An all-zero rejected result over `labels`.
    pub fn rejected(labels: Vec<i32>) -> Self {
        let probabilities = vec![0.0; labels.len()];
        Self {
            labels,
            probabilities,
            winner: 0,
            rejected: true,
        }
    }

    /// Label of the winner, if any label exists.
    pub fn winner_label(&self) -> Option<i32> {
        self.labels.get(self.winner).copied()
    }

    /// Probability of the winner, 0 when there is none.
    pub fn winner_probability(&self) -> f64 {
        self.probabilities.get(self.winner).copied().unwrap_or(0.0)
    }
}

/// A trained network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Network {
    input_dim: usize,
    hidden: HiddenLayer,
    output: OutputLayer,
    labels: LabelMap,
    probabilities: ProbabilityTable,
}

impl Network {
    /// Checks the shape relations between the parts.
    fn validate(&self, config: &RbfConfig) -> Result<()> {
        let classes = self.labels.len();
        let neurons = self.hidden.neurons();
        let fail = |msg: String| Err(RbfError::InvalidModelFormat(msg));

        if classes == 0 {
            return fail("network has no classes".to_string());
        }
        if neurons != classes * config.hidden_per_class {
            return fail(format!(
                "{} hidden neurons for {} classes of {} prototypes",
                neurons, classes, config.hidden_per_class
            ));
        }
        if self.hidden.dim() != self.input_dim {
            return fail(format!(
                "prototypes have dimension {}, network input {}",
                self.hidden.dim(),
                self.input_dim
            ));
        }
        if self.hidden.sigmas().len() != neurons {
            return fail(format!("{} sigmas for {} neurons", self.hidden.sigmas().len(), neurons));
        }
        if let Some(&id) = self.hidden.out_ids().iter().find(|&&id| id >= classes) {
            return fail(format!("prototype class {} out of range", id));
        }
        if self.output.weights().dim() != (classes, neurons) {
            let (r, c) = self.output.weights().dim();
            return fail(format!("output weights are {}x{}, expected {}x{}", r, c, classes, neurons));
        }
        if self.probabilities.len() != classes {
            return fail(format!(
                "{} probability rows for {} classes",
                self.probabilities.len(),
                classes
            ));
        }
        if self
            .probabilities
            .rows()
            .iter()
            .flatten()
            .any(|&(class, _)| class >= classes)
        {
            return fail("probability table refers to unknown class".to_string());
        }
        Ok(())
    }

    /// Normalized output activations.
    fn outputs(&self, input: ArrayView1<f64>) -> Result<ndarray::Array1<f64>> {
        let hidden = self.hidden.propagate(input)?;
        self.output.propagate(hidden.view())
    }

    fn classify(&self, input: ArrayView1<f64>) -> Result<Classification> {
        let out = self.outputs(input)?;
        let probabilities = self.probabilities.apply(out.view(), self.labels.len());
        let winner = first_max_index(probabilities.iter().copied());
        Ok(Classification {
            labels: self.labels.labels().to_vec(),
            probabilities: probabilities.to_vec(),
            winner,
            rejected: false,
        })
    }
}

/// Persisted form: configuration plus the trained network.
#[derive(Serialize)]
struct SavedModelRef<'a> {
    config: &'a RbfConfig,
    network: &'a Network,
}

#[derive(Deserialize)]
struct SavedModel {
    config: RbfConfig,
    network: Network,
}

/// Radial basis function network classifier.
///
/// The hidden layer holds `hidden_per_class` Gaussian prototypes per class,
/// placed by LVQ. The output layer is a least squares fit of one sigmoid
/// unit per class, and a confusion-based table turns the output units into
/// label probabilities.
///
/// # Example
///
/// ```no_run
/// use rbfnet::{RbfClassifier, RbfConfig};
/// use ndarray::array;
///
/// let features = array![[0.0, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 5.0]];
/// let labels = [1, 1, 2, 2];
///
/// let config = RbfConfig { hidden_per_class: 1, ..Default::default() };
/// let mut net = RbfClassifier::new(config)?;
/// net.train(features.view(), &labels)?;
///
/// let result = net.classify(array![0.05, 0.0].view())?;
/// assert_eq!(result.winner_label(), Some(1));
/// # Ok::<(), rbfnet::RbfError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RbfClassifier {
    config: RbfConfig,
    network: Option<Network>,
}

impl RbfClassifier {
    /// Creates an untrained classifier after validating `config`.
    pub fn new(config: RbfConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            network: None,
        })
    }

    /// Assembles a trained classifier from explicit parts.
    ///
    /// `prototypes` holds `labels.len() * config.hidden_per_class` rows,
    /// `output_weights` is `labels.len() x prototypes`, and each row of
    /// `probabilities` lists `(class index, probability)` pairs where the
    /// class index points into `labels`.
    pub fn from_parts(
        config: RbfConfig,
        prototypes: Array2<f64>,
        prototype_classes: Vec<usize>,
        sigmas: Vec<f64>,
        output_weights: Array2<f64>,
        labels: Vec<i32>,
        probabilities: Vec<Vec<(usize, f64)>>,
    ) -> Result<Self> {
        config.validate()?;
        let labels = LabelMap::from(labels);
        let input_dim = prototypes.ncols();
        let hidden = HiddenLayer::from_parts(prototypes, prototype_classes, sigmas, config.distance)?;
        let output = OutputLayer::new(output_weights, config.sigmoid_slope());
        let probabilities = ProbabilityTable::from_rows(probabilities, labels.len())?;

        let network = Network {
            input_dim,
            hidden,
            output,
            labels,
            probabilities,
        };
        network.validate(&config)?;

        Ok(Self {
            config,
            network: Some(network),
        })
    }

    /// The configuration.
    #[inline]
    pub fn config(&self) -> &RbfConfig {
        &self.config
    }

    /// Replaces the configuration; the trained network is kept until the
    /// next training run.
    pub fn set_config(&mut self, config: RbfConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// True once a training run (or [`RbfClassifier::from_parts`]) has
    /// produced a network.
    #[inline]
    pub fn is_trained(&self) -> bool {
        self.network.is_some()
    }

    fn network(&self) -> Result<&Network> {
        self.network.as_ref().ok_or(RbfError::NotTrained)
    }

    /// Trains with a generator seeded from `config.seed`, or from entropy.
    pub fn train(&mut self, features: ArrayView2<f64>, labels: &[i32]) -> Result<()> {
        let mut rng = self.rng();
        self.train_with_progress(features, labels, &mut rng, &mut NoProgress)
    }

    /// Trains with an explicit random source.
    pub fn train_with_rng<R: Rng>(&mut self, features: ArrayView2<f64>, labels: &[i32], rng: &mut R) -> Result<()> {
        self.train_with_progress(features, labels, rng, &mut NoProgress)
    }

    /// Trains with an explicit random source, reporting to `progress`.
    ///
    /// Fails without touching the current network on invalid input or when
    /// the output solve fails. When some class never wins on the training
    /// set the new network is still stored and
    /// [`RbfError::InactiveClasses`] is returned.
    pub fn train_with_progress<R: Rng, P: ProgressSink + ?Sized>(
        &mut self,
        features: ArrayView2<f64>,
        labels: &[i32],
        rng: &mut R,
        progress: &mut P,
    ) -> Result<()> {
        if features.nrows() == 0 {
            return Err(RbfError::EmptyInput("no training vectors".to_string()));
        }
        if features.ncols() == 0 {
            return Err(RbfError::EmptyInput("training vectors have no components".to_string()));
        }
        if labels.len() != features.nrows() {
            return Err(RbfError::DimensionMismatch {
                expected: features.nrows(),
                found: labels.len(),
            });
        }
        let phase_a = self.config.phase_a()?;
        let phase_b = self.config.phase_b()?;

        let config = &self.config;
        let (label_map, classes) = LabelMap::from_labels(labels);
        let num_classes = label_map.len();
        // Reborrow so the view can share the lifetime of the local class ids
        let set = TrainingSet::new(features.view(), &classes, num_classes)?;

        info!(
            "Training RBF network: {} vectors of dimension {}, {} classes, {} prototypes",
            set.len(),
            set.dim(),
            num_classes,
            num_classes * config.hidden_per_class
        );

        progress.reset();
        progress.set_title("RBF: Training");
        progress.set_max_steps(config.progress_steps());
        progress.step("Initializing layer 1");

        let mut hidden = HiddenLayer::new(num_classes, config.hidden_per_class, set.dim(), config.distance);
        let mut trainer = HiddenLayerTrainer::new(config.prototype_init, config.hidden_per_class);
        trainer.advance(&mut hidden, &set, rng)?;

        run_phase(&mut trainer, &mut hidden, &set, phase_a, config.presentations_a, rng, progress)?;
        run_phase(&mut trainer, &mut hidden, &set, phase_b, config.presentations_b, rng, progress)?;

        hidden.compute_sigmas(config.sigma_factor);

        progress.step("Initializing layer 2");
        let h = hidden.design_matrix(features)?;
        let htilde = hidden.self_activation()?;
        let output = OutputLayer::solve(
            h.view(),
            htilde.view(),
            &classes,
            num_classes,
            config.lambda,
            config.least_squares,
            config.sigmoid_slope(),
        )?;

        // Winner output unit of every training vector
        let mut winners = Vec::with_capacity(set.len());
        for (row, hidden_out) in h.outer_iter().enumerate() {
            let out = output.propagate(hidden_out)?;
            let winner = first_max_index(out.iter().copied());
            debug!("Training vector {} wins output {}", row, winner);
            winners.push(winner);
        }
        let (probabilities, inactive) = calibrate(&winners, &classes, &label_map);

        self.network = Some(Network {
            input_dim: set.dim(),
            hidden,
            output,
            labels: label_map,
            probabilities,
        });

        if !inactive.is_empty() {
            return Err(RbfError::InactiveClasses(inactive));
        }

        progress.step("Training ready.");
        info!("RBF network trained");
        Ok(())
    }

    /// Classifies one vector.
    pub fn classify(&self, input: ArrayView1<f64>) -> Result<Classification> {
        self.network()?.classify(input)
    }

    /// Classifies one vector, turning every failure into a rejected result.
    pub fn classify_or_reject(&self, input: ArrayView1<f64>) -> Classification {
        match self.classify(input) {
            Ok(result) => result,
            Err(e) => {
                debug!("Rejecting input: {}", e);
                Classification::rejected(self.labels().to_vec())
            }
        }
    }

    /// External labels in internal class order; empty before training.
    pub fn labels(&self) -> &[i32] {
        self.network.as_ref().map(|n| n.labels.labels()).unwrap_or(&[])
    }

    /// Input dimensionality of the trained network.
    pub fn input_dim(&self) -> Result<usize> {
        Ok(self.network()?.input_dim)
    }

    /// Hidden layer prototypes, one per row.
    pub fn prototypes(&self) -> Result<&Array2<f64>> {
        Ok(self.network()?.hidden.weights())
    }

    /// Internal class id of every prototype.
    pub fn prototype_classes(&self) -> Result<&[usize]> {
        Ok(self.network()?.hidden.out_ids())
    }

    /// Gaussian width of every prototype.
    pub fn sigmas(&self) -> Result<&[f64]> {
        Ok(self.network()?.hidden.sigmas())
    }

    /// Output weights, one row per class.
    pub fn output_weights(&self) -> Result<&Array2<f64>> {
        Ok(self.network()?.output.weights())
    }

    /// Class id of every output unit.
    pub fn output_ids(&self) -> Result<&[usize]> {
        Ok(self.network()?.output.out_ids())
    }

    /// Calibrated `(class index, probability)` rows, one per output unit.
    pub fn probability_table(&self) -> Result<&[Vec<(usize, f64)>]> {
        Ok(self.network()?.probabilities.rows())
    }

    /// Serializes configuration and network to a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let saved = self.saved()?;
        Ok(serde_json::to_string_pretty(&saved)?)
    }

    /// Restores a classifier from [`RbfClassifier::to_json_string`] output.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let saved: SavedModel = serde_json::from_str(json)?;
        Self::from_saved(saved)
    }

    /// Writes the classifier as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        storage::write_json(path, &self.saved()?)
    }

    /// Reads a classifier written by [`RbfClassifier::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_saved(storage::read_json(path)?)
    }

    /// Writes the classifier in the binary format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ModelFormat::write(path, &self.saved()?)
    }

    /// Reads a classifier written by [`RbfClassifier::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_saved(ModelFormat::read(path)?)
    }

    fn saved(&self) -> Result<SavedModelRef<'_>> {
        Ok(SavedModelRef {
            config: &self.config,
            network: self.network()?,
        })
    }

    fn from_saved(saved: SavedModel) -> Result<Self> {
        saved
            .config
            .validate()
            .map_err(|e| RbfError::InvalidModelFormat(e.to_string()))?;
        saved.network.validate(&saved.config)?;
        Ok(Self {
            config: saved.config,
            network: Some(saved.network),
        })
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.config.seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

fn run_phase<R: Rng, P: ProgressSink + ?Sized>(
    trainer: &mut HiddenLayerTrainer,
    hidden: &mut HiddenLayer,
    set: &TrainingSet<'_>,
    settings: Option<TrainerSettings>,
    epochs: usize,
    rng: &mut R,
    progress: &mut P,
) -> Result<()> {
    let Some(settings) = settings else {
        return Ok(());
    };

    info!("LVQ phase with {}: {} epochs", settings.kind, epochs);
    trainer.set_trainer(settings);
    for i in 0..epochs {
        progress.step(&format!("layer 1 {} step {}", settings.kind, i));
        trainer.advance(hidden, set, rng)?;
    }
    Ok(())
}

/// Index of the first maximum.
fn first_max_index<I: Iterator<Item = f64>>(values: I) -> usize {
    let mut best_idx = 0;
    let mut best = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if i == 0 || v > best {
            best = v;
            best_idx = i;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lvq::{LvqKind, PrototypeInit};
    use crate::progress::RecordingProgress;
    use crate::rbf::LeastSquares;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Vec<i32>) {
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
        (features, vec![3, 3, 3, 3, 8, 8, 8, 8])
    }

    fn init_only() -> RbfConfig {
        RbfConfig {
            hidden_per_class: 1,
            trainer_a: None,
            trainer_b: None,
            seed: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_untrained_classifier() {
        let net = RbfClassifier::new(RbfConfig::default()).unwrap();
        assert!(!net.is_trained());
        assert!(matches!(net.classify(array![0.0].view()), Err(RbfError::NotTrained)));
        let rejected = net.classify_or_reject(array![0.0].view());
        assert!(rejected.rejected);
        assert!(rejected.labels.is_empty());
        assert!(net.to_json_string().is_err());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = RbfConfig {
            high: 0.0,
            ..Default::default()
        };
        assert!(RbfClassifier::new(config).is_err());
    }

    #[test]
    fn test_train_rejects_bad_input() {
        let mut net = RbfClassifier::new(init_only()).unwrap();
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            net.train(empty.view(), &[]),
            Err(RbfError::EmptyInput(_))
        ));

        let (features, _) = two_blobs();
        assert!(matches!(
            net.train(features.view(), &[1, 2]),
            Err(RbfError::DimensionMismatch { .. })
        ));
        assert!(!net.is_trained());
    }

    #[test]
    fn test_init_only_two_classes() {
        let (features, labels) = two_blobs();
        let mut net = RbfClassifier::new(init_only()).unwrap();
        net.train(features.view(), &labels).unwrap();

        let prototypes = net.prototypes().unwrap();
        assert_eq!(prototypes.row(0), features.row(0));
        assert_eq!(prototypes.row(1), features.row(4));
        assert_eq!(net.labels(), &[3, 8]);
        assert_eq!(net.output_ids().unwrap(), &[0, 1]);

        for &(row, label) in &[(0usize, 3), (4, 8)] {
            let result = net.classify(features.row(row)).unwrap();
            assert!(!result.rejected);
            assert_eq!(result.winner_label(), Some(label));
            assert!(result.winner_probability() > 0.9);
            let sum: f64 = result.probabilities.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_progress_messages() {
        let (features, labels) = two_blobs();
        let config = RbfConfig {
            hidden_per_class: 2,
            presentations_a: 2,
            presentations_b: 3,
            trainer_a: Some(LvqKind::Olvq1),
            trainer_b: Some(LvqKind::Lvq3),
            prototype_init: PrototypeInit::Random,
            seed: Some(4),
            ..Default::default()
        };
        let mut net = RbfClassifier::new(config).unwrap();
        let mut sink = RecordingProgress::default();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        net.train_with_progress(features.view(), &labels, &mut rng, &mut sink)
            .unwrap();

        assert_eq!(sink.resets, 1);
        assert_eq!(sink.title, "RBF: Training");
        assert_eq!(sink.max_steps, 8);
        assert_eq!(
            sink.steps,
            vec![
                "Initializing layer 1",
                "layer 1 OLVQ1 step 0",
                "layer 1 OLVQ1 step 1",
                "layer 1 LVQ3 step 0",
                "layer 1 LVQ3 step 1",
                "layer 1 LVQ3 step 2",
                "Initializing layer 2",
                "Training ready.",
            ]
        );
    }

    #[test]
    fn test_coinciding_prototypes_fail_in_solver() {
        // Both classes start from [0, 0], so every sigma is zero
        let features = array![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0], [2.0, 2.0]];
        let labels = [1, 1, 2, 2];
        for method in [LeastSquares::Svd, LeastSquares::Qr] {
            let config = RbfConfig {
                least_squares: method,
                ..init_only()
            };
            let mut net = RbfClassifier::new(config).unwrap();
            assert!(matches!(
                net.train(features.view(), &labels),
                Err(RbfError::Solver(_))
            ));
            assert!(!net.is_trained());
        }
    }

    #[test]
    fn test_classify_dimension_mismatch() {
        let (features, labels) = two_blobs();
        let mut net = RbfClassifier::new(init_only()).unwrap();
        net.train(features.view(), &labels).unwrap();

        let bad = array![1.0, 2.0, 3.0];
        assert!(matches!(
            net.classify(bad.view()),
            Err(RbfError::DimensionMismatch { .. })
        ));
        let rejected = net.classify_or_reject(bad.view());
        assert!(rejected.rejected);
        assert_eq!(rejected.probabilities, vec![0.0, 0.0]);
        assert_eq!(rejected.labels, vec![3, 8]);
    }

    #[test]
    fn test_failed_training_keeps_previous_network() {
        let (features, labels) = two_blobs();
        let mut net = RbfClassifier::new(init_only()).unwrap();
        net.train(features.view(), &labels).unwrap();
        let before = net.prototypes().unwrap().clone();

        assert!(net.train(features.view(), &labels[..3]).is_err());
        assert!(net.is_trained());
        assert_eq!(net.prototypes().unwrap(), &before);
    }

    #[test]
    fn test_from_parts_validates_shapes() {
        let config = init_only();
        let ok = RbfClassifier::from_parts(
            config.clone(),
            array![[0.0], [1.0]],
            vec![0, 1],
            vec![0.5, 0.5],
            array![[1.0, -1.0], [-1.0, 1.0]],
            vec![10, 20],
            vec![vec![(0, 1.0)], vec![(1, 1.0)]],
        )
        .unwrap();
        let result = ok.classify(array![0.9].view()).unwrap();
        assert_eq!(result.winner_label(), Some(20));

        let bad = RbfClassifier::from_parts(
            config,
            array![[0.0], [1.0]],
            vec![0, 1],
            vec![0.5, 0.5],
            array![[1.0, -1.0]],
            vec![10, 20],
            vec![vec![(0, 1.0)], vec![(1, 1.0)]],
        );
        assert!(matches!(bad, Err(RbfError::InvalidModelFormat(_))));
    }

    #[test]
    fn test_json_string_round_trip() {
        let (features, labels) = two_blobs();
        let mut net = RbfClassifier::new(init_only()).unwrap();
        net.train(features.view(), &labels).unwrap();

        let json = net.to_json_string().unwrap();
        let back = RbfClassifier::from_json_str(&json).unwrap();
        assert_eq!(back.config(), net.config());
        assert_eq!(back.labels(), net.labels());
        assert_eq!(back.sigmas().unwrap(), net.sigmas().unwrap());
        let a = net.classify(features.row(2)).unwrap();
        let b = back.classify(features.row(2)).unwrap();
        assert_eq!(a.winner, b.winner);
    }

    #[test]
    fn test_first_max_index() {
        assert_eq!(first_max_index([0.1, 0.7, 0.7, 0.2].into_iter()), 1);
        assert_eq!(first_max_index(std::iter::empty()), 0);
    }
}
