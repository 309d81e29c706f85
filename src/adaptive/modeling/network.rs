use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::adaptive::error::{AdaptiveError, AdaptiveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(&self, z: f64) -> f64 {
        match self {
            Self::Relu => z.max(0.0),
            Self::Sigmoid => 1.0 / (1.0 + (-z).exp()),
        }
    }

    /// Derivative expressed in terms of the activation output.
    fn derivative(&self, a: f64) -> f64 {
        match self {
            Self::Relu => {
                if a > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Sigmoid => a * (1.0 - a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `weights[out][in]`
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    fn new(inputs: usize, outputs: usize, activation: Activation, rng: &mut ChaCha8Rng) -> Self {
        let bound = 1.0 / (inputs.max(1) as f64).sqrt();
        let weights = (0..outputs)
            .map(|_| (0..inputs).map(|_| rng.gen_range(-bound..bound)).collect())
            .collect();
        let biases = (0..outputs).map(|_| rng.gen_range(-bound..bound)).collect();
        Self {
            weights,
            biases,
            activation,
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(row, bias)| {
                let z = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + bias;
                self.activation.apply(z)
            })
            .collect()
    }

    fn input_size(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }
}

/// Small feed-forward regressor: input -> ReLU -> ReLU -> sigmoid scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProficiencyNetwork {
    pub layers: Vec<DenseLayer>,
    /// Samples seen by the last training run; 0 for an untrained network.
    pub trained_samples: usize,
}

impl ProficiencyNetwork {
    pub fn new(input_size: usize, hidden_sizes: [usize; 2], seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let [h1, h2] = hidden_sizes;
        Self {
            layers: vec![
                DenseLayer::new(input_size, h1, Activation::Relu, &mut rng),
                DenseLayer::new(h1, h2, Activation::Relu, &mut rng),
                DenseLayer::new(h2, 1, Activation::Sigmoid, &mut rng),
            ],
            trained_samples: 0,
        }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(DenseLayer::input_size).unwrap_or(0)
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        self.activations(features)
            .last()
            .and_then(|out| out.first().copied())
            .unwrap_or(f64::NAN)
    }

    /// Activations per layer, starting with the input itself.
    fn activations(&self, features: &[f64]) -> Vec<Vec<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(features.to_vec());
        for layer in &self.layers {
            let next = layer.forward(acts.last().map(Vec::as_slice).unwrap_or(&[]));
            acts.push(next);
        }
        acts
    }

    pub fn mse(&self, samples: &[(Vec<f64>, f64)]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples
            .iter()
            .map(|(x, y)| (self.predict(x) - y).powi(2))
            .sum::<f64>()
            / samples.len() as f64
    }

    /// Full-batch gradient descent on mean squared error. Returns the loss of
    /// the final epoch.
    pub fn train(
        &mut self,
        samples: &[(Vec<f64>, f64)],
        epochs: usize,
        learning_rate: f64,
    ) -> AdaptiveResult<f64> {
        if samples.is_empty() {
            return Err(AdaptiveError::InsufficientData {
                what: "training samples",
                required: 1,
                available: 0,
            });
        }
        let input_size = self.input_size();
        if let Some((x, _)) = samples.iter().find(|(x, _)| x.len() != input_size) {
            return Err(AdaptiveError::MalformedInput(format!(
                "feature vector has {} values, network expects {input_size}",
                x.len()
            )));
        }

        let n = samples.len() as f64;
        let mut loss = f64::NAN;

        for epoch in 0..epochs {
            let mut weight_grads: Vec<Vec<Vec<f64>>> = self
                .layers
                .iter()
                .map(|l| vec![vec![0.0; l.input_size()]; l.biases.len()])
                .collect();
            let mut bias_grads: Vec<Vec<f64>> =
                self.layers.iter().map(|l| vec![0.0; l.biases.len()]).collect();
            let mut total = 0.0;

            for (x, y) in samples {
                let acts = self.activations(x);
                let output = acts[acts.len() - 1][0];
                let err = output - y;
                total += err * err;

                let mut delta = vec![2.0 * err / n];
                for l in (0..self.layers.len()).rev() {
                    let layer = &self.layers[l];
                    let a_in = &acts[l];
                    let a_out = &acts[l + 1];
                    let dz: Vec<f64> = delta
                        .iter()
                        .zip(a_out)
                        .map(|(d, a)| d * layer.activation.derivative(*a))
                        .collect();

                    for (j, dzj) in dz.iter().enumerate() {
                        for (i, ai) in a_in.iter().enumerate() {
                            weight_grads[l][j][i] += dzj * ai;
                        }
                        bias_grads[l][j] += dzj;
                    }

                    delta = (0..a_in.len())
                        .map(|i| {
                            layer
                                .weights
                                .iter()
                                .zip(&dz)
                                .map(|(row, dzj)| row[i] * dzj)
                                .sum()
                        })
                        .collect();
                }
            }

            for (l, layer) in self.layers.iter_mut().enumerate() {
                for (j, row) in layer.weights.iter_mut().enumerate() {
                    for (i, w) in row.iter_mut().enumerate() {
                        *w -= learning_rate * weight_grads[l][j][i];
                    }
                    layer.biases[j] -= learning_rate * bias_grads[l][j];
                }
            }

            loss = total / n;
            if !loss.is_finite() {
                return Err(AdaptiveError::Training(format!(
                    "loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            if (epoch + 1) % 10 == 0 {
                tracing::debug!(epoch = epoch + 1, epochs, loss, "Proficiency training progress");
            }
        }

        self.trained_samples = samples.len();
        Ok(loss)
    }
}
