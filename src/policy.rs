//! The decision policy driven by the evaluation loop.
//!
//! The loop only needs `activate(input) -> output`; whatever produced the policy (a NEAT
//! genome, a trained network, a hand-written rule) stays behind this trait.

use rand::Rng;

/// Tiles of the default 13×13 view plus the bias input.
pub const DEFAULT_INPUT_SIZE: usize = 13 * 13 + 1;

/// One output per [`Action`](crate::game::Action).
pub const OUTPUT_SIZE: usize = crate::game::Action::ALL.len();

/// What the evaluated policy should implement.
pub trait Policy {
    /// Compute the output vector for one observation.
    ///
    /// `input` is the tile grid flattened row-major followed by a `1.0` bias. The loop picks
    /// the action of the largest output.
    fn activate(&mut self, input: &[f64]) -> Vec<f64>;
}

impl<F> Policy for F
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    fn activate(&mut self, input: &[f64]) -> Vec<f64> {
        self(input)
    }
}

/// Single-layer network with sigmoid outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearPolicy {
    inputs: usize,
    // row-major, one row per output
    weights: Vec<f64>,
}

impl LinearPolicy {
    /// Policy with explicit weights, `outputs` rows of `inputs` values.
    ///
    /// Returns `None` when `weights.len()` is not `inputs * outputs`.
    pub fn new(inputs: usize, outputs: usize, weights: Vec<f64>) -> Option<LinearPolicy> {
        (weights.len() == inputs * outputs).then_some(LinearPolicy { inputs, weights })
    }

    /// Policy with weights drawn uniformly from `[-1, 1)`.
    pub fn random(inputs: usize, outputs: usize, rng: &mut impl Rng) -> LinearPolicy {
        let weights = (0..inputs * outputs)
            .map(|_| rng.random_range(-1.0..1.0))
            .collect();
        LinearPolicy { inputs, weights }
    }

    /// Number of inputs the weights expect.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Number of outputs.
    pub fn outputs(&self) -> usize {
        if self.inputs == 0 {
            0
        } else {
            self.weights.len() / self.inputs
        }
    }
}

impl Policy for LinearPolicy {
    /// Missing inputs count as zero, extra inputs are ignored.
    fn activate(&mut self, input: &[f64]) -> Vec<f64> {
        if self.inputs == 0 {
            return Vec::new();
        }
        self.weights
            .chunks(self.inputs)
            .map(|row| {
                let sum: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                1.0 / (1.0 + (-sum).exp())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::game::Action;

    #[test]
    fn weights_must_match_shape() {
        assert!(LinearPolicy::new(3, 2, vec![0.0; 6]).is_some());
        assert!(LinearPolicy::new(3, 2, vec![0.0; 5]).is_none());
    }

    #[test]
    fn strongest_row_wins() {
        let mut policy =
            LinearPolicy::new(2, 3, vec![0.0, 0.0, 1.0, 0.0, 0.0, -1.0]).unwrap();
        let output = policy.activate(&[2.0, 1.0]);
        assert_eq!(output.len(), 3);
        assert!((output[0] - 0.5).abs() < 1e-12);
        assert_eq!(Action::from_outputs(&output), Some(Action::Left));
    }

    #[test]
    fn random_policy_is_reproducible() {
        let a =
            LinearPolicy::random(DEFAULT_INPUT_SIZE, OUTPUT_SIZE, &mut StdRng::seed_from_u64(7));
        let b =
            LinearPolicy::random(DEFAULT_INPUT_SIZE, OUTPUT_SIZE, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.outputs(), OUTPUT_SIZE);
        assert_eq!(a.inputs(), DEFAULT_INPUT_SIZE);
    }

    #[test]
    fn closures_are_policies() {
        let mut always_jump = |_: &[f64]| vec![0.0, 0.0, 0.0, 0.0, 1.0];
        assert_eq!(
            Action::from_outputs(&always_jump.activate(&[1.0])),
            Some(Action::ButtonA)
        );
    }
}
