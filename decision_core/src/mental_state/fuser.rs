//! Gated recurrent fusion of tactical, visual and self-state evidence.
//!
//! Every modality is projected into the latent space on its own. Anchored dimensions receive
//! their quantity through identity rows; the hypothesis region receives fixed pseudo-random
//! projections of all modalities plus a recurrent term. The candidate state is then blended
//! with the prior through a per-dimension gate:
//!
//! ```text
//! g_i  = sigmoid(bias + gain * |c_i - z_i|)
//! z'_i = (1 - g_i) * z_i + g_i * c_i
//! ```
//!
//! The gate is strictly below one, so encode never overwrites memory outright.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tactical_core::{TacticalFeatures, TACTICAL_FEATURE_DIM};
use tracing::trace;

use super::dynamics::DynamicsTable;
use super::features::{SelfFeatures, SELF_FEATURE_DIM};
use super::latent::{Anchor, Latent, ANCHOR_DIM, SELF_ANCHOR_OFFSET};
use super::slices::{AffectSlice, DecodedState, HypothesisSlice, SelfSlice, WorldSlice};
use crate::action::{Action, ACTION_ENCODING_DIM, ACTION_TYPE_COUNT};
use crate::error::{DecisionError, Result};

/// Weight of the previous hypothesis value inside the hypothesis candidate.
const RECURRENT_WEIGHT: f32 = 0.5;

/// Configuration for the fuser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Latent length. Must exceed the anchored block.
    pub latent_dim: usize,
    /// Expected visual embedding length.
    pub visual_dim: usize,
    /// Seed for the fixed projection weights.
    pub seed: u64,
    pub gate_bias: f32,
    pub gate_gain: f32,
    /// Gate bias for the prediction step.
    pub predict_gate_bias: f32,
    /// Magnitude bound of the random projection weights.
    pub projection_scale: f32,
    /// Confidence multiplier when no visual embedding arrived.
    pub missing_visual_confidence: f32,
    /// Confidence multiplier when the tactical features are flagged degraded.
    pub stale_confidence: f32,
    pub dynamics: DynamicsTable,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            latent_dim: 64,
            visual_dim: 32,
            seed: 0x5eed_cafe,
            gate_bias: 0.0,
            gate_gain: 4.0,
            predict_gate_bias: 0.0,
            projection_scale: 0.3,
            missing_visual_confidence: 0.5,
            stale_confidence: 0.5,
            dynamics: DynamicsTable::default(),
        }
    }
}

impl FusionConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.latent_dim <= ANCHOR_DIM {
            return Err(DecisionError::Configuration(format!(
                "latent_dim must exceed {ANCHOR_DIM}, got {}",
                self.latent_dim
            )));
        }
        if !(self.projection_scale.is_finite() && self.projection_scale > 0.0) {
            return Err(DecisionError::Configuration(
                "projection_scale must be positive".into(),
            ));
        }
        let gate_ok = [self.gate_bias, self.gate_gain, self.predict_gate_bias]
            .iter()
            .all(|v| v.is_finite())
            && self.gate_gain >= 0.0;
        if !gate_ok {
            return Err(DecisionError::Configuration(
                "gate parameters must be finite with a non-negative gain".into(),
            ));
        }
        for (name, factor) in [
            ("missing_visual_confidence", self.missing_visual_confidence),
            ("stale_confidence", self.stale_confidence),
        ] {
            if !(0.0..=1.0).contains(&factor) {
                return Err(DecisionError::Configuration(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }

    fn hypothesis_dim(&self) -> usize {
        self.latent_dim - ANCHOR_DIM
    }
}

/// Row-major weights from one modality into the hypothesis region.
#[derive(Debug, Clone)]
struct Projection {
    rows: usize,
    cols: usize,
    weights: Vec<f32>,
}

impl Projection {
    fn random(rng: &mut StdRng, rows: usize, cols: usize, scale: f32) -> Self {
        let weights = (0..rows * cols)
            .map(|_| rng.random_range(-scale..=scale))
            .collect();
        Self {
            rows,
            cols,
            weights,
        }
    }

    /// Adds `W * input` into `out`. Zero-length inputs contribute nothing.
    fn accumulate(&self, input: &[f32], out: &mut [f32]) {
        if input.is_empty() {
            return;
        }
        for (row, slot) in out.iter_mut().enumerate().take(self.rows) {
            let weights = &self.weights[row * self.cols..(row + 1) * self.cols];
            *slot += weights.iter().zip(input).map(|(w, x)| w * x).sum::<f32>();
        }
    }
}

/// Fixed-shape encode / decode / predict over agent latents. Holds no per-agent state.
#[derive(Debug, Clone)]
pub struct MentalStateFuser {
    config: FusionConfig,
    tactical: Projection,
    self_state: Projection,
    visual: Projection,
    action: Projection,
}

impl MentalStateFuser {
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let rows = config.hypothesis_dim();
        let scale = config.projection_scale;
        Ok(Self {
            tactical: Projection::random(&mut rng, rows, TACTICAL_FEATURE_DIM, scale),
            self_state: Projection::random(&mut rng, rows, SELF_FEATURE_DIM, scale),
            visual: Projection::random(&mut rng, rows, config.visual_dim, scale),
            action: Projection::random(&mut rng, rows, ACTION_ENCODING_DIM, scale),
            config,
        })
    }

    /// Create a fuser with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(FusionConfig::default())
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn latent_dim(&self) -> usize {
        self.config.latent_dim
    }

    /// The zero state agents start from and return to on reset.
    pub fn zero_latent(&self) -> Latent {
        Latent::zeros(self.config.latent_dim)
    }

    fn check_latent(&self, latent: &Latent, what: &'static str) -> Result<()> {
        if latent.dim() != self.config.latent_dim {
            return Err(DecisionError::DimensionMismatch {
                what,
                expected: self.config.latent_dim,
                actual: latent.dim(),
            });
        }
        if !latent.is_finite() {
            return Err(DecisionError::InvariantViolation(format!(
                "{what} contains non-finite values"
            )));
        }
        Ok(())
    }

    /// Fold new evidence into the previous latent.
    ///
    /// A missing visual embedding contributes a zero projection and lowers the confidence
    /// anchor. Degraded (stale) tactical features lower it as well.
    pub fn encode(
        &self,
        z_prev: &Latent,
        tactical: &TacticalFeatures,
        visual: Option<&[f32]>,
        self_features: &SelfFeatures,
    ) -> Result<Latent> {
        self.check_latent(z_prev, "previous latent")?;
        if let Some(embedding) = visual {
            if embedding.len() != self.config.visual_dim {
                return Err(DecisionError::DimensionMismatch {
                    what: "visual embedding",
                    expected: self.config.visual_dim,
                    actual: embedding.len(),
                });
            }
        }

        let tactical_vec = tactical.to_vector();
        let self_vec = self_features.to_vector();
        let visual_vec: &[f32] = visual.unwrap_or(&[]);

        let mut candidate = vec![0.0; self.config.latent_dim];
        for (slot, value) in candidate.iter_mut().zip(tactical_vec) {
            *slot = sanitize(value);
        }
        for (slot, value) in candidate[SELF_ANCHOR_OFFSET..].iter_mut().zip(self_vec) {
            *slot = sanitize(value);
        }

        let mut confidence = 1.0;
        if visual.is_none() {
            confidence *= self.config.missing_visual_confidence;
        }
        if tactical.degraded {
            confidence *= self.config.stale_confidence;
        }
        candidate[Anchor::Confidence.index()] = confidence;

        let hypothesis = &mut candidate[ANCHOR_DIM..];
        let sanitized_visual: Vec<f32> = visual_vec.iter().map(|v| sanitize(*v)).collect();
        self.tactical.accumulate(&tactical_vec, hypothesis);
        self.self_state.accumulate(&self_vec, hypothesis);
        self.visual.accumulate(&sanitized_visual, hypothesis);
        for (slot, prev) in hypothesis.iter_mut().zip(z_prev.hypothesis()) {
            *slot = (*slot + RECURRENT_WEIGHT * prev).tanh();
        }

        let next = self.blend(z_prev, &candidate, self.config.gate_bias);
        trace!(confidence, "encoded latent");
        Ok(next)
    }

    /// Project a latent into its four slices. Pure: identical latents give identical slices.
    pub fn decode(&self, latent: &Latent) -> DecodedState {
        let world = WorldSlice::from_latent(latent);
        let self_state = SelfSlice::from_latent(latent);
        let hypothesis = HypothesisSlice::from_latent(latent);
        let affect = AffectSlice::appraise(
            &world,
            &self_state,
            &hypothesis,
            latent.anchor(Anchor::Confidence),
        );
        DecodedState {
            world,
            self_state,
            affect,
            hypothesis,
        }
    }

    /// One-step lookahead: the latent expected after performing `action`.
    pub fn predict(&self, latent: &Latent, action: &Action) -> Result<Latent> {
        self.check_latent(latent, "latent")?;

        let encoding = action.encode();
        let intensity = encoding[ACTION_TYPE_COUNT + 1] * (0.5 + 0.5 * encoding[ACTION_TYPE_COUNT]);

        let mut candidate = latent.as_slice().to_vec();
        for delta in self.config.dynamics.deltas(action.action_type()) {
            let slot = &mut candidate[delta.anchor.index()];
            *slot = (*slot + intensity * delta.delta).clamp(-1.0, 1.0);
        }

        let hypothesis = &mut candidate[ANCHOR_DIM..];
        let mut drive = vec![0.0; hypothesis.len()];
        self.action.accumulate(&encoding, &mut drive);
        for (slot, push) in hypothesis.iter_mut().zip(drive) {
            *slot = (*slot + push).tanh();
        }

        Ok(self.blend(latent, &candidate, self.config.predict_gate_bias))
    }

    /// k-step lookahead on a copy of `latent`; element `i` is the state after `actions[..=i]`.
    pub fn rollout(&self, latent: &Latent, actions: &[Action]) -> Result<Vec<Latent>> {
        let mut states = Vec::with_capacity(actions.len());
        let mut current = latent.clone();
        for action in actions {
            current = self.predict(&current, action)?;
            states.push(current.clone());
        }
        Ok(states)
    }

    /// Distance between a prediction and the state actually encoded, scaled to 0.0 - 1.0.
    pub fn surprise(&self, predicted: &Latent, actual: &Latent) -> Result<f32> {
        self.check_latent(predicted, "predicted latent")?;
        self.check_latent(actual, "actual latent")?;
        let max_distance = 2.0 * (self.config.latent_dim as f32).sqrt();
        Ok(tactical_core::clip01(predicted.distance(actual) / max_distance))
    }

    fn blend(&self, prev: &Latent, candidate: &[f32], bias: f32) -> Latent {
        let mut next = prev.clone();
        for (z, c) in next.values_mut().iter_mut().zip(candidate) {
            let gate = sigmoid(bias + self.config.gate_gain * (c - *z).abs());
            *z = (1.0 - gate) * *z + gate * c;
        }
        next
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Replace non-finite evidence with zero and keep it within [-1, 1].
fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;

    fn fuser() -> MentalStateFuser {
        MentalStateFuser::with_defaults().unwrap()
    }

    fn threatening() -> TacticalFeatures {
        TacticalFeatures {
            threat_level: 0.8,
            num_enemies_total: 3,
            nearest_enemy_proximity: 0.75,
            player_health: 0.3,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_small_latent() {
        let config = FusionConfig {
            latent_dim: ANCHOR_DIM,
            ..Default::default()
        };
        assert!(MentalStateFuser::new(config).is_err());
    }

    #[test]
    fn test_encode_blends_rather_than_overwrites() {
        let fuser = fuser();
        let z0 = fuser.zero_latent();
        let visual = vec![0.1; fuser.config().visual_dim];
        let z1 = fuser
            .encode(&z0, &threatening(), Some(&visual), &SelfFeatures::default())
            .unwrap();

        let threat = z1.anchor(Anchor::Threat);
        assert!(threat > 0.0 && threat < 0.8);
        assert!(z1.hypothesis().iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_repeated_encode_converges() {
        let fuser = fuser();
        let features = threatening();
        let mut z = fuser.zero_latent();
        for _ in 0..12 {
            z = fuser
                .encode(&z, &features, None, &SelfFeatures::default())
                .unwrap();
        }
        assert!((z.anchor(Anchor::Threat) - 0.8).abs() < 0.01);
        assert!((z.anchor(Anchor::Confidence) - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_missing_visual_lowers_confidence() {
        let fuser = fuser();
        let z0 = fuser.zero_latent();
        let visual = vec![0.0; fuser.config().visual_dim];
        let features = TacticalFeatures::default();

        let with_visual = fuser
            .encode(&z0, &features, Some(&visual), &SelfFeatures::default())
            .unwrap();
        let without = fuser
            .encode(&z0, &features, None, &SelfFeatures::default())
            .unwrap();

        assert!(without.anchor(Anchor::Confidence) < with_visual.anchor(Anchor::Confidence));
    }

    #[test]
    fn test_visual_dimension_mismatch() {
        let fuser = fuser();
        let err = fuser
            .encode(
                &fuser.zero_latent(),
                &TacticalFeatures::default(),
                Some(&[0.0; 3]),
                &SelfFeatures::default(),
            )
            .unwrap_err();
        assert!(matches!(err, DecisionError::DimensionMismatch { expected: 32, actual: 3, .. }));
    }

    #[test]
    fn test_latent_dimension_mismatch_is_fatal() {
        let fuser = fuser();
        let err = fuser
            .predict(&Latent::zeros(7), &Action::new(ActionType::Wait))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_decode_is_pure() {
        let fuser = fuser();
        let z = fuser
            .encode(
                &fuser.zero_latent(),
                &threatening(),
                None,
                &SelfFeatures::default(),
            )
            .unwrap();
        assert_eq!(fuser.decode(&z), fuser.decode(&z));
    }

    #[test]
    fn test_predict_flee_lowers_threat() {
        let fuser = fuser();
        let mut z = fuser.zero_latent();
        for _ in 0..8 {
            z = fuser
                .encode(&z, &threatening(), None, &SelfFeatures::default())
                .unwrap();
        }
        let predicted = fuser.predict(&z, &Action::new(ActionType::Flee)).unwrap();
        assert!(predicted.anchor(Anchor::Threat) < z.anchor(Anchor::Threat));
    }

    #[test]
    fn test_predict_with_nan_magnitude_stays_finite() {
        let fuser = fuser();
        let z = fuser
            .encode(
                &fuser.zero_latent(),
                &threatening(),
                None,
                &SelfFeatures::default(),
            )
            .unwrap();
        let action = Action::new(ActionType::Explore).with_magnitude(f32::NAN);

        let predicted = fuser.predict(&z, &action).unwrap();
        assert!(predicted.is_finite());
        assert!(fuser.surprise(&predicted, &z).is_ok());
    }

    #[test]
    fn test_rollout_matches_chained_predict() {
        let fuser = fuser();
        let z = fuser
            .encode(
                &fuser.zero_latent(),
                &threatening(),
                None,
                &SelfFeatures::default(),
            )
            .unwrap();
        let a1 = Action::new(ActionType::TakeCover);
        let a2 = Action::new(ActionType::Attack).with_magnitude(0.5);

        let states = fuser.rollout(&z, &[a1.clone(), a2.clone()]).unwrap();
        let chained = fuser.predict(&fuser.predict(&z, &a1).unwrap(), &a2).unwrap();

        assert_eq!(states.len(), 2);
        assert_eq!(states[0], fuser.predict(&z, &a1).unwrap());
        assert_eq!(states[1], chained);
    }

    #[test]
    fn test_surprise_bounds() {
        let fuser = fuser();
        let z = fuser.zero_latent();
        assert_eq!(fuser.surprise(&z, &z).unwrap(), 0.0);

        let far = Latent::from_vec(vec![1.0; fuser.latent_dim()]);
        let opposite = Latent::from_vec(vec![-1.0; fuser.latent_dim()]);
        assert!((fuser.surprise(&far, &opposite).unwrap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_same_seed_same_projections() {
        let a = fuser();
        let b = fuser();
        let z = a
            .encode(&a.zero_latent(), &threatening(), None, &SelfFeatures::default())
            .unwrap();
        let w = b
            .encode(&b.zero_latent(), &threatening(), None, &SelfFeatures::default())
            .unwrap();
        assert_eq!(z, w);
    }
}
