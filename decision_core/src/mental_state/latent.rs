//! The latent vector and its anchored layout.

use serde::{Deserialize, Serialize};
use tactical_core::TACTICAL_FEATURE_DIM;

use super::features::SELF_FEATURE_DIM;

/// Named latent dimensions carrying interpretable quantities.
///
/// The first block mirrors the tactical feature vector, the second the self-feature vector,
/// followed by a confidence scalar. Dimensions past [`ANCHOR_DIM`] form the free hypothesis
/// region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Threat,
    EnemyPressure,
    EnemiesInLos,
    NearestEnemyProximity,
    CoverAvailable,
    CoverQuality,
    EscapeX,
    EscapeY,
    StealthSafety,
    LootOpportunity,
    AllyDanger,
    PlayerHealth,
    Health,
    Stamina,
    Magicka,
    InCombat,
    Sneaking,
    WeaponDrawn,
    Confidence,
}

/// Index of the first self-state anchor.
pub(crate) const SELF_ANCHOR_OFFSET: usize = TACTICAL_FEATURE_DIM;

/// Number of anchored dimensions at the start of every latent.
pub const ANCHOR_DIM: usize = TACTICAL_FEATURE_DIM + SELF_FEATURE_DIM + 1;

impl Anchor {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Fixed-length latent vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Latent(Vec<f32>);

impl Latent {
    /// The zero state of the given length.
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    pub fn from_vec(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// Value of an anchored dimension, 0.0 if the latent is too short to hold it.
    pub fn anchor(&self, anchor: Anchor) -> f32 {
        self.0.get(anchor.index()).copied().unwrap_or(0.0)
    }

    /// The free dimensions after the anchors.
    pub fn hypothesis(&self) -> &[f32] {
        self.0.get(ANCHOR_DIM..).unwrap_or(&[])
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Euclidean distance to another latent of the same length.
    pub(crate) fn distance(&self, other: &Latent) -> f32 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f32] {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_layout() {
        assert_eq!(Anchor::Threat.index(), 0);
        assert_eq!(Anchor::PlayerHealth.index(), TACTICAL_FEATURE_DIM - 1);
        assert_eq!(Anchor::Health.index(), SELF_ANCHOR_OFFSET);
        assert_eq!(Anchor::Confidence.index(), ANCHOR_DIM - 1);
    }

    #[test]
    fn test_hypothesis_region() {
        let latent = Latent::zeros(ANCHOR_DIM + 5);
        assert_eq!(latent.hypothesis().len(), 5);
        assert!(latent.is_zero());

        let short = Latent::zeros(3);
        assert!(short.hypothesis().is_empty());
        assert_eq!(short.anchor(Anchor::Confidence), 0.0);
    }

    #[test]
    fn test_distance() {
        let a = Latent::from_vec(vec![0.0, 0.0]);
        let b = Latent::from_vec(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }
}
