//! Lookahead refinement of the best soft-scored candidates.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::Result;
use crate::mental_state::{Latent, MentalStateFuser};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub enabled: bool,
    /// How many of the best soft-scored candidates get a rollout.
    pub top_n: usize,
    /// Rollout length in steps.
    pub horizon: usize,
    /// Multiplier on the folded rollout value before it is added to the score.
    pub weight: f32,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_n: 3,
            horizon: 3,
            weight: 0.5,
        }
    }
}

/// Sum of `value - threat` over the decoded Affect slices of a k-step rollout that repeats
/// `action` for the whole horizon.
///
/// Works on a copy of `latent`.
pub fn rollout_value(
    fuser: &MentalStateFuser,
    latent: &Latent,
    action: &Action,
    horizon: usize,
) -> Result<f32> {
    let plan = vec![action.clone(); horizon];
    let states = fuser.rollout(latent, &plan)?;
    Ok(states
        .iter()
        .map(|state| {
            let affect = fuser.decode(state).affect;
            affect.value - affect.threat
        })
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::mental_state::SelfFeatures;
    use tactical_core::TacticalFeatures;

    #[test]
    fn test_rollout_value_does_not_touch_latent() {
        let fuser = MentalStateFuser::with_defaults().unwrap();
        let latent = fuser
            .encode(
                &fuser.zero_latent(),
                &TacticalFeatures {
                    threat_level: 0.9,
                    ..Default::default()
                },
                None,
                &SelfFeatures::default(),
            )
            .unwrap();
        let before = latent.clone();

        let value = rollout_value(&fuser, &latent, &Action::new(ActionType::Flee), 3).unwrap();
        assert!(value.is_finite());
        assert_eq!(latent, before);
    }

    #[test]
    fn test_fleeing_beats_exploring_under_threat() {
        let fuser = MentalStateFuser::with_defaults().unwrap();
        let mut latent = fuser.zero_latent();
        for _ in 0..6 {
            latent = fuser
                .encode(
                    &latent,
                    &TacticalFeatures {
                        threat_level: 0.9,
                        ..Default::default()
                    },
                    None,
                    &SelfFeatures::default(),
                )
                .unwrap();
        }

        let flee = rollout_value(&fuser, &latent, &Action::new(ActionType::Flee), 3).unwrap();
        let explore = rollout_value(&fuser, &latent, &Action::new(ActionType::Explore), 3).unwrap();
        assert!(flee > explore);
    }

    #[test]
    fn test_zero_horizon() {
        let fuser = MentalStateFuser::with_defaults().unwrap();
        let value =
            rollout_value(&fuser, &fuser.zero_latent(), &Action::new(ActionType::Wait), 0).unwrap();
        assert_eq!(value, 0.0);
    }
}
