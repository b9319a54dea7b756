//! Personality-driven selection scenarios and policy invariants.

use decision_core::{
    Action, ActionScorer, ActionTag, ActionType, ConstraintKind, ConstraintProfile, DecodedState,
    Goal, GoalKind, Latent, MentalStateFuser, Person, ScoreOutcome, SelfFeatures, TraitKind,
    TraitProfile, ValueKind, ValueProfile, VetoReason,
};
use proptest::prelude::*;
use tactical_core::{
    Entity, EntityTracker, NpcState, ObjectState, Position, Snapshot, TacticalFeatureComputer,
    TacticalFeatures,
};

/// Encode the same evidence until the latent settles, then decode.
fn settle(
    fuser: &MentalStateFuser,
    features: &TacticalFeatures,
    self_features: &SelfFeatures,
) -> DecodedState {
    let mut latent = fuser.zero_latent();
    for _ in 0..12 {
        latent = fuser.encode(&latent, features, None, self_features).unwrap();
    }
    fuser.decode(&latent)
}

fn features_for(snapshot: Snapshot) -> TacticalFeatures {
    let mut tracker = EntityTracker::with_defaults();
    tracker.ingest(&snapshot).unwrap();
    TacticalFeatureComputer::with_defaults().compute_from_tracker(&tracker, snapshot.timestamp)
}

#[test]
fn test_scenario_b_greedy_aggressor_attacks() {
    let features = features_for(
        Snapshot::new(1.0, "player", Position::default(), 0.0, 1.0)
            .with_entity(Entity::npc(
                "wolf",
                Position::planar(18.0, 0.0),
                NpcState::enemy(1.0),
            ))
            .with_entity(Entity::object(
                "chest",
                Position::planar(3.0, 0.0),
                ObjectState::loot(0.8),
            )),
    );
    assert!(features.threat_level < 0.3);
    assert!(features.loot_opportunity_available);

    let fuser = MentalStateFuser::with_defaults().unwrap();
    let state = settle(&fuser, &features, &SelfFeatures::default());
    assert!(state.world.threat_level < 0.3);

    let person = Person::new("Raider", "player")
        .with_traits(TraitProfile::default().with(TraitKind::Aggression, 0.8))
        .with_values(ValueProfile::default().with(ValueKind::GreedForLoot, 0.9));
    let scorer = ActionScorer::with_defaults();

    let attack = scorer
        .score(&person, &state, &Action::new(ActionType::Attack))
        .score()
        .unwrap();
    let flee = scorer
        .score(&person, &state, &Action::new(ActionType::Flee))
        .score()
        .unwrap();
    assert!(attack > flee, "attack {attack} should beat flee {flee}");

    let selection = scorer.select(
        &person,
        &state,
        &[Action::new(ActionType::Attack), Action::new(ActionType::Flee)],
    );
    assert_eq!(selection.action.action_type(), ActionType::Attack);
}

#[test]
fn test_scenario_c_protector_blocks() {
    let features = features_for(
        Snapshot::new(1.0, "player", Position::default(), 0.0, 0.4)
            .with_entity(Entity::npc(
                "draugr_1",
                Position::planar(4.0, 0.0),
                NpcState::enemy(1.0).with_los(true),
            ))
            .with_entity(Entity::npc(
                "draugr_2",
                Position::planar(6.0, 0.0),
                NpcState::enemy(1.0).with_los(true),
            ))
            .with_entity(Entity::npc(
                "draugr_3",
                Position::planar(0.0, 8.0),
                NpcState::enemy(1.0),
            ))
            .with_entity(Entity::npc(
                "lydia",
                Position::planar(-1.0, 0.0),
                NpcState::ally(0.15),
            )),
    );
    assert!(features.threat_level > 0.6);
    assert!(features.ally_danger() > 0.5);

    let fuser = MentalStateFuser::with_defaults().unwrap();
    let state = settle(&fuser, &features, &SelfFeatures::default());

    let person = Person::new("Guardian", "player")
        .with_values(ValueProfile::default().with(ValueKind::ProtectAllies, 0.9))
        .with_goal(
            Goal::new(GoalKind::KeepAllyAlive, 0.9)
                .with_description("keep Lydia alive")
                .with_target("lydia"),
        )
        .with_constraints(
            ConstraintProfile::default().with(ConstraintKind::RiskSelfSacrifice, true),
        );
    let scorer = ActionScorer::with_defaults();
    let candidates = [
        Action::new(ActionType::Attack),
        Action::new(ActionType::BlockForPlayer),
        Action::new(ActionType::Flee),
    ];

    let selection = scorer.select(&person, &state, &candidates);
    assert_eq!(selection.action.action_type(), ActionType::BlockForPlayer);
    assert!(!selection.fallback_used);

    let block = selection.evaluations[1].outcome.score().unwrap();
    for (i, evaluation) in selection.evaluations.iter().enumerate() {
        if i != 1 {
            assert!(evaluation.outcome.score().unwrap() < block);
        }
    }
}

#[test]
fn test_scenario_c_without_permission_vetoes_block() {
    let fuser = MentalStateFuser::with_defaults().unwrap();
    let state = fuser.decode(&fuser.zero_latent());
    let person = Person::new("Guardian", "player")
        .with_values(ValueProfile::default().with(ValueKind::ProtectAllies, 0.9))
        .with_goal(Goal::new(GoalKind::KeepAllyAlive, 0.9));

    let outcome = ActionScorer::with_defaults().score(
        &person,
        &state,
        &Action::new(ActionType::BlockForPlayer),
    );
    assert_eq!(
        outcome,
        ScoreOutcome::Vetoed(VetoReason::ConstraintViolated(
            ConstraintKind::RiskSelfSacrifice
        ))
    );
}

fn unit() -> impl Strategy<Value = f32> {
    0.0f32..=1.0
}

fn action_type() -> impl Strategy<Value = ActionType> {
    prop::sample::select(ActionType::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_forbidden_actions_always_vetoed(
        traits in prop::array::uniform7(unit()),
        values in prop::array::uniform5(unit()),
        action_type in action_type(),
        latent in prop::collection::vec(-1.0f32..=1.0, 64),
    ) {
        let trait_profile = TraitProfile {
            aggression: traits[0],
            caution: traits[1],
            curiosity: traits[2],
            loyalty: traits[3],
            bravery: traits[4],
            sociability: traits[5],
            impulsivity: traits[6],
        };
        let value_profile = ValueProfile {
            protect_allies: values[0],
            greed_for_loot: values[1],
            self_preservation: values[2],
            honor: values[3],
            exploration: values[4],
        };
        let person = Person::new("Anyone", "player")
            .with_traits(trait_profile)
            .with_values(value_profile)
            .with_goal(Goal::new(GoalKind::DefeatEnemies, 1.0));

        let fuser = MentalStateFuser::with_defaults().unwrap();
        let state = fuser.decode(&Latent::from_vec(latent));
        let action = Action::new(action_type).with_tag(ActionTag::HarmsCivilian);

        prop_assert!(ActionScorer::with_defaults().score(&person, &state, &action).is_vetoed());
    }

    #[test]
    fn prop_decode_is_pure(latent in prop::collection::vec(-1.0f32..=1.0, 64)) {
        let fuser = MentalStateFuser::with_defaults().unwrap();
        let latent = Latent::from_vec(latent);
        prop_assert_eq!(fuser.decode(&latent), fuser.decode(&latent));
    }

    #[test]
    fn prop_rollout_composes(
        latent in prop::collection::vec(-1.0f32..=1.0, 64),
        first in action_type(),
        second in action_type(),
        magnitude in unit(),
    ) {
        let fuser = MentalStateFuser::with_defaults().unwrap();
        let z = Latent::from_vec(latent);
        let a1 = Action::new(first);
        let a2 = Action::new(second).with_magnitude(magnitude);

        let states = fuser.rollout(&z, &[a1.clone(), a2.clone()]).unwrap();
        let step1 = fuser.predict(&z, &a1).unwrap();
        let step2 = fuser.predict(&step1, &a2).unwrap();

        prop_assert_eq!(&states[0], &step1);
        prop_assert_eq!(&states[1], &step2);
    }

    #[test]
    fn prop_encode_stays_bounded(
        threat in unit(),
        health in unit(),
        visual in prop::collection::vec(-10.0f32..=10.0, 32),
    ) {
        let fuser = MentalStateFuser::with_defaults().unwrap();
        let features = TacticalFeatures {
            threat_level: threat,
            player_health: health,
            ..Default::default()
        };
        let mut latent = fuser.zero_latent();
        for _ in 0..3 {
            latent = fuser
                .encode(&latent, &features, Some(&visual), &SelfFeatures::default())
                .unwrap();
        }
        prop_assert!(latent.as_slice().iter().all(|v| v.abs() <= 1.0));
    }
}
