#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use soroplan_core::{PartKind, PlanWarning, ProblemGenerationMode, SkillMastery};
use soroplan_scheduler::{PartShare, PlanRequest, PlannerConfig, SessionPlanner};
use time::OffsetDateTime;

fn arb_mode() -> impl Strategy<Value = ProblemGenerationMode> {
    prop_oneof![
        Just(ProblemGenerationMode::Classic),
        Just(ProblemGenerationMode::Adaptive),
        Just(ProblemGenerationMode::AdaptiveBkt),
    ]
}

fn arb_mastery(index: usize) -> impl Strategy<Value = SkillMastery> {
    (0.001_f64..0.999, 0_u32..60).prop_map(move |(p_known, opportunities)| {
        let n = f64::from(opportunities);
        SkillMastery {
            skill_id: format!("skill-{index}"),
            p_known,
            confidence: n / (n + 5.0),
            opportunities,
            successes: opportunities / 2,
        }
    })
}

fn arb_masteries() -> impl Strategy<Value = Vec<SkillMastery>> {
    (1_usize..8).prop_flat_map(|count| (0..count).map(arb_mastery).collect::<Vec<_>>())
}

/// Either the default three parts or a single part with a partial share.
fn arb_part_shares() -> impl Strategy<Value = Vec<PartShare>> {
    prop_oneof![
        Just(PlannerConfig::default().part_shares),
        (0.05_f64..=1.0).prop_map(|share| vec![PartShare {
            kind: PartKind::Abacus,
            share,
        }]),
    ]
}

fn arb_config() -> impl Strategy<Value = PlannerConfig> {
    (0.2_f64..2.0, 0.0_f64..1.0, 0.0_f64..0.6, arb_part_shares()).prop_map(
        |(base, pairing_rate, surcharge, part_shares)| PlannerConfig {
            base_minutes_per_problem: base,
            pairing_rate,
            multi_skill_surcharge: surcharge,
            part_shares,
            ..PlannerConfig::default()
        },
    )
}

proptest! {
    #[test]
    fn plans_never_exceed_duration(
        config in arb_config(),
        masteries in arb_masteries(),
        duration in 0_u32..45,
        mode in arb_mode(),
        seed in any::<u64>(),
    ) {
        let planner = SessionPlanner::new(config).unwrap();
        let request = PlanRequest { player_id: "p".into(), duration_minutes: duration, mode };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let plan = planner.plan(&request, &masteries, OffsetDateTime::UNIX_EPOCH, &mut rng);

        let total: f64 = plan.slots().map(|s| s.estimated_cost_minutes).sum();
        prop_assert!(total <= f64::from(duration) + 1e-9, "total {} > {}", total, duration);
        prop_assert!((total - plan.estimated_minutes).abs() < 1e-9);
        for slot in plan.slots() {
            prop_assert!(slot.estimated_cost_minutes > 0.0);
            prop_assert!(!slot.skills_targeted.is_empty() && slot.skills_targeted.len() <= 2);
        }
    }

    #[test]
    fn empty_plans_always_explain_themselves(
        config in arb_config(),
        masteries in arb_masteries(),
        duration in 0_u32..4,
        mode in arb_mode(),
        seed in any::<u64>(),
    ) {
        let planner = SessionPlanner::new(config).unwrap();
        let request = PlanRequest { player_id: "p".into(), duration_minutes: duration, mode };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let plan = planner.plan(&request, &masteries, OffsetDateTime::UNIX_EPOCH, &mut rng);

        let exhausted = plan
            .warnings
            .iter()
            .any(|w| matches!(w, PlanWarning::BudgetExhausted { .. }));
        prop_assert_eq!(plan.slot_count() == 0, exhausted);
    }
}

#[test]
fn adaptive_modes_surface_weak_skills() {
    let planner = SessionPlanner::new(PlannerConfig::default()).unwrap();
    let mut masteries: Vec<SkillMastery> = (0..4)
        .map(|i| SkillMastery {
            skill_id: format!("strong-{i}"),
            p_known: 0.95,
            confidence: 0.85,
            opportunities: 30,
            successes: 29,
        })
        .collect();
    masteries.push(SkillMastery {
        skill_id: "weak".into(),
        p_known: 0.1,
        confidence: 0.85,
        opportunities: 30,
        successes: 4,
    });

    let share_of_weak = |mode: ProblemGenerationMode| {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let (mut weak, mut total) = (0_usize, 0_usize);
        for _ in 0..40 {
            let request = PlanRequest { player_id: "p".into(), duration_minutes: 10, mode };
            let plan = planner.plan(&request, &masteries, OffsetDateTime::UNIX_EPOCH, &mut rng);
            for slot in plan.slots() {
                total += 1;
                weak += usize::from(slot.skills_targeted.iter().any(|s| s == "weak"));
            }
        }
        weak as f64 / total as f64
    };

    let uniform = 1.0 / masteries.len() as f64;
    let classic = share_of_weak(ProblemGenerationMode::Classic);
    let adaptive = share_of_weak(ProblemGenerationMode::Adaptive);
    let bkt = share_of_weak(ProblemGenerationMode::AdaptiveBkt);
    assert!(adaptive / uniform > 1.0 && adaptive > classic, "adaptive {adaptive} classic {classic}");
    assert!(bkt / uniform > 1.0 && bkt > classic, "bkt {bkt} classic {classic}");
}
