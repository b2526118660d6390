//! Invariants of both blame strategies over arbitrary failed attempts.

use proptest::prelude::*;
use soroplan_bkt::{attribute, BlameMethod, SkillEvidence};
use soroplan_core::SkillBktParams;

fn arb_p() -> impl Strategy<Value = f64> {
    (1u32..=999u32).prop_map(|v| f64::from(v) / 1000.0)
}

fn arb_params() -> impl Strategy<Value = SkillBktParams> {
    (arb_p(), 0.0f64..0.45, 0.0f64..0.45, 0.0f64..0.5).prop_map(
        |(prior_known, guess_prob, slip_prob, learn_prob)| SkillBktParams {
            prior_known,
            guess_prob,
            slip_prob,
            learn_prob,
        },
    )
}

fn arb_skills() -> impl Strategy<Value = Vec<SkillEvidence>> {
    prop::collection::vec((arb_p(), arb_params()), 1..=6).prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (p_known, params))| SkillEvidence {
                skill_id: format!("skill.{i}"),
                p_known,
                params,
            })
            .collect()
    })
}

fn arb_method() -> impl Strategy<Value = BlameMethod> {
    prop_oneof![Just(BlameMethod::Heuristic), Just(BlameMethod::Bayesian)]
}

proptest! {
    #[test]
    fn weights_sum_to_one(skills in arb_skills(), method in arb_method()) {
        let results = attribute(&skills, method);
        prop_assert_eq!(results.len(), skills.len());
        let total: f64 = results.iter().map(|r| r.blame_weight).sum();
        prop_assert!((total - 1.0).abs() < 1e-9, "sum was {}", total);
        for r in &results {
            prop_assert!((0.0..=1.0).contains(&r.blame_weight));
            prop_assert!(r.updated_p_known > 0.0 && r.updated_p_known < 1.0);
        }
    }

    #[test]
    fn weights_ignore_input_order(skills in arb_skills(), method in arb_method()) {
        let forward = attribute(&skills, method);
        let mut reversed_input = skills.clone();
        reversed_input.reverse();
        let reversed = attribute(&reversed_input, method);
        for r in &forward {
            let twin = reversed
                .iter()
                .find(|o| o.skill_id == r.skill_id)
                .map(|o| o.blame_weight)
                .unwrap_or(f64::NAN);
            prop_assert!((r.blame_weight - twin).abs() < 1e-9);
        }
    }

    #[test]
    fn equal_beliefs_split_evenly(p in arb_p(), n in 1usize..=5, method in arb_method()) {
        let skills: Vec<SkillEvidence> = (0..n)
            .map(|i| SkillEvidence {
                skill_id: format!("skill.{i}"),
                p_known: p,
                params: SkillBktParams::default(),
            })
            .collect();
        let expected = 1.0 / n as f64;
        for r in attribute(&skills, method) {
            prop_assert!((r.blame_weight - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn blame_never_raises_p_known(skills in arb_skills(), method in arb_method()) {
        for (r, s) in attribute(&skills, method).iter().zip(&skills) {
            prop_assert!(r.updated_p_known <= s.p_known + 1e-12);
        }
    }
}
