//! Single-step BKT updates.

use soroplan_core::{clamp_p_known, SkillBktParams};

/// P(known | observed correct).
#[must_use]
pub fn posterior_correct(p: f64, params: &SkillBktParams) -> f64 {
    let known = p * (1.0 - params.slip_prob);
    let guessed = (1.0 - p) * params.guess_prob;
    let evidence = known + guessed;
    if evidence <= 0.0 {
        return clamp_p_known(p);
    }
    clamp_p_known(known / evidence)
}

/// P(known | observed incorrect).
#[must_use]
pub fn posterior_incorrect(p: f64, params: &SkillBktParams) -> f64 {
    let slipped = p * params.slip_prob;
    let missed = (1.0 - p) * (1.0 - params.guess_prob);
    let evidence = slipped + missed;
    if evidence <= 0.0 {
        return clamp_p_known(p);
    }
    clamp_p_known(slipped / evidence)
}

/// Moves `p` toward `target` by `strength` (0 = no change, 1 = full update).
#[must_use]
pub fn partial_update(p: f64, target: f64, strength: f64) -> f64 {
    clamp_p_known(p + strength.clamp(0.0, 1.0) * (target - p))
}

/// Unknown → known transition after an exercised opportunity.
#[must_use]
pub fn learn_transition(p: f64, params: &SkillBktParams) -> f64 {
    clamp_p_known(p + (1.0 - p) * params.learn_prob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_answers_raise_and_wrong_answers_lower_p_known() {
        let params = SkillBktParams::default();
        assert!(posterior_correct(0.5, &params) > 0.5);
        assert!(posterior_incorrect(0.5, &params) < 0.5);
    }

    #[test]
    fn posterior_matches_closed_form() {
        let params = SkillBktParams::default();
        // 0.95 * 0.1 / (0.95 * 0.1 + 0.05 * 0.8)
        assert!((posterior_incorrect(0.95, &params) - 0.095 / 0.135).abs() < 1e-12);
        // 0.5 * 0.9 / (0.5 * 0.9 + 0.5 * 0.2)
        assert!((posterior_correct(0.5, &params) - 0.45 / 0.55).abs() < 1e-12);
    }

    #[test]
    fn partial_update_zero_strength_is_identity() {
        assert!((partial_update(0.7, 0.1, 0.0) - 0.7).abs() < 1e-12);
        assert!((partial_update(0.7, 0.1, 1.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn learning_never_reaches_certainty() {
        let params = SkillBktParams {
            learn_prob: 1.0,
            ..SkillBktParams::default()
        };
        assert!(learn_transition(0.9, &params) < 1.0);
    }
}
