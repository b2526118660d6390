//! Plans one draft session from mastery estimates read on stdin.
//!
//! ```text
//! echo '[{"skill_id":"a","p_known":0.2,"confidence":0.6,"opportunities":8,"successes":3}]' \
//!     | cargo run -p soroplan-scheduler --example plan_session -- adaptive-bkt 10
//! ```

use std::io::{self, Read};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use soroplan_core::{ProblemGenerationMode, SkillMastery};
use soroplan_scheduler::{PlanRequest, PlannerConfig, SessionPlanner};
use time::OffsetDateTime;

fn default_masteries() -> Vec<SkillMastery> {
    [
        ("basic.directAddition", 0.95, 30),
        ("fiveComplements.4=5-1", 0.6, 10),
        ("tenComplements.1=10-9", 0.05, 4),
    ]
    .into_iter()
    .map(|(id, p_known, opportunities)| SkillMastery {
        skill_id: id.to_string(),
        p_known,
        confidence: f64::from(opportunities) / (f64::from(opportunities) + 5.0),
        opportunities,
        successes: opportunities / 2,
    })
    .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let mode: ProblemGenerationMode = args.next().as_deref().unwrap_or("adaptive-bkt").parse()?;
    let duration_minutes: u32 = args.next().as_deref().unwrap_or("10").parse()?;

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let masteries: Vec<SkillMastery> = if input.trim().is_empty() {
        default_masteries()
    } else {
        serde_json::from_str(&input)?
    };

    let planner = SessionPlanner::new(PlannerConfig::default())?;
    let request = PlanRequest {
        player_id: "example".into(),
        duration_minutes,
        mode,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let plan = planner.plan(&request, &masteries, OffsetDateTime::now_utc(), &mut rng);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
