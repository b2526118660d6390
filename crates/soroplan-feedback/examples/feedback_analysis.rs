//! Compares the three scheduling modes on a simulated learner.
//!
//! Run with: cargo run -p soroplan-feedback --example feedback_analysis [seed]

use soroplan_feedback::simulation::{run, SimulationConfig};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let seed = std::env::args()
        .nth(1)
        .map(|s| s.parse::<u64>())
        .transpose()?
        .unwrap_or(7);
    let config = SimulationConfig {
        seed,
        ..SimulationConfig::default()
    };

    println!(
        "Simulating {} sessions of {} min, weak skills: {:?}\n",
        config.sessions,
        config.duration_minutes,
        config.weak_skills()
    );
    let report = run(&config)?;

    for mode in &report.modes {
        println!(
            "{:<13} surfacing {:>5.2}  accuracy {:>5.1}%  slots {}",
            mode.mode.as_str(),
            mode.surfacing.ratio,
            mode.outcomes.success_rate() * 100.0,
            mode.surfacing.slots
        );
    }
    Ok(())
}
