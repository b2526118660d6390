use soroplan_core::Attempt;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

fn main() -> Result<(), Box<dyn Error>> {
    let path = std::env::args().nth(1);
    let reader: Box<dyn BufRead> = match path {
        Some(p) => Box::new(BufReader::new(File::open(p)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let (mut total, mut correct) = (0_usize, 0_usize);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let attempt: Attempt = serde_json::from_str(&line)?;
        total += 1;
        correct += usize::from(attempt.is_correct);

        let skills = if attempt.skills_exercised.is_empty() {
            "<no skills>".to_string()
        } else {
            attempt.skills_exercised.join("+")
        };
        println!(
            "{}\thelp={}\t{}ms\t{skills}",
            if attempt.is_correct { "ok" } else { "miss" },
            u8::from(attempt.help_level_used),
            attempt.response_time_ms
        );
    }

    println!("{correct}/{total} correct");
    Ok(())
}
