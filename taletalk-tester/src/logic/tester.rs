use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::scenario::{ScenarioCtx, TestScenario};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

pub struct LogicTester {
    ctx: ScenarioCtx,
}

impl LogicTester {
    pub const fn new(ctx: ScenarioCtx) -> Self {
        Self { ctx }
    }

    pub fn run_scenario(&self, scenario: &TestScenario, iterations: usize) -> ScenarioResult {
        if self.ctx.verbose {
            println!(
                "🧪 Testing scenario: {} ({iterations} iteration(s))",
                scenario.name.bright_white()
            );
        }

        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::with_capacity(iterations);

        for i in 0..iterations {
            let start_time = Instant::now();
            let outcome = scenario.run(&self.ctx);
            performance_data.push(start_time.elapsed());

            match outcome {
                Ok(()) => {
                    successes += 1;
                    if self.ctx.verbose {
                        println!("  ✅ Iteration {}/{} passed", i + 1, iterations);
                    }
                }
                Err(err) => {
                    let message = format!("Iteration {}: {err:#}", i + 1);
                    log::error!("{}: {message}", scenario.name);
                    if self.ctx.verbose {
                        println!(
                            "  ❌ Iteration {}/{} failed: {}",
                            i + 1,
                            iterations,
                            format!("{err:#}").red()
                        );
                    }
                    failures.push(message);
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(u32::MAX)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|ms| Duration::from_millis(u64::try_from(ms).unwrap_or(0)))
            .collect())
    }
}
