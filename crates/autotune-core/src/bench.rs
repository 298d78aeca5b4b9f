//! Benchmark metric extraction from bench step output.
//!
//! Stdout is scanned bottom-up. The first hit wins, in priority order:
//!
//! 1. a JSON object line with a numeric `value`
//!    (`{"metric":"p50","value":12.5,"unit":"ms"}`)
//! 2. a `<name>: <number> <unit>` line with a recognised unit
//! 3. the step's own wall-clock duration, as `wall_time_ms`

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{BenchResult, StepResult};

/// Metric name used when the bench output carries no parseable metric.
pub const WALL_TIME_METRIC: &str = "wall_time_ms";

static METRIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<name>[A-Za-z_][\w .\-/]*?)\s*[:=]\s*(?P<value>[-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)\s*(?P<unit>ns|us|µs|ms|s|ops/s)\s*$",
    )
    .expect("metric line pattern is valid")
});

/// Extract a [`BenchResult`] from a finished bench step.
pub fn extract_bench(step: &StepResult) -> BenchResult {
    let lines: Vec<&str> = step.stdout.lines().collect();

    if let Some(bench) = lines.iter().rev().find_map(|line| from_json_line(line)) {
        return bench;
    }
    if let Some(bench) = lines.iter().rev().find_map(|line| from_metric_line(line)) {
        return bench;
    }
    BenchResult {
        metric: WALL_TIME_METRIC.to_string(),
        value: step.duration_ms as f64,
        unit: Some("ms".to_string()),
        lower_is_better: true,
    }
}

fn from_json_line(line: &str) -> Option<BenchResult> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let object = value.as_object()?;
    let number = object.get("value")?.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    let unit = object
        .get("unit")
        .and_then(|u| u.as_str())
        .map(str::to_string);
    let lower_is_better = object
        .get("lower_is_better")
        .and_then(|v| v.as_bool())
        .unwrap_or_else(|| !unit.as_deref().is_some_and(is_throughput));
    Some(BenchResult {
        metric: object
            .get("metric")
            .and_then(|m| m.as_str())
            .unwrap_or("value")
            .to_string(),
        value: number,
        unit,
        lower_is_better,
    })
}

fn from_metric_line(line: &str) -> Option<BenchResult> {
    let caps = METRIC_LINE.captures(line)?;
    let value: f64 = caps.name("value")?.as_str().parse().ok()?;
    let unit = caps.name("unit")?.as_str();
    Some(BenchResult {
        metric: caps.name("name")?.as_str().trim().to_string(),
        value,
        unit: Some(unit.to_string()),
        lower_is_better: !is_throughput(unit),
    })
}

fn is_throughput(unit: &str) -> bool {
    unit.ends_with("/s")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench_step(stdout: &str, duration_ms: u64) -> StepResult {
        StepResult {
            step: "bench".to_string(),
            command: "npm run bench".to_string(),
            exit_code: 0,
            duration_ms,
            stdout: stdout.to_string(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    #[test]
    fn test_last_json_line_wins() {
        let out = "warming up\n{\"metric\":\"p50\",\"value\":20,\"unit\":\"ms\"}\n{\"metric\":\"p50\",\"value\":12.5,\"unit\":\"ms\"}\ndone\n";
        let b = extract_bench(&bench_step(out, 900));
        assert_eq!(b.metric, "p50");
        assert_eq!(b.value, 12.5);
        assert_eq!(b.unit.as_deref(), Some("ms"));
        assert!(b.lower_is_better);
    }

    #[test]
    fn test_json_preferred_over_metric_line() {
        let out = "{\"value\":3}\nlatency: 4.2 ms\n";
        let b = extract_bench(&bench_step(out, 900));
        assert_eq!(b.metric, "value");
        assert_eq!(b.value, 3.0);
    }

    #[test]
    fn test_metric_line() {
        let out = "Running suite\nparse time: 4.2 ms\nthroughput: 1500 ops/s\n";
        let b = extract_bench(&bench_step(out, 900));
        assert_eq!(b.metric, "throughput");
        assert_eq!(b.value, 1500.0);
        assert!(!b.lower_is_better);
    }

    #[test]
    fn test_unrecognised_unit_falls_back_to_wall_time() {
        let out = "items: 42 widgets\n{\"value\":\"fast\"}\n";
        let b = extract_bench(&bench_step(out, 1234));
        assert_eq!(b.metric, WALL_TIME_METRIC);
        assert_eq!(b.value, 1234.0);
        assert!(b.lower_is_better);
    }

    #[test]
    fn test_explicit_direction_in_json() {
        let b = extract_bench(&bench_step("{\"metric\":\"rps\",\"value\":10,\"lower_is_better\":false}", 1));
        assert!(!b.lower_is_better);
    }
}
