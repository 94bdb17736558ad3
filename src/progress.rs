use std::time::Duration;

use serde::Serialize;
use tracing::{info, trace};

use crate::ga::candidate::WeightVector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Evaluating,
    Advancing,
    Finalizing,
}

/// Structured progress event, emitted once per evaluated candidate and once
/// per generation boundary. Fire-and-forget; the optimizer never blocks on
/// the sink.
#[derive(Clone, Debug, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// Zero-based generation index
    pub generation: usize,
    pub total_generations: usize,
    /// Index of the candidate just evaluated, for `Evaluating` events
    pub candidate: Option<usize>,
    pub best_weights: Option<WeightVector>,
    pub best_fitness: f64,
    #[serde(skip)]
    pub eta: Option<Duration>,
}

pub trait ProgressSink {
    fn emit(&mut self, event: &ProgressEvent);
}

/// Logs generation boundaries at info level and per-candidate steps at trace.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn emit(&mut self, event: &ProgressEvent) {
        let eta = event
            .eta
            .map(format_eta)
            .unwrap_or_else(|| "...".to_string());
        match event.phase {
            Phase::Evaluating => {
                trace!(
                    "Gen {}/{} candidate {:?} best_fitness={}",
                    event.generation + 1,
                    event.total_generations,
                    event.candidate,
                    event.best_fitness,
                );
            }
            Phase::Advancing => {
                if let Some(best) = &event.best_weights {
                    info!(
                        "🧬 Gen {}/{} done. Best {} (fitness {}) ETA {}",
                        event.generation + 1,
                        event.total_generations,
                        best,
                        event.best_fitness,
                        eta,
                    );
                }
            }
            Phase::Finalizing => {
                if let Some(best) = &event.best_weights {
                    info!("🏁 Best weights {} (fitness {})", best, event.best_fitness);
                }
            }
        }
    }
}

/// Discards all events. For tests and headless baseline runs.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&mut self, _event: &ProgressEvent) {}
}

/// `H:MM:SS`, truncated to whole seconds.
pub fn format_eta(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
