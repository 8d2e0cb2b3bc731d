use crate::orchestrator::FlowTracer;
use flowtrace_core::{FileTraceMemory, FlowPair, FlowResult, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const RESULTS_FILE_NAME: &str = "data_flow_results.json";

/// Read the flow pairs emitted by the upstream selector.
pub fn load_pairs(path: &Path) -> Result<Vec<FlowPair>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Runs flows one after another, each with its own memory files under the
/// result directory, and collects their results.
pub struct BatchRunner {
    tracer: FlowTracer,
    result_dir: PathBuf,
    max_flows: usize,
}

impl BatchRunner {
    pub fn new(tracer: FlowTracer, result_dir: impl Into<PathBuf>, max_flows: usize) -> Self {
        Self {
            tracer,
            result_dir: result_dir.into(),
            max_flows,
        }
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// Trace at most `max_flows` pairs in order. A flow whose memory cannot be
    /// read or written is logged and left out; the batch continues.
    pub async fn run(&self, pairs: &[FlowPair]) -> Result<Vec<FlowResult>> {
        std::fs::create_dir_all(&self.result_dir)?;

        let selected = &pairs[..pairs.len().min(self.max_flows)];
        info!(
            "Tracing {} of {} flow pairs (max_flows={})",
            selected.len(),
            pairs.len(),
            self.max_flows
        );

        let mut results = Vec::with_capacity(selected.len());
        for pair in selected {
            info!(
                "Flow {} [{}]: {} -> {}",
                pair.flow_id, pair.category, pair.start, pair.end
            );

            let memory = FileTraceMemory::new(&self.result_dir, pair.flow_id);
            let outcome = self.tracer.trace(pair, &memory).await;

            if let Err(e) = memory.cleanup() {
                warn!("Failed to remove memory files of flow {}: {}", pair.flow_id, e);
            }

            match outcome {
                Ok(outcome) => results.push(FlowResult {
                    flow_id: pair.flow_id,
                    category: pair.category.clone(),
                    target_var: pair.target_var.clone(),
                    start: pair.start.location(),
                    end: pair.end.location(),
                    steps: outcome.steps,
                    termination: outcome.termination,
                }),
                Err(e) => error!("Flow {} aborted: {}", pair.flow_id, e),
            }
        }

        Ok(results)
    }

    /// Write results as pretty JSON to `data_flow_results.json`.
    pub fn write_results(&self, results: &[FlowResult]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.result_dir)?;
        let path = self.result_dir.join(RESULTS_FILE_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(results)?)?;
        info!("Flow results saved: {}", path.display());
        Ok(path)
    }
}
