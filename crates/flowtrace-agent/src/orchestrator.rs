use crate::prompts;
use crate::reply::{parse_reply, ParsedReply};
use flowtrace_ai::LLMProvider;
use flowtrace_core::{
    FlowPair, FlowStep, FlowTraceError, Result, TerminationReason, TraceConfig, TraceMemory,
};
use flowtrace_parser::{FunctionLocator, BUILD_SENTINEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Result of one trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceOutcome {
    pub flow_id: u32,
    /// Steps as persisted in memory when the loop ended
    pub steps: Vec<FlowStep>,
    /// Rounds entered, including the seed round
    pub rounds_used: usize,
    pub inference_calls: usize,
    pub termination: TerminationReason,
    /// Message of the inference failure that aborted the trace
    pub service_error: Option<String>,
}

impl TraceOutcome {
    /// True when a recorded step matched the end anchor. Every other
    /// termination is inconclusive, not a failure.
    pub fn reached_end(&self) -> bool {
        self.termination == TerminationReason::EndReached
    }
}

/// Round-bounded flow tracer.
///
/// Round 1 seeds both memory slots and primes the corpus with the UI-building
/// callbacks next to the start file. Every later round rebuilds the prompt from
/// memory, makes one inference call and dispatches on the classified reply.
pub struct FlowTracer {
    llm: Arc<dyn LLMProvider>,
    locator: Arc<dyn FunctionLocator>,
    config: TraceConfig,
}

impl FlowTracer {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        locator: Arc<dyn FunctionLocator>,
        config: TraceConfig,
    ) -> Self {
        Self {
            llm,
            locator,
            config,
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    #[instrument(skip(self, pair, memory), fields(flow_id = pair.flow_id))]
    pub async fn trace(&self, pair: &FlowPair, memory: &dyn TraceMemory) -> Result<TraceOutcome> {
        let start_time = Instant::now();
        let max_rounds = self.config.max_rounds;
        info!(
            "Starting trace: profile={}, max_rounds={}, model={}",
            self.config.profile_name,
            max_rounds,
            self.llm.model_name()
        );
        info!("   start: {}", pair.start);
        info!("   end:   {}", pair.end);

        let system = prompts::system_prompt(&self.config.vocabulary);
        let question = prompts::question(pair);

        let mut rounds_used = 0;
        let mut inference_calls = 0;
        let mut termination = TerminationReason::BudgetExhausted;
        let mut service_error = None;

        for round in 1..=max_rounds {
            rounds_used = round;

            if round == 1 {
                self.seed(pair, memory)?;
                continue;
            }

            debug!("Round {}/{}", round, max_rounds);

            let steps_text = memory.read_steps()?;
            let impls = memory.read_impls()?;
            let user = prompts::user_message(&question, &steps_text, &impls);

            inference_calls += 1;
            let reply = match self
                .llm
                .complete(&system, &user, self.config.temperature)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Inference call failed in round {}: {}", round, e);
                    termination = TerminationReason::ServiceFailed;
                    service_error = Some(e.to_string());
                    break;
                }
            };

            match parse_reply(&reply, &self.config.vocabulary) {
                ParsedReply::Malformed(reason) => {
                    warn!("Ignoring reply in round {}: {}", round, reason);
                }
                ParsedReply::FunctionRequest { func_name, reason } => {
                    info!(
                        function = %func_name,
                        reason = reason.as_deref().unwrap_or(""),
                        "Looking up function"
                    );
                    let located = self.locator.locate(&func_name, None);
                    if located.is_empty() {
                        debug!("No declaration found for '{}'", func_name);
                    }
                    // Appended as-is, even when the function was fetched before.
                    memory.write_impls(&format!("{}\n{}", impls, located))?;
                }
                ParsedReply::StopSignal => {
                    info!("Stop requested in round {}", round);
                    termination = TerminationReason::StopRequested;
                    break;
                }
                ParsedReply::FlowStepRecord(step) => {
                    let mut steps = decode_steps(&steps_text);
                    steps.push(step.clone());
                    memory.write_steps(&serde_json::to_string_pretty(&steps)?)?;
                    debug!(
                        "Recorded step {}: {}:{} {}",
                        steps.len(),
                        step.file,
                        step.line,
                        step.code
                    );

                    if self.config.anchor_match.matches(&step, &pair.end) {
                        info!("Reached end anchor in round {}", round);
                        termination = TerminationReason::EndReached;
                        break;
                    }
                }
            }
        }

        if termination == TerminationReason::BudgetExhausted {
            warn!("Round budget of {} exhausted before reaching the end", max_rounds);
        }

        let steps = match memory.read_steps() {
            Ok(text) => decode_steps(&text),
            Err(FlowTraceError::MemoryNotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        info!(
            "Trace finished: steps={}, rounds={}, inference_calls={}, termination={}, duration={}ms",
            steps.len(),
            rounds_used,
            inference_calls,
            termination,
            start_time.elapsed().as_millis()
        );

        Ok(TraceOutcome {
            flow_id: pair.flow_id,
            steps,
            rounds_used,
            inference_calls,
            termination,
            service_error,
        })
    }

    /// Reset both slots and load the UI-building callbacks from the start
    /// file's directory into the corpus. Returns the corpus written.
    pub fn seed(&self, pair: &FlowPair, memory: &dyn TraceMemory) -> Result<String> {
        memory.write_steps("[]")?;
        memory.write_impls("")?;

        let start_dir = start_directory(&pair.start.file);
        debug!(
            "Seeding with '{}' callbacks under {}",
            BUILD_SENTINEL,
            start_dir.display()
        );
        let located = self.locator.locate(BUILD_SENTINEL, Some(&start_dir));
        memory.write_impls(&located)?;
        Ok(located)
    }
}

/// Directory holding `file`; a bare file name resolves to the current directory.
pub fn start_directory(file: &str) -> PathBuf {
    match Path::new(file).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn decode_steps(text: &str) -> Vec<FlowStep> {
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!("Persisted steps are not a valid step list ({}); starting over", e);
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_directory_of_nested_and_bare_files() {
        assert_eq!(
            start_directory("data/app/entry/pages/Mine.ets"),
            PathBuf::from("data/app/entry/pages")
        );
        assert_eq!(start_directory("Mine.ets"), PathBuf::from("."));
    }

    #[test]
    fn undecodable_steps_fall_back_to_empty() {
        assert!(decode_steps("not json").is_empty());
        assert!(decode_steps("{\"file\": 1}").is_empty());
        let steps = decode_steps(r#"[{"file": "a.ts", "line": 2, "code": "x", "desc": "d"}]"#);
        assert_eq!(steps, vec![FlowStep::new("a.ts", 2, "x", "d")]);
    }
}
