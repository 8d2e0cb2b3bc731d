use serde::{Deserialize, Serialize};
use std::fmt;

/// One recorded hop of a trace: a source line plus the reason it carries the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    pub code: String,
    pub desc: String,
}

impl FlowStep {
    pub fn new(
        file: impl Into<String>,
        line: u32,
        code: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            code: code.into(),
            desc: desc.into(),
        }
    }
}

/// A `(file, line, code)` triple naming the start or end statement of a trace.
///
/// Upstream selectors emit anchors either as JSON objects or as
/// `[file, line, code]` arrays; both forms deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AnchorRepr")]
pub struct TraceAnchor {
    pub file: String,
    pub line: u32,
    pub code: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnchorRepr {
    Tuple(String, u32, String),
    Object { file: String, line: u32, code: String },
}

impl From<AnchorRepr> for TraceAnchor {
    fn from(repr: AnchorRepr) -> Self {
        match repr {
            AnchorRepr::Tuple(file, line, code) | AnchorRepr::Object { file, line, code } => {
                Self { file, line, code }
            }
        }
    }
}

impl TraceAnchor {
    pub fn new(file: impl Into<String>, line: u32, code: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            code: code.into(),
        }
    }

    /// The `{file, line}` pair persisted with a finished trace.
    pub fn location(&self) -> AnchorRef {
        AnchorRef {
            file: self.file.clone(),
            line: self.line,
        }
    }
}

impl fmt::Display for TraceAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {}, {:?})", self.file, self.line, self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRef {
    pub file: String,
    pub line: u32,
}

/// Input record produced by the upstream anchor selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPair {
    pub flow_id: u32,
    pub start: TraceAnchor,
    pub end: TraceAnchor,
    /// Name of the traced value; only used to phrase the question.
    pub target_var: String,
    #[serde(default, alias = "api_type")]
    pub category: String,
}

/// Why a trace stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// A recorded step matched the end anchor.
    EndReached,
    /// The model replied with the explicit stop action.
    StopRequested,
    /// The round budget ran out; the trace is inconclusive.
    BudgetExhausted,
    /// The inference call failed; steps persisted so far are kept.
    ServiceFailed,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::EndReached => "end_reached",
            TerminationReason::StopRequested => "stop_requested",
            TerminationReason::BudgetExhausted => "budget_exhausted",
            TerminationReason::ServiceFailed => "service_failed",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished trace as handed to downstream classification and rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    pub flow_id: u32,
    #[serde(alias = "api_type")]
    pub category: String,
    pub target_var: String,
    pub start: AnchorRef,
    pub end: AnchorRef,
    pub steps: Vec<FlowStep>,
    pub termination: TerminationReason,
}
