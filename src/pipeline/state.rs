//! Per-project pipeline state machine
//!
//! ```text
//! registered ─┐
//! ready ──────┼─> queued -> fetching -> extracting -> building -> synthesizing -> ready
//! error ──────┘                 │
//!                               └──> ready   (snapshot unchanged)
//! ```
//! `error` is reachable from every in-flight state.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Registered, never run
    Registered,
    Queued,
    Fetching,
    Extracting,
    Building,
    Synthesizing,
    Ready,
    Error,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Registered => "registered",
            PipelineState::Queued => "queued",
            PipelineState::Fetching => "fetching",
            PipelineState::Extracting => "extracting",
            PipelineState::Building => "building",
            PipelineState::Synthesizing => "synthesizing",
            PipelineState::Ready => "ready",
            PipelineState::Error => "error",
        }
    }

    /// States a run may be started from
    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Registered | PipelineState::Ready | PipelineState::Error)
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_idle()
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Registered | Ready | Error, Queued) => true,
            (Queued, Fetching) => true,
            (Fetching, Extracting) => true,
            (Fetching, Ready) => true,
            (Extracting, Building) => true,
            (Building, Synthesizing) => true,
            (Synthesizing, Ready) => true,
            (Queued | Fetching | Extracting | Building | Synthesizing, Error) => true,
            _ => false,
        }
    }

    /// Checked transition
    pub fn transition(self, next: PipelineState) -> Result<PipelineState, crate::PipelineError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::PipelineError::InvalidTransition { from: self.as_str(), to: next.as_str() })
        }
    }
}

impl FromStr for PipelineState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(PipelineState::Registered),
            "queued" => Ok(PipelineState::Queued),
            "fetching" => Ok(PipelineState::Fetching),
            "extracting" => Ok(PipelineState::Extracting),
            "building" => Ok(PipelineState::Building),
            "synthesizing" => Ok(PipelineState::Synthesizing),
            "ready" => Ok(PipelineState::Ready),
            "error" => Ok(PipelineState::Error),
            _ => Err(crate::Error::Corrupt(format!("Unknown pipeline state: {}", s))),
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn test_happy_path() {
        let path = [Registered, Queued, Fetching, Extracting, Building, Synthesizing, Ready];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_error_reachable_from_in_flight_only() {
        for state in [Queued, Fetching, Extracting, Building, Synthesizing] {
            assert!(state.can_transition_to(Error));
        }
        assert!(!Ready.can_transition_to(Error));
        assert!(!Registered.can_transition_to(Error));
    }

    #[test]
    fn test_resync_and_short_circuit() {
        assert!(Ready.can_transition_to(Queued));
        assert!(Error.can_transition_to(Queued));
        assert!(Fetching.can_transition_to(Ready));
        assert!(!Extracting.can_transition_to(Ready));
        assert!(!Building.can_transition_to(Queued));
        assert!(Building.transition(Fetching).is_err());
    }

    #[test]
    fn test_roundtrip() {
        for state in [Registered, Queued, Fetching, Extracting, Building, Synthesizing, Ready, Error] {
            assert_eq!(state.as_str().parse::<PipelineState>().unwrap(), state);
        }
    }
}
