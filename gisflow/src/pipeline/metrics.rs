use crate::pipeline::ExecutionMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMetrics {
    pub command: String,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct ChainMetrics {
    pub total_duration_ms: u128,
    pub steps: Vec<StepMetrics>,
}

impl ChainMetrics {
    /// Duration of the first step running `command`.
    pub fn step_duration_ms(&self, command: &str) -> Option<u128> {
        self.steps
            .iter()
            .find(|step| step.command == command)
            .map(|step| step.duration_ms)
    }
}

#[derive(Debug, Clone)]
pub struct FanOutMetrics {
    pub execution: ExecutionMode,
    pub total_duration_ms: u128,
    pub succeeded: usize,
    pub failed: usize,
}
