pub mod config;
pub mod export;
pub mod llm_client;
pub mod sim;
pub mod tuning;

pub use config::{AdvisoryBackend, AdvisoryEndpoint, TunerConfig};
pub use llm_client::{AdvisoryService, LlmClient, Message};
pub use sim::{ClosedLoopSimulator, Simulator, StepResponseSample, TimeBase};
pub use tuning::{
    Aggressiveness, GainSet, History, HistoryEntry, PerformanceMetrics, RunSummary, Termination,
    TuningMode, TuningOrchestrator, TuningSession,
};
