pub mod advisor;
pub mod cleanup;
pub mod collaborators;
pub mod emergency;
pub mod templates;

pub use advisor::{
    AdvisorCategory, AdvisorContext, AdvisorEngine, AdvisorRule, CostBenefit, Effort, Insight,
    InsightKind, Recommendation, RecommendationSort, RecommendationStatus, Risk,
};
pub use cleanup::{
    ActionReport, CleanupAction, CleanupCategory, CleanupContext, CleanupOperation,
    CleanupOrchestrator, CleanupResult, CleanupRun, CleanupTrigger, SubOperation,
};
pub use collaborators::{
    CacheRegistry, GarbageCollector, HostCollaborators, ObjectPoolRegistry, ResourceRegistry,
    SimulatedHost,
};
pub use emergency::{EmergencyAction, EmergencyMode, EmergencyResolution, EmergencyState};
