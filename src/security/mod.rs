pub mod approval;
pub mod defaults;
pub mod policy;
pub mod risk;

pub use approval::{
    ApprovalBroker, ApprovalDecision, AutoDenyBroker, CliApprovalBroker, ConfirmationDecision,
    ConfirmationGate, ConfirmationRequest, ExecutionPermit, Verdict,
};
pub use policy::SandboxPolicy;
pub use risk::{PolicyTable, RiskAssessment, RiskEngine, RiskLevel};
