pub mod quality;
pub mod rules;
pub mod validator;

pub use quality::QualityBreakdown;
pub use rules::ComplianceRules;
pub use validator::{ComplianceReport, ComplianceValidator, ValidationOutcome};
