pub mod dedup;
pub mod moderation;

pub use dedup::DedupLedger;
pub use moderation::{
    ModerationChecker, ModerationScope, ModerationVerdict, RetrySchedule, SafetyClassifier,
    VerdictStatus, parse_verdict,
};
