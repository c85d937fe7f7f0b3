//! Concrete validation stages
//!
//! Each stage is independent and applies the universal precondition (the
//! attempt is still valid). Registration order here is execution order.

mod doi;
mod funding;
mod journal;
mod license;
mod pub_date;
mod references;
mod section;

pub use doi::DoiStage;
pub use funding::FundingStage;
pub use journal::JournalDetailsStage;
pub use license::LicenseStage;
pub use pub_date::PubDateStage;
pub use references::ReferencesStage;
pub use section::SectionStage;

use crate::editorial::IssueResolver;
use crate::pipeline::Stage;
use std::sync::Arc;

/// The registered stage set, in execution order
pub fn default_stages(resolver: Arc<dyn IssueResolver>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(FundingStage),
        Box::new(DoiStage::new(resolver)),
        Box::new(LicenseStage),
        Box::new(SectionStage),
        Box::new(PubDateStage),
        Box::new(JournalDetailsStage),
        Box::new(ReferencesStage),
    ]
}
