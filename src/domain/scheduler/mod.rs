pub mod admission;
pub mod ledger;
pub mod sweep;
pub mod timeline;

mod timeline_tests;

pub use admission::{AdmissionScheduler, AdmittedTask, TaskRequest};
pub use timeline::{AvailabilityPeriod, TimelineBuilder};
