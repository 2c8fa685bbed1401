pub mod event_processor;

pub use event_processor::{DrainSummary, EventProcessor, ProcessorState, WakeupSignal};
