// Perf Agent Infrastructure - HTTP Adapters
// Implements: StatusNotifier

pub mod callback_reporter;

pub use callback_reporter::{CallbackBody, CallbackReporter, PerfData};
