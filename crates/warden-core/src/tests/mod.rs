//! Scenario tests for lifecycle, delayed actions and orchestration.
//!
//! Every scenario runs against [`mocks`] in paused virtual time, so waits of
//! several minutes complete instantly and elapsed time can be asserted.


pub use mocks::{MockProcessManager, MockQuery, MockUnit, MockUpdater, RecordingHook, RecordingNotifier};
