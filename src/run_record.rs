//! Run records: the payload the journal stores for each test run.
//!
//! The journal itself treats this as opaque; it only asks for the run time
//! (age-based retention) and whether the run reached a state worth keeping
//! in a test's history (anything but NOT_RUN).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::journal::JournalPayload;

/// Outcome of a test, a test step or a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestState {
    // Generic states.
    NotRun,
    Pass,
    Fail,
    ExitSuite,
    ExitAll,
    UserStopped,

    // Run step specific.
    Skipped,
    Bug,
    BugPass,
    Todo,

    // Suite specific.
    ChildFail,
    PartRun,
    BadSetup,
    BadSuiteSetup,
    BadTeardown,
    BadSuiteTeardown,
}

impl TestState {
    pub const ALL: [TestState; 16] = [
        TestState::NotRun,
        TestState::Pass,
        TestState::Fail,
        TestState::ExitSuite,
        TestState::ExitAll,
        TestState::UserStopped,
        TestState::Skipped,
        TestState::Bug,
        TestState::BugPass,
        TestState::Todo,
        TestState::ChildFail,
        TestState::PartRun,
        TestState::BadSetup,
        TestState::BadSuiteSetup,
        TestState::BadTeardown,
        TestState::BadSuiteTeardown,
    ];

    /// Not one of the success states (PASS, SKIPPED, NOT_RUN, TODO, BUG, BUG_PASS).
    pub fn is_failure(self) -> bool {
        !matches!(
            self,
            TestState::Pass
                | TestState::Skipped
                | TestState::NotRun
                | TestState::Todo
                | TestState::Bug
                | TestState::BugPass
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestState::NotRun => "NOT_RUN",
            TestState::Pass => "PASS",
            TestState::Fail => "FAIL",
            TestState::ExitSuite => "EXIT_SUITE",
            TestState::ExitAll => "EXIT_ALL",
            TestState::UserStopped => "USER_STOPPED",
            TestState::Skipped => "SKIPPED",
            TestState::Bug => "BUG",
            TestState::BugPass => "BUG_PASS",
            TestState::Todo => "TODO",
            TestState::ChildFail => "CHILD_FAIL",
            TestState::PartRun => "PART_RUN",
            TestState::BadSetup => "BAD_SETUP",
            TestState::BadSuiteSetup => "BAD_SUITE_SETUP",
            TestState::BadTeardown => "BAD_TEARDOWN",
            TestState::BadSuiteTeardown => "BAD_SUITE_TEARDOWN",
        }
    }

    /// Case-insensitive; accepts both "BUG_PASS" and "bug-pass".
    pub fn parse(s: &str) -> Option<TestState> {
        let norm = s.trim().to_ascii_uppercase().replace('-', "_");
        TestState::ALL.into_iter().find(|st| st.as_str() == norm)
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run of one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Start of the test run this record belongs to, unix seconds.
    #[serde(default)]
    pub run_time: Option<u64>,
    pub state: TestState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl RunRecord {
    pub fn new(state: TestState, run_time: u64) -> Self {
        Self {
            run_time: Some(run_time),
            state,
            elapsed_ms: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_elapsed_ms(mut self, ms: u64) -> Self {
        self.elapsed_ms = Some(ms);
        self
    }

    pub fn with_extra<K: Into<String>, V: Into<String>>(mut self, k: K, v: V) -> Self {
        self.extra.insert(k.into(), v.into());
        self
    }

    pub fn has_failed(&self) -> bool {
        self.state.is_failure()
    }
}

impl JournalPayload for RunRecord {
    fn timestamp(&self) -> Option<u64> {
        self.run_time
    }

    fn is_meaningful(&self) -> bool {
        self.state != TestState::NotRun
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_roundtrip() {
        for st in TestState::ALL {
            assert_eq!(TestState::parse(st.as_str()), Some(st));
            let json = serde_json::to_string(&st).expect("ser");
            assert_eq!(json, format!("\"{}\"", st.as_str()));
        }
        assert_eq!(TestState::parse("bug-pass"), Some(TestState::BugPass));
        assert_eq!(TestState::parse("nope"), None);
    }

    #[test]
    fn failure_states() {
        assert!(!TestState::Pass.is_failure());
        assert!(!TestState::NotRun.is_failure());
        assert!(!TestState::BugPass.is_failure());
        assert!(TestState::Fail.is_failure());
        assert!(TestState::BadSetup.is_failure());
        assert!(TestState::UserStopped.is_failure());
    }

    #[test]
    fn not_run_is_not_meaningful() {
        assert!(!RunRecord::new(TestState::NotRun, 1).is_meaningful());
        assert!(RunRecord::new(TestState::Skipped, 1).is_meaningful());
        assert_eq!(RunRecord::new(TestState::Pass, 42).timestamp(), Some(42));
    }

    #[test]
    fn json_shape_is_compact() {
        let r = RunRecord::new(TestState::Fail, 10);
        let s = serde_json::to_string(&r).expect("ser");
        assert_eq!(s, r#"{"run_time":10,"state":"FAIL"}"#);
        let r2 = r.clone().with_elapsed_ms(5).with_extra("host", "ci-1");
        let back: RunRecord =
            serde_json::from_str(&serde_json::to_string(&r2).expect("ser")).expect("de");
        assert_eq!(back, r2);
        assert!(back.has_failed());
    }
}
