//! canary Test Orchestration Engine
//!
//! Runs the canary test corpus through an external test tool (pytest by
//! default) and reduces whatever it reports to a [`TestSummary`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  TestEngine                                                 │
//! │    ├── discover(scope, marker) -> targets     (scope)       │
//! │    ├── run(scope, options) -> TestSummary                   │
//! │    │     ├── Invocation -> argument vector    (invocation)  │
//! │    │     ├── TestExecutor::execute            (invoker)     │
//! │    │     └── parse(raw, report?)              (parser)      │
//! │    └── run_self_test(mode) -> SelfTestOutcome (self_test)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Infrastructure problems (missing tool, spawn failure, deadline) are
//! returned as ERROR summaries rather than as errors, so a start-up gate
//! only has to look at the summary.

pub mod engine;
pub mod error;
pub mod invocation;
pub mod invoker;
pub mod parser;
pub mod report;
pub mod scope;
pub mod self_test;
pub mod summary;

pub use engine::{RunOptions, TestEngine};
pub use error::{InvokeError, RunError, RunnerError, RunnerResult};
pub use invocation::{CoverageRequest, Invocation};
pub use invoker::{ExitClass, ProcessInvoker, RawExecutionResult, TestExecutor};
pub use scope::{Resolution, TestScope};
pub use self_test::{
    Confirmation, RecordingChannel, SelfTestChannel, SelfTestHarness, SelfTestMode,
    SelfTestOutcome, TracingChannel,
};
pub use summary::{Count, CountSource, TestStatus, TestSummary};
