//! Closed-loop pick controller for a simulated robotic arm.
//!
//! A planning model turns an instruction into a typed manipulation plan, the
//! plan runs against an actuator, a referee classifies the result from
//! simulator evidence, and a critic explains failures. Critiques accumulate
//! and feed the next plan until an attempt succeeds or the budget runs out.
//!
//! - **[`core`]**: Pure, deterministic logic (plan schema, classifier, critique
//!   history). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (actuator, HTTP model clients,
//!   config, attempt logs). Behind traits so tests can substitute doubles.
//!
//! Orchestration modules ([`execute`], [`judge`], [`looping`]) combine the two
//! into the retry loop driven by the CLI.

pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod judge;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
