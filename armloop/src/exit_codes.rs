//! Stable exit codes for armloop CLI commands.

/// Command succeeded, or the attempt/run ended in a successful pick.
pub const OK: i32 = 0;
/// Invalid plan, config or arguments, or a fatal simulator/service error.
pub const INVALID: i32 = 1;
/// `armloop run` spent its attempt budget, or `armloop simulate` did not lift the cube.
pub const EXHAUSTED: i32 = 2;
