//! Process exit codes. Part of the CLI contract.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1; // Config, I/O or internal error
pub const EXIT_REJECTED: i32 = 2; // Delivery failed validation
