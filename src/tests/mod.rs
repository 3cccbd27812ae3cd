// Integration-style tests requiring a live pool; unit tests for pure
// logic live alongside the code they test.

pub mod common;
mod end_to_end_test;
