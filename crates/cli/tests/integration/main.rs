//! End-to-end tests of the miepack binary against stand-in build tools.

#![cfg(unix)]

mod build_tests;
mod common;
mod test_suite_tests;
