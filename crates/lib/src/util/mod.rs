//! Helpers shared by the build phases.

pub mod hash;

#[cfg(test)]
pub mod testutil;
