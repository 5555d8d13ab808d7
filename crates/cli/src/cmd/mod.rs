mod build;
mod regions;
mod test;

pub use build::cmd_build;
pub use regions::cmd_regions;
pub use test::cmd_test;
