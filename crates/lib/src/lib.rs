//! miepack-lib: packaging and publishing for the Media Insights Engine
//!
//! A build turns the solution's source tree into deployable artifacts:
//! - `manifest`: the declared build units, templates and layers
//! - `venv`: the run-scoped Python environment holding the build tooling
//! - `archive` / `assemble`: one archive per unit, plus the runtime layers
//! - `template`: placeholder substitution into the infrastructure templates
//! - `publish`: upload to versioned object store prefixes
//! - `pipeline`: the ordered phases tying it all together
//!
//! `testrun` drives the pytest suites against a checkout or a deployed stack.

pub mod archive;
pub mod assemble;
pub mod consts;
pub mod exec;
pub mod manifest;
pub mod params;
pub mod pipeline;
pub mod preflight;
pub mod publish;
pub mod report;
pub mod staging;
pub mod template;
pub mod testrun;
pub mod util;
pub mod venv;
