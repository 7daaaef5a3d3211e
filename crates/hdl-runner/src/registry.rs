//! Name to constructor table for the adapters shipped with the crate.

use crate::runner::{Runner, RunnerError};
use crate::runners::{Icarus, Odin, Yosys};

pub type Constructor = fn() -> Box<dyn Runner>;

const RUNNERS: &[(&str, Constructor)] = &[("icarus", icarus), ("odin", odin), ("yosys", yosys)];

fn icarus() -> Box<dyn Runner> {
    Box::new(Icarus::new())
}

fn odin() -> Box<dyn Runner> {
    Box::new(Odin::new())
}

fn yosys() -> Box<dyn Runner> {
    Box::new(Yosys::new())
}

pub fn names() -> impl Iterator<Item = &'static str> {
    RUNNERS.iter().map(|(name, _)| *name)
}

/// Fresh adapter instance for `name`. Construction has no side effects, so
/// callers running tests in parallel take one instance per run.
pub fn lookup(name: &str) -> Result<Box<dyn Runner>, RunnerError> {
    RUNNERS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, construct)| construct())
        .ok_or_else(|| RunnerError::UnknownRunner(name.to_string()))
}

pub fn all() -> Vec<Box<dyn Runner>> {
    RUNNERS.iter().map(|(_, construct)| construct()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_constructs_a_runner_with_its_name() {
        for name in names() {
            let runner = lookup(name).expect("registered runner");
            assert_eq!(runner.name(), name);
        }
        assert_eq!(all().len(), names().count());
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = lookup("quartus").err().expect("unknown runner");
        assert_eq!(err.code(), "unknown_runner");
        assert!(err.to_string().contains("quartus"));
    }
}
