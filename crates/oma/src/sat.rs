//! The SAT-solver invocation contract used by SAT-based minimization.
//!
//! The core does not run a solver itself; it only fixes the shape of the
//! exchange: a solver is a callable fed a CNF problem and answering with
//! a satisfying assignment or "unsat". An external solver command is
//! configured as a template whose `%I` and `%O` placeholders name the
//! input CNF file and the output model file; both placeholders are
//! mandatory and validated when the command is configured, not when it is
//! first used.

use std::path::Path;

use crate::error::{Error, Result};

/// A satisfying assignment: one signed literal per variable, positive
/// when the variable is true.
pub type SatAssignment = Vec<i32>;

/// The outcome of one solver invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SatResult {
    Sat(SatAssignment),
    Unsat,
}

/// A solver usable by SAT-based algorithms.
pub trait SatSolver {
    /// Solves the problem given as DIMACS clause lines.
    fn solve(&mut self, cnf: &str) -> Result<SatResult>;
}

/// An external solver command template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SatSolverCommand {
    template: String,
}

impl SatSolverCommand {
    /// Validates the template; `%I` and `%O` must both occur.
    pub fn new(template: &str) -> Result<Self> {
        if !template.contains("%I") {
            return Err(Error::InvalidInput(
                "solver command should contain %I to indicate how to use the input file".into(),
            ));
        }
        if !template.contains("%O") {
            return Err(Error::InvalidInput(
                "solver command should contain %O to indicate how to use the output file".into(),
            ));
        }
        Ok(SatSolverCommand { template: template.to_string() })
    }

    /// The command line with both placeholders substituted.
    pub fn render(&self, input: &Path, output: &Path) -> String {
        self.template
            .replace("%I", &input.display().to_string())
            .replace("%O", &output.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_mandatory() {
        assert!(SatSolverCommand::new("solver %I > %O").is_ok());
        assert!(matches!(
            SatSolverCommand::new("solver %I"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            SatSolverCommand::new("solver > %O"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn rendering_substitutes_paths() {
        let cmd = SatSolverCommand::new("solve %I -o %O").unwrap();
        assert_eq!(
            cmd.render(Path::new("in.cnf"), Path::new("out.model")),
            "solve in.cnf -o out.model"
        );
    }
}
