//! Gatekeeping and evaluation of submitted transformation code.
//!
//! [`Executor::prepare`] runs every check that needs no data: the feature
//! switch, length limits, the security scan and parsing. Only a prepared
//! [`Program`] can reach [`Executor::evaluate`], so a denied or malformed
//! request never touches the table.

use log::{debug, info, warn};

use crate::{
    config::Config,
    error::{Result, ScoutError},
    frame::Dataset,
    script::{Interpreter, Outcome, ast::Program, parse_program},
    security::SecurityFilter,
    validate::Validator,
};

pub struct Executor<'a> {
    config: &'a Config,
}

impl<'a> Executor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn ensure_enabled(&self) -> Result<()> {
        if self.config.enable_code_execution {
            Ok(())
        } else {
            Err(ScoutError::FeatureDisabled {
                feature: "code_execution".to_string(),
            })
        }
    }

    /// Feature switch, length check, security scan, then parse.
    pub fn prepare(&self, source: &str) -> Result<Program> {
        self.ensure_enabled()?;
        Validator::new(self.config).validate_code(source)?;
        SecurityFilter::new(&self.config.blacklist).check(source)?;
        let program = parse_program(source)?;
        debug!("Parsed {} statement(s)", program.statements.len());
        Ok(program)
    }

    /// Runs a prepared program with `dataset` bound as `table` and `df`.
    pub fn evaluate(&self, program: &Program, dataset: Dataset) -> Outcome {
        let outcome = Interpreter::new(dataset).run(program);
        match &outcome.result {
            Ok(result) => info!(
                "Code executed: result is a {}, {} printed line(s)",
                result.kind(),
                outcome.output.len()
            ),
            Err(err) => warn!(
                "Code failed after {} printed line(s): {err}",
                outcome.output.len()
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, ColumnData};

    #[test]
    fn denied_code_is_never_parsed() {
        let config = Config::default();
        let err = Executor::new(&config)
            .prepare("import os\nresult = (")
            .expect_err("denied");
        assert_eq!(err.error_type(), "SECURITY_VIOLATION");
    }

    #[test]
    fn disabled_execution_short_circuits() {
        let config = Config {
            enable_code_execution: false,
            ..Config::default()
        };
        let err = Executor::new(&config).prepare("").expect_err("disabled");
        assert_eq!(err.error_type(), "FEATURE_DISABLED");
    }

    #[test]
    fn syntax_errors_surface_before_evaluation() {
        let config = Config::default();
        let err = Executor::new(&config)
            .prepare("result = table[")
            .expect_err("syntax");
        assert_eq!(err.error_type(), "CODE_COMPILATION_ERROR");
    }

    #[test]
    fn evaluates_against_the_bound_table() {
        let config = Config::default();
        let executor = Executor::new(&config);
        let program = executor.prepare("result = df['x'].sum()").expect("prepare");
        let dataset = Dataset::new(vec![Column::new(
            "x",
            ColumnData::int64(vec![Some(2), Some(3)]),
        )])
        .expect("dataset");
        let outcome = executor.evaluate(&program, dataset);
        assert_eq!(outcome.result.expect("evaluate").display(), "5");
    }
}
