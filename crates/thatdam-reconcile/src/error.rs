//! Port and reconciliation errors.

use snafu::Snafu;

/// A single port call failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PortError {
    #[snafu(display("{op} {path}: {source}"))]
    Io {
        op: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("invalid name {name:?}: {reason}"))]
    InvalidName { name: String, reason: &'static str },

    #[snafu(display("class not found: {class}"))]
    ClassNotFound { class: String },

    #[snafu(display("queue not declared: {queue}"))]
    QueueNotDeclared { queue: String },

    #[snafu(display("exchange not declared: {exchange}"))]
    ExchangeNotDeclared { exchange: String },

    /// Remote backend failure.
    #[snafu(display("{backend}: {reason}"))]
    Backend { backend: &'static str, reason: String },
}

/// One or more reconcile steps failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReconcileError {
    /// `<target>: <step>: <cause>`
    #[snafu(display("{target}: {step}: {source}"))]
    Step {
        target: String,
        step: &'static str,
        source: PortError,
    },

    /// Every failure from a pass, newline separated.
    #[snafu(display("{}", join_lines(errors)))]
    Joined { errors: Vec<ReconcileError> },
}

impl ReconcileError {
    /// Flatten into individual step failures.
    pub fn into_steps(self) -> Vec<ReconcileError> {
        match self {
            ReconcileError::Joined { errors } => errors.into_iter().flat_map(ReconcileError::into_steps).collect(),
            step => vec![step],
        }
    }

    /// Join `errors` into a single error, or `Ok` when there are none.
    pub fn join(errors: Vec<ReconcileError>) -> Result<(), ReconcileError> {
        let mut steps: Vec<ReconcileError> = errors.into_iter().flat_map(ReconcileError::into_steps).collect();
        match steps.len() {
            0 => Ok(()),
            1 => Err(steps.remove(0)),
            _ => Err(ReconcileError::Joined { errors: steps }),
        }
    }
}

fn join_lines(errors: &[ReconcileError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(target: &str) -> ReconcileError {
        ReconcileError::Step {
            target: target.to_string(),
            step: "ensure bucket",
            source: PortError::InvalidName {
                name: target.to_string(),
                reason: "bad",
            },
        }
    }

    #[test]
    fn test_join_empty_is_ok() {
        assert!(ReconcileError::join(Vec::new()).is_ok());
    }

    #[test]
    fn test_join_single_is_unwrapped() {
        let err = ReconcileError::join(vec![step("a")]).unwrap_err();
        assert!(matches!(err, ReconcileError::Step { .. }));
    }

    #[test]
    fn test_join_flattens_and_separates_by_newline() {
        let nested = ReconcileError::Joined {
            errors: vec![step("a"), step("b")],
        };
        let err = ReconcileError::join(vec![nested, step("c")]).unwrap_err();
        let text = err.to_string();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("a: ensure bucket: "));
        assert_eq!(err.into_steps().len(), 3);
    }
}
