use genflow_core::{Classify, ErrorClass};
use serde::Serialize;

use super::diagnostics::HostDiagnostics;

/// Transfer error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    #[error("invalid source url: {0}")]
    InvalidSource(String),
    #[error("{strategy}: network error: {message}")]
    Network {
        strategy: &'static str,
        message: String,
    },
    #[error("{strategy}: source answered HTTP {code}")]
    Status { strategy: &'static str, code: u16 },
    #[error("{strategy}: source returned an empty body")]
    EmptyBody { strategy: &'static str },
    #[error("upload failed: {0}")]
    Upload(String),
    #[error(
        "transfer of {} exhausted: {} strategy failures over {} cycle(s)",
        .0.source_url, .0.failures.len(), .0.cycles_attempted
    )]
    Exhausted(Box<TransferReport>),
}

impl TransferError {
    pub(crate) fn network(strategy: &'static str, err: impl std::fmt::Display) -> Self {
        TransferError::Network {
            strategy,
            message: err.to_string(),
        }
    }

    /// Aggregated diagnostic, when every strategy was exhausted.
    pub fn report(&self) -> Option<&TransferReport> {
        match self {
            TransferError::Exhausted(report) => Some(report),
            _ => None,
        }
    }
}

impl Classify for TransferError {
    fn class(&self) -> ErrorClass {
        match self {
            TransferError::Network { .. }
            | TransferError::EmptyBody { .. }
            | TransferError::Upload(_) => ErrorClass::Transient,
            TransferError::Status { code: 429, .. } => ErrorClass::RateLimited,
            TransferError::Status { code, .. } if *code == 408 || *code >= 500 => {
                ErrorClass::Transient
            }
            TransferError::Status { .. }
            | TransferError::InvalidSource(_)
            | TransferError::Exhausted(_) => ErrorClass::Fatal,
        }
    }
}

/// One failed strategy attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFailure {
    pub cycle: u32,
    pub strategy: &'static str,
    pub class: ErrorClass,
    pub message: String,
}

/// What a transfer tried before succeeding or giving up.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub source_url: String,
    pub cycles_attempted: u32,
    pub failures: Vec<StrategyFailure>,
    pub diagnostics: Option<HostDiagnostics>,
}

impl TransferReport {
    pub fn strategies_attempted(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for failure in &self.failures {
            if !names.contains(&failure.strategy) {
                names.push(failure.strategy);
            }
        }
        names
    }
}
