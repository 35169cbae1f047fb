//! Capability/ordering error type.
//!
//! Per spec.md §7, invariant violations are programming errors and panic
//! with the offending node's identity; only the "a pass needs a resource not
//! currently live" class is a [`Result`] a driver can propagate with `?`.
//! Genuine structural corruption is never represented here.

use anyhow::Result;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A scoped resource (link slot, block-visited counter) was reserved
    /// while already reserved.
    ResourceAlreadyReserved { resource: &'static str },
    /// A scoped resource was released without a matching reservation.
    ResourceNotReserved { resource: &'static str },
    /// A pass requires liveness/next-use information that is not currently
    /// marked valid on the graph.
    AnalysisNotValid { analysis: &'static str },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::ResourceAlreadyReserved { resource } => {
                write!(f, "resource `{resource}` is already reserved")
            }
            CoreError::ResourceNotReserved { resource } => {
                write!(f, "resource `{resource}` was released without a reservation")
            }
            CoreError::AnalysisNotValid { analysis } => {
                write!(f, "analysis `{analysis}` is not valid; run it before this pass")
            }
        }
    }
}

impl std::error::Error for CoreError {}

pub type CoreResult<T> = Result<T>;
