use std::io;
use thiserror::Error;

use crate::hardware::LifecycleState;

/// Every failure the adapter can report to the control framework.
#[derive(Error, Debug)]
pub enum ArmError{
    #[error("base initialization failed: {0}")]
    BaseInit(String),

    #[error("invalid hardware parameter '{key}': {details}")]
    InvalidParameter{ key: String, details: String },

    #[error("robot description error: {0}")]
    Description(String),

    #[error("{registered} '{kind}' interfaces registered for {joints} joints")]
    RegistryOverflow{ kind: String, registered: usize, joints: usize },

    #[error("{joints} joints do not fit in a command frame (max {max})")]
    TooManyJoints{ joints: usize, max: usize },

    #[error("cannot {action} while {state:?}")]
    InvalidTransition{ action: &'static str, state: LifecycleState },

    #[error("adapter has not been initialized")]
    NotInitialized,

    #[error("adapter is not active")]
    NotActive,

    #[error("failed to open {device}: {source}")]
    Open{ device: String, #[source] source: io::Error },

    #[error("{device} is locked by another process")]
    DeviceLocked{ device: String },

    #[error("terminal configuration failed at {step}: {source}")]
    Termios{ step: &'static str, #[source] source: io::Error },

    #[error("short write: {sent} of {expected} bytes")]
    ShortWrite{ sent: usize, expected: usize },

    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),

    #[error("serial port enumeration failed: {0}")]
    Enumerate(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, ArmError>;

impl ArmError{
    pub(crate) fn invalid_parameter(key: &str, details: impl Into<String>) -> Self{
        ArmError::InvalidParameter{ key: key.to_string(), details: details.into() }
    }
}
