use thiserror::Error;

/// Failure of a single push or pop on the hardware stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("stack overflow")]
    Overflow,
    #[error("stack underflow")]
    Underflow,
}

/// A fault observed while advancing the control unit by one phase.
///
/// Faults never change how the machine state evolves. Whether they are
/// returned from `step_phase` depends on the configured [`FaultPolicy`].
///
/// [`FaultPolicy`]: crate::config::FaultPolicy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuFault {
    #[error("stack overflow while executing instruction at 0x{address:02X}")]
    StackOverflow { address: u8 },
    #[error("stack underflow while executing instruction at 0x{address:02X}")]
    StackUnderflow { address: u8 },
    #[error("unknown opcode 0x{opcode:02X} at 0x{address:02X}")]
    UnknownOpcode { opcode: u8, address: u8 },
}

impl CpuFault {
    pub fn from_stack(err: StackError, address: u8) -> Self {
        match err {
            StackError::Overflow => CpuFault::StackOverflow { address },
            StackError::Underflow => CpuFault::StackUnderflow { address },
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CpuFault::StackOverflow { .. } => "stack_overflow",
            CpuFault::StackUnderflow { .. } => "stack_underflow",
            CpuFault::UnknownOpcode { .. } => "unknown_opcode",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_error_maps_to_fault() {
        assert_eq!(
            CpuFault::from_stack(StackError::Overflow, 0x10),
            CpuFault::StackOverflow { address: 0x10 }
        );
        assert_eq!(
            CpuFault::from_stack(StackError::Underflow, 0x11).kind(),
            "stack_underflow"
        );
    }

    #[test]
    fn test_fault_messages() {
        let fault = CpuFault::UnknownOpcode { opcode: 0x7F, address: 0x05 };
        assert_eq!(fault.to_string(), "unknown opcode 0x7F at 0x05");
    }
}
