use std::{fmt, str::FromStr};

/// Verification modes for the user operation mempool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UoPoolMode {
    /// Simulation with the stack-level tracer rule enforcement
    Standard,
    /// Simulation without tracing (no opcode/storage rules)
    Unsafe,
}

impl FromStr for UoPoolMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "unsafe" => Ok(Self::Unsafe),
            _ => Err(format!("{s} is not a valid uopool mode")),
        }
    }
}

impl fmt::Display for UoPoolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Unsafe => write!(f, "unsafe"),
        }
    }
}
