use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

pub type DfgResult<T> = Result<T, DfgError>;

/// The seven error kinds a discrete factor graph can raise, per the core's
/// error handling design: construction-time kinds abort construction,
/// inference kinds are returned from the call that observed them without
/// corrupting any state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownSymbol,
    AlphabetTooLarge,
    Misshapen,
    Underflow,
    ZeroEvidence,
    GraphMalformed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Cow<'static, str>>> From<T> for ErrString {
    fn from(v: T) -> Self {
        Self(v.into())
    }
}

#[derive(Debug)]
pub enum DfgError {
    /// A symbol was not found in a `StateMap`'s alphabet.
    UnknownSymbol { symbol: ErrString, map_name: ErrString },
    /// A multi-state `StateMap`'s composite degeneracy map would exceed the
    /// 100,000-entry safety cap.
    AlphabetTooLarge { requested: usize, cap: usize },
    /// A factor's potential shape does not match the cardinalities of its
    /// neighboring variables (or, at construction, does not satisfy its
    /// family's normalization contract within tolerance).
    Misshapen { message: ErrString },
    /// The partition function underflowed the smallest positive
    /// representable value even though it is not truly zero.
    Underflow { log_z: f64 },
    /// Evidence pins a variable (or a product of messages) to a state with
    /// zero total probability.
    ZeroEvidence { variable: ErrString },
    /// The graph is disconnected without being a forest, or contains a
    /// cycle, and so is not a valid input to tree message passing.
    GraphMalformed { message: ErrString },

    Context {
        context: ErrString,
        source: Box<DfgError>,
    },
}

impl DfgError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownSymbol { .. } => ErrorKind::UnknownSymbol,
            Self::AlphabetTooLarge { .. } => ErrorKind::AlphabetTooLarge,
            Self::Misshapen { .. } => ErrorKind::Misshapen,
            Self::Underflow { .. } => ErrorKind::Underflow,
            Self::ZeroEvidence { .. } => ErrorKind::ZeroEvidence,
            Self::GraphMalformed { .. } => ErrorKind::GraphMalformed,
            Self::Context { .. } => ErrorKind::Context,
        }
    }

    pub fn with_context(self, msg: impl Into<String>) -> Self {
        DfgError::Context {
            context: ErrString::from(msg.into()),
            source: Box::new(self),
        }
    }

    pub fn misshapen(message: impl Into<String>) -> Self {
        DfgError::Misshapen {
            message: ErrString::from(message.into()),
        }
    }

    pub fn graph_malformed(message: impl Into<String>) -> Self {
        DfgError::GraphMalformed {
            message: ErrString::from(message.into()),
        }
    }

    pub fn unknown_symbol(symbol: impl Into<String>, map_name: impl Into<String>) -> Self {
        DfgError::UnknownSymbol {
            symbol: ErrString::from(symbol.into()),
            map_name: ErrString::from(map_name.into()),
        }
    }

    pub fn zero_evidence(variable: impl Into<String>) -> Self {
        DfgError::ZeroEvidence {
            variable: ErrString::from(variable.into()),
        }
    }
}

impl Display for DfgError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSymbol { symbol, map_name } => {
                write!(f, "unknown symbol \"{}\" in state map \"{}\"", symbol, map_name)
            }
            Self::AlphabetTooLarge { requested, cap } => write!(
                f,
                "multi-state alphabet would have {} entries, exceeding the cap of {}",
                requested, cap
            ),
            Self::Misshapen { message } => write!(f, "misshapen factor: {}", message),
            Self::Underflow { log_z } => write!(
                f,
                "partition function underflowed representable range (log Z = {})",
                log_z
            ),
            Self::ZeroEvidence { variable } => {
                write!(f, "evidence is inconsistent with every state of \"{}\"", variable)
            }
            Self::GraphMalformed { message } => write!(f, "graph malformed: {}", message),
            Self::Context { context, source } => write!(f, "{}\ncaused by: {}", context, source),
        }
    }
}

impl std::error::Error for DfgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Ergonomic `.context(...)` for any `Result<_, DfgError>`.
pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> DfgResult<T>;
}

impl<T> ResultExt<T> for Result<T, DfgError> {
    fn context(self, msg: impl Into<String>) -> DfgResult<T> {
        self.map_err(|e| e.with_context(msg))
    }
}
