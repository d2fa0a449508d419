use std::fmt;
use std::path::PathBuf;

/// Everything that can abort a weaving run
#[derive(Debug)]
pub enum Error {
    /// The binding or the environment asks for something impossible
    Config(ConfigError),

    /// A bug in the code generation logic
    Internal(InternalError),

    /// Reading or writing a file failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A class file could not be parsed (or failed verification)
    ClassFormat { class: String, message: String },
}

/// Broad error categories, which map to distinct process exit codes
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorCategory {
    Configuration,
    Io,
    Internal,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingClass(String),
    MissingSuperclass { class: String, superclass: String },
    MissingMember { class: String, member: String },

    /// Class cannot be changed (read-only root, preserved, or too new a class file version)
    Unmodifiable(String),
    Inaccessible { class: String, member: String },
    DuplicateMethod { class: String, method: String },
    DuplicateField { class: String, field: String },
    DuplicateClass(String),

    /// No package could be chosen for the shared adapter class
    NoAdapterPackage,
    UnsupportedBinding { binding: String, message: String },
    MalformedName(String),
}

/// Internal consistency failure, with whatever context was available where it was detected
#[derive(Debug)]
pub struct InternalError {
    pub class: Option<String>,
    pub method: Option<String>,
    pub instruction: Option<String>,
    pub kind: InternalErrorKind,
}

#[derive(Debug)]
pub enum InternalErrorKind {
    StackUnderflow,
    TypeMismatch { expected: String, found: String },
    MissingLocal(u16),

    /// Assembler was not configured with the slot being asked for
    MissingCapability(&'static str),

    /// Instruction appended while the operand stack is undefined
    UnreachableCode,
    UnresolvedBranch,
    FallsOffEnd,

    /// Stack shapes meeting at a backward branch target differ
    StackShapeMismatch { expected: String, found: String },

    /// Stack entries at a merge point have no common type
    IncompatibleMerge { left: String, right: String },
    FrozenAfterChange,
    ConstantPoolOverflow,
    CodeOverflow(String),
    BadDescriptor(String),

    /// Re-reading a class found broken code
    InvalidCode(String),
}

impl Error {
    /// Internal error without any context attached yet
    pub fn internal(kind: InternalErrorKind) -> Error {
        Error::Internal(InternalError {
            class: None,
            method: None,
            instruction: None,
            kind,
        })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Configuration,
            Error::Internal(_) => ErrorCategory::Internal,
            Error::Io { .. } | Error::ClassFormat { .. } => ErrorCategory::Io,
        }
    }

    /// Fill in missing method context on internal errors
    pub fn in_method(self, class: &str, method: &str) -> Error {
        match self {
            Error::Internal(mut err) => {
                err.class.get_or_insert_with(|| class.to_owned());
                err.method.get_or_insert_with(|| method.to_owned());
                Error::Internal(err)
            }
            other => other,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Error {
        Error::Internal(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "configuration error: {}", err),
            Error::Internal(err) => write!(f, "internal error: {}", err),
            Error::Io { path, source } => write!(f, "I/O error on {}: {}", path.display(), source),
            Error::ClassFormat { class, message } => {
                write!(f, "malformed class file for {}: {}", class, message)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingClass(class) => write!(f, "class {} not found", class),
            ConfigError::MissingSuperclass { class, superclass } => {
                write!(f, "superclass {} of {} not found", superclass, class)
            }
            ConfigError::MissingMember { class, member } => {
                write!(f, "{} not found in {}", member, class)
            }
            ConfigError::Unmodifiable(class) => write!(f, "class {} cannot be modified", class),
            ConfigError::Inaccessible { class, member } => {
                write!(f, "{} in {} is not accessible", member, class)
            }
            ConfigError::DuplicateMethod { class, method } => {
                write!(f, "method {} already exists in {}", method, class)
            }
            ConfigError::DuplicateField { class, field } => {
                write!(f, "field {} already exists in {}", field, class)
            }
            ConfigError::DuplicateClass(class) => write!(f, "class {} already exists", class),
            ConfigError::NoAdapterPackage => f.write_str(
                "no package for the adapter class (no modifiable class is bound, and no package \
                 was configured)",
            ),
            ConfigError::UnsupportedBinding { binding, message } => {
                write!(f, "binding {}: {}", binding, message)
            }
            ConfigError::MalformedName(msg) => f.write_str(msg),
        }
    }
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(class) = &self.class {
            write!(f, " in class {}", class)?;
        }
        if let Some(method) = &self.method {
            write!(f, ", method {}", method)?;
        }
        if let Some(instruction) = &self.instruction {
            write!(f, ", at {}", instruction)?;
        }
        Ok(())
    }
}

impl fmt::Display for InternalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalErrorKind::StackUnderflow => f.write_str("operand stack underflow"),
            InternalErrorKind::TypeMismatch { expected, found } => {
                write!(f, "expected {} on the stack but found {}", expected, found)
            }
            InternalErrorKind::MissingLocal(slot) => write!(f, "no local variable in slot {}", slot),
            InternalErrorKind::MissingCapability(what) => {
                write!(f, "assembler has no {} slot configured", what)
            }
            InternalErrorKind::UnreachableCode => f.write_str("instruction is unreachable"),
            InternalErrorKind::UnresolvedBranch => f.write_str("branch target never resolved"),
            InternalErrorKind::FallsOffEnd => f.write_str("code falls off the end of the method"),
            InternalErrorKind::StackShapeMismatch { expected, found } => {
                write!(f, "stack {} does not match branch target stack {}", found, expected)
            }
            InternalErrorKind::IncompatibleMerge { left, right } => {
                write!(f, "cannot merge stack types {} and {}", left, right)
            }
            InternalErrorKind::FrozenAfterChange => {
                f.write_str("class frozen as unmodifiable after being changed")
            }
            InternalErrorKind::ConstantPoolOverflow => f.write_str("constant pool is full"),
            InternalErrorKind::CodeOverflow(msg) => write!(f, "code too large: {}", msg),
            InternalErrorKind::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            InternalErrorKind::InvalidCode(msg) => write!(f, "generated code is invalid: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn categories() {
        let missing: Error = ConfigError::MissingClass(String::from("a/B")).into();
        assert_eq!(missing.category(), ErrorCategory::Configuration);

        let internal = Error::internal(InternalErrorKind::StackUnderflow);
        assert_eq!(internal.category(), ErrorCategory::Internal);

        let format = Error::ClassFormat {
            class: String::from("a/B"),
            message: String::from("truncated"),
        };
        assert_eq!(format.category(), ErrorCategory::Io);
    }

    #[test]
    fn internal_context_is_kept() {
        let err = Error::internal(InternalErrorKind::MissingLocal(3))
            .in_method("com/example/Order", "bind_marshal")
            .in_method("other/Class", "other");
        assert_eq!(
            err.to_string(),
            "internal error: no local variable in slot 3 in class com/example/Order, method bind_marshal"
        );
    }
}
