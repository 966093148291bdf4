//! Arguments delivered to callbacks.
//!
//! An [`Argument`] is a closed set of the value types the dispatcher can
//! carry. An [`ArgumentBox`] holds exactly one argument (or none) for the
//! lifetime of one invocation and remembers the type it was created for, so a
//! value of another type can never be stored into it or read out of it.

use std::fmt;

use crate::DispatchError;

/// Type tag of an argument or of a handler's parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    Void,
    String,
    Integer,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Void => f.write_str("void"),
            ArgType::String => f.write_str("string"),
            ArgType::Integer => f.write_str("integer"),
        }
    }
}

/// A single value passed to callbacks on invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Argument {
    #[default]
    None,
    Str(String),
    Int(i64),
}

impl Argument {
    pub fn arg_type(&self) -> ArgType {
        match self {
            Argument::None => ArgType::Void,
            Argument::Str(_) => ArgType::String,
            Argument::Int(_) => ArgType::Integer,
        }
    }
}

impl From<()> for Argument {
    fn from(_: ()) -> Self {
        Argument::None
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::Str(value.to_owned())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::Str(value)
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Argument::Int(value)
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Argument::Int(i64::from(value))
    }
}

impl<T: Into<Argument>> From<Option<T>> for Argument {
    fn from(value: Option<T>) -> Self {
        value.map_or(Argument::None, Into::into)
    }
}

/// Holder for the argument of one invocation.
///
/// Not synchronized; the owning invocation serializes access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBox {
    kind: ArgType,
    value: Argument,
}

impl ArgumentBox {
    /// Creates an empty box for values of `kind`.
    pub fn new(kind: ArgType) -> Self {
        Self {
            kind,
            value: Argument::None,
        }
    }

    /// Creates an empty box tagged void.
    pub fn void() -> Self {
        Self::new(ArgType::Void)
    }

    /// Type the box was created for.
    pub fn kind(&self) -> ArgType {
        self.kind
    }

    /// Stores `value`.
    ///
    /// A void value empties the box whatever its kind. A typed value must
    /// match the kind the box was created for.
    pub fn set_value(&mut self, value: Argument) -> Result<(), DispatchError> {
        match value.arg_type() {
            ArgType::Void => {
                self.value = Argument::None;
                Ok(())
            }
            found if found == self.kind => {
                self.value = value;
                Ok(())
            }
            found => Err(DispatchError::TypeMismatch {
                expected: self.kind,
                found,
            }),
        }
    }

    /// Returns the stored value and whether the box is empty.
    pub fn read_value(&self) -> (&Argument, bool) {
        (&self.value, self.is_void())
    }

    pub fn is_void(&self) -> bool {
        matches!(self.value, Argument::None)
    }

    /// Reads a string box. `Ok(None)` means the box is empty.
    pub fn read_str(&self) -> Result<Option<&str>, DispatchError> {
        self.expect_kind(ArgType::String)?;
        match &self.value {
            Argument::Str(s) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    /// Reads an integer box. `Ok(None)` means the box is empty.
    pub fn read_int(&self) -> Result<Option<i64>, DispatchError> {
        self.expect_kind(ArgType::Integer)?;
        match self.value {
            Argument::Int(n) => Ok(Some(n)),
            _ => Ok(None),
        }
    }

    fn expect_kind(&self, expected: ArgType) -> Result<(), DispatchError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(DispatchError::TypeMismatch {
                expected,
                found: self.kind,
            })
        }
    }
}

impl From<Argument> for ArgumentBox {
    fn from(value: Argument) -> Self {
        Self {
            kind: value.arg_type(),
            value,
        }
    }
}
