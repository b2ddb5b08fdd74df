use serde::de;
use std::error;
use std::fmt::{self, Display};

#[derive(Clone, Debug, PartialEq)]
pub enum DeError {
    SerdeError(String),
    ExpectSingleValue(String),
    ExpectString,
    ExpectChar(String),
    ExpectBoolean,
    ExpectNumber,
    ExpectInteger(f64),
    ExpectObject,
}

// serde::de::Error needs to be implemented on the error handed to serde, so we define a thin
// wrapper around our actual error type.
#[derive(Debug, Clone, PartialEq)]
pub struct Error(pub DeError);

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error(DeError::SerdeError(msg.to_string()))
    }
}

impl error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            DeError::SerdeError(ref s) => write!(f, "error from deserialization: {}", s),
            DeError::ExpectSingleValue(ref key) => {
                write!(f, "expecting {} to contain a single entry", key)
            }
            DeError::ExpectString => write!(f, "expecting string"),
            DeError::ExpectChar(ref s) => {
                write!(f, "expecting string of length one, received `{}`", s)
            }
            DeError::ExpectBoolean => write!(f, "expecting boolean"),
            DeError::ExpectNumber => write!(f, "expecting number"),
            DeError::ExpectInteger(x) => write!(f, "expecting whole number, received {}", x),
            DeError::ExpectObject => write!(f, "needs an object to deserialize a struct"),
        }
    }
}
