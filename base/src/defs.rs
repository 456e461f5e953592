use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::num::{ParseFloatError, ParseIntError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    FitNonConvergence,
    ImageError,
    InconsistentState,
    IoError,
    JsonError,
    KdTreeError,
    MalformedData,
    SelectionStalled,
    UnsupportedFormat,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub description: String,
    pub source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, description: String) -> Self {
        Self {
            kind,
            description,
            source: None,
        }
    }

    pub fn with_source<E>(
        kind: ErrorKind,
        description: String,
        source: E,
    ) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            description,
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)?;
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lifts foreign errors (and `None`) into `Result` with a lazily built
/// description.
pub trait IntoResult<T> {
    fn into_result<F: FnOnce() -> String>(self, err_fn: F) -> Result<T>;

    fn res<F: FnOnce() -> String>(self, err_fn: F) -> Result<T>
    where
        Self: Sized,
    {
        self.into_result(err_fn)
    }
}

macro_rules! impl_into_result {
    ($err: ty, $kind: ident) => {
        impl<T> IntoResult<T> for std::result::Result<T, $err> {
            fn into_result<F: FnOnce() -> String>(
                self,
                err_fn: F,
            ) -> Result<T> {
                self.map_err(|e| {
                    Error::with_source(ErrorKind::$kind, err_fn(), e)
                })
            }
        }
    };
}

impl_into_result!(io::Error, IoError);
impl_into_result!(serde_json::Error, JsonError);
impl_into_result!(ParseFloatError, MalformedData);
impl_into_result!(ParseIntError, MalformedData);

impl<T> IntoResult<T> for Option<T> {
    fn into_result<F: FnOnce() -> String>(self, err_fn: F) -> Result<T> {
        self.ok_or_else(|| Error::new(ErrorKind::InconsistentState, err_fn()))
    }
}
