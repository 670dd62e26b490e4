use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] spherix_core::Error),

    #[error("Tensor backend error: {0}")]
    Backend(#[from] candle_core::Error),
}

impl Error {
    /// True when the failure is a scoring/selection call made before training
    pub fn is_not_trained(&self) -> bool {
        matches!(self, Error::Core(spherix_core::Error::NotTrained))
    }
}

impl From<Error> for spherix_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(inner) => inner,
            Error::Backend(inner) => spherix_core::Error::Backend(inner.to_string()),
        }
    }
}
