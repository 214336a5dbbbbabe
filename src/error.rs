use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Kube(kube::Error),

    #[from]
    Infer(kube::config::InferConfigError),

    #[from]
    InvalidUri(hyper::http::uri::InvalidUri),

    #[from]
    Io(std::io::Error),

    #[from]
    Metrics(cadence::MetricError),

    /// The api client could not be built for this attempt
    Connect(String),

    /// Custom error message
    Custom(String),
}

impl Error {
    /// True for failures to construct a client, as opposed to a failed request
    /// made with a working client.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Infer(_) | Self::InvalidUri(_))
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}
