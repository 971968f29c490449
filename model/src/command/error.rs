use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for a [`CommandRunner`](super::CommandRunner). A non-zero exit status is not an
/// error at this layer; callers inspect [`CommandOutput`](super::CommandOutput) for that.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to start '{}': {}", program, source))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to wait for '{}': {}", program, source))]
    Wait {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("'{}' did not finish within {:?}", program, duration))]
    Timeout { program: String, duration: Duration },

    #[snafu(display("Unable to write command log '{}': {}", path.display(), source))]
    Log {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` if the command was killed because its bounded wait elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
