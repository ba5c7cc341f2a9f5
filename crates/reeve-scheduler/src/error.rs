//! Scan errors.

use reeve_config::ConfigError;
use reeve_core::secret::SecretError;
use thiserror::Error;

/// Failure of a single repository scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("checking access to repository {repository} failed - {source}")]
    Access {
        repository: String,
        #[source]
        source: reeve_core::Error,
    },

    #[error("listing files of repository {repository} failed - {source}")]
    Listing {
        repository: String,
        #[source]
        source: reeve_core::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("error decrypting secret {name} in {file} from repository {repository} - {source}")]
    Secret {
        repository: String,
        file: String,
        name: String,
        #[source]
        source: SecretError,
    },
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Failure to submit work to the scan queue.
#[derive(Debug, Error)]
pub enum ScanQueueError {
    #[error("scan queue is closed")]
    Closed,

    #[error("invalid discovery schedule {schedule:?} - {message}")]
    InvalidSchedule { schedule: String, message: String },
}
