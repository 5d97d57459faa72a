//! Error taxonomy for the capture → degrade → playback pipeline

use thiserror::Error;

/// Every failure the pipeline can surface. None of these are retried: a
/// thread that sees one stops, and the process goes down with it.
#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported format, bad geometry, device or codec setup failure.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Read/write/ioctl failure during steady-state operation.
    #[error("device I/O error on {device}: {reason}")]
    DeviceIo { device: String, reason: String },

    /// The fixed low-latency codec configuration was violated.
    #[error("codec round trip failed: {0}")]
    CodecRoundTrip(String),

    #[error("queue full: all {capacity} slots are occupied")]
    QueueFull { capacity: usize },

    #[error("queue empty: no populated slot to consume")]
    QueueEmpty,

    /// Writing to an archival dump failed.
    #[error("archive write failed: {0}")]
    Archive(#[from] std::io::Error),

    /// Another pipeline thread panicked while holding a shared lock.
    #[error("{0} lock poisoned by a panicked thread")]
    Poisoned(&'static str),

    /// The operator closed the render surface.
    #[error("render sink closed")]
    SinkClosed,
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub(crate) fn device(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::DeviceIo {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn codec(reason: impl Into<String>) -> Self {
        Self::CodecRoundTrip(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
