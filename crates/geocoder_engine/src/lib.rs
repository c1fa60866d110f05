//! Geocoder engine: transport, run driver and artifact persistence.
mod filename;
mod persist;
mod session;
mod transport;
mod types;

pub use filename::sanitize_filename;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use session::{NullSink, ProgressSink, Session, SessionUpdate};
pub use transport::{
    filename_from_disposition, stats_from_headers, ByteStream, ClientSettings, OneShotResponse,
    ReqwestTransport, TimerSettings, Transport, UploadRequest, DEFAULT_BASE_URL, STATS_HEADER,
    TIME_HEADER,
};
pub use types::{ClientError, FailureKind};
