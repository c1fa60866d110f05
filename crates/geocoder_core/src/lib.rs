//! Geocoder core: frame decoding, event parsing and the pure run state machine.
mod artifact;
mod effect;
mod estimator;
mod event;
mod frame;
mod input;
mod msg;
mod parse;
mod state;
mod update;
mod view_model;

pub use artifact::{
    Artifact, ArtifactError, ArtifactId, DEFAULT_ARTIFACT_FILENAME, XLSX_CONTENT_TYPE,
};
pub use effect::Effect;
pub use estimator::{ProgressEstimator, ESTIMATE_CEILING};
pub use event::{AddressFields, Completion, Event, RowResult, RowStatus, RunStats};
pub use frame::{Frame, FrameDecoder, FRAME_PREFIX};
pub use input::{validate_input_name, InputError, ACCEPTED_EXTENSIONS};
pub use msg::Msg;
pub use parse::{derive_percent, parse_frame, parse_payload, ParseError, WireStats};
pub use state::{LogEntry, LogKind, Phase, ProcessingState, RunId, RunMode, RunSummary};
pub use update::update;
pub use view_model::{format_elapsed, ArtifactView, ProgressView};
