/// Outcome of geocoding a single spreadsheet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Found,
    NotFound,
}

/// Address fields echoed back by the server for one row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressFields {
    pub address: String,
    pub municipality: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    pub row: u64,
    pub status: RowStatus,
    pub fields: AddressFields,
    /// Server-side processed count at the time this row finished.
    pub processed: Option<u64>,
    pub total: Option<u64>,
}

/// Final counters reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStats {
    pub processed: u64,
    pub found: u64,
    pub not_found: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub stats: RunStats,
    pub elapsed_label: String,
    pub artifact_base64: Option<String>,
    pub filename: Option<String>,
}

/// Typed message decoded from one frame of the streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start { total: u64 },
    RowResult(RowResult),
    RowError { row: u64, message: String },
    Error { message: String },
    Complete(Completion),
}

impl Event {
    /// Wire discriminator, for logging without dumping payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::RowResult(_) => "progress",
            Event::RowError { .. } => "row_error",
            Event::Error { .. } => "error",
            Event::Complete(_) => "complete",
        }
    }
}
