/// Spreadsheet extensions the server accepts.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = [".xlsx", ".xls", ".xlsm"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
    #[error("`{name}` is not a spreadsheet (expected .xlsx, .xls or .xlsm)")]
    UnsupportedExtension { name: String },
}

/// Checks the file name suffix only; the content is never sniffed.
pub fn validate_input_name(name: &str) -> Result<(), InputError> {
    let lower = name.trim().to_ascii_lowercase();
    if ACCEPTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        Ok(())
    } else {
        Err(InputError::UnsupportedExtension {
            name: name.to_string(),
        })
    }
}
