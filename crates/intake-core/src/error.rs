use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("No document loaded")]
    NoDocument,

    #[error("Page {page} is out of range (1-{page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Invalid field table: {0}")]
    InvalidFieldTable(String),

    #[error("Invalid zoom factor {zoom} (must be within 0-{max})")]
    InvalidZoom { zoom: f32, max: f32 },

    #[error("PDF engine error: {0}")]
    Engine(String),

    #[error("Render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, IntakeError>;
