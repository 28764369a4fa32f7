use thiserror::Error;

#[derive(Debug, Error)]
pub enum XlsxError {
    /// The input is not a readable ZIP container.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("duplicate part in archive: {0}")]
    DuplicatePart(String),
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("missing required attribute: {0}")]
    MissingAttr(&'static str),
    #[error("worksheet {sheet:?} not found (available: {})", available.join(", "))]
    SheetNotFound {
        sheet: String,
        available: Vec<String>,
    },
    #[error("section {section:?} not found in worksheet {sheet:?}")]
    SectionNotFound { sheet: String, section: String },
    #[error("could not patch {part}: {message}")]
    PatchParseFailure { part: String, message: String },
    #[error("verification failed: {0}")]
    VerificationFailure(String),
    #[error("backup failed: {0}")]
    Backup(#[source] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl XlsxError {
    /// Errors after which no document bytes may be produced.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, XlsxError::PatchParseFailure { .. })
    }
}
