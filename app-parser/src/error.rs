use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reading a package
#[derive(Error, Debug)]
pub enum Error {
    /// File extension is neither `.apk` nor `.ipa`
    #[error("unknown platform for extension {0:?}")]
    UnknownPlatform(String),

    #[error("AndroidManifest.xml not found")]
    ManifestMissing,

    #[error("Info.plist not found")]
    PlistMissing,

    /// Zip container could not be opened or an entry could not be read
    #[error("malformed archive: {0}")]
    MalformedArchive(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary XML, resource table, property list or PNG structure is corrupt
    #[error("malformed binary format: {0}")]
    MalformedBinaryFormat(String),

    /// No usable icon in the package. Never fatal for an extraction.
    #[error("icon not found")]
    NoIcon,

    #[error("png decode failed: {0}")]
    PngDecode(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn malformed(what: &str, err: impl std::fmt::Display) -> Self {
        Error::MalformedBinaryFormat(format!("{}: {}", what, err))
    }
}
