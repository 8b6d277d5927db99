//! Error taxonomy for the fixture.
//!
//! Fatal conditions are surfaced through [`FixtureError`]; non-fatal
//! conditions (port fallback, overwrite skip, scope fallback) are reported
//! via `tracing::warn!` and never interrupt control flow.

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// The configured certificate file could not be loaded by the TLS stack.
    /// Raised at server construction; a server never starts with an
    /// unvalidated certificate.
    #[error(
        "the certificate {path:?} is not usable: {reason}; \
         use a working certificate or leave it unconfigured to get a generated one"
    )]
    InvalidCertificate {
        path: std::path::PathBuf,
        reason: String,
    },

    /// A facade operation received a value outside its whitelist.
    #[error("the argument `{name}` must be one of {expected}, the given value was '{given}'")]
    InvalidArgument {
        name: &'static str,
        given: String,
        expected: String,
    },

    /// A read or upload selection named a path that is not an existing
    /// regular file.
    #[error("{0} is not a valid file path or url to an actual file")]
    NoSuchFile(String),

    /// An upload spec was structurally broken (e.g. a mapping without a
    /// usable destination file name). Raised before any copying happens for
    /// that entry.
    #[error("malformed upload spec: {0}")]
    MalformedSpec(String),

    /// A TLS-only operation was invoked on a plaintext fixture.
    #[error("this fixture does not use TLS and has no certificate; spawn a TLS fixture instead")]
    WrongFixture,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FixtureError>;
