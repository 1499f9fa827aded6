//! Initialization-time configuration errors.
//!
//! Request handling never fails; every problem a request could hit is either
//! degraded into a fallback decision or rejected here, before the first request.

/// A configuration that cannot safely serve requests.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field the default settings must define was left unset.
    #[error("default settings leave `{0}` unset")]
    MissingDefault(&'static str),

    /// The default provider list is empty, so fallbacks would have nothing to answer with.
    #[error("default settings must list at least one provider")]
    NoDefaultProviders,

    /// A provider alias is referenced but never defined in the provider table.
    #[error("{context} references unknown provider `{alias}`")]
    UnknownProvider { context: String, alias: String },

    /// A numeric setting is outside its accepted range.
    #[error("{context}: `{field}` = {value} is out of range")]
    OutOfRange {
        context: String,
        field: &'static str,
        value: f64,
    },
}
