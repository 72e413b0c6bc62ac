//! Error types for manifest parsing, mode resolution and pillar rendering.

use thiserror::Error;

/// Errors arising from an invalid or unusable distro manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The YAML document could not be decoded.
    #[error("invalid manifest: {reason}")]
    Parse {
        /// Decoder message.
        reason: String,
    },

    /// The manifest has no `version` field.
    #[error("manifest is missing a schema version")]
    MissingSchemaVersion,

    /// The schema version is outside the accepted range.
    #[error("unsupported manifest version {value}; current maximum is {max}")]
    UnsupportedSchemaVersion {
        /// The rejected version number.
        value: u32,
        /// The highest version this build understands.
        max: u32,
    },

    /// More than one mode is flagged as the default.
    #[error("manifest declares more than one default mode: {first}, {second}")]
    MultipleDefaultModes {
        /// First default mode encountered.
        first: String,
        /// Second default mode encountered.
        second: String,
    },

    /// The requested mode does not exist, or no default is declared.
    #[error("unable to resolve state from mode: {mode}")]
    UnknownMode {
        /// The mode that was requested.
        mode: String,
    },

    /// A pillar template is syntactically invalid.
    #[error("invalid template for pillar {pillar}: {reason}")]
    TemplateSyntax {
        /// Pillar key holding the template.
        pillar: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A pillar template references a field with no value.
    #[error("pillar {pillar} references undefined field .{field}")]
    TemplateUndefinedField {
        /// Pillar key holding the template.
        pillar: String,
        /// The missing field name.
        field: String,
    },
}

/// Result type alias using [`ManifestError`].
pub type Result<T> = std::result::Result<T, ManifestError>;
