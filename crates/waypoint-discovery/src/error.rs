//! Error types for the discovery crate.

/// Errors reported by discovery sources.
///
/// Cloneable because a map keeps the last one as its sticky error and hands
/// a copy to every caller until a good snapshot supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The underlying watch failed (API error, lost connection, ...).
    #[error("watch failed: {0}")]
    Watch(String),

    /// A service specifier could not be parsed.
    #[error("invalid service specifier {spec:?}: {reason}")]
    InvalidSpec {
        /// The specifier as given.
        spec: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The consumer of the snapshot queue has gone away.
    #[error("snapshot queue closed")]
    Closed,
}
