use thiserror::Error;

/// Errors reported by height field construction and coarse tree queries.
///
/// A ray that misses is not an error; ray casts report that through an empty result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeightFieldError {
    /// A build-time parameter would produce a degenerate grid or coarse tree.
    #[error("invalid height field configuration: {reason}")]
    InvalidConfiguration {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// A coarse tree query addressed a level or block that does not exist.
    #[error("coarse min/max query out of bounds: level {level}, block ({x}, {z})")]
    OutOfBounds {
        /// Requested level.
        level: i32,
        /// Requested block x coordinate.
        x: i32,
        /// Requested block z coordinate.
        z: i32,
    },
}

impl HeightFieldError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HeightFieldError>;
