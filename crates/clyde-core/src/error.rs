//! Error codes shared across Clyde components.
//!
//! Each error raised anywhere in the pipeline carries a stable code
//! (e.g. E0302) so diagnostics can be searched and referenced. The codes are
//! grouped by component; the process exit code for a failure is derived from
//! its error code.

use std::fmt;

/// Error codes for Clyde errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Version & constraint errors (E01xx)
    /// Invalid version string
    E0101,
    /// Invalid constraint string
    E0102,

    // Manifest errors (E02xx)
    /// Manifest syntax error
    E0201,
    /// Missing required field
    E0202,
    /// Unknown package type
    E0203,
    /// Unknown language
    E0204,
    /// Malformed requirement constraint
    E0205,
    /// Invalid package name
    E0206,
    /// Manifest file not found
    E0207,

    // Resolver errors (E03xx)
    /// No compatible version
    E0301,
    /// Conflicting version requirements
    E0302,
    /// Circular dependency detected
    E0303,
    /// Package fetch failed
    E0304,

    // Planner errors (E04xx)
    /// Source globs matched nothing
    E0401,
    /// Missing include directory
    E0402,
    /// Unsupported compiler family
    E0403,
    /// Planner filesystem failure
    E0404,
    /// Invalid source glob
    E0405,

    // Cache errors (E05xx)
    /// Cache read failure
    E0501,
    /// Cache write failure
    E0502,
    /// Corrupt cache entry
    E0503,
    /// Cache lock contention
    E0504,

    // Toolchain errors (E06xx)
    /// Compiler probe failed
    E0601,
    /// Compiler executable missing
    E0602,
    /// Child process terminated by signal
    E0603,

    // Build errors (E07xx)
    /// Compilation failed
    E0701,
    /// Link failed
    E0702,
    /// Step timed out
    E0703,
    /// Build cancelled
    E0704,
    /// Critical hook failed
    E0705,
}

impl ErrorCode {
    /// String representation of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::E0101 => "E0101",
            Self::E0102 => "E0102",
            Self::E0201 => "E0201",
            Self::E0202 => "E0202",
            Self::E0203 => "E0203",
            Self::E0204 => "E0204",
            Self::E0205 => "E0205",
            Self::E0206 => "E0206",
            Self::E0207 => "E0207",
            Self::E0301 => "E0301",
            Self::E0302 => "E0302",
            Self::E0303 => "E0303",
            Self::E0304 => "E0304",
            Self::E0401 => "E0401",
            Self::E0402 => "E0402",
            Self::E0403 => "E0403",
            Self::E0404 => "E0404",
            Self::E0405 => "E0405",
            Self::E0501 => "E0501",
            Self::E0502 => "E0502",
            Self::E0503 => "E0503",
            Self::E0504 => "E0504",
            Self::E0601 => "E0601",
            Self::E0602 => "E0602",
            Self::E0603 => "E0603",
            Self::E0701 => "E0701",
            Self::E0702 => "E0702",
            Self::E0703 => "E0703",
            Self::E0704 => "E0704",
            Self::E0705 => "E0705",
        }
    }

    /// Brief title for this error code.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::E0101 => "Invalid version",
            Self::E0102 => "Invalid constraint",
            Self::E0201 => "Manifest syntax error",
            Self::E0202 => "Missing required field",
            Self::E0203 => "Unknown package type",
            Self::E0204 => "Unknown language",
            Self::E0205 => "Malformed constraint",
            Self::E0206 => "Invalid package name",
            Self::E0207 => "Manifest not found",
            Self::E0301 => "No compatible version",
            Self::E0302 => "Conflicting versions",
            Self::E0303 => "Circular dependency",
            Self::E0304 => "Fetch failed",
            Self::E0401 => "Empty sources",
            Self::E0402 => "Missing include directory",
            Self::E0403 => "Unsupported compiler family",
            Self::E0404 => "Planner filesystem failure",
            Self::E0405 => "Invalid source glob",
            Self::E0501 => "Cache read failure",
            Self::E0502 => "Cache write failure",
            Self::E0503 => "Corrupt cache entry",
            Self::E0504 => "Cache locked",
            Self::E0601 => "Probe failed",
            Self::E0602 => "Compiler missing",
            Self::E0603 => "Killed by signal",
            Self::E0701 => "Compilation failed",
            Self::E0702 => "Link failed",
            Self::E0703 => "Step timed out",
            Self::E0704 => "Build cancelled",
            Self::E0705 => "Critical hook failed",
        }
    }

    /// Process exit code when the core is driven as a tool.
    ///
    /// 0 success, 1 generic failure, 2 invalid manifest or arguments,
    /// 3 build failure, 4 resolver failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::E0101
            | Self::E0102
            | Self::E0201
            | Self::E0202
            | Self::E0203
            | Self::E0204
            | Self::E0205
            | Self::E0206
            | Self::E0207 => 2,
            Self::E0301 | Self::E0302 | Self::E0303 | Self::E0304 => 4,
            Self::E0601 | Self::E0602 | Self::E0603 | Self::E0701 | Self::E0702 | Self::E0703 => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
