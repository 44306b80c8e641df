use std::fmt;

/// Build version, with the git revision when the build provides one through
/// `FLYWHEEL_GIT_COMMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: &'static str,
    pub revision: Option<&'static str>,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            revision: option_env!("FLYWHEEL_GIT_COMMIT").filter(|rev| !rev.is_empty()),
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flywheel v{}", self.version)?;
        if let Some(rev) = self.revision {
            write!(f, " ({rev})")?;
        }
        Ok(())
    }
}
