use std::fmt;

/// How `WritableDatabase::open` treats what is already on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Tables must already exist.
    Open,
    /// Tables must not exist yet.
    Create,
    /// Open consistent tables, or create them if there are none.
    #[default]
    CreateOrOpen,
    /// Remove any existing tables and start again at revision 0.
    CreateOrOverwrite,
}

impl OpenMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Open => "open",
            OpenMode::Create => "create",
            OpenMode::CreateOrOpen => "create_or_open",
            OpenMode::CreateOrOverwrite => "create_or_overwrite",
        }
    }

    /// Whether a missing database directory may be created.
    pub fn may_create(&self) -> bool {
        !matches!(self, OpenMode::Open)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
