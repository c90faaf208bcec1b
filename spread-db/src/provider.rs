// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

use spread_db_engine::Db;

use crate::read::ReadDb;
use crate::write::WriteDb;

/// A read facade and a write facade, handed to application code together.
///
/// Opening the handles is the engine's job, directly or through
/// [`Config::open`](spread_db_engine::Config::open):
///
/// ```
/// use spread_db::Provider;
/// use spread_db::engine::Config;
///
/// let config = Config::parse("[write]\nmemory = \"provider_doc\"\n")?;
/// let (read, write) = config.open()?;
/// let provider = Provider::new(read, write);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug)]
pub struct Provider {
    pub read: ReadDb,
    pub write: WriteDb,
}

impl Provider {
    /// Wrap two open handles. Nothing is checked or executed.
    pub fn new(read: Db, write: Db) -> Self {
        Self {
            read: ReadDb::new(read),
            write: WriteDb::new(write),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::ReadOnly;

    #[test]
    fn test_new_marks_read_handle() {
        let db = Db::open_memory("provider_new").unwrap();
        let provider = Provider::new(db.clone(), db);
        let out = provider
            .read
            .raw("CREATE TABLE t (x INTEGER)")
            .row();
        assert!(matches!(
            out.err(),
            Some(spread_db_engine::Error::ReadOnly(_))
        ));
        assert!(!provider.write.statement().is_debug());
    }

    #[test]
    fn test_new_keeps_handle_settings() {
        let db = Db::open_memory("provider_settings").unwrap();
        let provider = Provider::new(db.debug(), db.clone());
        assert!(provider.read.statement().is_debug());
        assert!(!provider.write.statement().is_debug());
    }
}
