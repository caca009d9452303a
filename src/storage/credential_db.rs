use rusqlite::{OptionalExtension, Result as SqlResult, params};
use std::path::Path;

use super::database::Database;
use super::models::Credentials;

/// Token store read at start-up and wiped on logout
pub struct CredentialDatabase {
    db: Database,
}

impl CredentialDatabase {
    /// Open (or create) the credential database at `path`
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Self::init(Database::new(path)?)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::init(Database::in_memory()?)
    }

    fn init(db: Database) -> SqlResult<Self> {
        let store = Self { db };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> SqlResult<()> {
        self.db.connection().execute(
            "CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                user_id TEXT NOT NULL,
                token TEXT NOT NULL,
                saved_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )",
            [],
        )?;
        Ok(())
    }

    /// Save credentials (replace if exists)
    pub fn save(&self, credentials: &Credentials) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR REPLACE INTO credentials (id, user_id, token, saved_at)
             VALUES (1, ?1, ?2, ?3)",
            params![credentials.user_id, credentials.token, credentials.saved_at],
        )?;
        Ok(())
    }

    pub fn load(&self) -> SqlResult<Option<Credentials>> {
        self.db
            .connection()
            .query_row(
                "SELECT user_id, token, saved_at FROM credentials WHERE id = 1",
                [],
                |row| {
                    Ok(Credentials {
                        user_id: row.get(0)?,
                        token: row.get(1)?,
                        saved_at: row.get(2)?,
                    })
                },
            )
            .optional()
    }

    /// Returns true when a login was removed
    pub fn clear(&self) -> SqlResult<bool> {
        let removed = self
            .db
            .connection()
            .execute("DELETE FROM credentials WHERE id = 1", [])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_has_no_login() {
        let store = CredentialDatabase::in_memory().unwrap();
        assert_eq!(store.load().unwrap(), None);
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn save_replaces_previous_login() {
        let store = CredentialDatabase::in_memory().unwrap();
        store.save(&Credentials::new("u1", "first")).unwrap();
        store.save(&Credentials::new("u2", "second")).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.user_id, "u2");
        assert_eq!(loaded.token, "second");
    }

    #[test]
    fn clear_forgets_the_token() {
        let store = CredentialDatabase::in_memory().unwrap();
        store.save(&Credentials::new("u1", "t")).unwrap();
        assert!(store.clear().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.db");

        CredentialDatabase::with_path(&path)
            .unwrap()
            .save(&Credentials::new("u1", "t"))
            .unwrap();

        let reopened = CredentialDatabase::with_path(&path).unwrap();
        assert_eq!(reopened.load().unwrap().unwrap().user_id, "u1");
    }
}
