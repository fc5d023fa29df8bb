//! SQLite-backed installation storage.
//!
//! One evolving row per (user, provider). Token columns only ever receive
//! ciphertext produced by the encryption service; this module never sees
//! plaintext tokens.

use super::{Installation, Provider};
use crate::auth::User;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::{rngs::OsRng, RngCore};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Size of a state token in random bytes
const STATE_BYTES: usize = 32;

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, organization_id, provider,
           state, state_created_at, redirect_uri,
           access_token_enc, refresh_token_enc,
           token_type, scope, access_token_expiration,
           create_date, update_date, delete_date
    FROM oauth_credentials
"#;

/// Generates an unguessable, URL-safe state token.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Installation storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE oauth_credentials (
///     id TEXT PRIMARY KEY,                 -- UUID v4
///     user_id TEXT NOT NULL,
///     organization_id TEXT,
///     provider TEXT NOT NULL,              -- "slack" | "sid"
///     state TEXT UNIQUE,                   -- NULL once consumed
///     state_created_at TEXT,
///     redirect_uri TEXT NOT NULL,
///     access_token_enc TEXT,               -- Ciphertext
///     refresh_token_enc TEXT,              -- Ciphertext
///     token_type TEXT,
///     scope TEXT,
///     access_token_expiration TEXT,
///     create_date TEXT NOT NULL,
///     update_date TEXT NOT NULL,
///     delete_date TEXT                     -- Soft-delete marker
/// );
/// ```
///
/// Lookups ignore soft-deleted rows unless the method says otherwise.
///
/// # Thread Safety
/// - Connection is wrapped in a Mutex, never held across an await point
pub struct InstallationStore {
    conn: Mutex<Connection>,
}

impl InstallationStore {
    /// Creates or opens an installation store.
    ///
    /// Pass `":memory:"` for a throwaway database.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_credentials (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                organization_id TEXT,
                provider TEXT NOT NULL,
                state TEXT UNIQUE,
                state_created_at TEXT,
                redirect_uri TEXT NOT NULL,
                access_token_enc TEXT,
                refresh_token_enc TEXT,
                token_type TEXT,
                scope TEXT,
                access_token_expiration TEXT,
                create_date TEXT NOT NULL,
                update_date TEXT NOT NULL,
                delete_date TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_user_provider
                ON oauth_credentials(user_id, provider);
            CREATE INDEX IF NOT EXISTS idx_organization_provider
                ON oauth_credentials(organization_id, provider);
            "#,
        )
        .context("Failed to create oauth_credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Installation store lock poisoned"))
    }

    /// Starts (or restarts) an installation for a user.
    ///
    /// Reuses the user's active row for this provider when one exists, giving
    /// it a fresh state and the new redirect URI. Otherwise inserts a pending
    /// row.
    pub fn create_installation(
        &self,
        user: &User,
        provider: Provider,
        redirect_uri: &str,
    ) -> Result<Installation> {
        let conn = self.conn()?;

        let existing = query_one(
            &conn,
            "WHERE user_id = ?1 AND provider = ?2 AND delete_date IS NULL
             ORDER BY update_date DESC LIMIT 1",
            params![user.id, provider.as_str()],
        )?;

        if let Some(mut installation) = existing {
            issue_state(&mut installation);
            installation.redirect_uri = redirect_uri.to_string();
            installation.organization_id = user.organization_id.clone();
            write_row(&conn, &mut installation)?;
            return Ok(installation);
        }

        let now = Utc::now();
        let mut installation = Installation {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            organization_id: user.organization_id.clone(),
            provider,
            state: Some(generate_state()),
            state_created_at: Some(now),
            redirect_uri: redirect_uri.to_string(),
            access_token_enc: None,
            refresh_token_enc: None,
            token_type: None,
            scope: None,
            access_token_expiration: None,
            create_date: now,
            update_date: now,
            delete_date: None,
        };

        conn.execute(
            "INSERT INTO oauth_credentials (id, user_id, provider, redirect_uri, create_date, update_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                installation.id,
                installation.user_id,
                provider.as_str(),
                installation.redirect_uri,
                timestamp(&now),
            ],
        )
        .context("Failed to insert installation")?;
        write_row(&conn, &mut installation)?;

        Ok(installation)
    }

    /// Consumes a pending state in one step.
    ///
    /// Returns the installation only if `state` belongs to an active row for
    /// `provider` issued at or after `issued_after`; that row's state is
    /// cleared before returning, so a second call with the same state gets
    /// `None`. Rejected states leave the row untouched.
    pub fn take_pending(
        &self,
        state: &str,
        provider: Provider,
        issued_after: DateTime<Utc>,
    ) -> Result<Option<Installation>> {
        let conn = self.conn()?;

        let Some(mut installation) = query_one(
            &conn,
            "WHERE state = ?1 AND provider = ?2 AND delete_date IS NULL
               AND state_created_at >= ?3",
            params![state, provider.as_str(), timestamp(&issued_after)],
        )?
        else {
            return Ok(None);
        };

        installation.state = None;
        installation.state_created_at = None;
        installation.update_date = Utc::now();

        let rows_affected = conn
            .execute(
                "UPDATE oauth_credentials
                 SET state = NULL, state_created_at = NULL, update_date = ?3
                 WHERE id = ?1 AND state = ?2",
                params![installation.id, state, timestamp(&installation.update_date)],
            )
            .context("Failed to consume installation state")?;

        Ok((rows_affected == 1).then_some(installation))
    }

    /// Writes the token columns of a completed installation.
    ///
    /// Only touches a row that is still active: returns `false` when the
    /// installation was soft-deleted after its state was taken.
    pub fn complete_installation(&self, installation: &mut Installation) -> Result<bool> {
        installation.update_date = Utc::now();

        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                r#"
                UPDATE oauth_credentials SET
                    access_token_enc = ?2,
                    refresh_token_enc = ?3,
                    token_type = ?4,
                    scope = ?5,
                    access_token_expiration = ?6,
                    update_date = ?7
                WHERE id = ?1 AND delete_date IS NULL
                "#,
                params![
                    installation.id,
                    installation.access_token_enc,
                    installation.refresh_token_enc,
                    installation.token_type,
                    installation.scope,
                    installation.access_token_expiration.as_ref().map(timestamp),
                    timestamp(&installation.update_date),
                ],
            )
            .context("Failed to complete installation")?;

        Ok(rows_affected == 1)
    }

    /// Looks up the pending installation a callback's state refers to.
    pub fn get_installation_by_state(&self, state: &str) -> Result<Option<Installation>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            "WHERE state = ?1 AND delete_date IS NULL",
            params![state],
        )
    }

    pub fn get_installation_by_user_id(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Installation>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            "WHERE user_id = ?1 AND provider = ?2 AND delete_date IS NULL
             ORDER BY update_date DESC LIMIT 1",
            params![user_id, provider.as_str()],
        )
    }

    /// Most recently updated installation of an organization that holds a token.
    ///
    /// Pending installs started by other members never shadow a working one.
    pub fn get_installation_by_organization_id(
        &self,
        organization_id: &str,
        provider: Provider,
    ) -> Result<Option<Installation>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            "WHERE organization_id = ?1 AND provider = ?2 AND delete_date IS NULL
               AND access_token_enc IS NOT NULL AND access_token_enc != ''
             ORDER BY update_date DESC LIMIT 1",
            params![organization_id, provider.as_str()],
        )
    }

    /// Newest soft-deleted installation for a user, if any.
    pub fn get_deleted_installation(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Installation>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            "WHERE user_id = ?1 AND provider = ?2 AND delete_date IS NOT NULL
             ORDER BY delete_date DESC LIMIT 1",
            params![user_id, provider.as_str()],
        )
    }

    /// Persists every mutable column and bumps `update_date`.
    pub fn save(&self, installation: &mut Installation) -> Result<()> {
        let conn = self.conn()?;
        write_row(&conn, installation)
    }

    /// Soft-deletes an installation: clears tokens and state, sets `delete_date`.
    ///
    /// Only the cleared columns are written, so concurrent changes to other
    /// columns are not reverted.
    pub fn delete(&self, installation: &mut Installation) -> Result<()> {
        let now = Utc::now();
        installation.access_token_enc = None;
        installation.refresh_token_enc = None;
        installation.access_token_expiration = None;
        installation.state = None;
        installation.state_created_at = None;
        installation.delete_date = Some(now);
        installation.update_date = now;

        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE oauth_credentials SET
                access_token_enc = NULL,
                refresh_token_enc = NULL,
                access_token_expiration = NULL,
                state = NULL,
                state_created_at = NULL,
                update_date = ?2,
                delete_date = COALESCE(delete_date, ?2)
            WHERE id = ?1
            "#,
            params![installation.id, timestamp(&now)],
        )
        .context("Failed to delete installation")?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn count_rows(&self, user_id: &str, provider: Provider) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM oauth_credentials WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count installations")?;

        Ok(count as usize)
    }
}

/// Assigns a fresh state token to an installation.
pub(crate) fn issue_state(installation: &mut Installation) {
    installation.state = Some(generate_state());
    installation.state_created_at = Some(Utc::now());
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: Option<String>, column: &str) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .with_context(|| format!("Failed to parse {} timestamp", column))
}

fn write_row(conn: &Connection, installation: &mut Installation) -> Result<()> {
    installation.update_date = Utc::now();

    let rows_affected = conn
        .execute(
            r#"
            UPDATE oauth_credentials SET
                organization_id = ?2,
                state = ?3,
                state_created_at = ?4,
                redirect_uri = ?5,
                access_token_enc = ?6,
                refresh_token_enc = ?7,
                token_type = ?8,
                scope = ?9,
                access_token_expiration = ?10,
                update_date = ?11,
                delete_date = ?12
            WHERE id = ?1
            "#,
            params![
                installation.id,
                installation.organization_id,
                installation.state,
                installation.state_created_at.as_ref().map(timestamp),
                installation.redirect_uri,
                installation.access_token_enc,
                installation.refresh_token_enc,
                installation.token_type,
                installation.scope,
                installation.access_token_expiration.as_ref().map(timestamp),
                timestamp(&installation.update_date),
                installation.delete_date.as_ref().map(timestamp),
            ],
        )
        .context("Failed to save installation")?;

    if rows_affected == 0 {
        return Err(anyhow!("Installation {} does not exist", installation.id));
    }

    Ok(())
}

/// Raw column values, converted after the row borrow ends.
struct RawInstallation {
    id: String,
    user_id: String,
    organization_id: Option<String>,
    provider: String,
    state: Option<String>,
    state_created_at: Option<String>,
    redirect_uri: String,
    access_token_enc: Option<String>,
    refresh_token_enc: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    access_token_expiration: Option<String>,
    create_date: String,
    update_date: String,
    delete_date: Option<String>,
}

impl RawInstallation {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            organization_id: row.get(2)?,
            provider: row.get(3)?,
            state: row.get(4)?,
            state_created_at: row.get(5)?,
            redirect_uri: row.get(6)?,
            access_token_enc: row.get(7)?,
            refresh_token_enc: row.get(8)?,
            token_type: row.get(9)?,
            scope: row.get(10)?,
            access_token_expiration: row.get(11)?,
            create_date: row.get(12)?,
            update_date: row.get(13)?,
            delete_date: row.get(14)?,
        })
    }

    fn into_installation(self) -> Result<Installation> {
        let provider = self
            .provider
            .parse::<Provider>()
            .with_context(|| format!("Installation {} has an unknown provider", self.id))?;

        let create_date = parse_timestamp(Some(self.create_date), "create_date")?
            .ok_or_else(|| anyhow!("Missing create_date"))?;
        let update_date = parse_timestamp(Some(self.update_date), "update_date")?
            .ok_or_else(|| anyhow!("Missing update_date"))?;

        Ok(Installation {
            id: self.id,
            user_id: self.user_id,
            organization_id: self.organization_id,
            provider,
            state: self.state,
            state_created_at: parse_timestamp(self.state_created_at, "state_created_at")?,
            redirect_uri: self.redirect_uri,
            access_token_enc: self.access_token_enc,
            refresh_token_enc: self.refresh_token_enc,
            token_type: self.token_type,
            scope: self.scope,
            access_token_expiration: parse_timestamp(
                self.access_token_expiration,
                "access_token_expiration",
            )?,
            create_date,
            update_date,
            delete_date: parse_timestamp(self.delete_date, "delete_date")?,
        })
    }
}

fn query_one(
    conn: &Connection,
    clause: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Option<Installation>> {
    let sql = format!("{} {}", SELECT_COLUMNS, clause);

    let raw = conn
        .query_row(&sql, params, RawInstallation::from_row)
        .optional()
        .context("Failed to query installation")?;

    raw.map(RawInstallation::into_installation).transpose()
}
