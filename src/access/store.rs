//! Persisted access credentials: single-use invitations and the bearer
//! tokens they are exchanged for.

use crate::Result;
use crate::error::AccessError;
use chrono::{DateTime, Duration, Utc};
use miette::IntoDiagnostic;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Invitations are redeemable for this long after creation.
pub const INVITATION_TTL_HOURS: i64 = 24;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS invitations (
    id INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1,
    used_at TEXT,
    expires_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS api_keys (
    id INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL,
    invitation_id INTEGER NOT NULL UNIQUE REFERENCES invitations(id),
    token TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1,
    last_used TEXT
);
";

#[derive(Debug, Clone, serde::Serialize)]
pub struct Invitation {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenStore {
    conn: Mutex<Connection>,
}

impl TokenStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).into_diagnostic()?;
        }
        let conn = Connection::open(path).into_diagnostic()?;
        conn.execute_batch(SCHEMA).into_diagnostic()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("Token store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn create_invitation(&self) -> Result<Invitation> {
        let code = generate_token();
        let now = Utc::now();
        let expires_at = now + Duration::hours(INVITATION_TTL_HOURS);
        self.lock()
            .execute(
                "INSERT INTO invitations (created_at, code, active, expires_at) \
                 VALUES (?1, ?2, 1, ?3)",
                params![now, code, expires_at],
            )
            .into_diagnostic()?;
        debug!("issued invitation expiring at {expires_at}");
        Ok(Invitation { code, expires_at })
    }

    /// Exchange an unused, unexpired invitation for a bearer token. An
    /// expired invitation is deactivated as a side effect.
    pub fn redeem_invitation(&self, code: &str) -> std::result::Result<String, AccessError> {
        let conn = self.lock();
        let row: Option<(i64, bool, DateTime<Utc>)> = conn
            .query_row(
                "SELECT id, active, expires_at FROM invitations WHERE code = ?1",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|err| {
                error!("invitation lookup failed: {err}");
                AccessError::InvalidInvitation
            })?;
        let Some((id, active, expires_at)) = row else {
            return Err(AccessError::InvalidInvitation);
        };
        if !active {
            return Err(AccessError::InvitationUsed);
        }
        if expires_at < Utc::now() {
            let _ = conn.execute(
                "UPDATE invitations SET active = 0 WHERE id = ?1",
                params![id],
            );
            return Err(AccessError::InvitationExpired {
                expired_at: expires_at,
            });
        }

        let token = generate_token();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO api_keys (created_at, invitation_id, token, active) \
             VALUES (?1, ?2, ?3, 1)",
            params![now, id, token],
        )
        .map_err(|err| {
            error!("token insert failed: {err}");
            AccessError::InvalidInvitation
        })?;
        conn.execute(
            "UPDATE invitations SET active = 0, used_at = ?1 WHERE id = ?2",
            params![now, id],
        )
        .map_err(|err| {
            error!("invitation update failed: {err}");
            AccessError::InvalidInvitation
        })?;
        Ok(token)
    }

    /// Resolve a presented token. A match refreshes `last_used`.
    pub fn verify_token(&self, token: &str) -> bool {
        let conn = self.lock();
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM api_keys WHERE token = ?1 AND active = 1",
                params![token],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|err| {
                error!("token lookup failed: {err}");
                None
            });
        match id {
            Some(id) => {
                let _ = conn.execute(
                    "UPDATE api_keys SET last_used = ?1 WHERE id = ?2",
                    params![Utc::now(), id],
                );
                true
            }
            None => false,
        }
    }
}

fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
