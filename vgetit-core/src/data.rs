use crate::error::{CoreError, Result};
use crate::keys::{FALLBACK_SLUG, slugify};
use crate::model::{Address, ApplyOutcome, Contact, PhoneNumber, Rating, Target, TargetDetails};
use crate::phone::is_verified_phone;
use crate::scoring::{ScoreInputs, compute_score};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use vgetit_scanner::{Confidence, ContactEntry, Extraction};

/// Durable store for targets, their facts, ratings and scrape jobs.
///
/// Every method that changes an address, phone number, contact or rating
/// re-derives the owning target's score before returning.
pub struct Database {
    pub(crate) conn: Connection,
}

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

const TARGET_COLUMNS: &str =
    "id, key, name, slug, processed, social_urls, score, created_at, updated_at";

fn target_from_row(row: &Row) -> rusqlite::Result<Target> {
    let socials: String = row.get(5)?;
    let social_urls = serde_json::from_str(&socials).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Target {
        id: row.get(0)?,
        key: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        processed: row.get(4)?,
        social_urls,
        score: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        updated_at: from_millis(row.get(8)?),
    })
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
-- Directory entries, keyed by normalized hostname
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL DEFAULT '',
    slug TEXT NOT NULL UNIQUE CHECK(slug <> ''),
    processed BOOLEAN NOT NULL DEFAULT 0,
    social_urls TEXT NOT NULL DEFAULT '[]',  -- JSON array
    score REAL NOT NULL DEFAULT 0 CHECK(score BETWEEN 0 AND 5),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- One address per target, owned by it
CREATE TABLE IF NOT EXISTS addresses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL UNIQUE,
    address TEXT NOT NULL DEFAULT '',
    verified BOOLEAN NOT NULL DEFAULT 0,
    FOREIGN KEY(target_id) REFERENCES targets(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS phone_numbers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    number TEXT NOT NULL,
    verified BOOLEAN NOT NULL DEFAULT 0,
    description TEXT,
    FOREIGN KEY(target_id) REFERENCES targets(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_phone_numbers_target ON phone_numbers(target_id);

CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    verified_profile BOOLEAN NOT NULL DEFAULT 0,
    level TEXT NOT NULL DEFAULT '',
    google_link TEXT,
    linkedin_link TEXT,
    FOREIGN KEY(target_id) REFERENCES targets(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_contacts_target ON contacts(target_id);

CREATE TABLE IF NOT EXISTS ratings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL,
    rater TEXT NOT NULL,
    value INTEGER NOT NULL CHECK(value BETWEEN 1 AND 5),
    note TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    FOREIGN KEY(target_id) REFERENCES targets(id) ON DELETE CASCADE,
    UNIQUE(target_id, rater)
);

CREATE INDEX IF NOT EXISTS idx_ratings_target ON ratings(target_id);

-- Scrape jobs are kept after they finish, one row per key
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL CHECK(status IN ('pending', 'processing', 'completed', 'failed')),
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_executed_at INTEGER,
    counted_at INTEGER,  -- start of the last attempt that did not fail
    error_message TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at, id);
CREATE INDEX IF NOT EXISTS idx_jobs_counted ON jobs(counted_at);
            ",
        )?;
        Ok(())
    }

    // Target lookups
    pub fn get_target(&self, key: &str) -> Result<Option<Target>> {
        let sql = format!("SELECT {} FROM targets WHERE key = ?1", TARGET_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![key], target_from_row)
            .optional()?)
    }

    pub fn get_target_by_slug(&self, slug: &str) -> Result<Option<Target>> {
        let sql = format!("SELECT {} FROM targets WHERE slug = ?1", TARGET_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![slug], target_from_row)
            .optional()?)
    }

    pub fn target_details(&self, key: &str) -> Result<Option<TargetDetails>> {
        let Some(target) = self.get_target(key)? else {
            return Ok(None);
        };
        let id = target.id;

        let address = self
            .conn
            .query_row(
                "SELECT id, target_id, address, verified FROM addresses WHERE target_id = ?1",
                params![id],
                |row| {
                    Ok(Address {
                        id: row.get(0)?,
                        target_id: row.get(1)?,
                        address: row.get(2)?,
                        verified: row.get(3)?,
                    })
                },
            )
            .optional()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, number, verified, description
             FROM phone_numbers WHERE target_id = ?1 ORDER BY id",
        )?;
        let phone_numbers = stmt
            .query_map(params![id], |row| {
                Ok(PhoneNumber {
                    id: row.get(0)?,
                    target_id: row.get(1)?,
                    number: row.get(2)?,
                    verified: row.get(3)?,
                    description: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, name, verified_profile, level, google_link, linkedin_link
             FROM contacts WHERE target_id = ?1 ORDER BY id",
        )?;
        let contacts = stmt
            .query_map(params![id], |row| {
                Ok(Contact {
                    id: row.get(0)?,
                    target_id: row.get(1)?,
                    name: row.get(2)?,
                    verified_profile: row.get(3)?,
                    level: row.get(4)?,
                    google_link: row.get(5)?,
                    linkedin_link: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let ratings = self.ratings_for(id)?;

        Ok(Some(TargetDetails {
            target,
            address,
            phone_numbers,
            contacts,
            ratings,
        }))
    }

    fn ratings_for(&self, target_id: i64) -> Result<Vec<Rating>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, rater, value, note, created_at
             FROM ratings WHERE target_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let ratings = stmt
            .query_map(params![target_id], |row| {
                Ok(Rating {
                    id: row.get(0)?,
                    target_id: row.get(1)?,
                    rater: row.get(2)?,
                    value: row.get::<_, i64>(3)? as u8,
                    note: row.get(4)?,
                    created_at: from_millis(row.get(5)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ratings)
    }

    fn require_target_id(&self, key: &str) -> Result<i64> {
        self.conn
            .query_row("SELECT id FROM targets WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| CoreError::UnknownTarget(key.to_string()))
    }

    // Target lifecycle

    /// Insert an unprocessed target for `key`, or return the existing one.
    pub fn create_placeholder_target(&mut self, key: &str) -> Result<Target> {
        if let Some(existing) = self.get_target(key)? {
            return Ok(existing);
        }

        let now = to_millis(Utc::now());
        let tx = self.conn.transaction()?;
        let slug = unique_slug(&tx, key)?;
        tx.execute(
            "INSERT INTO targets (key, slug, processed, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![key, slug, now],
        )?;
        tx.commit()?;

        debug!(key, slug = %slug, "Created placeholder target");
        self.get_target(key)?
            .ok_or_else(|| CoreError::UnknownTarget(key.to_string()))
    }

    /// Delete a target and everything it owns. Returns whether it existed.
    pub fn delete_target(&mut self, key: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM targets WHERE key = ?1", params![key])?;
        if deleted > 0 {
            info!(key, "Deleted target");
        }
        Ok(deleted > 0)
    }

    /// Write an extraction into the store, replacing the target's address,
    /// phone numbers and contacts wholesale.
    ///
    /// A bundle without a name is unusable: the target is removed instead.
    pub fn apply_extraction(&mut self, key: &str, extraction: &Extraction) -> Result<ApplyOutcome> {
        let bundle = &extraction.bundle;

        if !bundle.has_name() {
            self.delete_target(key)?;
            return Ok(ApplyOutcome::NoData);
        }

        let now = to_millis(Utc::now());
        let socials = serde_json::to_string(&bundle.socials)
            .map_err(|e| CoreError::Corrupt(format!("social links for {}: {}", key, e)))?;

        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM targets WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        let target_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE targets SET name = ?1, social_urls = ?2, processed = 1, updated_at = ?3
                     WHERE id = ?4",
                    params![bundle.name, socials, now, id],
                )?;
                id
            }
            None => {
                let slug = unique_slug(&tx, key)?;
                tx.execute(
                    "INSERT INTO targets (key, name, slug, processed, social_urls, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5)",
                    params![key, bundle.name, slug, socials, now],
                )?;
                tx.last_insert_rowid()
            }
        };

        let address_verified =
            extraction.confidence == Confidence::High && !bundle.address.trim().is_empty();
        tx.execute("DELETE FROM addresses WHERE target_id = ?1", params![target_id])?;
        tx.execute(
            "INSERT INTO addresses (target_id, address, verified) VALUES (?1, ?2, ?3)",
            params![target_id, bundle.address, address_verified],
        )?;

        tx.execute(
            "DELETE FROM phone_numbers WHERE target_id = ?1",
            params![target_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO phone_numbers (target_id, number, verified, description)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for phone in bundle.phone_numbers.iter().filter(|p| !p.number.is_empty()) {
                insert.execute(params![
                    target_id,
                    phone.number,
                    is_verified_phone(&phone.number),
                    phone.description,
                ])?;
            }
        }

        tx.execute("DELETE FROM contacts WHERE target_id = ?1", params![target_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO contacts (target_id, name, verified_profile, level, google_link, linkedin_link)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for contact in &bundle.listed_contacts {
                insert.execute(params![
                    target_id,
                    contact.name,
                    contact.verified_profile,
                    contact.level,
                    contact.google_link,
                    contact.linkedin_link,
                ])?;
            }
        }

        let score = recompute_score_in(&tx, target_id)?;
        tx.commit()?;

        info!(
            key,
            phones = bundle.phone_numbers.len(),
            contacts = bundle.listed_contacts.len(),
            confidence = extraction.confidence.as_str(),
            score,
            "Applied extraction"
        );
        Ok(ApplyOutcome::Applied { target_id })
    }

    // Fact mutations, each followed by a score recompute

    pub fn set_address(&mut self, key: &str, address: &str, verified: bool) -> Result<f64> {
        let target_id = self.require_target_id(key)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO addresses (target_id, address, verified) VALUES (?1, ?2, ?3)
             ON CONFLICT(target_id) DO UPDATE SET address = excluded.address, verified = excluded.verified",
            params![target_id, address, verified],
        )?;
        let score = recompute_score_in(&tx, target_id)?;
        tx.commit()?;
        Ok(score)
    }

    /// Add a phone number; its verified flag comes from the phone grammar.
    pub fn add_phone_number(
        &mut self,
        key: &str,
        number: &str,
        description: Option<&str>,
    ) -> Result<PhoneNumber> {
        let target_id = self.require_target_id(key)?;
        let number = number.trim();
        let verified = is_verified_phone(number);

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO phone_numbers (target_id, number, verified, description) VALUES (?1, ?2, ?3, ?4)",
            params![target_id, number, verified, description],
        )?;
        let id = tx.last_insert_rowid();
        recompute_score_in(&tx, target_id)?;
        tx.commit()?;

        Ok(PhoneNumber {
            id,
            target_id,
            number: number.to_string(),
            verified,
            description: description.map(str::to_string),
        })
    }

    pub fn delete_phone_number(&mut self, id: i64) -> Result<bool> {
        self.delete_child("phone_numbers", id)
    }

    pub fn add_contact(&mut self, key: &str, contact: &ContactEntry) -> Result<Contact> {
        let target_id = self.require_target_id(key)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO contacts (target_id, name, verified_profile, level, google_link, linkedin_link)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                target_id,
                contact.name,
                contact.verified_profile,
                contact.level,
                contact.google_link,
                contact.linkedin_link,
            ],
        )?;
        let id = tx.last_insert_rowid();
        recompute_score_in(&tx, target_id)?;
        tx.commit()?;

        Ok(Contact {
            id,
            target_id,
            name: contact.name.clone(),
            verified_profile: contact.verified_profile,
            level: contact.level.clone(),
            google_link: contact.google_link.clone(),
            linkedin_link: contact.linkedin_link.clone(),
        })
    }

    pub fn delete_contact(&mut self, id: i64) -> Result<bool> {
        self.delete_child("contacts", id)
    }

    fn delete_child(&mut self, table: &'static str, id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let target_id: Option<i64> = tx
            .query_row(
                &format!("SELECT target_id FROM {} WHERE id = ?1", table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(target_id) = target_id else {
            return Ok(false);
        };

        tx.execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id])?;
        recompute_score_in(&tx, target_id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Record `rater`'s rating of a target. A second submission by the same
    /// rater replaces the first.
    pub fn submit_rating(&mut self, key: &str, rater: &str, value: i64, note: &str) -> Result<Rating> {
        if !(1..=5).contains(&value) {
            return Err(CoreError::InvalidRating(value));
        }
        let target_id = self.require_target_id(key)?;
        let now = to_millis(Utc::now());

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO ratings (target_id, rater, value, note, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(target_id, rater) DO UPDATE SET value = excluded.value, note = excluded.note",
            params![target_id, rater, value, note, now],
        )?;
        let rating = tx.query_row(
            "SELECT id, created_at FROM ratings WHERE target_id = ?1 AND rater = ?2",
            params![target_id, rater],
            |row| {
                Ok(Rating {
                    id: row.get(0)?,
                    target_id,
                    rater: rater.to_string(),
                    value: value as u8,
                    note: note.to_string(),
                    created_at: from_millis(row.get(1)?),
                })
            },
        )?;
        let score = recompute_score_in(&tx, target_id)?;
        tx.commit()?;

        debug!(key, rater, value, score, "Recorded rating");
        Ok(rating)
    }

    pub fn delete_rating(&mut self, key: &str, rater: &str) -> Result<bool> {
        let target_id = self.require_target_id(key)?;

        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM ratings WHERE target_id = ?1 AND rater = ?2",
            params![target_id, rater],
        )?;
        recompute_score_in(&tx, target_id)?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Re-derive and persist the score of a target from its current facts.
    pub fn recompute_score(&self, target_id: i64) -> Result<f64> {
        recompute_score_in(&self.conn, target_id)
    }

    pub fn score_inputs(&self, target_id: i64) -> Result<ScoreInputs> {
        score_inputs_in(&self.conn, target_id)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

fn unique_slug(conn: &Connection, key: &str) -> Result<String> {
    let mut base = slugify(key);
    if base.is_empty() {
        base = FALLBACK_SLUG.to_string();
    }

    let taken = |slug: &str| -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM targets WHERE slug = ?1)",
            params![slug],
            |row| row.get(0),
        )
    };

    let mut slug = base.clone();
    let mut suffix = 1;
    while taken(&slug)? {
        slug = format!("{}-{}", base, suffix);
        suffix += 1;
    }
    Ok(slug)
}

fn score_inputs_in(conn: &Connection, target_id: i64) -> Result<ScoreInputs> {
    let exists = |sql: &str| -> rusqlite::Result<bool> {
        conn.query_row(sql, params![target_id], |row| row.get(0))
    };

    let address_verified =
        exists("SELECT EXISTS(SELECT 1 FROM addresses WHERE target_id = ?1 AND verified = 1)")?;
    let any_phone_verified =
        exists("SELECT EXISTS(SELECT 1 FROM phone_numbers WHERE target_id = ?1 AND verified = 1)")?;
    let any_contact_verified = exists(
        "SELECT EXISTS(SELECT 1 FROM contacts WHERE target_id = ?1 AND verified_profile = 1)",
    )?;

    let mut stmt = conn.prepare("SELECT value FROM ratings WHERE target_id = ?1")?;
    let ratings = stmt
        .query_map(params![target_id], |row| row.get::<_, i64>(0))?
        .map(|value| value.map(|v| v as u8))
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ScoreInputs {
        address_verified,
        any_phone_verified,
        any_contact_verified,
        ratings,
    })
}

// Only the score column is written
fn recompute_score_in(conn: &Connection, target_id: i64) -> Result<f64> {
    let score = compute_score(&score_inputs_in(conn, target_id)?);
    conn.execute(
        "UPDATE targets SET score = ?1 WHERE id = ?2",
        params![score, target_id],
    )?;
    Ok(score)
}
