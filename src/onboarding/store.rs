use super::domain::{
    is_identity_item, AccessItem, AccessItemStatus, AccessItemUpdate, ActivityEntry, NewUser,
    OnboardingStage, PocRoutingRule, UserEntity,
};
use crate::shared::time::now_secs;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create user database parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("invalid user: {0}")]
    InvalidUser(String),
    #[error("a user named `{name}` or with email `{email}` already exists")]
    DuplicateUser { name: String, email: String },
    #[error("user {user_id} does not exist")]
    UserNotFound { user_id: i64 },
    #[error("user {user_id} has no access item `{service}`")]
    AccessItemNotFound { user_id: i64, service: String },
    #[error("access item `{service}` of user {user_id} is completed and cannot return to pending")]
    AccessItemRegression { user_id: i64, service: String },
    #[error("invalid {column} `{value}` in database")]
    InvalidColumn { column: &'static str, value: String },
}

fn sql(source: rusqlite::Error) -> StoreError {
    StoreError::Sql { source }
}

/// SQLite-backed users, access items, activity and POC routes. Each operation
/// opens its own connection and every mutation runs in one immediate
/// transaction, so a single update is atomic per entity.
#[derive(Debug, Clone)]
pub struct UserStore {
    db_path: PathBuf,
}

struct UserRow {
    id: i64,
    name: String,
    email: String,
    company_email: Option<String>,
    contact_no: Option<String>,
    location: Option<String>,
    date_of_joining: Option<String>,
    level: Option<String>,
    role: Option<String>,
    team: String,
    manager: Option<String>,
    stage: String,
    created_at: i64,
}

const USER_COLUMNS: &str = "id, name, email, company_email, contact_no, location, \
    date_of_joining, level, role, team, manager, stage, created_at";

fn user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        company_email: row.get(3)?,
        contact_no: row.get(4)?,
        location: row.get(5)?,
        date_of_joining: row.get(6)?,
        level: row.get(7)?,
        role: row.get(8)?,
        team: row.get(9)?,
        manager: row.get(10)?,
        stage: row.get(11)?,
        created_at: row.get(12)?,
    })
}

impl UserStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.connect()?
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    company_email TEXT,
                    contact_no TEXT,
                    location TEXT,
                    date_of_joining TEXT,
                    level TEXT,
                    role TEXT,
                    team TEXT NOT NULL,
                    manager TEXT,
                    stage TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS access_items (
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    service TEXT NOT NULL COLLATE NOCASE,
                    position INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    completed_at INTEGER,
                    PRIMARY KEY (user_id, service)
                );

                CREATE TABLE IF NOT EXISTS activity (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    message TEXT NOT NULL,
                    timestamp INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS poc_routes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    role TEXT NOT NULL,
                    team TEXT NOT NULL COLLATE NOCASE,
                    access_item TEXT NOT NULL,
                    poc_id TEXT NOT NULL,
                    UNIQUE (role, team, access_item, poc_id)
                );

                CREATE INDEX IF NOT EXISTS idx_activity_user ON activity(user_id, id);
                CREATE INDEX IF NOT EXISTS idx_poc_routes_team ON poc_routes(team);
                ",
            )
            .map_err(sql)
    }

    /// Inserts the user and seeds one pending access item per distinct routed
    /// item for the team, in one transaction.
    pub fn create_user(&self, user: &NewUser) -> Result<UserEntity, StoreError> {
        user.validate().map_err(StoreError::InvalidUser)?;
        let now = now_secs();
        let mut connection = self.connect()?;
        let tx = immediate(&mut connection)?;

        let mut items: Vec<String> = Vec::new();
        for rule in routes_for_team(&tx, user.team.trim())? {
            let item = rule.access_item.trim().to_string();
            if !item.is_empty() && !items.iter().any(|seen| seen.eq_ignore_ascii_case(&item)) {
                items.push(item);
            }
        }
        items.sort_by_key(|item| item.to_ascii_lowercase());

        let inserted = tx.execute(
            "INSERT INTO users (name, email, contact_no, location, date_of_joining, level, role, team, manager, stage, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user.name.trim(),
                user.email.trim(),
                user.contact_no,
                user.location,
                user.date_of_joining,
                user.level,
                user.role,
                user.team.trim(),
                user.manager,
                OnboardingStage::New.as_str(),
                now,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateUser {
                    name: user.name.trim().to_string(),
                    email: user.email.trim().to_string(),
                })
            }
            Err(source) => return Err(sql(source)),
        }
        let user_id = tx.last_insert_rowid();

        for (position, item) in items.iter().enumerate() {
            tx.execute(
                "INSERT INTO access_items (user_id, service, position, status, completed_at)
                 VALUES (?1, ?2, ?3, ?4, NULL)",
                params![
                    user_id,
                    item,
                    position as i64,
                    AccessItemStatus::Pending.as_str()
                ],
            )
            .map_err(sql)?;
        }
        insert_activity(
            &tx,
            user_id,
            &format!(
                "created for team {} with {} access item(s)",
                user.team.trim(),
                items.len()
            ),
            now,
        )?;
        let entity = load_user_tx(&tx, user_id)?.ok_or(StoreError::UserNotFound { user_id })?;
        tx.commit().map_err(sql)?;
        Ok(entity)
    }

    pub fn load_user(&self, user_id: i64) -> Result<Option<UserEntity>, StoreError> {
        let connection = self.connect()?;
        load_user_tx(&connection, user_id)
    }

    pub fn require_user(&self, user_id: i64) -> Result<UserEntity, StoreError> {
        self.load_user(user_id)?
            .ok_or(StoreError::UserNotFound { user_id })
    }

    /// Matches either the personal or the issued company address.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserEntity>, StoreError> {
        let connection = self.connect()?;
        let id: Option<i64> = connection
            .query_row(
                "SELECT id FROM users WHERE email = ?1 COLLATE NOCASE OR company_email = ?1 COLLATE NOCASE
                 ORDER BY id LIMIT 1",
                params![email.trim()],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)?;
        match id {
            Some(id) => load_user_tx(&connection, id),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> Result<Vec<UserEntity>, StoreError> {
        let connection = self.connect()?;
        let ids: Vec<i64> = {
            let mut stmt = connection
                .prepare("SELECT id FROM users ORDER BY id")
                .map_err(sql)?;
            let rows = stmt.query_map([], |row| row.get(0)).map_err(sql)?;
            rows.collect::<Result<_, _>>().map_err(sql)?
        };
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = load_user_tx(&connection, id)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub fn add_route(&self, rule: &PocRoutingRule) -> Result<bool, StoreError> {
        for (field, value) in [
            ("role", &rule.role),
            ("team", &rule.team),
            ("access_item", &rule.access_item),
            ("poc_id", &rule.poc_id),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::InvalidUser(format!(
                    "routing rule {field} must be non-empty"
                )));
            }
        }
        let connection = self.connect()?;
        let inserted = connection
            .execute(
                "INSERT OR IGNORE INTO poc_routes (role, team, access_item, poc_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    rule.role.trim(),
                    rule.team.trim(),
                    rule.access_item.trim(),
                    rule.poc_id.trim()
                ],
            )
            .map_err(sql)?;
        Ok(inserted > 0)
    }

    pub fn find_routes(&self, team: &str) -> Result<Vec<PocRoutingRule>, StoreError> {
        let connection = self.connect()?;
        routes_for_team(&connection, team.trim())
    }

    pub fn list_routes(&self) -> Result<Vec<PocRoutingRule>, StoreError> {
        let connection = self.connect()?;
        let mut stmt = connection
            .prepare("SELECT role, team, access_item, poc_id FROM poc_routes ORDER BY team, access_item, id")
            .map_err(sql)?;
        let rows = stmt.query_map([], route_row).map_err(sql)?;
        rows.collect::<Result<_, _>>().map_err(sql)
    }

    /// Compare-and-set stage change. Returns false when the entity is not at
    /// `from`, which callers treat as "someone else already moved it".
    pub fn advance_stage(
        &self,
        user_id: i64,
        from: OnboardingStage,
        to: OnboardingStage,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let mut connection = self.connect()?;
        let tx = immediate(&mut connection)?;
        let changed = tx
            .execute(
                "UPDATE users SET stage = ?1 WHERE id = ?2 AND stage = ?3",
                params![to.as_str(), user_id, from.as_str()],
            )
            .map_err(sql)?;
        if changed > 0 {
            insert_activity(&tx, user_id, &format!("stage {from} -> {to}"), now_secs())?;
        }
        tx.commit().map_err(sql)?;
        Ok(changed > 0)
    }

    /// Stores the issued address, moves `new` to `email_issued`, and completes
    /// identity-type access items. A no-op unless the entity is still `new`.
    pub fn record_identity_issued(
        &self,
        user_id: i64,
        company_email: &str,
    ) -> Result<bool, StoreError> {
        let now = now_secs();
        let mut connection = self.connect()?;
        let tx = immediate(&mut connection)?;
        let changed = tx
            .execute(
                "UPDATE users SET company_email = ?1, stage = ?2 WHERE id = ?3 AND stage = ?4",
                params![
                    company_email,
                    OnboardingStage::EmailIssued.as_str(),
                    user_id,
                    OnboardingStage::New.as_str()
                ],
            )
            .map_err(sql)?;
        if changed == 0 {
            tx.commit().map_err(sql)?;
            return Ok(false);
        }
        let identity_items: Vec<String> = pending_services(&tx, user_id)?
            .into_iter()
            .filter(|service| is_identity_item(service))
            .collect();
        for service in &identity_items {
            complete_item(&tx, user_id, service, now)?;
        }
        insert_activity(
            &tx,
            user_id,
            &format!(
                "company email {company_email} issued; completed {} identity item(s)",
                identity_items.len()
            ),
            now,
        )?;
        tx.commit().map_err(sql)?;
        Ok(true)
    }

    /// Completes the named items that are still pending. Already completed
    /// items are left untouched, so the completion timestamp never moves.
    pub fn complete_access_items(
        &self,
        user_id: i64,
        services: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let now = now_secs();
        let mut connection = self.connect()?;
        let tx = immediate(&mut connection)?;
        let mut completed = Vec::new();
        for service in services {
            if complete_item(&tx, user_id, service, now)? {
                completed.push(service.clone());
            }
        }
        if !completed.is_empty() {
            insert_activity(
                &tx,
                user_id,
                &format!("access provisioned for {}", completed.join(", ")),
                now,
            )?;
        }
        tx.commit().map_err(sql)?;
        Ok(completed)
    }

    /// Applies manual updates all-or-nothing. Completed items can never move
    /// back to pending.
    pub fn apply_updates(
        &self,
        user_id: i64,
        updates: &[AccessItemUpdate],
    ) -> Result<Vec<String>, StoreError> {
        let now = now_secs();
        let mut connection = self.connect()?;
        let tx = immediate(&mut connection)?;
        let exists: Option<i64> = tx
            .query_row("SELECT id FROM users WHERE id = ?1", params![user_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(sql)?;
        if exists.is_none() {
            return Err(StoreError::UserNotFound { user_id });
        }

        let mut changed = Vec::new();
        for update in updates {
            let current: Option<(String, String)> = tx
                .query_row(
                    "SELECT service, status FROM access_items WHERE user_id = ?1 AND service = ?2",
                    params![user_id, update.service.trim()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(sql)?;
            let (service, current) = match current {
                Some((service, raw)) => (service, parse_item_status(&raw)?),
                None => {
                    return Err(StoreError::AccessItemNotFound {
                        user_id,
                        service: update.service.trim().to_string(),
                    })
                }
            };
            match (current, update.status) {
                (AccessItemStatus::Completed, AccessItemStatus::Pending) => {
                    return Err(StoreError::AccessItemRegression { user_id, service })
                }
                (AccessItemStatus::Pending, AccessItemStatus::Completed) => {
                    if complete_item(&tx, user_id, &service, now)? {
                        changed.push(service);
                    }
                }
                _ => {}
            }
        }
        if !changed.is_empty() {
            insert_activity(
                &tx,
                user_id,
                &format!("manually completed {}", changed.join(", ")),
                now,
            )?;
        }
        tx.commit().map_err(sql)?;
        Ok(changed)
    }

    /// Moves `provisioning_access` to `completed` once no item is pending.
    pub fn complete_if_all_done(&self, user_id: i64) -> Result<bool, StoreError> {
        let mut connection = self.connect()?;
        let tx = immediate(&mut connection)?;
        let changed = tx
            .execute(
                "UPDATE users SET stage = ?1 WHERE id = ?2 AND stage = ?3
                 AND NOT EXISTS (
                     SELECT 1 FROM access_items WHERE user_id = ?2 AND status != ?4
                 )",
                params![
                    OnboardingStage::Completed.as_str(),
                    user_id,
                    OnboardingStage::ProvisioningAccess.as_str(),
                    AccessItemStatus::Completed.as_str()
                ],
            )
            .map_err(sql)?;
        if changed > 0 {
            insert_activity(&tx, user_id, "all access items completed", now_secs())?;
        }
        tx.commit().map_err(sql)?;
        Ok(changed > 0)
    }

    pub fn append_activity(&self, user_id: i64, message: &str) -> Result<(), StoreError> {
        let connection = self.connect()?;
        insert_activity(&connection, user_id, message, now_secs())
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })?;
        connection.busy_timeout(BUSY_TIMEOUT).map_err(sql)?;
        connection
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(sql)?;
        Ok(connection)
    }
}

fn immediate(connection: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(sql)
}

fn route_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PocRoutingRule> {
    Ok(PocRoutingRule {
        role: row.get(0)?,
        team: row.get(1)?,
        access_item: row.get(2)?,
        poc_id: row.get(3)?,
    })
}

fn routes_for_team(connection: &Connection, team: &str) -> Result<Vec<PocRoutingRule>, StoreError> {
    let mut stmt = connection
        .prepare(
            "SELECT role, team, access_item, poc_id FROM poc_routes WHERE team = ?1
             ORDER BY access_item, id",
        )
        .map_err(sql)?;
    let rows = stmt.query_map(params![team], route_row).map_err(sql)?;
    rows.collect::<Result<_, _>>().map_err(sql)
}

fn insert_activity(
    connection: &Connection,
    user_id: i64,
    message: &str,
    timestamp: i64,
) -> Result<(), StoreError> {
    connection
        .execute(
            "INSERT INTO activity (user_id, message, timestamp) VALUES (?1, ?2, ?3)",
            params![user_id, message, timestamp],
        )
        .map_err(sql)?;
    Ok(())
}

fn complete_item(
    connection: &Connection,
    user_id: i64,
    service: &str,
    now: i64,
) -> Result<bool, StoreError> {
    let changed = connection
        .execute(
            "UPDATE access_items SET status = ?1, completed_at = ?2
             WHERE user_id = ?3 AND service = ?4 AND status = ?5",
            params![
                AccessItemStatus::Completed.as_str(),
                now,
                user_id,
                service.trim(),
                AccessItemStatus::Pending.as_str()
            ],
        )
        .map_err(sql)?;
    Ok(changed > 0)
}

fn pending_services(connection: &Connection, user_id: i64) -> Result<Vec<String>, StoreError> {
    let mut stmt = connection
        .prepare(
            "SELECT service FROM access_items WHERE user_id = ?1 AND status = ?2 ORDER BY position",
        )
        .map_err(sql)?;
    let rows = stmt
        .query_map(
            params![user_id, AccessItemStatus::Pending.as_str()],
            |row| row.get(0),
        )
        .map_err(sql)?;
    rows.collect::<Result<_, _>>().map_err(sql)
}

fn parse_item_status(raw: &str) -> Result<AccessItemStatus, StoreError> {
    AccessItemStatus::parse(raw).ok_or_else(|| StoreError::InvalidColumn {
        column: "access_items.status",
        value: raw.to_string(),
    })
}

fn load_user_tx(connection: &Connection, user_id: i64) -> Result<Option<UserEntity>, StoreError> {
    let row = connection
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![user_id],
            user_row,
        )
        .optional()
        .map_err(sql)?;
    let Some(row) = row else {
        return Ok(None);
    };
    let stage = OnboardingStage::parse(&row.stage).ok_or_else(|| StoreError::InvalidColumn {
        column: "users.stage",
        value: row.stage.clone(),
    })?;

    let raw_items: Vec<(String, String, Option<i64>)> = {
        let mut stmt = connection
            .prepare(
                "SELECT service, status, completed_at FROM access_items WHERE user_id = ?1
                 ORDER BY position",
            )
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(sql)?;
        rows.collect::<Result<_, _>>().map_err(sql)?
    };
    let mut access_items = Vec::with_capacity(raw_items.len());
    for (service, status, completed_at) in raw_items {
        access_items.push(AccessItem {
            service,
            status: parse_item_status(&status)?,
            completed_at,
        });
    }

    let activity: Vec<ActivityEntry> = {
        let mut stmt = connection
            .prepare("SELECT message, timestamp FROM activity WHERE user_id = ?1 ORDER BY id")
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(ActivityEntry {
                    message: row.get(0)?,
                    timestamp: row.get(1)?,
                })
            })
            .map_err(sql)?;
        rows.collect::<Result<_, _>>().map_err(sql)?
    };

    Ok(Some(UserEntity {
        id: row.id,
        name: row.name,
        email: row.email,
        company_email: row.company_email,
        contact_no: row.contact_no,
        location: row.location,
        date_of_joining: row.date_of_joining,
        level: row.level,
        role: row.role,
        team: row.team,
        manager: row.manager,
        status: stage.status(),
        stage,
        access_items,
        activity,
        created_at: row.created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn route(team: &str, item: &str, poc: &str) -> PocRoutingRule {
        PocRoutingRule {
            role: "engineer".to_string(),
            team: team.to_string(),
            access_item: item.to_string(),
            poc_id: poc.to_string(),
        }
    }

    fn store_with_backend_routes(dir: &Path) -> UserStore {
        let store = UserStore::open(&dir.join("db/users.sqlite")).expect("open store");
        store.add_route(&route("backend", "github", "poc2")).expect("route");
        store.add_route(&route("backend", "aws", "poc1")).expect("route");
        store.add_route(&route("frontend", "figma", "poc3")).expect("route");
        store
    }

    #[test]
    fn creation_seeds_sorted_pending_items_for_the_team() {
        let temp = tempdir().expect("tempdir");
        let store = store_with_backend_routes(temp.path());
        let user = store
            .create_user(&NewUser::new("Jane Doe", "jane@example.com", "backend"))
            .expect("create");

        assert_eq!(user.stage, OnboardingStage::New);
        let services: Vec<&str> = user.access_items.iter().map(|item| item.service.as_str()).collect();
        assert_eq!(services, vec!["aws", "github"]);
        assert!(user
            .access_items
            .iter()
            .all(|item| item.status == AccessItemStatus::Pending && item.completed_at.is_none()));
        assert_eq!(user.activity.len(), 1);
    }

    #[test]
    fn duplicate_routes_and_users_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = store_with_backend_routes(temp.path());
        assert!(!store.add_route(&route("backend", "aws", "poc1")).expect("route"));

        store
            .create_user(&NewUser::new("Jane Doe", "jane@example.com", "backend"))
            .expect("create");
        let err = store
            .create_user(&NewUser::new("Jane Doe", "other@example.com", "backend"))
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::DuplicateUser { .. }));
    }

    #[test]
    fn stage_changes_are_compare_and_set() {
        let temp = tempdir().expect("tempdir");
        let store = store_with_backend_routes(temp.path());
        let user = store
            .create_user(&NewUser::new("Jane Doe", "jane@example.com", "backend"))
            .expect("create");

        assert!(!store
            .advance_stage(user.id, OnboardingStage::EmailIssued, OnboardingStage::ProvisioningAccess)
            .expect("advance"));
        assert!(store
            .record_identity_issued(user.id, "jane.doe@corp.example.com")
            .expect("issue"));
        assert!(!store
            .record_identity_issued(user.id, "other@corp.example.com")
            .expect("issue again"));
        let user = store.require_user(user.id).expect("load");
        assert_eq!(user.company_email.as_deref(), Some("jane.doe@corp.example.com"));
        assert_eq!(user.stage, OnboardingStage::EmailIssued);
    }

    #[test]
    fn completed_items_never_return_to_pending() {
        let temp = tempdir().expect("tempdir");
        let store = store_with_backend_routes(temp.path());
        let user = store
            .create_user(&NewUser::new("Jane Doe", "jane@example.com", "backend"))
            .expect("create");

        let done = store
            .complete_access_items(user.id, &["AWS".to_string()])
            .expect("complete");
        assert_eq!(done, vec!["AWS".to_string()]);
        let first = store.require_user(user.id).expect("load");
        let stamp = first.access_item("aws").and_then(|item| item.completed_at);
        assert!(stamp.is_some());

        let again = store
            .complete_access_items(user.id, &["aws".to_string()])
            .expect("complete again");
        assert!(again.is_empty());

        let err = store
            .apply_updates(
                user.id,
                &[
                    AccessItemUpdate {
                        service: "github".to_string(),
                        status: AccessItemStatus::Completed,
                    },
                    AccessItemUpdate {
                        service: "aws".to_string(),
                        status: AccessItemStatus::Pending,
                    },
                ],
            )
            .expect_err("regression");
        assert!(matches!(err, StoreError::AccessItemRegression { .. }));

        let after = store.require_user(user.id).expect("load");
        assert_eq!(after.access_item("aws").and_then(|item| item.completed_at), stamp);
        assert_eq!(
            after.access_item("github").map(|item| item.status),
            Some(AccessItemStatus::Pending),
            "the failed batch must not apply its earlier updates"
        );
    }

    #[test]
    fn completion_requires_provisioning_stage_and_no_pending_items() {
        let temp = tempdir().expect("tempdir");
        let store = store_with_backend_routes(temp.path());
        let user = store
            .create_user(&NewUser::new("Jane Doe", "jane@example.com", "backend"))
            .expect("create");
        store
            .complete_access_items(user.id, &["aws".to_string(), "github".to_string()])
            .expect("complete");
        assert!(!store.complete_if_all_done(user.id).expect("early"));

        store
            .record_identity_issued(user.id, "jane.doe@corp.example.com")
            .expect("issue");
        store
            .advance_stage(user.id, OnboardingStage::EmailIssued, OnboardingStage::ProvisioningAccess)
            .expect("advance");
        assert!(store.complete_if_all_done(user.id).expect("complete"));
        assert!(!store.complete_if_all_done(user.id).expect("idempotent"));
        assert_eq!(
            store.require_user(user.id).expect("load").stage,
            OnboardingStage::Completed
        );
    }
}
