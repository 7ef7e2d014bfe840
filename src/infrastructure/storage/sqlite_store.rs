//! SQLite price store shared by every process pointed at the same file
//!
//! Each write runs in its own `BEGIN IMMEDIATE` transaction, so separate
//! processes serialize on the database write lock instead of on
//! process-local state. A failed statement rolls the whole transaction back
//! when it is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::{lease_expiry, PriceStore, StoreStats};
use crate::domain::alert::{Alert, AlertEvaluator, AlertState, AlertTransition, FiredAlert, RearmPolicy, User};
use crate::domain::product::{FetchStatus, Observation, PriceObservation, Product, ProductKey};
use crate::domain::retailer::{ResolvedProduct, Retailer};
use crate::shared::errors::StoreError;
use crate::shared::types::{AlertId, Price, UserId};

/// How long a writer waits for another connection's lock
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS products (
    retailer TEXT NOT NULL,
    product_ref TEXT NOT NULL,
    url TEXT NOT NULL,
    name TEXT NOT NULL,
    last_price REAL,
    last_available INTEGER,
    last_checked_at TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (retailer, product_ref)
);
CREATE TABLE IF NOT EXISTS price_observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    retailer TEXT NOT NULL,
    product_ref TEXT NOT NULL,
    price REAL,
    available INTEGER NOT NULL,
    observed_at TEXT NOT NULL,
    fetch_status TEXT NOT NULL,
    error TEXT,
    FOREIGN KEY (retailer, product_ref) REFERENCES products(retailer, product_ref)
);
CREATE INDEX IF NOT EXISTS idx_price_observations_product
    ON price_observations (retailer, product_ref, id);
CREATE TABLE IF NOT EXISTS alerts (
    alert_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(user_id),
    retailer TEXT NOT NULL,
    product_ref TEXT NOT NULL,
    target_price REAL NOT NULL,
    created_at TEXT NOT NULL,
    last_fired_at TEXT,
    active INTEGER NOT NULL,
    state TEXT NOT NULL,
    UNIQUE (user_id, retailer, product_ref),
    FOREIGN KEY (retailer, product_ref) REFERENCES products(retailer, product_ref)
);
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS sweep_lease (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    owner TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
";

const PRODUCT_COLUMNS: &str =
    "retailer, product_ref, url, name, last_price, last_available, last_checked_at, created_at";
const ALERT_COLUMNS: &str =
    "alert_id, user_id, retailer, product_ref, target_price, created_at, last_fired_at, active, state";
const OBSERVATION_COLUMNS: &str = "retailer, product_ref, price, available, observed_at, fetch_status, error";

const ALERTS_FIRED_KEY: &str = "alerts_fired";

/// `PriceStore` on a single SQLite file
#[derive(Clone)]
pub struct SqlitePriceStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqlitePriceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open (creating if needed) the database at `path` and apply the schema
    pub fn open_with_busy_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let connection = Connection::open(path).map_err(db_error)?;
        connection
            .execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .map_err(db_error)?;
        connection.busy_timeout(busy_timeout).map_err(db_error)?;
        connection.execute_batch(SCHEMA).map_err(db_error)?;

        info!(path = %path.display(), "opened price database");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Run `op` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| StoreError::Unavailable("connection mutex poisoned".into()))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn db_error(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::ConstraintViolation(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn conversion_error<E>(column: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}

fn key_from_row(row: &Row<'_>, retailer_col: usize) -> rusqlite::Result<ProductKey> {
    let retailer: Retailer = row
        .get::<_, String>(retailer_col)?
        .parse()
        .map_err(|e| conversion_error(retailer_col, e))?;
    Ok(ProductKey::new(retailer, row.get::<_, String>(retailer_col + 1)?))
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        key: key_from_row(row, 0)?,
        url: row.get(2)?,
        name: row.get(3)?,
        last_price: row.get(4)?,
        last_available: row.get(5)?,
        last_checked_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn state_str(state: AlertState) -> &'static str {
    match state {
        AlertState::Armed => "armed",
        AlertState::Fired => "fired",
    }
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let id: AlertId = row.get::<_, String>(0)?.parse().map_err(|e| conversion_error(0, e))?;
    let state = match row.get::<_, String>(8)?.as_str() {
        "armed" => AlertState::Armed,
        "fired" => AlertState::Fired,
        other => {
            return Err(conversion_error(
                8,
                StoreError::Unavailable(format!("unknown alert state '{}'", other)),
            ))
        }
    };
    Ok(Alert {
        id,
        user_id: UserId::new(row.get::<_, String>(1)?),
        product: key_from_row(row, 2)?,
        target_price: row.get(4)?,
        created_at: row.get(5)?,
        last_fired_at: row.get(6)?,
        active: row.get(7)?,
        state,
    })
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<PriceObservation> {
    let fetch_status = match row.get::<_, String>(5)?.as_str() {
        "success" => FetchStatus::Success,
        _ => FetchStatus::Failed {
            error: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        },
    };
    Ok(PriceObservation {
        product: key_from_row(row, 0)?,
        price: row.get(2)?,
        available: row.get(3)?,
        observed_at: row.get(4)?,
        fetch_status,
    })
}

fn load_user(conn: &Connection, user_id: &UserId) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT user_id, registered_at FROM users WHERE user_id = ?1",
        params![user_id.as_str()],
        |row| {
            Ok(User {
                id: UserId::new(row.get::<_, String>(0)?),
                registered_at: row.get(1)?,
            })
        },
    )
    .optional()
}

fn load_product(conn: &Connection, key: &ProductKey) -> rusqlite::Result<Option<Product>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM products WHERE retailer = ?1 AND product_ref = ?2",
            PRODUCT_COLUMNS
        ),
        params![key.retailer.as_str(), key.product_ref],
        product_from_row,
    )
    .optional()
}

fn require_product(conn: &Connection, key: &ProductKey) -> Result<Product, StoreError> {
    load_product(conn, key)
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound(format!("product {}", key)))
}

fn load_alert(conn: &Connection, alert_id: AlertId) -> rusqlite::Result<Option<Alert>> {
    conn.query_row(
        &format!("SELECT {} FROM alerts WHERE alert_id = ?1", ALERT_COLUMNS),
        params![alert_id.to_string()],
        alert_from_row,
    )
    .optional()
}

fn query_alerts(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> rusqlite::Result<Vec<Alert>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, alert_from_row)?;
    rows.collect()
}

fn save_alert(conn: &Connection, alert: &Alert) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE alerts SET target_price = ?2, last_fired_at = ?3, active = ?4, state = ?5 WHERE alert_id = ?1",
        params![
            alert.id.to_string(),
            alert.target_price,
            alert.last_fired_at,
            alert.active,
            state_str(alert.state)
        ],
    )?;
    Ok(())
}

fn insert_alert(conn: &Connection, alert: &Alert) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO alerts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            ALERT_COLUMNS
        ),
        params![
            alert.id.to_string(),
            alert.user_id.as_str(),
            alert.product.retailer.as_str(),
            alert.product.product_ref,
            alert.target_price,
            alert.created_at,
            alert.last_fired_at,
            alert.active,
            state_str(alert.state)
        ],
    )?;
    Ok(())
}

/// Append the observation and fold it into its product. Returns the previous
/// successful price and the updated product.
fn insert_observation(conn: &Connection, observation: &Observation) -> Result<(Option<Price>, Product), StoreError> {
    let record = &observation.record;
    let mut product = require_product(conn, &record.product)?;
    let previous_price = product.last_price;
    product.apply_observation(record, observation.fetched_name.as_deref());

    conn.execute(
        "UPDATE products SET name = ?3, last_price = ?4, last_available = ?5, last_checked_at = ?6
         WHERE retailer = ?1 AND product_ref = ?2",
        params![
            product.key.retailer.as_str(),
            product.key.product_ref,
            product.name,
            product.last_price,
            product.last_available,
            product.last_checked_at
        ],
    )
    .map_err(db_error)?;

    let (status, error) = match &record.fetch_status {
        FetchStatus::Success => ("success", None),
        FetchStatus::Failed { error } => ("failed", Some(error.as_str())),
    };
    conn.execute(
        &format!(
            "INSERT INTO price_observations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            OBSERVATION_COLUMNS
        ),
        params![
            record.product.retailer.as_str(),
            record.product.product_ref,
            record.price,
            record.available,
            record.observed_at,
            status,
            error
        ],
    )
    .map_err(db_error)?;

    Ok((previous_price, product))
}

/// Apply one transition to the stored alert. Returns the updated alert if it
/// applied, `None` if the alert's current state made it a no-op.
fn apply_transition(
    conn: &Connection,
    transition: &AlertTransition,
    rearm_policy: RearmPolicy,
) -> Result<Option<Alert>, StoreError> {
    let alert_id = transition.alert_id();
    let mut alert = load_alert(conn, alert_id)
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))?;
    if !alert.apply(transition, rearm_policy) {
        return Ok(None);
    }

    save_alert(conn, &alert).map_err(db_error)?;
    if matches!(transition, AlertTransition::Fire { .. }) {
        conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, 1)
             ON CONFLICT(key) DO UPDATE SET value = value + 1",
            params![ALERTS_FIRED_KEY],
        )
        .map_err(db_error)?;
    }
    Ok(Some(alert))
}

fn count(conn: &Connection, sql: &str) -> Result<usize, StoreError> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0)).map_err(db_error)?;
    Ok(n as usize)
}

#[async_trait]
impl PriceStore for SqlitePriceStore {
    async fn register_user(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<User, StoreError> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            if load_user(&tx, &user_id).map_err(db_error)?.is_some() {
                return Err(StoreError::ConstraintViolation(format!(
                    "user {} already registered",
                    user_id
                )));
            }
            tx.execute(
                "INSERT INTO users (user_id, registered_at) VALUES (?1, ?2)",
                params![user_id.as_str(), at],
            )
            .map_err(db_error)?;
            tx.commit().map_err(db_error)?;
            Ok(User {
                id: user_id,
                registered_at: at,
            })
        })
        .await
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            load_user(conn, &user_id)
                .map_err(db_error)?
                .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
        })
        .await
    }

    async fn upsert_product(&self, resolved: &ResolvedProduct, at: DateTime<Utc>) -> Result<Product, StoreError> {
        let product = Product::new(
            resolved.key.clone(),
            resolved.url.clone(),
            resolved.display_name.clone(),
            at,
        );
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            tx.execute(
                "INSERT OR IGNORE INTO products (retailer, product_ref, url, name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    product.key.retailer.as_str(),
                    product.key.product_ref,
                    product.url,
                    product.name,
                    product.created_at
                ],
            )
            .map_err(db_error)?;
            let stored = require_product(&tx, &product.key)?;
            tx.commit().map_err(db_error)?;
            Ok(stored)
        })
        .await
    }

    async fn get_product(&self, key: &ProductKey) -> Result<Product, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| require_product(conn, &key)).await
    }

    async fn upsert_alert(
        &self,
        user_id: &UserId,
        product: &ProductKey,
        target_price: Price,
        at: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        let user_id = user_id.clone();
        let product = product.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            if load_user(&tx, &user_id).map_err(db_error)?.is_none() {
                return Err(StoreError::NotFound(format!("user {}", user_id)));
            }
            require_product(&tx, &product)?;

            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM alerts WHERE user_id = ?1 AND retailer = ?2 AND product_ref = ?3",
                        ALERT_COLUMNS
                    ),
                    params![user_id.as_str(), product.retailer.as_str(), product.product_ref],
                    alert_from_row,
                )
                .optional()
                .map_err(db_error)?;
            let alert = match existing {
                Some(mut alert) => {
                    alert.retarget(target_price);
                    save_alert(&tx, &alert).map_err(db_error)?;
                    alert
                }
                None => {
                    let alert = Alert::new(user_id, product, target_price, at);
                    insert_alert(&tx, &alert).map_err(db_error)?;
                    alert
                }
            };
            tx.commit().map_err(db_error)?;
            Ok(alert)
        })
        .await
    }

    async fn deactivate_alert(&self, user_id: &UserId, alert_id: AlertId) -> Result<Alert, StoreError> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            let mut alert = load_alert(&tx, alert_id)
                .map_err(db_error)?
                .filter(|a| a.user_id == user_id)
                .ok_or_else(|| StoreError::NotFound(format!("alert {} for user {}", alert_id, user_id)))?;
            alert.active = false;
            save_alert(&tx, &alert).map_err(db_error)?;
            tx.commit().map_err(db_error)?;
            Ok(alert)
        })
        .await
    }

    async fn active_alerts_for_user(&self, user_id: &UserId) -> Result<Vec<Alert>, StoreError> {
        let user_id = user_id.clone();
        self.with_conn(move |conn| {
            query_alerts(
                conn,
                &format!(
                    "SELECT {} FROM alerts WHERE user_id = ?1 AND active = 1 ORDER BY created_at DESC, rowid DESC",
                    ALERT_COLUMNS
                ),
                params![user_id.as_str()],
            )
            .map_err(db_error)
        })
        .await
    }

    async fn alerts_for_product(&self, key: &ProductKey) -> Result<Vec<Alert>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            query_alerts(
                conn,
                &format!(
                    "SELECT {} FROM alerts WHERE retailer = ?1 AND product_ref = ?2 ORDER BY rowid",
                    ALERT_COLUMNS
                ),
                params![key.retailer.as_str(), key.product_ref],
            )
            .map_err(db_error)
        })
        .await
    }

    async fn tracked_products(&self) -> Result<Vec<Product>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM products p WHERE EXISTS (
                        SELECT 1 FROM alerts a
                        WHERE a.active = 1 AND a.retailer = p.retailer AND a.product_ref = p.product_ref
                     ) ORDER BY retailer, product_ref",
                    PRODUCT_COLUMNS
                ))
                .map_err(db_error)?;
            let rows = stmt.query_map([], product_from_row).map_err(db_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_error)
        })
        .await
    }

    async fn record_observation(&self, observation: &Observation) -> Result<(), StoreError> {
        let observation = observation.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            insert_observation(&tx, &observation)?;
            tx.commit().map_err(db_error)
        })
        .await
    }

    async fn mark_fired(
        &self,
        alert_id: AlertId,
        price: Price,
        fired_at: DateTime<Utc>,
        rearm_policy: RearmPolicy,
    ) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            let transition = AlertTransition::Fire {
                alert_id,
                price,
                fired_at,
            };
            let applied = apply_transition(&tx, &transition, rearm_policy)?.is_some();
            tx.commit().map_err(db_error)?;
            Ok(applied)
        })
        .await
    }

    async fn commit_observation(
        &self,
        observation: &Observation,
        evaluator: &AlertEvaluator,
    ) -> Result<Vec<FiredAlert>, StoreError> {
        let observation = observation.clone();
        let evaluator = evaluator.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            let record = &observation.record;
            let (previous_price, product) = insert_observation(&tx, &observation)?;

            let mut fired = Vec::new();
            if record.is_success() {
                // Read inside the write transaction so a concurrent process
                // cannot fire the same alert from a stale state.
                let alerts = query_alerts(
                    &tx,
                    &format!(
                        "SELECT {} FROM alerts WHERE retailer = ?1 AND product_ref = ?2 AND active = 1",
                        ALERT_COLUMNS
                    ),
                    params![record.product.retailer.as_str(), record.product.product_ref],
                )
                .map_err(db_error)?;

                let rearm_policy = evaluator.policy().rearm_policy;
                for transition in evaluator.evaluate(previous_price, record, &alerts) {
                    let Some(alert) = apply_transition(&tx, &transition, rearm_policy)? else {
                        continue;
                    };
                    if matches!(transition, AlertTransition::Fire { .. }) {
                        fired.push(FiredAlert {
                            alert,
                            product: product.clone(),
                            observation: record.clone(),
                        });
                    }
                }
            }

            tx.commit().map_err(db_error)?;
            debug!(product = %record.product, fired = fired.len(), "observation committed");
            Ok(fired)
        })
        .await
    }

    async fn price_history(&self, key: &ProductKey, limit: usize) -> Result<Vec<PriceObservation>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            require_product(conn, &key)?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM price_observations WHERE retailer = ?1 AND product_ref = ?2
                     ORDER BY id DESC LIMIT ?3",
                    OBSERVATION_COLUMNS
                ))
                .map_err(db_error)?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt
                .query_map(params![key.retailer.as_str(), key.product_ref, limit], observation_from_row)
                .map_err(db_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_error)
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.with_conn(|conn| {
            let alerts_fired: i64 = conn
                .query_row(
                    "SELECT COALESCE((SELECT value FROM store_meta WHERE key = ?1), 0)",
                    params![ALERTS_FIRED_KEY],
                    |row| row.get(0),
                )
                .map_err(db_error)?;
            Ok(StoreStats {
                users: count(conn, "SELECT COUNT(*) FROM users")?,
                products: count(conn, "SELECT COUNT(*) FROM products")?,
                alerts: count(conn, "SELECT COUNT(*) FROM alerts")?,
                active_alerts: count(conn, "SELECT COUNT(*) FROM alerts WHERE active = 1")?,
                observations: count(conn, "SELECT COUNT(*) FROM price_observations")?,
                failed_observations: count(
                    conn,
                    "SELECT COUNT(*) FROM price_observations WHERE fetch_status <> 'success'",
                )?,
                alerts_fired: alerts_fired as u64,
            })
        })
        .await
    }

    async fn acquire_sweep_lease(&self, owner: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            let holder: Option<(String, DateTime<Utc>)> = tx
                .query_row("SELECT owner, expires_at FROM sweep_lease WHERE id = 1", [], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .optional()
                .map_err(db_error)?;
            if let Some((holder, expires_at)) = holder {
                if holder != owner && expires_at > now {
                    debug!(holder = %holder, expires_at = %expires_at, "sweep lease held elsewhere");
                    return Ok(false);
                }
            }

            tx.execute(
                "INSERT INTO sweep_lease (id, owner, expires_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at",
                params![owner, lease_expiry(now, ttl)],
            )
            .map_err(db_error)?;
            tx.commit().map_err(db_error)?;
            Ok(true)
        })
        .await
    }

    async fn release_sweep_lease(&self, owner: &str) -> Result<(), StoreError> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM sweep_lease WHERE id = 1 AND owner = ?1", params![owner])
                .map_err(db_error)?;
            Ok(())
        })
        .await
    }
}
