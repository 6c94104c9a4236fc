use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::courier::{Courier, CourierId, CourierStatus};
use crate::models::order::{Order, OrderStatus};
use crate::models::route::{Route, RouteId, RouteStatus, RouteStop};
use crate::storage::{
    Storage, courier_not_found, duplicate_stop, order_not_found, route_not_found,
};

const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS couriers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    phone TEXT,
    status TEXT NOT NULL DEFAULT 'available',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL DEFAULT 'created',
    navigation_link TEXT NOT NULL DEFAULT '',
    courier_id INTEGER REFERENCES couriers (id),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS route_stops (
    route_id INTEGER NOT NULL REFERENCES routes (id) ON DELETE CASCADE,
    order_id TEXT NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    PRIMARY KEY (route_id, order_id),
    UNIQUE (route_id, sequence)
);
"#;

const ROUTE_COLUMNS: &str = "id, status, navigation_link, courier_id, created_at";

/// SQLite-backed storage. Each multi-row write runs in one transaction, and all connection
/// work runs on tokio's blocking pool.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AppError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, work: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|err| {
                AppError::Internal(format!("sqlite connection lock poisoned: {err}"))
            })?;
            work(&mut conn)
        })
        .await
        .map_err(|err| AppError::Internal(format!("sqlite task failed: {err}")))?
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into()))
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        coords: GeoPoint::new(row.get(1)?, row.get(2)?),
        status: parse_column(row, 3)?,
        created_at: row.get(4)?,
    })
}

fn courier_from_row(row: &Row<'_>) -> rusqlite::Result<Courier> {
    Ok(Courier {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        status: parse_column(row, 3)?,
        updated_at: row.get(4)?,
    })
}

fn route_from_row(row: &Row<'_>) -> rusqlite::Result<Route> {
    Ok(Route {
        id: row.get(0)?,
        status: parse_column(row, 1)?,
        navigation_link: row.get(2)?,
        courier_id: row.get(3)?,
        stops: Vec::new(),
        created_at: row.get(4)?,
    })
}

fn load_stops(conn: &Connection, route_id: RouteId) -> Result<Vec<RouteStop>, AppError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT rs.order_id, rs.sequence, o.lat, o.lon
        FROM route_stops rs
        JOIN orders o ON o.id = rs.order_id
        WHERE rs.route_id = ?1
        ORDER BY rs.sequence
        "#,
    )?;

    let stops = stmt
        .query_map(params![route_id], |row| {
            Ok(RouteStop {
                order_id: row.get(0)?,
                sequence: row.get(1)?,
                coords: GeoPoint::new(row.get(2)?, row.get(3)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(stops)
}

fn query_routes(conn: &Connection, filter: &str) -> Result<Vec<Route>, AppError> {
    let sql = format!("SELECT {ROUTE_COLUMNS} FROM routes {filter} ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let mut routes = stmt
        .query_map([], route_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for route in &mut routes {
        route.stops = load_stops(conn, route.id)?;
    }
    Ok(routes)
}

/// Rewrites the stop rows of `route` in order and routes every listed order.
fn write_route(conn: &Connection, route: &Route) -> Result<(), AppError> {
    let updated = conn.execute(
        "UPDATE routes SET navigation_link = ?1 WHERE id = ?2",
        params![route.navigation_link, route.id],
    )?;
    if updated == 0 {
        return Err(route_not_found(route.id));
    }

    conn.execute(
        "DELETE FROM route_stops WHERE route_id = ?1",
        params![route.id],
    )?;

    let mut seen = HashSet::with_capacity(route.stops.len());
    for (index, stop) in route.stops.iter().enumerate() {
        if !seen.insert(stop.order_id.as_str()) {
            return Err(duplicate_stop(route.id, &stop.order_id));
        }

        let holder: Option<RouteId> = conn
            .query_row(
                r#"
                SELECT rs.route_id
                FROM route_stops rs
                JOIN routes r ON r.id = rs.route_id
                WHERE rs.order_id = ?1 AND rs.route_id != ?2 AND r.status != ?3
                LIMIT 1
                "#,
                params![stop.order_id, route.id, RouteStatus::Completed.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(other) = holder {
            return Err(AppError::Conflict(format!(
                "order {} is already on route {other}",
                stop.order_id
            )));
        }

        let routed = conn.execute(
            "UPDATE orders SET status = ?1 WHERE id = ?2",
            params![OrderStatus::Routed.as_str(), stop.order_id],
        )?;
        if routed == 0 {
            return Err(order_not_found(&stop.order_id));
        }

        conn.execute(
            "INSERT INTO route_stops (route_id, order_id, sequence) VALUES (?1, ?2, ?3)",
            params![route.id, stop.order_id, index as i64 + 1],
        )?;
    }

    Ok(())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_order(&self, order: &Order) -> Result<bool, AppError> {
        let order = order.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                r#"
                INSERT OR IGNORE INTO orders (id, lat, lon, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    order.id,
                    order.coords.lat,
                    order.coords.lon,
                    order.status.as_str(),
                    order.created_at,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, AppError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let order = conn
                .query_row(
                    "SELECT id, lat, lon, status, created_at FROM orders WHERE id = ?1",
                    params![id],
                    order_from_row,
                )
                .optional()?;
            Ok(order)
        })
        .await
    }

    async fn fetch_pending_orders(&self) -> Result<Vec<Order>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, lat, lon, status, created_at
                FROM orders
                WHERE status = ?1
                ORDER BY rowid
                "#,
            )?;
            let orders = stmt
                .query_map(params![OrderStatus::Pending.as_str()], order_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(orders)
        })
        .await
    }

    async fn fetch_open_routes(&self) -> Result<Vec<Route>, AppError> {
        self.with_conn(|conn| query_routes(conn, "WHERE status != 'completed'"))
            .await
    }

    async fn list_routes(&self) -> Result<Vec<Route>, AppError> {
        self.with_conn(|conn| query_routes(conn, "")).await
    }

    async fn get_route(&self, id: RouteId) -> Result<Option<Route>, AppError> {
        self.with_conn(move |conn| {
            let route = conn
                .query_row(
                    &format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE id = ?1"),
                    params![id],
                    route_from_row,
                )
                .optional()?;

            match route {
                Some(mut route) => {
                    route.stops = load_stops(conn, id)?;
                    Ok(Some(route))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn create_route(
        &self,
        first_order: &Order,
        navigation_link: &str,
    ) -> Result<RouteId, AppError> {
        let order_id = first_order.id.clone();
        let navigation_link = navigation_link.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let status: OrderStatus = tx
                .query_row(
                    "SELECT status FROM orders WHERE id = ?1",
                    params![order_id],
                    |row| parse_column(row, 0),
                )
                .optional()?
                .ok_or_else(|| order_not_found(&order_id))?;
            if !status.is_detached() {
                return Err(AppError::Conflict(format!(
                    "order {order_id} is {status}, cannot seed a route"
                )));
            }

            tx.execute(
                "INSERT INTO routes (status, navigation_link, created_at) VALUES (?1, ?2, ?3)",
                params![RouteStatus::Created.as_str(), navigation_link, Utc::now()],
            )?;
            let route_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO route_stops (route_id, order_id, sequence) VALUES (?1, ?2, 1)",
                params![route_id, order_id],
            )?;
            tx.execute(
                "UPDATE orders SET status = ?1 WHERE id = ?2",
                params![OrderStatus::Routed.as_str(), order_id],
            )?;

            tx.commit()?;
            Ok(route_id)
        })
        .await
    }

    async fn persist_route(&self, route: &Route) -> Result<(), AppError> {
        let route = route.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            write_route(&tx, &route)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn release_order(
        &self,
        route: &Route,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), AppError> {
        let route = route.clone();
        let order_id = order_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            write_route(&tx, &route)?;

            let released = tx.execute(
                "UPDATE orders SET status = ?1 WHERE id = ?2",
                params![status.as_str(), order_id],
            )?;
            if released == 0 {
                return Err(order_not_found(&order_id));
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn set_route_status(&self, id: RouteId, status: RouteStatus) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE routes SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            if updated == 0 {
                return Err(route_not_found(id));
            }
            Ok(())
        })
        .await
    }

    async fn complete_route(&self, id: RouteId) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE routes SET status = ?1 WHERE id = ?2",
                params![RouteStatus::Completed.as_str(), id],
            )?;
            if updated == 0 {
                return Err(route_not_found(id));
            }

            tx.execute(
                r#"
                UPDATE orders SET status = ?1
                WHERE id IN (SELECT order_id FROM route_stops WHERE route_id = ?2)
                "#,
                params![OrderStatus::Delivered.as_str(), id],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn bind_courier(&self, route_id: RouteId, courier_id: CourierId) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            let known: Option<CourierId> = conn
                .query_row(
                    "SELECT id FROM couriers WHERE id = ?1",
                    params![courier_id],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Err(courier_not_found(courier_id));
            }

            let updated = conn.execute(
                "UPDATE routes SET courier_id = ?1 WHERE id = ?2",
                params![courier_id, route_id],
            )?;
            if updated == 0 {
                return Err(route_not_found(route_id));
            }
            Ok(())
        })
        .await
    }

    async fn unbind_courier(&self, route_id: RouteId) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE routes SET courier_id = NULL WHERE id = ?1",
                params![route_id],
            )?;
            if updated == 0 {
                return Err(route_not_found(route_id));
            }
            Ok(())
        })
        .await
    }

    async fn create_courier(&self, name: &str, phone: Option<&str>) -> Result<Courier, AppError> {
        let name = name.to_string();
        let phone = phone.map(str::to_string);
        self.with_conn(move |conn| {
            let updated_at = Utc::now();
            conn.execute(
                "INSERT INTO couriers (name, phone, status, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![name, phone, CourierStatus::Available.as_str(), updated_at],
            )?;

            Ok(Courier {
                id: conn.last_insert_rowid(),
                name,
                phone,
                status: CourierStatus::Available,
                updated_at,
            })
        })
        .await
    }

    async fn list_couriers(&self) -> Result<Vec<Courier>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, phone, status, updated_at FROM couriers ORDER BY id")?;
            let couriers = stmt
                .query_map([], courier_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(couriers)
        })
        .await
    }

    async fn get_courier(&self, id: CourierId) -> Result<Option<Courier>, AppError> {
        self.with_conn(move |conn| {
            let courier = conn
                .query_row(
                    "SELECT id, name, phone, status, updated_at FROM couriers WHERE id = ?1",
                    params![id],
                    courier_from_row,
                )
                .optional()?;
            Ok(courier)
        })
        .await
    }

    async fn set_courier_status(
        &self,
        id: CourierId,
        status: CourierStatus,
    ) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE couriers SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now(), id],
            )?;
            if updated == 0 {
                return Err(courier_not_found(id));
            }
            Ok(())
        })
        .await
    }
}
