//! SQLite-backed directory store.
//!
//! Apps are stored as a JSON body plus side tables that index the
//! list-valued fields (explicit agencies, countries, city slugs) so that the
//! membership queries stay indexed. Each entity write runs in its own
//! transaction; nothing spans entities.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, Row, ToSql, Transaction, params, params_from_iter};
use thiserror::Error;

use super::{
    AppFilter, DirectoryStore, EntityStream, ProgressRecord, StoreError, Visibility, deferred_rows,
};
use crate::{
    Agency, AgencyKey, AppKey, BoundingBox, LocationKey, TransitApp, TransitAppLocation,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agencies (
    key INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    short_name TEXT,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    country TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    agency_url TEXT,
    arrival_data TEXT,
    position_data TEXT,
    date_opened TEXT
);
CREATE INDEX IF NOT EXISTS agencies_by_point ON agencies (latitude, longitude);
CREATE INDEX IF NOT EXISTS agencies_by_opened ON agencies (date_opened);

CREATE TABLE IF NOT EXISTS apps (
    key INTEGER PRIMARY KEY,
    slug TEXT NOT NULL,
    is_hidden INTEGER NOT NULL,
    supports_all_public_agencies INTEGER NOT NULL,
    supports_entire_world INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS apps_by_slug ON apps (slug);

CREATE TABLE IF NOT EXISTS app_agencies (
    app INTEGER NOT NULL,
    position INTEGER NOT NULL,
    agency INTEGER NOT NULL,
    PRIMARY KEY (app, position)
);
CREATE INDEX IF NOT EXISTS app_agencies_by_agency ON app_agencies (agency);

CREATE TABLE IF NOT EXISTS app_countries (
    app INTEGER NOT NULL,
    position INTEGER NOT NULL,
    country TEXT NOT NULL,
    PRIMARY KEY (app, position)
);
CREATE INDEX IF NOT EXISTS app_countries_by_country ON app_countries (country);

CREATE TABLE IF NOT EXISTS app_city_slugs (
    app INTEGER NOT NULL,
    position INTEGER NOT NULL,
    city_slug TEXT NOT NULL,
    PRIMARY KEY (app, position)
);
CREATE INDEX IF NOT EXISTS app_city_slugs_by_slug ON app_city_slugs (city_slug);

CREATE TABLE IF NOT EXISTS locations (
    key INTEGER PRIMARY KEY,
    app INTEGER NOT NULL,
    city_slug TEXT NOT NULL,
    city_details TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS locations_by_point ON locations (latitude, longitude);
CREATE INDEX IF NOT EXISTS locations_by_app ON locations (app);

CREATE TABLE IF NOT EXISTS progress (
    token TEXT PRIMARY KEY,
    info BLOB,
    agencies BLOB,
    screen_shot_families TEXT NOT NULL,
    last_updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS progress_by_last_updated ON progress (last_updated);

CREATE TABLE IF NOT EXISTS key_sequences (
    kind TEXT PRIMARY KEY,
    next INTEGER NOT NULL
);
";

const AGENCY_COLUMNS: &str = "key, name, short_name, city, state, country, latitude, longitude, \
     agency_url, arrival_data, position_data, date_opened";
const LOCATION_COLUMNS: &str = "key, app, city_slug, city_details, latitude, longitude";
const PROGRESS_COLUMNS: &str = "token, info, agencies, screen_shot_families, last_updated";

/// Error raised while opening a [`SqliteDirectoryStore`].
#[derive(Debug, Error)]
pub enum SqliteDirectoryStoreError {
    /// The directory holding the database could not be created.
    #[error("failed to create parent directory for {path}: {source}")]
    CreateParent {
        /// Database path whose parent was being created.
        path: Utf8PathBuf,
        /// Filesystem failure.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}: {source}")]
    OpenDatabase {
        /// Location of the database.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating tables or indices failed.
    #[error("failed to apply directory schema: {0}")]
    Schema(#[source] rusqlite::Error),
}

/// Directory store persisted in a single SQLite database.
pub struct SqliteDirectoryStore {
    connection: Connection,
}

impl fmt::Debug for SqliteDirectoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDirectoryStore")
            .field("path", &self.connection.path())
            .finish_non_exhaustive()
    }
}

impl SqliteDirectoryStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Utf8Path) -> Result<Self, SqliteDirectoryStoreError> {
        wayfare_fs::ensure_parent_dir(path).map_err(|source| {
            SqliteDirectoryStoreError::CreateParent {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let connection = Connection::open(path.as_std_path()).map_err(|source| {
            SqliteDirectoryStoreError::OpenDatabase {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::with_connection(connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, SqliteDirectoryStoreError> {
        let connection = Connection::open_in_memory().map_err(|source| {
            SqliteDirectoryStoreError::OpenDatabase {
                path: Utf8PathBuf::from(":memory:"),
                source,
            }
        })?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> Result<Self, SqliteDirectoryStoreError> {
        connection
            .execute_batch(SCHEMA)
            .map_err(SqliteDirectoryStoreError::Schema)?;
        Ok(Self { connection })
    }

    fn query_rows<T, P, F>(
        &self,
        operation: &'static str,
        sql: &str,
        params: P,
        decode: F,
    ) -> Result<Vec<T>, StoreError>
    where
        P: rusqlite::Params,
        F: Fn(&Row<'_>) -> Result<T, StoreError>,
    {
        let mut statement = self
            .connection
            .prepare_cached(sql)
            .map_err(classify(operation))?;
        let mut rows = statement.query(params).map_err(classify(operation))?;
        let mut decoded = Vec::new();
        while let Some(row) = rows.next().map_err(classify(operation))? {
            decoded.push(decode(row)?);
        }
        Ok(decoded)
    }

    fn query_one<T, P, F>(
        &self,
        operation: &'static str,
        sql: &str,
        params: P,
        decode: F,
    ) -> Result<Option<T>, StoreError>
    where
        P: rusqlite::Params,
        F: Fn(&Row<'_>) -> Result<T, StoreError>,
    {
        Ok(self
            .query_rows(operation, sql, params, decode)?
            .into_iter()
            .next())
    }

    fn write<F>(&mut self, operation: &'static str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<()>,
    {
        let run = |connection: &mut Connection| -> rusqlite::Result<()> {
            let transaction = connection.transaction()?;
            apply(&transaction)?;
            transaction.commit()
        };
        run(&mut self.connection).map_err(classify(operation))
    }

    fn reserve_key(&mut self, kind: &'static str, table: &'static str) -> Result<u64, StoreError> {
        let mut reserved = 0;
        self.write("reserve_key", |tx| {
            tx.execute(
                "INSERT INTO key_sequences (kind, next) VALUES (?1, 1) ON CONFLICT (kind) DO NOTHING",
                params![kind],
            )?;
            let sequence: u64 = tx.query_row(
                "SELECT next FROM key_sequences WHERE kind = ?1",
                params![kind],
                |row| row.get(0),
            )?;
            let after_max: u64 = tx.query_row(
                &format!("SELECT COALESCE(MAX(key), 0) + 1 FROM {table}"),
                [],
                |row| row.get(0),
            )?;
            reserved = sequence.max(after_max);
            tx.execute(
                "UPDATE key_sequences SET next = ?2 WHERE kind = ?1",
                params![kind, reserved + 1],
            )?;
            Ok(())
        })?;
        Ok(reserved)
    }
}

fn classify(operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |error| match error.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StoreError::Timeout { operation }
        }
        Some(ErrorCode::CannotOpen | ErrorCode::ReadOnly | ErrorCode::DiskFull) => {
            StoreError::Unavailable { operation }
        }
        _ => StoreError::Sqlite(error),
    }
}

fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(entity: &'static str, key: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|source| StoreError::Corrupt {
            entity,
            key: key.to_owned(),
            source: Box::new(source),
        })
}

fn read_agency(row: &Row<'_>) -> Result<Agency, StoreError> {
    let key = AgencyKey(row.get(0)?);
    let date_opened: Option<String> = row.get(11)?;
    let date_opened = date_opened
        .map(|raw| decode_time("agency", &key.to_string(), &raw))
        .transpose()?;
    Ok(Agency {
        key,
        name: row.get(1)?,
        short_name: row.get(2)?,
        city: row.get(3)?,
        state: row.get(4)?,
        country: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        agency_url: row.get(8)?,
        arrival_data: row.get(9)?,
        position_data: row.get(10)?,
        date_opened,
    })
}

fn read_app(row: &Row<'_>) -> Result<TransitApp, StoreError> {
    let key: u64 = row.get(0)?;
    let body: String = row.get(1)?;
    serde_json::from_str(&body).map_err(|source| StoreError::Corrupt {
        entity: "app",
        key: AppKey(key).to_string(),
        source: Box::new(source),
    })
}

fn read_location(row: &Row<'_>) -> Result<TransitAppLocation, StoreError> {
    Ok(TransitAppLocation {
        key: LocationKey(row.get(0)?),
        app: AppKey(row.get(1)?),
        city_slug: row.get(2)?,
        city_details: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
    })
}

fn read_progress(row: &Row<'_>) -> Result<ProgressRecord, StoreError> {
    let token: String = row.get(0)?;
    let families: String = row.get(3)?;
    let screen_shot_families =
        serde_json::from_str(&families).map_err(|source| StoreError::Corrupt {
            entity: "progress",
            key: token.clone(),
            source: Box::new(source),
        })?;
    let last_updated: String = row.get(4)?;
    let last_updated = decode_time("progress", &token, &last_updated)?;
    Ok(ProgressRecord {
        info: row.get(1)?,
        agencies: row.get(2)?,
        screen_shot_families,
        last_updated,
        token,
    })
}

fn app_query(filter: &AppFilter, visibility: Visibility) -> (String, Option<Box<dyn ToSql>>) {
    let (predicate, param): (&str, Option<Box<dyn ToSql>>) = match filter {
        AppFilter::All => ("1 = 1", None),
        AppFilter::ExplicitAgency(agency) => (
            "key IN (SELECT app FROM app_agencies WHERE agency = ?1)",
            Some(Box::new(agency.get())),
        ),
        AppFilter::SupportsAllPublicAgencies => ("supports_all_public_agencies = 1", None),
        AppFilter::Country(code) => (
            "key IN (SELECT app FROM app_countries WHERE country = ?1)",
            Some(Box::new(code.clone())),
        ),
        AppFilter::CitySlug(slug) => (
            "key IN (SELECT app FROM app_city_slugs WHERE city_slug = ?1)",
            Some(Box::new(slug.clone())),
        ),
        AppFilter::EntireWorld => ("supports_entire_world = 1", None),
    };
    let hidden = match visibility {
        Visibility::VisibleOnly => " AND is_hidden = 0",
        Visibility::IncludeHidden => "",
    };
    (
        format!("SELECT key, body FROM apps WHERE {predicate}{hidden} ORDER BY key"),
        param,
    )
}

fn box_params(bbox: &BoundingBox, max_results: usize) -> [Box<dyn ToSql>; 5] {
    [
        Box::new(bbox.south),
        Box::new(bbox.north),
        Box::new(bbox.west),
        Box::new(bbox.east),
        Box::new(max_results),
    ]
}

impl DirectoryStore for SqliteDirectoryStore {
    fn agency(&self, key: AgencyKey) -> Result<Option<Agency>, StoreError> {
        self.query_one(
            "agency",
            &format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE key = ?1"),
            params![key.get()],
            read_agency,
        )
    }

    fn agencies(&self, keys: Vec<AgencyKey>) -> EntityStream<'_, Agency> {
        Box::new(
            keys.into_iter()
                .filter_map(move |key| self.agency(key).transpose()),
        )
    }

    fn all_agencies(&self) -> EntityStream<'_, Agency> {
        deferred_rows(move || {
            self.query_rows(
                "all_agencies",
                &format!("SELECT {AGENCY_COLUMNS} FROM agencies ORDER BY key"),
                [],
                read_agency,
            )
        })
    }

    fn public_agencies(&self) -> EntityStream<'_, Agency> {
        deferred_rows(move || {
            self.query_rows(
                "public_agencies",
                &format!(
                    "SELECT {AGENCY_COLUMNS} FROM agencies WHERE date_opened IS NOT NULL ORDER BY key"
                ),
                [],
                read_agency,
            )
        })
    }

    fn agencies_in_box(&self, bbox: &BoundingBox, max_results: usize) -> EntityStream<'_, Agency> {
        let params = box_params(bbox, max_results);
        deferred_rows(move || {
            self.query_rows(
                "agencies_in_box",
                &format!(
                    "SELECT {AGENCY_COLUMNS} FROM agencies \
                     WHERE latitude BETWEEN ?1 AND ?2 AND longitude BETWEEN ?3 AND ?4 \
                     ORDER BY key LIMIT ?5"
                ),
                params_from_iter(params.iter()),
                read_agency,
            )
        })
    }

    fn app(&self, key: AppKey) -> Result<Option<TransitApp>, StoreError> {
        self.query_one(
            "app",
            "SELECT key, body FROM apps WHERE key = ?1",
            params![key.get()],
            read_app,
        )
    }

    fn app_for_slug(
        &self,
        slug: &str,
        visibility: Visibility,
    ) -> Result<Option<TransitApp>, StoreError> {
        let hidden = match visibility {
            Visibility::VisibleOnly => " AND is_hidden = 0",
            Visibility::IncludeHidden => "",
        };
        self.query_one(
            "app_for_slug",
            &format!("SELECT key, body FROM apps WHERE slug = ?1{hidden} ORDER BY key LIMIT 1"),
            params![slug],
            read_app,
        )
    }

    fn apps(&self, filter: AppFilter, visibility: Visibility) -> EntityStream<'_, TransitApp> {
        deferred_rows(move || {
            let (sql, param) = app_query(&filter, visibility);
            self.query_rows("apps", &sql, params_from_iter(param.iter()), read_app)
        })
    }

    fn locations_in_box(
        &self,
        bbox: &BoundingBox,
        max_results: usize,
    ) -> EntityStream<'_, TransitAppLocation> {
        let params = box_params(bbox, max_results);
        deferred_rows(move || {
            self.query_rows(
                "locations_in_box",
                &format!(
                    "SELECT {LOCATION_COLUMNS} FROM locations \
                     WHERE latitude BETWEEN ?1 AND ?2 AND longitude BETWEEN ?3 AND ?4 \
                     ORDER BY key LIMIT ?5"
                ),
                params_from_iter(params.iter()),
                read_location,
            )
        })
    }

    fn locations_for_app(&self, app: AppKey) -> EntityStream<'_, TransitAppLocation> {
        deferred_rows(move || {
            self.query_rows(
                "locations_for_app",
                &format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE app = ?1 ORDER BY key"),
                params![app.get()],
                read_location,
            )
        })
    }

    fn all_locations(&self) -> EntityStream<'_, TransitAppLocation> {
        deferred_rows(move || {
            self.query_rows(
                "all_locations",
                &format!("SELECT {LOCATION_COLUMNS} FROM locations ORDER BY key"),
                [],
                read_location,
            )
        })
    }

    fn reserve_agency_key(&mut self) -> Result<AgencyKey, StoreError> {
        self.reserve_key("agency", "agencies").map(AgencyKey)
    }

    fn reserve_app_key(&mut self) -> Result<AppKey, StoreError> {
        self.reserve_key("app", "apps").map(AppKey)
    }

    fn reserve_location_key(&mut self) -> Result<LocationKey, StoreError> {
        self.reserve_key("location", "locations").map(LocationKey)
    }

    fn put_agency(&mut self, agency: &Agency) -> Result<(), StoreError> {
        self.write("put_agency", |tx| {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO agencies ({AGENCY_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    agency.key.get(),
                    agency.name,
                    agency.short_name,
                    agency.city,
                    agency.state,
                    agency.country,
                    agency.latitude,
                    agency.longitude,
                    agency.agency_url,
                    agency.arrival_data,
                    agency.position_data,
                    agency.date_opened.map(encode_time),
                ],
            )?;
            Ok(())
        })
    }

    fn put_app(&mut self, app: &TransitApp) -> Result<(), StoreError> {
        let body = serde_json::to_string(app).map_err(|source| StoreError::Corrupt {
            entity: "app",
            key: app.key.to_string(),
            source: Box::new(source),
        })?;
        let key = app.key.get();
        self.write("put_app", |tx| {
            tx.execute(
                "INSERT OR REPLACE INTO apps \
                 (key, slug, is_hidden, supports_all_public_agencies, supports_entire_world, body) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key,
                    app.slug,
                    app.is_hidden,
                    app.supports_all_public_agencies,
                    app.explicitly_supports_the_entire_world,
                    body,
                ],
            )?;
            for table in ["app_agencies", "app_countries", "app_city_slugs"] {
                tx.execute(&format!("DELETE FROM {table} WHERE app = ?1"), params![key])?;
            }
            for (position, agency) in app.explicitly_supported_agency_keys.iter().enumerate() {
                tx.execute(
                    "INSERT INTO app_agencies (app, position, agency) VALUES (?1, ?2, ?3)",
                    params![key, position, agency.get()],
                )?;
            }
            for (position, country) in app.explicitly_supported_countries.iter().enumerate() {
                tx.execute(
                    "INSERT INTO app_countries (app, position, country) VALUES (?1, ?2, ?3)",
                    params![key, position, country],
                )?;
            }
            for (position, slug) in app.explicitly_supported_city_slugs.iter().enumerate() {
                tx.execute(
                    "INSERT INTO app_city_slugs (app, position, city_slug) VALUES (?1, ?2, ?3)",
                    params![key, position, slug],
                )?;
            }
            Ok(())
        })
    }

    fn delete_app(&mut self, key: AppKey) -> Result<(), StoreError> {
        self.write("delete_app", |tx| {
            for table in ["app_agencies", "app_countries", "app_city_slugs"] {
                tx.execute(&format!("DELETE FROM {table} WHERE app = ?1"), params![key.get()])?;
            }
            tx.execute("DELETE FROM apps WHERE key = ?1", params![key.get()])?;
            Ok(())
        })
    }

    fn put_location(&mut self, location: &TransitAppLocation) -> Result<(), StoreError> {
        self.write("put_location", |tx| {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO locations ({LOCATION_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    location.key.get(),
                    location.app.get(),
                    location.city_slug,
                    location.city_details,
                    location.latitude,
                    location.longitude,
                ],
            )?;
            Ok(())
        })
    }

    fn delete_location(&mut self, key: LocationKey) -> Result<(), StoreError> {
        self.write("delete_location", |tx| {
            tx.execute("DELETE FROM locations WHERE key = ?1", params![key.get()])?;
            Ok(())
        })
    }

    fn progress(&self, token: &str) -> Result<Option<ProgressRecord>, StoreError> {
        self.query_one(
            "progress",
            &format!("SELECT {PROGRESS_COLUMNS} FROM progress WHERE token = ?1"),
            params![token],
            read_progress,
        )
    }

    fn put_progress(&mut self, record: &ProgressRecord) -> Result<(), StoreError> {
        let families =
            serde_json::to_string(&record.screen_shot_families).map_err(|source| {
                StoreError::Corrupt {
                    entity: "progress",
                    key: record.token.clone(),
                    source: Box::new(source),
                }
            })?;
        self.write("put_progress", |tx| {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO progress ({PROGRESS_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    record.token,
                    record.info,
                    record.agencies,
                    families,
                    encode_time(record.last_updated),
                ],
            )?;
            Ok(())
        })
    }

    fn delete_progress(&mut self, token: &str) -> Result<(), StoreError> {
        self.write("delete_progress", |tx| {
            tx.execute("DELETE FROM progress WHERE token = ?1", params![token])?;
            Ok(())
        })
    }

    fn progress_updated_before(&self, cutoff: DateTime<Utc>) -> EntityStream<'_, ProgressRecord> {
        let cutoff = encode_time(cutoff);
        deferred_rows(move || {
            self.query_rows(
                "progress_updated_before",
                &format!(
                    "SELECT {PROGRESS_COLUMNS} FROM progress WHERE last_updated < ?1 \
                     ORDER BY last_updated"
                ),
                params![cutoff],
                read_progress,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::square_bounding_box_centered_at;
    use crate::test_support::{agency, app, location, opened};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn store() -> SqliteDirectoryStore {
        SqliteDirectoryStore::open_in_memory().expect("open in-memory store")
    }

    #[rstest]
    fn creates_parent_directories() {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("nested/deeper/directory.db"))
            .expect("utf-8 temp path");
        let mut store = SqliteDirectoryStore::open(&path).expect("open store");
        store
            .put_agency(&agency(1, "Metro", 47.6, -122.3))
            .expect("put agency");
        drop(store);

        let reopened = SqliteDirectoryStore::open(&path).expect("reopen store");
        assert_eq!(
            reopened.agency(AgencyKey(1)).expect("read").map(|a| a.name),
            Some("Metro".to_string())
        );
    }

    #[rstest]
    fn app_round_trips_through_body_and_side_tables(mut store: SqliteDirectoryStore) {
        let mut saved = app(4, "Seattle Transit");
        saved.add_explicit_agencies([AgencyKey(1), AgencyKey(2)]);
        saved.add_countries(["US"]);
        saved.explicitly_supported_city_slugs.push("seattle".into());
        saved
            .explicitly_supported_city_details
            .push("Seattle, WA, US".into());
        store.put_app(&saved).expect("put app");

        assert_eq!(store.app(AppKey(4)).expect("read"), Some(saved.clone()));
        for filter in [
            AppFilter::ExplicitAgency(AgencyKey(2)),
            AppFilter::Country("US".into()),
            AppFilter::CitySlug("seattle".into()),
        ] {
            let found: Vec<_> = store
                .apps(filter, Visibility::VisibleOnly)
                .map(|app| app.expect("app").key)
                .collect();
            assert_eq!(found, [AppKey(4)]);
        }
    }

    #[rstest]
    fn rewriting_an_app_replaces_side_rows(mut store: SqliteDirectoryStore) {
        let mut saved = app(1, "Rewritten");
        saved.add_countries(["US"]);
        store.put_app(&saved).expect("put app");
        saved.clear_explicit_locations();
        saved.add_countries(["DE"]);
        store.put_app(&saved).expect("rewrite app");

        assert_eq!(
            store
                .apps(AppFilter::Country("US".into()), Visibility::VisibleOnly)
                .count(),
            0
        );
        assert_eq!(
            store
                .apps(AppFilter::Country("DE".into()), Visibility::VisibleOnly)
                .count(),
            1
        );
    }

    #[rstest]
    fn hidden_apps_need_include_hidden(mut store: SqliteDirectoryStore) {
        let mut hidden = app(1, "Hidden");
        hidden.is_hidden = true;
        store.put_app(&hidden).expect("put app");
        assert_eq!(store.apps(AppFilter::All, Visibility::VisibleOnly).count(), 0);
        assert_eq!(store.apps(AppFilter::All, Visibility::IncludeHidden).count(), 1);
        assert!(
            store
                .app_for_slug("hidden", Visibility::VisibleOnly)
                .expect("query")
                .is_none()
        );
    }

    #[rstest]
    fn box_fetch_respects_bounds_and_cap(mut store: SqliteDirectoryStore) {
        for key in 1..=3 {
            store
                .put_location(&location(key, 1, "Philadelphia", 39.952335, -75.163789))
                .expect("put location");
        }
        store
            .put_location(&location(9, 2, "Seattle", 47.6062095, -122.3320708))
            .expect("put location");
        let bbox = square_bounding_box_centered_at(39.952335, -75.163789, 50.0);
        let keys: Vec<_> = store
            .locations_in_box(&bbox, 2)
            .map(|row| row.expect("row").key)
            .collect();
        assert_eq!(keys, [LocationKey(1), LocationKey(2)]);
    }

    #[rstest]
    fn public_agencies_keep_their_opening_date(mut store: SqliteDirectoryStore) {
        store
            .put_agency(&opened(agency(1, "Public", 0.0, 0.0)))
            .expect("put agency");
        store
            .put_agency(&agency(2, "Private", 0.0, 0.0))
            .expect("put agency");
        let public: Vec<_> = store
            .public_agencies()
            .map(|agency| agency.expect("agency"))
            .collect();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].key, AgencyKey(1));
        assert!(public[0].is_public());
    }

    #[rstest]
    fn reserved_keys_skip_existing_rows(mut store: SqliteDirectoryStore) {
        store.put_app(&app(7, "Existing")).expect("put app");
        assert_eq!(store.reserve_app_key().expect("reserve"), AppKey(8));
        assert_eq!(store.reserve_app_key().expect("reserve"), AppKey(9));
        assert_eq!(store.reserve_agency_key().expect("reserve"), AgencyKey(1));
    }

    #[rstest]
    fn progress_sweep_query_orders_oldest_first(mut store: SqliteDirectoryStore) {
        let base = DateTime::<Utc>::UNIX_EPOCH;
        for (token, hours) in [("b", 2), ("a", 1), ("c", 5)] {
            let record = ProgressRecord::new(token, base + chrono::Duration::hours(hours));
            store.put_progress(&record).expect("put progress");
        }
        let stale: Vec<_> = store
            .progress_updated_before(base + chrono::Duration::hours(3))
            .map(|record| record.expect("record").token)
            .collect();
        assert_eq!(stale, ["a", "b"]);
        assert!(store.progress("c").expect("lookup").is_some());
    }

    #[rstest]
    fn corrupt_app_bodies_are_reported(store: SqliteDirectoryStore) {
        store
            .connection
            .execute(
                "INSERT INTO apps (key, slug, is_hidden, supports_all_public_agencies, \
                 supports_entire_world, body) VALUES (3, 'broken', 0, 0, 0, 'not-json')",
                [],
            )
            .expect("insert row");
        let error = store.app(AppKey(3)).expect_err("corrupt body should fail");
        assert!(matches!(error, StoreError::Corrupt { entity: "app", .. }));
    }
}
