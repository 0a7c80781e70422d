//! Database module for song persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Operations take a `&mut SqliteConnection` so they run equally inside a
//! long-lived write transaction (the reconciliation batch) or on a plain
//! pooled connection.
//!
//! # Example
//!
//! ```ignore
//! use songkeeper::db::{init_db, get_song_by_uri};
//!
//! let pool = init_db(Path::new("songkeeper.db")).await?;
//! let mut tx = pool.begin().await?;
//! let song = get_song_by_uri(&mut tx, "Waltz/Strauss/Blue Danube.mp3").await?;
//! ```

use std::path::Path;

use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::model::{Song, TagMap};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "songkeeper.db";

const SONG_COLUMNS: &str = "id, uri, tags, date_added, prefix_len, prevent_rename";

/// Open (creating if needed) the database at `path` and run migrations.
///
/// The rollback journal is used rather than WAL so the database stays a
/// single file that can be renamed into place.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be created or opened
/// - Migration fails
pub async fn init_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Database row for the songs table.
#[derive(Debug, sqlx::FromRow)]
struct SongRow {
    id: i64,
    uri: String,
    tags: String,
    date_added: String,
    prefix_len: i64,
    prevent_rename: bool,
}

impl From<SongRow> for Song {
    fn from(row: SongRow) -> Self {
        let tags: TagMap = serde_json::from_str(&row.tags).unwrap_or_else(|e| {
            tracing::warn!(target: "db", id = row.id, error = %e, "Unreadable tag data");
            TagMap::new()
        });
        Song {
            id: Some(row.id),
            uri: row.uri,
            tags,
            date_added: row.date_added,
            prefix_len: row.prefix_len,
            prevent_rename: row.prevent_rename,
        }
    }
}

fn tags_json(song: &Song) -> String {
    // A BTreeMap of plain strings always serializes
    serde_json::to_string(&song.tags).unwrap_or_else(|_| "{}".to_string())
}

/// Position after which [`fetch_songs_page`] continues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongCursor {
    pub uri: String,
    pub id: i64,
}

impl SongCursor {
    pub fn after(song: &Song) -> Self {
        Self {
            uri: song.uri.clone(),
            id: song.id.unwrap_or_default(),
        }
    }
}

/// Get the song stored at `uri`. With duplicates, the lowest id wins.
pub async fn get_song_by_uri(conn: &mut SqliteConnection, uri: &str) -> sqlx::Result<Option<Song>> {
    let row: Option<SongRow> = sqlx::query_as(&format!(
        "SELECT {SONG_COLUMNS} FROM songs WHERE uri = ? ORDER BY id LIMIT 1"
    ))
    .bind(uri)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Song::from))
}

/// Number of song records.
pub async fn count_songs(conn: &mut SqliteConnection) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM songs")
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Highest song id in use, `0` when empty.
pub async fn max_song_id(conn: &mut SqliteConnection) -> sqlx::Result<i64> {
    let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM songs")
        .fetch_one(conn)
        .await?;
    Ok(max.unwrap_or(0))
}

/// Fetch up to `limit` songs ordered by location then id, starting after
/// `cursor`. Duplicate locations come back adjacent.
pub async fn fetch_songs_page(
    conn: &mut SqliteConnection,
    cursor: &SongCursor,
    limit: u32,
) -> sqlx::Result<Vec<Song>> {
    let rows: Vec<SongRow> = sqlx::query_as(&format!(
        "SELECT {SONG_COLUMNS} FROM songs \
         WHERE uri > ?1 OR (uri = ?1 AND id > ?2) \
         ORDER BY uri, id LIMIT ?3"
    ))
    .bind(&cursor.uri)
    .bind(cursor.id)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Song::from).collect())
}

/// Fetch up to `limit` songs with ids above `after_id`, in id order.
pub async fn fetch_songs_by_id(
    conn: &mut SqliteConnection,
    after_id: i64,
    limit: u32,
) -> sqlx::Result<Vec<Song>> {
    let rows: Vec<SongRow> = sqlx::query_as(&format!(
        "SELECT {SONG_COLUMNS} FROM songs WHERE id > ? ORDER BY id LIMIT ?"
    ))
    .bind(after_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Song::from).collect())
}

/// Get all songs ordered by location.
pub async fn get_all_songs(pool: &SqlitePool) -> sqlx::Result<Vec<Song>> {
    let rows: Vec<SongRow> = sqlx::query_as(&format!(
        "SELECT {SONG_COLUMNS} FROM songs ORDER BY uri, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Song::from).collect())
}

/// Insert a song, keeping its id when it has one.
///
/// # Returns
///
/// The database ID of the new record.
pub async fn insert_song(conn: &mut SqliteConnection, song: &Song) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO songs (id, uri, tags, date_added, prefix_len, prevent_rename, last_updated)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(song.id)
    .bind(&song.uri)
    .bind(tags_json(song))
    .bind(&song.date_added)
    .bind(song.prefix_len)
    .bind(song.prevent_rename)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Update an existing song by id. Returns the number of rows changed.
pub async fn update_song(conn: &mut SqliteConnection, song: &Song) -> sqlx::Result<u64> {
    let Some(id) = song.id else {
        return Ok(0);
    };
    let result = sqlx::query(
        r#"
        UPDATE songs SET
            uri = ?, tags = ?, date_added = ?, prefix_len = ?,
            prevent_rename = ?, last_updated = ?
        WHERE id = ?
        "#,
    )
    .bind(&song.uri)
    .bind(tags_json(song))
    .bind(&song.date_added)
    .bind(song.prefix_len)
    .bind(song.prevent_rename)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// How [`save_song`] stored a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saved {
    Inserted(i64),
    Updated(i64),
}

/// Update the song if its id exists in this database, otherwise insert it.
pub async fn save_song(conn: &mut SqliteConnection, song: &Song) -> sqlx::Result<Saved> {
    if let Some(id) = song.id
        && update_song(&mut *conn, song).await? > 0
    {
        return Ok(Saved::Updated(id));
    }
    insert_song(conn, song).await.map(Saved::Inserted)
}
