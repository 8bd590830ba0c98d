use crate::error::ReviewError;
use crate::models::movie::{canonical_name, MovieSummary};
use crate::models::review::{
    average_score, Review, UserReview, MAX_COMMENT_LEN, MAX_SCORE, MIN_SCORE,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Most movie names `search_movies` will return.
pub const SEARCH_LIMIT: usize = 8;

const IN_MEMORY: &str = ":memory:";

/// Durable store of movies and their per-author reviews.
///
/// Every operation runs in its own transaction on a single shared
/// connection. Writes commit atomically; there is no way to group several
/// operations into one transaction from the outside, except for
/// [`ReviewStore::retract_review`] which bundles the cascading delete.
#[derive(Debug, Clone)]
pub struct ReviewStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReviewStore {
    // Open a connection without touching the schema
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, ReviewError> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if db_path != Path::new(IN_MEMORY) {
            let mode: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!(journal_mode = %mode, "journal mode set");
        }
        info!(path = %db_path.display(), "review database connection established");
        Ok(ReviewStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the database at `db_path` and make sure the schema exists.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, ReviewError> {
        let store = Self::new(db_path)?;
        store.create_schema().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, ReviewError> {
        Self::open(IN_MEMORY).await
    }

    pub async fn create_schema(&self) -> Result<(), ReviewError> {
        let conn = self.conn.lock().await;

        // 1. Movies table
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS movies (
                name TEXT PRIMARY KEY
            );",
        )?;

        // 2. Reviews table, one row per (movie, author)
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reviews (
                movie TEXT NOT NULL,
                author_id TEXT NOT NULL,
                score REAL NOT NULL,
                comment TEXT NOT NULL,
                PRIMARY KEY (movie, author_id),
                FOREIGN KEY (movie) REFERENCES movies(name) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS reviews_by_author ON reviews (author_id);",
        )?;

        info!("review schema ready");
        Ok(())
    }

    // Reads share the connection lock with writes, so they never overlap
    // each other or a write.
    async fn read_tx<T, F>(&self, f: F) -> Result<T, ReviewError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, ReviewError>,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.finish()?;
        Ok(value)
    }

    // Any error returned by `f` drops the transaction, which rolls it back.
    async fn write_tx<T, F>(&self, f: F) -> Result<T, ReviewError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, ReviewError>,
    {
        let lock_start = std::time::Instant::now();
        let mut conn = self.conn.lock().await;
        debug!(waited = ?lock_start.elapsed(), "store lock acquired");
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Insert or overwrite `review` under its author, creating the movie on
    /// first review.
    pub async fn add_review(&self, movie: &str, review: &Review) -> Result<(), ReviewError> {
        let movie = canonical_name(movie)?;
        validate_review(review)?;

        self.write_tx(|tx| {
            tx.execute("INSERT OR IGNORE INTO movies (name) VALUES (?)", [&movie])?;
            tx.execute(
                "INSERT INTO reviews (movie, author_id, score, comment)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(movie, author_id) DO UPDATE SET
                    score = excluded.score,
                    comment = excluded.comment",
                params![&movie, &review.author_id, review.score, &review.comment],
            )?;
            Ok(())
        })
        .await?;

        info!(movie = %movie, author = %review.author_id, score = review.score, "review saved");
        Ok(())
    }

    /// Create a movie with no reviews. Fails if it already exists.
    pub async fn add_movie(&self, movie: &str) -> Result<(), ReviewError> {
        let movie = canonical_name(movie)?;

        self.write_tx(|tx| {
            if movie_exists(tx, &movie)? {
                return Err(ReviewError::AlreadyExists(movie.clone()));
            }
            tx.execute("INSERT INTO movies (name) VALUES (?)", [&movie])?;
            Ok(())
        })
        .await?;

        info!(movie = %movie, "movie created");
        Ok(())
    }

    /// All reviews of a movie along with their mean score.
    pub async fn get_reviews(&self, movie: &str) -> Result<(Vec<Review>, f64), ReviewError> {
        let movie = canonical_name(movie)?;

        let reviews = self
            .read_tx(|tx| {
                if !movie_exists(tx, &movie)? {
                    return Err(ReviewError::NotFound(movie.clone()));
                }
                Ok(reviews_of(tx, &movie)?)
            })
            .await?;

        let average = average_score(&reviews);
        Ok((reviews, average))
    }

    /// Every review written by `author_id`, paired with its movie.
    pub async fn get_reviews_by_user(&self, author_id: &str) -> Result<Vec<UserReview>, ReviewError> {
        if author_id.trim().is_empty() {
            return Err(ReviewError::Validation("author id must not be empty".into()));
        }

        self.read_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT movie, author_id, score, comment
                FROM reviews
                WHERE author_id = ?
                ORDER BY movie",
            )?;
            let rows = stmt.query_map([author_id], |row| {
                Ok(UserReview {
                    movie_name: row.get(0)?,
                    review: Review {
                        author_id: row.get(1)?,
                        score: row.get(2)?,
                        comment: row.get(3)?,
                    },
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Every movie with its mean score; movies without reviews report 0.
    pub async fn get_movies(&self) -> Result<Vec<MovieSummary>, ReviewError> {
        let movies = self
            .read_tx(|tx| {
                let mut stmt = tx.prepare(
                    "SELECT m.name, COALESCE(AVG(r.score), 0.0)
                    FROM movies m
                    LEFT JOIN reviews r ON r.movie = m.name
                    GROUP BY m.name
                    ORDER BY m.name",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(MovieSummary {
                        movie_name: row.get(0)?,
                        average_score: row.get(1)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        debug!(count = movies.len(), "fetched movies");
        Ok(movies)
    }

    /// Up to [`SEARCH_LIMIT`] movie names containing `query`, ignoring case.
    pub async fn search_movies(&self, query: &str) -> Result<Vec<String>, ReviewError> {
        let needle = query.trim().to_lowercase();

        self.read_tx(|tx| {
            // Names are stored lower-cased, so a byte-wise instr is enough
            let mut stmt = tx.prepare(
                "SELECT name FROM movies
                WHERE instr(name, ?1) > 0
                ORDER BY name
                LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![&needle, SEARCH_LIMIT as i64], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
        .await
    }

    /// Number of reviews on a movie. A missing movie is an error, not 0.
    pub async fn get_review_count(&self, movie: &str) -> Result<usize, ReviewError> {
        let movie = canonical_name(movie)?;

        self.read_tx(|tx| {
            if !movie_exists(tx, &movie)? {
                return Err(ReviewError::NotFound(movie.clone()));
            }
            Ok(count_reviews(tx, &movie)?)
        })
        .await
    }

    /// Remove the review `author_id` left on `movie`. The movie itself stays,
    /// even when this was its last review.
    pub async fn delete_review(&self, movie: &str, author_id: &str) -> Result<(), ReviewError> {
        let movie = canonical_name(movie)?;

        self.write_tx(|tx| remove_review(tx, &movie, author_id)).await?;

        info!(movie = %movie, author = %author_id, "review deleted");
        Ok(())
    }

    /// Remove a movie and all of its reviews.
    pub async fn delete_movie(&self, movie: &str) -> Result<(), ReviewError> {
        let movie = canonical_name(movie)?;

        self.write_tx(|tx| {
            if !movie_exists(tx, &movie)? {
                return Err(ReviewError::NotFound(movie.clone()));
            }
            remove_movie(tx, &movie)?;
            Ok(())
        })
        .await?;

        info!(movie = %movie, "movie deleted");
        Ok(())
    }

    /// Delete the author's review and, when no reviews remain, the movie
    /// too. Both steps share one transaction. Returns whether the movie was
    /// removed.
    pub async fn retract_review(&self, movie: &str, author_id: &str) -> Result<bool, ReviewError> {
        let movie = canonical_name(movie)?;

        let movie_removed = self
            .write_tx(|tx| {
                remove_review(tx, &movie, author_id)?;
                if count_reviews(tx, &movie)? == 0 {
                    remove_movie(tx, &movie)?;
                    return Ok(true);
                }
                Ok(false)
            })
            .await?;

        info!(movie = %movie, author = %author_id, movie_removed, "review retracted");
        Ok(movie_removed)
    }

    /// Drop every movie and review.
    pub async fn clear_all_data(&self) -> Result<(), ReviewError> {
        self.write_tx(|tx| {
            tx.execute_batch("DELETE FROM reviews; DELETE FROM movies;")?;
            Ok(())
        })
        .await?;

        info!("all review data cleared");
        Ok(())
    }
}

fn validate_review(review: &Review) -> Result<(), ReviewError> {
    if review.author_id.trim().is_empty() {
        return Err(ReviewError::Validation("author id must not be empty".into()));
    }
    if !review.score.is_finite() || review.score < MIN_SCORE || review.score > MAX_SCORE {
        return Err(ReviewError::Validation(format!(
            "score must be between {} and {}, got {}",
            MIN_SCORE, MAX_SCORE, review.score
        )));
    }
    if review.comment.chars().count() > MAX_COMMENT_LEN {
        return Err(ReviewError::Validation(format!(
            "comment must be at most {} characters",
            MAX_COMMENT_LEN
        )));
    }
    Ok(())
}

fn movie_exists(conn: &Connection, movie: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM movies WHERE name = ?", [movie], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
}

fn count_reviews(conn: &Connection, movie: &str) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reviews WHERE movie = ?",
        [movie],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn reviews_of(conn: &Connection, movie: &str) -> rusqlite::Result<Vec<Review>> {
    let mut stmt = conn.prepare(
        "SELECT author_id, score, comment
        FROM reviews
        WHERE movie = ?
        ORDER BY author_id",
    )?;
    let rows = stmt.query_map([movie], review_from_row)?;
    rows.collect()
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        author_id: row.get(0)?,
        score: row.get(1)?,
        comment: row.get(2)?,
    })
}

fn remove_review(conn: &Connection, movie: &str, author_id: &str) -> Result<(), ReviewError> {
    if !movie_exists(conn, movie)? {
        return Err(ReviewError::NotFound(movie.to_string()));
    }
    let deleted = conn.execute(
        "DELETE FROM reviews WHERE movie = ? AND author_id = ?",
        [movie, author_id],
    )?;
    if deleted == 0 {
        return Err(ReviewError::NotAuthored {
            movie: movie.to_string(),
            author_id: author_id.to_string(),
        });
    }
    Ok(())
}

fn remove_movie(conn: &Connection, movie: &str) -> rusqlite::Result<()> {
    // Reviews go first so the delete does not depend on foreign key support
    conn.execute("DELETE FROM reviews WHERE movie = ?", [movie])?;
    conn.execute("DELETE FROM movies WHERE name = ?", [movie])?;
    Ok(())
}
