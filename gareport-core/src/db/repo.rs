//! Database repository layer
//!
//! Reads go straight through [`Database`]. Writes happen inside
//! [`Database::in_transaction`], which hands the caller a [`PeriodTx`]; the
//! aggregators decide how many records share one transaction.

use crate::error::{Error, Result};
use crate::types::*;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const URL_COLUMNS: &str =
    "id, period_name, period_complete_day, url, pageviews, visits, department_id, package_id";
const STAT_COLUMNS: &str = "id, period_name, stat_name, key, value";
const PUBLISHER_COLUMNS: &str =
    "id, period_name, publisher_name, views, visits, toplevel, subpublishercount, parent";
const REFERRAL_COLUMNS: &str = "id, period_name, source, url, count";

/// Row counts per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub urls: usize,
    pub sitewide: usize,
    pub publishers: usize,
    pub referrals: usize,
}

impl RowCounts {
    pub fn total(&self) -> usize {
        self.urls + self.sitewide + self.publishers + self.referrals
    }

    pub(crate) fn add(&mut self, collection: Collection, n: usize) {
        match collection {
            Collection::Urls => self.urls += n,
            Collection::Sitewide => self.sitewide += n,
            Collection::Publishers => self.publishers += n,
            Collection::Referrals => self.referrals += n,
        }
    }
}

/// Inputs for one url's cumulative row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeSource {
    pub url: String,
    pub pageviews: u64,
    pub visits: u64,
    pub department_id: Option<String>,
    pub package_id: String,
}

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        super::schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StorageUnavailable("database connection lock poisoned".into()))
    }

    /// Run `f` in one transaction, committing only if it succeeds.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&PeriodTx<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = f(&PeriodTx { conn: &tx })?;
        tx.commit()?;
        Ok(result)
    }

    // ============================================
    // Url stats
    // ============================================

    /// Get the row for `url` in `period_name`
    pub fn get_url_stat(&self, period_name: &str, url: &str) -> Result<Option<UrlStat>> {
        let conn = self.lock()?;
        PeriodTx { conn: &conn }.get_url_stat(period_name, url)
    }

    /// Every row for `url`, including its cumulative row, ordered by period
    pub fn url_stats_for(&self, url: &str) -> Result<Vec<UrlStat>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {URL_COLUMNS} FROM ga_url WHERE url = ? ORDER BY period_name"
        ))?;
        let rows = stmt
            .query_map([url], row_to_url_stat)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Busiest urls of a period, by pageviews
    pub fn list_url_stats(&self, period_name: &str, limit: usize) -> Result<Vec<UrlStat>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {URL_COLUMNS} FROM ga_url WHERE period_name = ?
             ORDER BY pageviews DESC, url ASC LIMIT ?"
        ))?;
        let rows = stmt
            .query_map(params![period_name, limit as i64], row_to_url_stat)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ============================================
    // Publisher stats
    // ============================================

    /// Get a publisher's rollup for a period
    pub fn get_publisher_stat(
        &self,
        period_name: &str,
        publisher_name: &str,
    ) -> Result<Option<PublisherStat>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {PUBLISHER_COLUMNS} FROM ga_publisher
                 WHERE period_name = ? AND publisher_name = ?"
            ),
            [period_name, publisher_name],
            row_to_publisher_stat,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All publisher rollups for a period, busiest first
    pub fn list_publisher_stats(&self, period_name: &str) -> Result<Vec<PublisherStat>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PUBLISHER_COLUMNS} FROM ga_publisher WHERE period_name = ?
             ORDER BY views DESC, publisher_name ASC"
        ))?;
        let rows = stmt
            .query_map([period_name], row_to_publisher_stat)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ============================================
    // Sitewide and referral stats
    // ============================================

    /// Sitewide metrics for a period, optionally for one stat name
    pub fn list_sitewide_stats(
        &self,
        period_name: &str,
        stat_name: Option<&str>,
    ) -> Result<Vec<SitewideStat>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {STAT_COLUMNS} FROM ga_stat
             WHERE period_name = ?1 AND (?2 IS NULL OR stat_name = ?2)
             ORDER BY stat_name, key"
        ))?;
        let rows = stmt
            .query_map(params![period_name, stat_name], row_to_sitewide_stat)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Referral counts for a period, largest first
    pub fn list_referral_stats(&self, period_name: &str) -> Result<Vec<ReferralStat>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM ga_referrer WHERE period_name = ?
             ORDER BY count DESC, source, url"
        ))?;
        let rows = stmt
            .query_map([period_name], row_to_referral_stat)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ============================================
    // Whole-store queries
    // ============================================

    /// Distinct period names present in any collection
    pub fn list_periods(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT period_name FROM ga_url
            UNION SELECT period_name FROM ga_stat
            UNION SELECT period_name FROM ga_publisher
            UNION SELECT period_name FROM ga_referrer
            ORDER BY period_name
            "#,
        )?;
        let periods = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(periods)
    }

    /// Row counts per collection, for one period or the whole store
    pub fn count_rows(&self, period_name: Option<&str>) -> Result<RowCounts> {
        let conn = self.lock()?;
        let mut counts = RowCounts::default();
        for collection in Collection::ALL {
            let n: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE ?1 IS NULL OR period_name = ?1",
                    collection.table()
                ),
                [period_name],
                |row| row.get(0),
            )?;
            counts.add(collection, n as usize);
        }
        Ok(counts)
    }
}

/// Write access inside one transaction.
pub struct PeriodTx<'c> {
    conn: &'c Connection,
}

impl PeriodTx<'_> {
    // ============================================
    // Url stats
    // ============================================

    pub fn get_url_stat(&self, period_name: &str, url: &str) -> Result<Option<UrlStat>> {
        self.conn
            .query_row(
                &format!("SELECT {URL_COLUMNS} FROM ga_url WHERE period_name = ? AND url = ?"),
                [period_name, url],
                row_to_url_stat,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn insert_url_stat(&self, stat: &UrlStat) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO ga_url ({URL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                stat.id,
                stat.period_name,
                stat.period_complete_day,
                stat.url,
                to_sql_count("pageviews", stat.pageviews)?,
                to_sql_count("visits", stat.visits)?,
                stat.department_id,
                stat.package_id,
            ],
        )?;
        Ok(())
    }

    /// Overwrite totals and attribution of an existing row
    pub fn update_url_stat(&self, stat: &UrlStat) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE ga_url
            SET pageviews = ?2, visits = ?3, department_id = ?4, package_id = ?5
            WHERE id = ?1
            "#,
            params![
                stat.id,
                to_sql_count("pageviews", stat.pageviews)?,
                to_sql_count("visits", stat.visits)?,
                stat.department_id,
                stat.package_id,
            ],
        )?;
        Ok(())
    }

    /// Sum of a url's pageviews and visits over every real period
    pub fn url_period_totals(&self, url: &str) -> Result<(u64, u64)> {
        let (views, visits): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(pageviews), 0), COALESCE(SUM(visits), 0)
            FROM ga_url
            WHERE url = ?1 AND period_name != ?2
            "#,
            params![url, CUMULATIVE_PERIOD],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((from_sql_count(views)?, from_sql_count(visits)?))
    }

    /// Write the url's single cumulative row
    pub fn upsert_cumulative(
        &self,
        url: &str,
        pageviews: u64,
        visits: u64,
        department_id: Option<&str>,
        package_id: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO ga_url (id, period_name, period_complete_day, url, pageviews, visits,
                                department_id, package_id)
            VALUES (?1, ?2, 0, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(period_name, url) DO UPDATE SET
                pageviews = excluded.pageviews,
                visits = excluded.visits,
                department_id = excluded.department_id,
                package_id = excluded.package_id
            "#,
            params![
                new_id(),
                CUMULATIVE_PERIOD,
                url,
                to_sql_count("pageviews", pageviews)?,
                to_sql_count("visits", visits)?,
                department_id,
                package_id,
            ],
        )?;
        Ok(())
    }

    /// Period totals of every url that has a dataset attribution in some period.
    ///
    /// Attribution comes from the url's latest attributed period row, where
    /// "latest" is the greatest period name. Names must sort chronologically
    /// as text (`YYYY-MM`, as produced by `period::month_name`).
    pub fn cumulative_sources(&self) -> Result<Vec<CumulativeSource>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.url, SUM(u.pageviews), SUM(u.visits),
                   (SELECT l.department_id FROM ga_url l
                    WHERE l.url = u.url AND l.period_name != ?1
                      AND l.package_id IS NOT NULL AND l.package_id != ''
                    ORDER BY l.period_name DESC LIMIT 1),
                   (SELECT l.package_id FROM ga_url l
                    WHERE l.url = u.url AND l.period_name != ?1
                      AND l.package_id IS NOT NULL AND l.package_id != ''
                    ORDER BY l.period_name DESC LIMIT 1)
            FROM ga_url u
            WHERE u.period_name != ?1
            GROUP BY u.url
            HAVING SUM(u.package_id IS NOT NULL AND u.package_id != '') > 0
            ORDER BY u.url
            "#,
        )?;
        let sources = stmt
            .query_map([CUMULATIVE_PERIOD], |row| {
                Ok(CumulativeSource {
                    url: row.get(0)?,
                    pageviews: count_at(row, 1)?,
                    visits: count_at(row, 2)?,
                    department_id: row.get(3)?,
                    package_id: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    /// Pageviews and visits of a period's urls attributed to one publisher
    pub fn department_totals(&self, period_name: &str, department_id: &str) -> Result<(u64, u64)> {
        let (views, visits): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(pageviews), 0), COALESCE(SUM(visits), 0)
            FROM ga_url
            WHERE period_name = ?1 AND department_id = ?2
            "#,
            [period_name, department_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((from_sql_count(views)?, from_sql_count(visits)?))
    }

    /// Delete a period's url rows
    pub fn delete_url_period(&self, period_name: &str) -> Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM ga_url WHERE period_name = ?", [period_name])?;
        Ok(n)
    }

    // ============================================
    // Publisher stats
    // ============================================

    pub fn upsert_publisher_stat(&self, stat: &PublisherStat) -> Result<()> {
        self.conn.execute(
            &format!(
                r#"
                INSERT INTO ga_publisher ({PUBLISHER_COLUMNS})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(period_name, publisher_name) DO UPDATE SET
                    views = excluded.views,
                    visits = excluded.visits,
                    toplevel = excluded.toplevel,
                    subpublishercount = excluded.subpublishercount,
                    parent = excluded.parent
                "#
            ),
            params![
                stat.id,
                stat.period_name,
                stat.publisher_name,
                to_sql_count("views", stat.views)?,
                to_sql_count("visits", stat.visits)?,
                stat.toplevel,
                stat.subpublishercount,
                stat.parent,
            ],
        )?;
        Ok(())
    }

    // ============================================
    // Referral and sitewide stats
    // ============================================

    pub fn delete_referrals(&self, period_name: &str) -> Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM ga_referrer WHERE period_name = ?", [period_name])?;
        Ok(n)
    }

    /// Add `count` to the (period, source, url) referral row, creating it if absent
    pub fn add_referral(&self, period_name: &str, source: &str, url: &str, count: u64) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO ga_referrer (id, period_name, source, url, count)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(period_name, source, url) DO UPDATE SET
                count = count + excluded.count
            "#,
            params![new_id(), period_name, source, url, to_sql_count("count", count)?],
        )?;
        Ok(())
    }

    /// Set a sitewide metric value, replacing any previous value
    pub fn upsert_sitewide(
        &self,
        period_name: &str,
        stat_name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO ga_stat (id, period_name, stat_name, key, value)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(period_name, stat_name, key) DO UPDATE SET
                value = excluded.value
            "#,
            params![new_id(), period_name, stat_name, key, value],
        )?;
        Ok(())
    }

    // ============================================
    // Purge
    // ============================================

    /// Delete a collection's rows for one period, or all rows when `period_name` is None
    pub fn delete_rows(&self, collection: Collection, period_name: Option<&str>) -> Result<usize> {
        let n = match period_name {
            Some(period) => self.conn.execute(
                &format!("DELETE FROM {} WHERE period_name = ?", collection.table()),
                [period],
            )?,
            None => self
                .conn
                .execute(&format!("DELETE FROM {}", collection.table()), [])?,
        };
        Ok(n)
    }
}

/// Fresh opaque row id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn to_sql_count(field: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::malformed(field, value))
}

fn from_sql_count(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::malformed("stored count", value))
}

fn count_at(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn row_to_url_stat(row: &Row) -> rusqlite::Result<UrlStat> {
    Ok(UrlStat {
        id: row.get(0)?,
        period_name: row.get(1)?,
        period_complete_day: row.get(2)?,
        url: row.get(3)?,
        pageviews: count_at(row, 4)?,
        visits: count_at(row, 5)?,
        department_id: row.get(6)?,
        package_id: row.get(7)?,
    })
}

fn row_to_sitewide_stat(row: &Row) -> rusqlite::Result<SitewideStat> {
    Ok(SitewideStat {
        id: row.get(0)?,
        period_name: row.get(1)?,
        stat_name: row.get(2)?,
        key: row.get(3)?,
        value: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
    })
}

fn row_to_publisher_stat(row: &Row) -> rusqlite::Result<PublisherStat> {
    Ok(PublisherStat {
        id: row.get(0)?,
        period_name: row.get(1)?,
        publisher_name: row.get(2)?,
        views: count_at(row, 3)?,
        visits: count_at(row, 4)?,
        toplevel: row.get(5)?,
        subpublishercount: row.get(6)?,
        parent: row.get(7)?,
    })
}

fn row_to_referral_stat(row: &Row) -> rusqlite::Result<ReferralStat> {
    Ok(ReferralStat {
        id: row.get(0)?,
        period_name: row.get(1)?,
        source: row.get(2)?,
        url: row.get(3)?,
        count: count_at(row, 4)?,
    })
}
