//! Browser history databases: discovery and private-copy reads.

use costscope_core::models::platform::HostOs;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use super::epoch::BrowserFamily;
use crate::source::{SkipReason, SourceRead};

/// One history database on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSource {
    /// Lowercase browser name, used as the `browser_name` label
    pub name: String,
    pub path: PathBuf,
    pub family: BrowserFamily,
}

impl BrowserSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, family: BrowserFamily) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            family,
        }
    }
}

/// A visit with its time normalized to Unix seconds
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub url: String,
    pub visited_at: f64,
}

/// Per-user base directories the browser paths hang off.
#[derive(Debug, Clone)]
pub struct UserDirs {
    pub home: PathBuf,
    /// macOS `~/Library/Application Support`, Windows `%APPDATA%`
    pub data: PathBuf,
    /// Windows `%LOCALAPPDATA%`
    pub data_local: PathBuf,
    /// Linux `~/.config`
    pub config: PathBuf,
}

impl UserDirs {
    pub fn detect() -> Option<Self> {
        let dirs = directories::BaseDirs::new()?;
        Some(Self {
            home: dirs.home_dir().to_path_buf(),
            data: dirs.data_dir().to_path_buf(),
            data_local: dirs.data_local_dir().to_path_buf(),
            config: dirs.config_dir().to_path_buf(),
        })
    }
}

fn chromium_candidates(os: HostOs, dirs: &UserDirs) -> Vec<(&'static str, PathBuf)> {
    let join = |base: &Path, parts: &[&str]| {
        parts.iter().fold(base.to_path_buf(), |p, s| p.join(s))
    };
    let (data, local, config) = (&dirs.data, &dirs.data_local, &dirs.config);
    match os {
        HostOs::Macos => vec![
            ("chrome", join(data, &["Google", "Chrome", "Default", "History"])),
            ("edge", join(data, &["Microsoft Edge", "Default", "History"])),
            ("brave", join(data, &["BraveSoftware", "Brave-Browser", "Default", "History"])),
            ("arc", join(data, &["Arc", "User Data", "Default", "History"])),
            ("vivaldi", join(data, &["Vivaldi", "Default", "History"])),
            ("opera", join(data, &["com.operasoftware.Opera", "History"])),
        ],
        HostOs::Windows => vec![
            ("chrome", join(local, &["Google", "Chrome", "User Data", "Default", "History"])),
            ("edge", join(local, &["Microsoft", "Edge", "User Data", "Default", "History"])),
            (
                "brave",
                join(local, &["BraveSoftware", "Brave-Browser", "User Data", "Default", "History"]),
            ),
            ("vivaldi", join(local, &["Vivaldi", "User Data", "Default", "History"])),
            ("opera", join(data, &["Opera Software", "Opera Stable", "History"])),
        ],
        HostOs::Linux => vec![
            ("chrome", join(config, &["google-chrome", "Default", "History"])),
            ("chromium", join(config, &["chromium", "Default", "History"])),
            ("brave", join(config, &["BraveSoftware", "Brave-Browser", "Default", "History"])),
            ("vivaldi", join(config, &["vivaldi", "Default", "History"])),
            ("edge", join(config, &["microsoft-edge", "Default", "History"])),
        ],
    }
}

fn firefox_profiles_dir(os: HostOs, dirs: &UserDirs) -> PathBuf {
    match os {
        HostOs::Macos => dirs.data.join("Firefox").join("Profiles"),
        HostOs::Windows => dirs.data.join("Mozilla").join("Firefox").join("Profiles"),
        HostOs::Linux => dirs.home.join(".mozilla").join("firefox"),
    }
}

/// `places.sqlite` of the first profile (by name) that has one
fn firefox_history(profiles: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(profiles)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path().join("places.sqlite"))
        .filter(|path| path.is_file())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Every history database present for this user on `os`.
pub fn discover_browsers(os: HostOs, dirs: &UserDirs) -> Vec<BrowserSource> {
    let mut sources: Vec<BrowserSource> = chromium_candidates(os, dirs)
        .into_iter()
        .filter(|(_, path)| path.is_file())
        .map(|(name, path)| BrowserSource::new(name, path, BrowserFamily::Chromium))
        .collect();

    if let Some(places) = firefox_history(&firefox_profiles_dir(os, dirs)) {
        sources.push(BrowserSource::new("firefox", places, BrowserFamily::Firefox));
    }

    if os == HostOs::Macos {
        let safari = dirs.home.join("Library").join("Safari").join("History.db");
        if safari.is_file() {
            sources.push(BrowserSource::new("safari", safari, BrowserFamily::Safari));
        }
    }

    debug!(
        "browser history sources: {:?}",
        sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
    );
    sources
}

fn visits_query(family: BrowserFamily) -> &'static str {
    match family {
        BrowserFamily::Chromium => {
            "SELECT urls.url, visits.visit_time FROM visits \
             JOIN urls ON visits.url = urls.id \
             WHERE visits.visit_time > ?1 ORDER BY visits.visit_time ASC"
        }
        BrowserFamily::Firefox => {
            "SELECT p.url, v.visit_date FROM moz_historyvisits v \
             JOIN moz_places p ON v.place_id = p.id \
             WHERE v.visit_date > ?1 ORDER BY v.visit_date ASC"
        }
        BrowserFamily::Safari => {
            "SELECT hi.url, hv.visit_time FROM history_visits hv \
             JOIN history_items hi ON hv.history_item = hi.id \
             WHERE hv.visit_time > ?1 ORDER BY hv.visit_time ASC"
        }
    }
}

fn since_param(family: BrowserFamily, since_unix: f64) -> SqlValue {
    let native = family.from_unix(since_unix);
    match family {
        BrowserFamily::Safari => SqlValue::Real(native),
        BrowserFamily::Chromium | BrowserFamily::Firefox => SqlValue::Integer(native as i64),
    }
}

/// Copy the database (and its `-wal` sibling) into a private temp dir.
/// The copy is removed when the returned `TempDir` drops.
fn private_copy(db: &Path) -> Result<(TempDir, PathBuf), std::io::Error> {
    let dir = tempfile::Builder::new().prefix("costscope-history").tempdir()?;
    let copy = dir.path().join("history.sqlite");
    fs::copy(db, &copy)?;

    let mut wal = db.as_os_str().to_owned();
    wal.push("-wal");
    let wal = PathBuf::from(wal);
    if wal.is_file() {
        fs::copy(&wal, dir.path().join("history.sqlite-wal"))?;
    }
    Ok((dir, copy))
}

/// Visits newer than `since_unix`, read from a private copy so a running
/// browser's lock never blocks the read.
pub fn read_visits(source: &BrowserSource, since_unix: f64) -> SourceRead<Vec<Visit>> {
    let (_guard, copy) = match private_copy(&source.path) {
        Ok(copy) => copy,
        Err(e) => return SourceRead::Skipped(SkipReason::from_io(&e)),
    };

    let conn = match Connection::open_with_flags(
        &copy,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    ) {
        Ok(conn) => conn,
        Err(e) => return SourceRead::Skipped(SkipReason::from_sqlite(&e)),
    };

    match query_visits(&conn, source.family, since_unix) {
        Ok(visits) => SourceRead::Rows(visits),
        Err(e) => SourceRead::Skipped(SkipReason::from_sqlite(&e)),
    }
}

fn query_visits(
    conn: &Connection,
    family: BrowserFamily,
    since_unix: f64,
) -> Result<Vec<Visit>, rusqlite::Error> {
    let mut stmt = conn.prepare(visits_query(family))?;
    let rows = stmt.query_map([since_param(family, since_unix)], |row| {
        let url: Option<String> = row.get(0)?;
        let raw: f64 = row.get(1)?;
        Ok(url.map(|url| Visit {
            url,
            visited_at: family.to_unix(raw),
        }))
    })?;

    let mut visits = Vec::new();
    for row in rows {
        if let Some(visit) = row? {
            visits.push(visit);
        }
    }
    Ok(visits)
}
