use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Bearer capability plus the instant the server says it stops working.
/// The token itself is opaque to this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && self.expires_at > now
    }
}

/// Source of the bearer token, consulted on every call.
pub trait SessionProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// On-disk cookie jar holding the single session cookie.
#[derive(Debug)]
pub struct FileSessionStore {
    pub path: PathBuf,
    pub cookie_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CookieRecord {
    name: String,
    value: String,
    path: String,
    http_only: bool,
    expires: DateTime<Utc>,
}

impl FileSessionStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, cookie_name: &str) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join("session.toml");
        debug!(file = %path.display(), cookie = cookie_name, "opened session store");
        Ok(Self {
            path,
            cookie_name: cookie_name.to_string(),
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let record: CookieRecord = toml::from_str(&text)
            .with_context(|| format!("failed parsing {}", self.path.display()))?;
        if record.name != self.cookie_name {
            warn!(found = %record.name, expected = %self.cookie_name, "ignoring cookie with another name");
            return Ok(None);
        }
        Ok(Some(Session {
            token: record.value,
            expires_at: record.expires,
        }))
    }

    #[tracing::instrument(skip(self, session), fields(expires_at = %session.expires_at))]
    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        let record = CookieRecord {
            name: self.cookie_name.clone(),
            value: session.token.clone(),
            path: "/".to_string(),
            http_only: true,
            expires: session.expires_at,
        };
        let serialized = toml::to_string(&record).context("failed to encode session cookie")?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;

        info!(file = %self.path.display(), "stored session cookie");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove {}", self.path.display()))?;
            info!("cleared session cookie");
        }
        Ok(())
    }

    /// `Cookie` request header as a browser would send it, if the cookie is still live.
    pub fn cookie_header(&self) -> Option<String> {
        let token = self.token()?;
        Some(format!("{}={}", self.cookie_name, token))
    }
}

impl SessionProvider for FileSessionStore {
    fn token(&self) -> Option<String> {
        match self.load() {
            Ok(Some(session)) if session.is_live(Utc::now()) => Some(session.token),
            Ok(Some(_)) => {
                debug!("session cookie expired");
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed reading session cookie");
                None
            }
        }
    }
}

/// Process-local session, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySession {
    inner: RwLock<Option<Session>>,
}

impl MemorySession {
    pub fn new(session: Option<Session>) -> Self {
        Self {
            inner: RwLock::new(session),
        }
    }

    pub fn replace(&self, session: Option<Session>) {
        *self.inner.write() = session;
    }
}

impl SessionProvider for MemorySession {
    fn token(&self) -> Option<String> {
        self.inner
            .read()
            .as_ref()
            .filter(|session| session.is_live(Utc::now()))
            .map(|session| session.token.clone())
    }
}

pub fn set_cookie_header(name: &str, session: &Session) -> String {
    format!(
        "{}={}; Path=/; Expires={}; HttpOnly",
        name,
        session.token,
        session.expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

/// Value of `name` in a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k.trim() == name).then(|| v.trim())
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;

    fn session(hours: i64) -> Session {
        Session {
            token: "tok-123".to_string(),
            expires_at: Utc::now() + Duration::hours(hours),
        }
    }

    #[test]
    fn file_store_round_trip_and_clear() {
        let dir = tempdir().expect("tempdir");
        let store = FileSessionStore::open(dir.path(), "auth_token").expect("open store");
        assert_eq!(store.token(), None);

        let live = session(1);
        store.save(&live).expect("save session");
        assert_eq!(store.load().expect("load"), Some(live));
        assert_eq!(store.token().as_deref(), Some("tok-123"));
        assert_eq!(store.cookie_header().as_deref(), Some("auth_token=tok-123"));

        store.clear().expect("clear");
        assert_eq!(store.token(), None);
        store.clear().expect("clearing twice is fine");
    }

    #[test]
    fn expired_cookie_is_not_sent() {
        let dir = tempdir().expect("tempdir");
        let store = FileSessionStore::open(dir.path(), "auth_token").expect("open store");
        store.save(&session(-1)).expect("save session");
        assert!(store.load().expect("load").is_some());
        assert_eq!(store.token(), None);
    }

    #[test]
    fn token_is_reread_on_every_call() {
        let dir = tempdir().expect("tempdir");
        let store = FileSessionStore::open(dir.path(), "auth_token").expect("open store");
        store.save(&session(1)).expect("save");
        let other = FileSessionStore::open(dir.path(), "auth_token").expect("open again");
        other
            .save(&Session {
                token: "renewed".to_string(),
                expires_at: Utc::now() + Duration::hours(2),
            })
            .expect("save renewed");
        assert_eq!(store.token().as_deref(), Some("renewed"));
    }

    #[test]
    fn memory_session_replace() {
        let mem = MemorySession::new(None);
        assert_eq!(mem.token(), None);
        mem.replace(Some(session(1)));
        assert_eq!(mem.token().as_deref(), Some("tok-123"));
    }

    #[test]
    fn cookie_helpers() {
        let s = Session {
            token: "abc".to_string(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        };
        assert_eq!(
            set_cookie_header("auth_token", &s),
            "auth_token=abc; Path=/; Expires=Wed, 02 Jan 2030 03:04:05 GMT; HttpOnly"
        );
        assert_eq!(
            cookie_value("theme=dark; auth_token=abc ;x=1", "auth_token"),
            Some("abc")
        );
        assert_eq!(cookie_value("theme=dark", "auth_token"), None);
        assert_eq!(cookie_value("", "auth_token"), None);
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", session(1));
        assert!(!rendered.contains("tok-123"));
    }
}
