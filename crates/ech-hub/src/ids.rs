use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque, peer-assigned or hub-generated logical editor identity.
///
/// Persists across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        SessionId(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

/// Generates a short random tag for logs: a connection id.
pub fn new_conn_id() -> String {
    let full = uuid::Uuid::new_v4().simple().to_string();
    full[..8].to_string()
}

/// Generates a hub-side session id when the peer did not supply one.
pub fn new_session_id() -> SessionId {
    SessionId(uuid::Uuid::new_v4().to_string())
}

/// Generates a fresh, globally-unique envelope id for an outbound request.
pub fn new_envelope_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current wall-clock time as seconds since the epoch, for the envelope
/// `ts` field.
pub fn now_unix_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Normalizes a project path for comparison: backslashes to forward
/// slashes, trailing separators stripped, case-folded.
///
/// Implementations that target only POSIX may skip the
/// separator translation but must keep semantics equivalent for ASCII
/// inputs; we perform it unconditionally since it is a no-op on paths that
/// never contain a backslash.
pub fn normalize_project_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let trimmed = replaced.trim_end_matches('/');
    trimmed.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators_case_and_trailing_slash() {
        assert_eq!(normalize_project_path("/Foo/Bar/"), "/foo/bar");
        assert_eq!(normalize_project_path(r"C:\Foo\Bar\"), "c:/foo/bar");
        assert_eq!(normalize_project_path("/foo/bar"), "/foo/bar");
    }
}
