/// Internal conditions that should never reach a caller of [`crate::EditorHub`].
///
/// These are logged at the point they are detected and recovered locally;
/// see `ech_proto::CallError` for what callers actually observe.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// Recovers a poisoned mutex, logging the invariant violation instead of
/// propagating the panic. None of this crate's locked state has a
/// cross-field invariant that a panic mid-mutation could leave broken, so
/// recovering the guard and carrying on is safe.
pub(crate) fn recover_lock<'a, T>(
    result: Result<std::sync::MutexGuard<'a, T>, std::sync::PoisonError<std::sync::MutexGuard<'a, T>>>,
    site: &'static str,
) -> std::sync::MutexGuard<'a, T> {
    result.unwrap_or_else(|e| {
        tracing::error!(site, "{}", HubError::LockPoisoned(site));
        e.into_inner()
    })
}
