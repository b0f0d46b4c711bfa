//! User-supplied hooks: region updaters and SET handlers.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::pdu::ResponseError;
use crate::snapshot::SnapshotBuilder;
use crate::varbind::VarBind;

/// Boxed future type used by the handler traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Refreshes a region's bindings.
///
/// The session invokes `update` once at registration and then at the
/// region's refresh interval. On success the builder's contents replace
/// the region's published snapshot atomically; on error the previous
/// snapshot is retained and the error is logged.
///
/// # Example
///
/// ```
/// use async_agentx::{BoxFuture, Result, SnapshotBuilder, Updater, oid};
///
/// struct SysInfo;
///
/// impl Updater for SysInfo {
///     fn update<'a>(&'a self, builder: &'a mut SnapshotBuilder) -> BoxFuture<'a, Result<()>> {
///         Box::pin(async move {
///             builder.set_octet_string(&oid!(1, 0), "example subagent")?;
///             builder.set_counter32(&oid!(2, 0), 7)?;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Updater: Send + Sync + 'static {
    fn update<'a>(&'a self, builder: &'a mut SnapshotBuilder) -> BoxFuture<'a, Result<()>>;
}

/// Adapt a closure into an [`Updater`].
///
/// ```
/// use async_agentx::{handler::updater_fn, oid};
///
/// let updater = updater_fn(|builder| {
///     Box::pin(async move { builder.set_integer(&oid!(1, 0), 42) })
/// });
/// ```
pub fn updater_fn<F>(f: F) -> impl Updater
where
    F: for<'a> Fn(&'a mut SnapshotBuilder) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    struct FnUpdater<F>(F);

    impl<F> Updater for FnUpdater<F>
    where
        F: for<'a> Fn(&'a mut SnapshotBuilder) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        fn update<'a>(&'a self, builder: &'a mut SnapshotBuilder) -> BoxFuture<'a, Result<()>> {
            (self.0)(builder)
        }
    }

    FnUpdater(f)
}

/// Error codes a SET handler may return (RFC 3416 Section 4.2.5 subset
/// AgentX carries in TestSet/CommitSet/UndoSet responses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SetErrorCode {
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    NotWritable,
    InconsistentName,
}

impl SetErrorCode {
    pub(crate) fn response_error(self) -> ResponseError {
        match self {
            Self::GenErr => ResponseError::GenErr,
            Self::NoAccess => ResponseError::NoAccess,
            Self::WrongType => ResponseError::WrongType,
            Self::WrongLength => ResponseError::WrongLength,
            Self::WrongEncoding => ResponseError::WrongEncoding,
            Self::WrongValue => ResponseError::WrongValue,
            Self::NoCreation => ResponseError::NoCreation,
            Self::InconsistentValue => ResponseError::InconsistentValue,
            Self::ResourceUnavailable => ResponseError::ResourceUnavailable,
            Self::CommitFailed => ResponseError::CommitFailed,
            Self::UndoFailed => ResponseError::UndoFailed,
            Self::NotWritable => ResponseError::NotWritable,
            Self::InconsistentName => ResponseError::InconsistentName,
        }
    }
}

impl std::fmt::Display for SetErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.response_error().fmt(f)
    }
}

/// A SET phase failure: the code plus the 1-based index of the varbind it
/// refers to (0 = the request as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetError {
    pub code: SetErrorCode,
    pub index: u16,
}

impl SetError {
    /// An error that refers to the whole request.
    pub fn new(code: SetErrorCode) -> Self {
        Self { code, index: 0 }
    }

    /// An error pinned to one varbind (1-based index).
    pub fn at(code: SetErrorCode, index: u16) -> Self {
        Self { code, index }
    }
}

impl std::fmt::Display for SetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.index == 0 {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} at index {}", self.code, self.index)
        }
    }
}

impl std::error::Error for SetError {}

/// Result of a SET phase hook.
pub type SetResult = std::result::Result<(), SetError>;

/// Processes writes to a region using the AgentX two-phase commit protocol.
///
/// Per transaction the session calls at most one of each hook, in the
/// order test, commit, undo, cleanup (skipping phases the master never
/// requests). Errors returned here become the SNMP error code in the
/// Response; they never escape to the master as anything else.
///
/// `undo` and `cleanup` default to no-ops.
pub trait SetHandler: Send + Sync + 'static {
    /// Validate the proposed varbinds without applying them.
    fn test<'a>(&'a self, varbinds: &'a [VarBind]) -> BoxFuture<'a, SetResult>;

    /// Apply the varbinds validated by `test`.
    fn commit<'a>(&'a self, varbinds: &'a [VarBind]) -> BoxFuture<'a, SetResult>;

    /// Roll back a commit (best effort).
    fn undo<'a>(&'a self, _varbinds: &'a [VarBind]) -> BoxFuture<'a, SetResult> {
        Box::pin(async { Ok(()) })
    }

    /// Release any resources held for the transaction. Always the last
    /// hook, and the only one with no Response on the wire.
    fn cleanup<'a>(&'a self, _varbinds: &'a [VarBind]) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn test_set_error_display() {
        assert_eq!(SetError::new(SetErrorCode::WrongType).to_string(), "wrongType");
        assert_eq!(
            SetError::at(SetErrorCode::WrongValue, 2).to_string(),
            "wrongValue at index 2"
        );
    }

    #[test]
    fn test_set_error_code_mapping() {
        assert_eq!(
            SetErrorCode::CommitFailed.response_error().as_u16(),
            14
        );
        assert_eq!(SetErrorCode::NotWritable.response_error().as_u16(), 17);
        assert_eq!(SetErrorCode::GenErr.response_error().as_u16(), 5);
    }

    #[tokio::test]
    async fn test_updater_fn() {
        let updater = updater_fn(|builder| {
            Box::pin(async move { builder.set_integer(&oid!(1, 0), 42) })
        });

        let mut builder = SnapshotBuilder::new(oid!(1, 3, 6, 1, 4, 1, 12345));
        updater.update(&mut builder).await.unwrap();
        assert_eq!(builder.len(), 1);
    }
}
