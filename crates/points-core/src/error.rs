use thiserror::Error;

/// Stable error taxonomy shared across every interactor.
///
/// Kinds are grouped by concern: input, authorization, lookup, precondition,
/// concurrency, infrastructure. Callers match on `kind()` rather than the
/// `Display` text, so wording can change freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // ── Input ────────────────────────────────────────────────────────────────
    InvalidAmount,
    SameUser,
    MissingKey,
    InvalidRole,
    InvalidState,

    // ── Authorization ────────────────────────────────────────────────────────
    Unauthorized,
    SelfDeactivation,

    // ── Lookup ───────────────────────────────────────────────────────────────
    UserNotFound,
    TransactionNotFound,
    RequestNotFound,
    QrNotFound,

    // ── Precondition ─────────────────────────────────────────────────────────
    UserInactive,
    InsufficientBalance,
    RequestExpired,

    // ── Concurrency ──────────────────────────────────────────────────────────
    VersionConflict,
    InProgress,

    // ── Infrastructure ───────────────────────────────────────────────────────
    DbError,
    ExternalError,

    /// Not part of the stable taxonomy in ; only ever produced by a bug in
    /// the batch engine's own pre-check and always fatal.
    InsufficientBatches,
}

impl ErrorKind {
    /// Whether should retry the operation that produced this error
    /// rather than surface it to the caller.
    pub fn is_locally_retryable(self) -> bool {
        matches!(self, ErrorKind::VersionConflict)
    }
}

/// A typed error carrying a stable `kind` plus a human-readable message.
///
/// This is the value type every interactor in `points-*` returns — database
/// driver errors never cross a crate boundary undressed.
#[derive(Debug, Error, Clone)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

macro_rules! ctor {
    ($name:ident, $kind:ident, $doc:literal) => {
        #[doc = $doc]
        pub fn $name(message: impl Into<String>) -> CoreError {
            CoreError::new(ErrorKind::$kind, message)
        }
    };
}

ctor!(invalid_amount, InvalidAmount, "amount must be a positive integer");
ctor!(same_user, SameUser, "sender and receiver must differ");
ctor!(missing_key, MissingKey, "an idempotency key is required");
ctor!(invalid_role, InvalidRole, "role is not a recognized value");
ctor!(invalid_state, InvalidState, "entity is not in a state that permits this transition");
ctor!(unauthorized, Unauthorized, "caller does not hold the admin role");
ctor!(self_deactivation, SelfDeactivation, "an admin may not deactivate their own account");
ctor!(user_not_found, UserNotFound, "no such user");
ctor!(transaction_not_found, TransactionNotFound, "no such transaction");
ctor!(request_not_found, RequestNotFound, "no such transfer request");
ctor!(qr_not_found, QrNotFound, "no such QR token");
ctor!(user_inactive, UserInactive, "user is deactivated");
ctor!(insufficient_balance, InsufficientBalance, "balance would go negative");
ctor!(request_expired, RequestExpired, "transfer request has expired");
ctor!(version_conflict, VersionConflict, "optimistic version check failed");
ctor!(in_progress, InProgress, "an operation with this idempotency key is already in flight");
ctor!(db_error, DbError, "a storage-layer error occurred");
ctor!(external_error, ExternalError, "an external collaborator returned an error");
ctor!(insufficient_batches, InsufficientBatches, "FIFO batch consumption could not cover the debited amount");

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        let code = e.as_database_error().and_then(|d| d.code().map(|c| c.into_owned()));
        match code {
            Some(code) => db_error(format!("{e} (sqlstate {code})")),
            None => db_error(e.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
