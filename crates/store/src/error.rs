#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt message row {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("{field} value {value} does not fit in the database")]
    OutOfRange { field: &'static str, value: u64 },
}
