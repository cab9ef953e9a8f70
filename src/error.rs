/// Errors returned when installing loggers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a context-aware logger has already been configured")]
    AlreadyConfigured,
    #[error("failed to install the log facade logger: {0}")]
    SetLogger(#[from] log::SetLoggerError),
}
