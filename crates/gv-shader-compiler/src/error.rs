/// A failed job leaves its destination slot empty and is recorded here;
/// it never blocks or fails other jobs in flight (see `worker_loop`).
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("graphics API rejected instrumented shader module: {0}")]
    GraphicsApiRejected(String),
}
