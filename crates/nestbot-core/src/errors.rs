/// Core error type for the dispatch engine.
///
/// Adapter crates map their transport errors into `External` so the dispatcher
/// can treat every failure through one boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("can't find scope '{0}'")]
    UnknownScope(String),

    #[error("can't find {0} from update")]
    MissingContext(&'static str),

    #[error("outbound method `{0}` is not supported by this adapter")]
    Unsupported(&'static str),

    #[error("invalid argument {index} for `{method}`: {reason}")]
    InvalidArgument {
        method: &'static str,
        index: usize,
        reason: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
