use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- transport errors ------------------------------------------
    #[error("DAP connection closed")]
    ConnectionClosed,
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("malformed Content-Length header: {0}")]
    ContentLength(#[from] std::num::ParseIntError),
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    // --------------------------------- protocol errors -------------------------------------------
    #[error("unsupported message type `{0}`")]
    UnsupportedMessage(String),
    #[error("malformed `{command}` arguments: {source}")]
    Arguments {
        command: String,
        source: serde_json::Error,
    },

    // --------------------------------- session errors --------------------------------------------
    #[error("cannot read source `{path}`: {source}")]
    SourceLoad { path: String, source: io::Error },
}
