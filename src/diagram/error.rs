#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiagramError {
    #[error("diagram is empty")]
    Empty,

    /// The renderer could not parse the source
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("renderer panicked: {0}")]
    Panic(String),
}
