use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamReadError {
    #[error("Failed to open input file '{path}'")]
    OpenFile { path: String, #[source] source: std::io::Error },

    #[error("Failed to memory-map input file '{path}'")]
    MapFile { path: String, #[source] source: std::io::Error },
}
