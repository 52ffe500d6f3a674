use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParserError {
    #[error("unsupported --umi mode: '{0}'. Accepted modes: none, barcode-split, connor-merge")]
    InvalidUmiKind(String),

    #[error("invalid --optical-distance: '{0}'. Expected a positive pixel count, or 'disable'")]
    InvalidOpticalDistance(String),

    #[error("{arg} must be a {expected} file (got '{path}')")]
    InvalidFileType { arg: &'static str, path: String, expected: &'static str },

    #[error("--min-family-size must be greater than zero")]
    InvalidMinFamilySize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_not_empty() {
        let errors = [
            ParserError::InvalidUmiKind("thruplex".to_string()),
            ParserError::InvalidOpticalDistance("-1".to_string()),
            ParserError::InvalidMinFamilySize,
        ];
        for error in errors {
            assert!(!format!("{error}").is_empty());
        }
    }
}
