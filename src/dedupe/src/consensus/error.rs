use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error(
        "Read pair '{qname}' does not carry exactly one first-in-template and \
        one second-in-template record (flags: {first} / {second})"
    )]
    MismatchedReadFlags { qname: String, first: String, second: String },
}
