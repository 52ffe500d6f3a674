use thiserror::Error;

#[derive(Error, Debug)]
pub enum PairError {
    #[error(
        "{count} read name(s) never completed a pair (e.g. '{example}'). \
        Read names must occur exactly twice in the input; a name seen once \
        or three times leaves a dangling record behind"
    )]
    DanglingMates { count: usize, example: String },
}
