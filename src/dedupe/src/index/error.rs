use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Input is not coordinate-sorted: {rname}:{pos} appears after {rname}:{previous}")]
    UnsortedInput { rname: String, pos: i32, previous: i32 },
}
