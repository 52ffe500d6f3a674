pub mod sam_bytes;
pub use sam_bytes::{SamBytes, SamReadError};
