use thiserror::Error;

#[derive(Error, Debug)]
pub enum FamilyError {
    #[error(
        "connor-merge requires an RX barcode on every record, but '{qname}' \
        carries none"
    )]
    MissingBarcode { qname: String },
}
