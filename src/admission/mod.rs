//! Admission review extraction.
//!
//! Turns the raw body of an admission webhook call into [`AdmissionFields`],
//! the schema-stable view the rest of the pipeline works with. The payload is
//! decoded into a generic JSON tree and queried by dotted path, so fields that
//! older or newer API servers omit or move resolve to zero values instead of
//! failing the request.

mod fields;
mod payload;

pub use fields::{
    AdmissionFields, LABEL_CONFIGURATION, LABEL_REVISION, LABEL_SERVICE, ServingLabels,
    TargetObject, extract,
};
pub use payload::{AdmissionPayload, Lookup, ParseError};
