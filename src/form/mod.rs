//! The accident-report form: typed schema, merge engine, and validation.

pub mod merge;
pub mod schema;
pub mod validate;

pub use merge::apply_updates;
pub use schema::{AccidentReportForm, Witness};
pub use validate::{
    decode_attachment, is_form_complete, validate_form, validate_mime_type, validate_pesel,
};
