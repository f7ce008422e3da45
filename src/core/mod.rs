pub mod error;
pub mod geo;
pub mod record;
pub mod value;

pub use error::{DbError, ErrorKind, Result};
pub use geo::{BoundingBox, GeoPoint};
pub use record::{CREATED_FIELD, ID_FIELD, ROWID_FIELD, Record, UPDATED_FIELD};
pub use value::Value;
