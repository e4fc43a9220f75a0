mod column;
mod constraint;
mod custom_type;
mod table;

pub use column::*;
pub use constraint::*;
pub use custom_type::*;
pub use table::*;

/// Postgres object identifier.
pub type Oid = u32;
