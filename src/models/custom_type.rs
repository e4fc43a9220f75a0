use crate::models::Oid;

/// A user-defined type descriptor handed to the driver so column codecs can
/// be resolved for non-builtin types.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CustomType {
    pub oid: Oid,
    pub schema: String,
    pub name: String,
    /// Canonical spelling when the name is an alias, otherwise empty.
    pub canonical_name: String,
}
