use crate::{PgVeilError, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    Exclusion,
    Trigger,
}

impl ConstraintKind {
    pub fn from_pg_char(c: char) -> Result<Self> {
        match c {
            'p' => Ok(ConstraintKind::PrimaryKey),
            'f' => Ok(ConstraintKind::ForeignKey),
            'u' => Ok(ConstraintKind::Unique),
            'c' => Ok(ConstraintKind::Check),
            'x' => Ok(ConstraintKind::Exclusion),
            't' => Ok(ConstraintKind::Trigger),
            _ => Err(PgVeilError::UnknownConstraintType(c.to_string())),
        }
    }
}

/// A constraint attached to a table entry during config building. The subset
/// planner does not consume these; they travel with the entry so the dump
/// pipeline can order restores and report schema affection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TableConstraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub definition: String,
}
