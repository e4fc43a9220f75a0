#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    /// Postgres' canonical spelling of the type (`integer` for `int4`).
    /// Empty when the raw type name is already canonical.
    pub canonical_type_name: String,
    pub size: i32,
    pub not_null: bool,
    pub is_generated: bool,
    /// When set, the codec used to read this column off the wire is rebound
    /// to the named type instead of the declared one.
    pub override_type: Option<String>,
}

impl Column {
    pub fn new(name: &str, type_name: &str) -> Self {
        Column {
            name: name.to_string(),
            type_name: type_name.to_string(),
            canonical_type_name: String::new(),
            size: -1,
            not_null: false,
            is_generated: false,
            override_type: None,
        }
    }

    /// The type name the rest of the pipeline should treat this column as:
    /// the user override wins, then the canonical name, then the raw name.
    pub fn effective_type_name(&self) -> &str {
        if let Some(override_type) = &self.override_type {
            return override_type;
        }
        if !self.canonical_type_name.is_empty() {
            return &self.canonical_type_name;
        }
        &self.type_name
    }

    pub fn override_type(&mut self, type_name: &str) {
        self.override_type = Some(type_name.to_string());
    }
}

impl Default for Column {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_type_prefers_override_then_canonical() {
        let mut column = Column::new("id", "int4");
        assert_eq!(column.effective_type_name(), "int4");

        column.canonical_type_name = "integer".to_string();
        assert_eq!(column.effective_type_name(), "integer");

        column.override_type("text");
        assert_eq!(column.effective_type_name(), "text");
    }
}
