use crate::config::{ParamsValue, TransformerConfig};
use crate::driver::Driver;
use crate::validation::{ValidationSeverity, ValidationWarning, ValidationWarnings};
use crate::Result;
use std::collections::BTreeMap;

/// Boolean capability keys a transformer definition may carry.
pub const ALLOW_APPLY_FOR_REFERENCED: &str = "AllowApplyForReferenced";
pub const REQUIRE_HASH_ENGINE_PARAMETER: &str = "RequireHashEngineParameter";

pub const HASH_ENGINE_NAME: &str = "hash";
pub(crate) const COLUMN_PARAMETER_NAME: &str = "column";
pub(crate) const ENGINE_PARAMETER_NAME: &str = "engine";

/// Schema of one transformer parameter.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParameterDefinition {
    pub name: &'static str,
    pub required: bool,
    /// The parameter names a single column of the target table.
    pub is_column: bool,
    /// The parameter is a container whose elements each name a column.
    pub is_column_container: bool,
}

impl ParameterDefinition {
    pub fn required(name: &'static str) -> Self {
        ParameterDefinition {
            name,
            required: true,
            is_column: false,
            is_column_container: false,
        }
    }

    pub fn optional(name: &'static str) -> Self {
        ParameterDefinition {
            name,
            required: false,
            is_column: false,
            is_column_container: false,
        }
    }

    pub fn column(name: &'static str) -> Self {
        ParameterDefinition {
            name,
            required: true,
            is_column: true,
            is_column_container: false,
        }
    }

    pub fn column_container(name: &'static str) -> Self {
        ParameterDefinition {
            name,
            required: true,
            is_column: false,
            is_column_container: true,
        }
    }
}

/// The initialized runtime handle for one transformer on one table, consumed
/// by the streaming COPY pipeline outside the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerContext {
    pub transformer_name: String,
    pub params: BTreeMap<String, ParamsValue>,
    pub when: String,
}

type InitFn =
    fn(&TransformerDefinition, &Driver, &TransformerConfig) -> Result<(Option<TransformerContext>, ValidationWarnings)>;

/// What the registry hands out for a name: the parameter schema, the boolean
/// capability map and an initialization callback.
#[derive(Debug, Clone)]
pub struct TransformerDefinition {
    pub name: &'static str,
    pub parameters: Vec<ParameterDefinition>,
    pub properties: BTreeMap<&'static str, bool>,
    init: InitFn,
}

impl TransformerDefinition {
    pub fn new(name: &'static str, parameters: Vec<ParameterDefinition>) -> Self {
        TransformerDefinition {
            name,
            parameters,
            properties: BTreeMap::new(),
            init: default_init,
        }
    }

    pub fn with_property(mut self, key: &'static str, value: bool) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn get_property(&self, key: &str) -> Option<bool> {
        self.properties.get(key).copied()
    }

    pub fn initialize(
        &self,
        driver: &Driver,
        config: &TransformerConfig,
    ) -> Result<(Option<TransformerContext>, ValidationWarnings)> {
        (self.init)(self, driver, config)
    }
}

/// Validates the supplied parameters against the schema: required parameters
/// must be present and column parameters must name existing columns. Any
/// error-severity warning yields no context.
fn default_init(
    definition: &TransformerDefinition,
    driver: &Driver,
    config: &TransformerConfig,
) -> Result<(Option<TransformerContext>, ValidationWarnings)> {
    let mut warnings = ValidationWarnings::new();

    for parameter in &definition.parameters {
        let value = config.params.get(parameter.name);

        if parameter.required && value.is_none() {
            warnings.push(
                ValidationWarning::new()
                    .set_msg("required parameter is missing")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("ParameterName", parameter.name),
            );
            continue;
        }

        if parameter.is_column {
            if let Some(value) = value {
                if driver.column_index(value.as_str()).is_none() {
                    warnings.push(
                        ValidationWarning::new()
                            .set_msg("column parameter references a column the table does not have")
                            .set_severity(ValidationSeverity::Error)
                            .add_meta("ParameterName", parameter.name)
                            .add_meta("ColumnName", value.as_str()),
                    );
                }
            }
        }
    }

    if warnings.is_fatal() {
        return Ok((None, warnings));
    }

    Ok((
        Some(TransformerContext {
            transformer_name: definition.name.to_string(),
            params: config.params.clone(),
            when: config.when.clone(),
        }),
        warnings,
    ))
}

/// Map from transformer name to its definition. The catalog of actual value
/// transformations is a plug-in surface; the core only needs the schemas and
/// capability metadata of whatever is registered.
#[derive(Debug, Clone, Default)]
pub struct TransformerRegistry {
    definitions: BTreeMap<String, TransformerDefinition>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        TransformerRegistry::default()
    }

    /// The built-in definition set.
    pub fn with_builtins() -> Self {
        let mut registry = TransformerRegistry::new();

        registry.register(
            TransformerDefinition::new(
                "Hash",
                vec![
                    ParameterDefinition::column(COLUMN_PARAMETER_NAME),
                    ParameterDefinition::optional(ENGINE_PARAMETER_NAME),
                    ParameterDefinition::optional("salt"),
                ],
            )
            .with_property(ALLOW_APPLY_FOR_REFERENCED, true)
            .with_property(REQUIRE_HASH_ENGINE_PARAMETER, true),
        );

        registry.register(
            TransformerDefinition::new(
                "RandomInt",
                vec![
                    ParameterDefinition::column(COLUMN_PARAMETER_NAME),
                    ParameterDefinition::optional("min"),
                    ParameterDefinition::optional("max"),
                    ParameterDefinition::optional(ENGINE_PARAMETER_NAME),
                ],
            )
            .with_property(ALLOW_APPLY_FOR_REFERENCED, true)
            .with_property(REQUIRE_HASH_ENGINE_PARAMETER, true),
        );

        registry.register(
            TransformerDefinition::new(
                "RandomUuid",
                vec![
                    ParameterDefinition::column(COLUMN_PARAMETER_NAME),
                    ParameterDefinition::optional(ENGINE_PARAMETER_NAME),
                ],
            )
            .with_property(ALLOW_APPLY_FOR_REFERENCED, true)
            .with_property(REQUIRE_HASH_ENGINE_PARAMETER, true),
        );

        registry.register(
            TransformerDefinition::new(
                "RandomDate",
                vec![
                    ParameterDefinition::column(COLUMN_PARAMETER_NAME),
                    ParameterDefinition::optional("min"),
                    ParameterDefinition::optional("max"),
                    ParameterDefinition::optional(ENGINE_PARAMETER_NAME),
                ],
            )
            .with_property(ALLOW_APPLY_FOR_REFERENCED, true)
            .with_property(REQUIRE_HASH_ENGINE_PARAMETER, true),
        );

        registry.register(TransformerDefinition::new(
            "RandomString",
            vec![
                ParameterDefinition::column(COLUMN_PARAMETER_NAME),
                ParameterDefinition::optional("min_length"),
                ParameterDefinition::optional("max_length"),
            ],
        ));

        registry.register(TransformerDefinition::new(
            "RandomNumeric",
            vec![
                ParameterDefinition::column(COLUMN_PARAMETER_NAME),
                ParameterDefinition::optional("min"),
                ParameterDefinition::optional("max"),
                ParameterDefinition::optional("precision"),
                ParameterDefinition::optional("scale"),
            ],
        ));

        registry.register(TransformerDefinition::new(
            "RandomFloat",
            vec![
                ParameterDefinition::column(COLUMN_PARAMETER_NAME),
                ParameterDefinition::optional("min"),
                ParameterDefinition::optional("max"),
            ],
        ));

        registry.register(TransformerDefinition::new(
            "RandomBool",
            vec![ParameterDefinition::column(COLUMN_PARAMETER_NAME)],
        ));

        registry.register(TransformerDefinition::new(
            "Replace",
            vec![
                ParameterDefinition::column(COLUMN_PARAMETER_NAME),
                ParameterDefinition::required("value"),
                ParameterDefinition::optional("keep_null"),
            ],
        ));

        registry
    }

    pub fn register(&mut self, definition: TransformerDefinition) {
        self.definitions
            .insert(definition.name.to_string(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&TransformerDefinition> {
        self.definitions.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Table};

    fn users_driver() -> Driver {
        let mut table = Table::new("public", "users", 1);
        table.columns = vec![Column::new("id", "int4"), Column::new("email", "text")];
        let (driver, _) = Driver::new(table, &[]);
        driver.unwrap()
    }

    #[test]
    fn builtin_hash_allows_references_and_requires_hash_engine() {
        let registry = TransformerRegistry::with_builtins();
        let hash = registry.get("Hash").unwrap();
        assert_eq!(hash.get_property(ALLOW_APPLY_FOR_REFERENCED), Some(true));
        assert_eq!(hash.get_property(REQUIRE_HASH_ENGINE_PARAMETER), Some(true));

        let random_string = registry.get("RandomString").unwrap();
        assert_eq!(random_string.get_property(ALLOW_APPLY_FOR_REFERENCED), None);
    }

    #[test]
    fn init_rejects_missing_required_parameter() {
        let registry = TransformerRegistry::with_builtins();
        let replace = registry.get("Replace").unwrap();
        let config = TransformerConfig {
            name: "Replace".to_string(),
            params: BTreeMap::from([("column".to_string(), ParamsValue::from("email"))]),
            ..Default::default()
        };

        let (context, warnings) = replace.initialize(&users_driver(), &config).unwrap();
        assert!(context.is_none());
        assert!(warnings.is_fatal());
    }

    #[test]
    fn init_rejects_unknown_column() {
        let registry = TransformerRegistry::with_builtins();
        let hash = registry.get("Hash").unwrap();
        let config = TransformerConfig {
            name: "Hash".to_string(),
            params: BTreeMap::from([("column".to_string(), ParamsValue::from("missing"))]),
            ..Default::default()
        };

        let (context, warnings) = hash.initialize(&users_driver(), &config).unwrap();
        assert!(context.is_none());
        assert!(warnings.is_fatal());
    }

    #[test]
    fn init_produces_context_for_valid_config() {
        let registry = TransformerRegistry::with_builtins();
        let hash = registry.get("Hash").unwrap();
        let config = TransformerConfig {
            name: "Hash".to_string(),
            params: BTreeMap::from([
                ("column".to_string(), ParamsValue::from("id")),
                ("engine".to_string(), ParamsValue::from("hash")),
            ]),
            ..Default::default()
        };

        let (context, warnings) = hash.initialize(&users_driver(), &config).unwrap();
        assert!(warnings.is_empty());
        let context = context.unwrap();
        assert_eq!(context.transformer_name, "Hash");
        assert_eq!(context.params["engine"].as_str(), "hash");
    }
}
