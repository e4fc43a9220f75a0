use crate::config::{ParamsValue, TableConfig, TransformerConfig};
use crate::config_builder::ConfigMapping;
use crate::models::Table;
use crate::subset::{Edge, Graph};
use crate::transformer::{
    TransformerRegistry, ALLOW_APPLY_FOR_REFERENCED, COLUMN_PARAMETER_NAME,
    ENGINE_PARAMETER_NAME, HASH_ENGINE_NAME, REQUIRE_HASH_ENGINE_PARAMETER,
};
use crate::validation::{ValidationSeverity, ValidationWarning, ValidationWarnings};
use crate::when_cond::{extract_condition_columns, rewrite_condition_column};
use std::collections::BTreeSet;
use tracing::info;

/// A root transformer eligible for propagation: it targets a primary key
/// column of the configured table. `att_num` is the column's position within
/// the primary key; child foreign keys are matched at the same position.
#[derive(Debug, Clone)]
struct RootTransformer {
    column: String,
    att_num: usize,
    config: TransformerConfig,
}

/// Phase 4 entry: propagates apply-for-references transformers from the
/// configured table down the reversed foreign key graph, appending a binding
/// per reached reference column.
pub(crate) fn get_ref_tables(
    graph: &Graph,
    root: &ConfigMapping,
    all_configs: &[TableConfig],
    result: &mut Vec<ConfigMapping>,
) -> ValidationWarnings {
    let Some(root_idx) = graph.find_table(&root.table.schema, &root.table.name) else {
        return ValidationWarnings::from(vec![ValidationWarning::new()
            .set_msg("transformer inheritance for ref: cannot find table in the graph: table will be ignored")
            .set_severity(ValidationSeverity::Warning)
            .add_meta("SchemaName", &root.table.schema)
            .add_meta("TableName", &root.table.name)]);
    };

    let root_transformers = collect_root_transformers(&root.table, &root.config);
    if root_transformers.is_empty() {
        return ValidationWarnings::new();
    }

    // The visited set keeps the walk finite on cyclic reference graphs; the
    // root is pre-seeded so a cycle cannot route propagation back onto it.
    let mut visited = BTreeSet::from([root_idx]);
    build_refs_with_end_to_end_dfs(
        graph,
        root_idx,
        &root.config,
        &root_transformers,
        all_configs,
        result,
        false,
        &mut visited,
    )
}

/// Depth-first propagation over the reversed graph. Beyond the first level
/// only edges whose child carries the reference inside its own primary key
/// are followed; that is what makes the anonymized identity an end-to-end
/// identifier rather than a mere mention.
#[allow(clippy::too_many_arguments)]
fn build_refs_with_end_to_end_dfs(
    graph: &Graph,
    current: usize,
    root_config: &TableConfig,
    root_transformers: &[RootTransformer],
    all_configs: &[TableConfig],
    result: &mut Vec<ConfigMapping>,
    check_end_to_end: bool,
    visited: &mut BTreeSet<usize>,
) -> ValidationWarnings {
    let mut warnings = ValidationWarnings::new();

    for edge in graph.reversed_edges(current) {
        let child_idx = edge.to().table_idx();

        if check_end_to_end && !is_end_to_end_pk_fk(graph, edge) {
            continue;
        }

        warnings.extend(process_reference(
            graph,
            edge,
            root_config,
            root_transformers,
            all_configs,
            result,
        ));

        if visited.insert(child_idx) {
            warnings.extend(build_refs_with_end_to_end_dfs(
                graph,
                child_idx,
                root_config,
                root_transformers,
                all_configs,
                result,
                true,
                visited,
            ));
        }
    }

    warnings
}

/// The end-to-end identifier criterion: the referencing side's key columns
/// intersect the referencing table's own primary key.
fn is_end_to_end_pk_fk(graph: &Graph, edge: &Edge) -> bool {
    let child = graph.table(edge.to().table_idx());
    edge.to()
        .keys()
        .iter()
        .any(|key| child.primary_key.contains(key))
}

/// Applies every eligible root transformer to one incoming reference: clones
/// the transformer onto the child-side column, rewrites its `when` condition,
/// and inherits the root's column type override.
fn process_reference(
    graph: &Graph,
    edge: &Edge,
    root_config: &TableConfig,
    root_transformers: &[RootTransformer],
    all_configs: &[TableConfig],
    result: &mut Vec<ConfigMapping>,
) -> ValidationWarnings {
    let mut warnings = ValidationWarnings::new();
    let child_table = graph.table(edge.to().table_idx());

    for root_transformer in root_transformers {
        let fk_keys = edge.to().keys();
        if root_transformer.att_num >= fk_keys.len() {
            continue;
        }
        let ref_column = &fk_keys[root_transformer.att_num];

        if let Some(existing) = check_transformer_already_exists(
            all_configs,
            &child_table.schema,
            &child_table.name,
            &root_transformer.config.name,
            ref_column,
        ) {
            info!(
                transformer_name = %root_transformer.config.name,
                parent_table_schema = %root_config.schema,
                parent_table_name = %root_config.name,
                child_table_schema = %child_table.schema,
                child_table_name = %child_table.name,
                child_column_name = %ref_column,
                manual_transformer = %existing.name,
                "skipping apply transformer for reference: found manually configured transformer"
            );
            continue;
        }

        let mut config = root_transformer.config.clone();
        config
            .params
            .insert(COLUMN_PARAMETER_NAME.to_string(), ParamsValue::from(ref_column.as_str()));
        if !config.when.is_empty() {
            config.when =
                rewrite_condition_column(&config.when, &root_transformer.column, ref_column);
        }

        warnings.extend(validate_inherited_condition_columns(child_table, &config));

        let column_type_override = root_config
            .columns_type_override
            .get(&root_transformer.column)
            .map(|type_name| (ref_column.clone(), type_name.clone()));

        add_transformer_to_reference_table(result, child_table, config, column_type_override);
    }

    warnings
}

/// An inherited `when` condition must only reference columns the child table
/// actually has.
fn validate_inherited_condition_columns(
    table: &Table,
    config: &TransformerConfig,
) -> ValidationWarnings {
    let mut warnings = ValidationWarnings::new();
    if config.when.is_empty() {
        return warnings;
    }

    for column in extract_condition_columns(&config.when) {
        if table.find_column(&column).is_none() {
            warnings.push(
                ValidationWarning::new()
                    .set_msg(format!(
                        "cannot inherit condition: column {} not found in table {}.{}",
                        column, table.schema, table.name
                    ))
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("SchemaName", &table.schema)
                    .add_meta("TableName", &table.name)
                    .add_meta("ColumnName", &column),
            );
        }
    }
    warnings
}

fn add_transformer_to_reference_table(
    result: &mut Vec<ConfigMapping>,
    child_table: &Table,
    config: TransformerConfig,
    column_type_override: Option<(String, String)>,
) {
    if let Some(existing) = result.iter_mut().find(|m| m.table.oid == child_table.oid) {
        existing.config.transformers.push(config);
        if let Some((column, type_name)) = column_type_override {
            existing
                .config
                .columns_type_override
                .entry(column)
                .or_insert(type_name);
        }
        return;
    }

    let mut table_config = TableConfig {
        schema: child_table.schema.clone(),
        name: child_table.name.clone(),
        transformers: vec![config],
        ..Default::default()
    };
    if let Some((column, type_name)) = column_type_override {
        table_config.columns_type_override.insert(column, type_name);
    }

    result.push(ConfigMapping {
        table: child_table.clone(),
        config: table_config,
    });
}

/// Gathers the root table's transformers that are marked for reference
/// propagation and target a primary key column.
fn collect_root_transformers(table: &Table, config: &TableConfig) -> Vec<RootTransformer> {
    let mut result = Vec::new();
    for transformer in &config.transformers {
        if !transformer.apply_for_references {
            continue;
        }
        let Some(column) = transformer.params.get(COLUMN_PARAMETER_NAME) else {
            continue;
        };
        let Some(att_num) = table
            .primary_key
            .iter()
            .position(|key| key == column.as_str())
        else {
            continue;
        };
        result.push(RootTransformer {
            column: column.as_str().to_string(),
            att_num,
            config: transformer.clone(),
        });
    }
    result
}

fn check_transformer_already_exists<'a>(
    configs: &'a [TableConfig],
    schema: &str,
    name: &str,
    transformer_name: &str,
    column: &str,
) -> Option<&'a TransformerConfig> {
    configs
        .iter()
        .filter(|c| c.name == name && c.schema == schema)
        .flat_map(|c| c.transformers.iter())
        .find(|t| {
            t.name == transformer_name
                && t.params
                    .get(COLUMN_PARAMETER_NAME)
                    .map(|v| v.as_str() == column)
                    .unwrap_or(false)
        })
}

/// Checks that every apply-for-references transformer on the table is allowed
/// to propagate: the registry must grant the capability, and a transformer
/// that requires the hash engine must actually be configured with it.
pub(crate) fn check_apply_for_reference_requirements(
    config: &TableConfig,
    registry: &TransformerRegistry,
) -> (bool, ValidationWarnings) {
    let mut warnings = ValidationWarnings::new();

    for transformer in &config.transformers {
        if !transformer.apply_for_references {
            continue;
        }

        let Some(definition) = registry.get(&transformer.name) else {
            warnings.push(
                ValidationWarning::new()
                    .set_msg("transformer not found")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("TransformerName", &transformer.name),
            );
            continue;
        };

        if definition.get_property(ALLOW_APPLY_FOR_REFERENCED) != Some(true) {
            warnings.push(
                ValidationWarning::new()
                    .set_msg("cannot apply transformer for references: transformer does not support apply for references")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("TransformerName", &transformer.name),
            );
            continue;
        }

        if definition.get_property(REQUIRE_HASH_ENGINE_PARAMETER) == Some(true) {
            let engine = transformer
                .params
                .get(ENGINE_PARAMETER_NAME)
                .map(ParamsValue::as_str);
            if engine != Some(HASH_ENGINE_NAME) {
                warnings.push(
                    ValidationWarning::new()
                        .set_msg("cannot apply transformer for references: engine parameter is not hash")
                        .set_severity(ValidationSeverity::Error)
                        .add_meta("TransformerName", &transformer.name),
                );
            }
        }
    }

    (!warnings.is_fatal(), warnings)
}
