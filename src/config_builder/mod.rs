use crate::catalog_reader::CatalogReader;
use crate::config::{DumpConfig, TableConfig, TransformerConfig};
use crate::driver::Driver;
use crate::helpers::dedupe_strings;
use crate::models::{CustomType, Oid, Table};
use crate::subset::Graph;
use crate::transformer::{TransformerContext, TransformerRegistry};
use crate::validation::{ValidationSeverity, ValidationWarning, ValidationWarnings};
use crate::when_cond::WhenCond;
use crate::Result;
use itertools::Itertools;
use std::collections::BTreeMap;
use tokio_postgres::GenericClient;
use tracing::{info, instrument};

mod reference;
#[cfg(test)]
mod tests;

use reference::get_ref_tables;
pub(crate) use reference::check_apply_for_reference_requirements;

/// One table entry bound to its effective configuration: the enriched
/// catalog table, the transformer chain and the compiled `when` predicate.
/// Consumed by both the subset planner and the streaming runtime.
#[derive(Debug, Clone)]
pub struct TableMapping {
    pub table: Table,
    pub config: TableConfig,
    pub driver: Option<Driver>,
    pub when: Option<WhenCond>,
    pub transformers_context: Vec<TransformerContext>,
}

/// Intermediate binding before the catalog-dependent phases run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigMapping {
    pub(crate) table: Table,
    pub(crate) config: TableConfig,
}

impl ConfigMapping {
    fn has_transformer_with_apply_for_references(&self) -> bool {
        self.config.transformers.iter().any(|t| t.apply_for_references)
    }
}

/// Validates the user configuration against the live schema and builds the
/// per-table bindings: partition expansion, reference propagation, driver and
/// `when` compilation, constraint and primary key attachment, transformer
/// initialization.
///
/// User-input problems come back as warnings; any error-severity warning
/// short-circuits the build with the warnings accumulated so far and no
/// `Err`. An `Err` always means infrastructure failure.
#[instrument(skip_all)]
pub async fn validate_and_build_table_configs<C: GenericClient>(
    reader: &CatalogReader<'_, C>,
    graph: &Graph,
    cfg: &DumpConfig,
    registry: &TransformerRegistry,
    custom_types: &[CustomType],
) -> Result<(Vec<TableMapping>, ValidationWarnings)> {
    let mut warnings = ValidationWarnings::new();

    let exists_warnings = validate_config_tables(reader, &cfg.transformation).await?;
    warnings.extend(exists_warnings);
    if warnings.is_fatal() {
        return Ok((Vec::new(), warnings));
    }

    let version = reader.get_server_version().await?;

    // Partition children are the only lookup the binding phase needs, so they
    // are prefetched here and the phase itself stays free of catalog access.
    let mut partition_children: BTreeMap<Oid, Vec<Oid>> = BTreeMap::new();
    for mapping in find_tables_with_configs(graph, &cfg.transformation) {
        if mapping.table.is_partitioned_parent() && mapping.config.apply_for_inherited {
            let children = reader.get_partition_children(mapping.table.oid).await?;
            partition_children.insert(mapping.table.oid, children);
        }
    }

    let (mappings, binding_warnings) =
        set_config_to_entries(graph, cfg, registry, &partition_children);
    warnings.extend(binding_warnings);

    let mut result = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let (table_mapping, entry_warnings, fatal) =
            build_entry(reader, registry, custom_types, cfg, mapping, version).await?;
        warnings.extend(entry_warnings);
        if fatal {
            return Ok((Vec::new(), warnings));
        }
        result.push(table_mapping);
    }

    Ok((result, warnings))
}

async fn build_entry<C: GenericClient>(
    reader: &CatalogReader<'_, C>,
    registry: &TransformerRegistry,
    custom_types: &[CustomType],
    dump_cfg: &DumpConfig,
    mut mapping: ConfigMapping,
    version: i32,
) -> Result<(TableMapping, ValidationWarnings, bool)> {
    let mut warnings = ValidationWarnings::new();

    set_subset_conds(&mut mapping.table, &mapping.config);
    set_query(&mut mapping.table, &mapping.config);

    let override_warnings = apply_column_type_overrides(&mut mapping.table, &mapping.config);
    warnings.extend(enriched(override_warnings, &mapping.table));
    if warnings.is_fatal() {
        return Ok((unfinished(mapping), warnings, true));
    }

    let (driver, driver_warnings) = Driver::new(mapping.table.clone(), custom_types);
    warnings.extend(enriched(driver_warnings, &mapping.table));
    if warnings.is_fatal() {
        return Ok((unfinished(mapping), warnings, true));
    }
    let driver = driver.expect("non-fatal driver construction always yields a driver");

    let when_meta = BTreeMap::from([
        ("TableSchema".to_string(), mapping.table.schema.clone()),
        ("TableName".to_string(), mapping.table.name.clone()),
    ]);
    let (when, when_warnings) = WhenCond::compile(&mapping.config.when, &driver, &when_meta);
    warnings.extend(when_warnings);
    if warnings.is_fatal() {
        return Ok((unfinished(mapping), warnings, true));
    }

    mapping.table.constraints = reader
        .get_table_constraints(mapping.table.oid, version)
        .await?;
    mapping.table.primary_key = reader.get_table_primary_key(mapping.table.oid).await?;

    let mut config = mapping.config.clone();
    let (contexts, transformer_warnings) = init_and_setup_transformers(
        &mapping.table,
        &mut config,
        dump_cfg,
        registry,
        &driver,
    )?;
    warnings.extend(enriched(transformer_warnings, &mapping.table));
    let fatal = warnings.is_fatal();

    Ok((
        TableMapping {
            table: mapping.table,
            config,
            driver: Some(driver),
            when,
            transformers_context: contexts,
        },
        warnings,
        fatal,
    ))
}

fn unfinished(mapping: ConfigMapping) -> TableMapping {
    TableMapping {
        table: mapping.table,
        config: mapping.config,
        driver: None,
        when: None,
        transformers_context: Vec::new(),
    }
}

fn enriched(mut warnings: ValidationWarnings, table: &Table) -> ValidationWarnings {
    warnings.enrich_meta("SchemaName", &table.schema);
    warnings.enrich_meta("TableName", &table.name);
    warnings
}

/// Phase 1: every configured `(schema, name)` must name a live table.
async fn validate_config_tables<C: GenericClient>(
    reader: &CatalogReader<'_, C>,
    cfg: &[TableConfig],
) -> Result<ValidationWarnings> {
    let mut warnings = ValidationWarnings::new();
    for table in cfg {
        if !reader.table_exists(&table.schema, &table.name).await? {
            warnings.push(
                ValidationWarning::new()
                    .set_msg("table is not found")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("Schema", &table.schema)
                    .add_meta("TableName", &table.name),
            );
        }
    }
    Ok(warnings)
}

/// Phase 2: match config entries to introspected tables, tolerating quoted
/// names on either part.
pub(crate) fn find_tables_with_configs(
    graph: &Graph,
    cfg: &[TableConfig],
) -> Vec<ConfigMapping> {
    let mut result = Vec::new();
    for table in graph.tables() {
        let matched = cfg.iter().find(|c| {
            (c.name == table.name || format!("\"{}\"", c.name) == table.name)
                && (c.schema == table.schema || format!("\"{}\"", c.schema) == table.schema)
        });
        if let Some(config) = matched {
            result.push(ConfigMapping {
                table: table.clone(),
                config: config.clone(),
            });
        }
    }
    result
}

/// Phases 2-5 without catalog access: binds configs to entries, expands
/// partitioned parents onto their leaves, and propagates apply-for-references
/// transformers through the reversed graph.
pub(crate) fn set_config_to_entries(
    graph: &Graph,
    cfg: &DumpConfig,
    registry: &TransformerRegistry,
    partition_children: &BTreeMap<Oid, Vec<Oid>>,
) -> (Vec<ConfigMapping>, ValidationWarnings) {
    let mut result: Vec<ConfigMapping> = Vec::new();
    let mut warnings = ValidationWarnings::new();

    for mapping in find_tables_with_configs(graph, &cfg.transformation) {
        if mapping.has_transformer_with_apply_for_references() {
            let (ok, check_warnings) =
                check_apply_for_reference_requirements(&mapping.config, registry);
            warnings.extend(check_warnings);
            // A failed requirement skips the whole reference walk; the
            // table's own binding survives untouched.
            if ok {
                let ref_warnings =
                    get_ref_tables(graph, &mapping, &cfg.transformation, &mut result);
                warnings.extend(ref_warnings);
            }
        }

        if !mapping.table.is_partitioned_parent() {
            push_or_merge(&mut result, mapping);
            continue;
        }

        if !mapping.config.apply_for_inherited {
            warnings.push(
                ValidationWarning::new()
                    .set_msg("the table is partitioned use apply_for_inherited")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("SchemaName", &mapping.table.schema)
                    .add_meta("TableName", &mapping.table.name),
            );
            continue;
        }

        expand_partitioned_parent(graph, &mapping, partition_children, &mut result);
    }

    (result, warnings)
}

/// Copies a partitioned parent's configuration onto each of its in-scope
/// leaves, recording the parent identity and column list on every leaf. A
/// leaf that also carries explicit configuration keeps both, parent first.
fn expand_partitioned_parent(
    graph: &Graph,
    parent: &ConfigMapping,
    partition_children: &BTreeMap<Oid, Vec<Oid>>,
    result: &mut Vec<ConfigMapping>,
) {
    let Some(children) = partition_children.get(&parent.table.oid) else {
        return;
    };

    for &child_oid in children {
        let Some(child) = graph.tables().iter().find(|t| t.oid == child_oid) else {
            tracing::debug!("table might be excluded: partition not found in selected tables");
            continue;
        };

        let mut child_table = child.clone();
        child_table.root_pt_schema = Some(parent.table.schema.clone());
        child_table.root_pt_name = Some(parent.table.name.clone());
        child_table.root_pt_oid = Some(parent.table.oid);
        child_table.columns = parent.table.columns.clone();

        let mut child_config = parent.config.clone();
        child_config.schema = child_table.schema.clone();
        child_config.name = child_table.name.clone();
        child_config.apply_for_inherited = false;

        if let Some(existing) = result.iter_mut().find(|m| m.table.oid == child_oid) {
            info!(
                parent_table_schema = %parent.table.schema,
                parent_table_name = %parent.table.name,
                child_table_schema = %child_table.schema,
                child_table_name = %child_table.name,
                "config will be merged: found manually defined transformers on the partitioned table"
            );
            // Parent transformers come first, the leaf's own follow.
            let own = std::mem::take(&mut existing.config.transformers);
            existing.config.transformers = child_config.transformers.clone();
            existing.config.transformers.extend(own);
            existing.table.root_pt_schema = child_table.root_pt_schema.clone();
            existing.table.root_pt_name = child_table.root_pt_name.clone();
            existing.table.root_pt_oid = child_table.root_pt_oid;
            existing.table.columns = child_table.columns.clone();
        } else {
            result.push(ConfigMapping {
                table: child_table,
                config: child_config,
            });
        }
    }
}

/// Appends a binding, merging transformer lists when the table is already
/// present. Merging happens when a partition leaf with explicit config meets
/// its expanded parent config, or when reference propagation landed on a
/// table that also has its own entry.
pub(crate) fn push_or_merge(result: &mut Vec<ConfigMapping>, mapping: ConfigMapping) {
    if let Some(existing) = result.iter_mut().find(|m| m.table.oid == mapping.table.oid) {
        info!(
            table_schema = %mapping.table.schema,
            table_name = %mapping.table.name,
            "config will be merged: table is already bound"
        );
        existing
            .config
            .transformers
            .extend(mapping.config.transformers);
        if existing.config.subset_conds.is_empty() {
            existing.config.subset_conds = mapping.config.subset_conds;
        }
        if existing.config.when.is_empty() {
            existing.config.when = mapping.config.when;
        }
        if existing.config.query.is_none() {
            existing.config.query = mapping.config.query;
        }
        for (column, type_name) in mapping.config.columns_type_override {
            existing
                .config
                .columns_type_override
                .entry(column)
                .or_insert(type_name);
        }
        existing
            .config
            .skip_auto_anonymize
            .extend(mapping.config.skip_auto_anonymize);
    } else {
        result.push(mapping);
    }
}

fn set_subset_conds(table: &mut Table, config: &TableConfig) {
    table.subset_conds = dedupe_strings(&config.subset_conds);
}

fn set_query(table: &mut Table, config: &TableConfig) {
    table.query = config.query.clone();
}

/// Phase 8: rebind column codecs where the user overrode a type. Unknown
/// override targets surface later as fatal driver warnings; here the column
/// name itself must at least exist.
fn apply_column_type_overrides(table: &mut Table, config: &TableConfig) -> ValidationWarnings {
    let mut warnings = ValidationWarnings::new();
    for (column_name, type_name) in &config.columns_type_override {
        match table.columns.iter_mut().find(|c| &c.name == column_name) {
            Some(column) => column.override_type(type_name),
            None => warnings.push(
                ValidationWarning::new()
                    .set_msg("columns_type_override references a column the table does not have")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("ColumnName", column_name),
            ),
        }
    }
    warnings
}

/// Phases 5 and 9: appends auto-anonymize defaults when the dump asks for
/// them, then initializes every transformer through the registry.
pub(crate) fn init_and_setup_transformers(
    table: &Table,
    config: &mut TableConfig,
    dump_cfg: &DumpConfig,
    registry: &TransformerRegistry,
    driver: &Driver,
) -> Result<(Vec<TransformerContext>, ValidationWarnings)> {
    let mut warnings = ValidationWarnings::new();

    if dump_cfg.auto_anonymize {
        let (defaults, default_warnings) =
            generate_default_transformers_for_undefined_columns(table, config, registry);
        warnings.extend(default_warnings);
        config.transformers.extend(defaults);
    }

    let mut contexts = Vec::new();
    for transformer in &config.transformers {
        let Some(definition) = registry.get(&transformer.name) else {
            warnings.push(
                ValidationWarning::new()
                    .set_msg("transformer is not found")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("TransformerName", &transformer.name),
            );
            continue;
        };

        let (context, mut init_warnings) = definition.initialize(driver, transformer)?;
        init_warnings.enrich_meta("TransformerName", &transformer.name);
        warnings.extend(init_warnings);
        if let Some(context) = context {
            contexts.push(context);
        }
    }

    Ok((contexts, warnings))
}

/// Phase 5: a default transformer for every non-key, non-generated column no
/// explicit transformer already covers and the user did not skip. A column
/// type without a default is an error warning, not a process failure.
pub(crate) fn generate_default_transformers_for_undefined_columns(
    table: &Table,
    config: &TableConfig,
    registry: &TransformerRegistry,
) -> (Vec<TransformerConfig>, ValidationWarnings) {
    let mut warnings = ValidationWarnings::new();

    let defined_columns = config
        .transformers
        .iter()
        .flat_map(|t| extract_column_names_from_transformer(t, registry))
        .collect::<std::collections::HashSet<_>>();

    let mut defaults = Vec::new();
    for column in &table.columns {
        if defined_columns.contains(&column.name)
            || config.skip_auto_anonymize.contains(&column.name)
            || column.is_generated
            || table.primary_key.contains(&column.name)
        {
            continue;
        }

        match crate::transformer::default_transformer_for_column(column) {
            Some(default) => {
                tracing::debug!(
                    table_schema = %table.schema,
                    table_name = %table.name,
                    column_name = %column.name,
                    column_type = %column.effective_type_name(),
                    default_transformer = %default.name,
                    "applying default transformer for undefined column"
                );
                defaults.push(default);
            }
            None => warnings.push(
                ValidationWarning::new()
                    .set_msg("unable to get default transformer for column")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("ColumnName", &column.name)
                    .add_meta("TypeName", column.effective_type_name()),
            ),
        }
    }

    (defaults, warnings)
}

/// Columns a transformer is configured to touch, read through its parameter
/// schema: single-column parameters directly, container parameters by
/// JSON-decoding an array of `{name: ...}` objects. Undecodable containers
/// conservatively contribute nothing, unknown transformer names resolve
/// later as their own error.
pub(crate) fn extract_column_names_from_transformer(
    transformer: &TransformerConfig,
    registry: &TransformerRegistry,
) -> Vec<String> {
    let Some(definition) = registry.get(&transformer.name) else {
        return Vec::new();
    };

    let mut columns = Vec::new();
    for parameter in &definition.parameters {
        let Some(value) = transformer.params.get(parameter.name) else {
            continue;
        };
        if parameter.is_column {
            columns.push(value.as_str().to_string());
        } else if parameter.is_column_container {
            columns.extend(extract_column_names_from_param(value.as_bytes()));
        }
    }
    columns
}

#[derive(serde::Deserialize)]
struct ContainerColumn {
    #[serde(default)]
    name: String,
}

fn extract_column_names_from_param(param: &[u8]) -> Vec<String> {
    match serde_json::from_slice::<Vec<ContainerColumn>>(param) {
        Ok(columns) => columns
            .into_iter()
            .map(|c| c.name)
            .filter(|name| !name.is_empty())
            .collect(),
        // Complex structures we cannot parse contribute nothing rather than
        // clobbering exotic transformers.
        Err(_) => Vec::new(),
    }
}

/// Predicate map for the subset planner, keyed by table oid.
pub fn subset_conds_map(mappings: &[TableMapping]) -> BTreeMap<Oid, Vec<String>> {
    mappings
        .iter()
        .filter(|m| !m.table.subset_conds.is_empty())
        .map(|m| (m.table.oid, m.table.subset_conds.clone()))
        .collect()
}

/// Converts user-declared virtual references into the edge shape the graph
/// consumes. Declarations naming tables outside the dumped set are reported
/// as error warnings.
pub fn virtual_foreign_keys(
    tables: &[Table],
    cfg: &DumpConfig,
) -> (Vec<crate::catalog_reader::ForeignKeyInfo>, ValidationWarnings) {
    let mut warnings = ValidationWarnings::new();
    let mut result = Vec::new();

    let find = |schema: &str, name: &str| {
        tables.iter().find(|t| {
            (t.name == name || t.name == format!("\"{}\"", name))
                && (t.schema == schema || t.schema == format!("\"{}\"", schema))
        })
    };

    for reference in &cfg.virtual_references {
        let Some(source) = find(&reference.schema, &reference.name) else {
            warnings.push(
                ValidationWarning::new()
                    .set_msg("virtual reference source table is not found")
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("Schema", &reference.schema)
                    .add_meta("TableName", &reference.name),
            );
            continue;
        };

        for (idx, target_ref) in reference.references.iter().enumerate() {
            let Some(target) = find(&target_ref.schema, &target_ref.name) else {
                warnings.push(
                    ValidationWarning::new()
                        .set_msg("virtual reference target table is not found")
                        .set_severity(ValidationSeverity::Error)
                        .add_meta("Schema", &target_ref.schema)
                        .add_meta("TableName", &target_ref.name),
                );
                continue;
            };

            let target_columns = if target_ref.target_columns.is_empty() {
                target.primary_key.clone()
            } else {
                target_ref.target_columns.clone()
            };

            let nullable = !target_ref.not_null
                && target_ref.columns.iter().any(|name| {
                    source
                        .find_column(name)
                        .map(|c| !c.not_null)
                        .unwrap_or(true)
                });

            result.push(crate::catalog_reader::ForeignKeyInfo {
                constraint_name: format!(
                    "virtual__{}__{}__{}",
                    source.name, target.name, idx
                ),
                source_table_oid: source.oid,
                target_table_oid: target.oid,
                source_columns: target_ref.columns.clone(),
                target_columns,
                nullable,
                source_polymorphic_exprs: target_ref.polymorphic_exprs.clone(),
                target_polymorphic_exprs: Vec::new(),
            });
        }
    }

    (result, warnings)
}

/// All per-table dump queries in one pass: the user's replacement query when
/// present, the planned subset query otherwise.
pub fn plan_dump_queries(
    graph: &Graph,
    mappings: &[TableMapping],
) -> Result<Vec<(Oid, String)>> {
    let planner = crate::subset::SubsetPlanner::new(graph, subset_conds_map(mappings));
    mappings
        .iter()
        .map(|mapping| {
            let sql = match &mapping.table.query {
                Some(query) => query.clone(),
                None => planner.build_table_query(&mapping.table.schema, &mapping.table.name)?,
            };
            Ok((mapping.table.oid, sql))
        })
        .try_collect()
}
