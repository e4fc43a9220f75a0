use super::*;
use crate::config::{DumpConfig, ParamsValue, TableConfig, TransformerConfig};
use crate::subset::test_fixtures::{fk, table_with_columns};
use crate::transformer::TransformerRegistry;
use crate::ValidationSeverity;
use std::collections::BTreeMap;

fn transformer(name: &str, params: &[(&str, &str)], apply_for_references: bool) -> TransformerConfig {
    TransformerConfig {
        name: name.to_string(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), ParamsValue::from(*v)))
            .collect(),
        apply_for_references,
        ..Default::default()
    }
}

fn table_config(schema: &str, name: &str, transformers: Vec<TransformerConfig>) -> TableConfig {
    TableConfig {
        schema: schema.to_string(),
        name: name.to_string(),
        transformers,
        ..Default::default()
    }
}

fn dump_config(transformation: Vec<TableConfig>) -> DumpConfig {
    DumpConfig {
        transformation,
        ..Default::default()
    }
}

fn mapping_for<'a>(mappings: &'a [ConfigMapping], name: &str) -> &'a ConfigMapping {
    mappings
        .iter()
        .find(|m| m.table.name == name)
        .unwrap_or_else(|| panic!("no mapping for {name}"))
}

/// users <- orders <- order_items (end-to-end PK) and users <- comments
/// (plain serial PK) <- comment_likes.
fn reference_graph() -> Graph {
    let tables = vec![
        table_with_columns("public", "users", 1, &["id"], &[("id", "int4"), ("email", "text")]),
        table_with_columns(
            "public",
            "orders",
            2,
            &["id"],
            &[("id", "int4"), ("user_id", "int4")],
        ),
        table_with_columns(
            "public",
            "order_items",
            3,
            &["order_id"],
            &[("order_id", "int4"), ("sku", "text")],
        ),
        table_with_columns(
            "public",
            "comments",
            4,
            &["id"],
            &[("id", "int4"), ("user_id", "int4"), ("body", "text")],
        ),
        table_with_columns(
            "public",
            "comment_likes",
            5,
            &["id"],
            &[("id", "int4"), ("comment_id", "int4")],
        ),
    ];
    Graph::build(
        tables,
        vec![
            fk("orders_user_fk", 2, 1, &["user_id"], &["id"]),
            fk("items_order_fk", 3, 2, &["order_id"], &["id"]),
            fk("comments_user_fk", 4, 1, &["user_id"], &["id"]),
            fk("likes_comment_fk", 5, 4, &["comment_id"], &["id"]),
        ],
    )
}

fn hash_on_id() -> TransformerConfig {
    transformer(
        "Hash",
        &[("column", "id"), ("engine", "hash")],
        true,
    )
}

#[test]
fn partition_expansion_binds_each_leaf_and_drops_the_parent() {
    let mut events = table_with_columns(
        "public",
        "events",
        10,
        &["id"],
        &[("id", "int4"), ("ts", "timestamptz")],
    );
    events.relkind = 'p';
    let events_2024 = table_with_columns("public", "events_2024", 11, &["id"], &[("id", "int4")]);
    let events_2025 = table_with_columns("public", "events_2025", 12, &["id"], &[("id", "int4")]);
    let graph = Graph::build(vec![events, events_2024, events_2025], vec![]);

    let mut config = table_config(
        "public",
        "events",
        vec![transformer("RandomDate", &[("column", "ts")], false)],
    );
    config.apply_for_inherited = true;

    let children = BTreeMap::from([(10, vec![11, 12])]);
    let (mappings, warnings) = set_config_to_entries(
        &graph,
        &dump_config(vec![config]),
        &TransformerRegistry::with_builtins(),
        &children,
    );

    assert!(warnings.is_empty());
    assert_eq!(mappings.len(), 2);
    assert!(mappings.iter().all(|m| m.table.relkind != 'p'));
    for name in ["events_2024", "events_2025"] {
        let mapping = mapping_for(&mappings, name);
        assert_eq!(mapping.config.transformers.len(), 1);
        assert_eq!(mapping.config.transformers[0].name, "RandomDate");
        assert_eq!(mapping.table.root_pt_name.as_deref(), Some("events"));
        assert_eq!(mapping.table.root_pt_oid, Some(10));
        // Leaves inherit the parent's column list.
        assert_eq!(mapping.table.columns.len(), 2);
    }
}

#[test]
fn partitioned_parent_without_apply_for_inherited_is_rejected() {
    let mut events = table_with_columns("public", "events", 10, &["id"], &[("id", "int4")]);
    events.relkind = 'p';
    let graph = Graph::build(vec![events], vec![]);

    let config = table_config(
        "public",
        "events",
        vec![transformer("RandomInt", &[("column", "id")], false)],
    );

    let (mappings, warnings) = set_config_to_entries(
        &graph,
        &dump_config(vec![config]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );

    assert!(mappings.is_empty());
    assert!(warnings.is_fatal());
    let warning = warnings.iter().next().unwrap();
    assert_eq!(warning.msg, "the table is partitioned use apply_for_inherited");
}

#[test]
fn explicit_leaf_config_is_appended_after_the_inherited_one() {
    let mut events = table_with_columns(
        "public",
        "events",
        10,
        &["id"],
        &[("id", "int4"), ("ts", "timestamptz")],
    );
    events.relkind = 'p';
    let events_2024 = table_with_columns("public", "events_2024", 11, &["id"], &[("id", "int4")]);
    let graph = Graph::build(vec![events, events_2024], vec![]);

    let mut parent_config = table_config(
        "public",
        "events",
        vec![transformer("RandomDate", &[("column", "ts")], false)],
    );
    parent_config.apply_for_inherited = true;
    let leaf_config = table_config(
        "public",
        "events_2024",
        vec![transformer("RandomInt", &[("column", "id")], false)],
    );

    let children = BTreeMap::from([(10, vec![11])]);
    let (mappings, warnings) = set_config_to_entries(
        &graph,
        &dump_config(vec![parent_config, leaf_config]),
        &TransformerRegistry::with_builtins(),
        &children,
    );

    assert!(warnings.is_empty());
    assert_eq!(mappings.len(), 1);
    let names: Vec<_> = mappings[0]
        .config
        .transformers
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(names, vec!["RandomDate", "RandomInt"]);
}

#[test]
fn hash_propagates_through_end_to_end_identifiers() {
    let graph = reference_graph();
    let config = table_config("public", "users", vec![hash_on_id()]);

    let (mappings, warnings) = set_config_to_entries(
        &graph,
        &dump_config(vec![config]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );

    assert!(!warnings.is_fatal());

    let orders = mapping_for(&mappings, "orders");
    assert_eq!(orders.config.transformers.len(), 1);
    assert_eq!(orders.config.transformers[0].name, "Hash");
    assert_eq!(orders.config.transformers[0].params["column"].as_str(), "user_id");

    // order_items.order_id is both PK and FK, so the identity keeps flowing.
    let order_items = mapping_for(&mappings, "order_items");
    assert_eq!(order_items.config.transformers[0].params["column"].as_str(), "order_id");

    // comments gets the first-level binding but carries the value in a
    // non-identifying column, so nothing flows further.
    let comments = mapping_for(&mappings, "comments");
    assert_eq!(comments.config.transformers[0].params["column"].as_str(), "user_id");
    assert!(mappings.iter().all(|m| m.table.name != "comment_likes"));
}

#[test]
fn propagation_rewrites_the_when_condition() {
    let graph = reference_graph();
    let mut hash = hash_on_id();
    hash.when = "record.id > 0 && raw_record.id != null".to_string();
    let config = table_config("public", "users", vec![hash]);

    let (mappings, _) = set_config_to_entries(
        &graph,
        &dump_config(vec![config]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );

    let orders = mapping_for(&mappings, "orders");
    assert_eq!(
        orders.config.transformers[0].when,
        "record.user_id > 0 && raw_record.user_id != null"
    );
}

#[test]
fn propagation_inherits_column_type_override() {
    let graph = reference_graph();
    let mut config = table_config("public", "users", vec![hash_on_id()]);
    config
        .columns_type_override
        .insert("id".to_string(), "text".to_string());

    let (mappings, _) = set_config_to_entries(
        &graph,
        &dump_config(vec![config]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );

    let orders = mapping_for(&mappings, "orders");
    assert_eq!(
        orders.config.columns_type_override.get("user_id").map(String::as_str),
        Some("text")
    );
}

#[test]
fn manual_binding_wins_over_propagation() {
    let graph = reference_graph();
    let users = table_config("public", "users", vec![hash_on_id()]);
    let orders = table_config(
        "public",
        "orders",
        vec![transformer("Hash", &[("column", "user_id"), ("engine", "hash")], false)],
    );

    let (mappings, _) = set_config_to_entries(
        &graph,
        &dump_config(vec![users, orders]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );

    let orders_mapping = mapping_for(&mappings, "orders");
    let hash_on_user_id = orders_mapping
        .config
        .transformers
        .iter()
        .filter(|t| t.name == "Hash" && t.params["column"].as_str() == "user_id")
        .count();
    assert_eq!(hash_on_user_id, 1);
}

#[test]
fn apply_for_references_is_rejected_without_the_capability() {
    let graph = reference_graph();
    let config = table_config(
        "public",
        "users",
        vec![transformer("RandomString", &[("column", "id")], true)],
    );

    let (mappings, warnings) = set_config_to_entries(
        &graph,
        &dump_config(vec![config.clone()]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );

    let errors = warnings
        .iter()
        .filter(|w| w.severity == ValidationSeverity::Error)
        .collect::<Vec<_>>();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].msg,
        "cannot apply transformer for references: transformer does not support apply for references"
    );

    // No propagated bindings, but the original binding is preserved.
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].table.name, "users");
    assert_eq!(mappings[0].config.transformers, config.transformers);
}

#[test]
fn apply_for_references_requires_the_hash_engine() {
    let graph = reference_graph();
    let config = table_config(
        "public",
        "users",
        vec![transformer("Hash", &[("column", "id"), ("engine", "random")], true)],
    );

    let (mappings, warnings) = set_config_to_entries(
        &graph,
        &dump_config(vec![config]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );

    assert!(warnings.is_fatal());
    assert!(warnings
        .iter()
        .any(|w| w.msg == "cannot apply transformer for references: engine parameter is not hash"));
    assert_eq!(mappings.len(), 1);
    assert!(mappings.iter().all(|m| m.table.name == "users"));
}

#[test]
fn binding_is_idempotent() {
    let graph = reference_graph();
    let cfg = dump_config(vec![
        table_config("public", "users", vec![hash_on_id()]),
        table_config("public", "comments", vec![transformer("RandomString", &[("column", "body")], false)]),
    ]);
    let registry = TransformerRegistry::with_builtins();

    let first = set_config_to_entries(&graph, &cfg, &registry, &BTreeMap::new());
    let second = set_config_to_entries(&graph, &cfg, &registry, &BTreeMap::new());
    assert_eq!(first, second);
}

#[test]
fn auto_anonymize_covers_undefined_supported_columns() {
    let table = table_with_columns(
        "public",
        "users",
        1,
        &["id"],
        &[
            ("id", "int4"),
            ("email", "text"),
            ("age", "int4"),
            ("tags", "_text"),
        ],
    );
    let mut config = table_config(
        "public",
        "users",
        vec![transformer("RandomString", &[("column", "email")], false)],
    );
    config.skip_auto_anonymize.push("age".to_string());

    let (defaults, warnings) = generate_default_transformers_for_undefined_columns(
        &table,
        &config,
        &TransformerRegistry::with_builtins(),
    );

    assert!(warnings.is_empty());
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].name, "Replace");
    assert_eq!(defaults[0].params["column"].as_str(), "tags");
}

#[test]
fn auto_anonymize_flags_unsupported_column_types() {
    let table = table_with_columns(
        "public",
        "files",
        1,
        &["id"],
        &[("id", "int4"), ("payload", "bytea")],
    );
    let config = table_config("public", "files", vec![]);

    let (defaults, warnings) = generate_default_transformers_for_undefined_columns(
        &table,
        &config,
        &TransformerRegistry::with_builtins(),
    );

    assert!(defaults.is_empty());
    assert!(warnings.is_fatal());
    let warning = warnings.iter().next().unwrap();
    assert_eq!(warning.meta.get("ColumnName").map(String::as_str), Some("payload"));
}

#[test]
fn container_parameters_contribute_their_column_names() {
    let mut registry = TransformerRegistry::with_builtins();
    registry.register(crate::transformer::TransformerDefinition::new(
        "TemplateRecord",
        vec![crate::transformer::ParameterDefinition::column_container("columns")],
    ));

    let config = transformer(
        "TemplateRecord",
        &[("columns", r#"[{"name": "email"}, {"name": "phone"}]"#)],
        false,
    );
    assert_eq!(
        extract_column_names_from_transformer(&config, &registry),
        vec!["email", "phone"]
    );

    // Undecodable container payloads are conservatively treated as
    // referencing nothing.
    let opaque = transformer("TemplateRecord", &[("columns", "{{template}}")], false);
    assert!(extract_column_names_from_transformer(&opaque, &registry).is_empty());
}

#[test]
fn init_reports_unknown_transformer_as_error_warning() {
    let table = table_with_columns("public", "users", 1, &["id"], &[("id", "int4")]);
    let (driver, _) = crate::driver::Driver::new(table.clone(), &[]);
    let mut config = table_config(
        "public",
        "users",
        vec![transformer("NoSuchTransformer", &[("column", "id")], false)],
    );

    let (contexts, warnings) = init_and_setup_transformers(
        &table,
        &mut config,
        &DumpConfig::default(),
        &TransformerRegistry::with_builtins(),
        &driver.unwrap(),
    )
    .unwrap();

    assert!(contexts.is_empty());
    assert!(warnings.is_fatal());
    let warning = warnings.iter().next().unwrap();
    assert_eq!(warning.msg, "transformer is not found");
    assert_eq!(
        warning.meta.get("TransformerName").map(String::as_str),
        Some("NoSuchTransformer")
    );
}

#[test]
fn subset_conds_feed_the_planner() {
    let graph = reference_graph();
    let mut users = table_config("public", "users", vec![]);
    users.subset_conds = vec!["active = true".to_string(), "active = true".to_string()];

    let (mut mappings, _) = set_config_to_entries(
        &graph,
        &dump_config(vec![users]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );

    // The catalog-backed phases are not in play here; apply the conds the way
    // build_entry does before handing the mappings to the planner.
    for mapping in &mut mappings {
        set_subset_conds(&mut mapping.table, &mapping.config);
    }
    let table_mappings: Vec<TableMapping> = mappings
        .into_iter()
        .map(|m| TableMapping {
            table: m.table,
            config: m.config,
            driver: None,
            when: None,
            transformers_context: Vec::new(),
        })
        .collect();

    let conds = subset_conds_map(&table_mappings);
    assert_eq!(conds.get(&1).map(Vec::as_slice), Some(&["active = true".to_string()][..]));

    let queries = plan_dump_queries(&graph, &table_mappings).unwrap();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].1.contains("WHERE ( active = true ) AND TRUE"));
}

#[test]
fn query_override_bypasses_planning() {
    let graph = reference_graph();
    let mut users = table_config("public", "users", vec![]);
    users.query = Some("SELECT * FROM public.users LIMIT 10".to_string());

    let (mut mappings, _) = set_config_to_entries(
        &graph,
        &dump_config(vec![users]),
        &TransformerRegistry::with_builtins(),
        &BTreeMap::new(),
    );
    for mapping in &mut mappings {
        set_query(&mut mapping.table, &mapping.config);
    }
    let table_mappings: Vec<TableMapping> = mappings
        .into_iter()
        .map(|m| TableMapping {
            table: m.table,
            config: m.config,
            driver: None,
            when: None,
            transformers_context: Vec::new(),
        })
        .collect();

    let queries = plan_dump_queries(&graph, &table_mappings).unwrap();
    assert_eq!(queries[0].1, "SELECT * FROM public.users LIMIT 10");
}

#[test]
fn virtual_references_become_graph_edges() {
    let tables = vec![
        table_with_columns("public", "users", 1, &["id"], &[("id", "int4")]),
        table_with_columns(
            "public",
            "notes",
            2,
            &["id"],
            &[("id", "int4"), ("owner_id", "int4"), ("owner_kind", "text")],
        ),
    ];
    let cfg = DumpConfig::from_yaml(indoc::indoc! {r#"
        virtual_references:
          - schema: public
            name: notes
            references:
              - schema: public
                name: users
                columns: [owner_id]
                polymorphic_exprs:
                  - "owner_kind = 'user'"
    "#})
    .unwrap();

    let (fks, warnings) = virtual_foreign_keys(&tables, &cfg);
    assert!(warnings.is_empty());
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].source_table_oid, 2);
    assert_eq!(fks[0].target_table_oid, 1);
    // Target columns default to the referenced table's primary key.
    assert_eq!(fks[0].target_columns, vec!["id"]);
    assert_eq!(fks[0].source_polymorphic_exprs, vec!["owner_kind = 'user'"]);
}

#[test]
fn virtual_reference_to_unknown_table_is_an_error_warning() {
    let tables = vec![table_with_columns("public", "users", 1, &["id"], &[("id", "int4")])];
    let cfg = DumpConfig::from_yaml(indoc::indoc! {r#"
        virtual_references:
          - schema: public
            name: missing
            references:
              - schema: public
                name: users
                columns: [user_id]
    "#})
    .unwrap();

    let (fks, warnings) = virtual_foreign_keys(&tables, &cfg);
    assert!(fks.is_empty());
    assert!(warnings.is_fatal());
}
