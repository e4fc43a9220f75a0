mod cancellation;
mod catalog_reader;
mod config;
mod config_builder;
mod driver;
mod error;
mod helpers;
mod models;
mod postgres_client_wrapper;
mod quoting;
mod subset;
mod transformer;
mod validation;
mod when_cond;

pub use cancellation::{CancelHandle, CancelToken};
pub use catalog_reader::{CatalogReader, ForeignKeyInfo};
pub use config::{
    DumpConfig, ParamsValue, TableConfig, TransformerConfig, VirtualReference,
    VirtualReferenceTarget,
};
pub use config_builder::{
    plan_dump_queries, subset_conds_map, validate_and_build_table_configs, virtual_foreign_keys,
    TableMapping,
};
pub use driver::{ColumnCodec, Driver};
pub use error::*;
pub use models::*;
pub use subset::{Graph, SubsetPlanner};
pub use transformer::{
    default_transformer_for_column, ParameterDefinition, TransformerContext,
    TransformerDefinition, TransformerRegistry, ALLOW_APPLY_FOR_REFERENCED, HASH_ENGINE_NAME,
    REQUIRE_HASH_ENGINE_PARAMETER,
};
pub use validation::{ValidationSeverity, ValidationWarning, ValidationWarnings};
pub use when_cond::WhenCond;
