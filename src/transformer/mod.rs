mod defaults;
mod registry;

pub use defaults::default_transformer_for_column;
pub use registry::{
    ParameterDefinition, TransformerContext, TransformerDefinition, TransformerRegistry,
    ALLOW_APPLY_FOR_REFERENCED, HASH_ENGINE_NAME, REQUIRE_HASH_ENGINE_PARAMETER,
};

pub(crate) use registry::{COLUMN_PARAMETER_NAME, ENGINE_PARAMETER_NAME};
