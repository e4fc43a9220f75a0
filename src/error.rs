use thiserror::Error;

#[derive(Error, Debug)]
pub enum PgVeilError {
    #[error("Error from postgres: `{0}`")]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Error from postgres: `{query}` when executing query: `{source}`")]
    PostgresErrorWithQuery {
        query: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Invalid number of results returned from query. Expected `{expected}`, got `{actual}`")]
    InvalidNumberOfResults { actual: usize, expected: usize },

    #[error("Unsupported postgres version `{0}`, 12 or later is required")]
    UnsupportedPostgresVersion(i32),

    #[error("Unknown constraint type '{0}'")]
    UnknownConstraintType(String),

    #[error("Catalog query was cancelled")]
    Cancelled,

    #[error("Table `{schema}`.`{table}` is not part of the foreign key graph")]
    TableNotInGraph { schema: String, table: String },

    #[error("Cannot plan subset for component containing `{schema}`.`{table}`: the strongly connected component has more than one distinct cycle group")]
    UnsupportedCycles { schema: String, table: String },

    #[error("Cannot read user configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

pub type Result<T = ()> = std::result::Result<T, PgVeilError>;
