use crate::{CancelToken, PgVeilError, Result};
use futures::{pin_mut, TryStreamExt};
use tokio_postgres::types::{FromSqlOwned, ToSql};
use tokio_postgres::{GenericClient, Row};

/// Provides a more convenient way of reading an
/// entire row from a tokio_postgres::Row into a type.
pub trait FromRow: Sized {
    fn from_row(row: Row) -> Result<Self>;
}

impl<T1: FromSqlOwned> FromRow for (T1,) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((row.try_get(0)?,))
    }
}

impl<T1: FromSqlOwned, T2: FromSqlOwned> FromRow for (T1, T2) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((row.try_get(0)?, row.try_get(1)?))
    }
}

impl<T1: FromSqlOwned, T2: FromSqlOwned, T3: FromSqlOwned> FromRow for (T1, T2, T3) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((row.try_get(0)?, row.try_get(1)?, row.try_get(2)?))
    }
}

fn slice_iter<'a>(
    params: &'a [&'a (dyn ToSql + Sync)],
) -> impl ExactSizeIterator<Item = &'a dyn ToSql> + 'a {
    params.iter().map(|p| *p as _)
}

/// Executes a query that returns results, racing it against the caller's
/// cancellation signal. The connection is whatever the caller handed the
/// core, typically a repeatable-read transaction.
pub(crate) async fn get_results<T: FromRow, C: GenericClient>(
    connection: &C,
    cancel: &CancelToken,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<T>> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PgVeilError::Cancelled),
        results = run_query::<T, C>(connection, sql, params) => results,
    }
}

async fn run_query<T: FromRow, C: GenericClient>(
    connection: &C,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<T>> {
    let query_results = connection
        .query_raw(sql, slice_iter(params))
        .await
        .map_err(|e| PgVeilError::PostgresErrorWithQuery {
            source: e,
            query: sql.to_string(),
        })?;

    pin_mut!(query_results);

    let mut output = Vec::new();

    while let Some(row) = query_results.try_next().await? {
        output.push(T::from_row(row)?);
    }

    Ok(output)
}

/// Executes a query that returns exactly one result row.
pub(crate) async fn get_result<T: FromRow, C: GenericClient>(
    connection: &C,
    cancel: &CancelToken,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<T> {
    let results = get_results(connection, cancel, sql, params).await?;
    if results.len() != 1 {
        return Err(PgVeilError::InvalidNumberOfResults {
            actual: results.len(),
            expected: 1,
        });
    }

    // Safe, we have just checked the length of the vector
    let r = results.into_iter().next().unwrap();

    Ok(r)
}

/// Executes a query that returns a single column of a single row.
pub(crate) async fn get_single_result<T: FromSqlOwned, C: GenericClient>(
    connection: &C,
    cancel: &CancelToken,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<T> {
    let result = get_result::<(T,), C>(connection, cancel, sql, params).await?;
    Ok(result.0)
}

/// Executes a query that returns a single column of results.
pub(crate) async fn get_single_results<T: FromSqlOwned, C: GenericClient>(
    connection: &C,
    cancel: &CancelToken,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<T>> {
    let r = get_results::<(T,), C>(connection, cancel, sql, params)
        .await?
        .into_iter()
        .map(|t| t.0)
        .collect();

    Ok(r)
}
