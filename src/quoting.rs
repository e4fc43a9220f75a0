/// Always-quoted identifier form used inside generated subset SQL. Subset
/// queries quote every identifier unconditionally so the output is stable no
/// matter what the keyword list of the target server looks like. Embedded
/// quotes are doubled, as postgres' ruleutils does.
pub fn force_quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', r#""""#))
}

pub fn qualified_table_name(schema: &str, table: &str) -> String {
    format!("{}.{}", force_quote(schema), force_quote(table))
}

/// Fully qualified column reference: `"schema"."table"."column"`.
pub fn column_reference(schema: &str, table: &str, column: &str) -> String {
    format!(
        "{}.{}.{}",
        force_quote(schema),
        force_quote(table),
        force_quote(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        macro_rules! test_quote {
            ($identifier:literal, $expected:literal) => {
                assert_eq!(force_quote($identifier), $expected);
            };
        }

        test_quote!("table1", "\"table1\"");
        test_quote!("MyTable", "\"MyTable\"");
        test_quote!("my\"table", "\"my\"\"table\"");
        test_quote!("", "\"\"");
    }

    #[test]
    fn column_references_are_fully_quoted() {
        assert_eq!(
            column_reference("public", "users", "id"),
            r#""public"."users"."id""#
        );
    }

}
