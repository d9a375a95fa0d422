//! SQL text for the loader's statements.

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-row insert with `$n` placeholders, row-major.
pub fn insert(table: &str, columns: &[String], rows: usize) -> String {
    let width = columns.len();
    let values = (0..rows)
        .map(|row| {
            let placeholders = (1..=width)
                .map(|col| format!("${}", row * width + col))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({placeholders})")
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES {values}",
        column_list(columns)
    )
}

/// Temporary table with the target's columns, dropped at commit.
pub fn create_staging(staging: &str, target: &str) -> String {
    format!(
        "CREATE TEMP TABLE {} (LIKE {target} INCLUDING DEFAULTS) ON COMMIT DROP",
        quote_ident(staging)
    )
}

/// Upsert from the staging table into the target.
///
/// `update` lists the columns overwritten on conflict; an empty list turns
/// the merge into insert-if-absent. With `conditional`, a matched row is only
/// updated when the incoming value of that column is not older.
pub fn merge(
    target: &str,
    staging: &str,
    columns: &[String],
    key: &[String],
    update: &[String],
    conditional: Option<&str>,
) -> String {
    let cols = column_list(columns);
    let mut sql = format!(
        "INSERT INTO {target} AS target ({cols}) SELECT {cols} FROM {} ON CONFLICT ({})",
        quote_ident(staging),
        column_list(key)
    );
    if update.is_empty() {
        sql.push_str(" DO NOTHING");
        return sql;
    }
    let assignments = update
        .iter()
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    sql.push_str(&format!(" DO UPDATE SET {assignments}"));
    if let Some(column) = conditional {
        let column = quote_ident(column);
        sql.push_str(&format!(" WHERE EXCLUDED.{column} >= target.{column}"));
    }
    sql
}

pub fn truncate(target: &str) -> String {
    format!("TRUNCATE TABLE {target}")
}

/// Column names of a table, in ordinal order.
pub const TABLE_COLUMNS: &str = "SELECT column_name::text FROM information_schema.columns \
     WHERE table_schema::text = $1 AND table_name::text = $2 ORDER BY ordinal_position";

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified("public", "Orders"), "\"public\".\"Orders\"");
    }

    #[test]
    fn test_insert() {
        assert_eq!(
            insert("\"t\"", &cols(&["id", "name"]), 2),
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_create_staging() {
        assert_eq!(
            create_staging("stage", "\"public\".\"t\""),
            "CREATE TEMP TABLE \"stage\" (LIKE \"public\".\"t\" INCLUDING DEFAULTS) ON COMMIT DROP"
        );
    }

    #[test]
    fn test_merge() {
        assert_eq!(
            merge(
                "\"t\"",
                "stage",
                &cols(&["id", "name", "updated_at"]),
                &cols(&["id"]),
                &cols(&["name", "updated_at"]),
                None
            ),
            "INSERT INTO \"t\" AS target (\"id\", \"name\", \"updated_at\") \
             SELECT \"id\", \"name\", \"updated_at\" FROM \"stage\" ON CONFLICT (\"id\") \
             DO UPDATE SET \"name\" = EXCLUDED.\"name\", \"updated_at\" = EXCLUDED.\"updated_at\""
        );
    }

    #[test]
    fn test_conditional_merge() {
        let sql = merge(
            "\"t\"",
            "stage",
            &cols(&["id", "updated_at"]),
            &cols(&["id"]),
            &cols(&["updated_at"]),
            Some("updated_at"),
        );
        assert!(sql.ends_with("WHERE EXCLUDED.\"updated_at\" >= target.\"updated_at\""));
    }

    #[test]
    fn test_merge_without_updates() {
        let sql = merge("\"t\"", "stage", &cols(&["id"]), &cols(&["id"]), &[], None);
        assert!(sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }
}
