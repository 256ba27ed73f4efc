// 🗄️ SQLite loader - bulk insert of a produced result table
// The table can come straight from a run or from the flat file a run wrote.
// Empty cells load as NULL; `bin` is stored as INTEGER, everything else TEXT.

use crate::reconciler::ResultTable;
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use tracing::info;

/// Open (or create) a database file with WAL journaling
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Create the result table if it does not exist yet
pub fn setup_result_table(conn: &Connection, table: &str, headers: &[String]) -> Result<()> {
    check_table_name(table)?;

    let columns: Vec<String> = headers
        .iter()
        .map(|h| {
            let sql_type = if h == "bin" { "INTEGER" } else { "TEXT" };
            format!("{} {}", quote_identifier(h), sql_type)
        })
        .collect();

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {}
            )",
            table,
            columns.join(",\n                ")
        ),
        [],
    )
    .with_context(|| format!("Failed to create table {}", table))?;

    Ok(())
}

/// Insert rows (already in header order) in one transaction
pub fn insert_rows(
    conn: &mut Connection,
    table: &str,
    headers: &[String],
    rows: &[Vec<Option<String>>],
) -> Result<usize> {
    check_table_name(table)?;

    let columns: Vec<String> = headers.iter().map(|h| quote_identifier(h)).collect();
    let placeholders: Vec<String> = (1..=headers.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare insert into {}", table))?;
        for (i, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                bail!("Row {} has {} fields, expected {}", i, row.len(), headers.len());
            }
            stmt.execute(params_from_iter(row.iter()))
                .with_context(|| format!("Failed to insert row {}", i))?;
        }
    }
    tx.commit()?;

    info!(table, rows = rows.len(), "rows inserted");
    Ok(rows.len())
}

/// Insert a result table directly
pub fn insert_result_table(
    conn: &mut Connection,
    table: &str,
    result: &ResultTable,
    create_table: bool,
) -> Result<usize> {
    let headers = result.headers();
    if create_table {
        setup_result_table(conn, table, &headers)?;
    }
    let rows: Vec<Vec<Option<String>>> = result.rows().iter().map(ResultTable::record).collect();
    insert_rows(conn, table, &headers, &rows)
}

/// Load a delimited result file into `table`
pub fn load_result_table(
    conn: &mut Connection,
    csv_path: &Path,
    table: &str,
    create_table: bool,
    delimiter: u8,
) -> Result<usize> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open result file: {:?}", csv_path))?;

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read result headers")?
        .iter()
        .map(String::from)
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.context("Failed to read result record")?;
        rows.push(
            record
                .iter()
                .map(|field| (!field.is_empty()).then(|| field.to_string()))
                .collect(),
        );
    }

    if create_table {
        setup_result_table(conn, table, &headers)?;
    }
    insert_rows(conn, table, &headers, &rows)
}

/// Number of rows currently stored in `table`
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    check_table_name(table)?;
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

fn check_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(anyhow!("Invalid table name: {:?}", table))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{BinRow, ScaleBin};
    use std::io::Write;

    fn result_table() -> ResultTable {
        let mut table = ResultTable::new(vec!["norte".to_string(), "sur".to_string()]);
        for bin in 1..=2 {
            table
                .push(BinRow {
                    name: "Hombres".to_string(),
                    code: "p_hombres".to_string(),
                    bin,
                    scales: vec![
                        Some(ScaleBin {
                            interval: format!("{}.0:{}.0", bin, bin + 1),
                            cells: "{n1,n2}".to_string(),
                        }),
                        if bin == 1 {
                            Some(ScaleBin {
                                interval: "0.0:9.0".to_string(),
                                cells: "{s1}".to_string(),
                            })
                        } else {
                            None
                        },
                    ],
                })
                .unwrap();
        }
        table
    }

    #[test]
    fn test_insert_result_table() {
        let mut conn = Connection::open_in_memory().unwrap();

        let inserted = insert_result_table(&mut conn, "categorias", &result_table(), true).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(count_rows(&conn, "categorias").unwrap(), 2);

        let (bin, cells_sur): (i64, Option<String>) = conn
            .query_row(
                "SELECT bin, cells_sur FROM categorias WHERE bin = 2",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(bin, 2);
        assert_eq!(cells_sur, None);

        // Appending into the existing table
        insert_result_table(&mut conn, "categorias", &result_table(), false).unwrap();
        assert_eq!(count_rows(&conn, "categorias").unwrap(), 4);
    }

    #[test]
    fn test_load_result_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultado.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "name,code,bin,interval_A,cells_A").unwrap();
        writeln!(file, "Equis,x,1,0.999:2.0,\"{{a,b}}\"").unwrap();
        writeln!(file, "Equis,x,2,,").unwrap();
        drop(file);

        let mut conn = Connection::open_in_memory().unwrap();
        let inserted = load_result_table(&mut conn, &path, "bins", true, b',').unwrap();
        assert_eq!(inserted, 2);

        let cells: String = conn
            .query_row("SELECT cells_A FROM bins WHERE bin = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(cells, "{a,b}");

        let nulls: i64 = conn
            .query_row("SELECT COUNT(*) FROM bins WHERE interval_A IS NULL", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn test_database_file_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categorias.db");

        let mut conn = open_database(&path).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        insert_result_table(&mut conn, "categorias", &result_table(), true).unwrap();
        drop(conn);

        let reopened = open_database(&path).unwrap();
        assert_eq!(count_rows(&reopened, "categorias").unwrap(), 2);
    }

    #[test]
    fn test_rejects_bad_table_names() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(insert_result_table(&mut conn, "bins; DROP TABLE x", &result_table(), true).is_err());
        assert!(insert_result_table(&mut conn, "1bins", &result_table(), true).is_err());
        assert!(check_table_name("_bins_2024").is_ok());
    }
}
