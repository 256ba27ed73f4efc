// 📂 Datasets - scales and the translation dictionary
// A scale is a headed table read as text. Numeric views are parsed on
// demand so a column only has to be numeric when it is categorized.

use crate::error::{CategorizeError, Result};
use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Cell spellings read as a missing value
const MISSING_MARKERS: [&str; 6] = ["", "NA", "NaN", "nan", "null", "None"];

// ============================================================================
// SCALE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Scale {
    name: String,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Scale {
    /// Build a scale from headers and row-major text cells
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let name = name.into();

        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if index.insert(column.clone(), i).is_some() {
                return Err(CategorizeError::Configuration(format!(
                    "Scale {} has duplicate column {}",
                    name, column
                )));
            }
        }

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(CategorizeError::Configuration(format!(
                    "Scale {} row {} has {} cells, expected {}",
                    name,
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }

        Ok(Scale {
            name,
            columns,
            index,
            rows,
        })
    }

    /// Build a scale column by column (all columns must have equal length)
    pub fn from_columns<S: Into<String>>(name: S, columns: Vec<(&str, Vec<String>)>) -> Result<Self> {
        let name = name.into();
        let height = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((column, _)) = columns.iter().find(|(_, v)| v.len() != height) {
            return Err(CategorizeError::Configuration(format!(
                "Scale {} column {} length differs from the others",
                name, column
            )));
        }

        let headers = columns.iter().map(|(c, _)| c.to_string()).collect();
        let rows = (0..height)
            .map(|r| columns.iter().map(|(_, v)| v[r].clone()).collect())
            .collect();

        Scale::new(name, headers, rows)
    }

    /// Load a scale from a headed delimited file
    pub fn from_csv(name: &str, path: &Path, delimiter: u8) -> anyhow::Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV file for scale {}: {:?}", name, path))?;

        let columns: Vec<String> = rdr
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.with_context(|| format!("Failed to read record in {:?}", path))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        debug!(scale = name, rows = rows.len(), columns = columns.len(), "loaded scale");

        Ok(Scale::new(name, columns, rows)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Fail with `UnknownVariable` unless the column exists
    pub fn require_column(&self, column: &str) -> Result<()> {
        self.column_index(column).map(|_| ())
    }

    /// Raw text of one column
    pub fn text_column(&self, column: &str) -> Result<Vec<&str>> {
        let i = self.column_index(column)?;
        Ok(self.rows.iter().map(|row| row[i].as_str()).collect())
    }

    /// Column parsed as numbers; missing markers and non-finite values become `None`
    pub fn numeric_column(&self, column: &str) -> Result<Vec<Option<f64>>> {
        let i = self.column_index(column)?;

        self.rows
            .iter()
            .enumerate()
            .map(|(r, row)| {
                let raw = row[i].trim();
                if MISSING_MARKERS.contains(&raw) {
                    return Ok(None);
                }
                raw.parse::<f64>()
                    .map(|v| if v.is_finite() { Some(v) } else { None })
                    .map_err(|_| CategorizeError::NonNumericValue {
                        scale: self.name.clone(),
                        variable: column.to_string(),
                        row: r,
                        value: row[i].clone(),
                    })
            })
            .collect()
    }

    /// Entity identifier per row: the identifier columns' text concatenated in order
    pub fn entity_ids(&self, identifier_columns: &[String]) -> Result<Vec<String>> {
        let indexes = identifier_columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>>>()?;

        Ok(self
            .rows
            .iter()
            .map(|row| indexes.iter().map(|&i| row[i].as_str()).collect::<String>())
            .collect())
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.index
            .get(column)
            .copied()
            .ok_or_else(|| CategorizeError::UnknownVariable {
                scale: self.name.clone(),
                variable: column.to_string(),
            })
    }
}

// ============================================================================
// TRANSLATION DICTIONARY
// ============================================================================

/// Variable code → display name
#[derive(Debug, Clone, Default)]
pub struct Translations {
    names: BTreeMap<String, String>,
}

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, name: impl Into<String>) {
        self.names.insert(code.into(), name.into());
    }

    /// Load the dictionary from a delimited file; header names match case-insensitively
    pub fn from_csv(
        path: &Path,
        name_column: &str,
        alias_column: &str,
        delimiter: u8,
    ) -> anyhow::Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .with_context(|| format!("Failed to open translations file: {:?}", path))?;

        let headers: Vec<String> = rdr
            .headers()
            .context("Failed to read translations headers")?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let find = |column: &str| {
            let wanted = column.to_lowercase();
            headers.iter().position(|h| *h == wanted).ok_or_else(|| {
                CategorizeError::Configuration(format!(
                    "Translations file {:?} has no column {}",
                    path, column
                ))
            })
        };
        let name_idx = find(name_column)?;
        let alias_idx = find(alias_column)?;

        let mut translations = Translations::new();
        for result in rdr.records() {
            let record = result.context("Failed to read translations record")?;
            let alias = record.get(alias_idx).unwrap_or_default().trim();
            if alias.is_empty() {
                continue;
            }
            let name = record.get(name_idx).unwrap_or_default().trim();
            translations.insert(alias, name);
        }

        debug!(entries = translations.len(), "loaded translations");
        Ok(translations)
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.names.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<C: Into<String>, N: Into<String>> FromIterator<(C, N)> for Translations {
    fn from_iter<I: IntoIterator<Item = (C, N)>>(iter: I) -> Self {
        let mut translations = Translations::new();
        for (code, name) in iter {
            translations.insert(code, name);
        }
        translations
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_numeric_column_missing_markers() {
        let scale = Scale::from_columns(
            "hogares",
            vec![("x", strings(&["1", "", "NA", "2.5", "nan", "inf", "-inf"]))],
        )
        .unwrap();

        let values = scale.numeric_column("x").unwrap();
        assert_eq!(values, vec![Some(1.0), None, None, Some(2.5), None, None, None]);
    }

    #[test]
    fn test_numeric_column_rejects_text() {
        let scale = Scale::from_columns("hogares", vec![("x", strings(&["1", "abc"]))]).unwrap();

        match scale.numeric_column("x") {
            Err(CategorizeError::NonNumericValue { row, value, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "abc");
            }
            other => panic!("expected NonNumericValue, got {:?}", other),
        }
    }

    #[test]
    fn test_entity_ids_concatenate_columns() {
        let scale = Scale::from_columns(
            "hogares",
            vec![
                ("estado", strings(&["01", "02"])),
                ("municipio", strings(&["001", "015"])),
            ],
        )
        .unwrap();

        let ids = scale
            .entity_ids(&strings(&["estado", "municipio"]))
            .unwrap();
        assert_eq!(ids, strings(&["01001", "02015"]));

        assert!(matches!(
            scale.entity_ids(&strings(&["folio"])),
            Err(CategorizeError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = Scale::new(
            "hogares",
            strings(&["a", "b"]),
            vec![strings(&["1", "2"]), strings(&["3"])],
        );
        assert!(matches!(result, Err(CategorizeError::Configuration(_))));
    }

    #[test]
    fn test_load_scale_and_translations_from_csv() {
        let dir = tempfile::tempdir().unwrap();

        let scale_path = dir.path().join("escala.csv");
        let mut file = std::fs::File::create(&scale_path).unwrap();
        writeln!(file, "id,x,y").unwrap();
        writeln!(file, "a,1,10").unwrap();
        writeln!(file, "b,2,").unwrap();

        let scale = Scale::from_csv("escala", &scale_path, b',').unwrap();
        assert_eq!(scale.row_count(), 2);
        assert_eq!(scale.columns(), &strings(&["id", "x", "y"])[..]);
        assert_eq!(scale.numeric_column("y").unwrap(), vec![Some(10.0), None]);

        let dict_path = dir.path().join("traducciones.csv");
        let mut file = std::fs::File::create(&dict_path).unwrap();
        writeln!(file, "Nombre,Alias").unwrap();
        writeln!(file, "Variable X,x").unwrap();
        writeln!(file, "Variable Y,y").unwrap();

        let translations = Translations::from_csv(&dict_path, "nombre", "alias", b',').unwrap();
        assert_eq!(translations.len(), 2);
        assert_eq!(translations.get("x"), Some("Variable X"));

        let missing = Translations::from_csv(&dict_path, "descripcion", "alias", b',');
        assert!(missing.is_err());
    }
}
