// ➗ Normalizer - the series a variable is categorized on
// Either the raw variable or its ratio to a base variable. Zero base values
// are read as missing so the ratio is missing rather than infinite. The
// scale itself is never modified.

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::Result;
use crate::registry::VariableRegistry;

/// Values of `variable` in `scale`, divided by `base_variable` when given
pub fn normalize(
    registry: &VariableRegistry,
    scale: &str,
    variable: &str,
    base_variable: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Option<f64>>> {
    let data = registry.scale(scale)?;

    // Resolve names before reading any data
    data.require_column(variable)?;
    registry.ensure_not_excluded(variable)?;
    if let Some(base) = base_variable {
        data.require_column(base)?;
        registry.ensure_not_excluded(base)?;
    }

    let values = data.numeric_column(variable)?;
    let Some(base) = base_variable else {
        return Ok(values);
    };

    let mut denominators = data.numeric_column(base)?;
    let zeros = denominators.iter().filter(|v| **v == Some(0.0)).count();
    if zeros > 0 {
        diagnostics.push(WarningKind::ZeroBaseValues {
            scale: scale.to_string(),
            base_variable: base.to_string(),
            count: zeros,
        });
        for d in denominators.iter_mut().filter(|v| **v == Some(0.0)) {
            *d = None;
        }
    }

    Ok(values
        .into_iter()
        .zip(denominators)
        .map(|(v, d)| match (v, d) {
            (Some(v), Some(d)) => Some(v / d),
            _ => None,
        })
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Scale, Translations};
    use crate::error::CategorizeError;
    use crate::registry::RegistrySettings;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn registry(diagnostics: &mut Diagnostics) -> VariableRegistry {
        let scale = Scale::from_columns(
            "hogares",
            vec![
                ("id", strings(&["a", "b", "c", "d"])),
                ("x", strings(&["2", "6", "", "5"])),
                ("pop", strings(&["4", "0", "10", "10"])),
                ("folio", strings(&["1", "2", "3", "4"])),
            ],
        )
        .unwrap();
        let translations: Translations =
            vec![("x", "Equis"), ("pop", "Población")].into_iter().collect();

        VariableRegistry::new(
            vec![scale],
            translations,
            RegistrySettings {
                identifier_columns: strings(&["id"]),
                excluded_variables: strings(&["folio"]),
                ..Default::default()
            },
            diagnostics,
        )
        .unwrap()
    }

    #[test]
    fn test_without_base_returns_raw_series() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);

        let values = normalize(&registry, "hogares", "x", None, &mut diagnostics).unwrap();
        assert_eq!(values, vec![Some(2.0), Some(6.0), None, Some(5.0)]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_zero_base_yields_missing_ratio() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);

        let values = normalize(&registry, "hogares", "x", Some("pop"), &mut diagnostics).unwrap();
        assert_eq!(values, vec![Some(0.5), None, None, Some(0.5)]);
        assert!(values.iter().flatten().all(|v| v.is_finite()));

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics.warnings()[0].kind,
            WarningKind::ZeroBaseValues {
                scale: "hogares".to_string(),
                base_variable: "pop".to_string(),
                count: 1,
            }
        );

        // The scale keeps its zero, the next call sees it again
        let raw = normalize(&registry, "hogares", "pop", None, &mut diagnostics).unwrap();
        assert_eq!(raw[1], Some(0.0));
    }

    #[test]
    fn test_rejects_unknown_and_excluded() {
        let mut diagnostics = Diagnostics::new();
        let registry = registry(&mut diagnostics);

        assert!(matches!(
            normalize(&registry, "personas", "x", None, &mut diagnostics),
            Err(CategorizeError::UnknownScale(_))
        ));
        assert!(matches!(
            normalize(&registry, "hogares", "y", None, &mut diagnostics),
            Err(CategorizeError::UnknownVariable { .. })
        ));
        assert!(matches!(
            normalize(&registry, "hogares", "folio", None, &mut diagnostics),
            Err(CategorizeError::ExcludedVariable(_))
        ));
        assert!(matches!(
            normalize(&registry, "hogares", "x", Some("folio"), &mut diagnostics),
            Err(CategorizeError::ExcludedVariable(_))
        ));
    }
}
