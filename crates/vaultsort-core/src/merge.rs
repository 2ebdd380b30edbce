//! Recombine deterministic and model classifications

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{Classification, Record};

/// Order `classifications` by the input records
///
/// Every record must have exactly one classification and every
/// classification must belong to a record.
pub fn merge_classifications(
    records: &[Record],
    classifications: impl IntoIterator<Item = Classification>,
) -> Result<Vec<Classification>> {
    let mut by_id: HashMap<String, Classification> = HashMap::with_capacity(records.len());
    for classification in classifications {
        if let Some(previous) = by_id.insert(classification.item_id.clone(), classification) {
            return Err(Error::InternalConsistency(format!(
                "Item {} was classified twice",
                previous.item_id
            )));
        }
    }

    let merged = records
        .iter()
        .map(|record| {
            by_id.remove(&record.id).ok_or_else(|| {
                Error::InternalConsistency(format!("Item {} has no classification", record.id))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(stray) = by_id.keys().next() {
        return Err(Error::InternalConsistency(format!(
            "Classification for unknown item {}",
            stray
        )));
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ItemType};

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            name: id.to_string(),
            item_type: ItemType::Login,
            folder_name: String::new(),
            username: String::new(),
            domain: String::new(),
            notes: String::new(),
            fields: Vec::new(),
            favorite: false,
            reprompt: 0,
            login_uris: Vec::new(),
            password: String::new(),
            totp: String::new(),
        }
    }

    #[test]
    fn test_merge_restores_input_order() {
        let records = vec![record("a"), record("b"), record("c")];
        let deterministic = vec![Classification::deterministic(
            "b",
            Category::Folder("Google".into()),
            "Mapped domain",
        )];
        let model = vec![
            Classification::fallback("c", "no response"),
            Classification::fallback("a", "no response"),
        ];

        let merged = merge_classifications(&records, deterministic.into_iter().chain(model)).unwrap();
        let ids: Vec<_> = merged.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged[1].category.label(), "Google");
    }

    #[test]
    fn test_missing_classification_is_error() {
        let records = vec![record("a"), record("b")];
        let err = merge_classifications(&records, vec![Classification::fallback("a", "x")]).unwrap_err();
        assert!(matches!(err, Error::InternalConsistency(_)));
    }

    #[test]
    fn test_double_classification_is_error() {
        let records = vec![record("a")];
        let err = merge_classifications(
            &records,
            vec![
                Classification::fallback("a", "x"),
                Classification::fallback("a", "y"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InternalConsistency(_)));
    }

    #[test]
    fn test_unknown_item_is_error() {
        let records = vec![record("a")];
        let err = merge_classifications(
            &records,
            vec![
                Classification::fallback("a", "x"),
                Classification::fallback("ghost", "y"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InternalConsistency(_)));
    }
}
