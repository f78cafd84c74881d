use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Bundle, ContentItem, UsageCategory};

const SEED_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("item with an empty id in {0}")]
    EmptyItemId(String),

    #[error("duplicate item id: {0}")]
    DuplicateItem(String),

    #[error("duplicate bundle id: {0}")]
    DuplicateBundle(String),
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    bundles: Vec<Bundle>,
    #[serde(default)]
    items: Vec<ContentItem>,
}

/// Static drill content. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    bundles: Vec<Bundle>,
    standalone: Vec<ContentItem>,
    // item id -> index into `bundles`
    bundle_index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(bundles: Vec<Bundle>, standalone: Vec<ContentItem>) -> Result<Self, CatalogError> {
        let mut bundle_index = HashMap::new();
        {
            let mut bundle_ids = HashSet::new();
            let mut item_ids = HashSet::new();

            for (idx, bundle) in bundles.iter().enumerate() {
                if !bundle_ids.insert(bundle.id.as_str()) {
                    return Err(CatalogError::DuplicateBundle(bundle.id.clone()));
                }
                for item in &bundle.items {
                    check_item(item, &bundle.id, &mut item_ids)?;
                    bundle_index.insert(item.id.clone(), idx);
                }
            }
            for item in &standalone {
                check_item(item, "standalone items", &mut item_ids)?;
            }
        }

        Ok(Self {
            bundles,
            standalone,
            bundle_index,
        })
    }

    /// Parses `{ "bundles": [...], "items": [...] }`. Unknown category or
    /// drill type tags are rejected here.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.bundles, file.items)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn seed() -> Result<Self, CatalogError> {
        Self::from_json(SEED_CATALOG)
    }

    /// Bundle items in bundle order, then standalone items.
    pub fn items(&self) -> impl Iterator<Item = &ContentItem> + '_ {
        self.bundles
            .iter()
            .flat_map(|b| b.items.iter())
            .chain(self.standalone.iter())
    }

    pub fn items_in(&self, category: UsageCategory) -> impl Iterator<Item = &ContentItem> + '_ {
        self.items().filter(move |item| item.category == category)
    }

    pub fn bundle(&self, bundle_id: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|b| b.id == bundle_id)
    }

    /// The bundle an item belongs to, `None` for standalone items.
    pub fn bundle_of(&self, item_id: &str) -> Option<&Bundle> {
        self.bundle_index.get(item_id).map(|&idx| &self.bundles[idx])
    }

    pub fn len(&self) -> usize {
        self.items().count()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.iter().all(|b| b.items.is_empty()) && self.standalone.is_empty()
    }
}

fn check_item<'a>(
    item: &'a ContentItem,
    location: &str,
    seen: &mut HashSet<&'a str>,
) -> Result<(), CatalogError> {
    if item.id.trim().is_empty() {
        return Err(CatalogError::EmptyItemId(location.to_string()));
    }
    if !seen.insert(item.id.as_str()) {
        return Err(CatalogError::DuplicateItem(item.id.clone()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Answer, DrillType};

    pub(crate) fn item(id: &str, category: UsageCategory) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            item_type: DrillType::CollocationMcq,
            category,
            prompt: format!("prompt for {}", id),
            choices: Some(vec!["a".to_string(), "b".to_string()]),
            tokens: None,
            answer: Answer::Single("a".to_string()),
            explanation: String::new(),
        }
    }

    /// `per_category` standalone items for each of the five categories.
    pub(crate) fn flat_catalog(per_category: usize) -> Catalog {
        let items = UsageCategory::ALL
            .into_iter()
            .flat_map(|c| (0..per_category).map(move |i| item(&format!("{}-{}", c, i), c)))
            .collect();
        Catalog::new(Vec::new(), items).unwrap()
    }

    #[test]
    fn test_seed_catalog_loads() {
        let catalog = Catalog::seed().unwrap();
        assert!(!catalog.is_empty());
        for category in UsageCategory::ALL {
            assert!(catalog.items_in(category).count() >= 4, "{} is thin", category);
        }
    }

    #[test]
    fn test_bundle_membership() {
        let catalog = Catalog::seed().unwrap();
        assert_eq!(catalog.bundle_of("b1-coll-1").map(|b| b.id.as_str()), Some("bundle-make-decision"));
        assert!(catalog.bundle_of("u-coll-1").is_none());
        assert!(catalog.bundle_of("missing").is_none());
    }

    #[test]
    fn test_items_iterate_bundles_then_standalone() {
        let bundle = Bundle {
            id: "b".to_string(),
            headword: String::new(),
            tags: Vec::new(),
            items: vec![item("b-1", UsageCategory::Register)],
        };
        let catalog = Catalog::new(vec![bundle], vec![item("s-1", UsageCategory::Register)]).unwrap();
        let ids: Vec<_> = catalog.items().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b-1", "s-1"]);
    }

    #[test]
    fn test_rejects_unknown_category_tag() {
        let json = r#"{"items":[{"id":"x","type":"collocation_mcq","category":"spelling",
            "prompt":"p","answer":"a","explanation":""}]}"#;
        assert!(matches!(Catalog::from_json(json), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_rejects_unknown_item_type() {
        let json = r#"{"items":[{"id":"x","type":"essay","category":"register",
            "prompt":"p","answer":"a","explanation":""}]}"#;
        assert!(matches!(Catalog::from_json(json), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = Catalog::new(
            Vec::new(),
            vec![item("x", UsageCategory::Register), item("x", UsageCategory::Collocations)],
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateItem(id) if id == "x"));

        let bundle = Bundle {
            id: "b".to_string(),
            headword: String::new(),
            tags: Vec::new(),
            items: Vec::new(),
        };
        let err = Catalog::new(vec![bundle.clone(), bundle], Vec::new()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateBundle(_)));
    }

    #[test]
    fn test_rejects_empty_id() {
        let err = Catalog::new(Vec::new(), vec![item(" ", UsageCategory::Register)]).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyItemId(_)));
    }

    #[test]
    fn test_empty_json_is_empty_catalog() {
        let catalog = Catalog::from_json("{}").unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
    }
}
