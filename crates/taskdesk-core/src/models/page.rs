use serde::{Deserialize, Serialize};

/// Paginated list envelope: `{count, next, previous, results}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// "Showing 10 of 42"
    pub fn summary(&self) -> String {
        format!("Showing {} of {}", self.results.len(), self.count)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let page: Page<u32> = serde_json::from_str(
            r#"{"count": 3, "next": "https://api/x/?page=2", "previous": null, "results": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(page.results, vec![1, 2]);
        assert!(page.has_next());
        assert_eq!(page.summary(), "Showing 2 of 3");
    }

    #[test]
    fn test_missing_fields_default() {
        let page: Page<u32> = serde_json::from_str("{}").unwrap();
        assert_eq!(page, Page::default());
        assert!(!page.has_next());
    }
}
