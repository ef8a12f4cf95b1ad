use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

// Matches `0: 'person'` / `"1": "bicycle"` pairs in a python-style dict literal.
static NAME_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"]?(\d+)['"]?\s*:\s*(?:'([^']*)'|"([^"]*)")"#).expect("valid regex")
});

/// Class id → name table shipped with a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames(BTreeMap<usize, String>);

impl ClassNames {
    /// Parse the `names` metadata written by ultralytics exporters,
    /// e.g. `{0: 'Oxygen_Tank', 1: 'Nitrogen_Tank'}`.
    ///
    /// Returns `None` when no entry can be recovered.
    pub fn parse(raw: &str) -> Option<Self> {
        let table: BTreeMap<usize, String> = NAME_ENTRY
            .captures_iter(raw)
            .filter_map(|caps| {
                let id = caps.get(1)?.as_str().parse().ok()?;
                let name = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
                Some((id, name))
            })
            .collect();

        if table.is_empty() {
            None
        } else {
            Some(Self(table))
        }
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.0.get(&class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(usize, S)> for ClassNames {
    fn from_iter<I: IntoIterator<Item = (usize, S)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(id, name)| (id, name.into())).collect())
    }
}
