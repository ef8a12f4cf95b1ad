use crate::names::ClassNames;

/// Fixed taxonomy of the fine-tuned safety-equipment model; index is the class id.
pub const CLASS_NAMES: [&str; 7] = [
    "Oxygen_Tank",
    "Nitrogen_Tank",
    "First_Aid_Box",
    "Fire_Alarm",
    "Safety_Switch_Panel",
    "Emergency_Phone",
    "Fire_Extinguisher",
];

/// Read-only class lookup, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
    names: Vec<String>,
}

impl ClassTable {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve a class id to a display name.
    ///
    /// Order: the model's own table, then this table, then `Unknown_<id>`.
    pub fn resolve(&self, class_id: usize, model_names: Option<&ClassNames>) -> String {
        if let Some(name) = model_names.and_then(|names| names.get(class_id)) {
            return name.to_string();
        }

        match self.names.get(class_id) {
            Some(name) => name.clone(),
            None => format!("Unknown_{class_id}"),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new(CLASS_NAMES)
    }
}
