//! Catalog of selectable chat models.
//!
//! Model ids are opaque to the client; the catalog only supplies labels for
//! display and the default choice for new sessions.

/// A selectable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

pub const MODELS: &[ModelOption] = &[
    ModelOption {
        id: "llama3-8b-8192",
        label: "Llama 3 8B",
        description: "Fast & efficient",
    },
    ModelOption {
        id: "llama-3.1-70b-versatile",
        label: "Llama 3.1 70B",
        description: "Powerful reasoning",
    },
    ModelOption {
        id: "mixtral-8x7b-32768",
        label: "Mixtral 8×7B",
        description: "Great for coding",
    },
    ModelOption {
        id: "gemma2-9b-it",
        label: "Gemma 2 9B",
        description: "Google open-source",
    },
];

/// Model used for new sessions when nothing else is configured.
pub const DEFAULT_MODEL: &str = MODELS[0].id;

impl ModelOption {
    /// Looks up a catalog entry by exact id.
    pub fn find_by_id(id: &str) -> Option<&'static ModelOption> {
        MODELS.iter().find(|m| m.id == id)
    }
}

/// Display label for a model id; unknown ids are shown as-is.
pub fn label_for(id: &str) -> &str {
    ModelOption::find_by_id(id).map_or(id, |m| m.label)
}
