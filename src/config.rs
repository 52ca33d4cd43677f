use std::fs;
use std::path::{Path, PathBuf};

use crate::questions::Catalog;
use crate::types::GameRules;

/// Resolves a path relative to the config directory.
fn config_path(sub: &str) -> PathBuf {
    let base = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| "config".to_string());
    Path::new(&base).join(sub)
}

/// Initialize config directory with defaults if missing.
pub fn init() {
    let base = config_path("");
    if !base.exists() {
        fs::create_dir_all(&base).expect("Failed to create config directory");
    }

    let rules_path = config_path("rules.json");
    if !rules_path.exists() {
        let defaults = GameRules::default();
        fs::write(&rules_path, serde_json::to_string_pretty(&defaults).unwrap())
            .expect("Failed to write default rules.json");
    }

    let catalog_path = config_path("catalog.json");
    if !catalog_path.exists() {
        fs::write(
            &catalog_path,
            serde_json::to_string_pretty(&default_catalog()).unwrap(),
        )
        .expect("Failed to write default catalog.json");
    }
}

/// Load the game rules, falling back to defaults on a missing file.
pub fn load_rules() -> GameRules {
    let path = config_path("rules.json");
    let data = match fs::read_to_string(&path) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("Failed to read rules.json ({}), using defaults", e);
            return GameRules::default();
        }
    };
    serde_json::from_str(&data).expect("Failed to parse rules.json")
}

/// Load the question catalog.
pub fn load_catalog() -> Catalog {
    let path = config_path("catalog.json");
    let data = match fs::read_to_string(&path) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("Failed to read catalog.json ({}), using built-in catalog", e);
            return default_catalog();
        }
    };
    serde_json::from_str(&data).expect("Failed to parse catalog.json")
}

/// The built-in catalog written on first start. Entries are
/// `{subject, answer}` pairs grouped by category and question kind.
fn default_catalog() -> Catalog {
    serde_json::from_value(serde_json::json!({
        "geography": {
            "officialLanguage": [
                { "subject": "Brazil", "answer": "Portuguese" },
                { "subject": "Egypt", "answer": "Arabic" },
                { "subject": "Finland", "answer": "Finnish" },
                { "subject": "Mexico", "answer": "Spanish" },
                { "subject": "Austria", "answer": "German" },
                { "subject": "Kenya", "answer": "Swahili" }
            ],
            "capital": [
                { "subject": "Canada", "answer": "Ottawa" },
                { "subject": "Australia", "answer": "Canberra" },
                { "subject": "Norway", "answer": "Oslo" },
                { "subject": "Japan", "answer": "Tokyo" },
                { "subject": "Morocco", "answer": "Rabat" },
                { "subject": "Chile", "answer": "Santiago" }
            ]
        },
        "sport": {
            "nhlPoints": [
                { "subject": "Wayne Gretzky", "answer": "2857" },
                { "subject": "Jaromir Jagr", "answer": "1921" },
                { "subject": "Mark Messier", "answer": "1887" },
                { "subject": "Gordie Howe", "answer": "1850" },
                { "subject": "Ron Francis", "answer": "1798" },
                { "subject": "Marcel Dionne", "answer": "1771" }
            ]
        },
        "history": {
            "warYear": [
                { "subject": "the Hundred Years' War", "answer": "1337" },
                { "subject": "the Thirty Years' War", "answer": "1618" },
                { "subject": "the American Civil War", "answer": "1861" },
                { "subject": "the First World War", "answer": "1914" },
                { "subject": "the Second World War", "answer": "1939" },
                { "subject": "the Korean War", "answer": "1950" }
            ]
        }
    }))
    .expect("built-in catalog is valid")
}
