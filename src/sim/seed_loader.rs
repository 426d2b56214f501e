//! JSON content loading.
//!
//! Quest trees and achievement lists can live in data files instead of the
//! built-in [`seeds`](crate::sim::seeds) so authors can change content without
//! a rebuild. Files are parsed and validated as a whole; one bad record rejects
//! the file.

use std::fs;
use std::io;
use std::path::Path;

use log::info;
use serde::de::DeserializeOwned;

use crate::sim::achievement::Achievement;
use crate::sim::errors::SimError;
use crate::sim::quest::QuestDefinition;
use crate::validation::{validate_achievements, validate_quest};

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, SimError> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| {
        SimError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse {}: {}", path.display(), e),
        ))
    })
}

/// Load quest definitions from a JSON array file.
pub fn load_quests_from_json<P: AsRef<Path>>(path: P) -> Result<Vec<QuestDefinition>, SimError> {
    let path = path.as_ref();
    let quests: Vec<QuestDefinition> = load_json(path)?;
    for quest in &quests {
        validate_quest(quest)?;
    }
    info!("loaded {} quests from {}", quests.len(), path.display());
    Ok(quests)
}

/// Load achievement definitions from a JSON array file.
pub fn load_achievements_from_json<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<Achievement>, SimError> {
    let path = path.as_ref();
    let achievements: Vec<Achievement> = load_json(path)?;
    validate_achievements(&achievements)?;
    info!(
        "loaded {} achievements from {}",
        achievements.len(),
        path.display()
    );
    Ok(achievements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::quest::ObjectiveKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_bundled_seed_files() {
        let quests = load_quests_from_json("data/seeds/quests.json").unwrap();
        assert!(quests.iter().any(|q| q.id == "crown_envoy"));
        let achievements = load_achievements_from_json("data/seeds/achievements.json").unwrap();
        assert!(achievements.iter().any(|a| a.hidden));
    }

    #[test]
    fn parses_minimal_quest() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"q","title":"Errand","stages":[{{"id":"s","objective":"wait","quantity":2}}]}}]"#
        )
        .unwrap();
        let quests = load_quests_from_json(file.path()).unwrap();
        assert_eq!(quests[0].stages[0].objective, ObjectiveKind::Wait);
        assert_eq!(quests[0].stages[0].required(), 2);
    }

    #[test]
    fn malformed_file_names_the_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[{{\"id\": ").unwrap();
        let err = load_quests_from_json(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn invalid_tree_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id":"q","title":"Empty","stages":[]}}]"#).unwrap();
        assert!(matches!(
            load_quests_from_json(file.path()),
            Err(SimError::InvalidContent(_))
        ));
    }
}
