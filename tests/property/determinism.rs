//! Property-based tests for catalog merge, override resolution and the
//! command palette

use factory_sync::catalog::{merge, merge_tagged, CatalogRecord, EntitySource};
use factory_sync::overrides::{resolve, GlobalRuntime, RuntimeOverride};
use factory_sync::palette::{build_index, filter, CommandPalette};
use factory_sync::types::{Project, ProjectStatus, SkillInfo};
use proptest::prelude::*;
use std::collections::HashSet;

fn skill(id: String, name: String) -> SkillInfo {
    SkillInfo {
        id,
        name,
        category: "general".to_string(),
        description: String::new(),
        content_preview: String::new(),
        tags: vec![],
    }
}

/// Small id space so collisions are common
fn skills() -> impl Strategy<Value = Vec<SkillInfo>> {
    prop::collection::vec(("[a-e]", "[A-Z][a-z]{0,6}"), 0..8)
        .prop_map(|pairs| pairs.into_iter().map(|(id, name)| skill(id, name)).collect())
}

fn optional_field() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        Just(Some("  ".to_string())),
        "[a-z]{1,8}".prop_map(Some),
    ]
}

fn project(id: String, name: String) -> Project {
    Project {
        id,
        name,
        seed_prompt: String::new(),
        output_dir: String::new(),
        created_at: String::new(),
        last_active_at: String::new(),
        status: ProjectStatus::Stopped,
        agent_count: 0,
        cycle_count: 0,
    }
}

proptest! {
    #[test]
    fn merge_is_deterministic(base in skills(), custom in skills()) {
        prop_assert_eq!(merge(&base, &custom), merge(&base, &custom));
    }

    #[test]
    fn merge_ids_are_unique(base in skills(), custom in skills()) {
        let merged = merge(&base, &custom);
        let mut seen = HashSet::new();
        for item in &merged {
            prop_assert!(seen.insert(item.id().to_string()), "duplicate id {}", item.id());
        }
    }

    #[test]
    fn merge_keeps_base_first_and_drops_colliding_custom(base in skills(), custom in skills()) {
        let tagged = merge_tagged(&base, &custom);
        let base_ids: HashSet<&str> = base.iter().map(|s| s.id.as_str()).collect();

        let first_custom = tagged
            .iter()
            .position(|e| e.source == EntitySource::Custom)
            .unwrap_or(tagged.len());
        prop_assert!(tagged[..first_custom].iter().all(|e| e.source == EntitySource::Base));
        prop_assert!(tagged[first_custom..].iter().all(|e| e.source == EntitySource::Custom));
        prop_assert_eq!(first_custom, base_ids.len());

        for entry in &tagged[first_custom..] {
            prop_assert!(!base_ids.contains(entry.item.id.as_str()));
        }
        prop_assert!(tagged.iter().all(|e| e.enabled));
    }

    #[test]
    fn resolve_is_pure_and_prefers_set_fields(
        engine in optional_field(),
        model in optional_field(),
        global_engine in "[a-z]{1,8}",
        global_model in "[a-z]{1,8}",
    ) {
        let global = GlobalRuntime::new(global_engine.clone(), global_model.clone());
        let override_ = RuntimeOverride { engine: engine.clone(), model: model.clone(), provider_id: None };
        let first = resolve(&global, &override_);
        prop_assert_eq!(&first, &resolve(&global, &override_));

        let expected_engine = engine.filter(|e| !e.trim().is_empty()).unwrap_or(global_engine);
        let expected_model = model.filter(|m| !m.trim().is_empty()).unwrap_or(global_model);
        prop_assert_eq!(first.engine, expected_engine);
        prop_assert_eq!(first.model, expected_model);
    }

    #[test]
    fn filter_matches_are_ordered_substrings(
        names in prop::collection::vec("[A-Za-z ]{1,12}", 0..10),
        query in "[a-zA-Z]{0,3}",
    ) {
        let projects: Vec<Project> = names
            .iter()
            .enumerate()
            .map(|(i, name)| project(format!("p{}", i), name.clone()))
            .collect();
        let items = build_index(&projects);
        let matches = filter(&items, &query);

        let needle = query.to_lowercase();
        prop_assert!(matches.iter().all(|item| item.label.to_lowercase().contains(&needle)));
        let expected: Vec<&str> = items
            .iter()
            .filter(|item| item.label.to_lowercase().contains(&needle))
            .map(|item| item.id.as_str())
            .collect();
        let actual: Vec<&str> = matches.iter().map(|item| item.id.as_str()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn palette_selection_stays_in_range(
        moves in prop::collection::vec(any::<bool>(), 0..40),
        query in "[a-z]{0,2}",
    ) {
        let mut palette = CommandPalette::new(build_index(&[]));
        palette.open();
        palette.set_query(query);
        for down in moves {
            if down {
                palette.move_down();
            } else {
                palette.move_up();
            }
            let visible = palette.visible().len();
            if visible == 0 {
                prop_assert_eq!(palette.selected(), 0);
            } else {
                prop_assert!(palette.selected() < visible);
            }
        }
    }
}
