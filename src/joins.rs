//! Join planning: requested relationship names to eager-load directives.

use crate::config::{ReflectedModel, RelationshipDef};

/// Instruction to the data-access layer to load one relationship with the primary fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct EagerLoad {
    pub relationship: RelationshipDef,
}

impl EagerLoad {
    pub fn name(&self) -> &str {
        &self.relationship.name
    }
}

/// Split a comma-separated `relationships` query value. Blank entries are dropped.
pub fn parse_relationship_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// One directive per known relationship name, in request order. Unknown and repeated names
/// are dropped without error.
pub fn plan_joins<S: AsRef<str>>(model: &ReflectedModel, names: &[S]) -> Vec<EagerLoad> {
    let mut out: Vec<EagerLoad> = Vec::new();
    for name in names {
        let name = name.as_ref();
        if out.iter().any(|l| l.name() == name) {
            continue;
        }
        match model.relationship(name) {
            Some(rel) => out.push(EagerLoad {
                relationship: rel.clone(),
            }),
            None => tracing::debug!(relationship = name, model = model.name(), "ignoring unknown relationship"),
        }
    }
    out
}

/// Stable text for the planned relationships, used in cache keys.
pub fn joins_qualifier(loads: &[EagerLoad]) -> Option<String> {
    if loads.is_empty() {
        None
    } else {
        Some(loads.iter().map(EagerLoad::name).collect::<Vec<_>>().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{reflect, ColumnDef, RelationshipDef, SemanticType, TableModel};

    fn owner() -> ReflectedModel {
        reflect(
            &TableModel::new("Owner")
                .column(ColumnDef::new("id", SemanticType::Integer).primary_key())
                .column(ColumnDef::new("team_id", SemanticType::Integer))
                .relationship(RelationshipDef::to_many("pets", "pets", "id", "owner_id"))
                .relationship(RelationshipDef::to_one("team", "teams", "team_id", "id")),
        )
        .unwrap()
    }

    #[test]
    fn unknown_names_are_silently_dropped() {
        let loads = plan_joins(&owner(), &["team", "bogus", "pets", "team"]);
        let names: Vec<_> = loads.iter().map(EagerLoad::name).collect();
        assert_eq!(names, vec!["team", "pets"]);
    }

    #[test]
    fn empty_request_plans_nothing() {
        assert!(plan_joins::<&str>(&owner(), &[]).is_empty());
        assert_eq!(joins_qualifier(&[]), None);
    }

    #[test]
    fn parses_comma_separated_list() {
        assert_eq!(parse_relationship_list(Some(" pets, ,team ")), vec!["pets", "team"]);
        assert!(parse_relationship_list(None).is_empty());
    }

    #[test]
    fn qualifier_follows_request_order() {
        let loads = plan_joins(&owner(), &["pets", "team"]);
        assert_eq!(joins_qualifier(&loads).as_deref(), Some("pets,team"));
    }
}
