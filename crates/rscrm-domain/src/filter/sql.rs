//! PostgreSQL rendering of ownership predicates.
//!
//! Text values always become numbered placeholders (`$n`); booleans are
//! rendered inline. Brokerage and linked-lead fields become subqueries on the
//! `users` and `leads` tables.

use crate::error::{DomainError, DomainResult};

use super::{FlagField, Predicate, TextField};

/// Where and how to render a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlOptions {
    /// Alias of the resource table in the surrounding query, if any.
    pub table_alias: Option<String>,
    /// Number of the first placeholder to emit.
    pub start_index: usize,
}

impl Default for SqlOptions {
    fn default() -> Self {
        Self {
            table_alias: None,
            start_index: 1,
        }
    }
}

impl SqlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.table_alias = Some(alias.into());
        self
    }

    pub fn starting_at(mut self, index: usize) -> Self {
        self.start_index = index;
        self
    }
}

/// A rendered `WHERE` fragment and its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFilter {
    pub where_clause: String,
    pub params: Vec<String>,
    /// First placeholder number not used by this fragment.
    pub next_param_index: usize,
}

/// Renders a predicate as a PostgreSQL `WHERE` fragment.
///
/// Fails when the alias is not a plain identifier or the start index is zero.
pub fn render_postgres(predicate: &Predicate, options: &SqlOptions) -> DomainResult<SqlFilter> {
    if options.start_index == 0 {
        return Err(DomainError::InvalidFilter {
            message: "placeholder numbering starts at 1".to_string(),
        });
    }
    let prefix = match options.table_alias.as_deref() {
        Some(alias) if is_identifier(alias) => format!("{alias}."),
        Some(alias) => {
            return Err(DomainError::InvalidFilter {
                message: format!("invalid table alias '{alias}'"),
            });
        }
        None => String::new(),
    };

    let mut renderer = Renderer {
        prefix,
        params: Vec::new(),
        next_index: options.start_index,
    };
    let where_clause = renderer.render(predicate, false);
    Ok(SqlFilter {
        where_clause,
        params: renderer.params,
        next_param_index: renderer.next_index,
    })
}

fn is_identifier(alias: &str) -> bool {
    let mut chars = alias.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct Renderer {
    prefix: String,
    params: Vec<String>,
    next_index: usize,
}

impl Renderer {
    fn bind(&mut self, value: &str) -> String {
        self.params.push(value.to_string());
        let placeholder = format!("${}", self.next_index);
        self.next_index += 1;
        placeholder
    }

    fn render(&mut self, predicate: &Predicate, nested: bool) -> String {
        match predicate {
            Predicate::True => "1=1".to_string(),
            Predicate::False => "1=0".to_string(),
            Predicate::TextEq(field, value) => self.render_text(*field, value),
            Predicate::FlagEq(field, value) => self.render_flag(*field, *value),
            Predicate::And(parts) if parts.is_empty() => "1=1".to_string(),
            Predicate::Or(parts) if parts.is_empty() => "1=0".to_string(),
            Predicate::And(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| self.render(p, true)).collect();
                let joined = rendered.join(" AND ");
                if nested {
                    format!("({joined})")
                } else {
                    joined
                }
            }
            Predicate::Or(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| self.render(p, true)).collect();
                format!("({})", rendered.join(" OR "))
            }
        }
    }

    fn render_text(&mut self, field: TextField, value: &str) -> String {
        let prefix = self.prefix.clone();
        let placeholder = self.bind(value);
        match field {
            TextField::OwnerId => format!("{prefix}owner_id = {placeholder}"),
            TextField::TeamId => format!("{prefix}team_id = {placeholder}"),
            TextField::OwnerBrokerId => format!(
                "{prefix}owner_id IN (SELECT id FROM users WHERE broker_id = {placeholder})"
            ),
            TextField::LinkedLeadOwnerId => format!(
                "{prefix}lead_id IN (SELECT id FROM leads WHERE owner_id = {placeholder})"
            ),
        }
    }

    fn render_flag(&self, field: FlagField, value: bool) -> String {
        let prefix = &self.prefix;
        match (field, value) {
            (FlagField::IsPrivate, true) => format!("{prefix}is_private = TRUE"),
            (FlagField::IsPrivate, false) => format!("{prefix}is_private = FALSE"),
            (FlagField::LinkedLeadIsPrivate, true) => {
                format!("{prefix}lead_id IN (SELECT id FROM leads WHERE is_private = TRUE)")
            }
            (FlagField::LinkedLeadIsPrivate, false) => format!(
                "({prefix}lead_id IS NULL OR {prefix}lead_id NOT IN \
                 (SELECT id FROM leads WHERE is_private = TRUE))"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::build_ownership_filter;
    use crate::model::{Identity, ResourceType, Role, Scope};
    use crate::scope::EffectiveScope;

    fn agent() -> Identity {
        Identity::new("u1", Role::Agent).unwrap().with_team("t1")
    }

    #[test]
    fn test_user_scope_with_alias() {
        let predicate = build_ownership_filter(
            &agent(),
            ResourceType::Escrow,
            &EffectiveScope::new(Scope::User, false, agent().user_id()),
        )
        .unwrap();
        let filter = render_postgres(&predicate, &SqlOptions::new().with_alias("e")).unwrap();

        assert_eq!(filter.where_clause, "e.owner_id = $1");
        assert_eq!(filter.params, vec!["u1".to_string()]);
        assert_eq!(filter.next_param_index, 2);
    }

    #[test]
    fn test_team_lead_filter() {
        let predicate = build_ownership_filter(
            &agent(),
            ResourceType::Lead,
            &EffectiveScope::new(Scope::Team, false, agent().user_id()),
        )
        .unwrap();
        let filter = render_postgres(&predicate, &SqlOptions::new()).unwrap();

        assert_eq!(
            filter.where_clause,
            "team_id = $1 AND (is_private = FALSE OR owner_id = $2)"
        );
        assert_eq!(filter.params, vec!["t1".to_string(), "u1".to_string()]);
        assert_eq!(filter.next_param_index, 3);
    }

    #[test]
    fn test_team_appointment_filter() {
        let predicate = build_ownership_filter(
            &agent(),
            ResourceType::Appointment,
            &EffectiveScope::new(Scope::Team, false, agent().user_id()),
        )
        .unwrap();
        let filter = render_postgres(&predicate, &SqlOptions::new()).unwrap();

        assert_eq!(
            filter.where_clause,
            "team_id = $1 AND ((lead_id IS NULL OR lead_id NOT IN \
             (SELECT id FROM leads WHERE is_private = TRUE)) OR \
             lead_id IN (SELECT id FROM leads WHERE owner_id = $2))"
        );
        assert_eq!(filter.params, vec!["t1".to_string(), "u1".to_string()]);
    }

    #[test]
    fn test_brokerage_appointment_filter_continues_numbering() {
        let identity = Identity::new("bu", Role::Broker).unwrap().with_broker("b1");
        let predicate = build_ownership_filter(
            &identity,
            ResourceType::Appointment,
            &EffectiveScope::new(Scope::Brokerage, false, identity.user_id()),
        )
        .unwrap();
        let filter = render_postgres(
            &predicate,
            &SqlOptions::new().with_alias("a").starting_at(3),
        )
        .unwrap();

        assert_eq!(
            filter.where_clause,
            "a.owner_id IN (SELECT id FROM users WHERE broker_id = $3) AND \
             (a.lead_id IS NULL OR a.lead_id NOT IN (SELECT id FROM leads WHERE is_private = TRUE))"
        );
        assert_eq!(filter.params, vec!["b1".to_string()]);
        assert_eq!(filter.next_param_index, 4);
    }

    #[test]
    fn test_constants_render_as_tautologies() {
        let all = render_postgres(&Predicate::True, &SqlOptions::new().starting_at(5)).unwrap();
        assert_eq!(all.where_clause, "1=1");
        assert!(all.params.is_empty());
        assert_eq!(all.next_param_index, 5);

        let none = render_postgres(&Predicate::False, &SqlOptions::new()).unwrap();
        assert_eq!(none.where_clause, "1=0");
    }

    #[test]
    fn test_values_are_never_inlined() {
        let predicate = Predicate::text_eq(TextField::OwnerId, "x' OR '1'='1");
        let filter = render_postgres(&predicate, &SqlOptions::new()).unwrap();
        assert_eq!(filter.where_clause, "owner_id = $1");
        assert_eq!(filter.params, vec!["x' OR '1'='1".to_string()]);
    }

    #[test]
    fn test_rejects_bad_options() {
        let predicate = Predicate::True;
        assert!(render_postgres(&predicate, &SqlOptions::new().with_alias("e; DROP")).is_err());
        assert!(render_postgres(&predicate, &SqlOptions::new().with_alias("1e")).is_err());
        assert!(render_postgres(&predicate, &SqlOptions::new().starting_at(0)).is_err());
        assert!(render_postgres(&predicate, &SqlOptions::new().with_alias("lead_2")).is_ok());
    }
}
