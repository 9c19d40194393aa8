//! Property-based tests for model types.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{Identity, PermissionName, ResourceType, Role, RoleSet, Scope};

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    fn role_set_strategy() -> impl Strategy<Value = Vec<Role>> {
        prop::collection::vec(role_strategy(), 1..4)
    }

    proptest! {
        #[test]
        fn test_effective_role_is_maximum_of_set(roles in role_set_strategy()) {
            let set: RoleSet = roles.iter().copied().collect();
            let expected = roles.iter().copied().max();
            prop_assert_eq!(set.effective(), expected);
        }

        #[test]
        fn test_role_name_roundtrip(role in role_strategy()) {
            let parsed: Role = role.as_str().parse().unwrap();
            prop_assert_eq!(parsed, role);
        }

        #[test]
        fn test_unknown_scope_tokens_are_rejected(token in "[a-z]{1,12}") {
            let known = ["my", "user", "team", "brokerage", "all"];
            let parsed = Scope::from_token(&token);
            prop_assert_eq!(parsed.is_some(), known.contains(&token.as_str()));
        }

        #[test]
        fn test_non_empty_user_id_builds_identity(
            user_id in "[a-z0-9-]{1,36}",
            role in role_strategy()
        ) {
            let identity = Identity::new(user_id.clone(), role);
            prop_assert!(identity.is_ok());
            let identity = identity.unwrap();
            prop_assert_eq!(identity.user_id(), user_id.as_str());
            prop_assert_eq!(identity.role(), Some(role));
        }

        #[test]
        fn test_resource_type_name_roundtrip(
            t in prop::sample::select(ResourceType::ALL.to_vec())
        ) {
            let parsed: ResourceType = t.as_str().parse().unwrap();
            prop_assert_eq!(parsed, t);
        }

        #[test]
        fn test_permission_name_roundtrip(
            p in prop::sample::select(PermissionName::ALL.to_vec())
        ) {
            let parsed: PermissionName = p.as_str().parse().unwrap();
            prop_assert_eq!(parsed, p);
        }
    }
}
