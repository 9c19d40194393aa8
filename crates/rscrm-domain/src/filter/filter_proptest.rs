//! Property-based tests tying list filters to single-record access.
//!
//! Every row a role-derived team or brokerage filter lets through must also
//! pass the ownership oracle for the same identity. The world is kept
//! consistent with the storage model: each team belongs to one brokerage, so
//! a row's team fixes its owner's brokerage.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::filter::{build_ownership_filter, ResourceRow};
    use crate::model::{Identity, ResourceOwnership, ResourceType, Role, Scope};
    use crate::oracle::tests::mocks::create_oracle;
    use crate::scope::EffectiveScope;

    const TEAMS: [(&str, &str); 2] = [("t1", "b1"), ("t2", "b2")];
    const BROKERAGES: [&str; 2] = ["b1", "b2"];
    const OTHERS: [&str; 2] = ["u1", "u2"];
    const ME: &str = "me";

    #[derive(Debug, Clone)]
    struct Case {
        role: Role,
        team: Option<usize>,
        broker: Option<usize>,
        scope: Scope,
    }

    #[derive(Debug, Clone)]
    struct Row {
        resource_type: ResourceType,
        owner: usize,
        team: Option<usize>,
        teamless_broker: Option<usize>,
        is_private: bool,
        lead: Option<(bool, bool)>,
    }

    impl Row {
        fn owner_id(&self) -> &'static str {
            OTHERS[self.owner]
        }

        fn owner_broker(&self) -> Option<&'static str> {
            match self.team {
                Some(t) => Some(TEAMS[t].1),
                None => self.teamless_broker.map(|b| BROKERAGES[b]),
            }
        }

        fn lead(&self) -> Option<(&'static str, bool)> {
            if self.resource_type.meta().parent_link.is_none() {
                return None;
            }
            self.lead
                .map(|(mine, private)| (if mine { ME } else { OTHERS[0] }, private))
        }

        fn to_row(&self) -> ResourceRow {
            let mut row = ResourceRow::new(self.owner_id());
            if let Some(t) = self.team {
                row = row.with_team(TEAMS[t].0);
            }
            if let Some(b) = self.owner_broker() {
                row = row.with_owner_broker(b);
            }
            if self.resource_type.meta().has_privacy_flag {
                row = row.private(self.is_private);
            }
            if let Some((owner, private)) = self.lead() {
                row = row.linked_to_lead(owner, private);
            }
            row
        }

        fn to_ownership(&self) -> ResourceOwnership {
            let mut resource = ResourceOwnership::new("r1", self.owner_id());
            if let Some(t) = self.team {
                resource = resource.with_team(TEAMS[t].0);
            }
            if self.resource_type.meta().has_privacy_flag {
                resource = resource.private(self.is_private);
            }
            if self.lead().is_some() {
                resource = resource.with_lead("lead-1");
            }
            resource
        }
    }

    impl Case {
        fn identity(&self) -> Identity {
            let mut identity = Identity::new(ME, self.role).unwrap();
            if let Some(t) = self.team {
                identity = identity.with_team(TEAMS[t].0);
            }
            if let Some(b) = self.broker {
                identity = identity.with_broker(BROKERAGES[b]);
            }
            identity
        }
    }

    /// Team members at team scope, brokers at team or brokerage scope.
    fn case_strategy() -> impl Strategy<Value = Case> {
        let member = (
            prop::sample::select(vec![Role::Agent, Role::TeamOwner]),
            0..TEAMS.len(),
        )
            .prop_map(|(role, t)| Case {
                role,
                team: Some(t),
                broker: Some(t),
                scope: Scope::Team,
            });
        let broker = (
            0..BROKERAGES.len(),
            any::<bool>(),
            prop::sample::select(vec![Scope::Team, Scope::Brokerage]),
        )
            .prop_map(|(b, in_team, scope)| Case {
                role: Role::Broker,
                team: in_team.then_some(b),
                broker: Some(b),
                scope,
            });
        prop_oneof![member, broker]
    }

    fn row_strategy() -> impl Strategy<Value = Row> {
        (
            prop::sample::select(ResourceType::ALL.to_vec()),
            0..OTHERS.len(),
            prop::option::of(0..TEAMS.len()),
            prop::option::of(0..BROKERAGES.len()),
            any::<bool>(),
            prop::option::of((any::<bool>(), any::<bool>())),
        )
            .prop_map(
                |(resource_type, owner, team, teamless_broker, is_private, lead)| Row {
                    resource_type,
                    owner,
                    team,
                    teamless_broker,
                    is_private,
                    lead,
                },
            )
    }

    fn oracle_allows(identity: &Identity, row: &Row) -> bool {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (reader, _, _, oracle) = create_oracle();
            reader
                .add_resource(row.resource_type, row.to_ownership())
                .await;
            if let Some(b) = row.owner_broker() {
                reader.set_broker(row.owner_id(), b).await;
            }
            if let Some((owner, private)) = row.lead() {
                reader
                    .add_resource(
                        ResourceType::Lead,
                        ResourceOwnership::new("lead-1", owner).private(private),
                    )
                    .await;
            }
            oracle
                .can_access_resource(identity, row.resource_type, "r1")
                .await
        })
    }

    proptest! {
        #[test]
        fn test_listed_rows_pass_single_record_access(
            case in case_strategy(),
            row in row_strategy()
        ) {
            let identity = case.identity();
            let scope = EffectiveScope::new(case.scope, false, identity.user_id());
            let predicate = build_ownership_filter(&identity, row.resource_type, &scope).unwrap();

            if predicate.evaluate(&row.to_row()) {
                prop_assert!(
                    oracle_allows(&identity, &row),
                    "filter listed a row the oracle denies: {:?} {:?}",
                    case,
                    row
                );
            }
        }

        #[test]
        fn test_teamless_broker_team_filter_lists_nothing(
            b in 0..BROKERAGES.len(),
            row in row_strategy()
        ) {
            let identity = Identity::new(ME, Role::Broker)
                .unwrap()
                .with_broker(BROKERAGES[b]);
            let scope = EffectiveScope::new(Scope::Team, false, identity.user_id());
            let predicate = build_ownership_filter(&identity, row.resource_type, &scope).unwrap();
            prop_assert!(!predicate.evaluate(&row.to_row()));
        }
    }
}
