//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random paths, keys, and
//! subscription traffic that maintain required invariants.

use datafront_protocol::{ClientId, EntityKey, ResourcePath};
use proptest::prelude::*;

/// Strategy for generating valid path fragments.
pub fn fragment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for generating valid resource paths of one to three fragments.
pub fn path_strategy() -> impl Strategy<Value = ResourcePath> {
    prop::collection::vec(fragment_strategy(), 1..=3).prop_map(ResourcePath::new)
}

/// Strategy for generating valid entity keys.
pub fn entity_key_strategy() -> impl Strategy<Value = EntityKey> {
    prop::string::string_regex("[a-z0-9]{1,8}")
        .expect("Invalid regex")
        .prop_map(EntityKey::new)
}

/// Strategy drawing clients from a small pool so walks revisit them.
pub fn pooled_client_strategy() -> impl Strategy<Value = ClientId> {
    (0..6usize).prop_map(|n| ClientId::new(format!("client-{n}")))
}

/// Strategy drawing entity keys from a small pool so walks collide.
pub fn pooled_key_strategy() -> impl Strategy<Value = EntityKey> {
    (0..8usize).prop_map(|n| EntityKey::new(format!("key-{n}")))
}

/// One move in a random subscription walk.
#[derive(Debug, Clone)]
pub enum SubscriptionStep {
    /// A client reads and subscribes to entity keys
    Query {
        /// Subscribing client
        client: ClientId,
        /// Keys the read returned
        keys: Vec<EntityKey>,
    },
    /// A client drops some of its entity subscriptions
    Drop {
        /// Unsubscribing client
        client: ClientId,
        /// Keys to drop
        keys: Vec<EntityKey>,
    },
    /// A client goes offline and loses every subscription
    Disconnect {
        /// Departing client
        client: ClientId,
    },
}

/// Strategy for generating subscription steps.
pub fn subscription_step_strategy() -> impl Strategy<Value = SubscriptionStep> {
    let keys = || prop::collection::vec(pooled_key_strategy(), 1..4);
    prop_oneof![
        5 => (pooled_client_strategy(), keys())
            .prop_map(|(client, keys)| SubscriptionStep::Query { client, keys }),
        3 => (pooled_client_strategy(), keys())
            .prop_map(|(client, keys)| SubscriptionStep::Drop { client, keys }),
        1 => pooled_client_strategy()
            .prop_map(|client| SubscriptionStep::Disconnect { client }),
    ]
}

/// Strategy for generating a random subscription walk.
pub fn subscription_walk_strategy(
    min_steps: usize,
    max_steps: usize,
) -> impl Strategy<Value = Vec<SubscriptionStep>> {
    prop::collection::vec(subscription_step_strategy(), min_steps..max_steps)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn paths_roundtrip_through_their_text_form(path in path_strategy()) {
            // Fragments never contain '/', so display and parse agree
            prop_assert!(!path.is_empty());
            prop_assert!(path.len() <= 3);
            let reparsed = ResourcePath::parse(&path.to_string());
            prop_assert_eq!(reparsed.ok(), Some(path));
        }

        #[test]
        fn entity_keys_are_never_empty(key in entity_key_strategy()) {
            prop_assert!(!key.as_str().is_empty());
        }

        #[test]
        fn pooled_clients_stay_in_the_pool(client in pooled_client_strategy()) {
            prop_assert!(client.as_str().starts_with("client-"));
        }

        #[test]
        fn walks_respect_their_bounds(walk in subscription_walk_strategy(1, 10)) {
            prop_assert!(!walk.is_empty());
            prop_assert!(walk.len() < 10);
        }
    }
}
