//! Property tests for the merge algebra and for order-independent resolution
//!
//! Tests verify:
//! - Every CRDT merge is commutative, associative, and idempotent
//! - Conflict resolution picks the same version for any arrival order
//! - Quorum decisions depend on the tally, not on vote order

use proptest::prelude::*;

use swarm_coordination::consensus::quorum::decide;
use swarm_coordination::crdt::{Crdt, GCounter, LwwMap, LwwRegister, OrSet, PNCounter, VectorClock};
use swarm_coordination::types::VoteTally;
use swarm_coordination::{
    AgentId, ConflictResolver, CrdtValue, Decision, ResolutionStrategy, StateValue, StateVersion,
    VoteChoice,
};

fn agent(i: usize) -> AgentId {
    AgentId::new(format!("agent-{}", i))
}

fn g_counter() -> impl Strategy<Value = GCounter> {
    prop::collection::vec((0..4usize, 0..50u64), 0..8).prop_map(|incs| {
        let mut counter = GCounter::new();
        for (a, n) in incs {
            counter.increment(&agent(a), n);
        }
        counter
    })
}

fn pn_counter() -> impl Strategy<Value = PNCounter> {
    prop::collection::vec((0..4usize, 0..50u64, any::<bool>()), 0..8).prop_map(|ops| {
        let mut counter = PNCounter::new();
        for (a, n, up) in ops {
            if up {
                counter.increment(&agent(a), n);
            } else {
                counter.decrement(&agent(a), n);
            }
        }
        counter
    })
}

fn lww_register() -> impl Strategy<Value = LwwRegister> {
    (0..5u8, 0..10u64, 0..3usize)
        .prop_map(|(v, ts, w)| LwwRegister::new(serde_json::json!(v), ts, agent(w)))
}

fn or_set() -> impl Strategy<Value = OrSet> {
    (0..3usize, prop::collection::vec((0..4u8, any::<bool>()), 0..8)).prop_map(|(replica, ops)| {
        let mut set = OrSet::new();
        for (element, add) in ops {
            let element = format!("e{}", element);
            if add {
                set.add(&element, &agent(replica));
            } else {
                set.remove(&element);
            }
        }
        set
    })
}

fn lww_map() -> impl Strategy<Value = LwwMap> {
    prop::collection::vec((0..3u8, 0..5u8, 0..10u64, 0..3usize), 0..6).prop_map(|writes| {
        let mut map = LwwMap::new();
        for (key, value, ts, writer) in writes {
            map.set(format!("k{}", key), serde_json::json!(value), ts, &agent(writer));
        }
        map
    })
}

fn vector_clock() -> impl Strategy<Value = VectorClock> {
    prop::collection::vec(0..4usize, 0..8).prop_map(|ticks| {
        let mut clock = VectorClock::new();
        for a in ticks {
            clock.increment(&agent(a));
        }
        clock
    })
}

macro_rules! merge_laws {
    ($name:ident, $strategy:expr) => {
        mod $name {
            use super::*;

            proptest! {
                #[test]
                fn commutative(a in $strategy, b in $strategy) {
                    prop_assert_eq!(a.merge(&b), b.merge(&a));
                }

                #[test]
                fn associative(a in $strategy, b in $strategy, c in $strategy) {
                    prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
                }

                #[test]
                fn idempotent(a in $strategy) {
                    prop_assert_eq!(a.merge(&a), a.clone());
                }
            }
        }
    };
}

merge_laws!(g_counter_laws, g_counter());
merge_laws!(pn_counter_laws, pn_counter());
merge_laws!(lww_register_laws, lww_register());
merge_laws!(or_set_laws, or_set());
merge_laws!(lww_map_laws, lww_map());
merge_laws!(vector_clock_laws, vector_clock());

proptest! {
    #[test]
    fn g_counter_merge_never_loses_counts(a in g_counter(), b in g_counter()) {
        let merged = a.merge(&b);
        prop_assert!(merged.value() >= a.value().max(b.value()));
    }
}

/// Versions for one key; writers repeat, so ties down to the clock occur
fn versions() -> impl Strategy<Value = Vec<StateVersion>> {
    prop::collection::vec(
        (0..3usize, 0..4u8, 0..3u64, 0..3u64, vector_clock(), any::<bool>()),
        1..6,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .map(|(writer, value, ts, version, clock, crdt)| {
                let value = if crdt {
                    let mut counter = GCounter::new();
                    counter.increment(&agent(writer), u64::from(value));
                    StateValue::Crdt(CrdtValue::GCounter(counter))
                } else {
                    StateValue::plain(value)
                };
                StateVersion::new("cfg", value, version, ts, agent(writer)).with_clock(clock)
            })
            .collect()
    })
}

fn strategy() -> impl Strategy<Value = ResolutionStrategy> {
    prop_oneof![
        Just(ResolutionStrategy::Lww),
        Just(ResolutionStrategy::VectorClock),
        Just(ResolutionStrategy::CrdtAware),
    ]
}

proptest! {
    #[test]
    fn resolution_ignores_arrival_order(
        versions in versions(),
        strategy in strategy(),
        shuffle in any::<prop::sample::Index>(),
    ) {
        let resolver = ConflictResolver::new();
        let expected = resolver.resolve(&versions, strategy);

        let mut reversed = versions.clone();
        reversed.reverse();
        prop_assert_eq!(resolver.resolve(&reversed, strategy), expected.clone());

        let mut rotated = versions.clone();
        let by = shuffle.index(rotated.len());
        rotated.rotate_left(by);
        prop_assert_eq!(resolver.resolve(&rotated, strategy), expected);
    }

    #[test]
    fn quorum_decision_ignores_vote_order(
        choices in prop::collection::vec(0..3u8, 1..12),
        threshold in 0.0..=1.0f64,
    ) {
        let choices: Vec<VoteChoice> = choices
            .into_iter()
            .map(|c| match c {
                0 => VoteChoice::For,
                1 => VoteChoice::Against,
                _ => VoteChoice::Abstain,
            })
            .collect();
        let tally_of = |votes: &[VoteChoice]| {
            let mut tally = VoteTally::default();
            for choice in votes {
                tally.add(*choice);
            }
            tally
        };

        let forward = decide(tally_of(&choices), 0, threshold);
        let mut reversed = choices.clone();
        reversed.reverse();
        prop_assert_eq!(decide(tally_of(&reversed), 0, threshold), forward);

        let tally = tally_of(&choices);
        let approved = tally.meets(threshold);
        prop_assert_eq!(forward == Decision::Approved, approved);
    }
}
