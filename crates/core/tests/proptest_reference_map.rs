//! Property-based tests for `ReferenceMap`'s `Ref` chasing (§3.1, invariant 9).

use capstan_core::ReferenceMap;
use proptest::prelude::*;

proptest! {
    /// A chain of `chain_len` maps, each pointing at the next, always
    /// resolves to whatever the tail map holds, no matter how long the chain
    /// (short of the cycle bound).
    #[test]
    fn ref_chain_of_any_length_resolves_to_the_tail_value(
        chain_len in 1usize..64,
        value in any::<i64>(),
    ) {
        let maps: Vec<ReferenceMap> = (0..=chain_len).map(|_| ReferenceMap::new()).collect();
        for i in 0..chain_len {
            let next = maps[i + 1].ref_to("v");
            maps[i].set("v", next);
        }
        maps[chain_len].set("v", value);
        prop_assert_eq!(maps[0].get("v").unwrap(), serde_json::json!(value));
    }

    /// Overwriting a key that held a `Ref` always severs it: later writes to
    /// the formerly-pointed-at map never leak back through, regardless of
    /// the overwritten value.
    #[test]
    fn overwriting_a_ref_always_severs_it(
        original in any::<i64>(),
        overwrite in any::<i64>(),
        later in any::<i64>(),
    ) {
        let source = ReferenceMap::new();
        let target = ReferenceMap::new();
        source.set("a", original);
        target.set("a", source.ref_to("a"));
        target.set("a", overwrite);
        source.set("a", later);
        prop_assert_eq!(target.get("a").unwrap(), serde_json::json!(overwrite));
    }
}
