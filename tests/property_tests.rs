use proptest::prelude::*;

use chainquery::query::naming::{process_names, NameSlot};
use chainquery::{InMemorySchema, Session, ValueKind};

fn arb_slot() -> impl Strategy<Value = NameSlot> {
    (
        prop::option::of(prop::sample::select(vec!["a", "b", "x"])),
        prop::sample::select(vec!["a", "b", "x", "y"]),
        prop::option::of(prop::sample::select(vec!["run", "ob"])),
    )
        .prop_map(|(explicit, factor, object_type)| NameSlot {
            explicit: explicit.map(str::to_owned),
            factor: factor.to_owned(),
            object_type: object_type.map(str::to_owned),
        })
}

fn chain_schema(len: usize, singular: &[bool]) -> InMemorySchema {
    let mut schema = InMemorySchema::new();
    for idx in 0..len {
        let name = format!("t{idx}");
        schema = schema
            .with_object(&name)
            .with_attribute(&name, &format!("v{idx}"), Some(ValueKind::Integer));
    }
    for idx in 1..len {
        schema = schema.with_relation(&format!("t{}", idx - 1), &format!("t{idx}"), singular[idx - 1], true);
    }
    schema
}

proptest! {
    #[test]
    fn prop_names_are_distinct(slots in prop::collection::vec(arb_slot(), 1..8)) {
        let names = process_names(&slots);
        prop_assert_eq!(names.len(), slots.len());
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), names.len(), "names: {:?}", names);
    }

    #[test]
    fn prop_first_explicit_name_is_kept(slots in prop::collection::vec(arb_slot(), 1..8)) {
        let names = process_names(&slots);
        if let Some((idx, explicit)) = slots
            .iter()
            .enumerate()
            .find_map(|(idx, s)| s.explicit.clone().map(|e| (idx, e)))
        {
            prop_assert_eq!(&names[idx], &explicit);
        }
    }

    #[test]
    fn prop_singular_traversal_matches_declared_path(singular in prop::collection::vec(any::<bool>(), 1..5)) {
        let len = singular.len() + 1;
        let session = Session::new(chain_schema(len, &singular));
        let start = session.root().get("t0s").unwrap();
        let last = format!("t{}", len - 1);
        let all_single = singular.iter().all(|s| *s);
        match start.traverse_to(&last, true) {
            Ok(handle) => {
                prop_assert!(all_single);
                prop_assert!(handle.is_single());
            }
            Err(err) => {
                prop_assert!(!all_single);
                prop_assert_eq!(err.code(), "NotSingular");
            }
        }
        let plural = start.traverse_to(&last, false).unwrap();
        prop_assert_eq!(plural.is_single(), all_single);
    }

    #[test]
    fn prop_attributes_along_a_chain_combine(singular in prop::collection::vec(any::<bool>(), 1..5)) {
        let len = singular.len() + 1;
        let session = Session::new(chain_schema(len, &singular));
        let start = session.root().get("t0s").unwrap();
        let mut current = start.clone();
        let mut anchor = start.node();
        let mut total = start.get("v0").unwrap();
        for idx in 1..len {
            current = current.traverse_to(&format!("t{idx}"), false).unwrap();
            if !singular[idx - 1] {
                anchor = current.node();
            }
            let value = current.get(&format!("v{idx}")).unwrap();
            total = total.add(&value).unwrap();
            prop_assert_eq!(total.index_node(), anchor);
        }
    }
}
