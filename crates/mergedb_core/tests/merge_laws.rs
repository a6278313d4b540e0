//! Algebraic properties of the hash merge operator.

use mergedb_codec::{HashEncoder, HashRecord, HashScheme};
use mergedb_core::HashMergeOperator;
use mergedb_storage::MergeOperator;
use proptest::prelude::*;

const KEY: &[u8] = b"h\x01k";

fn generic_record() -> impl Strategy<Value = HashRecord> {
    (
        "[a-d]{1,2}",
        prop_oneof![4 => "[0-9]{1,3}", 1 => Just("_deleted_".to_string())],
    )
        .prop_map(|(field, value)| HashRecord::new(field, value))
}

fn packed_record() -> impl Strategy<Value = HashRecord> {
    (
        "[a-b][0-1][a-b][0-1]",
        prop_oneof![4 => (-30000i16..=30000).prop_map(|v| v.to_string()), 1 => Just("32767".to_string())],
    )
        .prop_map(|(field, value)| HashRecord::new(field, value))
}

fn merge_operand(
    encoder: HashEncoder,
    record: impl Strategy<Value = HashRecord>,
) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(record, 1..4)
        .prop_map(move |records| encoder.encode_records(&records).unwrap())
}

fn stored_value(
    encoder: HashEncoder,
    record: impl Strategy<Value = HashRecord>,
) -> impl Strategy<Value = Option<Vec<u8>>> {
    prop::option::of(prop::collection::vec(record, 0..5).prop_map(move |records| {
        let live: Vec<_> = records
            .into_iter()
            .filter(|r| !encoder.is_deleted(&r.value))
            .collect();
        encoder.encode_records(&live).unwrap()
    }))
}

fn generic() -> (HashEncoder, HashMergeOperator) {
    let encoder = HashEncoder::new(HashScheme::Generic);
    (encoder, HashMergeOperator::new(encoder))
}

fn packed() -> (HashEncoder, HashMergeOperator) {
    let encoder = HashEncoder::new(HashScheme::Packed);
    (encoder, HashMergeOperator::new(encoder))
}

fn check_equivalence(
    op: &HashMergeOperator,
    base: Option<&[u8]>,
    operands: &[Vec<u8>],
) -> Result<(), TestCaseError> {
    let direct = op.full_merge(KEY, base, operands).unwrap();
    for split in 1..operands.len() {
        let combined = op
            .partial_merge(KEY, &operands[split - 1], &operands[split])
            .unwrap();
        let mut folded = operands[..split - 1].to_vec();
        folded.push(combined);
        folded.extend_from_slice(&operands[split + 1..]);
        prop_assert_eq!(&op.full_merge(KEY, base, &folded).unwrap(), &direct);
    }
    Ok(())
}

/// Applies the operands one at a time, feeding each result back in as the
/// base, and checks that the outcome matches a single full merge.
fn check_sequential(
    op: &HashMergeOperator,
    base: Option<&[u8]>,
    operands: &[Vec<u8>],
) -> Result<(), TestCaseError> {
    let direct = op.full_merge(KEY, base, operands).unwrap();
    let mut current = base.map(<[u8]>::to_vec);
    for operand in operands {
        current = Some(
            op.full_merge(KEY, current.as_deref(), std::slice::from_ref(operand))
                .unwrap(),
        );
    }
    prop_assert_eq!(current.unwrap_or_default(), direct);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn generic_operands_match_one_at_a_time_application(
        base in stored_value(HashEncoder::new(HashScheme::Generic), generic_record()),
        operands in prop::collection::vec(merge_operand(HashEncoder::new(HashScheme::Generic), generic_record()), 1..6),
    ) {
        let (_, op) = generic();
        check_sequential(&op, base.as_deref(), &operands)?;
    }

    #[test]
    fn packed_operands_match_one_at_a_time_application(
        base in stored_value(HashEncoder::new(HashScheme::Packed), packed_record()),
        operands in prop::collection::vec(merge_operand(HashEncoder::new(HashScheme::Packed), packed_record()), 1..6),
    ) {
        let (_, op) = packed();
        check_sequential(&op, base.as_deref(), &operands)?;
    }

    #[test]
    fn generic_partial_merge_preserves_full_merge(
        base in stored_value(HashEncoder::new(HashScheme::Generic), generic_record()),
        operands in prop::collection::vec(merge_operand(HashEncoder::new(HashScheme::Generic), generic_record()), 2..5),
    ) {
        let (_, op) = generic();
        check_equivalence(&op, base.as_deref(), &operands)?;
    }

    #[test]
    fn packed_partial_merge_preserves_full_merge(
        base in stored_value(HashEncoder::new(HashScheme::Packed), packed_record()),
        operands in prop::collection::vec(merge_operand(HashEncoder::new(HashScheme::Packed), packed_record()), 2..5),
    ) {
        let (_, op) = packed();
        check_equivalence(&op, base.as_deref(), &operands)?;
    }

    #[test]
    fn partial_merge_is_associative(
        a in merge_operand(HashEncoder::new(HashScheme::Generic), generic_record()),
        b in merge_operand(HashEncoder::new(HashScheme::Generic), generic_record()),
        c in merge_operand(HashEncoder::new(HashScheme::Generic), generic_record()),
    ) {
        let (_, op) = generic();
        let left = op.partial_merge(KEY, &op.partial_merge(KEY, &a, &b).unwrap(), &c).unwrap();
        let right = op.partial_merge(KEY, &a, &op.partial_merge(KEY, &b, &c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn repeating_an_operand_changes_nothing(
        base in stored_value(HashEncoder::new(HashScheme::Generic), generic_record()),
        a in merge_operand(HashEncoder::new(HashScheme::Generic), generic_record()),
    ) {
        let (_, op) = generic();
        let once = op.full_merge(KEY, base.as_deref(), &[a.clone()]).unwrap();
        let twice = op.full_merge(KEY, base.as_deref(), &[a.clone(), a]).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merged_values_hold_each_field_once_and_no_tombstones(
        base in stored_value(HashEncoder::new(HashScheme::Packed), packed_record()),
        operands in prop::collection::vec(merge_operand(HashEncoder::new(HashScheme::Packed), packed_record()), 0..5),
    ) {
        let (encoder, op) = packed();
        let merged = op.full_merge(KEY, base.as_deref(), &operands).unwrap();
        let records = encoder.decode_values(&merged).unwrap();

        let mut fields: Vec<_> = records.iter().map(|r| r.field.clone()).collect();
        fields.sort();
        fields.dedup();
        prop_assert_eq!(fields.len(), records.len());
        prop_assert!(records.iter().all(|r| !encoder.is_deleted(&r.value)));
    }

    #[test]
    fn delete_hides_field_from_any_base(
        base in stored_value(HashEncoder::new(HashScheme::Generic), generic_record()),
        field in "[a-d]{1,2}",
    ) {
        let (encoder, op) = generic();
        let delete = encoder.encode_delete(field.as_bytes()).unwrap();
        let merged = op.full_merge(KEY, base.as_deref(), &[delete]).unwrap();
        prop_assert_eq!(encoder.find_value(&merged, field.as_bytes()).unwrap(), None);
    }
}

#[test]
fn set_then_delete_round_trip() {
    let (encoder, op) = generic();
    let set = encoder.encode_value(b"f", b"v").unwrap();
    let delete = encoder.encode_delete(b"f").unwrap();

    let merged = op.full_merge(KEY, None, &[set.clone(), delete.clone()]).unwrap();
    assert!(merged.is_empty());

    let merged = op.full_merge(KEY, None, &[delete, set]).unwrap();
    assert_eq!(encoder.find_value(&merged, b"f").unwrap(), Some(b"v".to_vec()));
}
