//! Property-based tests for the record codec.
//!
//! Round trips: decode(encode(r)) == r, compute_size matches the bytes
//! written, and compute_bytes_consumed finds the same end the decoder does.
//!
//! Validator soundness: for random and mutated buffers, a buffer that passes
//! validate_structure always decodes and always measures.

use std::sync::OnceLock;

use proptest::prelude::*;

use proxywire::encoding::varint;
use proxywire::protocol;
use proxywire::{Catalog, Record, StructId, Value};

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(|| protocol::catalog().unwrap())
}

fn id(name: &str) -> StructId {
    catalog().require_struct(name).unwrap()
}

fn tag_pattern() -> impl Strategy<Value = Record> {
    let id = id("TagPattern");
    let leaf = (0u8..4, any::<i32>()).prop_map(move |(kind, index)| {
        Record::from_fields(
            id,
            vec![Some(Value::Enum(kind)), Some(Value::Int32(index)), None, None],
        )
    });
    leaf.prop_recursive(4, 32, 4, move |inner| {
        (
            0u8..4,
            any::<i32>(),
            proptest::option::of(prop::collection::vec(inner.clone(), 0..4)),
            proptest::option::of(inner),
        )
            .prop_map(move |(kind, index, operands, not)| {
                let operands = operands
                    .map(|items| Value::Array(items.into_iter().map(Value::record).collect()));
                Record::from_fields(
                    id,
                    vec![
                        Some(Value::Enum(kind)),
                        Some(Value::Int32(index)),
                        operands,
                        not.map(Value::record),
                    ],
                )
            })
    })
}

fn float_dict<V: Strategy>(
    values: V,
) -> impl Strategy<Value = Value>
where
    V::Value: Into<Value>,
{
    // distinct bit patterns are distinct keys, NaNs included
    prop::collection::btree_map(any::<u32>(), values, 0..8).prop_map(|entries| {
        Value::Dict(
            entries
                .into_iter()
                .map(|(bits, v)| (Value::Float32(f32::from_bits(bits)), v.into()))
                .collect(),
        )
    })
}

fn cloud() -> impl Strategy<Value = Record> {
    let cloud = id("Cloud");
    let color = id("ColorAlpha");
    let color_alpha = any::<[i8; 4]>().prop_map(move |[a, r, g, b]| {
        Record::from_fields(
            color,
            vec![
                Some(Value::Int8(a)),
                Some(Value::Int8(r)),
                Some(Value::Int8(g)),
                Some(Value::Int8(b)),
            ],
        )
    });
    (
        proptest::option::of("\\PC{0,24}"),
        proptest::option::of(float_dict(any::<f32>())),
        proptest::option::of(float_dict(color_alpha)),
    )
        .prop_map(move |(texture, speeds, colors)| {
            Record::from_fields(cloud, vec![texture.map(Value::Text), speeds, colors])
        })
}

fn connect() -> impl Strategy<Value = Record> {
    let connect = id("Connect");
    let host = id("HostAddress");
    let referral_source = ("[a-z.]{1,32}", any::<i16>()).prop_map(move |(name, port)| {
        Record::from_fields(host, vec![Some(Value::Text(name)), Some(Value::Int16(port))])
    });
    (
        "[a-f0-9]{0,64}",
        0u8..2,
        proptest::option::of("[a-z]{2}_[A-Z]{2}"),
        proptest::option::of("[A-Za-z0-9.]{0,96}"),
        any::<u128>(),
        "[A-Za-z0-9_]{1,16}",
        proptest::option::of(prop::collection::vec(any::<i8>(), 0..32)),
        proptest::option::of(referral_source),
    )
        .prop_map(
            move |(hash, client, language, token, uuid, username, referral, source)| {
                Record::from_fields(
                    connect,
                    vec![
                        Some(Value::Text(hash)),
                        Some(Value::Enum(client)),
                        language.map(Value::Text),
                        token.map(Value::Text),
                        Some(Value::Uuid(uuid)),
                        Some(Value::Text(username)),
                        referral.map(|bytes| {
                            Value::Array(bytes.into_iter().map(Value::Int8).collect())
                        }),
                        source.map(Value::record),
                    ],
                )
            },
        )
}

fn any_record() -> impl Strategy<Value = Record> {
    prop_oneof![tag_pattern(), cloud(), connect()]
}

fn assert_round_trip(record: &Record) -> Result<(), TestCaseError> {
    let catalog = catalog();
    let mut bytes = Vec::new();
    catalog.serialize(record, &mut bytes).unwrap();

    prop_assert_eq!(catalog.compute_size(record).unwrap(), bytes.len());
    catalog.validate_structure(record.struct_id(), &bytes, 0).unwrap();
    prop_assert_eq!(
        catalog.compute_bytes_consumed(record.struct_id(), &bytes, 0).unwrap(),
        bytes.len()
    );
    let decoded = catalog.deserialize(record.struct_id(), &bytes, 0).unwrap();
    prop_assert_eq!(&decoded, record);

    let mut again = Vec::new();
    catalog.serialize(&decoded, &mut again).unwrap();
    prop_assert_eq!(again, bytes);
    Ok(())
}

fn assert_sound(id: StructId, bytes: &[u8]) -> Result<(), TestCaseError> {
    let catalog = catalog();
    if catalog.validate_structure(id, bytes, 0).is_ok() {
        let decoded = catalog.deserialize(id, bytes, 0);
        prop_assert!(decoded.is_ok(), "validated but failed to decode: {:?}", decoded.err());
        let consumed = catalog.compute_bytes_consumed(id, bytes, 0).unwrap();
        prop_assert!(consumed <= bytes.len());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn records_round_trip(record in any_record()) {
        assert_round_trip(&record)?;
    }

    #[test]
    fn round_trip_after_prefix(record in any_record(), prefix in prop::collection::vec(any::<u8>(), 0..16)) {
        let catalog = catalog();
        let mut buf = prefix.clone();
        catalog.serialize(&record, &mut buf).unwrap();

        let decoded = catalog.deserialize(record.struct_id(), &buf, prefix.len()).unwrap();
        prop_assert_eq!(decoded, record.clone());
        prop_assert_eq!(
            catalog.compute_bytes_consumed(record.struct_id(), &buf, prefix.len()).unwrap(),
            buf.len() - prefix.len()
        );
    }

    #[test]
    fn random_bytes_never_decode_unvalidated(
        name in prop::sample::select(vec!["TagPattern", "Cloud", "Connect", "SelectorUpdate", "Disconnect"]),
        bytes in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        assert_sound(id(name), &bytes)?;
    }

    #[test]
    fn mutated_encodings_stay_sound(
        record in any_record(),
        flips in prop::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 1..6),
    ) {
        let mut bytes = Vec::new();
        catalog().serialize(&record, &mut bytes).unwrap();
        for (at, value) in flips {
            let at = at.index(bytes.len());
            bytes[at] = value;
        }
        assert_sound(record.struct_id(), &bytes)?;
    }

    #[test]
    fn truncated_encodings_fail_validation(record in any_record(), cut in any::<prop::sample::Index>()) {
        let catalog = catalog();
        let mut bytes = Vec::new();
        catalog.serialize(&record, &mut bytes).unwrap();

        let cut = cut.index(bytes.len());
        prop_assert!(catalog.validate_structure(record.struct_id(), &bytes[..cut], 0).is_err());
        prop_assert!(catalog.deserialize(record.struct_id(), &bytes[..cut], 0).is_err());
    }

    #[test]
    fn varint_round_trips_with_exact_length(value in any::<u32>()) {
        let mut out = Vec::new();
        varint::write(&mut out, value);

        prop_assert_eq!(out.len(), varint::size(value));
        prop_assert_eq!(varint::peek(&out, 0).unwrap(), value);
        prop_assert_eq!(varint::length(&out, 0).unwrap(), out.len());
    }

    #[test]
    fn varint_reader_never_reads_past_input(bytes in prop::collection::vec(any::<u8>(), 0..8)) {
        if let Ok((value, len)) = varint::read(&bytes, 0) {
            prop_assert!(len <= bytes.len());
            prop_assert_eq!(len, varint::size(value));
        }
    }
}
