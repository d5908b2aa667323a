//! # Packet Scenarios
//!
//! End-to-end behavior of the sample protocol through the public API:
//!
//! - polymorphic dispatch across the five `Selector` variants
//! - registry construction, collisions and dispatch
//! - cached packets shared across connections, single-threaded and concurrent
//! - the process-wide registry install point

use std::sync::{Arc, Barrier};
use std::thread;

use proxywire::error::{describe, kind_of};
use proxywire::protocol::{self, selector};
use proxywire::stats::codec_stats;
use proxywire::{
    CachedPacket, Packet, PacketRegistry, ProtocolError, Record, Value, Variant,
};

fn registry() -> PacketRegistry {
    protocol::default_registry().unwrap()
}

fn horizontal(registry: &PacketRegistry) -> Variant {
    let catalog = registry.catalog();
    let mut builder = catalog.builder_for("HorizontalSelector").unwrap();
    builder.set("extend_top", 1.5f32).unwrap();
    builder.set("extend_bottom", -0.5f32).unwrap();
    builder.set("yaw_length", 90.0f32).unwrap();
    builder.set("end_distance", 4.0f32).unwrap();
    builder.set("direction", Value::Enum(1)).unwrap();
    builder.set("test_line_of_sight", true).unwrap();
    Variant {
        tag: selector::HORIZONTAL,
        record: builder.build(),
    }
}

fn chat(registry: &PacketRegistry, text: &str) -> Record {
    let mut builder = registry.catalog().builder_for("ChatMessage").unwrap();
    builder.set("message", text).unwrap();
    builder.build()
}

mod polymorphic {
    use super::*;

    #[test]
    fn variant_three_of_five_round_trips() {
        let registry = registry();
        let catalog = registry.catalog();
        let family = catalog.require_family("Selector").unwrap();
        let variant = horizontal(&registry);

        let mut bytes = Vec::new();
        catalog.serialize_variant(family, &variant, &mut bytes).unwrap();
        assert_eq!(bytes[0], 3);
        assert_eq!(
            catalog.compute_variant_size(family, &variant).unwrap(),
            bytes.len()
        );

        catalog.validate_variant(family, &bytes, 0).unwrap();
        assert_eq!(
            catalog.variant_bytes_consumed(family, &bytes, 0).unwrap(),
            bytes.len()
        );

        let decoded = catalog.deserialize_variant(family, &bytes, 0).unwrap();
        assert_eq!(decoded.tag, selector::HORIZONTAL);
        assert_eq!(
            decoded.record.struct_id(),
            catalog.require_struct("HorizontalSelector").unwrap()
        );
        assert_eq!(decoded, variant);

        let mut again = Vec::new();
        catalog.serialize_variant(family, &decoded, &mut again).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn every_variant_dispatches_to_its_own_struct() {
        let registry = registry();
        let catalog = registry.catalog();
        let family = catalog.require_family("Selector").unwrap();
        let layout = catalog.family(family).unwrap();

        assert_eq!(layout.variants().len(), 5);
        for &(tag, id) in layout.variants() {
            let record = catalog.default_record(id).unwrap();
            let variant = Variant { tag, record };

            let mut bytes = Vec::new();
            catalog.serialize_variant(family, &variant, &mut bytes).unwrap();
            let decoded = catalog.deserialize_variant(family, &bytes, 0).unwrap();
            assert_eq!(decoded.record.struct_id(), id);
        }
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let registry = registry();
        let catalog = registry.catalog();
        let family = catalog.require_family("Selector").unwrap();

        let bytes = [9u8, 0, 0, 0, 0];
        let expected = ProtocolError::UnknownVariantTag {
            family: "Selector".to_string(),
            tag: 9,
        };
        let err = catalog.validate_variant(family, &bytes, 0).unwrap_err();
        assert_eq!(kind_of(&err), Some(&expected));
        let err = catalog.deserialize_variant(family, &bytes, 0).unwrap_err();
        assert_eq!(kind_of(&err), Some(&expected));
    }

    #[test]
    fn tag_must_match_record_type() {
        let registry = registry();
        let catalog = registry.catalog();
        let family = catalog.require_family("Selector").unwrap();
        let mut variant = horizontal(&registry);
        variant.tag = selector::STAB;

        let err = catalog
            .serialize_variant(family, &variant, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(
            kind_of(&err),
            Some(ProtocolError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn selector_update_packet_carries_variant() {
        let registry = registry();
        let catalog = registry.catalog();
        let mut builder = catalog.builder_for("SelectorUpdate").unwrap();
        builder.set("entity_id", 42).unwrap();
        builder.set("selector", horizontal(&registry)).unwrap();
        let packet = registry.bind(builder.build()).unwrap();
        assert_eq!(packet.packet_id(), protocol::SELECTOR_UPDATE);

        let mut payload = Vec::new();
        registry.write_packet(&packet, &mut payload).unwrap();
        let decoded = registry
            .decode(protocol::SELECTOR_UPDATE, &payload)
            .unwrap();

        let selector = catalog
            .field(&decoded, "selector")
            .and_then(Value::as_variant)
            .unwrap();
        assert_eq!(selector, &horizontal(&registry));
        assert_eq!(
            catalog.field(&decoded, "entity_id").and_then(Value::as_i32),
            Some(42)
        );
        assert_eq!(catalog.field(&decoded, "filter"), None);
    }
}

mod registry_dispatch {
    use super::*;

    #[test]
    fn collision_on_id_five_names_both_packets() {
        let catalog = Arc::new(protocol::catalog().unwrap());
        let err = PacketRegistry::builder(catalog)
            .register(5, "Ping", "Ping", false)
            .unwrap()
            .register(5, "Pong", "Pong", false)
            .err()
            .unwrap();

        assert_eq!(
            kind_of(&err),
            Some(&ProtocolError::DuplicatePacketId {
                id: 5,
                name: "Pong".to_string(),
                existing: "Ping".to_string(),
            })
        );
    }

    #[test]
    fn connect_built_by_name_decodes_by_id() {
        let registry = registry();
        let catalog = registry.catalog();
        let mut connect = catalog.builder_for("Connect").unwrap();
        connect.set("protocol_hash", "5f1e0c").unwrap();
        connect.set("uuid", Value::Uuid(0xfeed_beef)).unwrap();
        connect.set("username", "alice").unwrap();
        connect.set("language", "en_US").unwrap();
        let record = connect.build();

        let packet = registry.bind(record.clone()).unwrap();
        let mut payload = Vec::new();
        registry.write_packet(&packet, &mut payload).unwrap();

        assert_eq!(payload[0], 0b0001);
        let decoded = registry.decode(protocol::CONNECT, &payload).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(
            catalog.field(&decoded, "username").and_then(Value::as_str),
            Some("alice")
        );
        assert_eq!(catalog.field(&decoded, "referral_data"), None);
    }

    #[test]
    fn oversized_username_is_rejected_both_ways() {
        let registry = registry();
        let catalog = registry.catalog();
        let mut connect = catalog.builder_for("Connect").unwrap();
        connect.set("username", "a_name_longer_than_16").unwrap();
        let packet = registry.bind(connect.build()).unwrap();

        let err = registry.write_packet(&packet, &mut Vec::new()).unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&ProtocolError::StringTooLong { len: 21, max: 16 })
        );
        assert!(describe(&err).starts_with("Connect.username: "));
    }

    #[test]
    fn nullable_disconnect_reason() {
        let registry = registry();
        let catalog = registry.catalog();
        let record = catalog.builder_for("Disconnect").unwrap().build();
        let packet = registry.bind(record.clone()).unwrap();

        let mut payload = Vec::new();
        registry.write_packet(&packet, &mut payload).unwrap();

        assert_eq!(payload, vec![0b0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            registry.decode(protocol::DISCONNECT, &payload).unwrap(),
            record
        );
    }

    #[test]
    fn decode_counts_rejected_payloads() {
        let registry = registry();
        let before = codec_stats();

        assert!(registry.decode(protocol::PING, &[1, 2, 3]).is_err());
        let after = codec_stats();
        assert!(after.payloads_rejected > before.payloads_rejected);
    }
}

mod cached {
    use super::*;

    #[test]
    fn shared_across_three_connections_with_single_free() {
        let registry = registry();
        let packet = registry.bind(chat(&registry, "server restarting")).unwrap();
        let mut direct = Vec::new();
        registry.write_packet(&packet, &mut direct).unwrap();

        let first = CachedPacket::cache(&packet).unwrap();
        let connections = [first.share().unwrap(), first.share().unwrap()];
        first.release().unwrap();
        let third = connections[1].share().unwrap();
        assert_eq!(third.ref_count(), 3);

        let mut freed = 0;
        for handle in connections.iter().chain(std::iter::once(&third)) {
            let mut wire = Vec::new();
            registry.write_packet(handle, &mut wire).unwrap();
            assert_eq!(wire, direct);
            if handle.release().unwrap() {
                freed += 1;
            }
        }

        assert_eq!(freed, 1);
        assert!(third.is_freed());
        assert!(matches!(
            kind_of(&third.serialize(&mut Vec::new()).unwrap_err()),
            Some(ProtocolError::IllegalState(_))
        ));
    }

    #[test]
    fn cache_is_a_snapshot_of_the_record() {
        let registry = registry();
        let packet = registry.bind(chat(&registry, "before")).unwrap();
        let cached = CachedPacket::cache(&packet).unwrap();

        let mut record = packet.into_record();
        *record.get_mut(0).unwrap() = Some(Value::text("after"));

        let mut wire = Vec::new();
        cached.serialize(&mut wire).unwrap();
        let decoded = registry.decode(protocol::CHAT_MESSAGE, &wire).unwrap();
        assert_eq!(decoded.get(0), Some(&Value::text("before")));
    }

    #[test]
    fn concurrent_writers_free_exactly_once() {
        const WRITERS: usize = 16;

        let registry = Arc::new(registry());
        let packet = registry.bind(chat(&registry, "broadcast")).unwrap();
        let origin = CachedPacket::cache(&packet).unwrap();
        let expected = {
            let mut out = Vec::new();
            origin.serialize(&mut out).unwrap();
            out
        };

        let barrier = Arc::new(Barrier::new(WRITERS));
        let handles: Vec<_> = (0..WRITERS)
            .map(|_| {
                let handle = origin.share().unwrap();
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut wire = Vec::new();
                    registry.write_packet(&handle, &mut wire).unwrap();
                    let freed = handle.release().unwrap();
                    (wire, freed)
                })
            })
            .collect();

        let origin_freed = origin.release().unwrap();
        let mut freed = usize::from(origin_freed);
        for handle in handles {
            let (wire, was_last) = handle.join().unwrap();
            assert_eq!(wire, expected);
            freed += usize::from(was_last);
        }

        assert_eq!(freed, 1);
        assert!(origin.is_freed());
    }

    #[test]
    fn share_after_free_is_refused() {
        let registry = registry();
        let packet = registry.bind(chat(&registry, "gone")).unwrap();
        let a = CachedPacket::cache(&packet).unwrap();
        let b = a.share().unwrap();
        a.release().unwrap();
        assert!(b.release().unwrap());

        assert!(matches!(
            kind_of(&b.share().unwrap_err()),
            Some(ProtocolError::IllegalState(_))
        ));
    }
}

mod global {
    use super::*;

    #[test]
    fn installed_registry_is_shared_process_wide() {
        let installed = proxywire::registry::install(registry()).unwrap();
        let reader = thread::spawn(|| proxywire::registry::global().unwrap().len());

        assert_eq!(reader.join().unwrap(), installed.len());
        assert!(proxywire::registry::install(registry()).is_err());
    }
}
