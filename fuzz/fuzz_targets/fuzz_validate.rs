//! Fuzz testing for the structural validator.
//!
//! Feeds arbitrary bytes to the validator for a chosen sample record type.
//! Whatever the validator accepts must decode and measure without error,
//! and the measured extent must stay inside the buffer.

#![no_main]

use std::sync::OnceLock;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use proxywire::protocol;
use proxywire::Catalog;

#[derive(Debug, Arbitrary, Clone, Copy)]
enum Target {
    Connect,
    Disconnect,
    ChatMessage,
    TagPattern,
    SelectorUpdate,
    Cloud,
    RaycastSelector,
}

impl Target {
    fn name(self) -> &'static str {
        match self {
            Target::Connect => "Connect",
            Target::Disconnect => "Disconnect",
            Target::ChatMessage => "ChatMessage",
            Target::TagPattern => "TagPattern",
            Target::SelectorUpdate => "SelectorUpdate",
            Target::Cloud => "Cloud",
            Target::RaycastSelector => "RaycastSelector",
        }
    }
}

#[derive(Debug, Arbitrary)]
struct ValidateInput {
    target: Target,
    offset: u8,
    data: Vec<u8>,
}

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(|| protocol::catalog().expect("sample catalog compiles"))
}

fuzz_target!(|input: ValidateInput| {
    let catalog = catalog();
    let Some(id) = catalog.struct_id(input.target.name()) else {
        return;
    };
    let offset = usize::from(input.offset).min(input.data.len());

    if catalog.validate_structure(id, &input.data, offset).is_err() {
        return;
    }

    let record = catalog
        .deserialize(id, &input.data, offset)
        .expect("validated payload must decode");
    let consumed = catalog
        .compute_bytes_consumed(id, &input.data, offset)
        .expect("validated payload must measure");
    assert!(offset + consumed <= input.data.len());

    let mut again = Vec::new();
    catalog
        .serialize(&record, &mut again)
        .expect("decoded record must re-encode");
    catalog
        .validate_structure(id, &again, 0)
        .expect("re-encoded record must validate");
});
