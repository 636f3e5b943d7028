#![no_main]

use adrest::codec::CodecTable;
use adrest::schema::SchemaRegistry;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

const ATTRIBUTES: &[&str] = &[
    "cn",
    "objectClass",
    "userAccountControl",
    "accountExpires",
    "pwdLastSet",
    "lastLogon",
    "maxPwdAge",
    "objectSid",
    "objectGUID",
    "whenCreated",
    "thumbnailPhoto",
    "isDeleted",
    "unicodePwd",
    "memberOf",
];

#[derive(Arbitrary, Debug)]
struct FuzzAttribute {
    attribute: u8,
    raw_values: Vec<Vec<u8>>,
}

fn codecs() -> &'static CodecTable {
    static CODECS: OnceLock<CodecTable> = OnceLock::new();
    CODECS.get_or_init(|| CodecTable::new(SchemaRegistry::builtin().unwrap()))
}

fuzz_target!(|input: FuzzAttribute| {
    let name = ATTRIBUTES[input.attribute as usize % ATTRIBUTES.len()];
    let codecs = codecs();

    // Whatever the directory sends must format, and the formatted value
    // must be accepted or rejected without panicking.
    if let Some(formatted) = codecs.format(name, &input.raw_values) {
        let _ = codecs.to_wire(name, &formatted);
    }
});
