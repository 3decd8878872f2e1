//! Document codec tests.

use bson::{doc, oid::ObjectId, Bson, DateTime};
use docdump_core::codec::document_file_stem;
use docdump_core::{BsonCodec, Codec, CodecKind, DocumentCodec, JsonCodec};
use rand::Rng;

#[test]
fn bson_roundtrip_keeps_ids_dates_and_wide_integers() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let document = doc! {
            "_id": ObjectId::new(),
            "at": DateTime::from_millis(rng.gen_range(0..4_102_444_800_000_i64)),
            "wide": rng.gen_range(i64::from(i32::MAX) + 1..i64::MAX),
            "ratio": rng.gen::<f64>(),
        };
        let codec = Codec::from_kind(CodecKind::Bson);
        let bytes = codec.encode(&document).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), document);
    }
}

#[test]
fn json_keeps_wide_integers_as_numbers_but_loses_their_type() {
    let document = doc! { "_id": "a", "wide": 5_000_000_000_i64, "narrow": 7_i64 };
    let decoded = JsonCodec.decode(&JsonCodec.encode(&document).unwrap()).unwrap();

    assert_eq!(decoded.get("wide"), Some(&Bson::Int64(5_000_000_000)));
    assert_eq!(decoded.get("narrow"), Some(&Bson::Int32(7)));
}

#[test]
fn json_output_is_readable_text() {
    let oid = ObjectId::new();
    let bytes = JsonCodec
        .encode(&doc! { "_id": oid, "name": "lamp" })
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(
        text,
        format!("{{\"_id\":\"{}\",\"name\":\"lamp\"}}", oid.to_hex())
    );
}

#[test]
fn codecs_do_not_read_each_other() {
    let document = doc! { "_id": 1, "name": "lamp" };
    let bson_bytes = BsonCodec.encode(&document).unwrap();
    assert!(JsonCodec.decode(&bson_bytes).is_err());
}

#[test]
fn file_stems_follow_the_id() {
    let oid = ObjectId::new();
    assert_eq!(
        document_file_stem(&doc! { "_id": oid }).unwrap(),
        oid.to_hex()
    );
    assert_eq!(document_file_stem(&doc! { "_id": 42 }).unwrap(), "42");
    assert!(document_file_stem(&doc! { "_id": "a/b" }).is_err());
}
