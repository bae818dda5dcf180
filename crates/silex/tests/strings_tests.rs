//! Dual-width string round-trip properties.

use pretty_assertions::assert_eq;
use silex::{JsString, StringBuffer};

#[test]
fn utf8_round_trips_for_all_widths() {
    let samples = [
        "",
        "ascii only",
        "latin-1: caf\u{e9} na\u{ef}ve \u{ff}",
        "bmp: \u{4f60}\u{597d}\u{2028}",
        "astral: \u{1f300}\u{10348} end",
        "mixed: a\u{e9}\u{4e2d}\u{1f600}z",
    ];
    for s in samples {
        let js = JsString::from_utf8(s);
        assert_eq!(js.to_utf8(false), s.as_bytes(), "round trip for {s:?}");
    }
}

#[test]
fn cesu8_splits_surrogate_pairs() {
    let js = JsString::from_utf8("\u{10400}");
    // the pair is D801 DC00
    assert_eq!(js.code_unit(0), 0xD801);
    assert_eq!(js.code_unit(1), 0xDC00);
    assert_eq!(js.to_utf8(false), "\u{10400}".as_bytes());
    let cesu = js.to_utf8(true);
    assert_eq!(cesu, [0xED, 0xA0, 0x81, 0xED, 0xB0, 0x80]);
}

#[test]
fn lone_surrogates_survive_as_three_byte_sequences() {
    let js = JsString::from_code_units(vec![0x61, 0xD800, 0x62]);
    let wtf8 = js.to_utf8(false);
    assert_eq!(wtf8, [0x61, 0xED, 0xA0, 0x80, 0x62]);
    assert_eq!(js.to_utf8(true), wtf8, "a lone surrogate encodes the same in both modes");
}

#[test]
fn width_promotion_is_one_way() {
    let mut buf = StringBuffer::new();
    buf.put_code_unit(0x41);
    buf.put_code_unit(0xFF);
    buf.put_code_unit(0x100);
    buf.put_code_unit(0x42);
    let s = buf.finish();
    assert!(s.is_wide(), "a single unit >= 0x100 widens the buffer");
    assert_eq!(s.len(), 4);
    assert_eq!(s.code_unit(1), 0xFF);
    assert_eq!(s.code_unit(3), 0x42);
}

#[test]
fn comparisons_lift_the_narrow_side() {
    let narrow = JsString::from_utf8("abc");
    let wide = JsString::from_code_units(vec![0x61, 0x62, 0x63]);
    assert_eq!(narrow, wide);
    assert!(JsString::from_utf8("ab") < narrow);
    assert!(JsString::from_utf8("abd") > wide);
    assert!(JsString::from_code_units(vec![0x2603]) > narrow);
}

#[test]
fn substring_and_concat_preserve_units() {
    let a = JsString::from_utf8("head-");
    let b = JsString::from_utf8("\u{1f680}tail");
    let joined = a.concat(&b);
    assert_eq!(joined.len(), a.len() + b.len());
    assert_eq!(joined.substring(0, 5), a);
    assert_eq!(joined.substring(5, joined.len()), b);
}
