// Path codec and URL signing tests

use kagami::error::GatewayError;
use kagami::params::{self, signature, HAlign, Params, VAlign};

const SECRET: &[u8] = b"my-secret";

#[test]
fn test_parse_full_path() {
    let params = params::parse(
        "unsafe/meta/trim/10x20:110x120/fit-in/-300x-200/left/top/smart/filters:blur(2):quality(70)/bucket/cat.jpg",
    )
    .unwrap();

    assert!(params.is_unsafe);
    assert!(params.meta);
    assert!(params.trim);
    assert_eq!(
        (params.crop_left, params.crop_top, params.crop_right, params.crop_bottom),
        (10, 20, 110, 120)
    );
    assert!(params.fit_in);
    assert!(params.h_flip && params.v_flip);
    assert_eq!((params.width, params.height), (300, 200));
    assert_eq!(params.h_align, HAlign::Left);
    assert_eq!(params.v_align, VAlign::Top);
    assert!(params.smart);
    assert_eq!(params.filters.len(), 2);
    assert_eq!(params.filter("quality").and_then(|f| f.arg::<u8>(0)), Some(70));
    assert_eq!(params.image, "bucket/cat.jpg");
}

#[test]
fn test_fingerprint_excludes_signature_and_unsafe() {
    let unsafe_params = params::parse("unsafe/200x100/cat.jpg").unwrap();
    let signed = signature::signed_path(&unsafe_params, SECRET);
    let signed_params = params::parse(&signed).unwrap();

    assert_eq!(unsafe_params.fingerprint(), "200x100/cat.jpg");
    assert_eq!(signed_params.fingerprint(), unsafe_params.fingerprint());
}

#[test]
fn test_fingerprint_is_deterministic() {
    let a = params::parse("unsafe/fit-in/100x0/filters:grayscale()/a.png").unwrap();
    let b = params::parse("unsafe/fit-in/100x0/filters:grayscale()/a.png").unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(params::fingerprint(&a), a.fingerprint());
}

#[test]
fn test_distinct_params_have_distinct_fingerprints() {
    let paths = [
        "unsafe/100x100/a.png",
        "unsafe/100x101/a.png",
        "unsafe/fit-in/100x100/a.png",
        "unsafe/-100x100/a.png",
        "unsafe/100x100/filters:blur(1)/a.png",
        "unsafe/100x100/b.png",
    ];
    let mut fingerprints: Vec<String> = paths
        .iter()
        .map(|p| params::parse(p).unwrap().fingerprint())
        .collect();
    fingerprints.sort();
    fingerprints.dedup();
    assert_eq!(fingerprints.len(), paths.len());
}

#[test]
fn test_signed_path_verifies() {
    let mut params = Params::new("example.com/cat.jpg");
    params.width = 200;
    params.height = 200;

    let path = signature::signed_path(&params, SECRET);
    let verified = signature::verify(&path, SECRET, false).unwrap();
    assert_eq!(verified.image, "example.com/cat.jpg");
    assert_eq!(verified.fingerprint(), params.fingerprint());
}

#[test]
fn test_tampered_path_is_rejected() {
    let params = params::parse("unsafe/200x200/cat.jpg").unwrap();
    let path = signature::signed_path(&params, SECRET);
    let tampered = path.replace("200x200", "201x200");

    assert_eq!(
        signature::verify(&tampered, SECRET, false).unwrap_err(),
        GatewayError::Signature
    );
}

#[test]
fn test_wrong_secret_is_rejected() {
    let params = params::parse("unsafe/cat.jpg").unwrap();
    let path = signature::signed_path(&params, b"other-secret");
    assert_eq!(
        signature::verify(&path, SECRET, false).unwrap_err(),
        GatewayError::Signature
    );
}

#[test]
fn test_unsafe_requires_permission() {
    assert_eq!(
        signature::verify("unsafe/cat.jpg", SECRET, false).unwrap_err(),
        GatewayError::Signature
    );
    assert!(signature::verify("unsafe/cat.jpg", SECRET, true).is_ok());
}

#[test]
fn test_sign_is_base64url_without_padding() {
    let token = signature::sign("200x200/cat.jpg", SECRET);
    assert_eq!(token.len(), 43);
    assert!(token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
}

#[test]
fn test_empty_path_is_invalid() {
    assert!(matches!(
        params::parse("").unwrap_err(),
        GatewayError::InvalidPath(_)
    ));
}
