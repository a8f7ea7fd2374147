use super::*;
use crate::test_helpers::token_with;
use serde_json::json;

#[test]
fn decodes_full_identity() {
    let token = token_with(&json!({
        "id": 7,
        "email": "anna@example.com",
        "first_name": "Anna",
        "last_name": "Schmidt",
        "profile_image_url": "https://cdn.example.com/a.png",
        "exp": 1_900_000_000,
    }));

    let claims = decode_access_claims(&token).unwrap();
    assert_eq!(claims.exp, Some(1_900_000_000));
    assert_eq!(claims.identity.id, Some(7));
    assert_eq!(claims.identity.email.as_deref(), Some("anna@example.com"));
    assert_eq!(claims.identity.profile_image_url.as_deref(), Some("https://cdn.example.com/a.png"));
}

#[test]
fn accepts_profile_img_url_alias() {
    let token = token_with(&json!({ "email": "a@b.c", "profile_img_url": "x.png" }));
    let identity = decode_identity(&token).unwrap();
    assert_eq!(identity.profile_image_url.as_deref(), Some("x.png"));
}

#[test]
fn missing_claims_default_to_none() {
    let identity = decode_identity(&token_with(&json!({ "token_type": "access" }))).unwrap();
    assert_eq!(identity, Identity::default());
}

#[test]
fn tolerates_padded_payload() {
    let token = token_with(&json!({ "email": "pad@example.com" }));
    let mut parts: Vec<String> = token.split('.').map(str::to_owned).collect();
    parts[1].push_str("==");
    let padded = parts.join(".");
    assert_eq!(decode_identity(&padded).unwrap().email.as_deref(), Some("pad@example.com"));
}

#[test]
fn rejects_wrong_segment_count() {
    assert!(matches!(decode_identity("opaque-token"), Err(ClaimsError::Shape(1))));
    assert!(matches!(decode_identity("a.b"), Err(ClaimsError::Shape(2))));
}

#[test]
fn rejects_non_base64_payload() {
    assert!(matches!(decode_identity("h.!!!.s"), Err(ClaimsError::Base64(_))));
}

#[test]
fn rejects_non_json_payload() {
    let payload = URL_SAFE_NO_PAD.encode("not json");
    assert!(matches!(decode_identity(&format!("h.{payload}.s")), Err(ClaimsError::Json(_))));
}

#[test]
fn display_name_prefers_full_name() {
    let identity = Identity {
        first_name: Some("Anna".into()),
        last_name: Some("Schmidt".into()),
        email: Some("anna@example.com".into()),
        ..Identity::default()
    };
    assert_eq!(identity.display_name().as_deref(), Some("Anna Schmidt"));
}

#[test]
fn display_name_falls_back_to_email() {
    let identity = Identity { email: Some("anna@example.com".into()), ..Identity::default() };
    assert_eq!(identity.display_name().as_deref(), Some("anna@example.com"));
    assert_eq!(Identity::default().display_name(), None);
}
