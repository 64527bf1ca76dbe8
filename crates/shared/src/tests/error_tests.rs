use super::*;

#[test]
fn detail_body_is_accepted_with_code() {
    let body: ApiError =
        serde_json::from_str(r#"{"code":"not_found","detail":"job not found"}"#).expect("decode");

    assert_eq!(body.code, Some(ErrorCode::NotFound));
    assert_eq!(body.human_message(), Some("job not found"));
}

#[test]
fn message_wins_over_detail() {
    let body: ApiError = serde_json::from_str(
        r#"{"code":"rate_limited","message":" slow down ","detail":"429"}"#,
    )
    .expect("decode");

    assert_eq!(body.code, Some(ErrorCode::RateLimited));
    assert_eq!(body.human_message(), Some("slow down"));
}

#[test]
fn blank_message_falls_back_to_detail() {
    let body: ApiError =
        serde_json::from_str(r#"{"message":"  ","detail":"conflict"}"#).expect("decode");
    assert_eq!(body.human_message(), Some("conflict"));
}

#[test]
fn constructed_body_serializes_without_detail() {
    let body = ApiError::new(ErrorCode::Conflict, "stale update");
    assert_eq!(
        serde_json::to_string(&body).expect("encode"),
        r#"{"code":"conflict","message":"stale update"}"#
    );
}
