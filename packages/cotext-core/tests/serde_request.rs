#[cfg(feature = "serde")]
#[test]
fn request_json_roundtrips() {
    use cotext_core::{GotoTransformation, InclusionTransformation, Operation, Request, SiteId, VectorTime};

    let split = GotoTransformation.transform(
        &Operation::delete(2, "2345"),
        &Operation::insert(4, "XY"),
        false,
    );
    let request = Request::new(SiteId::new("alice"), VectorTime::new(3, 1), split);

    let bytes = serde_json::to_vec(&request).expect("serialize Request");
    let json = std::str::from_utf8(&bytes).expect("Request JSON must be UTF-8");
    assert!(
        json.contains("\"Split\"") && json.contains("\"timestamp\""),
        "expected a tagged Split operation, got: {json}"
    );

    let roundtrip: Request = serde_json::from_slice(&bytes).expect("deserialize Request");
    assert_eq!(roundtrip, request);
}
