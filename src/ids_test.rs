use super::*;

// --- PageId ---

#[test]
fn activity_page_ids_are_zero_padded() {
    assert_eq!(PageId::activity(1).as_str(), "page:IA-01");
    assert_eq!(PageId::activity(9).as_str(), "page:IA-09");
    assert_eq!(PageId::activity(12).as_str(), "page:IA-12");
}

#[test]
fn activity_page_names_match_ids() {
    assert_eq!(activity_page_name(1), "IA-01");
    assert_eq!(activity_page_name(42), "IA-42");
}

#[test]
fn activity_ids_sort_in_cohort_order() {
    let mut ids: Vec<PageId> = (1..=12).rev().map(PageId::activity).collect();
    ids.sort();
    let expected: Vec<PageId> = (1..=12).map(PageId::activity).collect();
    assert_eq!(ids, expected);
}

#[test]
fn activity_marker_detection() {
    assert!(PageId::activity(3).has_activity_marker());
    assert!(PageId::new("page:IA-legacy").has_activity_marker());
    assert!(!PageId::new("page:whiteboard").has_activity_marker());
    assert!(!PageId::new("page:ia-01").has_activity_marker());
}

#[test]
fn activity_index_round_trips() {
    assert_eq!(PageId::activity(7).activity_index(), Some(7));
    assert_eq!(PageId::new("page:IA-00").activity_index(), None);
    assert_eq!(PageId::new("page:IA-xx").activity_index(), None);
    assert_eq!(PageId::new("page:whiteboard").activity_index(), None);
}

#[test]
fn page_id_display_is_raw_id() {
    assert_eq!(PageId::activity(2).to_string(), "page:IA-02");
}

#[test]
fn generated_shape_and_asset_ids_are_unique_and_prefixed() {
    let a = ShapeId::generate();
    let b = ShapeId::generate();
    assert_ne!(a, b);
    assert!(a.to_string().starts_with("shape:"));
    assert!(AssetId::generate().to_string().starts_with("asset:"));
}

// --- OccupantId / Role ---

#[test]
fn occupant_ids_are_lowercased() {
    assert_eq!(OccupantId::new("Ana").as_str(), "ana");
    assert_eq!(OccupantId::new("BEN"), OccupantId::new("ben"));
    assert_eq!(Occupant::new("Cy", "participant").id(), OccupantId::new("cy"));
}

#[test]
fn role_parse_accepts_known_roles_only() {
    assert_eq!(Role::parse("moderator"), Some(Role::Moderator));
    assert_eq!(Role::parse(" Participant "), Some(Role::Participant));
    assert_eq!(Role::parse("visitor"), None);
    assert_eq!(Role::parse(""), None);
}

#[test]
fn role_counterpart_swaps() {
    assert_eq!(Role::Moderator.counterpart(), Role::Participant);
    assert_eq!(Role::Participant.counterpart(), Role::Moderator);
}

#[test]
fn view_context_serializes_camel_case() {
    let json = serde_json::to_string(&ViewContext::SidebarPreview).unwrap();
    assert_eq!(json, "\"sidebarPreview\"");
}

// --- ImageRef ---

#[test]
fn image_ref_accepts_http_and_https() {
    assert!(ImageRef::parse("https://cdn.example.com/slide-1.png").is_ok());
    assert!(ImageRef::parse("http://localhost:5001/static/a.png").is_ok());
}

#[test]
fn image_ref_trims_whitespace() {
    let image = ImageRef::parse("  https://cdn.example.com/a.png ").unwrap();
    assert_eq!(image.as_str(), "https://cdn.example.com/a.png");
}

#[test]
fn image_ref_rejects_relative_paths() {
    let err = ImageRef::parse("/static/a.png").unwrap_err();
    assert_eq!(err.reference, "/static/a.png");
}

#[test]
fn image_ref_rejects_other_schemes() {
    let err = ImageRef::parse("file:///tmp/a.png").unwrap_err();
    assert!(err.reason.contains("file"));
    assert!(ImageRef::parse("data:image/png;base64,AAAA").is_err());
}
