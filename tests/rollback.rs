//! 回滚集成测试

mod common;

use inpage_translate::parsers::html::dom::{detach, find_first};
use inpage_translate::parsers::serialize_document;
use inpage_translate::translation::core::MutationKind;
use inpage_translate::translation::{SessionState, TranslateController};
use inpage_translate::DocumentAccessor;

use common::{original_text, upper, Harness};

const PAGE: &str = "<html><head><title>t</title></head><body>\
    <h1>Title</h1>\
    <p>Hello <b>world</b>!</p>\
    <p>Click <a href=\"#x\">here</a> to <em>continue</em> reading</p>\
    <ul><li>one</li><li>two <i>2</i> x</li></ul>\
    <p>plain</p>\
    </body></html>";

fn serialized(h: &Harness) -> String {
    let bytes = serialize_document(h.engine.document().dom(), "utf-8").unwrap();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn test_revert_restores_the_original_markup() {
    let mut h = Harness::new(PAGE, &["en", "ko"]);
    let before = serialized(&h);

    h.start("en", "ko");
    h.respond_all(upper);
    assert_eq!(h.engine.state(), SessionState::Completed);
    assert_ne!(serialized(&h), before);
    assert!(serialized(&h).contains("<font>"));

    let report = h.engine.revert();
    assert!(report.failures.is_empty());
    assert!(report.restored() > 0);
    assert_eq!(h.engine.state(), SessionState::RolledBack);
    assert_eq!(serialized(&h), before);
}

#[test]
fn test_simple_units_get_their_original_nodes_back() {
    let mut h = Harness::new("<p>plain</p>", &["en", "ko"]);
    h.start("en", "ko");
    let original = h.engine.session().sets()[0].units[0].node.clone();
    h.respond_all(upper);

    h.engine.revert();
    let p = find_first(&h.body(), "p").unwrap();
    let restored = p.children.borrow()[0].clone();
    assert!(std::rc::Rc::ptr_eq(&restored, &original));
}

#[test]
fn test_revert_mid_translation_drops_late_responses() {
    let mut h = Harness::new(PAGE, &["en", "ko"]);
    h.start("en", "ko");
    let (id, _) = h.backend.last_sent().expect("first request");

    h.engine.revert();
    assert_eq!(h.engine.outstanding(), 0);

    h.backend.respond_with(id, upper);
    h.engine.pump();
    assert_eq!(h.body_text(), original_text(PAGE));
}

#[test]
fn test_stale_response_after_revert_does_not_reach_next_session() {
    let page = "<p>one</p><p>two</p>";
    let mut h = Harness::new(page, &["en", "ko", "ja"]);
    h.start("en", "ko");
    let (stale, _) = h.backend.last_sent().expect("first session request");
    h.engine.revert();

    h.start("en", "ja");
    let (current, request) = h.backend.last_sent().expect("second session request");
    assert_ne!(current, stale);
    assert_eq!(request.target, "ja");

    h.backend
        .respond(stale, vec!["KO-0".to_string(), "KO-1".to_string()]);
    h.engine.pump();
    assert_eq!(h.body_text(), "onetwo");
    assert_eq!(h.engine.outstanding(), 2);

    h.backend
        .respond(current, vec!["JA-0".to_string(), "JA-1".to_string()]);
    h.engine.pump();
    assert_eq!(h.body_text(), "JA-0JA-1");
    assert_eq!(h.engine.state(), SessionState::Completed);
}

#[test]
fn test_revert_stops_watching_mutations() {
    let mut h = Harness::new("<p>first</p>", &["en", "ko"]);
    h.start("en", "ko");
    h.respond_all(upper);
    assert!(h.log.is_observing());

    h.engine.revert();
    assert!(!h.log.is_observing());
    assert!(!h.log.record(MutationKind::ChildList, &h.body()));
}

#[test]
fn test_detached_content_is_skipped_on_revert() {
    let mut h = Harness::new("<p>one</p><div>two</div>", &["en", "ko"]);
    h.start("en", "ko");
    h.respond_all(upper);

    let div = find_first(&h.body(), "div").unwrap();
    detach(&div);

    let report = h.engine.revert();
    assert_eq!(report.skipped_detached, 1);
    assert_eq!(h.body_text(), "one");
}

#[test]
fn test_translate_again_after_revert() {
    let mut h = Harness::new(PAGE, &["en", "ko"]);
    h.start("en", "ko");
    h.respond_all(upper);
    h.engine.revert();

    h.start("en", "ko");
    assert_eq!(h.engine.state(), SessionState::Translating);
    h.respond_all(|t| format!("{}.", t));
    assert_eq!(h.engine.state(), SessionState::Completed);
    assert!(h.body_text().contains("plain."));

    h.engine.revert();
    assert_eq!(h.body_text(), original_text(PAGE));
}

#[test]
fn test_controller_revert_clears_source_lang() {
    let h = Harness::automatic(PAGE, &["en", "ko"], upper);
    let mut host = TranslateController::new(h.engine);
    assert!(host.translate("en", "ko"));
    host.pump();
    assert_eq!(host.source_lang(), "en");

    let report = host.revert();
    assert!(report.failures.is_empty());
    let body = host.engine().document().body().unwrap();
    assert_eq!(
        inpage_translate::parsers::html::dom::text_content(&body),
        original_text(PAGE)
    );
}
