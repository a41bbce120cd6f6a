//! Integration tests for annotation and redaction.

mod common;

use common::{CONFIDENTIAL, TITLE};
use doccheck::{annotate_file, AnnotationAction, Annotator, Error, LayoutExtractor, MatchResult};
use lopdf::{Document, Object};

fn page_annotations(path: &std::path::Path, page: u32) -> Vec<lopdf::Dictionary> {
    let doc = Document::load(path).unwrap();
    let page_id = doc.get_pages()[&page];
    let page_dict = doc.get_dictionary(page_id).unwrap();
    let annots = match page_dict.get(b"Annots") {
        Ok(Object::Array(annots)) => annots.clone(),
        Ok(Object::Reference(id)) => doc.get_object(*id).unwrap().as_array().unwrap().clone(),
        _ => Vec::new(),
    };
    annots
        .iter()
        .map(|a| doc.get_dictionary(a.as_reference().unwrap()).unwrap().clone())
        .collect()
}

fn subtype(annot: &lopdf::Dictionary) -> String {
    String::from_utf8_lossy(annot.get(b"Subtype").unwrap().as_name().unwrap()).into_owned()
}

#[test]
fn test_highlight_adds_markup_and_keeps_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_report(dir.path());
    let out = dir.path().join("highlighted.pdf");

    let mut annotator = Annotator::open(&path).unwrap();
    let count = annotator
        .annotate_page(1, &[TITLE.to_string()], AnnotationAction::Highlight)
        .unwrap();
    assert_eq!(count, 1);
    annotator.save(&out).unwrap();

    let annots = page_annotations(&out, 1);
    assert_eq!(annots.len(), 1);
    assert_eq!(subtype(&annots[0]), "Highlight");
    assert_eq!(annots[0].get(b"QuadPoints").unwrap().as_array().unwrap().len(), 8);

    let layout = LayoutExtractor::open(&out).unwrap().page_layout(1).unwrap();
    assert_eq!(layout.locate(TITLE).len(), 1);
}

fn shifted_page(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("shifted.pdf");
    let page = vec![common::run("Annual Report on Water", 72.0, 700.0, 12.0, common::Face::Regular)];
    common::write_transformed_pdf(&path, &[page], [1.0, 0.0, 0.0, 1.0, 200.0, 0.0]);
    path
}

fn numbers(objects: &[Object]) -> Vec<f32> {
    objects.iter().map(|o| o.as_float().unwrap()).collect()
}

#[test]
fn test_highlight_rect_follows_page_transform() {
    let dir = tempfile::tempdir().unwrap();
    let path = shifted_page(dir.path());

    let mut annotator = Annotator::open(&path).unwrap();
    let count = annotator
        .annotate_page(1, &["Annual Report on Water".to_string()], AnnotationAction::Highlight)
        .unwrap();
    assert_eq!(count, 1);
    annotator.save(&path).unwrap();

    let annots = page_annotations(&path, 1);
    let rect = numbers(annots[0].get(b"Rect").unwrap().as_array().unwrap());
    // text is painted at x = 72 + 200
    assert!((rect[0] - 272.0).abs() < 1.0, "rect = {:?}", rect);
    assert!(rect[1] < 700.0 && rect[3] > 700.0);
}

#[test]
fn test_redaction_fill_is_in_page_space() {
    let dir = tempfile::tempdir().unwrap();
    let path = shifted_page(dir.path());

    let mut annotator = Annotator::open(&path).unwrap();
    annotator
        .annotate_page(1, &["Annual Report on Water".to_string()], AnnotationAction::Redact)
        .unwrap();
    annotator.save(&path).unwrap();

    let doc = Document::load(&path).unwrap();
    let page_id = doc.get_pages()[&1];
    let content = lopdf::content::Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    let ops = &content.operations;
    assert_eq!(ops[0].operator, "q");
    let fill = ops.iter().position(|op| op.operator == "re").unwrap();
    // every save before the fill has been restored
    let depth: i32 = ops[..fill]
        .iter()
        .map(|op| match op.operator.as_str() {
            "q" => 1,
            "Q" => -1,
            _ => 0,
        })
        .sum();
    assert_eq!(depth, 1);
    let rect = numbers(&ops[fill].operands);
    assert!((rect[0] - 272.0).abs() < 1.0, "re = {:?}", rect);
}

#[test]
fn test_frame_is_square_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_report(dir.path());

    let mut annotator = Annotator::open(&path).unwrap();
    annotator
        .annotate_page(2, &[CONFIDENTIAL.to_string()], AnnotationAction::Frame)
        .unwrap();
    annotator.save(&path).unwrap();

    let annots = page_annotations(&path, 2);
    assert_eq!(annots.len(), 1);
    assert_eq!(subtype(&annots[0]), "Square");
    assert!(annots[0].get(b"QuadPoints").is_err());
}

#[test]
fn test_repeated_annotation_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_report(dir.path());

    for action in [AnnotationAction::Underline, AnnotationAction::Strikeout] {
        let mut annotator = Annotator::open(&path).unwrap();
        annotator.annotate_page(2, &[TITLE.to_string()], action).unwrap();
        annotator.save(&path).unwrap();
    }

    let subtypes: Vec<String> = page_annotations(&path, 2).iter().map(subtype).collect();
    assert_eq!(subtypes, vec!["Underline", "StrikeOut"]);
}

#[test]
fn test_redact_removes_every_occurrence() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_report(dir.path());

    let before = LayoutExtractor::open(&path).unwrap().page_layout(2).unwrap();
    let occurrences = before.locate(CONFIDENTIAL).len();
    assert_eq!(occurrences, 1);

    let mut annotator = Annotator::open(&path).unwrap();
    let count = annotator
        .annotate_page(2, &[CONFIDENTIAL.to_string()], AnnotationAction::Redact)
        .unwrap();
    assert_eq!(count, occurrences);
    annotator.save(&path).unwrap();

    let after = LayoutExtractor::open(&path).unwrap().page_layout(2).unwrap();
    assert!(after.locate(CONFIDENTIAL).is_empty());
    assert!(after.locate("Confidential").is_empty());
    // the header line above is untouched
    assert_eq!(after.locate(TITLE).len(), 1);
    assert!(page_annotations(&path, 2).is_empty());
}

#[test]
fn test_missing_text_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_report(dir.path());

    let mut annotator = Annotator::open(&path).unwrap();
    let count = annotator
        .annotate_page(1, &["Not in this document".to_string()], AnnotationAction::Highlight)
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_annotate_file_from_matches() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_report(dir.path());

    let matches = doccheck::locate_title(&path, TITLE).unwrap();
    let count = annotate_file(&path, &matches, AnnotationAction::Highlight).unwrap();
    assert_eq!(count, matches.len());
    for page in 1..=3 {
        assert_eq!(page_annotations(&path, page).len(), 1, "page {}", page);
    }
}

#[test]
fn test_annotate_file_rejects_bad_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_report(dir.path());

    let mut matches = doccheck::locate_title(&path, TITLE).unwrap();
    matches.truncate(1);
    let bogus = MatchResult {
        page: 9,
        ..matches[0].clone()
    };
    let result = annotate_file(&path, &[bogus], AnnotationAction::Highlight);
    assert!(matches!(result, Err(Error::PageOutOfRange(9, 3))));
}
