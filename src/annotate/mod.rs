//! Visual and destructive marking of located text.
//!
//! Text markup and frames are added as page annotations and leave the
//! content stream untouched. Redaction rewrites the page content: every text
//! operator painting inside an occurrence is emptied and an opaque rectangle
//! is drawn over the occurrence.

mod action;

pub use action::AnnotationAction;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::model::{BoundingBox, MatchResult};
use crate::parser::{LayoutExtractor, LopdfBackend, PageId, PdfBackend};

/// Applies annotation actions to an opened document.
pub struct Annotator {
    extractor: LayoutExtractor<LopdfBackend>,
}

impl Annotator {
    /// Open a PDF for annotation.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            extractor: LayoutExtractor::open(path)?,
        })
    }

    /// Wrap an already loaded document.
    pub fn from_backend(backend: LopdfBackend) -> Self {
        Self {
            extractor: LayoutExtractor::new(backend),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.extractor.page_count()
    }

    /// Apply `action` to every occurrence of each value on a page (1-indexed).
    ///
    /// Returns the number of occurrences processed.
    pub fn annotate_page(&mut self, page: u32, values: &[String], action: AnnotationAction) -> Result<usize> {
        let layout = self.extractor.page_layout(page)?;
        let page_id = self.extractor.backend().page_id(page)?;

        let occurrences: Vec<Vec<BoundingBox>> = values
            .iter()
            .flat_map(|value| layout.locate(value))
            .filter(|rects| !rects.is_empty())
            .collect();
        if occurrences.is_empty() {
            return Ok(0);
        }

        match action {
            AnnotationAction::Redact => {
                let rects: Vec<BoundingBox> = occurrences.iter().flatten().copied().collect();
                let ops: BTreeSet<usize> = layout
                    .spans()
                    .filter(|span| rects.iter().any(|r| r.intersects(&span.bbox())))
                    .map(|span| span.op_index)
                    .collect();
                self.redact(page_id, &ops, &rects)?;
            }
            _ => {
                for rects in &occurrences {
                    let annot = annotation_dict(page_id, rects, action);
                    self.add_annotation(page_id, annot)?;
                }
            }
        }

        log::debug!(
            "Page {}: {} {} occurrence(s)",
            page,
            action,
            occurrences.len()
        );
        Ok(occurrences.len())
    }

    fn add_annotation(&mut self, page_id: PageId, annot: Dictionary) -> Result<()> {
        let doc = self.extractor.backend_mut().raw_doc_mut();
        let annot_id = doc.add_object(annot);

        let existing = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();
        match existing {
            Some(Object::Reference(array_id)) => {
                doc.get_object_mut(array_id)?
                    .as_array_mut()?
                    .push(Object::Reference(annot_id));
            }
            Some(Object::Array(mut annots)) => {
                annots.push(Object::Reference(annot_id));
                doc.get_dictionary_mut(page_id)?.set("Annots", annots);
            }
            _ => {
                doc.get_dictionary_mut(page_id)?
                    .set("Annots", vec![Object::Reference(annot_id)]);
            }
        }
        Ok(())
    }

    fn redact(&mut self, page_id: PageId, ops: &BTreeSet<usize>, rects: &[BoundingBox]) -> Result<()> {
        let data = self.extractor.backend().page_content(page_id)?;
        let mut content = Content::decode(&data)?;

        for index in ops {
            let Some(op) = content.operations.get_mut(*index) else {
                continue;
            };
            let slot = match op.operator.as_str() {
                "Tj" | "'" => op.operands.get_mut(0),
                "\"" => op.operands.get_mut(2),
                "TJ" => {
                    if let Some(operand) = op.operands.get_mut(0) {
                        *operand = Object::Array(Vec::new());
                    }
                    None
                }
                _ => None,
            };
            if let Some(operand) = slot {
                *operand = Object::string_literal(Vec::<u8>::new());
            }
        }

        // Isolate the page's own graphics state so the fill is drawn in
        // default user space, where the occurrence rectangles are.
        content.operations.insert(0, Operation::new("q", vec![]));
        content.operations.push(Operation::new("Q", vec![]));
        content.operations.push(Operation::new("q", vec![]));
        content.operations.push(Operation::new(
            "rg",
            vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
        ));
        for rect in rects {
            content.operations.push(Operation::new(
                "re",
                vec![
                    Object::Real(rect.x1),
                    Object::Real(rect.y1),
                    Object::Real(rect.width()),
                    Object::Real(rect.height()),
                ],
            ));
        }
        content.operations.push(Operation::new("f", vec![]));
        content.operations.push(Operation::new("Q", vec![]));

        let encoded = content.encode()?;
        let doc = self.extractor.backend_mut().raw_doc_mut();
        let stream_id: ObjectId = doc.add_object(Stream::new(Dictionary::new(), encoded));
        doc.get_dictionary_mut(page_id)?
            .set("Contents", Object::Reference(stream_id));
        Ok(())
    }

    /// Write the document to `path`.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.extractor.backend_mut().raw_doc_mut().save(path)?;
        Ok(())
    }
}

fn annotation_dict(page_id: PageId, rects: &[BoundingBox], action: AnnotationAction) -> Dictionary {
    let bounds = rects
        .iter()
        .copied()
        .reduce(|a, b| a.union(&b))
        .unwrap_or_default();
    let color: Vec<Object> = action.color().iter().map(|c| Object::Real(*c)).collect();

    let mut annot = dictionary! {
        "Type" => "Annot",
        "Rect" => vec![
            Object::Real(bounds.x1),
            Object::Real(bounds.y1),
            Object::Real(bounds.x2),
            Object::Real(bounds.y2),
        ],
        "C" => color,
        "F" => Object::Integer(4),
        "P" => Object::Reference(page_id),
    };

    match action.markup_subtype() {
        Some(subtype) => {
            annot.set("Subtype", Object::Name(subtype.as_bytes().to_vec()));
            // Quad order: upper-left, upper-right, lower-left, lower-right.
            let quads: Vec<Object> = rects
                .iter()
                .flat_map(|r| [r.x1, r.y2, r.x2, r.y2, r.x1, r.y1, r.x2, r.y1])
                .map(Object::Real)
                .collect();
            annot.set("QuadPoints", quads);
        }
        None => {
            annot.set("Subtype", Object::Name(b"Square".to_vec()));
            annot.set("BS", dictionary! { "W" => Object::Integer(1) });
        }
    }
    annot
}

/// Apply `action` to the raw text of every match and overwrite the file.
///
/// Returns the total number of occurrences processed.
pub fn annotate_file<P: AsRef<Path>>(path: P, matches: &[MatchResult], action: AnnotationAction) -> Result<usize> {
    let path = path.as_ref();
    if matches.is_empty() {
        return Ok(0);
    }

    let mut by_page: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for m in matches {
        let values = by_page.entry(m.page).or_default();
        if !values.contains(&m.raw_text) {
            values.push(m.raw_text.clone());
        }
    }

    let mut annotator = Annotator::open(path)?;
    let page_count = annotator.page_count();
    let mut total = 0;
    for (page, values) in &by_page {
        if *page == 0 || *page > page_count {
            return Err(Error::PageOutOfRange(*page, page_count));
        }
        total += annotator.annotate_page(*page, values, action)?;
    }
    annotator.save(path)?;

    log::info!("Applied {} to {} occurrence(s) in {}", action, total, path.display());
    Ok(total)
}
