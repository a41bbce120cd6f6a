//! Fixture documents and checkpoints shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

pub const TITLE: &str = "Annual Report on Regional Water Quality";
pub const TYPO_TITLE: &str = "Annual Reprot on Regional Water Quality";
pub const CONFIDENTIAL: &str = "Confidential draft for internal review";

/// Which font a text run is set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    /// Composite font without a ToUnicode map.
    Cid,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
            Face::Cid => "F3",
        }
    }
}

/// One `BT .. ET` text run.
#[derive(Debug, Clone)]
pub struct Run {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub face: Face,
}

pub fn run(text: &str, x: f32, y: f32, size: f32, face: Face) -> Run {
    Run {
        text: text.to_string(),
        x,
        y,
        size,
        face,
    }
}

/// Write a US Letter PDF with one page per entry of `pages`.
pub fn write_pdf(path: &Path, pages: &[Vec<Run>]) {
    write_pages(path, pages, None);
}

/// Like [`write_pdf`], but every page's text is drawn inside
/// `q <cm> cm ... Q`.
pub fn write_transformed_pdf(path: &Path, pages: &[Vec<Run>], cm: [f32; 6]) {
    write_pages(path, pages, Some(cm));
}

fn write_pages(path: &Path, pages: &[Vec<Run>], cm: Option<[f32; 6]>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let cid = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "EmbeddedSans",
        "Encoding" => "Identity-H",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
            "F3" => cid,
        },
    });

    let mut kids = Vec::new();
    for runs in pages {
        let mut operations = Vec::new();
        if let Some(cm) = cm {
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new("cm", cm.iter().map(|v| Object::Real(*v)).collect()));
        }
        for run in runs {
            let bytes = match run.face {
                Face::Cid => run
                    .text
                    .chars()
                    .flat_map(|c| (c as u16).to_be_bytes())
                    .collect::<Vec<u8>>(),
                _ => run.text.as_bytes().to_vec(),
            };
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(run.face.resource().as_bytes().to_vec()), Object::Real(run.size)],
            ));
            operations.push(Operation::new("Td", vec![Object::Real(run.x), Object::Real(run.y)]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(bytes)]));
            operations.push(Operation::new("ET", vec![]));
        }
        if cm.is_some() {
            operations.push(Operation::new("Q", vec![]));
        }
        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog);
    doc.save(path).unwrap();
}

/// Title page: a large bold title above three regular blocks.
pub fn title_page() -> Vec<Run> {
    vec![
        run(TITLE, 72.0, 700.0, 24.0, Face::Bold),
        run("Prepared by the Environmental Monitoring Office", 72.0, 600.0, 11.0, Face::Regular),
        run("Summary of findings for the year", 72.0, 500.0, 11.0, Face::Regular),
        run("Contact: office@example.org", 72.0, 400.0, 11.0, Face::Regular),
    ]
}

/// Three page report: title page, a page repeating the title as a header
/// above a confidential note, and a page with a misspelled title.
pub fn report_pages() -> Vec<Vec<Run>> {
    vec![
        title_page(),
        vec![
            run(TITLE, 72.0, 750.0, 12.0, Face::Regular),
            run(CONFIDENTIAL, 72.0, 650.0, 11.0, Face::Regular),
        ],
        vec![
            run(TYPO_TITLE, 72.0, 750.0, 12.0, Face::Regular),
            run("Water samples were collected monthly", 72.0, 650.0, 11.0, Face::Regular),
        ],
    ]
}

pub fn write_report(dir: &Path) -> PathBuf {
    let path = dir.join("report.pdf");
    write_pdf(&path, &report_pages());
    path
}

/// Checkpoint whose logistic model prefers the block with the largest area.
pub fn write_checkpoint(dir: &Path) -> PathBuf {
    let path = dir.join("models.json");
    let checkpoint = serde_json::json!({
        "models": [
            {
                "kind": "logistic",
                "coefficients": [0.0, 0.0, -2.0, 0.0, 0.0],
                "intercept": 2.0
            },
            {
                "kind": "logistic",
                "coefficients": [0.0, -0.5, -1.0, 0.01, 0.0],
                "intercept": 1.0
            }
        ]
    });
    fs::write(&path, serde_json::to_vec_pretty(&checkpoint).unwrap()).unwrap();
    path
}
