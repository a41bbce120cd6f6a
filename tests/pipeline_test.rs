//! Integration tests for the processing pipeline.

mod common;

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{CONFIDENTIAL, TITLE};
use doccheck::pipeline::{MemoryDocumentStore, MemoryProgressStore, PageRenderer};
use doccheck::{
    AnnotationAction, DocumentRecord, JobState, Pipeline, PipelineConfig, Scheduled, Task,
    WorkerPool,
};

/// Writes placeholder PNGs instead of rasterizing.
struct FakeRenderer {
    pages: u32,
    calls: AtomicU32,
}

impl FakeRenderer {
    fn new(pages: u32) -> Self {
        Self {
            pages,
            calls: AtomicU32::new(0),
        }
    }
}

impl PageRenderer for FakeRenderer {
    fn render(&self, _pdf: &Path, out_dir: &Path, prefix: &str) -> doccheck::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for page in 1..=self.pages {
            fs::write(out_dir.join(format!("{}-{}.png", prefix, page)), format!("png {}", page))?;
        }
        Ok(())
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    pipeline: Arc<Pipeline>,
    renderer: Arc<FakeRenderer>,
}

fn fixture(pages: &[Vec<common::Run>], rendered: u32, max_polls: Option<u32>) -> Fixture {
    fixture_with_poll(pages, rendered, max_polls, Duration::ZERO)
}

fn fixture_with_poll(
    pages: &[Vec<common::Run>],
    rendered: u32,
    max_polls: Option<u32>,
    poll: Duration,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    common::write_pdf(&dir.path().join("job.pdf"), pages);
    let model = common::write_checkpoint(dir.path());

    let config = PipelineConfig::new()
        .with_model_path(model)
        .with_work_dir(dir.path().join("work"))
        .with_max_attach_polls(max_polls)
        .with_delays(Duration::ZERO, poll, Duration::ZERO);
    let renderer = Arc::new(FakeRenderer::new(rendered));
    let pipeline = Arc::new(Pipeline::new(
        config,
        Arc::new(MemoryProgressStore::new()),
        Arc::new(MemoryDocumentStore::new()),
        renderer.clone(),
    ));
    Fixture {
        dir,
        pipeline,
        renderer,
    }
}

/// Run tasks in submission order until none are left.
fn drain(pipeline: &Pipeline, first: Scheduled) -> Vec<Task> {
    let mut queue = VecDeque::from([first]);
    let mut executed = Vec::new();
    while let Some(scheduled) = queue.pop_front() {
        let follow_ups = pipeline.execute(&scheduled.task).unwrap_or_default();
        executed.push(scheduled.task);
        queue.extend(follow_ups);
        assert!(executed.len() < 100, "pipeline did not settle");
    }
    executed
}

fn submit(fixture: &Fixture) -> Scheduled {
    let path = fixture.dir.path().join("job.pdf");
    fixture
        .pipeline
        .submit(DocumentRecord::new("job", path))
        .unwrap()
        .expect("fresh record is scheduled")
}

#[test]
fn test_happy_path_completes_with_images() {
    let fixture = fixture(&common::report_pages(), 3, Some(5));
    let first = submit(&fixture);
    let executed = drain(&fixture.pipeline, first);

    assert!(matches!(executed[0], Task::StartProcessing { .. }));
    assert!(matches!(executed[1], Task::ExtractFeatures { .. }));
    assert_eq!(fixture.renderer.calls.load(Ordering::SeqCst), 1);

    let record = fixture.pipeline.documents().get("job").unwrap();
    assert_eq!(record.state, JobState::Complete);
    assert_eq!(record.ideal_title.as_deref(), Some(TITLE));
    assert_eq!(record.text_locations.len(), 3);
    let names: Vec<&str> = record.images.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["job-1.png", "job-2.png", "job-3.png"]);
    assert_eq!(record.images[1].data, b"png 2");
    assert_eq!(record.preview().map(|i| i.order), Some(1));

    let status = fixture.pipeline.status("job").unwrap();
    assert_eq!((status.processed, status.total), (3, 3));
    assert!(status.features_loaded);
    assert!(!status.error);
    assert!(status.is_finished());

    // job scratch directory is cleaned up
    assert!(!fixture.dir.path().join("work").join("job").exists());
}

#[test]
fn test_matches_are_annotated_in_place() {
    let fixture = fixture(&common::report_pages(), 3, Some(5));
    let first = submit(&fixture);
    drain(&fixture.pipeline, first);

    let doc = lopdf::Document::load(fixture.dir.path().join("job.pdf")).unwrap();
    for (_, page_id) in doc.get_pages() {
        let page = doc.get_dictionary(page_id).unwrap();
        assert!(page.get(b"Annots").is_ok());
    }
}

#[test]
fn test_scanned_document_reports_error_and_still_renders() {
    let page = vec![common::run("Scanned by the archive", 72.0, 700.0, 11.0, common::Face::Regular)];
    let fixture = fixture(&[page], 1, Some(5));
    let first = submit(&fixture);
    drain(&fixture.pipeline, first);

    let status = fixture.pipeline.status("job").unwrap();
    assert!(status.error);
    assert!(status.error_description.contains("Scanned document"));
    assert!(status.features_loaded);

    let record = fixture.pipeline.documents().get("job").unwrap();
    assert_eq!(record.ideal_title, None);
    assert!(record.text_locations.is_empty());
    assert_eq!(record.state, JobState::Complete);
    assert_eq!(record.images.len(), 1);
}

#[test]
fn test_unreadable_file_fails_extraction() {
    let fixture = fixture(&common::report_pages(), 1, Some(5));
    let path = fixture.dir.path().join("broken.pdf");
    fs::write(&path, b"%PDF-1.4\nthis is not a pdf body").unwrap();

    let first = fixture
        .pipeline
        .submit(DocumentRecord::new("broken", path))
        .unwrap()
        .unwrap();
    let executed = drain(&fixture.pipeline, first);

    // extraction is skipped, image stages still run
    assert!(!executed.iter().any(|t| matches!(t, Task::ExtractFeatures { .. })));
    let status = fixture.pipeline.status("broken").unwrap();
    assert!(status.error);
    assert!(status.features_loaded);
    assert_eq!(
        fixture.pipeline.documents().get("broken").unwrap().state,
        JobState::Complete
    );
}

#[test]
fn test_missing_images_end_in_rendering_failed() {
    let fixture = fixture(&common::report_pages(), 0, Some(3));
    let first = submit(&fixture);
    let executed = drain(&fixture.pipeline, first);

    let attaches = executed
        .iter()
        .filter(|t| matches!(t, Task::AttachRenderedImages { .. }))
        .count();
    assert_eq!(attaches, 4);

    let record = fixture.pipeline.documents().get("job").unwrap();
    assert_eq!(record.state, JobState::RenderingFailed);
    assert!(record.images.is_empty());
    // title detection is unaffected
    assert_eq!(record.ideal_title.as_deref(), Some(TITLE));
    assert!(!fixture.pipeline.status("job").unwrap().error);
}

/// Leaves a directory where the only page image should be.
struct BrokenRenderer;

impl PageRenderer for BrokenRenderer {
    fn render(&self, _pdf: &Path, out_dir: &Path, prefix: &str) -> doccheck::Result<()> {
        fs::create_dir_all(out_dir.join(format!("{}-1.png", prefix)))?;
        Ok(())
    }
}

#[test]
fn test_unreadable_page_image_is_retried_until_bound() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.pdf");
    let page = vec![common::run("Scanned by the archive", 72.0, 700.0, 11.0, common::Face::Regular)];
    common::write_pdf(&path, &[page]);
    let config = PipelineConfig::new()
        .with_model_path(common::write_checkpoint(dir.path()))
        .with_work_dir(dir.path().join("work"))
        .with_max_attach_polls(Some(3))
        .without_delays();
    let pipeline = Pipeline::new(
        config,
        Arc::new(MemoryProgressStore::new()),
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(BrokenRenderer),
    );

    let first = pipeline.submit(DocumentRecord::new("job", path)).unwrap().unwrap();
    let executed = drain(&pipeline, first);
    assert!(matches!(executed.last(), Some(Task::AttachRenderedImages { .. })));

    let record = pipeline.documents().get("job").unwrap();
    assert_eq!(record.state, JobState::RenderingFailed);
    assert!(!dir.path().join("work").join("job").exists());
}

#[test]
fn test_processed_record_is_not_resubmitted() {
    let fixture = fixture(&common::report_pages(), 3, Some(5));
    let first = submit(&fixture);
    drain(&fixture.pipeline, first);

    let record = fixture.pipeline.documents().get("job").unwrap();
    assert!(fixture.pipeline.submit(record).unwrap().is_none());
}

#[test]
fn test_update_title_rematches() {
    let fixture = fixture(&common::report_pages(), 3, Some(5));
    let first = submit(&fixture);
    drain(&fixture.pipeline, first);

    let follow_ups = fixture
        .pipeline
        .execute(&Task::UpdateTitle {
            id: "job".into(),
            title: CONFIDENTIAL.into(),
        })
        .unwrap();
    assert!(follow_ups.is_empty());

    let record = fixture.pipeline.documents().get("job").unwrap();
    assert_eq!(record.ideal_title.as_deref(), Some(CONFIDENTIAL));
    assert_eq!(record.text_locations.len(), 1);
    assert_eq!(record.text_locations[0].page, 2);
    assert_eq!(record.state, JobState::Complete);
    assert!(fixture.pipeline.status("job").unwrap().features_loaded);
}

#[test]
fn test_unknown_job_status_is_not_found() {
    let fixture = fixture(&common::report_pages(), 3, Some(5));
    assert!(matches!(
        fixture.pipeline.status("nope"),
        Err(doccheck::Error::TaskNotFound(_))
    ));
}

#[test]
fn test_worker_pool_runs_job_to_completion() {
    // rendering and attachment may overlap on separate workers
    let fixture = fixture_with_poll(&common::report_pages(), 3, Some(200), Duration::from_millis(10));
    let config = fixture.pipeline.config().clone();
    assert_eq!(config.highlight_action, AnnotationAction::Highlight);

    let pool = WorkerPool::new(fixture.pipeline.clone(), 3).unwrap();
    pool.submit(submit(&fixture)).unwrap();
    assert!(pool.wait_idle(Duration::from_secs(30)));
    pool.shutdown();

    let record = fixture.pipeline.documents().get("job").unwrap();
    assert_eq!(record.state, JobState::Complete);
    assert_eq!(record.images.len(), 3);
}
