//! Pipeline – ties asset fetching, normalisation and compositing together
//! behind a run-once [`Compositor`].
//!
//! A run walks `Idle -> TemplateLoaded -> FontsEmbedded -> TextDrawn ->
//! ImagesDrawn -> Serialized -> Done`. Template and font problems end the
//! run in `Failed`; image problems only skip the image.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use crate::assets::{AssetPaths, AssetSource, FetchedAsset};
use crate::error::RenderError;
use crate::fonts::{FontPrograms, FontSet};
use crate::layout_config::{CertificateLayout, ImageSource};
use crate::normalize::{normalize, EmbeddableImage};
use crate::record::CertificateRecord;
use crate::render::{plan_text, CertificateCanvas, RenderReport};
use crate::store::RecordStore;

/// Where a compositor run currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    TemplateLoaded,
    FontsEmbedded,
    TextDrawn,
    ImagesDrawn,
    Serialized,
    Done,
    Failed(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Failed(reason) => write!(f, "Failed({reason})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Lifecycle of a compositor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    NotStarted = 0,
    Running = 1,
    Done = 2,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RunState::NotStarted,
            1 => RunState::Running,
            _ => RunState::Done,
        }
    }
}

/// Result of calling [`Compositor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run happened and the completion callback was invoked.
    Completed,
    /// The compositor had already been triggered; nothing was done.
    AlreadyTriggered,
}

/// A finished certificate.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub report: RenderReport,
}

/// Renders one certificate, once.
pub struct Compositor<A: AssetSource> {
    assets: A,
    paths: AssetPaths,
    layout: CertificateLayout,
    state: AtomicU8,
    stage: Mutex<Stage>,
}

impl<A: AssetSource> Compositor<A> {
    pub fn new(assets: A, paths: AssetPaths, layout: CertificateLayout) -> Self {
        Self {
            assets,
            paths,
            layout,
            state: AtomicU8::new(RunState::NotStarted as u8),
            stage: Mutex::new(Stage::Idle),
        }
    }

    /// Compositor with the stock asset paths and layout.
    pub fn with_defaults(assets: A) -> Self {
        Self::new(assets, AssetPaths::default(), CertificateLayout::default())
    }

    pub fn run_state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stage(&self) -> Stage {
        self.stage.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Render `record` and hand the result to `on_complete`.
    ///
    /// Only the first call on an instance does anything; later calls (from
    /// any thread) return [`RunOutcome::AlreadyTriggered`] without invoking
    /// their callback.
    pub fn run<F>(&self, record: &CertificateRecord, on_complete: F) -> RunOutcome
    where
        F: FnOnce(&Result<RenderOutput, RenderError>),
    {
        if self
            .state
            .compare_exchange(
                RunState::NotStarted as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            log::warn!("compositor already triggered; ignoring request for {}", record.id);
            return RunOutcome::AlreadyTriggered;
        }

        let result = self.composite(record);
        match &result {
            Ok(_) => self.enter(Stage::Done),
            Err(e) => self.enter(Stage::Failed(e.to_string())),
        }
        self.state.store(RunState::Done as u8, Ordering::Release);

        on_complete(&result);
        RunOutcome::Completed
    }

    fn enter(&self, stage: Stage) {
        log::debug!("compositor stage -> {stage}");
        if let Ok(mut current) = self.stage.lock() {
            *current = stage;
        }
    }

    fn fetch_required(&self, what: &str, location: &str) -> Result<FetchedAsset, RenderError> {
        self.assets.fetch(location).map_err(|source| RenderError::Fetch {
            what: format!("{what} ({location})"),
            source,
        })
    }

    fn composite(&self, record: &CertificateRecord) -> Result<RenderOutput, RenderError> {
        let template = self.fetch_required("template", &self.paths.template)?;
        let mut canvas = CertificateCanvas::load_template(&template.bytes)?;
        self.enter(Stage::TemplateLoaded);

        let display = self.fetch_required("display font", &self.paths.display_font)?;
        let body = self.fetch_required("body font", &self.paths.body_font)?;
        let fonts = FontSet::load(FontPrograms {
            display: display.bytes,
            body: body.bytes,
        })?;
        canvas.embed_fonts(&fonts);
        self.enter(Stage::FontsEmbedded);

        canvas.draw_text(&plan_text(record, &self.layout, &fonts), &fonts)?;
        self.enter(Stage::TextDrawn);

        for slot in &self.layout.images {
            let Some(location) = self.image_location(record, slot.source) else {
                continue;
            };
            match self.load_image(&location) {
                Ok(image) => {
                    if let Err(e) = canvas.draw_image(slot, &image, &self.layout) {
                        canvas.skip_image(slot.source, format!("{location}: {e}"));
                    }
                }
                Err(reason) => canvas.skip_image(slot.source, reason),
            }
        }
        self.enter(Stage::ImagesDrawn);

        let (bytes, report) = canvas.finish()?;
        self.enter(Stage::Serialized);

        Ok(RenderOutput {
            bytes,
            file_name: record.output_file_name(),
            report,
        })
    }

    /// Where the pixels for `source` come from, if anywhere.
    fn image_location(&self, record: &CertificateRecord, source: ImageSource) -> Option<String> {
        let url_or_fallback = |url: &Option<String>| {
            url.as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .or_else(|| Some(self.paths.fallback_image.clone()))
        };
        match source {
            ImageSource::Photo => url_or_fallback(&record.photo_url),
            ImageSource::QrCode => url_or_fallback(&record.qr_code_url),
            ImageSource::AuthorityLogo => {
                let logo = record.thelogo.trim();
                (!logo.is_empty()).then(|| self.paths.logo(logo))
            }
            ImageSource::Instructions => Some(self.paths.instructions.clone()),
        }
    }

    fn load_image(&self, location: &str) -> Result<EmbeddableImage, String> {
        let asset = self
            .assets
            .fetch(location)
            .map_err(|e| e.to_string())?;
        normalize(&asset.bytes, asset.content_type.as_deref()).map_err(|e| format!("{location}: {e}"))
    }
}

/// Look up the record to render. A missing store or record is an error here,
/// not a sentinel.
pub fn fetch_for_render(
    store: Option<&dyn RecordStore>,
    id: &str,
) -> Result<CertificateRecord, RenderError> {
    let store = store.ok_or(RenderError::StoreUnavailable)?;
    store
        .get_by_id(id)
        .ok_or_else(|| RenderError::RecordNotFound(id.to_string()))
}

/// Write the finished PDF into `dir` under its file name.
pub fn deliver(output: &RenderOutput, dir: &Path) -> io::Result<PathBuf> {
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)?;
    }
    let path = dir.join(&output.file_name);
    fs::write(&path, &output.bytes)?;
    log::info!("wrote {} ({} bytes)", path.display(), output.bytes.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::synth_font::synth_font;
    use crate::templates::blank_template;

    fn assets() -> MemoryAssets {
        let paths = AssetPaths::default();
        MemoryAssets::new()
            .with(paths.template, blank_template(612.0, 792.0), Some("application/pdf"))
            .with(paths.display_font, synth_font(), Some("font/ttf"))
            .with(paths.body_font, synth_font(), Some("font/ttf"))
    }

    #[test]
    fn run_reaches_done() {
        let compositor = Compositor::with_defaults(assets());
        let mut record = CertificateRecord::default();
        record.name = "Ahmed Ali".into();

        let mut output = None;
        let outcome = compositor.run(&record, |r| output = r.as_ref().ok().cloned());
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(compositor.stage(), Stage::Done);
        assert_eq!(compositor.run_state(), RunState::Done);
        let output = output.unwrap();
        assert_eq!(output.file_name, "Ahmed Ali.pdf");
        assert_eq!(&output.bytes[0..5], b"%PDF-");
    }

    #[test]
    fn missing_font_fails_the_run() {
        let mut assets = assets();
        assets.remove(&AssetPaths::default().body_font);
        let compositor = Compositor::with_defaults(assets);

        let mut failed = false;
        compositor.run(&CertificateRecord::default(), |r| {
            failed = matches!(r, Err(RenderError::Fetch { .. }));
        });
        assert!(failed);
        assert!(matches!(compositor.stage(), Stage::Failed(_)));
    }

    #[test]
    fn second_trigger_is_ignored() {
        let compositor = Compositor::with_defaults(assets());
        let record = CertificateRecord::default();
        let mut calls = 0;
        assert_eq!(compositor.run(&record, |_| calls += 1), RunOutcome::Completed);
        assert_eq!(compositor.run(&record, |_| calls += 1), RunOutcome::AlreadyTriggered);
        assert_eq!(calls, 1);
    }

    #[test]
    fn fetch_for_render_without_store() {
        assert!(matches!(
            fetch_for_render(None, "x"),
            Err(RenderError::StoreUnavailable)
        ));
    }
}
