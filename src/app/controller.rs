use super::preview::{self, PreviewImage};
use super::state::{
    PreviewSlot, UiContext, UiState, ViewerArea, DOWNLOAD_FAILED_MESSAGE, PROCESSING_MESSAGE,
    UPLOAD_FAILED_MESSAGE,
};
use crate::download::{ObjectUrl, SaveSink};
use crate::error::{Error, Result};
use crate::upload::{SelectedFile, UploadClient, UploadResult};
use crate::utils::data_url::{self, DEFAULT_MODEL_MEDIA_TYPE};
use crate::viewer::ModelViewer;
use derivative::Derivative;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Completions posted back to the UI thread by worker threads.
#[derive(Debug)]
pub enum ControllerEvent {
    PreviewDecoded {
        token: u64,
        result: Result<PreviewImage>,
    },
    UploadSettled(Result<UploadResult>),
}

/// Coordinates selection, preview, upload and download for a single file.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Controller {
    state: UiState,
    selected: Option<SelectedFile>,
    selection_token: u64,
    in_flight: bool,
    result: Option<UploadResult>,
    ui: UiContext,
    download_name: String,
    #[derivative(Debug = "ignore")]
    client: Arc<dyn UploadClient>,
    #[derivative(Debug = "ignore")]
    sink: Box<dyn SaveSink>,
    #[derivative(Debug = "ignore")]
    events_tx: Sender<ControllerEvent>,
    #[derivative(Debug = "ignore")]
    events_rx: Receiver<ControllerEvent>,
    #[derivative(Debug = "ignore")]
    waker: Waker,
}

impl Controller {
    pub fn new(
        client: Arc<dyn UploadClient>,
        sink: Box<dyn SaveSink>,
        download_name: impl Into<String>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            state: UiState::Idle,
            selected: None,
            selection_token: 0,
            in_flight: false,
            result: None,
            ui: UiContext::default(),
            download_name: download_name.into(),
            client,
            sink,
            events_tx,
            events_rx,
            waker: Arc::new(|| {}),
        }
    }

    /// Called by workers after posting an event so the window repaints.
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Arc::new(waker);
        self
    }

    pub fn state(&self) -> UiState {
        self.state
    }

    pub fn ui(&self) -> &UiContext {
        &self.ui
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    pub fn select(&mut self, file: SelectedFile) {
        info!("Selected '{}' ({})", file.name, file.media_type);

        self.selection_token += 1;
        let token = self.selection_token;
        self.ui.preview = PreviewSlot::Decoding { token };
        self.spawn_decode(token, Arc::clone(&file.bytes));
        self.selected = Some(file);

        if !self.in_flight {
            self.state = UiState::Ready;
        }
        self.refresh_gates();
    }

    pub fn clear(&mut self) {
        if self.selected.is_some() {
            info!("Selection cleared");
        }
        // Bumping the token orphans any decode still running.
        self.selection_token += 1;
        self.selected = None;
        self.ui.preview = PreviewSlot::Empty;

        if !self.in_flight {
            self.state = UiState::Idle;
        }
        self.refresh_gates();
    }

    pub fn drag_over(&mut self) {
        self.ui.drop_active = true;
    }

    pub fn drag_leave(&mut self) {
        self.ui.drop_active = false;
    }

    pub fn drop_files(&mut self, files: Vec<SelectedFile>) {
        self.ui.drop_active = false;
        let Some(file) = files.into_iter().next() else {
            debug!("Drop carried no files");
            return;
        };
        self.select(file);
    }

    pub fn upload(&mut self) {
        if self.in_flight {
            debug!("Upload already in flight");
            return;
        }
        let Some(file) = self.selected.clone() else {
            debug!("Upload requested without a selected file");
            return;
        };

        self.in_flight = true;
        self.state = UiState::Uploading;
        self.result = None;
        self.ui.busy = true;
        self.ui.message = Some(PROCESSING_MESSAGE.to_string());
        self.refresh_gates();

        let client = Arc::clone(&self.client);
        let guard = SettleGuard {
            events_tx: self.events_tx.clone(),
            waker: Arc::clone(&self.waker),
            outcome: None,
        };

        let spawned = thread::Builder::new()
            .name("upload".to_string())
            .spawn(move || {
                let mut guard = guard;
                guard.outcome = Some(client.upload(&file));
            });
        if let Err(e) = spawned {
            // The closure, and with it the guard, was dropped: the abort is already queued.
            error!("Failed to start upload worker: {}", e);
        }
    }

    pub fn download(&mut self) {
        if self.state != UiState::Success {
            debug!("Download ignored in state {:?}", self.state);
            return;
        }
        let Some(payload) = self.result.as_ref().and_then(UploadResult::download_payload) else {
            debug!("Download ignored: no payload held");
            return;
        };

        match self.save_payload(payload) {
            Ok(()) => info!("Download handed to save sink as '{}'", self.download_name),
            Err(e) => {
                warn!("Download failed: {}", e);
                self.ui.message = Some(DOWNLOAD_FAILED_MESSAGE.to_string());
            }
        }
    }

    /// Surfaces a failure that happened outside the controller, e.g. reading a picked file.
    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.ui.message = Some(message);
    }

    /// Drains worker completions; returns whether anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle(event);
            changed = true;
        }
        changed
    }

    pub fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::PreviewDecoded { token, result } => {
                self.on_preview_decoded(token, result)
            }
            ControllerEvent::UploadSettled(outcome) => self.on_upload_settled(outcome),
        }
    }

    fn on_preview_decoded(&mut self, token: u64, result: Result<PreviewImage>) {
        if token != self.selection_token {
            debug!(
                "Dropping stale preview {} (current {})",
                token, self.selection_token
            );
            return;
        }

        self.ui.preview = match result {
            Ok(image) => PreviewSlot::Ready {
                token,
                image: Arc::new(image),
            },
            Err(e) => {
                warn!("Preview decode failed: {}", e);
                PreviewSlot::Unavailable { token }
            }
        };
    }

    fn on_upload_settled(&mut self, outcome: Result<UploadResult>) {
        match outcome {
            Ok(result) => {
                self.ui.message = Some(result.message.clone());
                if let Some(reference) = result.render_reference() {
                    info!("Upload succeeded with a model");
                    self.ui.viewer = ViewerArea::Model(ModelViewer::new(reference));
                    self.state = UiState::Success;
                } else {
                    info!("Upload finished without a model: {}", result.message);
                    self.state = if self.selected.is_some() {
                        UiState::Ready
                    } else {
                        UiState::Idle
                    };
                }
                self.result = Some(result);
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                self.ui.message = Some(UPLOAD_FAILED_MESSAGE.to_string());
                self.state = UiState::Error;
            }
        }

        self.in_flight = false;
        self.ui.busy = false;
        self.refresh_gates();
    }

    fn save_payload(&self, payload: &str) -> Result<()> {
        let blob = data_url::decode(payload, DEFAULT_MODEL_MEDIA_TYPE)?;
        let object = ObjectUrl::create(&blob)?;
        self.sink.save(&object, &self.download_name)
    }

    fn spawn_decode(&self, token: u64, bytes: Arc<[u8]>) {
        let events_tx = self.events_tx.clone();
        let waker = Arc::clone(&self.waker);

        let spawned = thread::Builder::new()
            .name("preview-decode".to_string())
            .spawn(move || {
                let result = preview::decode(&bytes);
                if events_tx
                    .send(ControllerEvent::PreviewDecoded { token, result })
                    .is_ok()
                {
                    waker();
                }
            });

        if let Err(e) = spawned {
            let _ = self.events_tx.send(ControllerEvent::PreviewDecoded {
                token,
                result: Err(Error::Io(e)),
            });
        }
    }

    fn refresh_gates(&mut self) {
        self.ui.upload_enabled = self.selected.is_some() && !self.in_flight;

        let downloadable = self.state == UiState::Success
            && self
                .result
                .as_ref()
                .and_then(UploadResult::download_payload)
                .is_some();
        self.ui.download_visible = downloadable;
        self.ui.download_enabled = downloadable;
    }
}

/// Posts the upload outcome when dropped, so the controller always hears back
/// from a worker, even one that panicked or never ran.
struct SettleGuard {
    events_tx: Sender<ControllerEvent>,
    waker: Waker,
    outcome: Option<Result<UploadResult>>,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(Err(Error::UploadAborted));
        if self
            .events_tx
            .send(ControllerEvent::UploadSettled(outcome))
            .is_err()
        {
            debug!("Controller gone before upload settled");
            return;
        }
        (self.waker)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::preview::png_bytes;
    use crate::download::ObjectUrl;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    type Reply = Box<dyn Fn(&SelectedFile) -> Result<UploadResult> + Send + Sync>;

    struct FakeClient {
        reply: Reply,
        calls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn new(
            reply: impl Fn(&SelectedFile) -> Result<UploadResult> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(reply),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn json(body: &'static str) -> Arc<Self> {
            Self::new(move |_| UploadResult::from_json(body))
        }
    }

    impl UploadClient for FakeClient {
        fn upload(&self, file: &SelectedFile) -> Result<UploadResult> {
            self.calls.lock().unwrap().push(file.name.clone());
            (self.reply)(file)
        }
    }

    #[derive(Debug, Clone)]
    struct SavedObject {
        path: PathBuf,
        existed: bool,
        bytes: Vec<u8>,
        media_type: String,
        file_name: String,
    }

    #[derive(Default, Clone)]
    struct RecordingSink {
        saved: Rc<RefCell<Vec<SavedObject>>>,
    }

    impl SaveSink for RecordingSink {
        fn save(&self, object: &ObjectUrl, file_name: &str) -> Result<()> {
            self.saved.borrow_mut().push(SavedObject {
                path: object.path().to_path_buf(),
                existed: object.path().exists(),
                bytes: std::fs::read(object.path())?,
                media_type: object.media_type().to_string(),
                file_name: file_name.to_string(),
            });
            Ok(())
        }
    }

    const FULL_RESPONSE: &str = r#"{"message":"ok","model_data_url":"data:model/gltf-binary;base64,Z2xURg==","model_ply_url":"data:model/gltf-binary;base64,AAA="}"#;

    fn controller(client: Arc<FakeClient>) -> (Controller, RecordingSink) {
        let sink = RecordingSink::default();
        let controller = Controller::new(client, Box::new(sink.clone()), "model.ply");
        (controller, sink)
    }

    fn image_file(name: &str) -> SelectedFile {
        SelectedFile::new(name, "image/png", png_bytes(2, 2))
    }

    fn pump_until(controller: &mut Controller, done: impl Fn(&Controller) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(controller) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = controller
                .events_rx
                .recv_timeout(remaining)
                .expect("worker event before deadline");
            controller.handle(event);
        }
    }

    fn upload_and_settle(controller: &mut Controller) {
        controller.upload();
        pump_until(controller, |c| !c.in_flight);
    }

    #[test]
    fn starts_idle_with_everything_gated() {
        let (controller, _) = controller(FakeClient::json(FULL_RESPONSE));
        assert_eq!(controller.state(), UiState::Idle);
        assert!(!controller.ui().upload_enabled);
        assert!(!controller.ui().download_visible);
        assert!(controller.ui().placeholder_visible());
        assert_eq!(controller.ui().viewer, ViewerArea::Placeholder);
    }

    #[test]
    fn last_selection_wins_with_single_preview() {
        let (mut controller, _) = controller(FakeClient::json(FULL_RESPONSE));

        for name in ["a.png", "b.png", "c.png"] {
            controller.select(image_file(name));
            assert_eq!(controller.state(), UiState::Ready);
            assert!(controller.ui().upload_enabled);
            assert!(!controller.ui().placeholder_visible());
        }
        assert_eq!(controller.selected().unwrap().name, "c.png");

        let current = controller.selection_token;
        pump_until(&mut controller, |c| {
            matches!(c.ui.preview, PreviewSlot::Ready { .. })
        });
        assert!(matches!(
            controller.ui().preview,
            PreviewSlot::Ready { token, .. } if token == current
        ));
    }

    #[test]
    fn stale_decode_never_overwrites_newer_preview() {
        let (mut controller, _) = controller(FakeClient::json(FULL_RESPONSE));
        controller.select(image_file("old.png"));
        let old = controller.selection_token;
        controller.select(image_file("new.png"));
        let new = controller.selection_token;

        let stale = PreviewImage {
            size: [1, 1],
            rgba: vec![0, 0, 0, 255],
        };
        controller.handle(ControllerEvent::PreviewDecoded {
            token: old,
            result: Ok(stale),
        });
        assert_eq!(controller.ui().preview, PreviewSlot::Decoding { token: new });

        controller.clear();
        controller.handle(ControllerEvent::PreviewDecoded {
            token: new,
            result: Ok(PreviewImage {
                size: [1, 1],
                rgba: vec![1, 1, 1, 255],
            }),
        });
        assert_eq!(controller.ui().preview, PreviewSlot::Empty);
    }

    #[test]
    fn undecodable_image_marks_preview_unavailable_but_stays_uploadable() {
        let (mut controller, _) = controller(FakeClient::json(FULL_RESPONSE));
        controller.select(SelectedFile::new("x.png", "image/png", b"nope".to_vec()));
        pump_until(&mut controller, |c| {
            !matches!(c.ui.preview, PreviewSlot::Decoding { .. })
        });

        assert!(matches!(
            controller.ui().preview,
            PreviewSlot::Unavailable { .. }
        ));
        assert!(controller.ui().upload_enabled);
    }

    #[test]
    fn clear_restores_placeholder_and_is_idempotent() {
        let (mut controller, _) = controller(FakeClient::json(FULL_RESPONSE));
        controller.select(image_file("a.png"));
        upload_and_settle(&mut controller);
        assert!(controller.ui().download_visible);

        controller.clear();
        controller.clear();

        assert_eq!(controller.state(), UiState::Idle);
        assert!(controller.selected().is_none());
        assert!(controller.ui().placeholder_visible());
        assert!(!controller.ui().download_visible);
        assert!(!controller.ui().upload_enabled);
    }

    #[test]
    fn drag_gestures_only_toggle_indicator() {
        let (mut controller, _) = controller(FakeClient::json(FULL_RESPONSE));
        controller.drag_over();
        assert!(controller.ui().drop_active);
        assert_eq!(controller.state(), UiState::Idle);

        controller.drag_leave();
        assert!(!controller.ui().drop_active);

        controller.drag_over();
        controller.drop_files(Vec::new());
        assert!(!controller.ui().drop_active);
        assert_eq!(controller.state(), UiState::Idle);
        assert!(controller.selected().is_none());

        controller.drop_files(vec![image_file("first.png"), image_file("second.png")]);
        assert_eq!(controller.selected().unwrap().name, "first.png");
        assert_eq!(controller.state(), UiState::Ready);
    }

    #[test]
    fn successful_upload_presents_model_and_arms_download() {
        let client = FakeClient::json(FULL_RESPONSE);
        let (mut controller, _) = controller(Arc::clone(&client));
        controller.select(image_file("cat.png"));

        controller.upload();
        assert_eq!(controller.state(), UiState::Uploading);
        assert!(controller.ui().busy);
        assert!(!controller.ui().upload_enabled);
        assert_eq!(controller.ui().message.as_deref(), Some(PROCESSING_MESSAGE));

        pump_until(&mut controller, |c| !c.in_flight);

        assert_eq!(controller.state(), UiState::Success);
        assert_eq!(controller.ui().message.as_deref(), Some("ok"));
        assert_eq!(
            controller.ui().viewer,
            ViewerArea::Model(ModelViewer::new("data:model/gltf-binary;base64,Z2xURg=="))
        );
        assert!(controller.ui().download_visible);
        assert!(controller.ui().download_enabled);
        assert!(controller.ui().upload_enabled);
        assert!(!controller.ui().busy);
        assert_eq!(*client.calls.lock().unwrap(), vec!["cat.png".to_string()]);
    }

    #[test]
    fn response_without_model_is_informational() {
        let (mut controller, _) = controller(FakeClient::json(r#"{"message":"no model found"}"#));
        controller.select(image_file("cat.png"));
        upload_and_settle(&mut controller);

        assert_eq!(controller.state(), UiState::Ready);
        assert_eq!(controller.ui().message.as_deref(), Some("no model found"));
        assert_eq!(controller.ui().viewer, ViewerArea::Placeholder);
        assert!(!controller.ui().download_visible);
        assert!(controller.ui().upload_enabled);
    }

    #[test]
    fn render_reference_without_download_payload_keeps_download_hidden() {
        let (mut controller, sink) = controller(FakeClient::json(
            r#"{"message":"ok","model_data_url":"https://cdn.example/m.glb"}"#,
        ));
        controller.select(image_file("cat.png"));
        upload_and_settle(&mut controller);

        assert_eq!(controller.state(), UiState::Success);
        assert!(!controller.ui().download_visible);
        controller.download();
        assert!(sink.saved.borrow().is_empty());
    }

    #[test]
    fn transport_failure_shows_generic_error_and_reenables_trigger() {
        let (mut controller, _) = controller(FakeClient::new(|_| {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        }));
        controller.select(image_file("cat.png"));
        upload_and_settle(&mut controller);

        assert_eq!(controller.state(), UiState::Error);
        assert_eq!(controller.ui().message.as_deref(), Some(UPLOAD_FAILED_MESSAGE));
        assert!(controller.ui().upload_enabled);
        assert_eq!(controller.ui().viewer, ViewerArea::Placeholder);
        assert!(!controller.ui().download_visible);

        controller.select(image_file("retry.png"));
        assert_eq!(controller.state(), UiState::Ready);
    }

    #[test]
    fn malformed_response_is_an_error() {
        let (mut controller, _) = controller(FakeClient::json("<html>bad gateway</html>"));
        controller.select(image_file("cat.png"));
        upload_and_settle(&mut controller);
        assert_eq!(controller.state(), UiState::Error);
        assert!(controller.ui().upload_enabled);
    }

    #[test]
    fn panicking_worker_still_releases_the_trigger() {
        let (mut controller, _) = controller(FakeClient::new(|_| panic!("worker blew up")));
        controller.select(image_file("cat.png"));
        upload_and_settle(&mut controller);

        assert_eq!(controller.state(), UiState::Error);
        assert!(controller.ui().upload_enabled);
        assert!(!controller.ui().busy);
    }

    #[test]
    fn only_one_upload_in_flight() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let client = FakeClient::new(move |_| {
            let _ = release_rx.lock().unwrap().recv();
            UploadResult::from_json(FULL_RESPONSE)
        });
        let (mut controller, _) = controller(Arc::clone(&client));
        controller.select(image_file("cat.png"));

        controller.upload();
        controller.upload();
        assert!(!controller.ui().upload_enabled);

        controller.select(image_file("dog.png"));
        assert_eq!(controller.state(), UiState::Uploading);
        assert!(!controller.ui().upload_enabled);

        release_tx.send(()).unwrap();
        pump_until(&mut controller, |c| !c.in_flight);
        assert_eq!(client.calls.lock().unwrap().len(), 1);
        assert!(controller.ui().upload_enabled);
    }

    #[test]
    fn upload_without_selection_is_a_no_op() {
        let client = FakeClient::json(FULL_RESPONSE);
        let (mut controller, _) = controller(Arc::clone(&client));
        controller.upload();
        assert_eq!(controller.state(), UiState::Idle);
        assert!(!controller.poll());
        assert!(client.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn download_decodes_payload_and_releases_staging() {
        let (mut controller, sink) = controller(FakeClient::json(FULL_RESPONSE));
        controller.select(image_file("cat.png"));
        upload_and_settle(&mut controller);

        controller.download();
        controller.download();

        let saved = sink.saved.borrow();
        assert_eq!(saved.len(), 2);
        let first = &saved[0];
        assert!(first.existed);
        assert_eq!(first.bytes, vec![0, 0]);
        assert_eq!(first.media_type, "model/gltf-binary");
        assert_eq!(first.file_name, "model.ply");
        assert!(!first.path.exists());
        assert_eq!(controller.state(), UiState::Success);
    }

    #[test]
    fn download_without_success_is_a_no_op() {
        let (mut controller, sink) = controller(FakeClient::json(FULL_RESPONSE));
        controller.download();
        controller.select(image_file("cat.png"));
        controller.download();
        assert!(sink.saved.borrow().is_empty());
        assert_eq!(controller.ui().message, None);
    }

    #[test]
    fn reselecting_after_success_hides_download() {
        let (mut controller, sink) = controller(FakeClient::json(FULL_RESPONSE));
        controller.select(image_file("cat.png"));
        upload_and_settle(&mut controller);

        controller.select(image_file("dog.png"));
        assert_eq!(controller.state(), UiState::Ready);
        assert!(!controller.ui().download_visible);
        controller.download();
        assert!(sink.saved.borrow().is_empty());
    }

    #[test]
    fn undecodable_payload_reports_download_failure() {
        let (mut controller, sink) = controller(FakeClient::json(
            r#"{"message":"ok","model_data_url":"data:model/gltf-binary;base64,AAA=","model_ply_url":"data:model/gltf-binary;base64,***"}"#,
        ));
        controller.select(image_file("cat.png"));
        upload_and_settle(&mut controller);

        controller.download();
        assert!(sink.saved.borrow().is_empty());
        assert_eq!(
            controller.ui().message.as_deref(),
            Some(DOWNLOAD_FAILED_MESSAGE)
        );
        assert_eq!(controller.state(), UiState::Success);
    }
}
