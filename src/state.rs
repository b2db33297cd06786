use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::llm::ImageService;
use crate::session::SessionState;

pub type SharedSession = Arc<Mutex<SessionState>>;

pub struct AppState<S> {
    pub config: Arc<Config>,
    pub service: Arc<S>,
    pub session: SharedSession,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            config: self.config.clone(),
            service: self.service.clone(),
            session: self.session.clone(),
        }
    }
}

impl<S: ImageService> AppState<S> {
    pub fn new(config: Config, service: S) -> Self {
        let session = SessionState::new(config.mask_brush_width);
        AppState {
            config: Arc::new(config),
            service: Arc::new(service),
            session: Arc::new(Mutex::new(session)),
        }
    }
}
