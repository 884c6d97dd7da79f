//! Shared handler state

use std::sync::Arc;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::queue::QueueFrontDoor;
use texforge_runner::ArtifactLayout;

/// State cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub layout: ArtifactLayout,
    /// Present only when the queue front door is enabled
    pub queue: Option<QueueFrontDoor>,
}
