use crate::services::{AiServicesHandle, SearchConfigData};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ai: AiServicesHandle,
    pub config: Arc<SearchConfigData>,
}
