use axum::extract::FromRef;

use crate::app_services::AppServices;
use crate::thumbnail::ThumbnailService;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedAppServices = Arc<AppServices>;
pub type GuardedThumbnailService = Arc<ThumbnailService>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub services: GuardedAppServices,
    pub thumbnails: GuardedThumbnailService,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, services: Arc<AppServices>) -> Self {
        let thumbnails = Arc::new(ThumbnailService::from_services(&services));
        Self {
            config,
            start_time: Instant::now(),
            services,
            thumbnails,
            hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        }
    }
}

impl FromRef<ServerState> for GuardedAppServices {
    fn from_ref(input: &ServerState) -> Self {
        input.services.clone()
    }
}

impl FromRef<ServerState> for GuardedThumbnailService {
    fn from_ref(input: &ServerState) -> Self {
        input.thumbnails.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
