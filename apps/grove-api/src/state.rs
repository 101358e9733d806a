use std::sync::Arc;

use grove_service::GroveService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<GroveService>,
}
impl AppState {
	pub async fn new(config: grove_config::Config) -> color_eyre::Result<Self> {
		let service = GroveService::connect(config).await?;

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: GroveService) -> Self {
		Self { service: Arc::new(service) }
	}

	pub fn auth_token(&self) -> Option<&str> {
		self.service.cfg.security.api_auth_token.as_deref()
	}
}
