use std::sync::Arc;

use harrow_service::Fuser;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<Fuser>,
	pub api_auth_token: Option<Arc<str>>,
}
impl AppState {
	pub fn new(config: harrow_config::Config) -> color_eyre::Result<Self> {
		let service = Fuser::new(config)?;

		Ok(Self::with_service(service))
	}

	pub fn with_service(service: Fuser) -> Self {
		let api_auth_token = service.cfg.security.api_auth_token.as_deref().map(Arc::from);

		Self { service: Arc::new(service), api_auth_token }
	}
}
