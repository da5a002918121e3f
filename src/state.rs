use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{bog::BogClient, config::AppConfig, mail::Mailer};

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub bog: BogClient,
    /// `None` when SMTP is not configured.
    pub mailer: Option<Mailer>,
}

impl AppState {
    pub fn new(orm: DatabaseConnection, config: AppConfig) -> anyhow::Result<Self> {
        let bog = BogClient::new(config.bog.clone())?;
        let mailer = config.smtp.as_ref().map(Mailer::new).transpose()?;
        if mailer.is_none() {
            tracing::warn!("SMTP is not configured, outgoing email is disabled");
        }
        Ok(Self {
            orm,
            config: Arc::new(config),
            bog,
            mailer,
        })
    }
}
