use crate::coordinator::Coordinator;
use crate::store::SqliteBroker;
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use tourforge_core::config::Config;

pub struct AppState {
    pub broker: Arc<SqliteBroker>,
    pub coordinator: Arc<Coordinator<SqliteBroker>>,
    pub instances: PathBuf,
    pub config: Config,
}

impl AppState {
    pub fn new(db: Pool<Sqlite>, instances: PathBuf, config: Config) -> Self {
        let broker = Arc::new(SqliteBroker::new(
            db,
            config.channel.lease(),
            config.channel.consumer_ttl(),
        ));
        let coordinator = Arc::new(Coordinator::new(broker.clone(), config.clone()));
        Self {
            broker,
            coordinator,
            instances,
            config,
        }
    }
}
