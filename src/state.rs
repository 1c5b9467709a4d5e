use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::calendar::Clock;
use crate::services::notify::BookingEvent;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub events: mpsc::Sender<BookingEvent>,
}

impl AppState {
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("database lock poisoned".into()))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
