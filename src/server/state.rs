use std::time::Instant;

use crate::database::Database;

#[derive(Clone)]
pub struct AppState {
    /// Published store handle; present for the whole life of the server
    pub database: Database,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            start_time: Instant::now(),
        }
    }
}
