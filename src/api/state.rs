use std::sync::Arc;

use crate::queue::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub workers: usize,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, workers: usize) -> Self {
        Self { dispatcher, workers }
    }
}
