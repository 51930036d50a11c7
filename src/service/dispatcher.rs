//! Dispatcher - the host entry point
//!
//! Holds the one service instance of the process. The first call initializes
//! it from the host context; every call then routes its batch through
//! preprocess, inference and postprocess.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::engine::backend::ModelLoader;
use crate::engine::detector::FaceLocator;
use crate::engine::postprocess::Prediction;
use crate::engine::preprocess::{InputError, PixelRange};

use super::context::Context;
use super::fer_service::FerService;
use super::types::RequestItem;

/// Initialization state of the service
pub enum ServiceState {
    Uninitialized,
    Ready(FerService),
}

impl ServiceState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceState::Ready(_))
    }
}

pub struct Dispatcher {
    state: RwLock<ServiceState>,
    locator: Arc<dyn FaceLocator>,
    loader: Arc<dyn ModelLoader>,
    pixel_range: PixelRange,
    last_error: Mutex<Option<String>>,
}

impl Dispatcher {
    pub fn new(locator: Arc<dyn FaceLocator>, loader: Arc<dyn ModelLoader>, pixel_range: PixelRange) -> Self {
        Self {
            state: RwLock::new(ServiceState::Uninitialized),
            locator,
            loader,
            pixel_range,
            last_error: Mutex::new(None),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().is_ready()
    }

    /// Message of the input error that rejected the most recent batch
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Host entry point.
    ///
    /// Clears the recorded input error, initializes on first use and returns
    /// `None` without input. An input error also yields `None` and is recorded
    /// for [`Dispatcher::last_error`]; any other failure is returned as an error.
    pub fn handle(&self, data: Option<&[RequestItem]>, context: &Context) -> Result<Option<Vec<Prediction>>> {
        *self.last_error.lock() = None;
        self.ensure_ready(context)?;

        let Some(data) = data else {
            return Ok(None);
        };

        match self.dispatch(data, context) {
            Ok(predictions) => Ok(Some(predictions)),
            Err(e) => match e.downcast_ref::<InputError>() {
                Some(input_error) => {
                    *self.last_error.lock() = Some(input_error.to_string());
                    Ok(None)
                }
                None => Err(e),
            },
        }
    }

    /// Run one batch, surfacing input errors as [`InputError`] inside the error
    pub fn dispatch(&self, data: &[RequestItem], context: &Context) -> Result<Vec<Prediction>> {
        self.ensure_ready(context)?;
        *self.last_error.lock() = None;

        let state = self.state.read();
        let ServiceState::Ready(service) = &*state else {
            anyhow::bail!("Service {} is not initialized", context.model_name);
        };

        let result = service.handle(data);
        if let Err(e) = &result {
            if e.downcast_ref::<InputError>().is_some() {
                warn!("Rejected batch of {} items: {}", data.len(), e);
            }
        }
        result
    }

    fn ensure_ready(&self, context: &Context) -> Result<()> {
        if self.state.read().is_ready() {
            return Ok(());
        }

        let mut state = self.state.write();
        // Another caller may have initialized while we waited for the lock
        if state.is_ready() {
            return Ok(());
        }

        info!("Initializing service for model {}", context.model_name);
        let service = FerService::initialize(context, self.locator.clone(), self.loader.as_ref(), self.pixel_range)?;
        *state = ServiceState::Ready(service);

        Ok(())
    }
}
