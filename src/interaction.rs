//! Recorded request/response pairs

use std::time::SystemTime;

use crate::message::{Request, Response};

/// One recorded request and the response it produced
///
/// Immutable once created; owned by the tape it was recorded on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    request: Request,
    response: Response,
    recorded_at: SystemTime,
}

impl Interaction {
    /// Capture an interaction now
    #[must_use]
    pub fn new(request: Request, response: Response) -> Self {
        Self::recorded_at(request, response, SystemTime::now())
    }

    /// Reconstruct an interaction captured at a known time
    #[must_use]
    pub fn recorded_at(request: Request, response: Response, recorded_at: SystemTime) -> Self {
        Self {
            request,
            response,
            recorded_at,
        }
    }

    /// The recorded request
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The recorded response
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// When the interaction was captured
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.recorded_at
    }
}
