//! Request id allocation and reply correlation.

use crate::error::{DocwireError, Result};

/// First id handed out, and the restart point after wraparound.
const FIRST_REQUEST_ID: i32 = 1;

/// Allocates request ids and matches replies to the single outstanding
/// request.
///
/// Ids are positive, strictly increasing, and wrap from `i32::MAX` back to
/// 1 so 0 is never used. This client does not pipeline: at most one request
/// may be outstanding at a time, which keeps correlation unambiguous
/// without a multiplexing layer.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: i32,
    outstanding: Option<i32>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: FIRST_REQUEST_ID,
            outstanding: None,
        }
    }

    /// Allocate the next request id.
    pub fn next_request_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if self.next_id == i32::MAX {
            FIRST_REQUEST_ID
        } else {
            self.next_id + 1
        };
        id
    }

    /// Mark `id` as the outstanding request.
    ///
    /// # Errors
    ///
    /// `ConcurrentRequest` if another request is already outstanding.
    pub fn register(&mut self, id: i32) -> Result<()> {
        if self.outstanding.is_some() {
            return Err(DocwireError::ConcurrentRequest);
        }
        self.outstanding = Some(id);
        Ok(())
    }

    /// Match a reply's responseTo against the outstanding request and clear
    /// the slot.
    ///
    /// # Errors
    ///
    /// `UnexpectedReply` when nothing is outstanding or the id does not
    /// match; either way the stream is desynchronized and the connection
    /// must be torn down by the caller. Never a silent drop.
    pub fn resolve(&mut self, response_to: i32) -> Result<i32> {
        match self.outstanding {
            Some(id) if id == response_to => {
                self.outstanding = None;
                Ok(id)
            }
            Some(id) => Err(DocwireError::UnexpectedReply {
                expected: id,
                got: response_to,
            }),
            None => Err(DocwireError::UnexpectedReply {
                expected: 0,
                got: response_to,
            }),
        }
    }

    /// Drop the outstanding request without resolving it. Used on error
    /// paths so a failed exchange does not wedge the slot.
    pub fn abandon(&mut self) {
        self.outstanding = None;
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    #[cfg(test)]
    fn set_next_id(&mut self, id: i32) {
        self.next_id = id;
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
