use std::fmt;

use crate::{BatchRequest, BatchSizeState, FetchConfig};

/// Status codes treated as "the page was too big" rather than a hard failure.
const SIZE_ATTRIBUTABLE_STATUSES: [u16; 3] = [400, 413, 429];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The server returned an empty record list.
    NoMoreData,
    /// The server returned fewer records than requested.
    ReachedEnd,
    /// The request budget ran out, or the run was cancelled. Partial success.
    SafetyCapHit,
    FatalError,
}

impl Termination {
    pub fn is_error(&self) -> bool {
        matches!(self, Termination::FatalError)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::NoMoreData => write!(f, "no more data"),
            Termination::ReachedEnd => write!(f, "reached end"),
            Termination::SafetyCapHit => write!(f, "safety cap hit"),
            Termination::FatalError => write!(f, "fatal error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    InvalidUrl,
    Timeout,
    Network,
    TooLarge { max_bytes: u64, actual: Option<u64> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    HttpStatus(u16),
    Transport(TransportFailure),
    Transform,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Transport(TransportFailure::InvalidUrl) => write!(f, "invalid url"),
            FailureKind::Transport(TransportFailure::Timeout) => write!(f, "timeout"),
            FailureKind::Transport(TransportFailure::Network) => write!(f, "network error"),
            FailureKind::Transport(TransportFailure::TooLarge { max_bytes, actual }) => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Transform => write!(f, "transform failed"),
        }
    }
}

/// One failed request, with the parameters that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: FailureKind,
    pub request: BatchRequest,
    pub message: String,
}

impl ErrorRecord {
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            FailureKind::HttpStatus(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.request, self.message)
    }
}

/// What the loop learned from one request, already classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<R> {
    /// A non-empty page. `matched` is true when exactly the requested count came back.
    Page { records: Vec<R>, matched: bool },
    /// The response held no records.
    Empty,
    /// A response arrived with a non-success status.
    Rejected { status: u16, message: String },
    /// No response at all.
    TransportFailed {
        failure: TransportFailure,
        message: String,
    },
    TransformFailed { message: String },
}

/// What the loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A full page was accepted; the offset moved and the batch size may have grown.
    Advance { from: u64, to: u64 },
    /// A size-attributable rejection; retry the same offset at the smaller size.
    Retry { status: u16, from: u64, to: u64 },
    Done(Termination),
}

/// Mutable accumulator for a single fetch run.
///
/// Owned by exactly one loop. The loop asks for the next request, performs it,
/// and feeds the classified result back through [`FetchSession::observe`].
#[derive(Debug, Clone)]
pub struct FetchSession<R> {
    accumulated: Vec<R>,
    offset: u64,
    size: BatchSizeState,
    requests_issued: u32,
    max_requests: u32,
    errors: Vec<ErrorRecord>,
    terminated: Option<Termination>,
    cancelled: bool,
}

impl<R> FetchSession<R> {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            accumulated: Vec::new(),
            offset: 0,
            size: config.initial_size(),
            requests_issued: 0,
            max_requests: config.max_requests,
            errors: Vec::new(),
            terminated: None,
            cancelled: false,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> BatchSizeState {
        self.size
    }

    pub fn requests_issued(&self) -> u32 {
        self.requests_issued
    }

    pub fn records(&self) -> &[R] {
        &self.accumulated
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn termination(&self) -> Option<Termination> {
        self.terminated
    }

    pub fn is_done(&self) -> bool {
        self.terminated.is_some()
    }

    /// Issue the next request, or `None` once the run is over.
    ///
    /// Every issued request counts against the budget, shrink-retries included.
    /// With the budget spent the session ends as [`Termination::SafetyCapHit`].
    pub fn next_request(&mut self) -> Option<BatchRequest> {
        if self.terminated.is_some() {
            return None;
        }
        if self.requests_issued >= self.max_requests {
            self.terminated = Some(Termination::SafetyCapHit);
            return None;
        }
        self.requests_issued += 1;
        Some(BatchRequest::new(self.offset, self.size.current()))
    }

    /// Stop before the next request, keeping what was accumulated.
    pub fn cancel(&mut self) {
        if self.terminated.is_none() {
            self.cancelled = true;
            self.terminated = Some(Termination::SafetyCapHit);
        }
    }

    pub fn observe(&mut self, request: BatchRequest, observation: Observation<R>) -> Step {
        if let Some(termination) = self.terminated {
            return Step::Done(termination);
        }

        match observation {
            Observation::Page { records, matched } => {
                self.accumulated.extend(records);
                if !matched {
                    return self.finish(Termination::ReachedEnd);
                }
                // Offset moves by the requested size, not by what came back.
                let from = self.size.current();
                self.offset += from;
                self.size = self.size.grow();
                Step::Advance {
                    from,
                    to: self.size.current(),
                }
            }
            Observation::Empty => self.finish(Termination::NoMoreData),
            Observation::Rejected { status, message } => {
                self.errors.push(ErrorRecord {
                    kind: FailureKind::HttpStatus(status),
                    request,
                    message,
                });
                if SIZE_ATTRIBUTABLE_STATUSES.contains(&status) && self.size.can_shrink() {
                    let from = self.size.current();
                    self.size = self.size.shrink();
                    Step::Retry {
                        status,
                        from,
                        to: self.size.current(),
                    }
                } else {
                    self.finish(Termination::FatalError)
                }
            }
            Observation::TransportFailed { failure, message } => {
                self.errors.push(ErrorRecord {
                    kind: FailureKind::Transport(failure),
                    request,
                    message,
                });
                self.finish(Termination::FatalError)
            }
            Observation::TransformFailed { message } => {
                self.errors.push(ErrorRecord {
                    kind: FailureKind::Transform,
                    request,
                    message,
                });
                self.finish(Termination::FatalError)
            }
        }
    }

    /// Close the session. A session that never terminated is reported as truncated.
    pub fn into_report(self) -> FetchReport<R> {
        FetchReport {
            records: self.accumulated,
            errors: self.errors,
            termination: self.terminated.unwrap_or(Termination::SafetyCapHit),
            requests_issued: self.requests_issued,
            final_batch_size: self.size.current(),
            cancelled: self.cancelled,
        }
    }

    fn finish(&mut self, termination: Termination) -> Step {
        self.terminated = Some(termination);
        Step::Done(termination)
    }
}

/// Terminal result of one fetch run. Records are returned even on `FatalError`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport<R> {
    pub records: Vec<R>,
    pub errors: Vec<ErrorRecord>,
    pub termination: Termination,
    pub requests_issued: u32,
    pub final_batch_size: u64,
    pub cancelled: bool,
}

impl<R> FetchReport<R> {
    pub fn is_success(&self) -> bool {
        !self.termination.is_error()
    }

    pub fn hit_safety_cap(&self) -> bool {
        self.termination == Termination::SafetyCapHit && !self.cancelled
    }
}
