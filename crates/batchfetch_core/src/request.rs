use std::fmt;

/// One page request: `count` records starting at record index `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchRequest {
    pub offset: u64,
    pub count: u64,
}

impl BatchRequest {
    pub fn new(offset: u64, count: u64) -> Self {
        Self { offset, count }
    }
}

impl fmt::Display for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset={} count={}", self.offset, self.count)
    }
}
